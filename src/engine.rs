//! Headless rendering engine driver – HTML in, PDF bytes out.
//!
//! Locates a Chrome/Chromium-class binary, prepares an isolated temp
//! workspace, and launches the engine as a subprocess with a deterministic
//! flag set. The subprocess is the pipeline's only OS-blocking step; it is
//! bridged into the async flow through `tokio::process`, with
//! `kill_on_drop` so cancelling the awaiting task also terminates the
//! child. The temp workspace is a scoped [`TempDir`]: files are removed on
//! every exit path, including timeout and cancellation.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::error::{ExportError, Result};

/// Client-side pagination script copied into the engine workspace so the
/// relative reference in rendered HTML resolves offline. Inserts page
/// breaks before section blocks that would straddle a page boundary, then
/// signals layout completion for the print pass.
const PAGINATION_SCRIPT: &str = r#"(function () {
  'use strict';
  var PAGE_HEIGHT_PX = 1122; // A4 at 96dpi
  function breakBefore(el) {
    el.style.breakBefore = 'page';
  }
  function paginate() {
    var blocks = document.querySelectorAll('[data-paginate]');
    for (var i = 0; i < blocks.length; i++) {
      var rect = blocks[i].getBoundingClientRect();
      var top = rect.top + window.scrollY;
      var page = Math.floor(top / PAGE_HEIGHT_PX);
      var bottomPage = Math.floor((top + rect.height - 1) / PAGE_HEIGHT_PX);
      if (page !== bottomPage && rect.height < PAGE_HEIGHT_PX) {
        breakBefore(blocks[i]);
      }
    }
    document.documentElement.setAttribute('data-paginated', 'true');
  }
  if (document.readyState === 'complete') {
    paginate();
  } else {
    window.addEventListener('load', paginate);
  }
})();
"#;

/// File name the script is written under inside the workspace.
const PAGINATION_SCRIPT_NAME: &str = "paginate.js";

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Explicit engine binary, checked before any probing.
    pub engine_path: Option<PathBuf>,
    /// `--virtual-time-budget` value; must be long enough for client-side
    /// pagination to finish before print.
    pub virtual_time_budget_ms: u64,
    /// External hard limit on the subprocess; the child is killed on
    /// expiry. Backstops a hung engine that never spends its virtual time.
    pub hard_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine_path: None,
            virtual_time_budget_ms: 10_000,
            hard_timeout: Duration::from_secs(30),
        }
    }
}

/// A located headless rendering engine.
#[derive(Debug, Clone)]
pub struct Engine {
    path: PathBuf,
    config: EngineConfig,
}

impl Engine {
    /// Locate an engine binary. Probe order: configured override, bundled
    /// binaries next to the executable, known install locations, PATH.
    /// First match wins.
    pub fn discover(config: EngineConfig) -> Result<Self> {
        if let Some(path) = &config.engine_path {
            if path.is_file() {
                return Ok(Self {
                    path: path.clone(),
                    config,
                });
            }
            log::warn!("configured engine '{}' not found; probing", path.display());
        }

        if let Some(path) = bundled_candidate() {
            return Ok(Self { path, config });
        }

        for location in INSTALL_LOCATIONS {
            let path = Path::new(location);
            if path.is_file() {
                return Ok(Self {
                    path: path.to_path_buf(),
                    config,
                });
            }
        }

        for name in PATH_NAMES {
            if let Ok(path) = which::which(name) {
                return Ok(Self { path, config });
            }
        }

        Err(ExportError::EngineNotFound)
    }

    /// Engine with a known binary path, skipping discovery. Used by tests
    /// and by callers that manage the binary themselves.
    pub fn with_path(path: PathBuf, config: EngineConfig) -> Self {
        Self { path, config }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Render HTML to PDF bytes through the engine subprocess.
    pub async fn render_pdf(&self, html: &str) -> Result<Vec<u8>> {
        // Scoped workspace: dropped (and deleted) on every path out of
        // this function, including timeout and task cancellation.
        let workspace = tempfile::TempDir::new()?;
        let input_path = workspace.path().join("input.html");
        let output_path = workspace.path().join("output.pdf");

        tokio::fs::write(
            workspace.path().join(PAGINATION_SCRIPT_NAME),
            PAGINATION_SCRIPT,
        )
        .await?;
        let html = rewrite_script_refs(html);
        tokio::fs::write(&input_path, html.as_bytes()).await?;

        log::debug!(
            "launching engine '{}' on {}",
            self.path.display(),
            input_path.display()
        );

        let child = Command::new(&self.path)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-software-rasterizer")
            .arg("--run-all-compositor-stages-before-draw")
            .arg(format!("--print-to-pdf={}", output_path.display()))
            .arg("--no-pdf-header-footer")
            .arg("--print-to-pdf-no-header")
            .arg(format!(
                "--virtual-time-budget={}",
                self.config.virtual_time_budget_ms
            ))
            .arg(format!("file://{}", input_path.display()))
            .current_dir(workspace.path())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExportError::Engine {
                status: "launch".to_string(),
                stderr: e.to_string(),
            })?;

        let output = match tokio::time::timeout(self.config.hard_timeout, child.wait_with_output())
            .await
        {
            Ok(result) => result?,
            // Dropping the in-flight future drops the child handle, and
            // kill_on_drop terminates the process.
            Err(_) => {
                return Err(ExportError::EngineTimeout(
                    self.config.hard_timeout.as_millis() as u64,
                ))
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            let status = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(ExportError::Engine { status, stderr });
        }

        let pdf = tokio::fs::read(&output_path)
            .await
            .map_err(|e| ExportError::Engine {
                status: "0".to_string(),
                stderr: format!("output unreadable: {e}; engine stderr: {stderr}"),
            })?;
        if pdf.is_empty() {
            return Err(ExportError::Engine {
                status: "0".to_string(),
                stderr: format!("empty output file; engine stderr: {stderr}"),
            });
        }

        log::debug!("engine produced {} PDF bytes", pdf.len());
        Ok(pdf)
    }
}

/// Rewrite any pagination-script reference to the local workspace copy.
/// Independent of font inlining: this always runs, fonts may not.
fn rewrite_script_refs(html: &str) -> String {
    use std::sync::OnceLock;
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        regex::Regex::new(r#"src\s*=\s*["'][^"']*paginate\.js["']"#).expect("static regex")
    });
    re.replace_all(html, format!(r#"src="{PAGINATION_SCRIPT_NAME}""#).as_str())
        .into_owned()
}

/// Bundled engine binaries shipped next to the application executable.
fn bundled_candidate() -> Option<PathBuf> {
    let exe_dir = std::env::current_exe().ok()?.parent()?.to_path_buf();
    for name in ["headless_shell", "headless_shell.exe"] {
        for dir in [exe_dir.clone(), exe_dir.join("resources")] {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

/// Known system install locations, checked in order.
const INSTALL_LOCATIONS: &[&str] = &[
    // macOS application bundles
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
    // Linux distribution paths
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/opt/google/chrome/chrome",
    // Package-manager paths
    "/snap/bin/chromium",
    "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
    // Windows
    "C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe",
    "C:\\Program Files (x86)\\Google\\Chrome\\Application\\chrome.exe",
];

/// Engine names probed on PATH, after explicit locations.
const PATH_NAMES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
    "msedge",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_path_wins() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = EngineConfig {
            engine_path: Some(file.path().to_path_buf()),
            ..EngineConfig::default()
        };
        let engine = Engine::discover(config).unwrap();
        assert_eq!(engine.path(), file.path());
    }

    #[test]
    fn script_refs_rewritten_to_local_copy() {
        let html = r#"<script src="/app/assets/paginate.js"></script>"#;
        assert_eq!(
            rewrite_script_refs(html),
            r#"<script src="paginate.js"></script>"#
        );
        // Already-local references are untouched in effect.
        let local = r#"<script src="paginate.js"></script>"#;
        assert_eq!(rewrite_script_refs(local), local);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_carries_stderr_and_cleans_up() {
        use std::os::unix::fs::PermissionsExt;

        // Stand-in engine that prints to stderr and exits 1.
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-engine");
        std::fs::write(&script, "#!/bin/sh\necho 'render crashed' >&2\nexit 1\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let engine = Engine::with_path(script, EngineConfig::default());
        let err = engine.render_pdf("<html></html>").await.unwrap_err();
        match err {
            ExportError::Engine { status, stderr } => {
                assert_eq!(status, "1");
                assert!(stderr.contains("render crashed"));
            }
            other => panic!("expected engine error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn successful_run_reads_output_pdf() {
        use std::os::unix::fs::PermissionsExt;

        // Stand-in engine that writes a PDF to the --print-to-pdf path.
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-engine");
        std::fs::write(
            &script,
            "#!/bin/sh\nfor a in \"$@\"; do case \"$a\" in --print-to-pdf=*) \
             printf '%%PDF-1.4 fake' > \"${a#--print-to-pdf=}\";; esac; done\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let engine = Engine::with_path(script, EngineConfig::default());
        let pdf = engine.render_pdf("<html></html>").await.unwrap();
        assert!(pdf.starts_with(b"%PDF-"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hard_timeout_kills_the_child() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-engine");
        std::fs::write(&script, "#!/bin/sh\nsleep 60\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = EngineConfig {
            hard_timeout: Duration::from_millis(200),
            ..EngineConfig::default()
        };
        let engine = Engine::with_path(script, config);
        let err = engine.render_pdf("<html></html>").await.unwrap_err();
        assert!(matches!(err, ExportError::EngineTimeout(_)));
    }
}
