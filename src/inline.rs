//! Font inliner – embeds remote web fonts for offline rendering.
//!
//! Rendered HTML may carry `@import url(...)` statements pointing at web
//! font hosts. The headless engine runs with no network, so each import is
//! resolved ahead of time: fetch the stylesheet, fetch every font binary it
//! references, and splice the stylesheet back in with the binaries as
//! base64 data URIs. Every fetch failure is soft – the original reference
//! stays in place and the export continues. Replacements run
//! last-match-to-first so earlier byte offsets stay valid.

use std::sync::OnceLock;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use regex::Regex;
use tokio::time::Instant;

use crate::error::{ExportError, Result};

/// Hosts whose stylesheets we are willing to inline.
const FONT_HOSTS: &[&str] = &[
    "fonts.googleapis.com",
    "fonts.gstatic.com",
    "use.typekit.net",
];

/// Font hosts vary their response format by declared client; ask as a
/// desktop browser so we get plain `@font-face` CSS with direct URLs.
const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Per-request timeout for stylesheet and binary fetches.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Overall budget for one document's inlining pass; imports not processed
/// before it expires are simply left un-inlined.
const INLINE_BUDGET: Duration = Duration::from_secs(10);

fn import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"@import\s+url\(\s*['"]?(https?://[^'")]+)['"]?\s*\)\s*;?"#)
            .expect("static regex")
    })
}

fn font_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"url\(\s*['"]?(https?://[^'")\s]+)['"]?\s*\)"#).expect("static regex")
    })
}

/// A fetched remote resource.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub bytes: Vec<u8>,
    /// Content-Type response header, if the server sent one.
    pub content_type: Option<String>,
}

/// Network seam for the inliner. The production implementation goes through
/// reqwest; tests substitute a map-backed fake.
pub trait FontFetcher {
    fn fetch(&self, url: &str) -> impl std::future::Future<Output = Result<Fetched>> + Send;
}

/// HTTPS fetcher with the desktop user-agent and per-request timeout.
pub struct HttpFontFetcher {
    client: reqwest::Client,
}

impl HttpFontFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(DESKTOP_USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ExportError::FontFetch(e.to_string()))?;
        Ok(Self { client })
    }
}

impl FontFetcher for HttpFontFetcher {
    async fn fetch(&self, url: &str) -> Result<Fetched> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ExportError::FontFetch(format!("{url}: {e}")))?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ExportError::FontFetch(format!("{url}: {e}")))?;
        Ok(Fetched {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}

/// Rewrites remote font references in rendered HTML into embedded data
/// URIs. Idempotent: a second pass over its own output is a no-op.
pub struct FontInliner<F: FontFetcher> {
    fetcher: F,
    budget: Duration,
}

impl<F: FontFetcher> FontInliner<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            budget: INLINE_BUDGET,
        }
    }

    pub fn with_budget(fetcher: F, budget: Duration) -> Self {
        Self { fetcher, budget }
    }

    /// Inline every known-host `@import` in `html`. Never fails: anything
    /// that cannot be fetched in time is left as it was.
    pub async fn inline(&self, html: &str) -> String {
        let imports: Vec<(std::ops::Range<usize>, String)> = import_re()
            .captures_iter(html)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let url = caps.get(1)?.as_str();
                is_known_host(url).then(|| (whole.range(), url.to_string()))
            })
            .collect();
        if imports.is_empty() {
            return html.to_string();
        }

        let deadline = Instant::now() + self.budget;

        // Resolve stylesheets first, then splice back-to-front so the
        // recorded ranges stay valid.
        let mut replacements: Vec<(std::ops::Range<usize>, String)> = Vec::new();
        for (range, url) in imports {
            if Instant::now() >= deadline {
                log::warn!("font inlining budget exhausted; leaving '{url}' as-is");
                continue;
            }
            match self.resolve_stylesheet(&url, deadline).await {
                Some(css) => replacements.push((range, css)),
                None => {} // soft failure, reference retained
            }
        }

        let mut out = html.to_string();
        for (range, css) in replacements.into_iter().rev() {
            out.replace_range(range, &css);
        }
        out
    }

    /// Fetch one stylesheet and embed its font binaries. `None` on any
    /// stylesheet-level failure.
    async fn resolve_stylesheet(&self, url: &str, deadline: Instant) -> Option<String> {
        let css = match self.fetch_within(url, deadline).await {
            Ok(fetched) => String::from_utf8_lossy(&fetched.bytes).into_owned(),
            Err(e) => {
                log::warn!("font stylesheet fetch failed, keeping @import: {e}");
                return None;
            }
        };

        let fonts: Vec<(std::ops::Range<usize>, String)> = font_url_re()
            .captures_iter(&css)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                Some((whole.range(), caps.get(1)?.as_str().to_string()))
            })
            .collect();

        let mut replacements: Vec<(std::ops::Range<usize>, String)> = Vec::new();
        for (range, font_url) in fonts {
            if Instant::now() >= deadline {
                log::warn!("font inlining budget exhausted; leaving '{font_url}' remote");
                break;
            }
            match self.fetch_within(&font_url, deadline).await {
                Ok(fetched) => {
                    let mime = font_mime(&font_url, fetched.content_type.as_deref());
                    let data = BASE64.encode(&fetched.bytes);
                    replacements.push((range, format!("url(data:{mime};base64,{data})")));
                }
                Err(e) => {
                    log::warn!("font binary fetch failed, keeping remote url: {e}");
                }
            }
        }

        let mut out = css;
        for (range, data_url) in replacements.into_iter().rev() {
            out.replace_range(range, &data_url);
        }
        Some(out)
    }

    async fn fetch_within(&self, url: &str, deadline: Instant) -> Result<Fetched> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        tokio::time::timeout(remaining, self.fetcher.fetch(url))
            .await
            .map_err(|_| ExportError::FontFetch(format!("{url}: inlining budget exceeded")))?
    }
}

/// Exact host-component match against [`FONT_HOSTS`]. A prefix match would
/// also accept lookalike domains such as `fonts.googleapis.com.evil.test`.
fn is_known_host(url: &str) -> bool {
    let Some(rest) = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
    else {
        return false;
    };
    let authority = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    let host = authority.split(':').next().unwrap_or(authority);
    FONT_HOSTS.iter().any(|known| host.eq_ignore_ascii_case(known))
}

/// MIME type for a font binary: response header first, extension second.
fn font_mime(url: &str, content_type: Option<&str>) -> String {
    if let Some(ct) = content_type {
        let ct = ct.split(';').next().unwrap_or(ct).trim();
        if !ct.is_empty() && ct != "application/octet-stream" {
            return ct.to_string();
        }
    }
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    match ext.as_str() {
        "woff2" => "font/woff2",
        "woff" => "font/woff",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "eot" => "application/vnd.ms-fontobject",
        _ => "application/octet-stream",
    }
    .to_string()
}
