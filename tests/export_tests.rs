//! Integration tests for the export pipeline.
//!
//! These tests validate:
//! - Template resolution and the one-shot custom-template fallback
//! - Atomic commit of export artifacts (no partial writes)
//! - Context content flowing end-to-end into PDF and text output
//! - Error classification for missing templates and engine failures
//!
//! The engine is a stand-in shell script; font fetches go through a fetcher
//! that fails like a dead network (the inliner soft-fails past it).

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use resume_forge::engine::{Engine, EngineConfig};
use resume_forge::error::{ExportError, Result};
use resume_forge::export::{Document, ExportConfig, Exporter};
use resume_forge::inline::{Fetched, FontFetcher, FontInliner};
use resume_forge::template::{
    CustomTemplate, CustomTemplateSource, MemoryTemplateStore, StaticProfileProvider, Template,
    TemplateStore,
};
use resume_forge::tree::Tree;

// =====================================================================
// Helpers
// =====================================================================

/// Fetcher that fails every request; the inliner must soft-fail past it.
struct OfflineFetcher;

impl FontFetcher for OfflineFetcher {
    async fn fetch(&self, url: &str) -> Result<Fetched> {
        Err(ExportError::FontFetch(format!("{url}: offline")))
    }
}

/// Custom-template source that counts how often it is asked.
struct CountingSource {
    provided: Option<CustomTemplate>,
    calls: usize,
}

impl CountingSource {
    fn declining() -> Self {
        Self {
            provided: None,
            calls: 0,
        }
    }

    fn providing(html: &str) -> Self {
        Self {
            provided: Some(CustomTemplate {
                html: html.to_string(),
                css: None,
            }),
            calls: 0,
        }
    }
}

impl CustomTemplateSource for CountingSource {
    fn provide(&mut self) -> Option<CustomTemplate> {
        self.calls += 1;
        self.provided.clone()
    }
}

/// Stand-in engine: writes a PDF marker to the --print-to-pdf path.
fn ok_engine(dir: &std::path::Path) -> Engine {
    let script = dir.join("ok-engine");
    std::fs::write(
        &script,
        "#!/bin/sh\nfor a in \"$@\"; do case \"$a\" in --print-to-pdf=*) \
         printf '%%PDF-1.4 fake' > \"${a#--print-to-pdf=}\";; esac; done\n",
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    Engine::with_path(script, EngineConfig::default())
}

/// Stand-in engine: prints to stderr and exits 1.
fn failing_engine(dir: &std::path::Path) -> Engine {
    let script = dir.join("bad-engine");
    std::fs::write(&script, "#!/bin/sh\necho 'renderer exploded' >&2\nexit 1\n").unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    Engine::with_path(script, EngineConfig::default())
}

fn sample_document() -> Document {
    let mut tree = Tree::new("resume");
    let root = tree.root();
    tree.add_child(root, "summary", "Engineer.");
    let emp = tree.add_child(root, "employment", "");
    let a = tree.add_child(emp, "0", "");
    tree.add_child(a, "employer", "Employer A");
    let b = tree.add_child(emp, "1", "");
    tree.add_child(b, "employer", "Employer B");
    Document::new(tree)
}

fn default_template(html: Option<&str>, text: Option<&str>) -> Template {
    let mut t = Template::new(
        "modern",
        "Modern",
        html.map(|s| s.to_string()),
        None,
        text.map(|s| s.to_string()),
    );
    t.is_default = true;
    t
}

fn exporter(
    store: MemoryTemplateStore,
    engine: Engine,
) -> Exporter<MemoryTemplateStore, StaticProfileProvider, OfflineFetcher> {
    Exporter::new(
        store,
        StaticProfileProvider::default(),
        engine,
        FontInliner::new(OfflineFetcher),
        ExportConfig::default(),
    )
}

// =====================================================================
// Template resolution
// =====================================================================

#[tokio::test]
async fn no_templates_configured_fails_before_engine() {
    // Engine path that would fail loudly if ever launched.
    let engine = Engine::with_path(PathBuf::from("/nonexistent/engine"), EngineConfig::default());
    let mut exporter = exporter(MemoryTemplateStore::new(), engine);
    let mut document = sample_document();

    let err = exporter
        .export(&mut document, &mut CountingSource::declining())
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::NoTemplates));
    assert!(document.exported_pdf.is_none());
}

#[tokio::test]
async fn stale_slug_falls_back_to_default() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = MemoryTemplateStore::new();
    store.upsert(default_template(Some("<html>{{summary}}</html>"), None));
    let mut exporter = exporter(store, ok_engine(dir.path()));

    let mut document = sample_document();
    document.template_slug = Some("deleted-long-ago".to_string());
    exporter
        .export(&mut document, &mut CountingSource::declining())
        .await
        .unwrap();

    assert_eq!(document.template_slug.as_deref(), Some("modern"));
}

#[tokio::test]
async fn default_visibility_defaults_apply_to_document() {
    let dir = tempfile::tempdir().unwrap();
    let mut template = default_template(Some("<html/>"), None);
    template.section_defaults.insert("employment".into(), false);
    let mut store = MemoryTemplateStore::new();
    store.upsert(template);
    let mut exporter = exporter(store, ok_engine(dir.path()));

    let mut document = sample_document();
    exporter
        .export(&mut document, &mut CountingSource::declining())
        .await
        .unwrap();
    assert_eq!(document.section_overrides.get("employment"), Some(&false));
}

// =====================================================================
// Custom-template fallback
// =====================================================================

#[tokio::test]
async fn missing_body_fires_fallback_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = MemoryTemplateStore::new();
    store.upsert(default_template(None, None)); // stale record, body gone
    let mut exporter = exporter(store, ok_engine(dir.path()));

    let mut document = sample_document();
    let mut source = CountingSource::providing("<html>{{summary}}</html>");
    let result = exporter.export(&mut document, &mut source).await.unwrap();

    assert_eq!(source.calls, 1);
    assert!(result.pdf.starts_with(b"%PDF-"));
    // The replacement was persisted and the document now points at it.
    assert_eq!(document.template_slug.as_deref(), Some("modern-custom"));
    assert!(exporter.store().template("modern-custom").unwrap().is_custom);
}

#[tokio::test]
async fn declined_fallback_propagates_missing_body() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = MemoryTemplateStore::new();
    store.upsert(default_template(None, None));
    let mut exporter = exporter(store, ok_engine(dir.path()));

    let mut document = sample_document();
    let mut source = CountingSource::declining();
    let err = exporter.export(&mut document, &mut source).await.unwrap_err();

    assert_eq!(source.calls, 1);
    assert!(matches!(err, ExportError::TemplateBodyMissing(_)));
    assert!(document.exported_pdf.is_none());
}

#[tokio::test]
async fn other_failures_do_not_trigger_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = MemoryTemplateStore::new();
    store.upsert(default_template(Some("<html>{{summary}}</html>"), None));
    let mut exporter = exporter(store, failing_engine(dir.path()));

    let mut document = sample_document();
    let mut source = CountingSource::providing("<html/>");
    let err = exporter.export(&mut document, &mut source).await.unwrap_err();

    assert_eq!(source.calls, 0);
    match err {
        ExportError::Engine { status, stderr } => {
            assert_eq!(status, "1");
            assert!(stderr.contains("renderer exploded"));
        }
        other => panic!("expected engine error, got {other:?}"),
    }
}

// =====================================================================
// Atomic commit
// =====================================================================

#[tokio::test]
async fn text_failure_after_pdf_success_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = MemoryTemplateStore::new();
    // Valid HTML body, malformed text body: PDF step succeeds, text fails.
    store.upsert(default_template(
        Some("<html>{{summary}}</html>"),
        Some("{{#employment}}unclosed"),
    ));
    let mut exporter = exporter(store, ok_engine(dir.path()));

    let mut document = sample_document();
    document.exported_pdf = Some(b"previous pdf".to_vec());
    document.exported_text = Some("previous text".to_string());

    let err = exporter
        .export(&mut document, &mut CountingSource::declining())
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::TemplateSyntax(_)));
    assert_eq!(document.exported_pdf.as_deref(), Some(b"previous pdf".as_ref()));
    assert_eq!(document.exported_text.as_deref(), Some("previous text"));
}

#[tokio::test]
async fn successful_export_commits_both_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = MemoryTemplateStore::new();
    store.upsert(default_template(
        Some("<html>{{#employment}}{{employer}};{{/employment}}</html>"),
        Some("{{#employment}}{{employer}}\n{{/employment}}"),
    ));
    let mut exporter = exporter(store, ok_engine(dir.path()));

    let mut document = sample_document();
    let result = exporter
        .export(&mut document, &mut CountingSource::declining())
        .await
        .unwrap();

    assert!(result.pdf.starts_with(b"%PDF-"));
    // Employment entries stay in sibling order.
    assert_eq!(result.text, "Employer A\nEmployer B\n");
    assert_eq!(document.exported_pdf.as_deref(), Some(result.pdf.as_slice()));
    assert_eq!(document.exported_text.as_deref(), Some(result.text.as_str()));
}

// =====================================================================
// Text companion
// =====================================================================

#[tokio::test]
async fn missing_text_body_uses_generic_layout() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = MemoryTemplateStore::new();
    store.upsert(default_template(Some("<html/>"), None));
    let mut exporter = exporter(store, ok_engine(dir.path()));

    let mut document = sample_document();
    let result = exporter
        .export(&mut document, &mut CountingSource::declining())
        .await
        .unwrap();

    assert!(result.text.contains("SUMMARY"));
    assert!(result.text.contains("Employer A"));
}
