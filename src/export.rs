//! Export orchestrator – ties the pipeline stages into one call.
//!
//! `export` resolves the applicable template (falling back to the store
//! default, then one-shot to a caller-supplied custom template), builds the
//! context, renders and inlines the HTML, drives the engine subprocess, and
//! produces the plain-text companion. Both outputs are committed to the
//! document only on full success; any failure leaves the document's prior
//! export artifacts untouched.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::context::{build_context, RenderContext, SectionVisibility};
use crate::engine::Engine;
use crate::error::{ExportError, Result};
use crate::inline::{FontFetcher, FontInliner};
use crate::render::{render, render_text_fallback};
use crate::template::{
    CustomTemplateSource, ProfileProvider, Template, TemplateStore,
};
use crate::translate::translate;
use crate::tree::{FontSizes, Tree};

/// A resume document: the content tree plus export state.
#[derive(Debug, Clone)]
pub struct Document {
    pub tree: Tree,
    pub font_sizes: FontSizes,
    /// Slug of the template last used; re-resolved when the store no
    /// longer knows it.
    pub template_slug: Option<String>,
    /// Document-level visibility overrides; beat template defaults.
    pub section_overrides: HashMap<String, bool>,
    /// Last successful export artifacts. Updated atomically as a pair.
    pub exported_pdf: Option<Vec<u8>>,
    pub exported_text: Option<String>,
}

impl Document {
    pub fn new(tree: Tree) -> Self {
        Self {
            tree,
            font_sizes: FontSizes::new(),
            template_slug: None,
            section_overrides: HashMap::new(),
            exported_pdf: None,
            exported_text: None,
        }
    }
}

/// Transient output pair; committed to the document only on full success.
#[derive(Debug, Clone)]
pub struct ExportResult {
    pub pdf: Vec<u8>,
    pub text: String,
}

/// Orchestrator configuration.
#[derive(Debug, Clone, Default)]
pub struct ExportConfig {
    /// Write rendered HTML snapshots for debugging template output.
    pub debug_html: bool,
    /// Where snapshots land; defaults to the current directory.
    pub debug_dir: Option<PathBuf>,
}

/// Drives the full export pipeline for one document at a time. Concurrent
/// exports of different documents use independent `Exporter` values; there
/// is no shared mutable state between them.
pub struct Exporter<S, P, F>
where
    S: TemplateStore,
    P: ProfileProvider,
    F: FontFetcher,
{
    store: S,
    profiles: P,
    engine: Engine,
    inliner: FontInliner<F>,
    config: ExportConfig,
}

impl<S, P, F> Exporter<S, P, F>
where
    S: TemplateStore,
    P: ProfileProvider,
    F: FontFetcher,
{
    pub fn new(
        store: S,
        profiles: P,
        engine: Engine,
        inliner: FontInliner<F>,
        config: ExportConfig,
    ) -> Self {
        Self {
            store,
            profiles,
            engine,
            inliner,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Export a document to PDF and plain text.
    ///
    /// On success both artifacts are committed to the document; on any
    /// failure the document is left exactly as it was.
    pub async fn export(
        &mut self,
        document: &mut Document,
        custom_source: &mut dyn CustomTemplateSource,
    ) -> Result<ExportResult> {
        let mut template = self.resolve_template(document)?;
        log::debug!("exporting with template '{}'", template.slug);

        let profile = self.profiles.current_profile();
        let visibility = SectionVisibility {
            template_defaults: template.section_defaults.clone(),
            document_overrides: document.section_overrides.clone(),
        };
        let context = build_context(
            &document.tree,
            profile.as_ref(),
            &document.font_sizes,
            &visibility,
        )?;

        let pdf = match self.generate_pdf(&template, &context).await {
            Ok(pdf) => pdf,
            Err(e) if e.is_template_body_missing() => {
                // The only automatic retry: ask for a custom template and
                // try again exactly once.
                let Some(replacement) = custom_source.provide() else {
                    return Err(e);
                };
                template = self.persist_custom(&template, replacement);
                document.template_slug = Some(template.slug.clone());
                self.generate_pdf(&template, &context).await?
            }
            Err(e) => return Err(e),
        };

        let text = match &template.text {
            Some(body) => {
                let (translated, warnings) = translate(body);
                log_warnings(&template.slug, "text", &warnings);
                render(&translated, &context)?
            }
            None => render_text_fallback(&context),
        };

        document.exported_pdf = Some(pdf.clone());
        document.exported_text = Some(text.clone());
        Ok(ExportResult { pdf, text })
    }

    /// Resolve the document's template, falling back to the store default.
    /// The default's visibility defaults are applied onto the document's
    /// unset overrides.
    fn resolve_template(&self, document: &mut Document) -> Result<Template> {
        if let Some(slug) = document.template_slug.as_deref() {
            if let Some(template) = self.store.template(slug) {
                return Ok(template);
            }
            log::debug!("template '{slug}' no longer in store; falling back to default");
        }
        let default = self.store.default_template().ok_or(ExportError::NoTemplates)?;
        for (section, shown) in &default.section_defaults {
            document
                .section_overrides
                .entry(section.clone())
                .or_insert(*shown);
        }
        document.template_slug = Some(default.slug.clone());
        Ok(default)
    }

    async fn generate_pdf(&self, template: &Template, context: &RenderContext) -> Result<Vec<u8>> {
        let body = template
            .html
            .as_deref()
            .ok_or_else(|| ExportError::TemplateBodyMissing(template.slug.clone()))?;

        let (translated, warnings) = translate(body);
        log_warnings(&template.slug, "html", &warnings);
        let rendered = render(&translated, context)?;
        let html = compose_html(&rendered, template.css.as_deref());

        self.write_debug_snapshot(&template.slug, "pdf", &html);

        let inlined = self.inliner.inline(&html).await;
        self.engine.render_pdf(&inlined).await
    }

    /// Persist a caller-supplied replacement template and hand it back.
    fn persist_custom(
        &mut self,
        stale: &Template,
        replacement: crate::template::CustomTemplate,
    ) -> Template {
        let slug = format!("{}-custom", stale.slug);
        let mut template = Template::new(
            &slug,
            &format!("{} (custom)", stale.name),
            Some(replacement.html),
            replacement.css,
            stale.text.clone(),
        );
        template.is_custom = true;
        template.section_defaults = stale.section_defaults.clone();
        self.store.upsert(template.clone());
        log::debug!("persisted custom template '{slug}'");
        template
    }

    /// Debug snapshots are best-effort; a write failure never fails the
    /// export.
    fn write_debug_snapshot(&self, slug: &str, format: &str, html: &str) {
        if !self.config.debug_html {
            return;
        }
        let dir = self
            .config
            .debug_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        let name = format!(
            "debug_resume_{slug}_{format}_{}.html",
            chrono::Utc::now().timestamp()
        );
        let path = dir.join(name);
        if let Err(e) = std::fs::write(&path, html) {
            log::warn!("debug snapshot write failed ({}): {e}", path.display());
        }
    }
}

/// Inject template CSS into the rendered HTML. Bodies with a `</head>` get
/// the style block there; fragments get it prepended.
fn compose_html(rendered: &str, css: Option<&str>) -> String {
    let Some(css) = css.filter(|c| !c.is_empty()) else {
        return rendered.to_string();
    };
    let style = format!("<style>\n{css}\n</style>");
    match rendered.find("</head>") {
        Some(pos) => {
            let mut out = String::with_capacity(rendered.len() + style.len());
            out.push_str(&rendered[..pos]);
            out.push_str(&style);
            out.push_str(&rendered[pos..]);
            out
        }
        None => format!("{style}\n{rendered}"),
    }
}

fn log_warnings(slug: &str, kind: &str, warnings: &[crate::translate::TranslationWarning]) {
    for warning in warnings {
        log::warn!(
            "template '{slug}' ({kind}) at byte {}: {}",
            warning.offset,
            warning.message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_injects_into_head() {
        let html = "<html><head><title>x</title></head><body/></html>";
        let out = compose_html(html, Some("body { margin: 0; }"));
        assert!(out.contains("<style>\nbody { margin: 0; }\n</style></head>"));
    }

    #[test]
    fn compose_prepends_for_fragments() {
        let out = compose_html("<div/>", Some("p {}"));
        assert!(out.starts_with("<style>"));
        assert!(out.ends_with("<div/>"));
    }

    #[test]
    fn compose_without_css_is_identity() {
        assert_eq!(compose_html("<div/>", None), "<div/>");
        assert_eq!(compose_html("<div/>", Some("")), "<div/>");
    }
}
