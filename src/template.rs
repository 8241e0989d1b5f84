//! Templates and their collaborator seams.
//!
//! A [`Template`] is a persisted HTML/CSS/plain-text triple identified by a
//! slug. The export pipeline consumes templates through the
//! [`TemplateStore`] trait so the orchestrator does not care whether they
//! live in memory, on disk, or behind an application database.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// A persisted render template.
#[derive(Debug, Clone)]
pub struct Template {
    /// Unique identifier, e.g. "modern".
    pub slug: String,
    /// Display name.
    pub name: String,
    /// HTML body. `None` models a stale record whose body was lost; the
    /// orchestrator answers that with the custom-template fallback.
    pub html: Option<String>,
    /// CSS injected into the rendered HTML.
    pub css: Option<String>,
    /// Plain-text body; when absent the generic text layout is used.
    pub text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// True for user-supplied templates persisted via the fallback prompt.
    pub is_custom: bool,
    pub is_default: bool,
    /// Template-level visibility defaults per configurable section.
    pub section_defaults: HashMap<String, bool>,
}

impl Template {
    /// New template with bodies and current timestamps.
    pub fn new(slug: &str, name: &str, html: Option<String>, css: Option<String>, text: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            slug: slug.to_string(),
            name: name.to_string(),
            html,
            css,
            text,
            created_at: now,
            updated_at: now,
            is_custom: false,
            is_default: false,
            section_defaults: HashMap::new(),
        }
    }
}

/// Store of persisted templates consumed by the export orchestrator.
pub trait TemplateStore {
    fn template(&self, slug: &str) -> Option<Template>;
    fn default_template(&self) -> Option<Template>;
    fn html_content(&self, slug: &str) -> Option<String>;
    fn css_content(&self, slug: &str) -> Option<String>;
    fn text_content(&self, slug: &str) -> Option<String>;
    /// Insert or replace by slug, refreshing `updated_at`.
    fn upsert(&mut self, template: Template);
    /// Delete by slug. Documents holding the slug re-resolve on their next
    /// export, which is how deletion "nulls" their references.
    fn remove(&mut self, slug: &str);
}

/// In-memory template store.
#[derive(Debug, Default)]
pub struct MemoryTemplateStore {
    templates: Vec<Template>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_templates(templates: Vec<Template>) -> Self {
        Self { templates }
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl TemplateStore for MemoryTemplateStore {
    fn template(&self, slug: &str) -> Option<Template> {
        self.templates.iter().find(|t| t.slug == slug).cloned()
    }

    fn default_template(&self) -> Option<Template> {
        self.templates.iter().find(|t| t.is_default).cloned()
    }

    fn html_content(&self, slug: &str) -> Option<String> {
        self.template(slug).and_then(|t| t.html)
    }

    fn css_content(&self, slug: &str) -> Option<String> {
        self.template(slug).and_then(|t| t.css)
    }

    fn text_content(&self, slug: &str) -> Option<String> {
        self.template(slug).and_then(|t| t.text)
    }

    fn upsert(&mut self, mut template: Template) {
        template.updated_at = Utc::now();
        if let Some(existing) = self.templates.iter_mut().find(|t| t.slug == template.slug) {
            template.created_at = existing.created_at;
            *existing = template;
        } else {
            self.templates.push(template);
        }
    }

    fn remove(&mut self, slug: &str) {
        self.templates.retain(|t| t.slug != slug);
    }
}

// ---------------------------------------------------------------------------
// Directory-backed loading
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Catalog {
    #[serde(default)]
    templates: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    slug: String,
    name: String,
    #[serde(rename = "isDefault", default)]
    is_default: bool,
}

/// Load templates from a directory laid out as
/// `catalog.json` + `<slug>/<slug>.html|.css|.txt`.
///
/// Missing body files load as `None` rather than failing, matching the
/// stale-record semantics of [`Template::html`].
pub fn load_template_dir(dir: &Path) -> io::Result<MemoryTemplateStore> {
    let catalog_path = dir.join("catalog.json");
    let raw = fs::read_to_string(&catalog_path)?;
    let catalog: Catalog = serde_json::from_str(&raw)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let mut templates = Vec::with_capacity(catalog.templates.len());
    for entry in catalog.templates {
        let base = dir.join(&entry.slug);
        let read = |ext: &str| fs::read_to_string(base.join(format!("{}.{ext}", entry.slug))).ok();
        let mut template = Template::new(
            &entry.slug,
            &entry.name,
            read("html"),
            read("css"),
            read("txt"),
        );
        template.is_default = entry.is_default;
        templates.push(template);
    }
    log::debug!("loaded {} templates from {}", templates.len(), dir.display());
    Ok(MemoryTemplateStore::with_templates(templates))
}

// ---------------------------------------------------------------------------
// Profile provider
// ---------------------------------------------------------------------------

/// The user's profile, merged into the context's contact bucket.
#[derive(Debug, Clone, Default)]
pub struct Profile {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub location: String,
    pub website: String,
    /// Path to a profile picture, inlined as a data URI when readable.
    pub picture_path: Option<PathBuf>,
}

/// Source of the current user profile.
pub trait ProfileProvider {
    fn current_profile(&self) -> Option<Profile>;
}

/// Provider returning a fixed profile (or none).
#[derive(Debug, Default)]
pub struct StaticProfileProvider {
    pub profile: Option<Profile>,
}

impl ProfileProvider for StaticProfileProvider {
    fn current_profile(&self) -> Option<Profile> {
        self.profile.clone()
    }
}

// ---------------------------------------------------------------------------
// Custom-template fallback seam
// ---------------------------------------------------------------------------

/// Replacement bodies supplied through the fallback prompt.
#[derive(Debug, Clone)]
pub struct CustomTemplate {
    pub html: String,
    pub css: Option<String>,
}

/// Asked for a custom HTML/CSS template exactly once when the resolved
/// template's body turns out to be missing. Returning `None` declines.
pub trait CustomTemplateSource {
    fn provide(&mut self) -> Option<CustomTemplate>;
}

/// Source that always declines, for headless/CLI use.
#[derive(Debug, Default)]
pub struct NoCustomTemplate;

impl CustomTemplateSource for NoCustomTemplate {
    fn provide(&mut self) -> Option<CustomTemplate> {
        None
    }
}
