//! Context builder – flattens the content tree into the render context.
//!
//! The context is an ordered JSON object assembled fresh on every render:
//! sections in canonical schema order, then a fonts bucket, then the
//! per-section visibility flags. Identical tree + profile input always
//! serializes identically. Sections without effective content are omitted
//! entirely; the template sees no null or empty placeholders.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{Map, Value};

use crate::error::{ExportError, Result};
use crate::sections::{SectionShape, CONFIGURABLE_SECTIONS, SECTIONS};
use crate::template::Profile;
use crate::tree::{FontSizes, NodeId, Tree};

/// The ordered key→value structure fed to the template renderer.
/// Never persisted; rebuilt for each export.
pub type RenderContext = Map<String, Value>;

/// Visibility inputs for the flag pass. Document-level overrides beat
/// template-level defaults; with no override the content decides.
#[derive(Debug, Clone, Default)]
pub struct SectionVisibility {
    pub template_defaults: HashMap<String, bool>,
    pub document_overrides: HashMap<String, bool>,
}

impl SectionVisibility {
    fn resolved(&self, section: &str) -> Option<bool> {
        self.document_overrides
            .get(section)
            .or_else(|| self.template_defaults.get(section))
            .copied()
    }
}

/// Build the render context from a tree, the user profile, font sizes, and
/// visibility configuration.
///
/// Returns [`ExportError::NoContent`] when no section produces any content.
pub fn build_context(
    tree: &Tree,
    profile: Option<&Profile>,
    fonts: &FontSizes,
    visibility: &SectionVisibility,
) -> Result<RenderContext> {
    let mut context = RenderContext::new();
    let root = tree.root();

    for (name, shape) in SECTIONS {
        let section = tree.child_by_name(root, name).filter(|&id| tree.node(id).enabled);
        let value = match section {
            Some(id) => flatten_section(tree, id, *shape),
            None => None,
        };
        if let Some(value) = value {
            context.insert((*name).to_string(), value);
        }
    }

    if let Some(profile) = profile {
        merge_profile(&mut context, profile);
    }

    if context.is_empty() {
        return Err(ExportError::NoContent);
    }

    let font_roles = fonts.roles();
    if !font_roles.is_empty() {
        let mut bucket = Map::new();
        for role in font_roles {
            bucket.insert(role.to_string(), Value::String(fonts.css_value(role)));
        }
        context.insert("fonts".to_string(), Value::Object(bucket));
    }

    for section in CONFIGURABLE_SECTIONS {
        let has_content = context.get(*section).map(is_truthy).unwrap_or(false);
        let shown = has_content && visibility.resolved(section).unwrap_or(true);
        context.insert(format!("show_{section}"), Value::Bool(shown));
    }

    Ok(context)
}

/// Dispatch one section subtree through its shape transform. `None` means
/// the section has no effective content and must be omitted.
fn flatten_section(tree: &Tree, id: NodeId, shape: SectionShape) -> Option<Value> {
    match shape {
        SectionShape::Scalar => {
            let text = concat_values(tree, id);
            (!text.is_empty()).then_some(Value::String(text))
        }
        SectionShape::Array => {
            let items: Vec<Value> = enabled_children(tree, id)
                .filter_map(|c| {
                    let v = tree.node(c).value.trim();
                    (!v.is_empty()).then(|| Value::String(v.to_string()))
                })
                .collect();
            (!items.is_empty()).then_some(Value::Array(items))
        }
        SectionShape::FlatObject => {
            let mut map = Map::new();
            for child in enabled_children(tree, id) {
                let node = tree.node(child);
                let value = node.value.trim();
                if !value.is_empty() {
                    map.insert(node.name.clone(), Value::String(value.to_string()));
                }
            }
            (!map.is_empty()).then_some(Value::Object(map))
        }
        SectionShape::Complex => {
            // A complex section with no children is absent, not an error.
            let entries: Vec<Value> = enabled_children(tree, id)
                .filter_map(|entry| {
                    let mut fields = Map::new();
                    for field in enabled_children(tree, entry) {
                        let node = tree.node(field);
                        let value = node.value.trim();
                        if !value.is_empty() {
                            fields.insert(node.name.clone(), Value::String(value.to_string()));
                        }
                    }
                    (!fields.is_empty()).then_some(Value::Object(fields))
                })
                .collect();
            (!entries.is_empty()).then_some(Value::Array(entries))
        }
        SectionShape::PairedKeys => {
            let pairs: Vec<Value> = enabled_children(tree, id)
                .filter_map(|c| {
                    let node = tree.node(c);
                    let value = node.value.trim();
                    if node.name.is_empty() && value.is_empty() {
                        return None;
                    }
                    let mut pair = Map::new();
                    pair.insert("name".to_string(), Value::String(node.name.clone()));
                    pair.insert("value".to_string(), Value::String(value.to_string()));
                    Some(Value::Object(pair))
                })
                .collect();
            (!pairs.is_empty()).then_some(Value::Array(pairs))
        }
    }
}

fn enabled_children<'a>(tree: &'a Tree, id: NodeId) -> impl Iterator<Item = NodeId> + 'a {
    tree.children(id)
        .iter()
        .copied()
        .filter(move |&c| tree.node(c).enabled)
}

/// Section value plus all descendant values, depth-first, newline-joined.
fn concat_values(tree: &Tree, id: NodeId) -> String {
    let mut parts = Vec::new();
    collect_values(tree, id, &mut parts);
    parts.join("\n")
}

fn collect_values(tree: &Tree, id: NodeId, parts: &mut Vec<String>) {
    let node = tree.node(id);
    if !node.enabled {
        return;
    }
    let value = node.value.trim();
    if !value.is_empty() {
        parts.push(value.to_string());
    }
    for &child in tree.children(id) {
        collect_values(tree, child, parts);
    }
}

/// Merge profile fields into the contact bucket without overwriting values
/// derived from the tree. Picture resolution degrades gracefully: on any
/// failure the key is simply absent.
fn merge_profile(context: &mut RenderContext, profile: &Profile) {
    let mut contact = match context.remove("contact") {
        Some(Value::Object(map)) => map,
        Some(other) => {
            // Shape mismatch from a hand-edited tree; keep the tree's value.
            context.insert("contact".to_string(), other);
            return;
        }
        None => Map::new(),
    };

    let fields = [
        ("name", &profile.name),
        ("email", &profile.email),
        ("phone", &profile.phone),
        ("location", &profile.location),
        ("website", &profile.website),
    ];
    for (key, value) in fields {
        if !value.is_empty() && !contact.contains_key(key) {
            contact.insert(key.to_string(), Value::String(value.clone()));
        }
    }

    if !contact.contains_key("picture") {
        if let Some(path) = &profile.picture_path {
            match std::fs::read(path) {
                Ok(bytes) => {
                    let mime = picture_mime(path.extension().and_then(|e| e.to_str()));
                    let uri = format!("data:{mime};base64,{}", BASE64.encode(&bytes));
                    contact.insert("picture".to_string(), Value::String(uri));
                }
                Err(e) => {
                    log::warn!("profile picture unreadable ({}): {e}", path.display());
                }
            }
        }
    }

    if !contact.is_empty() {
        context.insert("contact".to_string(), Value::Object(contact));
    }
}

fn picture_mime(extension: Option<&str>) -> &'static str {
    match extension.map(|e| e.to_ascii_lowercase()).as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Truthiness for visibility flags: non-empty string/array/object, true
/// boolean, non-zero number.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
