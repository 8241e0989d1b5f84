//! Template renderer – executes a translated template against the context.
//!
//! The engine is logic-less: literals, `{{variable}}` substitution with
//! dotted paths, sections `{{#key}}…{{/key}}` that iterate arrays / enter
//! objects / gate on truthiness, inverted sections `{{^key}}…{{/key}}`, and
//! a fixed set of pure formatting helpers applied with pipes:
//! `{{summary | wrap:72}}`. Only an unbalanced template is fatal; unknown
//! helpers are skipped with a log warning.

use serde_json::Value;

use crate::context::{is_truthy, RenderContext};
use crate::error::{ExportError, Result};
use crate::sections::{canonical_order, CONFIGURABLE_SECTIONS};

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Node {
    Text(String),
    Variable {
        path: String,
        pipes: Vec<(String, Option<String>)>,
    },
    Section {
        name: String,
        inverted: bool,
        children: Vec<Node>,
    },
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    /// Parse until EOF or until the closer `{{/until}}` is consumed.
    fn parse_nodes(&mut self, until: Option<&str>) -> Result<Vec<Node>> {
        let mut nodes = Vec::new();
        loop {
            let rest = &self.input[self.pos..];
            let Some(open) = rest.find("{{") else {
                if let Some(name) = until {
                    return Err(ExportError::TemplateSyntax(format!(
                        "unclosed section '{{{{#{name}}}}}'"
                    )));
                }
                if !rest.is_empty() {
                    nodes.push(Node::Text(rest.to_string()));
                    self.pos = self.input.len();
                }
                return Ok(nodes);
            };

            if open > 0 {
                nodes.push(Node::Text(rest[..open].to_string()));
            }
            self.pos += open;

            let tag_body = &self.input[self.pos + 2..];
            let Some(close) = tag_body.find("}}") else {
                return Err(ExportError::TemplateSyntax(format!(
                    "unterminated tag at byte {}",
                    self.pos
                )));
            };
            let tag = tag_body[..close].trim().to_string();
            self.pos += 2 + close + 2;

            if let Some(name) = tag.strip_prefix('/') {
                let name = name.trim();
                match until {
                    Some(open_name) if open_name == name => return Ok(nodes),
                    Some(open_name) => {
                        return Err(ExportError::TemplateSyntax(format!(
                            "'{{{{/{name}}}}}' closes '{{{{#{open_name}}}}}'"
                        )))
                    }
                    None => {
                        return Err(ExportError::TemplateSyntax(format!(
                            "'{{{{/{name}}}}}' with no open section"
                        )))
                    }
                }
            }

            if let Some(name) = tag.strip_prefix('#') {
                let name = name.trim().to_string();
                let children = self.parse_nodes(Some(&name))?;
                nodes.push(Node::Section {
                    name,
                    inverted: false,
                    children,
                });
                continue;
            }
            if let Some(name) = tag.strip_prefix('^') {
                let name = name.trim().to_string();
                let children = self.parse_nodes(Some(&name))?;
                nodes.push(Node::Section {
                    name,
                    inverted: true,
                    children,
                });
                continue;
            }

            nodes.push(parse_variable(&tag));
        }
    }
}

fn parse_variable(tag: &str) -> Node {
    let mut parts = tag.split('|');
    let path = parts.next().unwrap_or_default().trim().to_string();
    let pipes = parts
        .map(|p| {
            let p = p.trim();
            match p.split_once(':') {
                Some((name, arg)) => (name.trim().to_string(), Some(arg.trim().to_string())),
                None => (p.to_string(), None),
            }
        })
        .collect();
    Node::Variable { path, pipes }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Render a translated template against the context.
///
/// Fails only with [`ExportError::TemplateSyntax`] on an unbalanced or
/// unterminated template.
pub fn render(template: &str, context: &RenderContext) -> Result<String> {
    let mut parser = Parser::new(template);
    let nodes = parser.parse_nodes(None)?;
    let mut scopes = vec![Value::Object(context.clone())];
    let mut out = String::with_capacity(template.len());
    eval_nodes(&nodes, &mut scopes, &mut out);
    Ok(out)
}

fn eval_nodes(nodes: &[Node], scopes: &mut Vec<Value>, out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Variable { path, pipes } => {
                if let Some(value) = resolve(path, scopes) {
                    let mut value = value.clone();
                    for (name, arg) in pipes {
                        value = apply_helper(name, arg.as_deref(), value);
                    }
                    out.push_str(&stringify(&value));
                }
            }
            Node::Section {
                name,
                inverted,
                children,
            } => {
                let value = resolve(name, scopes).cloned();
                let truthy = value.as_ref().map(is_truthy).unwrap_or(false);
                if *inverted {
                    if !truthy {
                        eval_nodes(children, scopes, out);
                    }
                    continue;
                }
                match value {
                    Some(Value::Array(items)) if truthy => {
                        for item in items {
                            scopes.push(item);
                            eval_nodes(children, scopes, out);
                            scopes.pop();
                        }
                    }
                    Some(v) if truthy => {
                        scopes.push(v);
                        eval_nodes(children, scopes, out);
                        scopes.pop();
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Resolve a dotted path against the scope stack, innermost first.
/// `.` is the current scope value itself.
fn resolve<'a>(path: &str, scopes: &'a [Value]) -> Option<&'a Value> {
    if path == "." {
        return scopes.last();
    }
    let mut segments = path.split('.');
    let first = segments.next()?;
    for scope in scopes.iter().rev() {
        if let Value::Object(map) = scope {
            if let Some(start) = map.get(first) {
                let mut value = start;
                for segment in segments {
                    match value {
                        Value::Object(map) => value = map.get(segment)?,
                        _ => return None,
                    }
                }
                return Some(value);
            }
        }
    }
    None
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(stringify)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Helpers – pure, stateless formatting functions
// ---------------------------------------------------------------------------

fn apply_helper(name: &str, arg: Option<&str>, value: Value) -> Value {
    match name {
        "wrap" => Value::String(wrap_columns(&stringify(&value), width_arg(arg))),
        "justify" => Value::String(justify_columns(&stringify(&value), width_arg(arg))),
        "center" => Value::String(center_columns(&stringify(&value), width_arg(arg))),
        "bullets" => Value::String(bullet_list(&value, arg.unwrap_or("•"))),
        "date" => Value::String(format_date(&stringify(&value), arg.unwrap_or("%B %Y"))),
        "upper" => Value::String(stringify(&value).to_uppercase()),
        "lower" => Value::String(stringify(&value).to_lowercase()),
        "title" => Value::String(title_case(&stringify(&value))),
        other => {
            log::warn!("unknown template helper '{other}'; skipped");
            value
        }
    }
}

fn width_arg(arg: Option<&str>) -> usize {
    arg.and_then(|a| a.parse().ok()).unwrap_or(80).max(1)
}

/// Greedy word wrap to `width` columns, preserving paragraph breaks.
pub fn wrap_columns(text: &str, width: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    for paragraph in text.split('\n') {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        if words.is_empty() {
            lines.push(String::new());
            continue;
        }
        let mut current = String::new();
        for word in words {
            if current.is_empty() {
                current = word.to_string();
            } else if current.chars().count() + 1 + word.chars().count() <= width {
                current.push(' ');
                current.push_str(word);
            } else {
                lines.push(std::mem::take(&mut current));
                current = word.to_string();
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    lines.join("\n")
}

/// Wrap, then pad inter-word gaps so every full line spans `width` columns.
/// The last line of each paragraph stays ragged.
fn justify_columns(text: &str, width: usize) -> String {
    let wrapped = wrap_columns(text, width);
    let lines: Vec<&str> = wrapped.split('\n').collect();
    let mut out = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        let is_last = i + 1 == lines.len() || lines[i + 1].is_empty();
        out.push(if is_last {
            line.to_string()
        } else {
            justify_line(line, width)
        });
    }
    out.join("\n")
}

fn justify_line(line: &str, width: usize) -> String {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.len() < 2 {
        return line.to_string();
    }
    let chars: usize = words.iter().map(|w| w.chars().count()).sum();
    if chars >= width {
        return line.to_string();
    }
    let gaps = words.len() - 1;
    let spaces = width - chars;
    let base = spaces / gaps;
    let extra = spaces % gaps;
    let mut out = String::with_capacity(width);
    for (i, word) in words.iter().enumerate() {
        out.push_str(word);
        if i < gaps {
            let n = base + usize::from(i < extra);
            out.extend(std::iter::repeat(' ').take(n));
        }
    }
    out
}

/// Wrap, then center each line within `width` columns.
fn center_columns(text: &str, width: usize) -> String {
    wrap_columns(text, width)
        .split('\n')
        .map(|line| {
            let len = line.chars().count();
            if len >= width {
                line.to_string()
            } else {
                format!("{}{line}", " ".repeat((width - len) / 2))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Array → one marker-prefixed line per item; scalars get a single line.
fn bullet_list(value: &Value, marker: &str) -> String {
    let items: Vec<String> = match value {
        Value::Array(items) => items.iter().map(stringify).collect(),
        other => vec![stringify(other)],
    };
    items
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| format!("{marker} {s}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Reformat a date string with a chrono format. Accepts `YYYY-MM-DD`,
/// `YYYY-MM`, and `MM/DD/YYYY` inputs; anything else passes through.
fn format_date(input: &str, format: &str) -> String {
    use chrono::NaiveDate;
    let input = input.trim();
    let parsed = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{input}-01"), "%Y-%m-%d"))
        .or_else(|_| NaiveDate::parse_from_str(input, "%m/%d/%Y"));
    match parsed {
        Ok(date) => date.format(format).to_string(),
        Err(_) => input.to_string(),
    }
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Generic plain-text layout
// ---------------------------------------------------------------------------

const TEXT_WIDTH: usize = 80;

/// Built-in plain-text rendering used when a template has no text body.
/// Walks the context in canonical section order, honoring the visibility
/// flags.
pub fn render_text_fallback(context: &RenderContext) -> String {
    let mut out = String::new();

    if let Some(Value::Object(contact)) = context.get("contact") {
        if let Some(Value::String(name)) = contact.get("name") {
            out.push_str(&center_columns(name, TEXT_WIDTH));
            out.push('\n');
        }
        let line: Vec<String> = ["email", "phone", "location", "website"]
            .iter()
            .filter_map(|k| contact.get(*k))
            .map(stringify)
            .filter(|s| !s.is_empty())
            .collect();
        if !line.is_empty() {
            out.push_str(&center_columns(&line.join(" | "), TEXT_WIDTH));
            out.push('\n');
        }
        out.push('\n');
    }

    for section in canonical_order() {
        if section == "contact" {
            continue;
        }
        let Some(value) = context.get(section) else {
            continue;
        };
        let hidden = CONFIGURABLE_SECTIONS.contains(&section)
            && context
                .get(&format!("show_{section}"))
                .map(|v| !is_truthy(v))
                .unwrap_or(false);
        if hidden {
            continue;
        }

        let heading = section.to_uppercase();
        out.push_str(&heading);
        out.push('\n');
        out.push_str(&"-".repeat(heading.chars().count()));
        out.push('\n');
        out.push_str(&text_for_value(value));
        out.push_str("\n\n");
    }

    out.trim_end().to_string() + "\n"
}

fn text_for_value(value: &Value) -> String {
    match value {
        Value::String(s) => wrap_columns(s, TEXT_WIDTH),
        Value::Array(items) if items.iter().all(|i| i.is_object()) => items
            .iter()
            .map(|entry| match entry {
                Value::Object(fields) => fields
                    .iter()
                    .map(|(k, v)| format!("{}: {}", title_case(k), stringify(v)))
                    .collect::<Vec<_>>()
                    .join("\n"),
                other => stringify(other),
            })
            .collect::<Vec<_>>()
            .join("\n\n"),
        Value::Array(_) => bullet_list(value, "-"),
        Value::Object(fields) => fields
            .iter()
            .map(|(k, v)| format!("{}: {}", title_case(k), stringify(v)))
            .collect::<Vec<_>>()
            .join("\n"),
        other => stringify(other),
    }
}
