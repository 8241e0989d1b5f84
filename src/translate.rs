//! Legacy template dialect translator.
//!
//! Stored templates use a handlebars-flavored dialect; the renderer speaks
//! a smaller mustache-style syntax. This pass rewrites the legacy
//! constructs it can and strips the ones it cannot, collecting non-fatal
//! compatibility warnings along the way. Translation never aborts: an
//! actually malformed template is caught later by the renderer's parser.
//!
//! Rewrites:
//! - `{{#each x}}…{{/each}}` → `{{#x}}…{{/x}}`
//! - `{{#if x}}…{{/if}}`     → `{{#x}}…{{/x}}`
//! - `{{#unless x}}…{{/unless}}` → `{{^x}}…{{/x}}`
//! - `{{this}}` → `{{.}}`, `{{this.field}}` → `{{field}}`
//! - `{{{x}}}` → `{{x}}` (output is always raw; warned)
//! - `{{else}}`, `{{> partial}}`, `{{@index}}` → stripped with a warning
//! - `{{! comment }}` → stripped silently

/// A non-fatal compatibility note produced during translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationWarning {
    /// Human-readable description of what was rewritten or dropped.
    pub message: String,
    /// Byte offset of the construct in the raw template.
    pub offset: usize,
}

/// Translate a legacy template into renderer syntax.
pub fn translate(raw: &str) -> (String, Vec<TranslationWarning>) {
    let mut out = String::with_capacity(raw.len());
    let mut warnings = Vec::new();
    // Stack of (legacy keyword, section name) for open blocks.
    let mut blocks: Vec<(&'static str, String)> = Vec::new();
    let mut rest = raw;
    let mut offset = 0usize;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let tag_start = offset + open;
        let after_open = &rest[open..];

        // Triple-stash first so `{{{` is not read as `{{` + `{`.
        let (inner, consumed, triple) = match read_tag(after_open) {
            Some(t) => t,
            None => {
                // Unterminated tag; pass the remainder through untouched.
                out.push_str(after_open);
                rest = "";
                break;
            }
        };

        if triple {
            warnings.push(TranslationWarning {
                message: format!("triple-stash '{{{{{{{inner}}}}}}}' rewritten; output is always raw"),
                offset: tag_start,
            });
        }

        let trimmed = inner.trim();
        rewrite_tag(trimmed, tag_start, &mut out, &mut warnings, &mut blocks);

        rest = &after_open[consumed..];
        offset = tag_start + consumed;
    }
    out.push_str(rest);

    for (keyword, name) in blocks {
        warnings.push(TranslationWarning {
            message: format!("unclosed '{{{{#{keyword} {name}}}}}' block"),
            offset: raw.len(),
        });
    }

    (out, warnings)
}

/// Section name following a legacy block keyword. The keyword must be a
/// whole word: `#iffy` is a native section named "iffy", not `#if fy`.
fn block_name(tag: &str, keyword: &str) -> Option<String> {
    let rest = tag.strip_prefix(keyword)?;
    rest.starts_with(char::is_whitespace)
        .then(|| rest.trim().to_string())
}

/// Read one `{{…}}` or `{{{…}}}` tag at the start of `s`.
/// Returns (inner text, bytes consumed, was_triple).
fn read_tag(s: &str) -> Option<(&str, usize, bool)> {
    if let Some(body) = s.strip_prefix("{{{") {
        let end = body.find("}}}")?;
        return Some((&body[..end], 3 + end + 3, true));
    }
    let body = s.strip_prefix("{{")?;
    let end = body.find("}}")?;
    Some((&body[..end], 2 + end + 2, false))
}

fn rewrite_tag(
    tag: &str,
    offset: usize,
    out: &mut String,
    warnings: &mut Vec<TranslationWarning>,
    blocks: &mut Vec<(&'static str, String)>,
) {
    // Comments vanish without a warning; they carry no output.
    if tag.starts_with('!') {
        return;
    }

    if let Some(name) = block_name(tag, "#each") {
        out.push_str(&format!("{{{{#{name}}}}}"));
        blocks.push(("each", name));
        return;
    }
    if let Some(name) = block_name(tag, "#if") {
        out.push_str(&format!("{{{{#{name}}}}}"));
        blocks.push(("if", name));
        return;
    }
    if let Some(name) = block_name(tag, "#unless") {
        out.push_str(&format!("{{{{^{name}}}}}"));
        blocks.push(("unless", name));
        return;
    }

    if let Some(keyword) = tag.strip_prefix('/') {
        let keyword = keyword.trim();
        if matches!(keyword, "each" | "if" | "unless") {
            match blocks.pop() {
                Some((open_kw, name)) => {
                    if open_kw != keyword {
                        warnings.push(TranslationWarning {
                            message: format!(
                                "'{{{{/{keyword}}}}}' closes a '{{{{#{open_kw}}}}}' block"
                            ),
                            offset,
                        });
                    }
                    out.push_str(&format!("{{{{/{name}}}}}"));
                }
                None => warnings.push(TranslationWarning {
                    message: format!("'{{{{/{keyword}}}}}' with no open block; dropped"),
                    offset,
                }),
            }
            return;
        }
        // Already renderer-native closer; pass through.
        out.push_str(&format!("{{{{/{keyword}}}}}"));
        return;
    }

    if tag == "else" {
        warnings.push(TranslationWarning {
            message: "'{{else}}' has no equivalent; branch dropped".to_string(),
            offset,
        });
        return;
    }

    if let Some(partial) = tag.strip_prefix('>') {
        warnings.push(TranslationWarning {
            message: format!("partial '{{{{>{partial}}}}}' is not supported; dropped"),
            offset,
        });
        return;
    }

    if tag.starts_with('@') {
        warnings.push(TranslationWarning {
            message: format!("loop metadata '{{{{{tag}}}}}' is not supported; dropped"),
            offset,
        });
        return;
    }

    if tag == "this" {
        out.push_str("{{.}}");
        return;
    }
    if let Some(field) = tag.strip_prefix("this.") {
        out.push_str(&format!("{{{{{field}}}}}"));
        return;
    }

    // Variables, pipes, and native sections pass through untouched.
    out.push_str(&format!("{{{{{tag}}}}}"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_block_becomes_section() {
        let (out, warnings) =
            translate("{{#each employment}}<p>{{employer}}</p>{{/each}}");
        assert_eq!(out, "{{#employment}}<p>{{employer}}</p>{{/employment}}");
        assert!(warnings.is_empty());
    }

    #[test]
    fn if_and_unless() {
        let (out, _) = translate("{{#if show_skills}}yes{{/if}}{{#unless skills}}none{{/unless}}");
        assert_eq!(out, "{{#show_skills}}yes{{/show_skills}}{{^skills}}none{{/skills}}");
    }

    #[test]
    fn nested_blocks_close_in_order() {
        let (out, warnings) =
            translate("{{#each employment}}{{#if role}}{{role}}{{/if}}{{/each}}");
        assert_eq!(out, "{{#employment}}{{#role}}{{role}}{{/role}}{{/employment}}");
        assert!(warnings.is_empty());
    }

    #[test]
    fn this_rewrites() {
        let (out, _) = translate("{{#each skills}}{{this}} {{this.name}}{{/each}}");
        assert_eq!(out, "{{#skills}}{{.}} {{name}}{{/skills}}");
    }

    #[test]
    fn triple_stash_warns() {
        let (out, warnings) = translate("{{{summary}}}");
        assert_eq!(out, "{{summary}}");
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn unsupported_constructs_are_stripped_with_warnings() {
        let (out, warnings) = translate("{{> header}}{{@index}}{{#if x}}a{{else}}b{{/if}}");
        assert_eq!(out, "{{#x}}ab{{/x}}");
        assert_eq!(warnings.len(), 3);
    }

    #[test]
    fn keyword_prefixed_names_pass_through() {
        // Native sections whose names merely start with a legacy keyword
        // must survive untouched, opener and closer alike.
        let (out, warnings) = translate("{{#iffy}}x{{/iffy}}{{#eachone}}y{{/eachone}}");
        assert_eq!(out, "{{#iffy}}x{{/iffy}}{{#eachone}}y{{/eachone}}");
        assert!(warnings.is_empty());
    }

    #[test]
    fn comments_vanish_silently() {
        let (out, warnings) = translate("a{{! note }}b");
        assert_eq!(out, "ab");
        assert!(warnings.is_empty());
    }

    #[test]
    fn never_aborts_on_garbage() {
        let (out, warnings) = translate("{{/each}}{{#each x}}open");
        assert_eq!(out, "{{#x}}open");
        assert_eq!(warnings.len(), 2); // stray closer + unclosed block
    }

    #[test]
    fn unterminated_tag_passes_through() {
        let (out, _) = translate("before {{broken");
        assert_eq!(out, "before {{broken");
    }
}
