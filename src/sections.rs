//! Section-type schema – the closed set of resume section shapes.
//!
//! One static table doubles as the canonical ordering list and the shape
//! map, so the two can never disagree on which keys exist. The context
//! builder dispatches on [`SectionShape`]; adding a section means adding a
//! table row, not touching dispatch logic.

/// How a section's subtree flattens into the render context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionShape {
    /// Value plus children concatenated into one string.
    Scalar,
    /// Immediate children become an ordered list of strings.
    Array,
    /// Immediate children become a flat key→value map.
    FlatObject,
    /// Each child becomes an object whose own children are its fields;
    /// supports single or repeated composites (e.g. employment entries).
    Complex,
    /// Children projected to `{name, value}` pairs.
    PairedKeys,
}

/// Canonical section order and shapes. Context output follows this order
/// regardless of child insertion order in the tree.
pub const SECTIONS: &[(&str, SectionShape)] = &[
    ("contact", SectionShape::FlatObject),
    ("summary", SectionShape::Scalar),
    ("skills", SectionShape::Array),
    ("employment", SectionShape::Complex),
    ("education", SectionShape::Complex),
    ("projects", SectionShape::Complex),
    ("certifications", SectionShape::Array),
    ("languages", SectionShape::PairedKeys),
    ("links", SectionShape::PairedKeys),
    ("interests", SectionShape::Array),
];

/// Sections whose visibility can be toggled per document/template. The rest
/// (contact, summary) are always shown when they have content.
pub const CONFIGURABLE_SECTIONS: &[&str] = &[
    "skills",
    "employment",
    "education",
    "projects",
    "certifications",
    "languages",
    "links",
    "interests",
];

/// Shape for a section name, if it is part of the schema.
pub fn shape_of(name: &str) -> Option<SectionShape> {
    SECTIONS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, shape)| *shape)
}

/// Canonical ordering of section keys.
pub fn canonical_order() -> impl Iterator<Item = &'static str> {
    SECTIONS.iter().map(|(n, _)| *n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_and_shape_map_share_keys() {
        // Held by construction, but keep the invariant visible.
        for name in canonical_order() {
            assert!(shape_of(name).is_some(), "section '{name}' has no shape");
        }
        assert_eq!(canonical_order().count(), SECTIONS.len());
    }

    #[test]
    fn configurable_sections_are_known() {
        for name in CONFIGURABLE_SECTIONS {
            assert!(shape_of(name).is_some(), "'{name}' not in schema");
        }
    }

    #[test]
    fn lookup() {
        assert_eq!(shape_of("employment"), Some(SectionShape::Complex));
        assert_eq!(shape_of("languages"), Some(SectionShape::PairedKeys));
        assert_eq!(shape_of("nonexistent"), None);
    }
}
