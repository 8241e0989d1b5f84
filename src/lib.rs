//! # resume-forge – Resume document → PDF/plain-text export pipeline
//!
//! This crate converts a tree-structured resume document into
//! submission-ready output through an HTML/CSS template pipeline backed by
//! a headless browser. The pipeline stages are:
//!
//! 1. **Flatten** – content tree → ordered render context ([`context`])
//! 2. **Translate** – legacy template dialect → renderer syntax ([`translate`])
//! 3. **Render** – logic-less template + pure helpers ([`render`])
//! 4. **Inline** – remote web fonts → embedded data URIs ([`inline`])
//! 5. **Print** – headless engine subprocess → PDF bytes ([`engine`])
//!
//! The [`export`] module ties the stages together with template resolution
//! and fallback behavior.

pub mod context;
pub mod engine;
pub mod error;
pub mod export;
pub mod inline;
pub mod render;
pub mod sections;
pub mod template;
pub mod translate;
pub mod tree;

// Re-exports for convenience
pub use error::{ExportError, Result};
pub use export::{Document, ExportConfig, ExportResult, Exporter};
