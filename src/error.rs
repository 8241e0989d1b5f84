//! Error types for the export pipeline.
//!
//! Failures fall into a few kinds with different propagation rules:
//! configuration and process errors are fatal and surfaced verbatim,
//! font-fetch resource errors are recovered locally and never surfaced,
//! a missing template body triggers the one-shot custom-template fallback,
//! and template syntax errors abort the export with the parse diagnostic.

use std::io;
use thiserror::Error;

/// Result type alias for export operations.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Errors that can occur while exporting a document.
#[derive(Error, Debug)]
pub enum ExportError {
    /// The document tree has no root or no usable content.
    #[error("no content to export")]
    NoContent,

    /// Neither the document nor the store has a usable template.
    #[error("no templates configured")]
    NoTemplates,

    /// A template is known to the store but its HTML body is gone.
    /// Triggers the one-time custom-template fallback in the orchestrator.
    #[error("template body missing for '{0}'")]
    TemplateBodyMissing(String),

    /// The template failed to parse (unbalanced sections, bad pipe syntax).
    #[error("template syntax error: {0}")]
    TemplateSyntax(String),

    /// No headless rendering engine could be located on this system.
    #[error("no headless rendering engine found")]
    EngineNotFound,

    /// The engine subprocess failed: non-zero exit or unreadable output.
    #[error("PDF generation failed (exit {status}): {stderr}")]
    Engine {
        /// Exit status description (code or signal).
        status: String,
        /// Captured stderr from the subprocess.
        stderr: String,
    },

    /// The engine subprocess exceeded the external time limit.
    #[error("PDF generation timed out after {0} ms")]
    EngineTimeout(u64),

    /// A network fetch failed during font inlining. Always recovered by the
    /// inliner; never escapes to the orchestrator.
    #[error("font fetch failed: {0}")]
    FontFetch(String),

    /// The export was cancelled by the caller.
    #[error("export cancelled")]
    Cancelled,

    /// I/O error reading or writing pipeline files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ExportError {
    /// True for errors the orchestrator may answer with the custom-template
    /// fallback rather than failing the export outright.
    pub fn is_template_body_missing(&self) -> bool {
        matches!(self, ExportError::TemplateBodyMissing(_))
    }
}
