//! Error types for the conversion pipeline.
//!
//! [`PipelineError`] aborts a request. [`UploadError`] is scoped to a single
//! file: the uploader logs and counts it, the request carries on.

use serde_json::{json, Value};
use std::path::PathBuf;
use thiserror::Error;

/// Caller-facing failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InputValidation,
    Acquisition,
    Conversion,
    Persistence,
    Internal,
}

impl ErrorCategory {
    pub fn code(self) -> &'static str {
        match self {
            ErrorCategory::InputValidation => "ERR_INPUT_INVALID",
            ErrorCategory::Acquisition => "ERR_ACQUISITION",
            ErrorCategory::Conversion => "ERR_CONVERSION",
            ErrorCategory::Persistence => "ERR_PERSISTENCE",
            ErrorCategory::Internal => "ERR_INTERNAL",
        }
    }
}

/// Fatal errors: the request fails and the caller sees a single message.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Input ─────────────────────────────────────────────────────────────
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ── Acquisition ───────────────────────────────────────────────────────
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("Failed to create temporary file for '{url}': {source}")]
    TempFile {
        url: String,
        #[source]
        source: std::io::Error,
    },

    // ── Conversion ────────────────────────────────────────────────────────
    #[error("Failed to bind to pdfium library: {0} (set PDFIUM_LIB_PATH or pass --pdfium-lib-path)")]
    PdfiumBinding(String),

    #[error("Failed to convert PDF '{path}': {detail}")]
    Rasterization { path: PathBuf, detail: String },

    #[error("No pages were generated from PDF '{path}'")]
    NoPages { path: PathBuf },

    // ── Persistence ───────────────────────────────────────────────────────
    #[error("Failed to create output directory '{path}': {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write '{path}' ({written} page(s) already written): {source}")]
    PageWrite {
        path: PathBuf,
        written: usize,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            PipelineError::InvalidInput(_) => ErrorCategory::InputValidation,
            PipelineError::DownloadFailed { .. } | PipelineError::TempFile { .. } => {
                ErrorCategory::Acquisition
            }
            PipelineError::PdfiumBinding(_)
            | PipelineError::Rasterization { .. }
            | PipelineError::NoPages { .. } => ErrorCategory::Conversion,
            PipelineError::OutputDir { .. } | PipelineError::PageWrite { .. } => {
                ErrorCategory::Persistence
            }
            PipelineError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Renders the error as tool output: a human line, then a JSON object
    /// with `code`, `message` and `details`.
    pub fn to_payload(&self, details: Value) -> String {
        build_error_payload(self.category().code(), &self.to_string(), details)
    }
}

/// Per-file upload failure. Never escalated to a request-level error.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid MIME type '{0}'")]
    Mime(String),

    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// First line: short human-readable message. Then a JSON object with
/// `code`, `message` and `details`.
pub fn build_error_payload(code: &str, message: &str, details: Value) -> String {
    let obj = json!({
        "code": code,
        "message": message,
        "details": details,
    });
    let mut out = String::new();
    out.push_str(message);
    out.push('\n');
    out.push_str(&obj.to_string());
    out
}
