//! Error types shared across the crate.

use thiserror::Error;

/// Errors raised while loading inputs or assembling a tree.
///
/// Unresolvable conflicts during SNV editing are not errors; they are
/// surfaced as entries in the move/failure logs and the run continues.
#[derive(Error, Debug)]
pub enum PhyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("malformed matrix: {0}")]
    MalformedMatrix(String),

    #[error("empty matrix: tree assembly needs at least one column")]
    EmptyMatrix,

    #[error("VCF error: {0}")]
    Vcf(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PhyError {
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PhyError>;
