use thiserror::Error;

/// Errors raised while parsing BLAST tabular input or computing coverage
#[derive(Error, Debug)]
pub enum CoverageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Input line that cannot be turned into a valid record. Fatal for the whole run.
    #[error("Malformed record at line {line_no}: {reason}\n  offending line: {line:?}")]
    MalformedRecord {
        line_no: usize,
        line: String,
        reason: String,
    },

    #[error("Precondition violated: {0}")]
    Precondition(String),
}

impl CoverageError {
    pub fn malformed(line_no: usize, line: &str, reason: impl Into<String>) -> Self {
        CoverageError::MalformedRecord {
            line_no,
            line: line.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, CoverageError::MalformedRecord { .. })
    }
}

pub type Result<T> = std::result::Result<T, CoverageError>;
