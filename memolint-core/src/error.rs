use std::path::PathBuf;
use thiserror::Error;

/// Input could not be turned into a document. Raised before any check runs;
/// callers get a hard failure instead of a degraded report.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{id} is not valid UTF-8 (first invalid byte at offset {valid_up_to})")]
    Encoding { id: String, valid_up_to: usize },
    #[error("{id} is empty")]
    Empty { id: String },
}
