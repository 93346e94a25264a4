//! Parse error types.

use std::path::PathBuf;

use thiserror::Error;

/// Unrecoverable failures while reading a statement file.
///
/// Malformed rows never surface here; they are skipped or defaulted.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("statement not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The bytes are not valid in the profile's encoding.
    #[error("{} is not valid {encoding} text", path.display())]
    Encoding {
        path: PathBuf,
        encoding: &'static str,
    },
}
