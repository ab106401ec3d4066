use std::io;

use thiserror::Error;

/// Failures raised while parsing an HSDT image.
///
/// Every variant is fatal to the parse: a broken header or table invalidates
/// all offsets derived from it, so nothing is skipped or retried.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Malformed header at {position:#x}: {reason}")]
    MalformedHeader { position: u64, reason: String },

    #[error("HSDT magic not found after scanning {scanned} bytes")]
    MagicNotFound { scanned: u64 },

    #[error(
        "Entry table truncated at entry {index}/{count}: needed {expected} bytes at {position:#x}, got {available}"
    )]
    TruncatedTable {
        index: usize,
        count: usize,
        position: u64,
        expected: usize,
        available: usize,
    },

    #[error(
        "{kind} payload truncated at {position:#x}: needed {expected} bytes, got {available}"
    )]
    TruncatedPayload {
        kind: &'static str,
        position: u64,
        expected: usize,
        available: usize,
    },

    #[error("Entry {index} has negative {field} ({value})")]
    InvalidEntry {
        index: usize,
        field: &'static str,
        value: i32,
    },

    #[error("Decompression error: {0}")]
    DecompressionError(#[source] io::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T, E = ParseError> = std::result::Result<T, E>;
