//! Error types for histcompare.
//!
//! Every variant here is a structural failure: the comparison it occurred in
//! cannot produce a meaningful result and must be abandoned. Statistical soft
//! failures never surface as errors; see `histcompare_stats::goodness_of_fit`.

use std::path::PathBuf;

use thiserror::Error;

/// histcompare error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error tied to a specific file
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Distributions that must share a bin count do not.
    #[error("bin count mismatch in {context}: expected {expected} bins, '{name}' has {found}")]
    BinMismatch {
        context: String,
        name: String,
        expected: usize,
        found: usize,
    },

    /// The loader has no distribution with this category in this source.
    #[error("distribution '{category}' not found in source '{source_id}'")]
    MissingDistribution { source_id: String, category: String },

    /// A source id referenced by the grouping policy or observed selection is not configured.
    #[error("unknown source '{0}'")]
    UnknownSource(String),

    /// A normalization factor could not be derived from the configured exposures.
    #[error("invalid normalization for source '{source_id}': {reason}")]
    InvalidNormalization { source_id: String, reason: String },

    /// Stored bin data is internally inconsistent.
    #[error("invalid distribution '{name}': {reason}")]
    InvalidDistribution { name: String, reason: String },

    /// A configured group lists no members.
    #[error("group '{0}' has no members")]
    EmptyGroup(String),

    /// Nothing to sum.
    #[error("cannot build '{0}' from an empty set of distributions")]
    EmptyAggregate(String),

    /// Configuration is malformed or contradictory.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
