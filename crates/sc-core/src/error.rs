//! Error types for shapecard

use std::path::PathBuf;

use thiserror::Error;

/// shapecard error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// A histogram violates the edges/contents/variances layout.
    #[error("Binning error: {0}")]
    Binning(String),

    /// Two histograms with the same identity have different bin edges.
    #[error("bin edges of '{name}' do not match: {detail}")]
    BinningMismatch {
        /// Histogram name.
        name: String,
        /// Human-readable description of the mismatch.
        detail: String,
    },

    /// Effective cross-section (xsec * kr * br) is not strictly positive.
    #[error("{source_name} has a non-positive cross section ({value})")]
    NonPositiveCrossSection {
        /// Source (sample) label.
        source_name: String,
        /// Effective cross-section in fb.
        value: f64,
    },

    /// Category token missing from the fixed category ordering.
    #[error("category '{0}' is not in the category ordering")]
    UnknownCategory(String),

    /// Malformed or incomplete input source.
    #[error("Source error: {0}")]
    Source(String),

    /// Companion histogram store read/write failure.
    #[error("Store error: {0}")]
    Store(String),

    /// Datacard operation issued in the wrong state.
    #[error("Datacard state error: {0}")]
    CardState(String),

    /// Output directory already exists and recreation was not requested.
    #[error("output directory {} already exists (use force to recreate)", .0.display())]
    OutputExists(PathBuf),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
