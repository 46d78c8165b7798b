//! Error type for histogram table I/O.

/// Error type for Arrow/Parquet histogram tables.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Parquet read/write error
    #[error("Parquet read/write error: {0}")]
    Parquet(#[from] ::parquet::errors::ParquetError),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Required column missing from the table.
    #[error("missing required column: {0}")]
    MissingColumn(String),

    /// Column has an unexpected Arrow type.
    #[error("column '{col}' has wrong type: expected {expected}, got {actual}")]
    WrongType {
        /// Column name.
        col: String,
        /// Expected Arrow type.
        expected: String,
        /// Actual Arrow type.
        actual: String,
    },

    /// A list cell holds null elements.
    #[error("column '{col}' row {row}: {nulls} null value(s)")]
    NullValue {
        /// Column name.
        col: String,
        /// Row index within the batch.
        row: usize,
        /// Number of null elements.
        nulls: usize,
    },

    /// Schema metadata entry present but unparsable.
    #[error("bad metadata '{key}': {value}")]
    Metadata {
        /// Metadata key.
        key: String,
        /// Raw value.
        value: String,
    },

    /// A row does not form a valid histogram.
    #[error("row {row}: {source}")]
    Histogram {
        /// Row index in the table.
        row: usize,
        /// Underlying validation failure.
        source: sc_core::Error,
    },
}

impl From<StoreError> for sc_core::Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Io(io) => sc_core::Error::Io(io),
            other => sc_core::Error::Store(other.to_string()),
        }
    }
}
