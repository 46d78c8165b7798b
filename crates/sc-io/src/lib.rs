//! # sc-io
//!
//! Parquet I/O for shapecard.
//!
//! Histograms travel as Arrow tables with one row per histogram:
//!
//! | Column     | Type            | Required | Description                        |
//! |------------|-----------------|----------|------------------------------------|
//! | `name`     | `Utf8`          | yes      | Histogram name (or store key)      |
//! | `edges`    | `List<Float64>` | yes      | Bin edges, length n_bins + 1       |
//! | `contents` | `List<Float64>` | yes      | Weighted counts per bin            |
//! | `sumw2`    | `List<Float64>` | no       | Per-bin variances                  |
//!
//! Source catalogues additionally carry the run-level record in the schema
//! metadata (`gen_event_sumw`, `gen_event_count`). The same table layout,
//! keyed by process/variation name, is used for the companion shape store
//! written next to each datacard.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod parquet_io;
pub mod source;
pub mod store;
pub mod table;

pub use error::StoreError;
pub use source::{CatalogueMeta, ParquetSource, read_catalogue, write_catalogue};
pub use store::{read_store, write_store};
