//! # sc-core
//!
//! Core types for shapecard: the binned [`Histogram`] value type, the typed
//! [`HistKey`] used to address histograms inside a process, the
//! [`HistogramSource`] seam implemented by input catalogues, and the shared
//! [`Error`] type.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod histogram;
pub mod key;
pub mod source;
pub mod traits;

pub use error::{Error, Result};
pub use histogram::Histogram;
pub use key::{Direction, HistKey, ProcessType, SystematicMatch};
pub use source::SourceRecord;
pub use traits::HistogramSource;

/// Crate version, shared by every workspace member.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
