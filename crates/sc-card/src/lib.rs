//! # sc-card
//!
//! Turns normalized histograms into datacards.
//!
//! The pipeline per card is:
//!
//! 1. [`Normalizer`] computes a per-source scale from the cross-section
//!    table, the luminosity and the generator weight sum.
//! 2. [`DataGroup::aggregate`] selects, cleans, scales, rebins and
//!    accumulates the histograms of one process across its sources, and in
//!    multi-category mode concatenates categories with the [`CategoryMerger`].
//! 3. [`Datacard`] collects nominals and nuisances and dumps the transcript
//!    together with its companion shape store.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aggregator;
pub mod catalogue;
pub mod datacard;
pub mod merger;
pub mod normalizer;
pub mod output;
pub mod rate_table;

pub use aggregator::{
    AggregatorConfig, CategoryAliases, CategoryFilter, DATA_OBS, DataGroup, Shape, ShapeKey,
};
pub use catalogue::HistogramCatalogue;
pub use datacard::{CardState, Datacard, NuisanceKind, nuisance_label};
pub use merger::CategoryMerger;
pub use normalizer::{CrossSection, CrossSectionTable, Normalizer, PB_TO_FB};
pub use output::prepare_output_dir;
pub use rate_table::RateTable;
