//! Core traits for shapecard
//!
//! Aggregation code depends on [`HistogramSource`] rather than on a concrete
//! file format, so Parquet catalogues and in-memory records are interchangeable.

use crate::Result;
use crate::histogram::Histogram;

/// One input container: a histogram catalogue plus its run-level record.
pub trait HistogramSource {
    /// Source label, the process name as spelled in this source's histogram
    /// names (usually the file stem).
    fn label(&self) -> &str;

    /// Generator-level sum of event weights, if the source records one.
    fn gen_event_sumw(&self) -> Option<f64>;

    /// All histograms in the catalogue.
    fn histograms(&self) -> Result<Vec<Histogram>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SourceRecord;

    fn total_of(src: &dyn HistogramSource) -> f64 {
        src.histograms().unwrap().iter().map(Histogram::total).sum()
    }

    #[test]
    fn test_trait_object_dispatch() {
        let h = Histogram::from_counts("obs_ZZ_cat3L", vec![0.0, 1.0], vec![4.0]).unwrap();
        let src = SourceRecord::new("ZZ").with_gen_event_sumw(10.0).with_histogram(h);
        assert_eq!(src.label(), "ZZ");
        assert_eq!(total_of(&src), 4.0);
    }
}
