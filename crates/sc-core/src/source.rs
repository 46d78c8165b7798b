//! In-memory source record.

use crate::Result;
use crate::histogram::Histogram;
use crate::traits::HistogramSource;

/// A fully loaded source: label, run-level record and histograms.
#[derive(Debug, Clone, Default)]
pub struct SourceRecord {
    /// Source label (process name as spelled in the histogram names).
    pub label: String,
    /// Generator-level sum of event weights.
    pub gen_event_sumw: Option<f64>,
    /// Generator-level event count.
    pub gen_event_count: Option<u64>,
    /// Histogram catalogue.
    pub histograms: Vec<Histogram>,
}

impl SourceRecord {
    /// Create an empty record.
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into(), ..Default::default() }
    }

    /// Set the generator weight sum.
    pub fn with_gen_event_sumw(mut self, sumw: f64) -> Self {
        self.gen_event_sumw = Some(sumw);
        self
    }

    /// Set the generator event count.
    pub fn with_gen_event_count(mut self, count: u64) -> Self {
        self.gen_event_count = Some(count);
        self
    }

    /// Add a histogram to the catalogue.
    pub fn with_histogram(mut self, hist: Histogram) -> Self {
        self.histograms.push(hist);
        self
    }
}

impl HistogramSource for SourceRecord {
    fn label(&self) -> &str {
        &self.label
    }

    fn gen_event_sumw(&self) -> Option<f64> {
        self.gen_event_sumw
    }

    fn histograms(&self) -> Result<Vec<Histogram>> {
        Ok(self.histograms.clone())
    }
}
