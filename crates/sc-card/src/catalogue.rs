//! Insert-or-accumulate store of histograms keyed by [`HistKey`].

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use sc_core::{HistKey, Histogram, Result};

/// Ordered map `HistKey → Histogram` with additive accumulation.
#[derive(Debug, Clone, Default)]
pub struct HistogramCatalogue {
    entries: BTreeMap<HistKey, Histogram>,
}

impl HistogramCatalogue {
    /// Empty catalogue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `hist`, or add it to the histogram already stored under `key`.
    ///
    /// Accumulating histograms with different edges is an error and leaves
    /// the stored histogram unchanged.
    pub fn insert_or_accumulate(&mut self, key: HistKey, hist: Histogram) -> Result<()> {
        match self.entries.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(hist);
            }
            Entry::Occupied(mut slot) => {
                slot.get_mut().accumulate(&hist)?;
            }
        }
        Ok(())
    }

    /// Histogram stored under `key`.
    pub fn get(&self, key: &HistKey) -> Option<&Histogram> {
        self.entries.get(key)
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&HistKey, &Histogram)> {
        self.entries.iter()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when nothing was inserted.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
