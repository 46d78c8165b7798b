//! Companion shape store: the keyed histogram container next to a datacard.

use std::collections::BTreeMap;
use std::path::Path;

use sc_core::{Histogram, Result};

use crate::parquet_io::{read_parquet_batches, write_parquet};
use crate::table::{histograms_to_record_batch, record_batches_to_histograms};

/// Write `entries` (key → histogram) to a Parquet store, rows sorted by key.
pub fn write_store(path: &Path, entries: &BTreeMap<String, Histogram>) -> Result<()> {
    let rows = entries.iter().map(|(k, h)| (k.as_str(), h));
    let batch = histograms_to_record_batch(rows, Default::default())?;
    write_parquet(path, &[batch])?;
    log::debug!("wrote {} shapes to {}", entries.len(), path.display());
    Ok(())
}

/// Read a store back into key → histogram.
pub fn read_store(path: &Path) -> Result<BTreeMap<String, Histogram>> {
    let hists = record_batches_to_histograms(&read_parquet_batches(path)?)?;
    Ok(hists.into_iter().map(|h| (h.name().to_string(), h)).collect())
}
