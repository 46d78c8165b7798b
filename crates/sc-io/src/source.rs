//! Parquet-backed histogram catalogues (the aggregation inputs).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sc_core::{Error, Histogram, HistogramSource, Result};

use crate::error::StoreError;
use crate::parquet_io::{read_parquet_batches, read_parquet_metadata, write_parquet};
use crate::table::{histograms_to_record_batch, record_batches_to_histograms};

/// Metadata key holding the generator-level sum of event weights.
pub const META_GEN_EVENT_SUMW: &str = "gen_event_sumw";
/// Metadata key holding the generator-level event count.
pub const META_GEN_EVENT_COUNT: &str = "gen_event_count";

/// Run-level record stored alongside a catalogue.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CatalogueMeta {
    /// Generator-level sum of event weights.
    pub gen_event_sumw: Option<f64>,
    /// Generator-level event count.
    pub gen_event_count: Option<u64>,
}

impl CatalogueMeta {
    fn from_schema_metadata(meta: &HashMap<String, String>) -> std::result::Result<Self, StoreError> {
        let gen_event_sumw = meta
            .get(META_GEN_EVENT_SUMW)
            .map(|v| {
                v.trim().parse::<f64>().map_err(|_| StoreError::Metadata {
                    key: META_GEN_EVENT_SUMW.into(),
                    value: v.clone(),
                })
            })
            .transpose()?;
        let gen_event_count = meta
            .get(META_GEN_EVENT_COUNT)
            .map(|v| {
                v.trim().parse::<u64>().map_err(|_| StoreError::Metadata {
                    key: META_GEN_EVENT_COUNT.into(),
                    value: v.clone(),
                })
            })
            .transpose()?;
        Ok(Self { gen_event_sumw, gen_event_count })
    }

    fn to_schema_metadata(self) -> HashMap<String, String> {
        let mut meta = HashMap::new();
        if let Some(sumw) = self.gen_event_sumw {
            meta.insert(META_GEN_EVENT_SUMW.to_string(), format!("{sumw:?}"));
        }
        if let Some(count) = self.gen_event_count {
            meta.insert(META_GEN_EVENT_COUNT.to_string(), count.to_string());
        }
        meta
    }
}

/// Write a source catalogue.
pub fn write_catalogue(path: &Path, histograms: &[Histogram], meta: CatalogueMeta) -> Result<()> {
    let rows = histograms.iter().map(|h| (h.name(), h));
    let batch = histograms_to_record_batch(rows, meta.to_schema_metadata())?;
    write_parquet(path, &[batch])?;
    Ok(())
}

/// Read a source catalogue and its run-level record.
pub fn read_catalogue(path: &Path) -> Result<(Vec<Histogram>, CatalogueMeta)> {
    let meta = CatalogueMeta::from_schema_metadata(&read_parquet_metadata(path)?)?;
    let hists = record_batches_to_histograms(&read_parquet_batches(path)?)?;
    Ok((hists, meta))
}

/// A catalogue file on disk. Histograms are read lazily on each
/// [`HistogramSource::histograms`] call; the run-level record is read on open.
#[derive(Debug, Clone)]
pub struct ParquetSource {
    path: PathBuf,
    label: String,
    meta: CatalogueMeta,
}

impl ParquetSource {
    /// Open a catalogue. The label is the file stem.
    ///
    /// A missing or unreadable file is an [`Error::Source`].
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let label = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::Source(format!("{} has no usable file stem", path.display())))?
            .to_string();
        let meta = read_parquet_metadata(&path)
            .and_then(|m| CatalogueMeta::from_schema_metadata(&m))
            .map_err(|e| Error::Source(format!("{}: {e}", path.display())))?;
        log::debug!("opened source {} (label={label}, meta={meta:?})", path.display());
        Ok(Self { path, label, meta })
    }

    /// File path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run-level record.
    pub fn meta(&self) -> CatalogueMeta {
        self.meta
    }
}

impl HistogramSource for ParquetSource {
    fn label(&self) -> &str {
        &self.label
    }

    fn gen_event_sumw(&self) -> Option<f64> {
        self.meta.gen_event_sumw
    }

    fn histograms(&self) -> Result<Vec<Histogram>> {
        read_parquet_batches(&self.path)
            .and_then(|b| record_batches_to_histograms(&b))
            .map_err(|e| Error::Source(format!("{}: {e}", self.path.display())))
    }
}
