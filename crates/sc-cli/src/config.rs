//! Card and batch configuration (YAML).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use sc_card::{AggregatorConfig, CategoryFilter, CrossSectionTable};
use sc_core::ProcessType;

/// One datacard: which sources go into which process, and which nuisances
/// to attach.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CardConfig {
    /// Card name; output goes to `cards-{name}/`.
    pub name: String,
    /// Channel (bin) name written in the card.
    pub channel: String,
    /// Observable token selecting histograms (e.g. `measMET`).
    pub observable: String,
    /// Target integrated luminosity (fb⁻¹).
    pub luminosity: f64,
    /// One category token, or a list to merge.
    pub categories: Categories,
    /// Category ordering for merging; defaults to the canonicalized list.
    #[serde(default)]
    pub category_order: Option<Vec<String>>,
    /// Half-open `[start, end)` bin index range kept from every input.
    #[serde(default)]
    pub bin_range: Option<[usize; 2]>,
    /// Adjacent-bin grouping factor.
    #[serde(default = "default_rebin")]
    pub rebin: usize,
    /// Cross-section table (YAML), relative to this file.
    pub xsections: PathBuf,
    /// Process groups. Signals are placed first in the card.
    pub groups: Vec<GroupConfig>,
    #[serde(default)]
    pub flat_nuisances: Vec<FlatNuisanceConfig>,
    #[serde(default)]
    pub shape_nuisances: Vec<ShapeNuisanceConfig>,
    #[serde(default)]
    pub rate_params: Vec<RateParamConfig>,
    /// Add the `autoMCStats` directive.
    #[serde(default)]
    pub auto_stat: bool,
    /// Also write `histograms-{group}.parquet` for every group.
    #[serde(default)]
    pub save_groups: bool,
}

fn default_rebin() -> usize {
    1
}

fn default_kfactor() -> f64 {
    1.0
}

fn default_vmin() -> f64 {
    0.1
}

fn default_vmax() -> f64 {
    10.0
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Categories {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub process_type: ProcessType,
    /// Source catalogues (Parquet), relative to the card config.
    pub files: Vec<PathBuf>,
    #[serde(default = "default_kfactor")]
    pub kfactor: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlatNuisanceConfig {
    pub name: String,
    pub value: f64,
    /// Processes affected; all non-data groups when omitted.
    #[serde(default)]
    pub processes: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShapeNuisanceConfig {
    /// Systematic tag as found in histogram names (`sys_{tag}Up`).
    pub tag: String,
    /// Nuisance name written in the card.
    pub name: String,
    #[serde(default)]
    pub symmetrize: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateParamConfig {
    pub name: String,
    /// Channel pattern; the card channel when omitted.
    #[serde(default)]
    pub channel: Option<String>,
    pub process: String,
    #[serde(default = "default_vmin")]
    pub min: f64,
    #[serde(default = "default_vmax")]
    pub max: f64,
}

/// A card config together with the directory its relative paths resolve
/// against.
#[derive(Debug, Clone)]
pub struct LoadedCard {
    pub path: PathBuf,
    pub base_dir: PathBuf,
    pub config: CardConfig,
}

impl LoadedCard {
    pub fn resolve(&self, p: &Path) -> PathBuf {
        resolve(&self.base_dir, p)
    }

    /// Aggregation settings shared by every group of this card.
    pub fn aggregator_config(&self, xsections: CrossSectionTable) -> AggregatorConfig {
        let cfg = &self.config;
        let categories = match &cfg.categories {
            Categories::One(c) => CategoryFilter::Single(c.clone()),
            Categories::Many(cs) => CategoryFilter::Many(cs.clone()),
        };
        let mut agg = AggregatorConfig::new(cfg.observable.clone(), categories)
            .luminosity(cfg.luminosity)
            .rebin(cfg.rebin)
            .xsections(xsections);
        if let Some(order) = &cfg.category_order {
            agg = agg.category_order(order.clone());
        }
        if let Some([start, end]) = cfg.bin_range {
            agg = agg.bin_range(start..end);
        }
        agg
    }
}

pub fn read_card_config(path: &Path) -> Result<LoadedCard> {
    let bytes =
        std::fs::read(path).with_context(|| format!("reading card config {}", path.display()))?;
    let config: CardConfig = serde_yaml_ng::from_slice(&bytes)
        .with_context(|| format!("parsing card config {}", path.display()))?;
    validate_card(&config)?;
    Ok(LoadedCard { path: path.to_path_buf(), base_dir: parent_dir(path), config })
}

fn validate_card(cfg: &CardConfig) -> Result<()> {
    if cfg.rebin == 0 {
        anyhow::bail!("card '{}': rebin must be >= 1", cfg.name);
    }
    if let Some([start, end]) = cfg.bin_range
        && start >= end
    {
        anyhow::bail!("card '{}': empty bin_range [{start}, {end})", cfg.name);
    }
    let n_data = cfg.groups.iter().filter(|g| g.process_type.is_data()).count();
    if n_data != 1 {
        anyhow::bail!("card '{}': expected exactly one data group, found {n_data}", cfg.name);
    }
    let mut seen = std::collections::BTreeSet::new();
    for g in &cfg.groups {
        if !seen.insert(g.name.as_str()) {
            anyhow::bail!("card '{}': duplicate group '{}'", cfg.name, g.name);
        }
        if g.files.is_empty() {
            anyhow::bail!("card '{}': group '{}' has no files", cfg.name, g.name);
        }
    }
    Ok(())
}

/// Cross-section table: `{source: {xsec, kr, br}}`.
pub fn read_xsections(path: &Path) -> Result<CrossSectionTable> {
    let bytes =
        std::fs::read(path).with_context(|| format!("reading cross sections {}", path.display()))?;
    let table: CrossSectionTable = serde_yaml_ng::from_slice(&bytes)
        .with_context(|| format!("parsing cross sections {}", path.display()))?;
    Ok(table)
}

/// Batch job list.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    /// Root output directory shared by all jobs.
    pub out_dir: PathBuf,
    /// Card configs, relative to the job file.
    pub cards: Vec<PathBuf>,
}

pub fn read_batch_config(path: &Path) -> Result<(BatchConfig, PathBuf)> {
    let bytes =
        std::fs::read(path).with_context(|| format!("reading job list {}", path.display()))?;
    let cfg: BatchConfig = serde_yaml_ng::from_slice(&bytes)
        .with_context(|| format!("parsing job list {}", path.display()))?;
    Ok((cfg, parent_dir(path)))
}

pub fn resolve(base_dir: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() { p.to_path_buf() } else { base_dir.join(p) }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}
