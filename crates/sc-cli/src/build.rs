//! `shapecard make-card`: sources → data groups → datacard.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

use sc_card::{Datacard, DataGroup};
use sc_core::ProcessType;
use sc_io::ParquetSource;

use crate::config::{LoadedCard, read_xsections};

/// What a finished build wrote.
#[derive(Debug, Clone, Serialize)]
pub struct CardSummary {
    pub name: String,
    pub channel: String,
    pub card: PathBuf,
    pub store: PathBuf,
    pub processes: Vec<(String, f64)>,
    pub observation: f64,
    pub nuisances: usize,
    pub skipped_shapes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub group_stores: Vec<PathBuf>,
}

/// Build one card into `out_root/cards-{name}/`.
pub fn build_card(card: &LoadedCard, out_root: &Path) -> Result<CardSummary> {
    let cfg = &card.config;
    tracing::info!(card = %cfg.name, channel = %cfg.channel, "building card");

    let xsections = read_xsections(&card.resolve(&cfg.xsections))?;
    let agg = card.aggregator_config(xsections);

    let mut groups = Vec::with_capacity(cfg.groups.len());
    for g in &cfg.groups {
        let sources = g
            .files
            .iter()
            .map(|f| ParquetSource::open(card.resolve(f)))
            .collect::<sc_core::Result<Vec<_>>>()
            .with_context(|| format!("group '{}'", g.name))?;
        let group_cfg = agg.clone().kfactor(g.kfactor);
        let group = DataGroup::aggregate(g.name.clone(), g.process_type, &sources, &group_cfg)
            .with_context(|| format!("aggregating group '{}'", g.name))?;
        tracing::info!(
            group = %g.name,
            sources = sources.len(),
            systematics = group.systematics().len(),
            "group aggregated"
        );
        groups.push(group);
    }

    let mut datacard = Datacard::create(out_root, &cfg.name, &cfg.channel)?;
    datacard.set_header()?;

    let data = groups
        .iter()
        .find(|g| g.process_type().is_data())
        .context("card has no data group")?;
    let observed = data
        .nominal()
        .with_context(|| format!("data group '{}' selected no nominal histogram", data.name()))?;
    datacard.set_observation(observed)?;

    // signals first, then backgrounds, each in declaration order
    let mc: Vec<&DataGroup> = groups
        .iter()
        .filter(|g| g.process_type() == ProcessType::Signal)
        .chain(groups.iter().filter(|g| g.process_type() == ProcessType::Background))
        .collect();
    let nsignal = mc.iter().filter(|g| g.process_type() == ProcessType::Signal).count();
    datacard.set_nsignal(nsignal)?;

    for group in &mc {
        let nominal = group
            .nominal()
            .with_context(|| format!("group '{}' selected no nominal histogram", group.name()))?;
        datacard.add_nominal(group.name(), nominal)?;
    }

    for nuis in &cfg.flat_nuisances {
        for group in &mc {
            let applies = nuis
                .processes
                .as_ref()
                .is_none_or(|ps| ps.iter().any(|p| p == group.name()));
            if applies {
                datacard.add_flat_nuisance(group.name(), &nuis.name, nuis.value)?;
            }
        }
    }

    let mut skipped_shapes = Vec::new();
    for nuis in &cfg.shape_nuisances {
        for group in &mc {
            if !group.systematics().contains(&nuis.tag) {
                tracing::debug!(group = %group.name(), tag = %nuis.tag, "no such systematic");
                continue;
            }
            let registered = datacard.add_shape_nuisance(
                group.name(),
                &nuis.tag,
                &nuis.name,
                group.variation(&nuis.tag),
                nuis.symmetrize,
            )?;
            if !registered {
                skipped_shapes.push(format!("{}:{}", group.name(), nuis.name));
            }
        }
    }

    for rp in &cfg.rate_params {
        let channel = rp.channel.as_deref().unwrap_or(&cfg.channel);
        datacard.add_rate_param(&rp.name, channel, &rp.process, rp.min, rp.max)?;
    }
    if cfg.auto_stat {
        datacard.add_auto_stat()?;
    }

    datacard.dump()?;
    tracing::info!(card = %datacard.card_path().display(), "card written");

    let mut group_stores = Vec::new();
    if cfg.save_groups {
        let dir = datacard.card_path().parent().map(Path::to_path_buf).unwrap_or_default();
        for group in &groups {
            let path = dir.join(format!("histograms-{}.parquet", group.name()));
            sc_io::write_store(&path, &group.store_entries())?;
            group_stores.push(path);
        }
    }

    Ok(CardSummary {
        name: cfg.name.clone(),
        channel: cfg.channel.clone(),
        card: datacard.card_path().to_path_buf(),
        store: datacard.store_path().to_path_buf(),
        processes: datacard.rates().to_vec(),
        observation: observed.total(),
        nuisances: datacard.nuisances().len(),
        skipped_shapes,
        group_stores,
    })
}
