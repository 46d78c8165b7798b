//! `shapecard batch`: independent card builds on a rayon pool.

use anyhow::Result;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::path::Path;

use crate::build::{CardSummary, build_card};
use crate::config::{LoadedCard, read_batch_config, read_card_config, resolve};

pub struct BatchOutcome {
    pub built: Vec<CardSummary>,
    pub failed: Vec<(String, String)>,
}

pub fn run_batch(jobs: &Path, threads: usize, force: bool) -> Result<BatchOutcome> {
    let (batch, base_dir) = read_batch_config(jobs)?;
    let out_root = resolve(&base_dir, &batch.out_dir);

    let cards = batch
        .cards
        .iter()
        .map(|p| read_card_config(&resolve(&base_dir, p)))
        .collect::<Result<Vec<LoadedCard>>>()?;

    // each job owns cards-{name}/shapes-{channel}.*
    let mut targets = BTreeSet::new();
    for c in &cards {
        if !targets.insert((c.config.name.as_str(), c.config.channel.as_str())) {
            anyhow::bail!(
                "two jobs write cards-{}/shapes-{}.dat",
                c.config.name,
                c.config.channel
            );
        }
    }

    sc_card::prepare_output_dir(&out_root, force)?;

    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
    tracing::info!(jobs = cards.len(), threads = pool.current_num_threads(), "starting batch");

    let results: Vec<(String, Result<CardSummary>)> = pool.install(|| {
        cards
            .par_iter()
            .map(|c| (c.path.display().to_string(), build_card(c, &out_root)))
            .collect()
    });

    let mut built = Vec::new();
    let mut failed = Vec::new();
    for (path, res) in results {
        match res {
            Ok(summary) => built.push(summary),
            Err(e) => {
                tracing::error!(config = %path, "card failed: {e:#}");
                failed.push((path, format!("{e:#}")));
            }
        }
    }
    Ok(BatchOutcome { built, failed })
}
