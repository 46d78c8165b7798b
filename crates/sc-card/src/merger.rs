//! Concatenation of per-category histograms onto one synthetic axis.
//!
//! Categories have independent x-axes, so the merged axis is built by
//! shifting each histogram to start where the previous one ended. A
//! zero-content, zero-variance placeholder bin separates consecutive
//! categories so a join bin never mixes the tail of one category with the
//! head of the next.

use sc_core::{Error, HistKey, Histogram, Result};

/// Merges histograms in a fixed category order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryMerger {
    order: Vec<String>,
}

impl CategoryMerger {
    /// Merger with the given category ordering.
    pub fn new(order: Vec<String>) -> Self {
        Self { order }
    }

    /// Category ordering.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Position of `category` in the ordering.
    pub fn position(&self, category: &str) -> Result<usize> {
        self.order
            .iter()
            .position(|c| c == category)
            .ok_or_else(|| Error::UnknownCategory(category.to_string()))
    }

    /// Concatenate every entry accepted by `predicate`.
    ///
    /// Returns `Ok(None)` when nothing passes the filter. The merged
    /// histogram has `Σ n_i + (k − 1)` bins for `k` inputs and is named after
    /// the last input with its `_{category}` segment removed.
    pub fn merge<'a, I, P>(&self, entries: I, mut predicate: P) -> Result<Option<Histogram>>
    where
        I: IntoIterator<Item = (&'a HistKey, &'a Histogram)>,
        P: FnMut(&HistKey, &Histogram) -> bool,
    {
        let mut selected = Vec::new();
        for (key, hist) in entries {
            if predicate(key, hist) {
                selected.push((self.position(&key.category)?, key, hist));
            }
        }
        selected.sort_by_key(|&(pos, _, _)| pos);

        let Some(&(_, first_key, first)) = selected.first() else {
            return Ok(None);
        };

        let n_total = selected.iter().map(|(_, _, h)| h.n_bins()).sum::<usize>() + selected.len() - 1;
        let mut edges = Vec::with_capacity(n_total + 1);
        let mut contents = Vec::with_capacity(n_total);
        let mut sumw2 = Vec::with_capacity(n_total);
        edges.extend_from_slice(first.edges());
        contents.extend_from_slice(first.contents());
        sumw2.extend_from_slice(first.sumw2());

        let mut last_key = first_key;
        let mut last_name = first.name();
        for &(_, key, hist) in &selected[1..] {
            let running_max = edges[edges.len() - 1];
            let src = hist.edges();
            // placeholder bin as wide as the incoming first bin, but never
            // narrower than a few ulps of the running edge
            let width = src[1] - src[0];
            let gap = width.max(running_max.abs() * 4.0 * f64::EPSILON);
            let start = running_max + gap;
            let shift = start - src[0];

            let first_new = edges.len();
            edges.push(start);
            edges.extend(src[1..].iter().map(|e| e + shift));
            if let Some(i) = edges[first_new - 1..].windows(2).position(|w| w[1] <= w[0]) {
                return Err(Error::Binning(format!(
                    "category '{}' cannot be placed after edge {running_max}: \
                     shifted bin {i} collapses ({} -> {})",
                    key.category,
                    edges[first_new - 1 + i],
                    edges[first_new + i],
                )));
            }
            contents.push(0.0);
            contents.extend_from_slice(hist.contents());
            sumw2.push(0.0);
            sumw2.extend_from_slice(hist.sumw2());

            last_key = key;
            last_name = hist.name();
        }

        let name = last_name.replacen(&format!("_{}", last_key.category), "", 1);
        let merged = Histogram::new(name, edges, contents, sumw2)?;
        log::debug!(
            "merged {} categories into '{}' ({} bins)",
            selected.len(),
            merged.name(),
            merged.n_bins()
        );
        Ok(Some(merged))
    }
}
