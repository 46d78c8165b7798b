//! Binned count histogram with per-bin variances.

use std::ops::Range;

use serde::Serialize;

use crate::error::{Error, Result};

/// A 1D histogram of weighted counts.
///
/// Invariant: `edges.len() == contents.len() + 1 == sumw2.len() + 1`, edges
/// strictly increasing and finite, at least one bin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    name: String,
    edges: Vec<f64>,
    contents: Vec<f64>,
    sumw2: Vec<f64>,
}

impl Histogram {
    /// Build a histogram, validating the binning layout.
    pub fn new(
        name: impl Into<String>,
        edges: Vec<f64>,
        contents: Vec<f64>,
        sumw2: Vec<f64>,
    ) -> Result<Self> {
        let name = name.into();
        validate_edges(&name, &edges)?;
        let n_bins = edges.len() - 1;
        if contents.len() != n_bins || sumw2.len() != n_bins {
            return Err(Error::Binning(format!(
                "'{name}': len(edges)={}, len(contents)={}, len(sumw2)={}",
                edges.len(),
                contents.len(),
                sumw2.len()
            )));
        }
        Ok(Self { name, edges, contents, sumw2 })
    }

    /// Build a histogram of unweighted counts (variance = |content|).
    pub fn from_counts(name: impl Into<String>, edges: Vec<f64>, contents: Vec<f64>) -> Result<Self> {
        let sumw2 = contents.iter().map(|c| c.abs()).collect();
        Self::new(name, edges, contents, sumw2)
    }

    /// Empty histogram with the given binning.
    pub fn zeros(name: impl Into<String>, edges: Vec<f64>) -> Result<Self> {
        let n = edges.len().saturating_sub(1);
        Self::new(name, edges, vec![0.0; n], vec![0.0; n])
    }

    /// Histogram name (identity key inside a process).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename in place.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Consume and rename.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Bin edges (length = n_bins + 1).
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Bin contents.
    pub fn contents(&self) -> &[f64] {
        &self.contents
    }

    /// Per-bin variances (sum of squared weights).
    pub fn sumw2(&self) -> &[f64] {
        &self.sumw2
    }

    /// Number of bins.
    pub fn n_bins(&self) -> usize {
        self.contents.len()
    }

    /// Sum of bin contents.
    pub fn total(&self) -> f64 {
        self.contents.iter().sum()
    }

    /// Bin centers (midpoints of adjacent edges).
    pub fn centers(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
    }

    /// Clamp negative contents to zero. Variances are left untouched.
    ///
    /// Returns the number of bins that were clamped.
    pub fn clamp_negative(&mut self) -> usize {
        let mut clamped = 0;
        for c in self.contents.iter_mut() {
            if *c < 0.0 {
                *c = 0.0;
                clamped += 1;
            }
        }
        clamped
    }

    /// Multiply contents by `factor` and variances by `factor²`.
    pub fn scale(&mut self, factor: f64) {
        let f2 = factor * factor;
        self.contents.iter_mut().for_each(|c| *c *= factor);
        self.sumw2.iter_mut().for_each(|v| *v *= f2);
    }

    /// Scaled copy.
    pub fn scaled(&self, factor: f64) -> Self {
        let mut out = self.clone();
        out.scale(factor);
        out
    }

    /// Elementwise accumulation of contents and variances.
    ///
    /// Fails with [`Error::BinningMismatch`] unless both histograms share
    /// exactly the same edges.
    pub fn accumulate(&mut self, other: &Histogram) -> Result<()> {
        self.check_same_binning(other)?;
        for (a, b) in self.contents.iter_mut().zip(&other.contents) {
            *a += b;
        }
        for (a, b) in self.sumw2.iter_mut().zip(&other.sumw2) {
            *a += b;
        }
        Ok(())
    }

    /// Restrict to a contiguous half-open range of bin indices.
    pub fn slice_bins(&self, range: Range<usize>) -> Result<Self> {
        if range.start >= range.end || range.end > self.n_bins() {
            return Err(Error::Binning(format!(
                "'{}': bin range {}..{} outside 0..{}",
                self.name,
                range.start,
                range.end,
                self.n_bins()
            )));
        }
        Self::new(
            self.name.clone(),
            self.edges[range.start..=range.end].to_vec(),
            self.contents[range.clone()].to_vec(),
            self.sumw2[range].to_vec(),
        )
    }

    /// Merge groups of `group` adjacent bins.
    ///
    /// A trailing partial group becomes one (narrower) bin.
    pub fn rebin(&self, group: usize) -> Result<Self> {
        if group == 0 {
            return Err(Error::Binning(format!("'{}': rebin factor must be >= 1", self.name)));
        }
        if group == 1 {
            return Ok(self.clone());
        }
        let mut edges = vec![self.edges[0]];
        let mut contents = Vec::with_capacity(self.n_bins() / group + 1);
        let mut sumw2 = Vec::with_capacity(self.n_bins() / group + 1);
        for start in (0..self.n_bins()).step_by(group) {
            let end = (start + group).min(self.n_bins());
            contents.push(self.contents[start..end].iter().sum());
            sumw2.push(self.sumw2[start..end].iter().sum());
            edges.push(self.edges[end]);
        }
        Self::new(self.name.clone(), edges, contents, sumw2)
    }

    /// `true` if edges and contents agree bin for bin.
    pub fn same_shape(&self, other: &Histogram) -> bool {
        self.edges == other.edges && self.contents == other.contents
    }

    /// `true` if at least one bin has strictly positive content.
    pub fn has_positive_bin(&self) -> bool {
        self.contents.iter().any(|&c| c > 0.0)
    }

    /// `2 * nominal - self`, mirroring a variation through the nominal.
    ///
    /// Variances propagate as `4 * var(nominal) + var(self)`.
    pub fn reflect_through(&self, nominal: &Histogram) -> Result<Self> {
        self.check_same_binning(nominal)?;
        let contents =
            nominal.contents.iter().zip(&self.contents).map(|(n, v)| 2.0 * n - v).collect();
        let sumw2 = nominal.sumw2.iter().zip(&self.sumw2).map(|(n, v)| 4.0 * n + v).collect();
        Self::new(self.name.clone(), self.edges.clone(), contents, sumw2)
    }

    /// Symmetric envelope `nominal ± max(|nominal - up|, |nominal - down|)`.
    ///
    /// Returns `(up, down)`; both carry the nominal variances and keep the
    /// names of the inputs.
    pub fn symmetric_envelope(
        nominal: &Histogram,
        up: &Histogram,
        down: &Histogram,
    ) -> Result<(Self, Self)> {
        nominal.check_same_binning(up)?;
        nominal.check_same_binning(down)?;
        let delta: Vec<f64> = nominal
            .contents
            .iter()
            .zip(up.contents.iter().zip(&down.contents))
            .map(|(n, (u, d))| (n - u).abs().max((n - d).abs()))
            .collect();
        let hi = nominal.contents.iter().zip(&delta).map(|(n, d)| n + d).collect();
        let lo = nominal.contents.iter().zip(&delta).map(|(n, d)| n - d).collect();
        Ok((
            Self::new(up.name.clone(), nominal.edges.clone(), hi, nominal.sumw2.clone())?,
            Self::new(down.name.clone(), nominal.edges.clone(), lo, nominal.sumw2.clone())?,
        ))
    }

    fn check_same_binning(&self, other: &Histogram) -> Result<()> {
        if self.edges == other.edges {
            return Ok(());
        }
        let detail = if self.edges.len() != other.edges.len() {
            format!("{} edges vs {} edges in '{}'", self.edges.len(), other.edges.len(), other.name)
        } else {
            let i = self.edges.iter().zip(&other.edges).position(|(a, b)| a != b).unwrap_or(0);
            format!("edge {i} is {} vs {} in '{}'", self.edges[i], other.edges[i], other.name)
        };
        Err(Error::BinningMismatch { name: self.name.clone(), detail })
    }
}

fn validate_edges(name: &str, edges: &[f64]) -> Result<()> {
    if edges.len() < 2 {
        return Err(Error::Binning(format!("'{name}': need at least 2 edges, got {}", edges.len())));
    }
    if let Some(bad) = edges.iter().find(|e| !e.is_finite()) {
        return Err(Error::Binning(format!("'{name}': non-finite edge {bad}")));
    }
    if let Some(i) = edges.windows(2).position(|w| w[1] <= w[0]) {
        return Err(Error::Binning(format!(
            "'{name}': edges not strictly increasing at index {} ({} -> {})",
            i + 1,
            edges[i],
            edges[i + 1]
        )));
    }
    Ok(())
}
