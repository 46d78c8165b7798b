//! Cross-section normalization of simulated sources.

use std::collections::BTreeMap;

use sc_core::{Error, HistogramSource, ProcessType, Result};
use serde::{Deserialize, Serialize};

/// Converts declared cross-sections (pb) to the fb expected with luminosities
/// in fb⁻¹.
pub const PB_TO_FB: f64 = 1000.0;

fn one() -> f64 {
    1.0
}

/// Cross-section table entry for one source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrossSection {
    /// Declared cross-section (pb).
    pub xsec: f64,
    /// k-factor.
    #[serde(default = "one")]
    pub kr: f64,
    /// Branching ratio.
    #[serde(default = "one")]
    pub br: f64,
}

impl CrossSection {
    /// Entry with `kr = br = 1`.
    pub fn new(xsec: f64) -> Self {
        Self { xsec, kr: 1.0, br: 1.0 }
    }

    /// `xsec * kr * br * 1000`.
    pub fn effective_fb(&self) -> f64 {
        self.xsec * self.kr * self.br * PB_TO_FB
    }
}

/// Source label → cross-section entry.
pub type CrossSectionTable = BTreeMap<String, CrossSection>;

/// Per-source scale factor to a target integrated luminosity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalizer {
    luminosity: f64,
}

impl Normalizer {
    /// Normalizer for `luminosity` (fb⁻¹).
    pub fn new(luminosity: f64) -> Self {
        Self { luminosity }
    }

    /// Target luminosity.
    pub fn luminosity(&self) -> f64 {
        self.luminosity
    }

    /// `(xsec * kr * br * 1000) * L / gen_event_sumw`.
    pub fn scale(&self, source_name: &str, xs: &CrossSection, gen_event_sumw: f64) -> Result<f64> {
        let effective = xs.effective_fb();
        if effective.is_nan() || effective <= 0.0 {
            return Err(Error::NonPositiveCrossSection {
                source_name: source_name.to_string(),
                value: effective,
            });
        }
        if !gen_event_sumw.is_finite() || gen_event_sumw <= 0.0 {
            return Err(Error::Source(format!(
                "{source_name}: generator weight sum must be positive, got {gen_event_sumw}"
            )));
        }
        Ok(effective * self.luminosity / gen_event_sumw)
    }

    /// Scale for a source of the given process type.
    ///
    /// Data is never scaled. Simulated sources need an entry in `table` and a
    /// recorded generator weight sum.
    pub fn scale_source<S: HistogramSource + ?Sized>(
        &self,
        process_type: ProcessType,
        source: &S,
        table: &CrossSectionTable,
    ) -> Result<f64> {
        if process_type.is_data() {
            return Ok(1.0);
        }
        let label = source.label();
        let xs = table
            .get(label)
            .ok_or_else(|| Error::Validation(format!("no cross section entry for '{label}'")))?;
        let sumw = source
            .gen_event_sumw()
            .ok_or_else(|| Error::Source(format!("{label}: missing generator weight sum")))?;
        self.scale(label, xs, sumw)
    }
}
