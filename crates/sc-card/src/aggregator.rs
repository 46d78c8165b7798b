//! Per-process aggregation of histograms across sources.
//!
//! A [`DataGroup`] is one logical process (e.g. `ZZ`) built from one or more
//! sources. Every selected histogram is cut to the configured bin range,
//! cleaned, normalized, rebinned and accumulated under its [`HistKey`]. In
//! multi-category mode the per-category histograms are then concatenated by
//! the [`CategoryMerger`] into one histogram per systematic variation.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use sc_core::{
    Direction, Error, HistKey, Histogram, HistogramSource, ProcessType, Result, SystematicMatch,
};

use crate::catalogue::HistogramCatalogue;
use crate::merger::CategoryMerger;
use crate::normalizer::{CrossSectionTable, Normalizer};

/// Key under which the observed-data nominal is stored.
pub const DATA_OBS: &str = "data_obs";

/// Which categories to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryFilter {
    /// One category; no merging.
    Single(String),
    /// Several categories, merged onto one axis.
    Many(Vec<String>),
}

impl CategoryFilter {
    /// Requested tokens as spelled by the caller.
    pub fn tokens(&self) -> &[String] {
        match self {
            Self::Single(c) => std::slice::from_ref(c),
            Self::Many(cs) => cs,
        }
    }
}

/// Fixed lookup table from legacy category spellings to canonical tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryAliases {
    table: BTreeMap<String, String>,
}

impl CategoryAliases {
    /// No aliases.
    pub fn none() -> Self {
        Self::default()
    }

    /// The two legacy signal-region spellings.
    pub fn legacy() -> Self {
        Self::none().with("catSignal-0jet", "cat0Jet").with("catSignal-1jet", "cat1Jet")
    }

    /// Add an alias.
    pub fn with(mut self, alias: impl Into<String>, canonical: impl Into<String>) -> Self {
        self.table.insert(alias.into(), canonical.into());
        self
    }

    /// Canonical spelling of `token` (itself if it is not an alias).
    pub fn canonical<'a>(&'a self, token: &'a str) -> &'a str {
        self.table.get(token).map_or(token, String::as_str)
    }
}

/// Everything the aggregator needs besides the sources.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Observable token that selected histogram names must contain as a whole
    /// `_`-separated token.
    pub observable: String,
    /// Categories to read.
    pub categories: CategoryFilter,
    /// Legacy category spellings.
    pub aliases: CategoryAliases,
    /// Fixed category ordering for merging (canonical tokens).
    pub category_order: Vec<String>,
    /// Target integrated luminosity (fb⁻¹).
    pub luminosity: f64,
    /// Group-level k-factor applied on top of the per-source scale.
    pub kfactor: f64,
    /// Number of adjacent bins merged into one (1 = no rebinning).
    pub rebin: usize,
    /// Half-open bin index range kept from each input histogram.
    pub bin_range: Option<Range<usize>>,
    /// Source label → cross-section entry.
    pub xsections: CrossSectionTable,
}

impl AggregatorConfig {
    /// Defaults: legacy aliases, ordering = requested categories, unit
    /// luminosity and k-factor, no rebinning, full bin range.
    pub fn new(observable: impl Into<String>, categories: CategoryFilter) -> Self {
        let aliases = CategoryAliases::legacy();
        let category_order =
            categories.tokens().iter().map(|c| aliases.canonical(c).to_string()).collect();
        Self {
            observable: observable.into(),
            categories,
            aliases,
            category_order,
            luminosity: 1.0,
            kfactor: 1.0,
            rebin: 1,
            bin_range: None,
            xsections: CrossSectionTable::new(),
        }
    }

    /// Set the luminosity.
    pub fn luminosity(mut self, luminosity: f64) -> Self {
        self.luminosity = luminosity;
        self
    }

    /// Set the group k-factor.
    pub fn kfactor(mut self, kfactor: f64) -> Self {
        self.kfactor = kfactor;
        self
    }

    /// Set the rebin factor.
    pub fn rebin(mut self, rebin: usize) -> Self {
        self.rebin = rebin;
        self
    }

    /// Keep only bins `range` of every input.
    pub fn bin_range(mut self, range: Range<usize>) -> Self {
        self.bin_range = Some(range);
        self
    }

    /// Set the cross-section table.
    pub fn xsections(mut self, xsections: CrossSectionTable) -> Self {
        self.xsections = xsections;
        self
    }

    /// Replace the alias table (the ordering is re-derived from the filter).
    pub fn aliases(mut self, aliases: CategoryAliases) -> Self {
        self.category_order =
            self.categories.tokens().iter().map(|c| aliases.canonical(c).to_string()).collect();
        self.aliases = aliases;
        self
    }

    /// Override the category ordering.
    pub fn category_order(mut self, order: Vec<String>) -> Self {
        self.category_order = order;
        self
    }

    /// Resolve a raw histogram name to `(canonical category, systematic)`.
    ///
    /// Returns `Ok(None)` when the name does not carry the observable or any
    /// requested category.
    fn select(&self, raw_name: &str) -> Result<Option<(String, SystematicMatch)>> {
        let name = raw_name.split(';').next().unwrap_or(raw_name);
        if !contains_token(name, &self.observable) {
            return Ok(None);
        }
        let head = match name.find("_sys_") {
            Some(pos) => &name[..pos],
            None => name,
        };
        let category = head.split('_').find_map(|segment| {
            let canonical = self.aliases.canonical(segment);
            self.categories
                .tokens()
                .iter()
                .any(|t| self.aliases.canonical(t) == canonical)
                .then(|| canonical.to_string())
        });
        match category {
            Some(category) => Ok(Some((category, SystematicMatch::parse(name)?))),
            None => Ok(None),
        }
    }
}

/// `true` if `token` occurs in `name` bounded by `_` or the ends of the name,
/// so `measMET` matches `measMET_ZZ_cat3L` but not `measMETphi_ZZ_cat3L`.
fn contains_token(name: &str, token: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    name.match_indices(token).any(|(pos, _)| {
        let before = name[..pos].chars().next_back();
        let after = name[pos + token.len()..].chars().next();
        matches!(before, None | Some('_')) && matches!(after, None | Some('_'))
    })
}

/// Shape lookup key after merging: `(systematic, direction)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShapeKey {
    /// Systematic tag, `None` for the nominal.
    pub systematic: Option<String>,
    /// Variation direction.
    pub direction: Direction,
}

impl ShapeKey {
    /// The nominal shape.
    pub fn nominal() -> Self {
        Self { systematic: None, direction: Direction::Nominal }
    }

    /// A systematic variation.
    pub fn variation(tag: impl Into<String>, direction: Direction) -> Self {
        Self { systematic: Some(tag.into()), direction }
    }
}

/// Result of [`DataGroup::get`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape<'a> {
    /// The nominal histogram.
    Nominal(Option<&'a Histogram>),
    /// Up/down histograms of one systematic; a missing direction is `None`.
    Variation {
        /// +1σ histogram.
        up: Option<&'a Histogram>,
        /// −1σ histogram.
        down: Option<&'a Histogram>,
    },
}

/// One logical process aggregated over its sources.
#[derive(Debug, Clone)]
pub struct DataGroup {
    name: String,
    process_type: ProcessType,
    luminosity: f64,
    catalogue: HistogramCatalogue,
    systematics: BTreeSet<String>,
    merged: BTreeMap<ShapeKey, Histogram>,
}

impl DataGroup {
    /// Aggregate `sources` into a data group named `name`.
    ///
    /// Any source failure (unreadable file, missing run record, bad
    /// cross-section) aborts the whole group.
    pub fn aggregate<S: HistogramSource>(
        name: impl Into<String>,
        process_type: ProcessType,
        sources: &[S],
        config: &AggregatorConfig,
    ) -> Result<Self> {
        let name = name.into();
        if config.rebin == 0 {
            return Err(Error::Validation("rebin factor must be >= 1".into()));
        }
        let normalizer = Normalizer::new(config.luminosity);
        let mut catalogue = HistogramCatalogue::new();
        let mut systematics = BTreeSet::new();

        for source in sources {
            let scale = if process_type.is_data() {
                1.0
            } else {
                normalizer.scale_source(process_type, source, &config.xsections)? * config.kfactor
            };
            let mut n_selected = 0usize;
            for raw in source.histograms()? {
                let Some((category, matched)) = config.select(raw.name())? else {
                    continue;
                };
                let key = HistKey::from_match(name.as_str(), category, matched);
                let mut hist = match &config.bin_range {
                    Some(range) => raw.slice_bins(range.clone())?,
                    None => raw,
                };
                let clamped = hist.clamp_negative();
                if clamped > 0 {
                    log::debug!("{}: clamped {clamped} negative bins", hist.name());
                }
                hist.scale(scale);
                if config.rebin > 1 {
                    hist = hist.rebin(config.rebin)?;
                }
                hist.set_name(key.histogram_name(&config.observable));
                if let Some(tag) = &key.systematic {
                    systematics.insert(tag.clone());
                }
                catalogue.insert_or_accumulate(key, hist)?;
                n_selected += 1;
            }
            log::debug!(
                "{name}: source '{}' contributed {n_selected} histograms (scale={scale})",
                source.label()
            );
        }

        let merged = match &config.categories {
            CategoryFilter::Many(_) => {
                merge_categories(&catalogue, &systematics, &config.category_order)?
            }
            CategoryFilter::Single(_) => catalogue
                .iter()
                .map(|(k, h)| {
                    (ShapeKey { systematic: k.systematic.clone(), direction: k.direction }, h.clone())
                })
                .collect(),
        };
        if !merged.contains_key(&ShapeKey::nominal()) {
            log::warn!("{name}: no nominal histogram selected");
        }

        Ok(Self {
            name,
            process_type,
            luminosity: config.luminosity,
            catalogue,
            systematics,
            merged,
        })
    }

    /// Canonical process name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Process type.
    pub fn process_type(&self) -> ProcessType {
        self.process_type
    }

    /// Luminosity the group was normalized to.
    pub fn luminosity(&self) -> f64 {
        self.luminosity
    }

    /// Per-category histograms.
    pub fn catalogue(&self) -> &HistogramCatalogue {
        &self.catalogue
    }

    /// Every systematic tag seen in any selected histogram.
    pub fn systematics(&self) -> &BTreeSet<String> {
        &self.systematics
    }

    /// Merged (or, in single-category mode, projected) shapes.
    pub fn shapes(&self) -> &BTreeMap<ShapeKey, Histogram> {
        &self.merged
    }

    /// `"nom"` → nominal; anything else → the up/down pair of that tag.
    pub fn get(&self, tag: &str) -> Shape<'_> {
        if tag == "nom" {
            Shape::Nominal(self.nominal())
        } else {
            let (up, down) = self.variation(tag);
            Shape::Variation { up, down }
        }
    }

    /// Nominal shape.
    pub fn nominal(&self) -> Option<&Histogram> {
        self.merged.get(&ShapeKey::nominal())
    }

    /// Up/down shapes of `tag`.
    pub fn variation(&self, tag: &str) -> (Option<&Histogram>, Option<&Histogram>) {
        (
            self.merged.get(&ShapeKey::variation(tag, Direction::Up)),
            self.merged.get(&ShapeKey::variation(tag, Direction::Down)),
        )
    }

    /// Shapes keyed for a standalone per-group store: the nominal under the
    /// group name (`data_obs` for data), variations as `{name}_{tag}Up|Down`.
    pub fn store_entries(&self) -> BTreeMap<String, Histogram> {
        self.merged
            .iter()
            .map(|(key, hist)| {
                let store_key = match &key.systematic {
                    None if self.process_type.is_data() => DATA_OBS.to_string(),
                    None => self.name.clone(),
                    Some(tag) => format!("{}_{tag}{}", self.name, key.direction.suffix()),
                };
                (store_key.clone(), hist.clone().with_name(store_key))
            })
            .collect()
    }
}

fn merge_categories(
    catalogue: &HistogramCatalogue,
    systematics: &BTreeSet<String>,
    order: &[String],
) -> Result<BTreeMap<ShapeKey, Histogram>> {
    let merger = CategoryMerger::new(order.to_vec());
    let mut merged = BTreeMap::new();

    if let Some(h) = merger.merge(catalogue.iter(), |k, _| k.is_nominal())? {
        merged.insert(ShapeKey::nominal(), h);
    }
    for tag in systematics {
        for direction in [Direction::Up, Direction::Down] {
            let hist = merger.merge(catalogue.iter(), |k, _| {
                k.systematic.as_deref() == Some(tag.as_str()) && k.direction == direction
            })?;
            if let Some(h) = hist {
                merged.insert(ShapeKey::variation(tag.as_str(), direction), h);
            }
        }
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::CrossSection;
    use approx::assert_relative_eq;
    use sc_core::SourceRecord;

    fn h(name: &str, contents: &[f64]) -> Histogram {
        let edges = (0..=contents.len()).map(|i| 100.0 * i as f64).collect();
        Histogram::from_counts(name, edges, contents.to_vec()).unwrap()
    }

    fn xs(labels: &[&str]) -> CrossSectionTable {
        labels.iter().map(|l| (l.to_string(), CrossSection::new(1.0))).collect()
    }

    #[test]
    fn test_two_source_normalization_scenario() {
        let a = SourceRecord::new("ZZ_a")
            .with_gen_event_sumw(1000.0)
            .with_histogram(h("measMET_ZZ_a_cat3L", &[600.0, 400.0]));
        let b = SourceRecord::new("ZZ_b")
            .with_gen_event_sumw(2000.0)
            .with_histogram(h("measMET_ZZ_b_cat3L", &[1200.0, 800.0]));
        let cfg = AggregatorConfig::new("measMET", CategoryFilter::Single("cat3L".into()))
            .xsections(xs(&["ZZ_a", "ZZ_b"]));

        let dg = DataGroup::aggregate("ZZ", ProcessType::Background, &[a, b], &cfg).unwrap();
        // 1000 * (1*1*1*1000*1/1000) + 2000 * (1*1*1*1000*1/2000)
        let nominal = dg.nominal().unwrap();
        assert_relative_eq!(nominal.total(), 2000.0);
        assert_eq!(nominal.contents(), &[1200.0, 800.0]);
        assert_eq!(nominal.name(), "measMET_ZZ_cat3L");
    }

    #[test]
    fn test_source_order_does_not_matter() {
        let mk = |label: &str, sumw: f64, c: &[f64]| {
            SourceRecord::new(label)
                .with_gen_event_sumw(sumw)
                .with_histogram(h(&format!("measMET_{label}_cat3L"), c))
        };
        let srcs = [mk("s1", 123.0, &[1.0, 7.0]), mk("s2", 77.0, &[3.5, 0.25]), mk("s3", 9.0, &[0.5, 2.0])];
        let cfg = AggregatorConfig::new("measMET", CategoryFilter::Single("cat3L".into()))
            .luminosity(41.5)
            .xsections(xs(&["s1", "s2", "s3"]));

        let fwd = DataGroup::aggregate("WZ", ProcessType::Background, &srcs, &cfg).unwrap();
        let rev_srcs = [srcs[2].clone(), srcs[0].clone(), srcs[1].clone()];
        let rev = DataGroup::aggregate("WZ", ProcessType::Background, &rev_srcs, &cfg).unwrap();
        let (a, b) = (fwd.nominal().unwrap(), rev.nominal().unwrap());
        for (x, y) in a.contents().iter().zip(b.contents()) {
            assert_relative_eq!(x, y, max_relative = 1e-12);
        }
        for (x, y) in a.sumw2().iter().zip(b.sumw2()) {
            assert_relative_eq!(x, y, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_selection_cleaning_and_systematics() {
        let src = SourceRecord::new("DoubleMuon")
            .with_histogram(h("measMET_DoubleMuon_cat3L", &[4.0, -2.0]))
            .with_histogram(h("njet_DoubleMuon_cat3L", &[9.0, 9.0]))
            .with_histogram(h("measMET_DoubleMuon_cat4L", &[9.0, 9.0]))
            .with_histogram(h("measMET_DoubleMuon_cat3L_sys_jerUp", &[5.0, 1.0]))
            .with_histogram(h("measMET_DoubleMuon_cat3L_sys_jerDown;1", &[3.0, 1.0]));
        let cfg = AggregatorConfig::new("measMET", CategoryFilter::Single("cat3L".into()));
        let dg = DataGroup::aggregate("data", ProcessType::Data, &[src], &cfg).unwrap();

        assert_eq!(dg.catalogue().len(), 3);
        assert_eq!(dg.systematics().iter().collect::<Vec<_>>(), vec!["jer"]);
        match dg.get("nom") {
            Shape::Nominal(Some(n)) => assert_eq!(n.contents(), &[4.0, 0.0]),
            other => panic!("unexpected {other:?}"),
        }
        match dg.get("jer") {
            Shape::Variation { up: Some(u), down: Some(d) } => {
                assert_eq!(u.contents(), &[5.0, 1.0]);
                assert_eq!(d.contents(), &[3.0, 1.0]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(dg.get("pdf"), Shape::Variation { up: None, down: None });
    }

    #[test]
    fn test_observable_must_be_a_whole_token() {
        let src = SourceRecord::new("data")
            .with_histogram(h("measMET_data_cat3L", &[1.0, 2.0]))
            .with_histogram(h("measMETphi_data_cat3L", &[10.0, 20.0]))
            .with_histogram(h("xmeasMET_data_cat3L", &[100.0, 200.0]));
        let cfg = AggregatorConfig::new("measMET", CategoryFilter::Single("cat3L".into()));
        let dg = DataGroup::aggregate("data", ProcessType::Data, &[src], &cfg).unwrap();
        assert_eq!(dg.catalogue().len(), 1);
        assert_eq!(dg.nominal().unwrap().contents(), &[1.0, 2.0]);
    }

    #[test]
    fn test_token_boundaries() {
        assert!(contains_token("measMET_ZZ_cat3L", "measMET"));
        assert!(contains_token("ZZ_measMET", "measMET"));
        assert!(contains_token("pt_ll_ZZ_cat3L", "pt_ll"));
        assert!(!contains_token("measMETphi_ZZ_cat3L", "measMET"));
        assert!(!contains_token("anything", ""));
    }

    #[test]
    fn test_multi_category_merge_with_aliases() {
        let src = SourceRecord::new("ZH_125")
            .with_gen_event_sumw(1000.0)
            .with_histogram(h("measMET_ZH_125_catSignal-0jet", &[3.0, 4.0]))
            .with_histogram(h("measMET_ZH_125_catSignal-1jet", &[5.0, 6.0]))
            .with_histogram(h("measMET_ZH_125_catSignal-0jet_sys_puWeightUp", &[3.5, 4.5]))
            .with_histogram(h("measMET_ZH_125_catSignal-1jet_sys_puWeightUp", &[5.5, 6.5]));
        let cfg = AggregatorConfig::new(
            "measMET",
            CategoryFilter::Many(vec!["catSignal-1jet".into(), "catSignal-0jet".into()]),
        )
        .category_order(vec!["cat0Jet".into(), "cat1Jet".into()])
        .xsections(xs(&["ZH_125"]));

        let dg = DataGroup::aggregate("ZH", ProcessType::Signal, &[src], &cfg).unwrap();
        assert!(dg.catalogue().get(&HistKey::nominal("ZH", "cat0Jet")).is_some());

        let nominal = dg.nominal().unwrap();
        assert_eq!(nominal.contents(), &[3.0, 4.0, 0.0, 5.0, 6.0]);
        assert_eq!(nominal.name(), "measMET_ZH");

        let (up, down) = dg.variation("puWeight");
        assert_eq!(up.unwrap().contents(), &[3.5, 4.5, 0.0, 5.5, 6.5]);
        assert_eq!(up.unwrap().name(), "measMET_ZH_sys_puWeightUp");
        assert!(down.is_none());
    }

    #[test]
    fn test_bin_range_and_rebin() {
        let src = SourceRecord::new("data")
            .with_histogram(h("measMET_data_catEM", &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));
        let cfg = AggregatorConfig::new("measMET", CategoryFilter::Single("catEM".into()))
            .bin_range(1..5)
            .rebin(2);
        let dg = DataGroup::aggregate("data", ProcessType::Data, &[src], &cfg).unwrap();
        let n = dg.nominal().unwrap();
        assert_eq!(n.edges(), &[100.0, 300.0, 500.0]);
        assert_eq!(n.contents(), &[5.0, 9.0]);
    }

    #[test]
    fn test_mismatched_binning_across_sources_is_error() {
        let a = SourceRecord::new("a").with_histogram(h("measMET_a_cat3L", &[1.0, 2.0]));
        let b = SourceRecord::new("b").with_histogram(h("measMET_b_cat3L", &[1.0, 2.0, 3.0]));
        let cfg = AggregatorConfig::new("measMET", CategoryFilter::Single("cat3L".into()));
        let err = DataGroup::aggregate("data", ProcessType::Data, &[a, b], &cfg).unwrap_err();
        assert!(matches!(err, Error::BinningMismatch { .. }), "{err}");
    }

    #[test]
    fn test_unknown_category_in_merge_is_fatal() {
        let src = SourceRecord::new("data")
            .with_histogram(h("measMET_data_cat3L", &[1.0]))
            .with_histogram(h("measMET_data_cat4L", &[1.0]));
        let cfg = AggregatorConfig::new(
            "measMET",
            CategoryFilter::Many(vec!["cat3L".into(), "cat4L".into()]),
        )
        .category_order(vec!["cat3L".into()]);
        let err = DataGroup::aggregate("data", ProcessType::Data, &[src], &cfg).unwrap_err();
        assert!(matches!(err, Error::UnknownCategory(_)), "{err}");
    }

    #[test]
    fn test_store_entries_naming() {
        let src = SourceRecord::new("SingleMuon")
            .with_histogram(h("measMET_SingleMuon_cat3L", &[2.0]))
            .with_histogram(h("measMET_SingleMuon_cat3L_sys_jerUp", &[2.0]));
        let cfg = AggregatorConfig::new("measMET", CategoryFilter::Single("cat3L".into()));
        let dg = DataGroup::aggregate("data", ProcessType::Data, &[src], &cfg).unwrap();
        let keys: Vec<String> = dg.store_entries().into_keys().collect();
        assert_eq!(keys, vec!["data_jerUp".to_string(), "data_obs".to_string()]);
    }

    #[test]
    fn test_kfactor_scales_simulation() {
        let src = SourceRecord::new("DY")
            .with_gen_event_sumw(1000.0)
            .with_histogram(h("measMET_DY_cat3L", &[10.0]));
        let cfg = AggregatorConfig::new("measMET", CategoryFilter::Single("cat3L".into()))
            .kfactor(1.5)
            .xsections(xs(&["DY"]));
        let dg = DataGroup::aggregate("DY", ProcessType::Background, &[src], &cfg).unwrap();
        assert_relative_eq!(dg.nominal().unwrap().total(), 15.0);
    }
}
