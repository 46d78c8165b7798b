//! Datacard builder.
//!
//! A [`Datacard`] accumulates, for one channel, the observation, the nominal
//! rate of every process, flat (`lnN`) and `shape` nuisance effects, and
//! free-form extra directives. [`Datacard::dump`] serializes everything to the
//! fixed-column transcript and writes the companion shape store next to it.
//! After a dump the card is terminal.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use sc_core::{Error, Histogram, Result};

use crate::aggregator::DATA_OBS;

const SEPARATOR_WIDTH: usize = 30;
const LABEL_WIDTH: usize = 8;
const CELL_WIDTH: usize = 15;

/// Kind of a nuisance row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NuisanceKind {
    /// Log-normal flat effect.
    LnN,
    /// Up/down template effect.
    Shape,
}

impl fmt::Display for NuisanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LnN => "lnN",
            Self::Shape => "shape",
        })
    }
}

/// Builder lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardState {
    /// Nothing written yet.
    Empty,
    /// Header lines present.
    HeaderWritten,
    /// Observation recorded.
    ObservationSet,
    /// At least one nominal or nuisance added.
    Building,
    /// Serialized; no further mutation.
    Dumped,
}

/// Rendered row label of a nuisance (`{name:<20} {kind}`).
pub fn nuisance_label(name: &str, kind: NuisanceKind) -> String {
    format!("{name:<20} {kind}")
}

/// One channel's datacard under construction.
#[derive(Debug, Clone)]
pub struct Datacard {
    channel: String,
    card_path: PathBuf,
    store_path: PathBuf,
    state: CardState,
    nsignal: usize,
    header: Vec<String>,
    observation: Vec<String>,
    rates: Vec<(String, f64)>,
    nominals: BTreeMap<String, Histogram>,
    nuisances: BTreeMap<String, BTreeMap<String, f64>>,
    extras: BTreeSet<String>,
    store: BTreeMap<String, Histogram>,
}

impl Datacard {
    /// Card `name` for `channel` under `out_root`.
    ///
    /// Creates `out_root/cards-{name}/` if needed; the transcript and store
    /// land in that directory as `shapes-{channel}.dat` / `.parquet`.
    pub fn create(out_root: &Path, name: &str, channel: &str) -> Result<Self> {
        let card = Self::new(out_root, name, channel);
        if let Some(dir) = card.card_path.parent() {
            fs::create_dir_all(dir)?;
        }
        Ok(card)
    }

    /// Like [`Datacard::create`] but touches no file until [`Datacard::dump`].
    pub fn new(out_root: &Path, name: &str, channel: &str) -> Self {
        let dir = out_root.join(format!("cards-{name}"));
        Self {
            channel: channel.to_string(),
            card_path: dir.join(format!("shapes-{channel}.dat")),
            store_path: dir.join(format!("shapes-{channel}.parquet")),
            state: CardState::Empty,
            nsignal: 1,
            header: Vec::new(),
            observation: Vec::new(),
            rates: Vec::new(),
            nominals: BTreeMap::new(),
            nuisances: BTreeMap::new(),
            extras: BTreeSet::new(),
            store: BTreeMap::new(),
        }
    }

    /// Channel (bin) name.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Transcript path.
    pub fn card_path(&self) -> &Path {
        &self.card_path
    }

    /// Companion store path.
    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CardState {
        self.state
    }

    /// `(process, rate)` in insertion order.
    pub fn rates(&self) -> &[(String, f64)] {
        &self.rates
    }

    /// Histograms queued for the companion store.
    pub fn store(&self) -> &BTreeMap<String, Histogram> {
        &self.store
    }

    /// Nuisance rows: label → process → effect.
    pub fn nuisances(&self) -> &BTreeMap<String, BTreeMap<String, f64>> {
        &self.nuisances
    }

    /// Number of leading signal processes (default 1).
    pub fn nsignal(&self) -> usize {
        self.nsignal
    }

    /// Set the number of leading signal processes.
    pub fn set_nsignal(&mut self, nsignal: usize) -> Result<()> {
        self.ensure_mutable("set_nsignal")?;
        self.nsignal = nsignal;
        Ok(())
    }

    /// Boilerplate counts and the shape-store location line.
    pub fn set_header(&mut self) -> Result<()> {
        self.ensure_mutable("set_header")?;
        if self.state != CardState::Empty {
            return Err(Error::CardState("header already written".into()));
        }
        let store_name = self
            .store_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.header = vec![
            "imax * number of categories".to_string(),
            "jmax * number of samples minus one".to_string(),
            "kmax * number of nuisance parameters".to_string(),
            separator(),
            format!("shapes * * {store_name:<20} $PROCESS $PROCESS_$SYSTEMATIC"),
        ];
        self.state = CardState::HeaderWritten;
        Ok(())
    }

    /// Record the observed total and store `hist` as `data_obs`.
    pub fn set_observation(&mut self, hist: &Histogram) -> Result<()> {
        self.ensure_mutable("set_observation")?;
        if !self.observation.is_empty() {
            return Err(Error::CardState("observation already set".into()));
        }
        let total = format!("{:?}", hist.total());
        self.observation = vec![
            format!("bin          {:>10}", self.channel),
            format!("observation  {total:>10}"),
        ];
        self.store.insert(DATA_OBS.to_string(), hist.clone().with_name(DATA_OBS));
        if self.state == CardState::HeaderWritten {
            self.state = CardState::ObservationSet;
        }
        Ok(())
    }

    /// Append `(process, total)` to the rate table and store the nominal.
    pub fn add_nominal(&mut self, process: &str, hist: &Histogram) -> Result<()> {
        self.ensure_mutable("add_nominal")?;
        if self.nominals.contains_key(process) {
            return Err(Error::Validation(format!("nominal for '{process}' already added")));
        }
        self.rates.push((process.to_string(), hist.total()));
        let stored = hist.clone().with_name(process);
        self.store.insert(process.to_string(), stored.clone());
        self.nominals.insert(process.to_string(), stored);
        self.mark_building();
        Ok(())
    }

    /// Scalar `lnN` effect of `name` on `process`; last write wins.
    pub fn add_flat_nuisance(&mut self, process: &str, name: &str, value: f64) -> Result<()> {
        self.ensure_mutable("add_flat_nuisance")?;
        self.set_effect(nuisance_label(name, NuisanceKind::LnN), process, value);
        self.mark_building();
        Ok(())
    }

    /// Register a `shape` nuisance from an up/down histogram pair.
    ///
    /// Returns `Ok(false)` when the pair is skipped: a direction is missing,
    /// a direction has no positive bin, or both directions equal the nominal
    /// (after reflection/symmetrization).
    pub fn add_shape_nuisance(
        &mut self,
        process: &str,
        tag: &str,
        cardname: &str,
        shape: (Option<&Histogram>, Option<&Histogram>),
        symmetrize: bool,
    ) -> Result<bool> {
        self.ensure_mutable("add_shape_nuisance")?;
        let Some(nominal) = self.nominals.get(process) else {
            return Err(Error::CardState(format!(
                "shape nuisance '{cardname}' for '{process}' added before its nominal"
            )));
        };

        let (Some(up), Some(down)) = shape else {
            log::debug!("{process}: '{tag}' is missing a direction, skipped");
            return Ok(false);
        };
        if !up.has_positive_bin() || !down.has_positive_bin() {
            log::debug!("{process}: '{tag}' has an empty direction, skipped");
            return Ok(false);
        }

        let mut up = up.clone();
        let mut down = down.clone();
        // one-sided variation stored twice
        if up.same_shape(&down) {
            up = down.reflect_through(nominal)?;
        }
        if symmetrize {
            (up, down) = Histogram::symmetric_envelope(nominal, &up, &down)?;
        }
        if up.same_shape(nominal) && down.same_shape(nominal) {
            log::debug!("{process}: '{tag}' does not change the nominal, skipped");
            return Ok(false);
        }

        let up_key = format!("{process}_{cardname}Up");
        let down_key = format!("{process}_{cardname}Down");
        self.store.insert(up_key.clone(), up.with_name(up_key));
        self.store.insert(down_key.clone(), down.with_name(down_key));
        self.set_effect(nuisance_label(cardname, NuisanceKind::Shape), process, 1.0);
        self.mark_building();
        Ok(true)
    }

    /// Free-floating normalization directive (deduplicated).
    pub fn add_rate_param(
        &mut self,
        name: &str,
        channel: &str,
        process: &str,
        vmin: f64,
        vmax: f64,
    ) -> Result<()> {
        self.ensure_mutable("add_rate_param")?;
        self.extras.insert(format!("{name} rateParam {channel} {process} 1 [{vmin},{vmax}]"));
        self.mark_building();
        Ok(())
    }

    /// Per-bin MC statistics directive for this channel.
    pub fn add_auto_stat(&mut self) -> Result<()> {
        self.ensure_mutable("add_auto_stat")?;
        self.extras.insert(format!("{} autoMCStats 0 0 1", self.channel));
        self.mark_building();
        Ok(())
    }

    /// Transcript text.
    pub fn render(&self) -> String {
        let sep = separator();
        let mut lines: Vec<String> = Vec::new();
        lines.extend(self.header.iter().cloned());
        lines.push(sep.clone());
        lines.extend(self.observation.iter().cloned());
        lines.push(sep.clone());

        let mut bins_line = format!("{:<LABEL_WIDTH$}", "bin");
        let mut proc_line = format!("{:<LABEL_WIDTH$}", "process");
        let mut indx_line = format!("{:<LABEL_WIDTH$}", "process");
        let mut rate_line = format!("{:<LABEL_WIDTH$}", "rate");
        for (i, (process, rate)) in self.rates.iter().enumerate() {
            let index = i as i64 - self.nsignal as i64 + 1;
            bins_line.push_str(&format!("{:>CELL_WIDTH$}", self.channel));
            proc_line.push_str(&format!("{process:>CELL_WIDTH$}"));
            indx_line.push_str(&format!("{index:>CELL_WIDTH$}"));
            rate_line.push_str(&format!("{:>CELL_WIDTH$}", format!("{rate:.3}")));
        }
        lines.extend([bins_line, proc_line, indx_line, rate_line]);
        lines.push(sep);

        for (label, effects) in &self.nuisances {
            let mut line = format!("{label:<LABEL_WIDTH$}");
            for (process, _) in &self.rates {
                match effects.get(process) {
                    Some(v) => line.push_str(&format!("{:>CELL_WIDTH$}", format!("{v:.3}"))),
                    None => line.push_str(&format!("{:>CELL_WIDTH$}", "-")),
                }
            }
            lines.push(line);
        }
        lines.extend(self.extras.iter().cloned());
        lines.join("\n")
    }

    /// Write the transcript and the companion store, then freeze the card.
    pub fn dump(&mut self) -> Result<()> {
        self.ensure_mutable("dump")?;
        if self.state == CardState::Empty {
            return Err(Error::CardState("dump before set_header".into()));
        }
        if let Some(dir) = self.card_path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.card_path, self.render())?;
        sc_io::write_store(&self.store_path, &self.store)?;
        self.state = CardState::Dumped;
        log::debug!(
            "dumped {} ({} processes, {} nuisances, {} shapes)",
            self.card_path.display(),
            self.rates.len(),
            self.nuisances.len(),
            self.store.len()
        );
        Ok(())
    }

    fn ensure_mutable(&self, op: &str) -> Result<()> {
        if self.state == CardState::Dumped {
            return Err(Error::CardState(format!(
                "{op} on {} after dump",
                self.card_path.display()
            )));
        }
        Ok(())
    }

    fn mark_building(&mut self) {
        if matches!(self.state, CardState::HeaderWritten | CardState::ObservationSet) {
            self.state = CardState::Building;
        }
    }

    fn set_effect(&mut self, label: String, process: &str, value: f64) {
        self.nuisances.entry(label).or_default().insert(process.to_string(), value);
    }
}

fn separator() -> String {
    "-".repeat(SEPARATOR_WIDTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(contents: &[f64]) -> Histogram {
        let edges = (0..=contents.len()).map(|i| i as f64).collect();
        Histogram::from_counts("h", edges, contents.to_vec()).unwrap()
    }

    fn card() -> Datacard {
        let mut dc = Datacard::new(Path::new("/nonexistent"), "test", "cat3L");
        dc.set_header().unwrap();
        dc
    }

    #[test]
    fn test_render_layout() {
        let mut dc = card();
        dc.set_observation(&h(&[10.0, 20.0])).unwrap();
        dc.add_nominal("ZH", &h(&[1.0, 2.0])).unwrap();
        dc.add_nominal("ZZ", &h(&[5.0, 7.5])).unwrap();
        dc.add_flat_nuisance("ZH", "lumi", 1.025).unwrap();
        dc.add_flat_nuisance("ZZ", "lumi", 1.025).unwrap();
        dc.add_flat_nuisance("ZZ", "QCDScale", 1.1).unwrap();
        dc.add_rate_param("rZZ", "cat*", "ZZ", 0.1, 10.0).unwrap();
        dc.add_auto_stat().unwrap();

        let expected = [
            "imax * number of categories",
            "jmax * number of samples minus one",
            "kmax * number of nuisance parameters",
            "------------------------------",
            "shapes * * shapes-cat3L.parquet $PROCESS $PROCESS_$SYSTEMATIC",
            "------------------------------",
            "bin               cat3L",
            "observation        30.0",
            "------------------------------",
            "bin               cat3L          cat3L",
            "process              ZH             ZZ",
            "process               0              1",
            "rate              3.000         12.500",
            "------------------------------",
            "QCDScale             lnN              -          1.100",
            "lumi                 lnN          1.025          1.025",
            "cat3L autoMCStats 0 0 1",
            "rZZ rateParam cat* ZZ 1 [0.1,10]",
        ]
        .join("\n");
        assert_eq!(dc.render(), expected);
        assert!(!dc.render().ends_with('\n'));
        assert_eq!(dc.state(), CardState::Building);
    }

    #[test]
    fn test_signal_indices_count_down_from_zero() {
        let mut dc = card();
        dc.set_nsignal(2).unwrap();
        for p in ["S1", "S2", "B1"] {
            dc.add_nominal(p, &h(&[1.0])).unwrap();
        }
        let text = dc.render();
        let index_row = text.lines().filter(|l| l.starts_with("process")).nth(1).unwrap();
        let cells: Vec<&str> = index_row.split_whitespace().skip(1).collect();
        assert_eq!(cells, vec!["-1", "0", "1"]);
    }

    #[test]
    fn test_flat_nuisance_last_write_wins() {
        let mut dc = card();
        dc.add_nominal("ZZ", &h(&[1.0])).unwrap();
        dc.add_flat_nuisance("ZZ", "lumi", 1.02).unwrap();
        dc.add_flat_nuisance("ZZ", "lumi", 1.03).unwrap();
        let row = &dc.nuisances()[&nuisance_label("lumi", NuisanceKind::LnN)];
        assert_eq!(row.len(), 1);
        assert_eq!(row["ZZ"], 1.03);
    }

    #[test]
    fn test_shape_gate_skips_missing_or_empty() {
        let mut dc = card();
        dc.add_nominal("ZZ", &h(&[4.0, 4.0])).unwrap();
        let up = h(&[5.0, 4.0]);
        let empty = h(&[0.0, -1.0]);
        assert!(!dc.add_shape_nuisance("ZZ", "jer", "CMS_JER", (Some(&up), None), false).unwrap());
        assert!(
            !dc.add_shape_nuisance("ZZ", "jer", "CMS_JER", (Some(&up), Some(&empty)), false).unwrap()
        );
        assert!(dc.nuisances().is_empty());
        assert_eq!(dc.store().len(), 1);
    }

    #[test]
    fn test_shape_identical_to_nominal_emits_no_row() {
        let mut dc = card();
        let nom = h(&[4.0, 6.0]);
        dc.add_nominal("ZZ", &nom).unwrap();
        let registered =
            dc.add_shape_nuisance("ZZ", "pu", "CMS_PU", (Some(&nom), Some(&nom)), false).unwrap();
        assert!(!registered);
        assert!(dc.nuisances().is_empty());
        assert!(!dc.render().contains("CMS_PU"));
    }

    #[test]
    fn test_shape_reflection_when_up_equals_down() {
        let mut dc = card();
        dc.add_nominal("ZZ", &h(&[10.0, 20.0])).unwrap();
        let one_sided = h(&[8.0, 21.0]);
        assert!(
            dc.add_shape_nuisance("ZZ", "EWK", "EWKZZWZ", (Some(&one_sided), Some(&one_sided)), false)
                .unwrap()
        );
        assert_eq!(dc.store()["ZZ_EWKZZWZUp"].contents(), &[12.0, 19.0]);
        assert_eq!(dc.store()["ZZ_EWKZZWZDown"].contents(), &[8.0, 21.0]);
        assert_eq!(dc.store()["ZZ_EWKZZWZUp"].name(), "ZZ_EWKZZWZUp");
        let row = &dc.nuisances()[&nuisance_label("EWKZZWZ", NuisanceKind::Shape)];
        assert_eq!(row["ZZ"], 1.0);
    }

    #[test]
    fn test_distinct_directions_are_not_reflected() {
        let mut dc = card();
        dc.add_nominal("ZZ", &h(&[10.0, 20.0])).unwrap();
        let up = h(&[11.0, 20.0]);
        let down = h(&[9.5, 20.0]);
        assert!(dc.add_shape_nuisance("ZZ", "jer", "CMS_JER", (Some(&up), Some(&down)), false).unwrap());
        assert_eq!(dc.store()["ZZ_CMS_JERUp"].contents(), &[11.0, 20.0]);
        assert_eq!(dc.store()["ZZ_CMS_JERDown"].contents(), &[9.5, 20.0]);
    }

    #[test]
    fn test_one_direction_at_nominal_is_kept_as_is() {
        let mut dc = card();
        let nom = h(&[10.0, 20.0]);
        dc.add_nominal("ZZ", &nom).unwrap();
        let down = h(&[8.0, 21.0]);
        assert!(dc.add_shape_nuisance("ZZ", "qcd", "QCDScale", (Some(&nom), Some(&down)), false).unwrap());
        assert!(dc.nuisances().contains_key(&nuisance_label("QCDScale", NuisanceKind::Shape)));
        let up = &dc.store()["ZZ_QCDScaleUp"];
        assert_eq!(up.contents(), nom.contents());
        // reflection would have produced 2*nominal - down
        assert_ne!(up.contents(), &[12.0, 19.0]);
        assert_eq!(dc.store()["ZZ_QCDScaleDown"].contents(), &[8.0, 21.0]);
    }

    #[test]
    fn test_symmetrized_shape() {
        let mut dc = card();
        dc.add_nominal("ZZ", &h(&[10.0, 20.0])).unwrap();
        let up = h(&[11.0, 20.5]);
        let down = h(&[7.0, 20.0]);
        assert!(dc.add_shape_nuisance("ZZ", "jes", "CMS_JES", (Some(&up), Some(&down)), true).unwrap());
        assert_eq!(dc.store()["ZZ_CMS_JESUp"].contents(), &[13.0, 20.5]);
        assert_eq!(dc.store()["ZZ_CMS_JESDown"].contents(), &[7.0, 19.5]);
        assert_eq!(dc.store()["ZZ_CMS_JESUp"].sumw2(), &[10.0, 20.0]);
    }

    #[test]
    fn test_shape_without_nominal_is_state_error() {
        let mut dc = card();
        let up = h(&[1.0]);
        let err = dc.add_shape_nuisance("WZ", "jer", "CMS_JER", (Some(&up), Some(&up)), false);
        assert!(matches!(err, Err(Error::CardState(_))));
    }

    #[test]
    fn test_duplicate_nominal_rejected() {
        let mut dc = card();
        dc.add_nominal("ZZ", &h(&[1.0])).unwrap();
        assert!(matches!(dc.add_nominal("ZZ", &h(&[2.0])), Err(Error::Validation(_))));
        assert_eq!(dc.rates().len(), 1);
    }

    #[test]
    fn test_extras_are_deduplicated() {
        let mut dc = card();
        dc.add_auto_stat().unwrap();
        dc.add_auto_stat().unwrap();
        dc.add_rate_param("r", "cat3L", "ZZ", 0.5, 2.0).unwrap();
        dc.add_rate_param("r", "cat3L", "ZZ", 0.5, 2.0).unwrap();
        let text = dc.render();
        assert_eq!(text.matches("autoMCStats").count(), 1);
        assert_eq!(text.matches("rateParam").count(), 1);
    }

    #[test]
    fn test_header_twice_and_dump_before_header() {
        let mut dc = card();
        assert!(matches!(dc.set_header(), Err(Error::CardState(_))));
        let mut empty = Datacard::new(Path::new("/nonexistent"), "x", "ch1");
        assert!(matches!(empty.dump(), Err(Error::CardState(_))));
    }
}
