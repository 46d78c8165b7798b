//! Read back the rate table of a rendered datacard.

use serde::Serialize;

use sc_core::{Error, Result};

/// Process order and rates recovered from a transcript.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateTable {
    /// Channel from the observation block, if present.
    pub channel: Option<String>,
    /// Observed total, if present.
    pub observation: Option<f64>,
    /// `(process, rate)` in column order.
    pub rates: Vec<(String, f64)>,
}

impl RateTable {
    /// Parse the `process` / `rate` rows of `transcript`.
    ///
    /// The first `process` row holds the names; the `rate` row the yields.
    pub fn parse(transcript: &str) -> Result<Self> {
        let mut channel = None;
        let mut observation = None;
        let mut processes: Option<Vec<&str>> = None;
        let mut rates: Option<Vec<f64>> = None;

        for line in transcript.lines() {
            let mut fields = line.split_whitespace();
            match fields.next() {
                Some("observation") => {
                    observation = fields.next().map(|v| parse_f64(v, line)).transpose()?;
                }
                Some("bin") if channel.is_none() => {
                    channel = fields.next().map(str::to_string);
                }
                Some("process") if processes.is_none() => processes = Some(fields.collect()),
                Some("rate") => {
                    rates = Some(fields.map(|v| parse_f64(v, line)).collect::<Result<_>>()?);
                }
                _ => {}
            }
        }

        let processes =
            processes.ok_or_else(|| Error::Validation("no process row in datacard".into()))?;
        let rates = rates.ok_or_else(|| Error::Validation("no rate row in datacard".into()))?;
        if processes.len() != rates.len() {
            return Err(Error::Validation(format!(
                "{} processes but {} rates",
                processes.len(),
                rates.len()
            )));
        }
        Ok(Self {
            channel,
            observation,
            rates: processes.into_iter().map(String::from).zip(rates).collect(),
        })
    }

    /// Rate of `process`.
    pub fn rate(&self, process: &str) -> Option<f64> {
        self.rates.iter().find(|(p, _)| p == process).map(|&(_, r)| r)
    }
}

fn parse_f64(value: &str, line: &str) -> Result<f64> {
    value
        .parse()
        .map_err(|_| Error::Validation(format!("bad number '{value}' in line '{line}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datacard::Datacard;
    use approx::assert_relative_eq;
    use sc_core::Histogram;
    use std::path::Path;

    #[test]
    fn test_round_trip_through_render() {
        let mut dc = Datacard::new(Path::new("/nonexistent"), "rt", "catEM");
        dc.set_header().unwrap();
        let obs = Histogram::from_counts("d", vec![0.0, 1.0, 2.0], vec![7.0, 3.0]).unwrap();
        dc.set_observation(&obs).unwrap();
        let yields = [("ZH", 0.12345), ("WZ", 41.9996), ("TOP", 3.0)];
        for (p, y) in yields {
            let hist = Histogram::from_counts(p, vec![0.0, 1.0], vec![y]).unwrap();
            dc.add_nominal(p, &hist).unwrap();
        }
        dc.add_flat_nuisance("WZ", "lumi", 1.025).unwrap();

        let table = RateTable::parse(&dc.render()).unwrap();
        assert_eq!(table.channel.as_deref(), Some("catEM"));
        assert_eq!(table.observation, Some(10.0));
        let names: Vec<&str> = table.rates.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(names, vec!["ZH", "WZ", "TOP"]);
        for ((_, parsed), (_, y)) in table.rates.iter().zip(yields) {
            assert_relative_eq!(*parsed, y, epsilon = 5e-4);
        }
        assert_eq!(table.rate("WZ"), Some(42.0));
    }

    #[test]
    fn test_missing_rows_are_errors() {
        assert!(RateTable::parse("imax *\n---").is_err());
        assert!(RateTable::parse("process A B\nrate 1.0").is_err());
        assert!(RateTable::parse("process A\nrate x").is_err());
    }
}
