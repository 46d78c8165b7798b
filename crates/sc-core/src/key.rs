//! Typed identity of a histogram inside a process.
//!
//! Source catalogues name histograms as
//! `{observable}_{process}_{category}[_sys_{tag}{Up|Down}]`. Everything past
//! the input boundary works with [`HistKey`] instead of name substrings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const SYS_PREFIX: &str = "sys_";

/// Kind of physics process a source contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessType {
    /// Signal hypothesis.
    Signal,
    /// Simulated background.
    Background,
    /// Observed data; never normalized.
    Data,
}

impl ProcessType {
    /// `true` for observed data.
    pub fn is_data(self) -> bool {
        self == ProcessType::Data
    }
}

impl FromStr for ProcessType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "signal" => Ok(Self::Signal),
            "background" => Ok(Self::Background),
            "data" => Ok(Self::Data),
            other => Err(Error::Validation(format!("unknown process type '{other}'"))),
        }
    }
}

impl fmt::Display for ProcessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Signal => "signal",
            Self::Background => "background",
            Self::Data => "data",
        })
    }
}

/// Variation direction of a histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    /// Nominal (no systematic shift).
    Nominal,
    /// +1σ variation.
    Up,
    /// −1σ variation.
    Down,
}

impl Direction {
    /// Name suffix used in histogram and store keys (`""`, `"Up"`, `"Down"`).
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Nominal => "",
            Self::Up => "Up",
            Self::Down => "Down",
        }
    }
}

/// Result of looking for a systematic tag in a histogram name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystematicMatch {
    /// No `sys_` token: the histogram is a nominal one.
    Nominal,
    /// `sys_{tag}{Up|Down}` token found.
    Variation {
        /// Tag without prefix and direction suffix (e.g. `jesTotal`).
        tag: String,
        /// Direction parsed from the suffix.
        direction: Direction,
    },
}

impl SystematicMatch {
    /// Extract the systematic token from a raw histogram name.
    ///
    /// The token starts at a `sys_` segment and runs over word characters and
    /// dots. A token without an `Up`/`Down` suffix, or with nothing before the
    /// suffix, is rejected.
    pub fn parse(name: &str) -> Result<Self> {
        let start = if name.starts_with(SYS_PREFIX) {
            0
        } else {
            match name.find("_sys_") {
                Some(pos) => pos + 1,
                None => return Ok(Self::Nominal),
            }
        };
        let rest = &name[start + SYS_PREFIX.len()..];
        let end = rest
            .char_indices()
            .find(|&(_, c)| !(c.is_alphanumeric() || c == '_' || c == '.'))
            .map_or(rest.len(), |(i, _)| i);
        let token = &rest[..end];

        let (tag, direction) = if let Some(tag) = token.strip_suffix("Up") {
            (tag, Direction::Up)
        } else if let Some(tag) = token.strip_suffix("Down") {
            (tag, Direction::Down)
        } else {
            return Err(Error::Validation(format!(
                "systematic token 'sys_{token}' in '{name}' has no Up/Down suffix"
            )));
        };
        if tag.is_empty() {
            return Err(Error::Validation(format!("empty systematic tag in '{name}'")));
        }
        Ok(Self::Variation { tag: tag.to_string(), direction })
    }

    /// Systematic tag, if any.
    pub fn tag(&self) -> Option<&str> {
        match self {
            Self::Nominal => None,
            Self::Variation { tag, .. } => Some(tag),
        }
    }

    /// Direction (`Nominal` when no tag was found).
    pub fn direction(&self) -> Direction {
        match self {
            Self::Nominal => Direction::Nominal,
            Self::Variation { direction, .. } => *direction,
        }
    }
}

/// Composite identity `(process, category, systematic, direction)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HistKey {
    /// Canonical process (data group) name.
    pub process: String,
    /// Canonical category token.
    pub category: String,
    /// Systematic tag, `None` for the nominal.
    pub systematic: Option<String>,
    /// Variation direction.
    pub direction: Direction,
}

impl HistKey {
    /// Nominal key.
    pub fn nominal(process: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            process: process.into(),
            category: category.into(),
            systematic: None,
            direction: Direction::Nominal,
        }
    }

    /// Systematic-variation key.
    pub fn variation(
        process: impl Into<String>,
        category: impl Into<String>,
        tag: impl Into<String>,
        direction: Direction,
    ) -> Self {
        Self {
            process: process.into(),
            category: category.into(),
            systematic: Some(tag.into()),
            direction,
        }
    }

    /// Key from a parsed systematic match.
    pub fn from_match(
        process: impl Into<String>,
        category: impl Into<String>,
        matched: SystematicMatch,
    ) -> Self {
        match matched {
            SystematicMatch::Nominal => Self::nominal(process, category),
            SystematicMatch::Variation { tag, direction } => {
                Self::variation(process, category, tag, direction)
            }
        }
    }

    /// `true` for the nominal histogram.
    pub fn is_nominal(&self) -> bool {
        self.systematic.is_none()
    }

    /// Canonical histogram name for this key.
    pub fn histogram_name(&self, observable: &str) -> String {
        let mut name = format!("{observable}_{}_{}", self.process, self.category);
        if let Some(tag) = &self.systematic {
            name.push('_');
            name.push_str(SYS_PREFIX);
            name.push_str(tag);
            name.push_str(self.direction.suffix());
        }
        name
    }
}
