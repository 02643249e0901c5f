//! Ranking configuration: fusion presets, BM25 parameters and fallback constants.

use crate::{IndexError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum number of results returned by fused search and body-only search.
pub const MAX_RESULTS: usize = 100;

/// Length assumed for a document missing from a field's length table, and the
/// average length used when that table is empty.
pub const FALLBACK_DOC_LEN: f64 = 500.0;

/// Norm assumed for a document with no stored (or a zero) cosine norm.
pub const DEFAULT_DOC_NORM: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

/// Fusion weights of one preset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Weights {
    pub title: f64,
    pub body: f64,
    pub anchor: f64,
    pub use_authority_boost: bool,
    pub boost_alpha: f64,
}

impl Weights {
    const fn plain(title: f64, body: f64, anchor: f64) -> Self {
        Self { title, body, anchor, use_authority_boost: false, boost_alpha: 0.0 }
    }

    const fn boosted(title: f64, body: f64, anchor: f64, boost_alpha: f64) -> Self {
        Self { title, body, anchor, use_authority_boost: true, boost_alpha }
    }
}

/// The closed set of fusion presets. Unknown names are rejected when parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Preset {
    BaseBodyNoPr,
    BaseBodyPr,
    BaseTitleNoPr,
    BaseTitlePr,
    Title60NoPr,
    Title60Pr,
    #[default]
    Balanced2NoPr,
    Balanced2Pr,
    Body50NoPr,
    Body50Pr,
    PrLowTitle,
    Recommended1,
    Recommended2,
}

impl Preset {
    pub const ALL: [Preset; 13] = [
        Preset::BaseBodyNoPr,
        Preset::BaseBodyPr,
        Preset::BaseTitleNoPr,
        Preset::BaseTitlePr,
        Preset::Title60NoPr,
        Preset::Title60Pr,
        Preset::Balanced2NoPr,
        Preset::Balanced2Pr,
        Preset::Body50NoPr,
        Preset::Body50Pr,
        Preset::PrLowTitle,
        Preset::Recommended1,
        Preset::Recommended2,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Preset::BaseBodyNoPr => "BASE_BODY_NO_PR",
            Preset::BaseBodyPr => "BASE_BODY_PR",
            Preset::BaseTitleNoPr => "BASE_TITLE_NO_PR",
            Preset::BaseTitlePr => "BASE_TITLE_PR",
            Preset::Title60NoPr => "TITLE_60_NO_PR",
            Preset::Title60Pr => "TITLE_60_PR",
            Preset::Balanced2NoPr => "BALANCED_2_NO_PR",
            Preset::Balanced2Pr => "BALANCED_2_PR",
            Preset::Body50NoPr => "BODY_50_NO_PR",
            Preset::Body50Pr => "BODY_50_PR",
            Preset::PrLowTitle => "PR_LOW_TITLE",
            Preset::Recommended1 => "RECOMMENDED_1",
            Preset::Recommended2 => "RECOMMENDED_2",
        }
    }

    pub fn weights(&self) -> Weights {
        match self {
            Preset::BaseBodyNoPr => Weights::plain(0.0, 1.0, 0.0),
            Preset::BaseBodyPr => Weights::boosted(0.0, 1.0, 0.0, 0.02),
            Preset::BaseTitleNoPr => Weights::plain(1.0, 0.0, 0.0),
            Preset::BaseTitlePr => Weights::boosted(1.0, 0.0, 0.0, 0.02),
            Preset::Title60NoPr => Weights::plain(0.6, 0.3, 0.1),
            Preset::Title60Pr => Weights::boosted(0.6, 0.3, 0.1, 0.02),
            Preset::Balanced2NoPr => Weights::plain(0.45, 0.35, 0.2),
            Preset::Balanced2Pr => Weights::boosted(0.45, 0.35, 0.2, 0.02),
            Preset::Body50NoPr => Weights::plain(0.3, 0.5, 0.2),
            Preset::Body50Pr => Weights::boosted(0.3, 0.5, 0.2, 0.02),
            Preset::PrLowTitle => Weights::boosted(0.5, 0.3, 0.2, 0.02),
            Preset::Recommended1 => Weights::boosted(0.5, 0.3, 0.2, 0.1),
            Preset::Recommended2 => Weights::boosted(0.45, 0.35, 0.2, 0.08),
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_uppercase();
        // Spelling used by older ENGINE_VERSION settings.
        if wanted == "BASE_BODY__PR" {
            return Ok(Preset::BaseBodyPr);
        }
        Preset::ALL.into_iter().find(|p| p.name() == wanted).ok_or_else(|| {
            let known: Vec<&str> = Preset::ALL.iter().map(|p| p.name()).collect();
            IndexError::configuration("preset", format!("unknown preset {s:?}, expected one of {}", known.join(", ")))
        })
    }
}

/// How the body field is scored inside fused search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyScoring {
    #[default]
    Bm25,
    Cosine,
}

impl FromStr for BodyScoring {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bm25" => Ok(BodyScoring::Bm25),
            "cosine" | "tfidf" => Ok(BodyScoring::Cosine),
            other => Err(IndexError::configuration("body scoring", format!("unknown strategy {other:?}"))),
        }
    }
}

/// How posting block files are accessed at query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreMode {
    /// Positioned reads from the block files for every posting list.
    #[default]
    Disk,
    /// Load every block into memory at startup.
    Memory,
}

impl FromStr for StoreMode {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "disk" => Ok(StoreMode::Disk),
            "memory" | "mem" => Ok(StoreMode::Memory),
            other => Err(IndexError::configuration("store mode", format!("unknown store mode {other:?}"))),
        }
    }
}

/// Settings fixed for the lifetime of a query engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineConfig {
    pub preset: Preset,
    pub body_scoring: BodyScoring,
    pub bm25: Bm25Params,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_preset_parses_back_from_its_name() {
        for p in Preset::ALL {
            assert_eq!(p.name().parse::<Preset>().unwrap(), p);
            let w = p.weights();
            assert!(w.title >= 0.0 && w.body >= 0.0 && w.anchor >= 0.0);
            assert_eq!(w.use_authority_boost, w.boost_alpha > 0.0);
        }
        assert_eq!("balanced_2_pr".parse::<Preset>().unwrap(), Preset::Balanced2Pr);
    }

    #[test]
    fn legacy_double_underscore_name_is_accepted() {
        assert_eq!("BASE_BODY__PR".parse::<Preset>().unwrap(), Preset::BaseBodyPr);
        assert_eq!(Preset::BaseBodyPr.to_string(), "BASE_BODY_PR");
    }

    #[test]
    fn unknown_preset_is_rejected() {
        let err = "FANCY".parse::<Preset>().unwrap_err();
        assert!(matches!(err, IndexError::Configuration { .. }));
    }

    #[test]
    fn defaults() {
        assert_eq!(Preset::default(), Preset::Balanced2NoPr);
        assert_eq!(Bm25Params::default(), Bm25Params { k1: 1.5, b: 0.75 });
        assert_eq!(FALLBACK_DOC_LEN, 500.0);
        assert_eq!(DEFAULT_DOC_NORM, 1.0);
    }
}
