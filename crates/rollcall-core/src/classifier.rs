//! Confidence tiers for attendance status.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ReconcileError;

pub const DEFAULT_HIGH_CUT: f32 = 0.85;
pub const DEFAULT_MEDIUM_CUT: f32 = 0.70;
pub const DEFAULT_LOW_CUT: f32 = 0.60;

/// Attendance status derived from a similarity score, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StatusTier {
    Present,
    Uncertain,
    #[serde(rename = "Low_Confidence")]
    LowConfidence,
    #[serde(rename = "Not_Recognized")]
    NotRecognized,
}

impl StatusTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusTier::Present => "Present",
            StatusTier::Uncertain => "Uncertain",
            StatusTier::LowConfidence => "Low_Confidence",
            StatusTier::NotRecognized => "Not_Recognized",
        }
    }
}

impl fmt::Display for StatusTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cut points separating the four tiers. Always strictly ordered
/// `high > medium > low`; construct through [`TierThresholds::new`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TierThresholds {
    high: f32,
    medium: f32,
    low: f32,
}

impl TierThresholds {
    pub fn new(high: f32, medium: f32, low: f32) -> Result<Self, ReconcileError> {
        let finite = high.is_finite() && medium.is_finite() && low.is_finite();
        if !finite || !(high > medium && medium > low) {
            return Err(ReconcileError::InvalidTierCutPoints { high, medium, low });
        }
        Ok(Self { high, medium, low })
    }

    pub fn high(&self) -> f32 {
        self.high
    }

    pub fn medium(&self) -> f32 {
        self.medium
    }

    pub fn low(&self) -> f32 {
        self.low
    }

    /// Map a score to its tier. Total over every f32; NaN is `NotRecognized`.
    pub fn classify(&self, score: f32) -> StatusTier {
        if score >= self.high {
            StatusTier::Present
        } else if score >= self.medium {
            StatusTier::Uncertain
        } else if score >= self.low {
            StatusTier::LowConfidence
        } else {
            StatusTier::NotRecognized
        }
    }
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            high: DEFAULT_HIGH_CUT,
            medium: DEFAULT_MEDIUM_CUT,
            low: DEFAULT_LOW_CUT,
        }
    }
}

impl<'de> Deserialize<'de> for TierThresholds {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct Raw {
            high: f32,
            medium: f32,
            low: f32,
        }

        let raw = Raw::deserialize(deserializer)?;
        TierThresholds::new(raw.high, raw.medium, raw.low).map_err(serde::de::Error::custom)
    }
}

/// Number of accepted matches in each tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierCounts {
    pub present: usize,
    pub uncertain: usize,
    pub low_confidence: usize,
    pub not_recognized: usize,
}

impl TierCounts {
    pub fn record(&mut self, tier: StatusTier) {
        match tier {
            StatusTier::Present => self.present += 1,
            StatusTier::Uncertain => self.uncertain += 1,
            StatusTier::LowConfidence => self.low_confidence += 1,
            StatusTier::NotRecognized => self.not_recognized += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.present + self.uncertain + self.low_confidence + self.not_recognized
    }
}
