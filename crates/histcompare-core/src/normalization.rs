//! Per-source normalization factors.
//!
//! A simulated or alternate sample is brought to the observed sample's
//! exposure by a single scalar. The usual form is a ratio of exposures
//! (protons on target, trigger counts): `reference / exposure`.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How a source's normalization factor is derived.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizationSpec {
    /// Factor 1.
    #[default]
    Unit,
    /// A literal factor.
    Fixed { factor: f64 },
    /// `reference / exposure`.
    ExposureRatio { reference: f64, exposure: f64 },
}

impl NormalizationSpec {
    /// Compute the factor, rejecting anything that is not finite and non-negative.
    pub fn resolve(&self, source_id: &str) -> Result<NormalizationFactor> {
        let invalid = |reason: String| Error::InvalidNormalization {
            source_id: source_id.to_string(),
            reason,
        };
        match *self {
            Self::Unit => Ok(NormalizationFactor::UNIT),
            Self::Fixed { factor } => {
                if !factor.is_finite() || factor < 0.0 {
                    return Err(invalid(format!(
                        "factor {factor} is not a finite non-negative number"
                    )));
                }
                Ok(NormalizationFactor(factor))
            }
            Self::ExposureRatio {
                reference,
                exposure,
            } => NormalizationFactor::from_exposures(reference, exposure).map_err(invalid),
        }
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Self::Unit)
    }
}

impl std::fmt::Display for NormalizationSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unit => write!(f, "unit"),
            Self::Fixed { factor } => write!(f, "fixed({factor})"),
            Self::ExposureRatio {
                reference,
                exposure,
            } => write!(f, "{reference:e} / {exposure:e}"),
        }
    }
}

/// A validated scalar multiplier. Immutable once computed.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct NormalizationFactor(f64);

impl NormalizationFactor {
    pub const UNIT: NormalizationFactor = NormalizationFactor(1.0);

    pub fn value(self) -> f64 {
        self.0
    }

    /// `reference / exposure`. The exposure must be finite and positive, the
    /// reference finite and non-negative.
    pub fn from_exposures(reference: f64, exposure: f64) -> std::result::Result<Self, String> {
        if !exposure.is_finite() || exposure <= 0.0 {
            return Err(format!("exposure {exposure} must be finite and positive"));
        }
        if !reference.is_finite() || reference < 0.0 {
            return Err(format!("reference exposure {reference} must be finite and non-negative"));
        }
        Ok(Self(reference / exposure))
    }
}

impl Default for NormalizationFactor {
    fn default() -> Self {
        Self::UNIT
    }
}

impl std::fmt::Display for NormalizationFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}
