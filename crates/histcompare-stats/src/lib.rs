//! Goodness-of-fit statistics for one-dimensional binned distributions.
//!
//! Compares an observed bin sequence against an expected (prediction) bin
//! sequence over an inclusive, 1-indexed bin range and returns a
//! [`GoodnessOfFitResult`] with the chi-squared sum, the number of contributing
//! bins and the upper-tail p-value. A second family of helpers divides two bin
//! sequences and derives the symmetric y-axis range of the resulting ratio.
//!
//! Nothing here returns an error. Unusable inputs (a missing side, differing
//! bin counts, an empty range) degrade to [`GoodnessOfFitResult::ZERO`] and a
//! `log::warn!` diagnostic.
//!
//! Bin slices are 0-indexed in memory; bin `i` of the domain convention lives
//! at slice index `i - 1`. Underflow and overflow never enter these slices.

use log::warn;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};

// ═══════════════════════════════════════════════════════════════════════════════
// Core types
// ═══════════════════════════════════════════════════════════════════════════════

/// A single histogram bin: content and its variance (sum of squared weights).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bin {
    pub content: f64,
    pub variance: f64,
}

impl Bin {
    /// Zero content, zero variance.
    pub const EMPTY: Bin = Bin {
        content: 0.0,
        variance: 0.0,
    };

    pub fn new(content: f64, variance: f64) -> Self {
        Self { content, variance }
    }

    /// Unweighted counting bin, where the variance equals the content.
    pub fn poisson(content: f64) -> Self {
        Self {
            content,
            variance: content,
        }
    }

    /// Statistical error (square root of the variance, clamped at zero).
    pub fn error(&self) -> f64 {
        self.variance.max(0.0).sqrt()
    }
}

/// Denominator convention for the per-bin chi-squared term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariancePolicy {
    /// Pearson's statistic: the expected content is its own variance estimate.
    /// Swapping observed and expected changes the result.
    Pearson,
    /// Observed variance plus expected variance.
    #[default]
    Combined,
}

impl VariancePolicy {
    /// Map the boolean "use bin errors" switch onto a policy.
    pub fn from_use_variance(use_variance: bool) -> Self {
        if use_variance {
            Self::Combined
        } else {
            Self::Pearson
        }
    }

    pub fn uses_variance(self) -> bool {
        self == Self::Combined
    }
}

impl std::fmt::Display for VariancePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pearson => write!(f, "pearson"),
            Self::Combined => write!(f, "combined"),
        }
    }
}

/// Inclusive, 1-indexed bin range. An unset bound selects the full range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BinRange {
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl BinRange {
    /// Every bin from 1 to N.
    pub const FULL: BinRange = BinRange {
        min: None,
        max: None,
    };

    pub fn new(min: usize, max: usize) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    /// Build from signed bounds where anything below 1 (conventionally `-1`)
    /// means "unset".
    pub fn from_bounds(min: i64, max: i64) -> Self {
        let bound = |v: i64| usize::try_from(v).ok().filter(|&v| v >= 1);
        Self {
            min: bound(min),
            max: bound(max),
        }
    }

    /// Clamp the range into `[1, n_bins]`.
    ///
    /// A lower bound below 1 becomes 1; an upper bound below 1 or above
    /// `n_bins` becomes `n_bins`. Returns `None` when the clamped range is
    /// empty (including `n_bins == 0`).
    pub fn resolve(&self, n_bins: usize) -> Option<(usize, usize)> {
        let first = match self.min {
            Some(m) if m >= 1 => m,
            _ => 1,
        };
        let last = match self.max {
            Some(m) if m >= 1 && m <= n_bins => m,
            _ => n_bins,
        };
        if first > last { None } else { Some((first, last)) }
    }
}

impl std::fmt::Display for BinRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.min, self.max) {
            (None, None) => write!(f, "full"),
            (min, max) => {
                let side = |b: Option<usize>| b.map_or_else(|| "*".to_string(), |v| v.to_string());
                write!(f, "[{}, {}]", side(min), side(max))
            }
        }
    }
}

/// Result of comparing two binned distributions.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GoodnessOfFitResult {
    pub chi_squared: f64,
    pub degrees_of_freedom: usize,
    pub p_value: f64,
}

impl GoodnessOfFitResult {
    /// The soft-failure value: no contributing bins, everything zero.
    pub const ZERO: GoodnessOfFitResult = GoodnessOfFitResult {
        chi_squared: 0.0,
        degrees_of_freedom: 0,
        p_value: 0.0,
    };

    /// `chi_squared / ndof`, or `None` when no bin contributed.
    pub fn reduced_chi_squared(&self) -> Option<f64> {
        if self.degrees_of_freedom == 0 {
            None
        } else {
            Some(self.chi_squared / self.degrees_of_freedom as f64)
        }
    }

    /// True when no bin contributed to the sum.
    pub fn is_empty(&self) -> bool {
        self.degrees_of_freedom == 0
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// 1. GOODNESS OF FIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Upper-tail probability of a chi-squared distribution with `ndof` degrees of
/// freedom exceeding `chi2`.
///
/// Zero degrees of freedom give a p-value of 0. So does a negative or
/// non-finite `chi2`, which no valid fit produces: it is never reported as a
/// perfect fit.
pub fn chi_squared_p_value(chi2: f64, ndof: usize) -> f64 {
    if ndof == 0 || !chi2.is_finite() || chi2 < 0.0 {
        return 0.0;
    }
    match ChiSquared::new(ndof as f64) {
        Ok(dist) => dist.sf(chi2).clamp(0.0, 1.0),
        Err(_) => 0.0,
    }
}

/// Chi-squared comparison of `observed` against `expected` over `range`.
///
/// Bins without statistical weight are skipped and do not count towards the
/// degrees of freedom: under [`VariancePolicy::Pearson`] a bin with zero
/// expected content, under [`VariancePolicy::Combined`] a bin whose summed
/// variance is not positive. `ndof` can therefore be smaller than the range
/// width.
///
/// Either side being `None`, differing bin counts, or a range that is empty
/// after clamping returns [`GoodnessOfFitResult::ZERO`] and logs a warning.
///
/// Pearson terms divide by the expected content as is, so a negative expected
/// bin (possible with signed event weights) contributes a negative term and
/// can drive `chi_squared` below zero. Such a sum, or a non-finite one, gets a
/// p-value of 0 and a warning.
pub fn goodness_of_fit(
    observed: Option<&[Bin]>,
    expected: Option<&[Bin]>,
    policy: VariancePolicy,
    range: BinRange,
) -> GoodnessOfFitResult {
    let (Some(observed), Some(expected)) = (observed, expected) else {
        warn!(
            "goodness of fit: missing distribution (observed present: {}, expected present: {})",
            observed.is_some(),
            expected.is_some()
        );
        return GoodnessOfFitResult::ZERO;
    };

    if observed.len() != expected.len() {
        warn!(
            "goodness of fit: bin count mismatch (observed {}, expected {})",
            observed.len(),
            expected.len()
        );
        return GoodnessOfFitResult::ZERO;
    }

    let Some((first, last)) = range.resolve(observed.len()) else {
        warn!(
            "goodness of fit: invalid bin range {range} for {} bins",
            observed.len()
        );
        return GoodnessOfFitResult::ZERO;
    };

    let mut chi2 = 0.0;
    let mut ndof = 0usize;
    for (obs, exp) in observed[first - 1..last]
        .iter()
        .zip(&expected[first - 1..last])
    {
        let denominator = match policy {
            VariancePolicy::Pearson => {
                if exp.content == 0.0 {
                    continue;
                }
                exp.content
            }
            VariancePolicy::Combined => {
                let err2 = obs.variance + exp.variance;
                if err2 <= 0.0 {
                    continue;
                }
                err2
            }
        };
        let diff = obs.content - exp.content;
        chi2 += diff * diff / denominator;
        ndof += 1;
    }

    if !chi2.is_finite() || chi2 < 0.0 {
        warn!("goodness of fit: invalid chi-squared {chi2} over {ndof} bins, p-value set to 0");
    }

    GoodnessOfFitResult {
        chi_squared: chi2,
        degrees_of_freedom: ndof,
        p_value: chi_squared_p_value(chi2, ndof),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// 2. RATIO
// ═══════════════════════════════════════════════════════════════════════════════

/// Smallest half-width a ratio axis is allowed to collapse to.
pub const MIN_RATIO_DEVIATION: f64 = 0.01;

/// Default multiplicative padding applied to the largest ratio deviation.
pub const DEFAULT_PADDING_FRACTION: f64 = 1.10;

/// Symmetric y-axis range around unity for a ratio view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioRange {
    pub low: f64,
    pub high: f64,
}

impl RatioRange {
    pub fn half_width(&self) -> f64 {
        (self.high - self.low) / 2.0
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }
}

impl From<RatioRange> for (f64, f64) {
    fn from(range: RatioRange) -> Self {
        (range.low, range.high)
    }
}

/// Quotient of two independent bins.
///
/// Variance follows first-order propagation for uncorrelated inputs:
/// `var(a/b) = (var_a + var_b * (a/b)^2) / b^2`. A zero denominator yields an
/// empty bin, which [`symmetric_range`] ignores.
pub fn divide_bin(numerator: Bin, denominator: Bin) -> Bin {
    if denominator.content == 0.0 {
        return Bin::EMPTY;
    }
    let ratio = numerator.content / denominator.content;
    let den2 = denominator.content * denominator.content;
    Bin {
        content: ratio,
        variance: (numerator.variance + denominator.variance * ratio * ratio) / den2,
    }
}

/// Symmetric display range `(1 - d, 1 + d)` for a ratio distribution.
///
/// `d` is the largest `|content - 1|` over bins with positive content, floored
/// at [`MIN_RATIO_DEVIATION`] and multiplied by `padding_fraction`. Bins with
/// zero or negative content are empty-denominator artifacts and are skipped.
pub fn symmetric_range(ratio: &[Bin], padding_fraction: f64) -> RatioRange {
    let max_dev = ratio
        .iter()
        .filter(|b| b.content > 0.0)
        .map(|b| (b.content - 1.0).abs())
        .fold(0.0f64, f64::max)
        .max(MIN_RATIO_DEVIATION);

    let padded = max_dev * padding_fraction;
    RatioRange {
        low: 1.0 - padded,
        high: 1.0 + padded,
    }
}
