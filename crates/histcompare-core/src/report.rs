//! Serializable comparison reports.
//!
//! A [`ComparisonReport`] is the renderer-facing view of a [`Comparison`]:
//! every distribution the plot needs, the fit summary and the display hints.
//! A [`BatchReport`] bundles the reports of a batch together with the
//! variants that failed.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use histcompare_stats::{BinRange, GoodnessOfFitResult, VariancePolicy};
use serde::Serialize;
use uuid::Uuid;

use crate::config::DisplayHints;
use crate::distribution::BinnedDistribution;
use crate::error::Result;
use crate::orchestrator::{Comparison, VariantOutcome};

/// Fit outcome plus the guarded reduced chi-squared.
#[derive(Debug, Clone, Serialize)]
pub struct FitSummary {
    pub chi_squared: f64,
    pub degrees_of_freedom: usize,
    pub p_value: f64,
    pub reduced_chi_squared: Option<f64>,
    pub policy: VariancePolicy,
    pub range: BinRange,
}

impl FitSummary {
    pub fn new(fit: &GoodnessOfFitResult, policy: VariancePolicy, range: BinRange) -> Self {
        Self {
            chi_squared: fit.chi_squared,
            degrees_of_freedom: fit.degrees_of_freedom,
            p_value: fit.p_value,
            reduced_chi_squared: fit.reduced_chi_squared(),
            policy,
            range,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ObservedSummary {
    pub entries: f64,
    #[serde(rename = "yield")]
    pub yield_: f64,
    pub distribution: BinnedDistribution,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub name: String,
    pub label: String,
    #[serde(rename = "yield")]
    pub yield_: f64,
    pub distribution: BinnedDistribution,
}

#[derive(Debug, Clone, Serialize)]
pub struct RatioSummary {
    pub low: f64,
    pub high: f64,
    pub padding_fraction: f64,
    pub distribution: BinnedDistribution,
}

/// One comparison, ready to serialize.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub id: String,
    pub created_at: String,
    pub histcompare_version: String,
    pub tag: String,
    pub display: DisplayHints,
    pub normalizations: BTreeMap<String, f64>,
    pub observed: ObservedSummary,
    /// Stack order, bottom first.
    pub groups: Vec<GroupSummary>,
    pub total_yield: f64,
    pub total: BinnedDistribution,
    pub fit: FitSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratio: Option<RatioSummary>,
}

impl ComparisonReport {
    pub fn from_comparison(comparison: &Comparison) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now_iso8601(),
            histcompare_version: crate::VERSION.to_string(),
            tag: comparison.tag.clone(),
            display: comparison.display.clone(),
            normalizations: comparison
                .normalizations
                .iter()
                .map(|(id, f)| (id.clone(), f.value()))
                .collect(),
            observed: ObservedSummary {
                entries: comparison.observed.entries(),
                yield_: comparison.observed.sum_of_weights(),
                distribution: comparison.observed.clone(),
            },
            groups: comparison
                .groups
                .iter()
                .map(|g| GroupSummary {
                    name: g.name.clone(),
                    label: g.label.clone(),
                    yield_: g.distribution.sum_of_weights(),
                    distribution: g.distribution.clone(),
                })
                .collect(),
            total_yield: comparison.total.sum_of_weights(),
            total: comparison.total.clone(),
            fit: FitSummary::new(&comparison.fit, comparison.policy, comparison.range),
            ratio: comparison.ratio.as_ref().map(|r| RatioSummary {
                low: r.range.low,
                high: r.range.high,
                padding_fraction: r.padding_fraction,
                distribution: r.distribution.clone(),
            }),
        }
    }
}

/// A variant that could not be compared.
#[derive(Debug, Clone, Serialize)]
pub struct FailureSummary {
    pub tag: String,
    pub error: String,
}

/// All reports from one batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub created_at: String,
    pub histcompare_version: String,
    pub reports: Vec<ComparisonReport>,
    pub failures: Vec<FailureSummary>,
}

impl BatchReport {
    pub fn from_outcomes(outcomes: &[VariantOutcome]) -> Self {
        let mut reports = Vec::new();
        let mut failures = Vec::new();
        for outcome in outcomes {
            match &outcome.result {
                Ok(comparison) => reports.push(ComparisonReport::from_comparison(comparison)),
                Err(e) => failures.push(FailureSummary {
                    tag: outcome.tag.clone(),
                    error: e.to_string(),
                }),
            }
        }
        Self {
            created_at: now_iso8601(),
            histcompare_version: crate::VERSION.to_string(),
            reports,
            failures,
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write pretty-printed JSON to `path`, creating parent directories.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

fn now_iso8601() -> String {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format_iso8601(since_epoch)
}

/// `2026-02-15T01:30:00Z`
fn format_iso8601(since_epoch: Duration) -> String {
    let secs = since_epoch.as_secs();
    let (year, month, day) = civil_from_days(secs / 86_400);
    let rem = secs % 86_400;
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}Z",
        rem / 3600,
        (rem / 60) % 60,
        rem % 60
    )
}

/// Days since 1970-01-01 to a proleptic Gregorian (year, month, day).
fn civil_from_days(days: u64) -> (u64, u64, u64) {
    // Shift the epoch to 0000-03-01 so leap days fall at the end of an era year.
    let z = days + 719_468;
    let era = z / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + u64::from(month <= 2);
    (year, month, day)
}
