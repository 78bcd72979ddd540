//! # histcompare-core
//!
//! **Observed data against a stacked, normalized prediction.**
//!
//! `histcompare-core` builds a composite prediction from many per-category
//! binned distributions, each scaled by its source's normalization factor and
//! summed into named groups, and compares an observed distribution against
//! the stacked total with a chi-squared goodness-of-fit test.
//!
//! ## Quick Start
//!
//! ```
//! use histcompare_core::{
//!     BinnedDistribution, CategoryRef, ComparisonOrchestrator, ComparisonPlan, GroupSpec,
//!     GroupingPolicy, InMemoryLoader, NormalizationSpec, SourceConfig,
//! };
//!
//! let loader = InMemoryLoader::new()
//!     .with("data", "h_obs", BinnedDistribution::from_contents("h_obs", &[10.0, 20.0, 15.0, 5.0]))
//!     .with("mc", "h_sig", BinnedDistribution::from_contents("h_sig", &[18.0, 38.0, 32.0, 12.0]));
//!
//! let groups = GroupingPolicy::new(vec![GroupSpec::new("signal").member("mc", "h_sig")]);
//! let plan = ComparisonPlan::new("demo", CategoryRef::new("data", "h_obs"), groups)
//!     .with_source(SourceConfig::new("data"))
//!     .with_source(
//!         SourceConfig::new("mc").normalization(NormalizationSpec::Fixed { factor: 0.5 }),
//!     );
//!
//! let comparison = ComparisonOrchestrator::new(&loader).run(&plan).unwrap();
//! assert_eq!(comparison.total.contents(), vec![9.0, 19.0, 16.0, 6.0]);
//! assert_eq!(comparison.fit.degrees_of_freedom, 4);
//! ```
//!
//! ## Architecture
//!
//! Loader → Normalize (per source) → Group sums → Stacked total → Fit / Ratio
//!
//! Statistical degeneracies (an empty bin range, no contributing bins) give a
//! zero fit result and a `log::warn!`. Structural problems (missing inputs,
//! bin count mismatches, bad normalizations) are [`Error`]s.

pub mod aggregate;
pub mod config;
pub mod distribution;
pub mod error;
pub mod grouping;
pub mod loader;
pub mod normalization;
pub mod orchestrator;
pub mod report;

pub use aggregate::{divide, scale, scale_in_place, sum};
pub use config::{
    BatchConfig, DisplayHints, FitConfig, FitOverride, Overrides, RatioConfig, RatioOverride,
    SourceConfig, VariantConfig,
};
pub use distribution::BinnedDistribution;
pub use error::{Error, Result};
pub use grouping::{CategoryRef, GroupSpec, GroupingPolicy};
pub use loader::{DistributionLoader, InMemoryLoader, JsonSourceLoader, StoredDistribution};
pub use normalization::{NormalizationFactor, NormalizationSpec};
pub use orchestrator::{
    BatchRunner, Comparison, ComparisonOrchestrator, ComparisonPlan, GroupComposite, RatioView,
    VariantOutcome,
};
pub use report::{BatchReport, ComparisonReport};

pub use histcompare_stats::{
    Bin, BinRange, GoodnessOfFitResult, RatioRange, VariancePolicy, goodness_of_fit,
    symmetric_range,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
