//! Comparison orchestration: load, normalize, group, stack, fit, ratio.
//!
//! [`ComparisonOrchestrator::run`] turns one [`ComparisonPlan`] into a
//! [`Comparison`]. [`BatchRunner`] runs many plans and keeps going when one of
//! them fails.

use std::collections::BTreeMap;

use histcompare_stats::{
    BinRange, GoodnessOfFitResult, RatioRange, VariancePolicy, goodness_of_fit, symmetric_range,
};
use log::{debug, info, warn};

use crate::aggregate::{divide, scale_in_place, sum};
use crate::config::{BatchConfig, DisplayHints, Overrides, RatioConfig, SourceConfig};
use crate::distribution::{BinnedDistribution, warn_if_edges_differ};
use crate::error::{Error, Result};
use crate::grouping::{CategoryRef, GroupingPolicy};
use crate::loader::DistributionLoader;
use crate::normalization::NormalizationFactor;

/// Name given to the stacked prediction.
pub const TOTAL_NAME: &str = "total";

/// Name given to the observed / prediction quotient.
pub const RATIO_NAME: &str = "ratio";

// ═══════════════════════════════════════════════════════════════════════════════
// Plan
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything needed to run one comparison, fully merged and validated.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonPlan {
    pub tag: String,
    pub display: DisplayHints,
    /// Sources touched by this comparison, observed source first.
    pub sources: Vec<SourceConfig>,
    pub observed: CategoryRef,
    pub groups: GroupingPolicy,
    pub policy: VariancePolicy,
    pub range: BinRange,
    pub ratio: RatioConfig,
}

impl ComparisonPlan {
    /// Plan with default fit and ratio settings.
    pub fn new(tag: impl Into<String>, observed: CategoryRef, groups: GroupingPolicy) -> Self {
        Self {
            tag: tag.into(),
            display: DisplayHints::default(),
            sources: Vec::new(),
            observed,
            groups,
            policy: VariancePolicy::default(),
            range: BinRange::FULL,
            ratio: RatioConfig::default(),
        }
    }

    pub fn with_source(mut self, source: SourceConfig) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_policy(mut self, policy: VariancePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_range(mut self, range: BinRange) -> Self {
        self.range = range;
        self
    }

    pub fn with_ratio(mut self, padding_fraction: f64) -> Self {
        self.ratio = RatioConfig {
            enabled: true,
            padding_fraction,
        };
        self
    }

    pub fn source(&self, id: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.id == id)
    }

    /// Structural checks that do not need any data.
    pub fn validate(&self) -> Result<()> {
        self.groups.validate()?;
        if self.source(&self.observed.source).is_none() {
            return Err(Error::UnknownSource(self.observed.source.clone()));
        }
        for id in self.groups.sources() {
            if self.source(id).is_none() {
                return Err(Error::UnknownSource(id.to_string()));
            }
        }
        let padding = self.ratio.padding_fraction;
        if self.ratio.enabled && !(padding.is_finite() && padding > 0.0) {
            return Err(Error::Config(format!(
                "ratio padding fraction must be positive, got {padding}"
            )));
        }
        Ok(())
    }

    /// Normalization factor per source. The observed source is always unit.
    pub fn normalizations(&self) -> Result<BTreeMap<String, NormalizationFactor>> {
        let mut factors = BTreeMap::new();
        for source in &self.sources {
            let factor = if source.id == self.observed.source {
                NormalizationFactor::UNIT
            } else {
                source.normalization.resolve(&source.id)?
            };
            factors.insert(source.id.clone(), factor);
        }
        Ok(factors)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Result
// ═══════════════════════════════════════════════════════════════════════════════

/// One named, independently owned group composite.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupComposite {
    pub name: String,
    pub label: String,
    pub distribution: BinnedDistribution,
}

/// Observed / prediction quotient and its display range.
#[derive(Debug, Clone, PartialEq)]
pub struct RatioView {
    pub distribution: BinnedDistribution,
    pub range: RatioRange,
    pub padding_fraction: f64,
}

/// Output of one comparison, handed to renderers and reports.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub tag: String,
    pub display: DisplayHints,
    pub observed: BinnedDistribution,
    /// Group composites in stack order.
    pub groups: Vec<GroupComposite>,
    pub total: BinnedDistribution,
    pub normalizations: BTreeMap<String, NormalizationFactor>,
    pub policy: VariancePolicy,
    pub range: BinRange,
    pub fit: GoodnessOfFitResult,
    pub ratio: Option<RatioView>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Orchestrator
// ═══════════════════════════════════════════════════════════════════════════════

/// Runs comparisons against one loader.
pub struct ComparisonOrchestrator<'a, L: DistributionLoader> {
    loader: &'a L,
}

impl<'a, L: DistributionLoader> ComparisonOrchestrator<'a, L> {
    pub fn new(loader: &'a L) -> Self {
        Self { loader }
    }

    /// Run one comparison.
    ///
    /// Any loader, normalization or aggregation failure aborts with an error,
    /// as does an observed/prediction bin count mismatch. A degenerate fit
    /// (for example an empty bin range) does not: it yields the zero result.
    pub fn run(&self, plan: &ComparisonPlan) -> Result<Comparison> {
        plan.validate()?;
        info!(
            "[{}] comparing {} against {} groups",
            plan.tag,
            plan.observed,
            plan.groups.groups().len()
        );

        // 1. Load.
        let observed = self
            .loader
            .get_distribution(&plan.observed.source, &plan.observed.category)?;
        let mut members: Vec<Vec<BinnedDistribution>> =
            Vec::with_capacity(plan.groups.groups().len());
        for group in plan.groups.groups() {
            let mut loaded = Vec::with_capacity(group.members.len());
            for member in &group.members {
                loaded.push(self.loader.get_distribution(&member.source, &member.category)?);
            }
            members.push(loaded);
        }

        // 2. Normalize.
        let normalizations = plan.normalizations()?;
        for (group, loaded) in plan.groups.groups().iter().zip(members.iter_mut()) {
            for (member, dist) in group.members.iter().zip(loaded.iter_mut()) {
                let factor = normalizations
                    .get(&member.source)
                    .copied()
                    .ok_or_else(|| Error::UnknownSource(member.source.clone()))?;
                debug!("[{}] scale {member} by {factor}", plan.tag);
                scale_in_place(dist, factor.value());
            }
        }

        // 3. Group composites.
        let mut groups = Vec::with_capacity(members.len());
        for (group, loaded) in plan.groups.groups().iter().zip(&members) {
            let distribution = sum(&group.name, loaded)?;
            debug!(
                "[{}] group '{}': yield {:.3}",
                plan.tag,
                group.name,
                distribution.sum_of_weights()
            );
            groups.push(GroupComposite {
                name: group.name.clone(),
                label: group.display_label().to_string(),
                distribution,
            });
        }

        // 4. Stack.
        let total = sum(TOTAL_NAME, groups.iter().map(|g| &g.distribution))?;

        // 5. Fit.
        if observed.n_bins() != total.n_bins() {
            return Err(Error::BinMismatch {
                context: format!("comparison '{}'", plan.tag),
                name: observed.name().to_string(),
                expected: total.n_bins(),
                found: observed.n_bins(),
            });
        }
        warn_if_edges_differ(&format!("comparison '{}'", plan.tag), &observed, &total);
        let fit = goodness_of_fit(
            Some(observed.bins()),
            Some(total.bins()),
            plan.policy,
            plan.range,
        );
        if fit.is_empty() {
            warn!("[{}] no bin contributed to the fit over {}", plan.tag, plan.range);
        }

        // 6. Ratio.
        let ratio = if plan.ratio.enabled {
            let distribution = divide(RATIO_NAME, &observed, &total)?;
            let range = symmetric_range(distribution.bins(), plan.ratio.padding_fraction);
            Some(RatioView {
                distribution,
                range,
                padding_fraction: plan.ratio.padding_fraction,
            })
        } else {
            None
        };

        info!(
            "[{}] chi2 = {:.3}, ndof = {}, p = {:.4}",
            plan.tag, fit.chi_squared, fit.degrees_of_freedom, fit.p_value
        );

        Ok(Comparison {
            tag: plan.tag.clone(),
            display: plan.display.clone(),
            observed,
            groups,
            total,
            normalizations,
            policy: plan.policy,
            range: plan.range,
            fit,
            ratio,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Batch
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of one variant within a batch.
#[derive(Debug)]
pub struct VariantOutcome {
    pub tag: String,
    pub result: Result<Comparison>,
}

impl VariantOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs a set of variants sequentially, recording failures without stopping.
pub struct BatchRunner<'a> {
    config: &'a BatchConfig,
    tags: Option<Vec<String>>,
    overrides: Overrides,
}

impl<'a> BatchRunner<'a> {
    pub fn new(config: &'a BatchConfig) -> Self {
        Self {
            config,
            tags: None,
            overrides: Overrides::default(),
        }
    }

    /// Restrict the run to `tags`, in the given order. Unknown tags fail individually.
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Run every selected variant. `make_loader` builds the loader for each plan.
    pub fn run<L, F>(&self, mut make_loader: F) -> Vec<VariantOutcome>
    where
        L: DistributionLoader,
        F: FnMut(&ComparisonPlan) -> Result<L>,
    {
        let tags: Vec<String> = match &self.tags {
            Some(tags) => tags.clone(),
            None => self.config.tags().map(str::to_string).collect(),
        };

        tags.into_iter()
            .map(|tag| {
                let result = self
                    .config
                    .plan_with(&tag, &self.overrides)
                    .and_then(|plan| {
                        let loader = make_loader(&plan)?;
                        ComparisonOrchestrator::new(&loader).run(&plan)
                    });
                if let Err(e) = &result {
                    warn!("[{tag}] comparison failed: {e}");
                }
                VariantOutcome { tag, result }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouping::GroupSpec;
    use histcompare_stats::Bin;
    use crate::loader::InMemoryLoader;
    use crate::normalization::NormalizationSpec;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn obs() -> BinnedDistribution {
        BinnedDistribution::from_contents("obs", &[10.0, 20.0, 15.0, 5.0])
    }

    fn loader() -> InMemoryLoader {
        InMemoryLoader::new()
            .with("on", "obs", obs())
            .with("mc", "a", BinnedDistribution::from_contents("a", &[8.0, 16.0, 12.0, 4.0]))
            .with("mc", "b", BinnedDistribution::from_contents("b", &[2.0, 4.0, 6.0, 4.0]))
            .with("off", "c", BinnedDistribution::from_contents("c", &[4.0, 0.0, 8.0, 0.0]))
    }

    /// Same regular bins as [`loader`], with large and mutually inconsistent flow bins.
    fn loader_with_flows() -> InMemoryLoader {
        let flows = |dist: BinnedDistribution, under: f64, over: f64| {
            dist.with_flows(Bin::poisson(under), Bin::poisson(over))
        };
        let l = loader();
        let get = |src: &str, cat: &str| l.get_distribution(src, cat).unwrap();
        InMemoryLoader::new()
            .with("on", "obs", flows(get("on", "obs"), 5000.0, 0.0))
            .with("mc", "a", flows(get("mc", "a"), 300.0, 7.0))
            .with("mc", "b", flows(get("mc", "b"), 40.0, 900.0))
            .with("off", "c", flows(get("off", "c"), 1000.0, 0.0))
    }

    fn plan() -> ComparisonPlan {
        let groups = GroupingPolicy::new(vec![
            GroupSpec::new("cosmic").member("off", "c"),
            GroupSpec::new("signal").label("1#gamma").member("mc", "a").member("mc", "b"),
        ]);
        ComparisonPlan::new("T", CategoryRef::new("on", "obs"), groups)
            .with_source(SourceConfig::new("on"))
            .with_source(
                SourceConfig::new("mc").normalization(NormalizationSpec::Fixed { factor: 0.5 }),
            )
            .with_source(SourceConfig::new("off").normalization(NormalizationSpec::ExposureRatio {
                reference: 1.0,
                exposure: 4.0,
            }))
    }

    #[test]
    fn test_run_builds_groups_and_total() {
        let l = loader();
        let c = ComparisonOrchestrator::new(&l).run(&plan()).unwrap();

        assert_eq!(c.groups.len(), 2);
        assert_eq!(c.groups[0].name, "cosmic");
        assert_eq!(c.groups[0].distribution.contents(), vec![1.0, 0.0, 2.0, 0.0]);
        assert_eq!(c.groups[0].distribution.variances(), vec![0.25, 0.0, 0.5, 0.0]);
        assert_eq!(c.groups[1].label, "1#gamma");
        assert_eq!(c.groups[1].distribution.contents(), vec![5.0, 10.0, 9.0, 4.0]);
        assert_eq!(c.total.name(), TOTAL_NAME);
        assert_eq!(c.total.contents(), vec![6.0, 10.0, 11.0, 4.0]);
        // Observed untouched.
        assert_eq!(c.observed.contents(), vec![10.0, 20.0, 15.0, 5.0]);
        assert_eq!(c.normalizations["on"], NormalizationFactor::UNIT);
        assert!(close(c.normalizations["off"].value(), 0.25));
        assert!(c.ratio.is_none());
    }

    #[test]
    fn test_run_fit_matches_direct_call() {
        let l = loader();
        let c = ComparisonOrchestrator::new(&l).run(&plan()).unwrap();
        let direct = goodness_of_fit(
            Some(c.observed.bins()),
            Some(c.total.bins()),
            VariancePolicy::Combined,
            BinRange::FULL,
        );
        assert_eq!(c.fit, direct);
        assert_eq!(c.fit.degrees_of_freedom, 4);
    }

    #[test]
    fn test_run_with_ratio() {
        let l = loader();
        let c = ComparisonOrchestrator::new(&l).run(&plan().with_ratio(2.0)).unwrap();
        let ratio = c.ratio.unwrap();
        assert_eq!(ratio.distribution.n_bins(), 4);
        // Largest deviation is 20/10 - 1 = 1.0.
        assert!(close(ratio.range.low, -1.0));
        assert!(close(ratio.range.high, 3.0));
        assert_eq!(ratio.padding_fraction, 2.0);
    }

    #[test]
    fn test_flow_bins_never_reach_fit_or_ratio() {
        let plain = loader();
        let flowed = loader_with_flows();
        let p = plan().with_ratio(1.1);
        let a = ComparisonOrchestrator::new(&plain).run(&p).unwrap();
        let b = ComparisonOrchestrator::new(&flowed).run(&p).unwrap();

        assert_eq!(b.fit, a.fit);
        assert_eq!(b.fit.degrees_of_freedom, 4);
        let (ra, rb) = (a.ratio.unwrap(), b.ratio.unwrap());
        assert_eq!(rb.range, ra.range);
        assert_eq!(rb.distribution.bins(), ra.distribution.bins());
        assert_eq!(b.total.sum_of_weights(), a.total.sum_of_weights());

        // Flows are still scaled and summed: off x 0.25, mc x 0.5.
        let under = b.total.underflow();
        assert!(close(under.content, 1000.0 * 0.25 + (300.0 + 40.0) * 0.5));
        assert!(close(under.variance, 1000.0 * 0.0625 + (300.0 + 40.0) * 0.25));
        let over = b.total.overflow();
        assert!(close(over.content, (7.0 + 900.0) * 0.5));
        assert!(close(over.variance, (7.0 + 900.0) * 0.25));
        // Observed flows are carried but never scaled.
        assert_eq!(b.observed.underflow(), Bin::poisson(5000.0));
    }

    #[test]
    fn test_empty_range_soft_fails() {
        let l = loader();
        let c = ComparisonOrchestrator::new(&l)
            .run(&plan().with_range(BinRange::new(4, 2)))
            .unwrap();
        assert_eq!(c.fit, GoodnessOfFitResult::ZERO);
    }

    #[test]
    fn test_missing_category_aborts() {
        let l = loader();
        let mut p = plan();
        p.groups = GroupingPolicy::new(vec![GroupSpec::new("x").member("mc", "absent")]);
        assert!(matches!(
            ComparisonOrchestrator::new(&l).run(&p),
            Err(Error::MissingDistribution { .. })
        ));
    }

    #[test]
    fn test_observed_bin_mismatch_aborts() {
        let l = loader().with(
            "on",
            "short",
            BinnedDistribution::from_contents("short", &[1.0, 2.0]),
        );
        let mut p = plan();
        p.observed = CategoryRef::new("on", "short");
        assert!(matches!(
            ComparisonOrchestrator::new(&l).run(&p),
            Err(Error::BinMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_normalization_aborts() {
        let l = loader();
        let mut p = plan();
        p.sources[2].normalization = NormalizationSpec::ExposureRatio {
            reference: 1.0,
            exposure: 0.0,
        };
        assert!(matches!(
            ComparisonOrchestrator::new(&l).run(&p),
            Err(Error::InvalidNormalization { .. })
        ));
    }

    #[test]
    fn test_unknown_source_in_groups() {
        let l = loader();
        let mut p = plan();
        p.sources.truncate(2);
        assert!(matches!(p.validate(), Err(Error::UnknownSource(id)) if id == "off"));
        assert!(ComparisonOrchestrator::new(&l).run(&p).is_err());
    }

    #[test]
    fn test_bad_padding_rejected() {
        let p = plan().with_ratio(0.0);
        assert!(matches!(p.validate(), Err(Error::Config(_))));
    }
}
