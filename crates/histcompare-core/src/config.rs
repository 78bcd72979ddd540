//! Batch configuration.
//!
//! A [`BatchConfig`] describes one or more comparison variants that share a
//! grouping policy, fit settings and ratio settings, any of which a variant
//! may override. Variant `fit` and `ratio` blocks override field by field: a
//! field left out keeps the shared value. [`BatchConfig::plan`] merges the
//! shared and per-variant settings into a validated [`ComparisonPlan`].
//!
//! ```json
//! {
//!   "fit": { "use_variance": true, "bin_min": 1, "bin_max": 4 },
//!   "ratio": { "enabled": true, "padding_fraction": 2.0 },
//!   "sources": [
//!     { "id": "on",  "path": "bnb_on.json" },
//!     { "id": "off", "path": "bnb_off.json",
//!       "normalization":
//!         { "kind": "exposure_ratio", "reference": 31582916, "exposure": 88445969 } }
//!   ],
//!   "groups": [
//!     { "name": "cosmic",
//!       "members": [ { "source": "off", "category": "h_CosmicBkg_Nprotons_0n" } ] }
//!   ],
//!   "variants": [
//!     { "tag": "SIGNAL_0n_TEST",
//!       "display": { "title": "1#gamma0p", "label": "0p", "y_max": 70 },
//!       "observed": { "source": "on", "category": "h_1gX_Nprotons_0n" } }
//!   ]
//! }
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use histcompare_stats::{BinRange, DEFAULT_PADDING_FRACTION, VariancePolicy};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::grouping::{CategoryRef, GroupingPolicy};
use crate::normalization::NormalizationSpec;
use crate::orchestrator::ComparisonPlan;

// ═══════════════════════════════════════════════════════════════════════════════
// Settings blocks
// ═══════════════════════════════════════════════════════════════════════════════

/// Goodness-of-fit settings. Bounds below 1 mean "unset".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    pub use_variance: bool,
    pub bin_min: i64,
    pub bin_max: i64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            use_variance: true,
            bin_min: -1,
            bin_max: -1,
        }
    }
}

impl FitConfig {
    pub fn policy(&self) -> VariancePolicy {
        VariancePolicy::from_use_variance(self.use_variance)
    }

    pub fn range(&self) -> BinRange {
        BinRange::from_bounds(self.bin_min, self.bin_max)
    }
}

/// Ratio view settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatioConfig {
    pub enabled: bool,
    pub padding_fraction: f64,
}

impl Default for RatioConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            padding_fraction: DEFAULT_PADDING_FRACTION,
        }
    }
}

/// A named data source and how it is normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub normalization: NormalizationSpec,
}

impl SourceConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: None,
            normalization: NormalizationSpec::Unit,
        }
    }

    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn normalization(mut self, normalization: NormalizationSpec) -> Self {
        self.normalization = normalization;
        self
    }
}

/// Partial [`FitConfig`]: only the fields that are set replace shared values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_variance: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bin_min: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bin_max: Option<i64>,
}

impl FitOverride {
    pub fn apply(&self, fit: &mut FitConfig) {
        if let Some(v) = self.use_variance {
            fit.use_variance = v;
        }
        if let Some(v) = self.bin_min {
            fit.bin_min = v;
        }
        if let Some(v) = self.bin_max {
            fit.bin_max = v;
        }
    }
}

/// Partial [`RatioConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RatioOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub padding_fraction: Option<f64>,
}

impl RatioOverride {
    pub fn apply(&self, ratio: &mut RatioConfig) {
        if let Some(v) = self.enabled {
            ratio.enabled = v;
        }
        if let Some(v) = self.padding_fraction {
            ratio.padding_fraction = v;
        }
    }
}

/// Opaque presentation hints, passed to the renderer untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayHints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y_max: Option<f64>,
}

/// Command-line style overrides applied on top of every merged plan.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Overrides {
    pub use_variance: Option<bool>,
    pub bin_min: Option<i64>,
    pub bin_max: Option<i64>,
    pub ratio: Option<bool>,
    pub padding_fraction: Option<f64>,
}

impl Overrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn fit_override(&self) -> FitOverride {
        FitOverride {
            use_variance: self.use_variance,
            bin_min: self.bin_min,
            bin_max: self.bin_max,
        }
    }

    fn ratio_override(&self) -> RatioOverride {
        RatioOverride {
            enabled: self.ratio,
            padding_fraction: self.padding_fraction,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Variants and batch
// ═══════════════════════════════════════════════════════════════════════════════

/// One comparison: an observed selection plus optional overrides of the shared settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantConfig {
    pub tag: String,
    #[serde(default)]
    pub display: DisplayHints,
    /// Replace shared sources with the same id, or add new ones.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceConfig>,
    pub observed: CategoryRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<GroupingPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fit: Option<FitOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratio: Option<RatioOverride>,
}

/// A batch of comparison variants.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default)]
    pub groups: GroupingPolicy,
    #[serde(default)]
    pub fit: FitConfig,
    #[serde(default)]
    pub ratio: RatioConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    pub variants: Vec<VariantConfig>,
    /// Directory relative source paths are resolved against.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl BatchConfig {
    /// Read a config file. Relative source paths resolve against its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json_str(&text)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        let mut tags = BTreeSet::new();
        for variant in &config.variants {
            if !tags.insert(variant.tag.as_str()) {
                return Err(Error::Config(format!("duplicate variant tag '{}'", variant.tag)));
            }
        }
        Ok(config)
    }

    /// Variant tags in configuration order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.variants.iter().map(|v| v.tag.as_str())
    }

    pub fn variant(&self, tag: &str) -> Option<&VariantConfig> {
        self.variants.iter().find(|v| v.tag == tag)
    }

    /// Resolve `path` against [`base_dir`](Self::base_dir) when it is relative.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Merge shared and per-variant settings for `tag` and validate the result.
    pub fn plan(&self, tag: &str) -> Result<ComparisonPlan> {
        self.plan_with(tag, &Overrides::default())
    }

    /// [`plan`](Self::plan) with `overrides` applied last.
    pub fn plan_with(&self, tag: &str, overrides: &Overrides) -> Result<ComparisonPlan> {
        let variant = self
            .variant(tag)
            .ok_or_else(|| Error::Config(format!("unknown variant tag '{tag}'")))?;

        let groups = variant.groups.clone().unwrap_or_else(|| self.groups.clone());
        let mut fit = self.fit;
        let mut ratio = self.ratio;
        if let Some(layer) = &variant.fit {
            layer.apply(&mut fit);
        }
        if let Some(layer) = &variant.ratio {
            layer.apply(&mut ratio);
        }
        overrides.fit_override().apply(&mut fit);
        overrides.ratio_override().apply(&mut ratio);

        let mut sources = self.sources.clone();
        for source in &variant.sources {
            match sources.iter_mut().find(|s| s.id == source.id) {
                Some(existing) => *existing = source.clone(),
                None => sources.push(source.clone()),
            }
        }

        // Keep only sources the comparison touches, in first-use order.
        let mut referenced: Vec<&str> = vec![variant.observed.source.as_str()];
        for member in groups.members() {
            if !referenced.contains(&member.source.as_str()) {
                referenced.push(member.source.as_str());
            }
        }
        let mut used = Vec::with_capacity(referenced.len());
        for id in &referenced {
            let Some(source) = sources.iter().find(|s| s.id == *id) else {
                return Err(Error::UnknownSource(id.to_string()));
            };
            let mut source = source.clone();
            if let Some(path) = &source.path {
                source.path = Some(self.resolve_path(path));
            }
            used.push(source);
        }
        for source in &sources {
            if !referenced.contains(&source.id.as_str()) {
                debug!("variant '{tag}': source '{}' is not referenced", source.id);
            }
        }

        if let Some(observed) = used.first_mut() {
            if !observed.normalization.is_unit() {
                warn!(
                    "variant '{tag}': observed source '{}' has normalization {}; \
                     observed data is never scaled",
                    observed.id, observed.normalization
                );
                observed.normalization = NormalizationSpec::Unit;
            }
        }

        let plan = ComparisonPlan {
            tag: variant.tag.clone(),
            display: variant.display.clone(),
            sources: used,
            observed: variant.observed.clone(),
            groups,
            policy: fit.policy(),
            range: fit.range(),
            ratio,
        };
        plan.validate()?;
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "fit": { "use_variance": true, "bin_min": 1, "bin_max": 4 },
        "sources": [
            { "id": "on", "path": "on.json" },
            { "id": "nu", "path": "/data/nu.json",
              "normalization":
                { "kind": "exposure_ratio", "reference": 6.66e19, "exposure": 7.88e20 } },
            { "id": "unused", "path": "unused.json" }
        ],
        "groups": [
            { "name": "signal", "members": [ { "source": "nu", "category": "Sig" } ] }
        ],
        "variants": [
            { "tag": "SIGNAL_0n_TEST",
              "display": { "title": "1g0p", "y_max": 70 },
              "observed": { "source": "on", "category": "h_1gX_Nprotons_0n" } },
            { "tag": "SIDEBAND",
              "fit": { "use_variance": false },
              "ratio": { "enabled": true, "padding_fraction": 2.0 },
              "sources": [ { "id": "nu", "path": "nu_alt.json",
                             "normalization": { "kind": "fixed", "factor": 0.5 } } ],
              "observed": { "source": "on", "category": "h_sideband" } }
        ]
    }"#;

    fn config() -> BatchConfig {
        let mut c = BatchConfig::from_json_str(CONFIG).unwrap();
        c.base_dir = Some(PathBuf::from("/cfg"));
        c
    }

    #[test]
    fn test_defaults() {
        let fit = FitConfig::default();
        assert!(fit.use_variance);
        assert_eq!(fit.range(), BinRange::FULL);
        let ratio = RatioConfig::default();
        assert!(!ratio.enabled);
        assert_eq!(ratio.padding_fraction, DEFAULT_PADDING_FRACTION);
    }

    #[test]
    fn test_plan_shared_settings() {
        let plan = config().plan("SIGNAL_0n_TEST").unwrap();
        assert_eq!(plan.policy, VariancePolicy::Combined);
        assert_eq!(plan.range, BinRange::new(1, 4));
        assert!(!plan.ratio.enabled);
        assert_eq!(plan.display.y_max, Some(70.0));
        let ids: Vec<&str> = plan.sources.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["on", "nu"]);
        assert_eq!(plan.sources[0].path, Some(PathBuf::from("/cfg/on.json")));
        assert_eq!(plan.sources[1].path, Some(PathBuf::from("/data/nu.json")));
    }

    #[test]
    fn test_plan_variant_overrides() {
        let plan = config().plan("SIDEBAND").unwrap();
        assert_eq!(plan.policy, VariancePolicy::Pearson);
        // Bounds left out of the variant fit block keep the shared 1..4.
        assert_eq!(plan.range, BinRange::new(1, 4));
        assert!(plan.ratio.enabled);
        assert_eq!(plan.ratio.padding_fraction, 2.0);
        let nu = plan.source("nu").unwrap();
        assert_eq!(nu.normalization, NormalizationSpec::Fixed { factor: 0.5 });
        assert_eq!(nu.path, Some(PathBuf::from("/cfg/nu_alt.json")));
    }

    #[test]
    fn test_variant_fit_block_merges_per_field() {
        let mut c = config();
        c.variants[1].fit = Some(FitOverride {
            bin_max: Some(3),
            ..FitOverride::default()
        });
        c.variants[1].ratio = Some(RatioOverride {
            padding_fraction: Some(1.5),
            ..RatioOverride::default()
        });
        let plan = c.plan("SIDEBAND").unwrap();
        assert_eq!(plan.policy, VariancePolicy::Combined);
        assert_eq!(plan.range, BinRange::new(1, 3));
        assert!(!plan.ratio.enabled);
        assert_eq!(plan.ratio.padding_fraction, 1.5);
    }

    #[test]
    fn test_empty_variant_fit_block_keeps_shared() {
        let text = r#"{
            "fit": { "use_variance": false, "bin_min": 2, "bin_max": 5 },
            "sources": [ { "id": "on" }, { "id": "nu" } ],
            "groups": [ { "name": "g", "members": [ { "source": "nu", "category": "A" } ] } ],
            "variants": [
                { "tag": "T", "fit": {}, "observed": { "source": "on", "category": "x" } }
            ]
        }"#;
        let plan = BatchConfig::from_json_str(text).unwrap().plan("T").unwrap();
        assert_eq!(plan.policy, VariancePolicy::Pearson);
        assert_eq!(plan.range, BinRange::new(2, 5));
    }

    #[test]
    fn test_cli_overrides_win_over_variant() {
        let overrides = Overrides {
            use_variance: Some(true),
            padding_fraction: Some(3.0),
            ..Overrides::default()
        };
        let plan = config().plan_with("SIDEBAND", &overrides).unwrap();
        assert_eq!(plan.policy, VariancePolicy::Combined);
        assert_eq!(plan.ratio.padding_fraction, 3.0);
    }

    #[test]
    fn test_plan_cli_overrides() {
        let overrides = Overrides {
            use_variance: Some(false),
            bin_max: Some(2),
            ratio: Some(true),
            ..Overrides::default()
        };
        assert!(!overrides.is_empty());
        let plan = config().plan_with("SIGNAL_0n_TEST", &overrides).unwrap();
        assert_eq!(plan.policy, VariancePolicy::Pearson);
        assert_eq!(plan.range, BinRange::new(1, 2));
        assert!(plan.ratio.enabled);
    }

    #[test]
    fn test_unknown_tag() {
        assert!(matches!(config().plan("NOPE"), Err(Error::Config(_))));
    }

    #[test]
    fn test_unknown_source() {
        let mut c = config();
        c.variants[0].observed.source = "missing".to_string();
        assert!(matches!(
            c.plan("SIGNAL_0n_TEST"),
            Err(Error::UnknownSource(id)) if id == "missing"
        ));
    }

    #[test]
    fn test_observed_normalization_forced_to_unit() {
        let mut c = config();
        c.sources[0].normalization = NormalizationSpec::Fixed { factor: 3.0 };
        let plan = c.plan("SIGNAL_0n_TEST").unwrap();
        assert!(plan.sources[0].normalization.is_unit());
    }

    #[test]
    fn test_duplicate_tags_rejected() {
        let text = r#"{"variants":[
            {"tag":"A","observed":{"source":"on","category":"x"}},
            {"tag":"A","observed":{"source":"on","category":"y"}}]}"#;
        assert!(matches!(BatchConfig::from_json_str(text), Err(Error::Config(_))));
    }

    #[test]
    fn test_tags_in_order() {
        let c = config();
        assert_eq!(c.tags().collect::<Vec<_>>(), vec!["SIGNAL_0n_TEST", "SIDEBAND"]);
    }
}
