//! Distribution loaders.
//!
//! The orchestrator only sees [`DistributionLoader`]. Two implementations
//! ship here: [`JsonSourceLoader`] reads one JSON file per source, and
//! [`InMemoryLoader`] is a plain map for tests and embedding.
//!
//! # Source file format
//!
//! A source file is a JSON object keyed by category name:
//!
//! ```json
//! {
//!   "h_SPNCDeltaSig_Nprotons_0n": {
//!     "contents": [12.0, 7.5, 3.0],
//!     "variances": [1.4, 0.9, 0.4],
//!     "edges": [0.0, 1.0, 2.0, 3.0],
//!     "underflow": 0.0,
//!     "overflow": 1.0,
//!     "entries": 412
//!   }
//! }
//! ```
//!
//! Only `contents` is required. Missing variances default to the contents.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use histcompare_stats::Bin;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::SourceConfig;
use crate::distribution::BinnedDistribution;
use crate::error::{Error, Result};

/// Supplies raw per-category distributions to a comparison.
pub trait DistributionLoader {
    /// Fetch `category` from `source_id`. Absence is [`Error::MissingDistribution`].
    fn get_distribution(&self, source_id: &str, category: &str) -> Result<BinnedDistribution>;
}

impl<T: DistributionLoader + ?Sized> DistributionLoader for &T {
    fn get_distribution(&self, source_id: &str, category: &str) -> Result<BinnedDistribution> {
        (**self).get_distribution(source_id, category)
    }
}

// ---------------------------------------------------------------------------
// On-disk representation
// ---------------------------------------------------------------------------

/// One category as stored in a source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDistribution {
    pub contents: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variances: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edges: Option<Vec<f64>>,
    #[serde(default)]
    pub underflow: f64,
    #[serde(default)]
    pub overflow: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries: Option<f64>,
}

impl StoredDistribution {
    /// Convert into a [`BinnedDistribution`]. Flow bins take Poisson variance.
    ///
    /// Negative or non-finite variances are rejected.
    pub fn into_distribution(self, name: &str) -> Result<BinnedDistribution> {
        let entries = self
            .entries
            .unwrap_or_else(|| self.contents.iter().sum());
        let dist = match &self.variances {
            Some(v) => BinnedDistribution::with_variances(name, &self.contents, v)?,
            None => BinnedDistribution::from_contents(name, &self.contents),
        };
        let dist = dist
            .with_flows(Bin::poisson(self.underflow), Bin::poisson(self.overflow))
            .with_entries(entries);
        match self.edges {
            Some(edges) => dist.with_edges(edges),
            None => Ok(dist),
        }
    }
}

impl From<&BinnedDistribution> for StoredDistribution {
    fn from(dist: &BinnedDistribution) -> Self {
        Self {
            contents: dist.contents(),
            variances: Some(dist.variances()),
            edges: dist.edges().map(<[f64]>::to_vec),
            underflow: dist.underflow().content,
            overflow: dist.overflow().content,
            entries: Some(dist.entries()),
        }
    }
}

/// Read and parse one source file.
pub fn read_source_file(path: &Path) -> Result<HashMap<String, StoredDistribution>> {
    let text = fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&text)?)
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Loads every category of every registered source file up front.
#[derive(Debug, Default)]
pub struct JsonSourceLoader {
    sources: HashMap<String, HashMap<String, StoredDistribution>>,
}

impl JsonSourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path` as source `source_id`, reading it immediately.
    pub fn add_file(&mut self, source_id: impl Into<String>, path: &Path) -> Result<()> {
        let source_id = source_id.into();
        let categories = read_source_file(path)?;
        debug!(
            "loaded source '{source_id}' from {} ({} categories)",
            path.display(),
            categories.len()
        );
        self.sources.insert(source_id, categories);
        Ok(())
    }

    /// Build a loader for configured sources. Relative paths resolve against
    /// `base_dir`; a source without a path is a configuration error.
    pub fn from_sources(sources: &[SourceConfig], base_dir: Option<&Path>) -> Result<Self> {
        let mut loader = Self::new();
        for source in sources {
            let Some(path) = &source.path else {
                return Err(Error::Config(format!("source '{}' has no path", source.id)));
            };
            let resolved: PathBuf = match base_dir {
                Some(dir) if path.is_relative() => dir.join(path),
                _ => path.clone(),
            };
            loader.add_file(source.id.clone(), &resolved)?;
        }
        Ok(loader)
    }

    pub fn source_ids(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }
}

impl DistributionLoader for JsonSourceLoader {
    fn get_distribution(&self, source_id: &str, category: &str) -> Result<BinnedDistribution> {
        let Some(categories) = self.sources.get(source_id) else {
            return Err(Error::UnknownSource(source_id.to_string()));
        };
        let Some(stored) = categories.get(category) else {
            return Err(Error::MissingDistribution {
                source_id: source_id.to_string(),
                category: category.to_string(),
            });
        };
        stored.clone().into_distribution(category)
    }
}

// ---------------------------------------------------------------------------
// In-memory loader
// ---------------------------------------------------------------------------

/// Map-backed loader.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLoader {
    distributions: HashMap<(String, String), BinnedDistribution>,
}

impl InMemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        source_id: impl Into<String>,
        category: impl Into<String>,
        dist: BinnedDistribution,
    ) {
        self.distributions
            .insert((source_id.into(), category.into()), dist);
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(
        mut self,
        source_id: impl Into<String>,
        category: impl Into<String>,
        dist: BinnedDistribution,
    ) -> Self {
        self.insert(source_id, category, dist);
        self
    }

    pub fn len(&self) -> usize {
        self.distributions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distributions.is_empty()
    }
}

impl DistributionLoader for InMemoryLoader {
    fn get_distribution(&self, source_id: &str, category: &str) -> Result<BinnedDistribution> {
        self.distributions
            .get(&(source_id.to_string(), category.to_string()))
            .cloned()
            .ok_or_else(|| Error::MissingDistribution {
                source_id: source_id.to_string(),
                category: category.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_stored_defaults_to_poisson() {
        let stored: StoredDistribution = serde_json::from_str(r#"{"contents":[4.0,9.0]}"#).unwrap();
        let d = stored.into_distribution("h").unwrap();
        assert_eq!(d.variances(), vec![4.0, 9.0]);
        assert_eq!(d.entries(), 13.0);
        assert_eq!(d.underflow(), Bin::EMPTY);
    }

    #[test]
    fn test_stored_rejects_negative_variance() {
        let stored: StoredDistribution =
            serde_json::from_str(r#"{"contents":[4.0,9.0],"variances":[4.0,-1.0]}"#).unwrap();
        assert!(matches!(
            stored.into_distribution("h"),
            Err(Error::InvalidDistribution { .. })
        ));
    }

    #[test]
    fn test_stored_rejects_bad_edges() {
        let stored: StoredDistribution =
            serde_json::from_str(r#"{"contents":[1.0,2.0],"edges":[0.0,1.0]}"#).unwrap();
        assert!(matches!(
            stored.into_distribution("h"),
            Err(Error::InvalidDistribution { .. })
        ));
    }

    #[test]
    fn test_stored_from_distribution() {
        let d = BinnedDistribution::with_variances("h", &[1.0, 2.0], &[0.5, 0.5])
            .unwrap()
            .with_entries(7.0);
        let stored = StoredDistribution::from(&d);
        let back = stored.into_distribution("h").unwrap();
        assert_eq!(back.bins(), d.bins());
        assert_eq!(back.entries(), 7.0);
    }

    #[test]
    fn test_in_memory_missing() {
        let loader =
            InMemoryLoader::new().with("nu", "A", BinnedDistribution::from_contents("A", &[1.0]));
        assert_eq!(loader.len(), 1);
        assert!(loader.get_distribution("nu", "A").is_ok());
        match loader.get_distribution("nu", "B") {
            Err(Error::MissingDistribution { source_id, category }) => {
                assert_eq!(source_id, "nu");
                assert_eq!(category, "B");
            }
            other => panic!("expected MissingDistribution, got {other:?}"),
        }
    }

    #[test]
    fn test_json_loader_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nu.json");
        let mut f = fs::File::create(&path).unwrap();
        write!(f, r#"{{"A":{{"contents":[1.0,2.0],"variances":[0.1,0.2]}}}}"#).unwrap();
        drop(f);

        let mut loader = JsonSourceLoader::new();
        loader.add_file("nu", &path).unwrap();
        assert_eq!(loader.source_ids().collect::<Vec<_>>(), vec!["nu"]);
        let d = loader.get_distribution("nu", "A").unwrap();
        assert_eq!(d.name(), "A");
        assert_eq!(d.variances(), vec![0.1, 0.2]);
        assert!(matches!(
            loader.get_distribution("nu", "Z"),
            Err(Error::MissingDistribution { .. })
        ));
        assert!(matches!(
            loader.get_distribution("dirt", "A"),
            Err(Error::UnknownSource(_))
        ));
    }

    #[test]
    fn test_json_loader_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = JsonSourceLoader::new();
        let err = loader.add_file("nu", &dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }
}
