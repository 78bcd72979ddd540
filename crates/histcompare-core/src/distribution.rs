//! One-dimensional binned distribution with per-bin variance.
//!
//! Regular bins are 1-indexed in the domain convention: bin 0 is the
//! underflow, bin `N + 1` the overflow. The flow bins travel with the
//! distribution through scaling and summation but never enter a fit, a ratio
//! or a yield.

use histcompare_stats::Bin;
use log::warn;
use serde::Serialize;

use crate::error::{Error, Result};

/// A named histogram: `N` regular bins plus underflow and overflow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinnedDistribution {
    name: String,
    bins: Vec<Bin>,
    underflow: Bin,
    overflow: Bin,
    #[serde(skip_serializing_if = "Option::is_none")]
    edges: Option<Vec<f64>>,
    entries: f64,
}

impl BinnedDistribution {
    /// Build from explicit bins. Flow bins start empty and `entries` is zero.
    pub fn new(name: impl Into<String>, bins: Vec<Bin>) -> Self {
        Self {
            name: name.into(),
            bins,
            underflow: Bin::EMPTY,
            overflow: Bin::EMPTY,
            edges: None,
            entries: 0.0,
        }
    }

    /// Unweighted counts: each variance equals its content, entries equal the total.
    pub fn from_contents(name: impl Into<String>, contents: &[f64]) -> Self {
        let bins: Vec<Bin> = contents.iter().map(|&c| Bin::poisson(c)).collect();
        let mut dist = Self::new(name, bins);
        dist.entries = contents.iter().sum();
        dist
    }

    /// Pair contents with explicit variances.
    ///
    /// Every variance must be finite and non-negative.
    pub fn with_variances(
        name: impl Into<String>,
        contents: &[f64],
        variances: &[f64],
    ) -> Result<Self> {
        let name = name.into();
        if contents.len() != variances.len() {
            return Err(Error::InvalidDistribution {
                name,
                reason: format!(
                    "{} contents but {} variances",
                    contents.len(),
                    variances.len()
                ),
            });
        }
        if let Some((i, v)) = variances
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite() || **v < 0.0)
        {
            return Err(Error::InvalidDistribution {
                name,
                reason: format!(
                    "variance {v} in bin {} is not a finite non-negative number",
                    i + 1
                ),
            });
        }
        let bins = contents
            .iter()
            .zip(variances)
            .map(|(&c, &v)| Bin::new(c, v))
            .collect();
        Ok(Self::new(name, bins))
    }

    /// Attach bin edges; there must be exactly `N + 1` of them.
    pub fn with_edges(mut self, edges: Vec<f64>) -> Result<Self> {
        if edges.len() != self.bins.len() + 1 {
            return Err(Error::InvalidDistribution {
                name: self.name,
                reason: format!(
                    "{} edges for {} bins (expected {})",
                    edges.len(),
                    self.bins.len(),
                    self.bins.len() + 1
                ),
            });
        }
        self.edges = Some(edges);
        Ok(self)
    }

    pub fn with_flows(mut self, underflow: Bin, overflow: Bin) -> Self {
        self.underflow = underflow;
        self.overflow = overflow;
        self
    }

    pub fn with_entries(mut self, entries: f64) -> Self {
        self.entries = entries;
        self
    }

    /// Same bins under a different name.
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of regular bins `N`.
    pub fn n_bins(&self) -> usize {
        self.bins.len()
    }

    /// Regular bins, 0-indexed in memory.
    pub fn bins(&self) -> &[Bin] {
        &self.bins
    }

    /// Bin by domain index: 0 is the underflow, `N + 1` the overflow.
    pub fn bin(&self, index: usize) -> Option<Bin> {
        let n = self.bins.len();
        match index {
            0 => Some(self.underflow),
            i if i <= n => Some(self.bins[i - 1]),
            i if i == n + 1 => Some(self.overflow),
            _ => None,
        }
    }

    pub fn underflow(&self) -> Bin {
        self.underflow
    }

    pub fn overflow(&self) -> Bin {
        self.overflow
    }

    pub fn contents(&self) -> Vec<f64> {
        self.bins.iter().map(|b| b.content).collect()
    }

    pub fn variances(&self) -> Vec<f64> {
        self.bins.iter().map(|b| b.variance).collect()
    }

    /// Per-bin statistical errors (square roots of the variances).
    pub fn errors(&self) -> Vec<f64> {
        self.bins.iter().map(Bin::error).collect()
    }

    pub fn edges(&self) -> Option<&[f64]> {
        self.edges.as_deref()
    }

    /// Number of raw fills, for annotation only.
    pub fn entries(&self) -> f64 {
        self.entries
    }

    /// Sum of regular-bin contents (the yield).
    pub fn sum_of_weights(&self) -> f64 {
        self.bins.iter().map(|b| b.content).sum()
    }

    // -------------------------------------------------------------------------
    // In-place mutation, reserved for the aggregator
    // -------------------------------------------------------------------------

    pub(crate) fn bins_mut(&mut self) -> &mut [Bin] {
        &mut self.bins
    }

    pub(crate) fn flows_mut(&mut self) -> (&mut Bin, &mut Bin) {
        (&mut self.underflow, &mut self.overflow)
    }

    pub(crate) fn add_entries(&mut self, entries: f64) {
        self.entries += entries;
    }

    pub(crate) fn set_edges(&mut self, edges: Option<Vec<f64>>) {
        self.edges = edges;
    }
}

/// Log a warning when both distributions carry edges and the edges disagree.
///
/// Only the bin count is enforced; differing edges are reported and tolerated.
pub fn warn_if_edges_differ(context: &str, a: &BinnedDistribution, b: &BinnedDistribution) {
    if let (Some(ea), Some(eb)) = (a.edges(), b.edges()) {
        let same = ea.len() == eb.len()
            && ea
                .iter()
                .zip(eb)
                .all(|(x, y)| (x - y).abs() <= 1e-9 * x.abs().max(y.abs()).max(1.0));
        if !same {
            warn!(
                "{context}: bin edges of '{}' and '{}' differ",
                a.name(),
                b.name()
            );
        }
    }
}
