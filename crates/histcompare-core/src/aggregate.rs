//! Weighted aggregation: scaling by a normalization factor and bin-wise sums.
//!
//! Variances add without covariance terms, so summing assumes the inputs are
//! statistically independent.

use histcompare_stats::divide_bin;

use crate::distribution::{BinnedDistribution, warn_if_edges_differ};
use crate::error::{Error, Result};

/// Multiply contents by `factor` and variances by `factor²`, flow bins included.
pub fn scale(dist: &BinnedDistribution, factor: f64) -> BinnedDistribution {
    let mut out = dist.clone();
    scale_in_place(&mut out, factor);
    out
}

/// In-place form of [`scale`]. `entries` is a raw fill count and is left alone.
pub fn scale_in_place(dist: &mut BinnedDistribution, factor: f64) {
    let f2 = factor * factor;
    for bin in dist.bins_mut() {
        bin.content *= factor;
        bin.variance *= f2;
    }
    let (underflow, overflow) = dist.flows_mut();
    for bin in [underflow, overflow] {
        bin.content *= factor;
        bin.variance *= f2;
    }
}

/// Bin-wise sum of contents and of variances.
///
/// The result is a fresh distribution named `name` that carries the first
/// input's edges. Every input must have the first input's bin count; an empty
/// input is an error.
pub fn sum<'a, I>(name: &str, dists: I) -> Result<BinnedDistribution>
where
    I: IntoIterator<Item = &'a BinnedDistribution>,
{
    let mut iter = dists.into_iter();
    let Some(first) = iter.next() else {
        return Err(Error::EmptyAggregate(name.to_string()));
    };

    let mut acc = first.clone().renamed(name);
    for dist in iter {
        if dist.n_bins() != acc.n_bins() {
            return Err(Error::BinMismatch {
                context: format!("sum '{name}'"),
                name: dist.name().to_string(),
                expected: acc.n_bins(),
                found: dist.n_bins(),
            });
        }
        warn_if_edges_differ(&format!("sum '{name}'"), first, dist);

        for (a, b) in acc.bins_mut().iter_mut().zip(dist.bins()) {
            a.content += b.content;
            a.variance += b.variance;
        }
        let (underflow, overflow) = acc.flows_mut();
        underflow.content += dist.underflow().content;
        underflow.variance += dist.underflow().variance;
        overflow.content += dist.overflow().content;
        overflow.variance += dist.overflow().variance;
        acc.add_entries(dist.entries());
    }
    Ok(acc)
}

/// Bin-wise quotient `numerator / denominator` with uncorrelated error propagation.
///
/// A bin whose denominator content is zero gets content 0 and variance 0.
/// Flow bins of the quotient are empty.
pub fn divide(
    name: &str,
    numerator: &BinnedDistribution,
    denominator: &BinnedDistribution,
) -> Result<BinnedDistribution> {
    if numerator.n_bins() != denominator.n_bins() {
        return Err(Error::BinMismatch {
            context: format!("ratio '{name}'"),
            name: denominator.name().to_string(),
            expected: numerator.n_bins(),
            found: denominator.n_bins(),
        });
    }
    warn_if_edges_differ(&format!("ratio '{name}'"), numerator, denominator);

    let bins = numerator
        .bins()
        .iter()
        .zip(denominator.bins())
        .map(|(&n, &d)| divide_bin(n, d))
        .collect();
    let mut ratio = BinnedDistribution::new(name, bins);
    ratio.set_edges(numerator.edges().map(<[f64]>::to_vec));
    Ok(ratio)
}
