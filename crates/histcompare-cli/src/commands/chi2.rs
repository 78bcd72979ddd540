use histcompare_stats::{BinRange, VariancePolicy, goodness_of_fit};

pub fn run(observed: &str, expected: &str, pearson: bool, bin_min: i64, bin_max: i64) {
    let (obs, exp) = match (super::load_selected(observed), super::load_selected(expected)) {
        (Ok(obs), Ok(exp)) => (obs, exp),
        (Err(e), _) | (_, Err(e)) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let policy = VariancePolicy::from_use_variance(!pearson);
    let range = BinRange::from_bounds(bin_min, bin_max);
    let result = goodness_of_fit(Some(obs.bins()), Some(exp.bins()), policy, range);

    println!("observed  {observed} ({} bins, yield {:.3})", obs.n_bins(), obs.sum_of_weights());
    println!("expected  {expected} ({} bins, yield {:.3})", exp.n_bins(), exp.sum_of_weights());
    println!("policy    {policy}, range {range}");
    println!();
    println!("  chi2       {:.4}", result.chi_squared);
    println!("  ndof       {}", result.degrees_of_freedom);
    println!("  chi2/ndof  {}", super::format_reduced(result.reduced_chi_squared()));
    println!("  p-value    {}", super::format_p_value(result.p_value));

    if result.is_empty() {
        eprintln!("Warning: no bin contributed to the fit.");
    }
}
