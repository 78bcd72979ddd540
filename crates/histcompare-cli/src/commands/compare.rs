use std::path::Path;

use histcompare_core::{
    BatchReport, BatchRunner, Comparison, JsonSourceLoader, Overrides, VariantOutcome,
};
use log::info;

pub struct CompareCommandConfig<'a> {
    pub config_path: &'a str,
    pub tags: &'a [String],
    pub output_path: Option<&'a str>,
    pub ratio: bool,
    pub pearson: bool,
    pub combined: bool,
    pub bin_min: Option<i64>,
    pub bin_max: Option<i64>,
    pub padding: Option<f64>,
}

impl CompareCommandConfig<'_> {
    /// Only flags the user actually passed override the config file.
    fn overrides(&self) -> Overrides {
        let use_variance = if self.pearson {
            Some(false)
        } else if self.combined {
            Some(true)
        } else {
            None
        };
        Overrides {
            use_variance,
            bin_min: self.bin_min,
            bin_max: self.bin_max,
            ratio: self.ratio.then_some(true),
            padding_fraction: self.padding,
        }
    }
}

pub fn run(cfg: CompareCommandConfig<'_>) {
    let config = super::load_config(cfg.config_path);
    info!(
        "loaded {} variant(s) from {}",
        config.variants.len(),
        cfg.config_path
    );

    let mut runner = BatchRunner::new(&config).overrides(cfg.overrides());
    if !cfg.tags.is_empty() {
        runner = runner.tags(cfg.tags.iter().cloned());
    }
    let outcomes = runner.run(|plan| JsonSourceLoader::from_sources(&plan.sources, None));

    if outcomes.is_empty() {
        eprintln!("No variants in {}.", cfg.config_path);
        std::process::exit(1);
    }

    for outcome in &outcomes {
        print_outcome(outcome);
    }

    let failed: Vec<&VariantOutcome> = outcomes.iter().filter(|o| !o.is_ok()).collect();
    println!(
        "{}/{} variant(s) compared",
        outcomes.len() - failed.len(),
        outcomes.len()
    );

    if let Some(path) = cfg.output_path {
        let report = BatchReport::from_outcomes(&outcomes);
        match report.write(Path::new(path)) {
            Ok(()) => println!("Report written to {path}"),
            Err(e) => {
                eprintln!("Error: failed to write report: {e}");
                std::process::exit(1);
            }
        }
    }

    if !failed.is_empty() {
        for outcome in &failed {
            if let Err(e) = &outcome.result {
                eprintln!("FAILED {}: {e}", outcome.tag);
            }
        }
        std::process::exit(1);
    }
}

fn print_outcome(outcome: &VariantOutcome) {
    match &outcome.result {
        Ok(comparison) => print_comparison(comparison),
        Err(e) => {
            println!("━━ {} ━━", outcome.tag);
            println!("  ✗ {e}");
            println!();
        }
    }
}

fn print_comparison(c: &Comparison) {
    match &c.display.title {
        Some(title) => println!("━━ {} ({title}) ━━", c.tag),
        None => println!("━━ {} ━━", c.tag),
    }
    println!(
        "  observed  {:<24} entries {:>10.0}  yield {:>12.3}",
        c.observed.name(),
        c.observed.entries(),
        c.observed.sum_of_weights()
    );
    println!();
    println!("  {:<20} {:<28} {:>12}", "Group", "Label", "Yield");
    println!("  {}", "─".repeat(62));
    for group in &c.groups {
        println!(
            "  {:<20} {:<28} {:>12.3}",
            group.name,
            group.label,
            group.distribution.sum_of_weights()
        );
    }
    println!("  {}", "─".repeat(62));
    println!("  {:<20} {:<28} {:>12.3}", "total", "", c.total.sum_of_weights());
    println!();

    let fit = &c.fit;
    println!(
        "  chi2 = {:.3}  ndof = {}  chi2/ndof = {}  p = {}  [{}, bins {}]",
        fit.chi_squared,
        fit.degrees_of_freedom,
        super::format_reduced(fit.reduced_chi_squared()),
        super::format_p_value(fit.p_value),
        c.policy,
        c.range
    );
    if let Some(ratio) = &c.ratio {
        println!(
            "  ratio range [{:.3}, {:.3}] (padding {:.2})",
            ratio.range.low, ratio.range.high, ratio.padding_fraction
        );
    }
    println!();
}
