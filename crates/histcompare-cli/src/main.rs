//! CLI for histcompare: observed data against a stacked, normalized prediction.

mod commands;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "histcompare")]
#[command(about = "histcompare: observed data against a stacked, normalized prediction")]
#[command(version = histcompare_core::VERSION)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the comparison variants of a batch config and print a fit summary per variant
    Compare {
        /// Path to the batch config JSON
        #[arg(long)]
        config: String,

        /// Run only this variant (repeatable). Default: every variant in config order.
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Write the batch report as JSON
        #[arg(long)]
        output: Option<String>,

        /// Derive the observed / prediction ratio view for every variant
        #[arg(long)]
        ratio: bool,

        /// Force Pearson's statistic (expected content as variance) for every variant
        #[arg(long, conflicts_with = "combined")]
        pearson: bool,

        /// Force combined observed + expected variances for every variant
        #[arg(long)]
        combined: bool,

        /// First bin of the fit range (1-indexed, values below 1 mean unset)
        #[arg(long, allow_hyphen_values = true)]
        bin_min: Option<i64>,

        /// Last bin of the fit range (1-indexed, values below 1 mean unset)
        #[arg(long, allow_hyphen_values = true)]
        bin_max: Option<i64>,

        /// Padding multiplier for the ratio axis range
        #[arg(long)]
        padding: Option<f64>,
    },

    /// Chi-squared test between two stored distributions (FILE:CATEGORY)
    Chi2 {
        /// Observed distribution as FILE:CATEGORY
        #[arg(long)]
        observed: String,

        /// Expected distribution as FILE:CATEGORY
        #[arg(long)]
        expected: String,

        /// Use Pearson's statistic instead of combined variances
        #[arg(long)]
        pearson: bool,

        /// First bin of the fit range (1-indexed)
        #[arg(long, default_value = "-1", allow_hyphen_values = true)]
        bin_min: i64,

        /// Last bin of the fit range (1-indexed)
        #[arg(long, default_value = "-1", allow_hyphen_values = true)]
        bin_max: i64,
    },

    /// Show the resolved groups and normalization factors of a batch config
    Groups {
        /// Path to the batch config JSON
        #[arg(long)]
        config: String,

        /// Show only this variant
        #[arg(long)]
        tag: Option<String>,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Compare {
            config,
            tags,
            output,
            ratio,
            pearson,
            combined,
            bin_min,
            bin_max,
            padding,
        } => commands::compare::run(commands::compare::CompareCommandConfig {
            config_path: &config,
            tags: &tags,
            output_path: output.as_deref(),
            ratio,
            pearson,
            combined,
            bin_min,
            bin_max,
            padding,
        }),
        Commands::Chi2 {
            observed,
            expected,
            pearson,
            bin_min,
            bin_max,
        } => commands::chi2::run(&observed, &expected, pearson, bin_min, bin_max),
        Commands::Groups { config, tag } => commands::groups::run(&config, tag.as_deref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compare_defaults() {
        let cli =
            Cli::try_parse_from(["histcompare", "compare", "--config", "batch.json"]).unwrap();
        assert_eq!(cli.verbose, 0);
        match cli.command {
            Commands::Compare {
                config,
                tags,
                output,
                ratio,
                pearson,
                combined,
                bin_min,
                bin_max,
                padding,
            } => {
                assert_eq!(config, "batch.json");
                assert!(tags.is_empty());
                assert!(output.is_none());
                assert!(!ratio);
                assert!(!pearson && !combined);
                assert!(bin_min.is_none() && bin_max.is_none() && padding.is_none());
            }
            _ => panic!("expected compare"),
        }
    }

    #[test]
    fn test_parse_compare_repeated_tags_and_overrides() {
        let cli = Cli::try_parse_from([
            "histcompare",
            "-vv",
            "compare",
            "--config",
            "c.json",
            "--tag",
            "SIGNAL_0n_TEST",
            "--tag",
            "SIDEBAND_1n_TEST",
            "--pearson",
            "--bin-min",
            "1",
            "--bin-max",
            "4",
            "--ratio",
            "--padding",
            "2.0",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Compare {
                tags,
                pearson,
                bin_min,
                bin_max,
                ratio,
                padding,
                ..
            } => {
                assert_eq!(tags, vec!["SIGNAL_0n_TEST", "SIDEBAND_1n_TEST"]);
                assert!(pearson && ratio);
                assert_eq!(bin_min, Some(1));
                assert_eq!(bin_max, Some(4));
                assert_eq!(padding, Some(2.0));
            }
            _ => panic!("expected compare"),
        }
    }

    #[test]
    fn test_parse_compare_combined() {
        let cli = Cli::try_parse_from([
            "histcompare",
            "compare",
            "--config",
            "c.json",
            "--combined",
        ])
        .unwrap();
        match cli.command {
            Commands::Compare {
                pearson, combined, ..
            } => assert!(combined && !pearson),
            _ => panic!("expected compare"),
        }
    }

    #[test]
    fn test_parse_pearson_conflicts_with_combined() {
        let err = Cli::try_parse_from([
            "histcompare",
            "compare",
            "--config",
            "c.json",
            "--pearson",
            "--combined",
        ])
        .err()
        .unwrap();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_parse_chi2_sentinel_bounds() {
        let cli = Cli::try_parse_from([
            "histcompare",
            "chi2",
            "--observed",
            "on.json:h_obs",
            "--expected",
            "mc.json:h_pred",
            "--bin-max",
            "-1",
        ])
        .unwrap();
        match cli.command {
            Commands::Chi2 {
                observed,
                bin_min,
                bin_max,
                pearson,
                ..
            } => {
                assert_eq!(observed, "on.json:h_obs");
                assert_eq!(bin_min, -1);
                assert_eq!(bin_max, -1);
                assert!(!pearson);
            }
            _ => panic!("expected chi2"),
        }
    }

    #[test]
    fn test_parse_requires_config() {
        assert!(Cli::try_parse_from(["histcompare", "compare"]).is_err());
        assert!(Cli::try_parse_from(["histcompare", "groups"]).is_err());
    }

    #[test]
    fn test_verbose_after_subcommand() {
        let cli =
            Cli::try_parse_from(["histcompare", "groups", "--config", "c.json", "-v"]).unwrap();
        assert_eq!(cli.verbose, 1);
    }
}
