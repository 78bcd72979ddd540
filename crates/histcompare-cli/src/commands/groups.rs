use histcompare_core::{BatchConfig, ComparisonPlan};

pub fn run(config_path: &str, tag: Option<&str>) {
    let config = super::load_config(config_path);

    let tags: Vec<String> = match tag {
        Some(t) => vec![t.to_string()],
        None => config.tags().map(str::to_string).collect(),
    };
    if tags.is_empty() {
        eprintln!("No variants in {config_path}.");
        std::process::exit(1);
    }

    let mut failed = 0usize;
    for tag in &tags {
        match describe(&config, tag) {
            Ok(lines) => {
                for line in lines {
                    println!("{line}");
                }
                println!();
            }
            Err(e) => {
                eprintln!("FAILED {tag}: {e}");
                failed += 1;
            }
        }
    }
    if failed > 0 {
        std::process::exit(1);
    }
}

/// Human-readable summary of the merged plan for `tag`.
fn describe(config: &BatchConfig, tag: &str) -> histcompare_core::Result<Vec<String>> {
    let plan = config.plan(tag)?;
    let factors = plan.normalizations()?;
    let mut lines = vec![format!("━━ {} ━━", plan.tag)];
    lines.push(format!("  observed  {}", plan.observed));
    lines.push(format!("  fit       {}, bins {}", plan.policy, plan.range));
    if plan.ratio.enabled {
        lines.push(format!("  ratio     padding {:.2}", plan.ratio.padding_fraction));
    }
    lines.push(String::new());
    lines.push(format!("  {:<12} {:<28} {:>14}", "Source", "Normalization", "Factor"));
    for source in &plan.sources {
        let spec = if source.id == plan.observed.source {
            "observed".to_string()
        } else {
            source.normalization.to_string()
        };
        let factor = factors
            .get(&source.id)
            .map_or_else(|| "-".to_string(), |f| f.to_string());
        lines.push(format!("  {:<12} {:<28} {:>14}", source.id, spec, factor));
    }
    lines.push(String::new());
    lines.extend(group_lines(&plan));
    Ok(lines)
}

fn group_lines(plan: &ComparisonPlan) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, group) in plan.groups.groups().iter().enumerate() {
        lines.push(format!("  {}. {} ({})", i + 1, group.name, group.display_label()));
        for member in &group.members {
            lines.push(format!("       {member}"));
        }
    }
    lines
}
