pub mod chi2;
pub mod compare;
pub mod groups;

use std::path::Path;

use histcompare_core::{BatchConfig, BinnedDistribution, Error, loader::read_source_file};

/// Split a `FILE:CATEGORY` selector at its last colon.
pub fn parse_selector(s: &str) -> Option<(&str, &str)> {
    let (file, category) = s.rsplit_once(':')?;
    if file.is_empty() || category.is_empty() {
        None
    } else {
        Some((file, category))
    }
}

/// Load one category from a source file.
pub fn load_selected(selector: &str) -> histcompare_core::Result<BinnedDistribution> {
    let Some((file, category)) = parse_selector(selector) else {
        return Err(Error::Config(format!(
            "expected FILE:CATEGORY, got '{selector}'"
        )));
    };
    let mut categories = read_source_file(Path::new(file))?;
    match categories.remove(category) {
        Some(stored) => stored.into_distribution(category),
        None => Err(Error::MissingDistribution {
            source_id: file.to_string(),
            category: category.to_string(),
        }),
    }
}

/// Load a batch config or exit.
pub fn load_config(path: &str) -> BatchConfig {
    match BatchConfig::load(Path::new(path)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

/// p-values below display precision fall back to scientific notation.
pub fn format_p_value(p: f64) -> String {
    if p != 0.0 && p < 1e-4 {
        format!("{p:.3e}")
    } else {
        format!("{p:.4}")
    }
}

/// Reduced chi-squared, or a dash when nothing contributed.
pub fn format_reduced(reduced: Option<f64>) -> String {
    reduced.map_or_else(|| "-".to_string(), |r| format!("{r:.3}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // parse_selector tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_parse_selector() {
        assert_eq!(parse_selector("on.json:h_obs"), Some(("on.json", "h_obs")));
    }

    #[test]
    fn test_parse_selector_uses_last_colon() {
        assert_eq!(
            parse_selector("C:/data/on.json:h_obs"),
            Some(("C:/data/on.json", "h_obs"))
        );
    }

    #[test]
    fn test_parse_selector_rejects_incomplete() {
        assert_eq!(parse_selector("on.json"), None);
        assert_eq!(parse_selector("on.json:"), None);
        assert_eq!(parse_selector(":h_obs"), None);
    }

    // -----------------------------------------------------------------------
    // load_selected tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_load_selected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("on.json");
        std::fs::write(&path, r#"{"h_obs":{"contents":[3.0,4.0]}}"#).unwrap();

        let selector = format!("{}:h_obs", path.display());
        let d = load_selected(&selector).unwrap();
        assert_eq!(d.contents(), vec![3.0, 4.0]);

        let missing = format!("{}:h_other", path.display());
        assert!(matches!(
            load_selected(&missing),
            Err(Error::MissingDistribution { .. })
        ));
        assert!(matches!(load_selected("nocolon"), Err(Error::Config(_))));
    }

    // -----------------------------------------------------------------------
    // formatting tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_format_p_value() {
        assert_eq!(format_p_value(0.5), "0.5000");
        assert_eq!(format_p_value(0.0), "0.0000");
        assert_eq!(format_p_value(1.5e-7), "1.500e-7");
    }

    #[test]
    fn test_format_reduced() {
        assert_eq!(format_reduced(None), "-");
        assert_eq!(format_reduced(Some(1.25)), "1.250");
    }
}
