use std::path::Path;

use litterman_core::EngineConfig;
use tracing::debug;

use super::file::read_text;

/// Load the engine configuration, or defaults when no file is given.
///
/// `.yaml`/`.yml` files are parsed as YAML; anything else as JSON.
pub fn load_config(path: Option<&str>) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };

    let contents = read_text(path)?;
    let is_yaml = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);

    let config: EngineConfig = if is_yaml {
        serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config '{}': {}", path, e))?
    } else {
        serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to parse JSON config '{}': {}", path, e))?
    };
    config.validate()?;
    debug!(path, lookback = config.lookback, "loaded engine config");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_path_gives_defaults() {
        assert_eq!(load_config(None).unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_yaml_config_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("litterman-config-{}.yaml", std::process::id()));
        std::fs::write(
            &path,
            "lookback: 126\nbenchmark_symbol: QQQ\nschedule:\n  rebalance_months: [3, 9]\n",
        )
        .unwrap();
        let config = load_config(path.to_str()).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.lookback, 126);
        assert_eq!(config.benchmark_symbol, "QQQ");
        assert!(config.schedule.rebalance_months.contains(&9));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let path = std::env::temp_dir().join(format!("litterman-bad-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "lookback": 1 }"#).unwrap();
        let result = load_config(path.to_str());
        std::fs::remove_file(&path).unwrap();
        assert!(result.is_err());
    }
}
