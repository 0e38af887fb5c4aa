pub mod config;

use clap::{Parser, Subcommand};

use tg_domain::config::Config;

/// Tollgate, a rate-limiting admission gateway for LLM provider calls.
#[derive(Debug, Parser)]
#[command(name = "tollgate", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path in `TOLLGATE_CONFIG` (or
/// `config.toml` by default). A missing file yields the defaults.
/// Returns the parsed [`Config`] and the path that was used.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var("TOLLGATE_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = load_config_from(&config_path)?;
    Ok((config, config_path))
}

pub fn load_config_from(config_path: &str) -> anyhow::Result<Config> {
    if !std::path::Path::new(config_path).exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(config_path)
        .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
    toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = load_config_from(path.to_str().unwrap()).unwrap();
        assert_eq!(config.server.port, 8640);
        assert!(config.services.is_empty());
    }

    #[test]
    fn parses_services_and_pricing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[gateway]
max_queue_size = 5

[services.openai]
base_url = "https://api.openai.com"
tpm_limit = 1000
rpm_limit = 2
daily_token_limit = 10000

[pricing.openai.gpt-4o-mini]
input_per_1m = 0.15
output_per_1m = 0.6
"#
        )
        .unwrap();

        let config = load_config_from(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.gateway.max_queue_size, 5);
        assert_eq!(config.services["openai"].rpm_limit, 2);
        assert!(config.pricing.get("openai", "gpt-4o-mini").is_some());
    }

    #[test]
    fn malformed_file_names_the_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[services.openai\n").unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains(&path));
    }
}
