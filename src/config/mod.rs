// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration module for spl-agent.
//!
//! Handles loading, merging, and validation of configuration from multiple sources:
//! - Config file: `--config PATH`, else ./spl-agent.yaml, ./spl-agent.yml,
//!   ./spl-agent.json, else `<config dir>/spl-agent/config.yaml`
//! - Environment: `SPL_*` variables, `__` between key segments
//! - CLI options: command-line arguments
//!
//! Configuration is merged with precedence (CLI > environment > file > defaults).

mod loader;
mod merger;
mod types;

// Re-export public types
pub use loader::{
    find_config_file, from_document, get_global_config_dir, get_global_config_path, load_config_document,
    load_config_file, CONFIG_FILES, EXAMPLE_CONFIG, GLOBAL_CONFIG_DIR, GLOBAL_CONFIG_FILE,
};

pub use merger::{apply_cli_options, apply_env_overrides, expand_secrets, CliOptions, ENV_PREFIX, ENV_SEPARATOR};

pub use types::{
    AgentSettings, AppConfig, ChatSettings, ConnectionsConfig, HttpTransportConfig, LlmConfig, LogConfig,
    LogFormat, RuntimeConfig, StdioTransportConfig, ToolSettings, TransportsConfig,
};

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::ConfigError;

/// A loaded configuration and the file it came from, if any.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: AppConfig,
    pub source: Option<PathBuf>,
}

/// Load, merge and validate all configuration sources.
///
/// This is the main entry point for configuration loading. An explicit
/// `path` must exist; otherwise the search order is used, and with no file at
/// all the defaults plus environment overrides are used.
pub fn load_config(path: Option<&Path>, cli: &CliOptions) -> Result<LoadedConfig, ConfigError> {
    load_config_with_env(path, cli, std::env::current_dir()?.as_path(), std::env::vars())
}

/// [`load_config`] with an explicit search directory and environment.
pub fn load_config_with_env<I>(
    path: Option<&Path>,
    cli: &CliOptions,
    search_dir: &Path,
    vars: I,
) -> Result<LoadedConfig, ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let source = match path {
        Some(p) if !p.is_file() => return Err(ConfigError::NotFound(p.display().to_string())),
        Some(p) => Some(p.to_path_buf()),
        None => find_config_file(search_dir),
    };

    let mut document = match source {
        Some(ref p) => load_config_document(p)?,
        None => Value::Object(Default::default()),
    };
    apply_env_overrides(&mut document, vars);

    let mut config = from_document(document)?;
    expand_secrets(&mut config);
    apply_cli_options(&mut config, cli);
    config.validate()?;

    Ok(LoadedConfig { config, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_load_config_with_no_files() {
        let temp = TempDir::new().unwrap();
        let result = load_config_with_env(
            None,
            &CliOptions::default(),
            temp.path(),
            env(&[
                ("SPL_AGENT__LLM__PROVIDER", "openai"),
                ("SPL_AGENT__LLM__MODEL", "gpt-4o"),
                ("SPL_AGENT__LLM__API_KEY", "sk-env"),
            ]),
        );
        // a global config file, if present, may change the outcome
        if get_global_config_path().is_some_and(|p| p.is_file()) {
            return;
        }
        let loaded = result.unwrap();
        assert!(loaded.source.is_none());
        assert_eq!(loaded.config.agent.llm.api_key, "sk-env");
    }

    #[test]
    fn test_load_config_with_workspace_config() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("spl-agent.yaml"), EXAMPLE_CONFIG).unwrap();

        let loaded = load_config_with_env(
            None,
            &CliOptions::default(),
            temp.path(),
            env(&[("SPL_AGENT__LLM__API_KEY", "sk-override")]),
        )
        .unwrap();
        assert!(loaded.source.unwrap().ends_with("spl-agent.yaml"));
        assert_eq!(loaded.config.agent.llm.api_key, "sk-override");
        assert_eq!(loaded.config.agent.tool.name, "ask_time");
    }

    #[test]
    fn test_cli_overrides_win() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.yaml");
        std::fs::write(&path, EXAMPLE_CONFIG).unwrap();

        let cli = CliOptions {
            daemon: true,
            log_level: Some("warn".to_string()),
        };
        let loaded = load_config_with_env(
            Some(&path),
            &cli,
            temp.path(),
            env(&[
                ("SPL_AGENT__LLM__API_KEY", "sk-x"),
                ("SPL_RUNTIME__LOG__DEFAULT_LEVEL", "debug"),
            ]),
        )
        .unwrap();
        assert!(loaded.config.runtime.transports.http.enabled);
        assert_eq!(loaded.config.runtime.log.default_level, "warn");
    }

    #[test]
    fn test_explicit_missing_path() {
        let temp = TempDir::new().unwrap();
        let result = load_config_with_env(
            Some(&temp.path().join("absent.yaml")),
            &CliOptions::default(),
            temp.path(),
            Vec::new(),
        );
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_validation_runs_after_merge() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("spl-agent.yaml");
        std::fs::write(&path, EXAMPLE_CONFIG).unwrap();

        let result = load_config_with_env(
            Some(&path),
            &CliOptions::default(),
            temp.path(),
            env(&[("SPL_AGENT__LLM__API_KEY", "sk-x"), ("SPL_AGENT__CHAT__MAX_LLM_ITERATIONS", "0")]),
        );
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
