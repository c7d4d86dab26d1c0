// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading from files.
//!
//! Handles finding the configuration file and parsing it as YAML or JSON
//! into a generic document, so environment overrides can be layered on
//! before the typed [`AppConfig`] is built.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::ConfigError;

use super::types::AppConfig;

/// Config file names to search for in the working directory (in order).
pub const CONFIG_FILES: &[&str] = &["spl-agent.yaml", "spl-agent.yml", "spl-agent.json"];

/// Global config directory name, under the platform config directory.
pub const GLOBAL_CONFIG_DIR: &str = "spl-agent";

/// Global config file name.
pub const GLOBAL_CONFIG_FILE: &str = "config.yaml";

/// Get the global config directory path.
pub fn get_global_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(GLOBAL_CONFIG_DIR))
}

/// Get the global config file path.
pub fn get_global_config_path() -> Option<PathBuf> {
    get_global_config_dir().map(|dir| dir.join(GLOBAL_CONFIG_FILE))
}

/// Find the configuration file to use.
///
/// Searches `dir` for the names in [`CONFIG_FILES`], then falls back to the
/// global config file.
pub fn find_config_file(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILES
        .iter()
        .map(|name| dir.join(name))
        .chain(get_global_config_path())
        .find(|path| path.is_file())
}

/// Parse a configuration file (JSON or YAML) into a generic document.
pub fn load_config_document(path: &Path) -> Result<Value, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConfigError::NotFound(path.display().to_string()),
        _ => ConfigError::IoError(format!("{}: {e}", path.display())),
    })?;

    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    let document = match extension.to_lowercase().as_str() {
        "yaml" | "yml" => {
            let yaml: serde_yaml::Value = serde_yaml::from_str(&content)?;
            serde_json::to_value(yaml).map_err(|e| ConfigError::InvalidFormat(e.to_string()))?
        }
        "json" => serde_json::from_str(&content)?,
        other => {
            return Err(ConfigError::InvalidFormat(format!(
                "unsupported config extension '{other}' (expected .yaml, .yml or .json)"
            )))
        }
    };

    match document {
        // an empty YAML file parses as null
        Value::Null => Ok(Value::Object(Default::default())),
        Value::Object(_) => Ok(document),
        _ => Err(ConfigError::InvalidFormat(format!(
            "{}: top level must be a mapping",
            path.display()
        ))),
    }
}

/// Build the typed configuration from a document.
pub fn from_document(document: Value) -> Result<AppConfig, ConfigError> {
    serde_json::from_value(document).map_err(|e| ConfigError::InvalidFormat(e.to_string()))
}

/// Load a configuration file without environment overrides.
pub fn load_config_file(path: &Path) -> Result<AppConfig, ConfigError> {
    from_document(load_config_document(path)?)
}

/// An example configuration, as printed by documentation and tests.
pub const EXAMPLE_CONFIG: &str = r#"runtime:
  log:
    defaultLevel: info
    format: auto
    output: stderr
  transports:
    stdio:
      enabled: true
agent:
  name: time-agent
  tool:
    name: ask_time
    description: Answer questions about the current time.
    argumentName: query
    argumentDescription: The question to answer.
  chat:
    maxLLMIterations: 8
    requestBudget: 0.05
  llm:
    provider: openai
    model: gpt-4o-mini
    apiKey: ${OPENAI_API_KEY}
    promptTemplate: |
      Answer the request using these tools:
      {{tools}}
      When done, call the answer tool.
      Request: {{query}}
  connections:
    mcpServers:
      time:
        command: uvx
        args: [mcp-server-time]
        timeout: 10
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_files_order() {
        assert_eq!(CONFIG_FILES.len(), 3);
        assert_eq!(CONFIG_FILES[0], "spl-agent.yaml");
    }

    #[test]
    fn test_global_config_path() {
        if let Some(path) = get_global_config_path() {
            assert!(path.ends_with("spl-agent/config.yaml"));
        }
    }

    #[test]
    fn test_find_prefers_yaml() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("spl-agent.json"), "{}").unwrap();
        std::fs::write(temp.path().join("spl-agent.yaml"), "").unwrap();

        let found = find_config_file(temp.path()).unwrap();
        assert!(found.ends_with("spl-agent.yaml"));
    }

    #[test]
    fn test_load_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("spl-agent.yaml");
        std::fs::write(&path, EXAMPLE_CONFIG).unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.agent.tool.name, "ask_time");
        assert_eq!(config.agent.chat.max_llm_iterations, 8);
        assert_eq!(config.agent.chat.request_budget, 0.05);
        assert_eq!(config.agent.llm.api_key, "${OPENAI_API_KEY}");
        let time = &config.agent.connections.mcp_servers["time"];
        assert_eq!(time.command.as_deref(), Some("uvx"));
        assert_eq!(time.timeout, 10.0);
    }

    #[test]
    fn test_load_json() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("spl-agent.json");
        std::fs::write(
            &path,
            r#"{"runtime": {"log": {"disableMCP": true, "format": "json"}}, "agent": {"llm": {"provider": "anthropic"}}}"#,
        )
        .unwrap();

        let config = load_config_file(&path).unwrap();
        assert!(config.runtime.log.disable_mcp);
        assert_eq!(config.runtime.log.format, super::super::LogFormat::Json);
        assert_eq!(config.agent.llm.provider, "anthropic");
    }

    #[test]
    fn test_empty_yaml_is_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("spl-agent.yml");
        std::fs::write(&path, "").unwrap();
        let config = load_config_file(&path).unwrap();
        assert!(config.runtime.transports.stdio.enabled);
    }

    #[test]
    fn test_missing_file() {
        let temp = TempDir::new().unwrap();
        let result = load_config_file(&temp.path().join("nope.yaml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_invalid_documents() {
        let temp = TempDir::new().unwrap();

        let path = temp.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_config_file(&path), Err(ConfigError::JsonError(_))));

        let path = temp.path().join("list.yaml");
        std::fs::write(&path, "- a\n- b\n").unwrap();
        assert!(matches!(load_config_file(&path), Err(ConfigError::InvalidFormat(_))));

        let path = temp.path().join("config.toml");
        std::fs::write(&path, "a = 1").unwrap();
        assert!(matches!(load_config_file(&path), Err(ConfigError::InvalidFormat(_))));

        let path = temp.path().join("types.yaml");
        std::fs::write(&path, "agent:\n  chat:\n    maxLLMIterations: lots\n").unwrap();
        assert!(matches!(load_config_file(&path), Err(ConfigError::InvalidFormat(_))));
    }
}
