// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration merging.
//!
//! Layers environment overrides onto the parsed document and command-line
//! options onto the typed configuration.
//!
//! Precedence (highest to lowest):
//! 1. CLI options
//! 2. `SPL_*` environment variables
//! 3. Config file
//! 4. Default values

use serde_json::{Map, Value};
use tracing::debug;

use super::types::AppConfig;
use crate::mcp::expand_env_vars;

/// Prefix of environment variables that override configuration keys.
pub const ENV_PREFIX: &str = "SPL_";

/// Separator between key path segments in override variable names.
pub const ENV_SEPARATOR: &str = "__";

/// CLI options that can override configuration.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    /// Serve over HTTP/SSE instead of stdio.
    pub daemon: bool,
    /// Replaces `runtime.log.defaultLevel`.
    pub log_level: Option<String>,
}

/// Apply every `SPL_*` variable in `vars` to `document`.
///
/// `SPL_AGENT__LLM__API_KEY=x` sets `agent.llm.apiKey`. Segments match
/// existing keys ignoring case and underscores; missing keys are created in
/// camelCase. Values that parse as JSON scalars (numbers, booleans) are
/// stored typed, everything else as a string.
pub fn apply_env_overrides<I>(document: &mut Value, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut overrides: Vec<(String, String)> = vars
        .into_iter()
        .filter(|(key, _)| {
            key.len() > ENV_PREFIX.len()
                && key
                    .get(..ENV_PREFIX.len())
                    .is_some_and(|prefix| prefix.eq_ignore_ascii_case(ENV_PREFIX))
        })
        .collect();
    // deterministic order when two variables address the same key
    overrides.sort();

    for (key, raw) in overrides {
        let path: Vec<&str> = key[ENV_PREFIX.len()..]
            .split(ENV_SEPARATOR)
            .filter(|s| !s.is_empty())
            .collect();
        if path.is_empty() {
            continue;
        }
        debug!(variable = %key, "Applying environment override");
        set_path(document, &path, parse_env_value(&raw));
    }
}

fn set_path(document: &mut Value, path: &[&str], value: Value) {
    let mut current = document;
    for (i, segment) in path.iter().enumerate() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        let key = map
            .keys()
            .find(|existing| normalize(existing) == normalize(segment))
            .cloned()
            .unwrap_or_else(|| camel_case(segment));

        if i + 1 == path.len() {
            map.insert(key, value);
            return;
        }
        current = map.entry(key).or_insert_with(|| Value::Object(Map::new()));
    }
}

fn normalize(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// `API_KEY` -> `apiKey`, `PORT` -> `port`.
fn camel_case(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for (i, part) in segment.split('_').filter(|p| !p.is_empty()).enumerate() {
        let lower = part.to_lowercase();
        if i == 0 {
            out.push_str(&lower);
        } else {
            let mut chars = lower.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }
    out
}

fn parse_env_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(v @ (Value::Bool(_) | Value::Number(_))) => v,
        _ => Value::String(raw.to_string()),
    }
}

/// Expand `${VAR}` references in the LLM api key.
///
/// Server `apiKey` and `environment` values are expanded when each server
/// is connected.
pub fn expand_secrets(config: &mut AppConfig) {
    config.agent.llm.api_key = expand_env_vars(&config.agent.llm.api_key);
}

/// Apply CLI options (highest precedence).
pub fn apply_cli_options(config: &mut AppConfig, cli: &CliOptions) {
    if cli.daemon {
        config.runtime.transports.http.enabled = true;
        config.runtime.transports.stdio.enabled = false;
    }
    if let Some(ref level) = cli.log_level {
        config.runtime.log.default_level = level.clone();
    }
}
