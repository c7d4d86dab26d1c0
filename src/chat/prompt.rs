// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! System prompt assembly.
//!
//! Templates are rendered with `minijinja`. Before rendering, every
//! `{{ ... }}` expression in a configured prompt is rewritten: the argument
//! name and `tools` are bound to internal variables by their literal text, and
//! any other placeholder becomes a string literal of itself so it survives
//! rendering unchanged. Control blocks (`{% if %}`, `{% for %}`) are evaluated.

use std::collections::BTreeMap;

use minijinja::{Environment, UndefinedBehavior};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{json, Value};

use crate::error::ConfigError;
use crate::types::ToolDefinition;

/// Error raised while parsing or rendering a template.
pub type TemplateError = minijinja::Error;

/// Template used to render the tool catalog into the `tools` variable.
pub const TOOLS_TEMPLATE: &str = "\
{%- for tool in tools %}
- {{ tool.name }}: {{ tool.description }}
{%- if tool.arguments %}
{%- for arg in tool.arguments %}
  - {{ arg.name }} ({{ arg.type }}{% if arg.required %}, required{% endif %}){% if arg.description %}: {{ arg.description }}{% endif %}
{%- endfor %}
{%- else %}
  No arguments required.
{%- endif %}
{%- endfor %}";

/// System prompt used when the configuration does not supply one.
/// It expects the tool argument to be named `query`.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "\
You are an assistant that answers requests by calling tools.

Available tools:
{{tools}}

Call tools as often as you need. When you know the final answer, call the \
`answer` tool with the complete answer in its `text` argument.

Request: {{query}}";

const TOOLS_NAME: &str = "tools";
const QUERY_VAR: &str = "__spl_query";
const TOOLS_VAR: &str = "__spl_tools";

fn environment<'source>() -> Environment<'source> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Lenient);
    env.set_keep_trailing_newline(true);
    env
}

static TOOLS: Lazy<Environment<'static>> = Lazy::new(|| {
    let mut env = environment();
    env.add_template(TOOLS_NAME, TOOLS_TEMPLATE)
        .expect("built-in tools template");
    env
});

static EXPRESSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{\{(-?)(.*?)(-?)\}\}").expect("expression pattern"));

fn tool_context(tool: &ToolDefinition) -> Value {
    let mut names: Vec<&String> = tool.input_schema.properties.keys().collect();
    names.sort();

    let arguments: Vec<Value> = names
        .into_iter()
        .map(|name| {
            let schema = &tool.input_schema.properties[name];
            json!({
                "name": name,
                "type": schema.get("type").and_then(Value::as_str).unwrap_or("any"),
                "description": schema.get("description").and_then(Value::as_str).unwrap_or_default(),
                "required": tool.input_schema.is_required(name),
            })
        })
        .collect();

    json!({
        "name": tool.name,
        "description": tool.description,
        "arguments": arguments,
    })
}

/// Render the tool catalog as a bulleted list. Empty catalog renders empty.
pub fn render_tools(tools: &[ToolDefinition]) -> Result<String, TemplateError> {
    let context = json!({ "tools": tools.iter().map(tool_context).collect::<Vec<_>>() });
    let rendered = TOOLS.get_template(TOOLS_NAME)?.render(context)?;
    Ok(rendered.trim().to_string())
}

fn placeholder_pattern(name: &str) -> Regex {
    Regex::new(&format!(r"\{{\{{-?\s*{}\s*-?\}}\}}", regex::escape(name))).expect("escaped placeholder pattern")
}

static TOOLS_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| placeholder_pattern("tools"));

/// Rewrite the `{{ ... }}` expressions of a prompt template so the argument
/// name is matched as written, not parsed as a path or an expression.
fn bind_placeholders(template: &str, argument_name: &str) -> String {
    EXPRESSION
        .replace_all(template, |caps: &Captures<'_>| {
            let (open, close) = (&caps[1], &caps[3]);
            let inner = caps[2].trim();
            if inner == argument_name {
                format!("{{{{{open} {QUERY_VAR} {close}}}}}")
            } else if inner == "tools" {
                format!("{{{{{open} {TOOLS_VAR} {close}}}}}")
            } else {
                // JSON string escapes are valid template string literals
                format!("{{{{ {} }}}}", Value::String(caps[0].to_string()))
            }
        })
        .into_owned()
}

/// Check that a prompt template references both the query argument and `tools`.
pub fn validate_template(template: &str, argument_name: &str) -> Result<(), ConfigError> {
    if argument_name.trim().is_empty() {
        return Err(ConfigError::invalid("agent.tool.argumentName", "must not be empty"));
    }
    if !placeholder_pattern(argument_name).is_match(template) {
        return Err(ConfigError::invalid(
            "agent.llm.promptTemplate",
            format!("template must contain {{{{{argument_name}}}}}"),
        ));
    }
    if !TOOLS_PLACEHOLDER.is_match(template) {
        return Err(ConfigError::invalid(
            "agent.llm.promptTemplate",
            "template must contain {{tools}}",
        ));
    }
    let source = bind_placeholders(template, argument_name);
    environment()
        .template_from_str(&source)
        .map_err(|e| ConfigError::invalid("agent.llm.promptTemplate", e.to_string()))?;
    Ok(())
}

/// Render the system prompt. Placeholders other than the argument and
/// `tools` are left as written, and the query is inserted verbatim.
pub fn render_system_prompt(
    template: &str,
    argument_name: &str,
    query: &str,
    tools: &[ToolDefinition],
) -> Result<String, TemplateError> {
    let source = bind_placeholders(template, argument_name);
    let tools = render_tools(tools)?;
    let context = BTreeMap::from([(QUERY_VAR, query), (TOOLS_VAR, tools.as_str())]);
    let env = environment();
    let rendered = env.template_from_str(&source)?.render(context)?;
    Ok(rendered)
}
