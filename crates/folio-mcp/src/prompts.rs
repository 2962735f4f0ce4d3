//! Prompt templates exposed over MCP.

use serde_json::{json, Value};

use crate::server::McpError;

const AUDIENCES: &[&str] = &["recruiter", "technical", "general"];
const DEPTHS: &[&str] = &["overview", "detailed", "deep-dive"];

pub fn list_prompts() -> Vec<Value> {
    vec![
        json!({
            "name": "summarize_portfolio",
            "description": "Summarize the published portfolio for a given audience.",
            "arguments": [
                {
                    "name": "audience",
                    "description": "Who the summary is for: recruiter, technical, or general.",
                    "required": true
                }
            ]
        }),
        json!({
            "name": "explain_project",
            "description": "Explain one project at a chosen level of detail.",
            "arguments": [
                { "name": "slug", "description": "Slug of the project to explain.", "required": true },
                {
                    "name": "depth",
                    "description": "overview, detailed, or deep-dive.",
                    "required": true
                }
            ]
        }),
        json!({
            "name": "compare_skills",
            "description": "Compare the portfolio's skills against a job's requirements.",
            "arguments": [
                {
                    "name": "requiredSkills",
                    "description": "Comma-separated list of required skills.",
                    "required": true
                },
                {
                    "name": "niceToHave",
                    "description": "Comma-separated list of nice-to-have skills.",
                    "required": false
                }
            ]
        }),
    ]
}

/// Render a prompt. Returns `(description, message text)`.
pub fn get_prompt(name: &str, arguments: &Value) -> Result<(String, String), McpError> {
    match name {
        "summarize_portfolio" => {
            let audience = require_enum(arguments, "audience", AUDIENCES)?;
            let angle = match audience {
                "recruiter" => "hiring signal: responsibilities, impact, and seniority",
                "technical" => "technical depth: stacks, architecture decisions, and trade-offs",
                _ => "an accessible overview in plain language",
            };
            Ok((
                format!("Portfolio summary for a {audience} audience"),
                format!(
                    "Read the published portfolio with the list_content and get_content \
                     tools (projects, experience, education, skills, about). Then write a \
                     summary for a {audience} audience, focusing on {angle}. Keep it under \
                     300 words."
                ),
            ))
        }

        "explain_project" => {
            let slug = require_str(arguments, "slug")?;
            let depth = require_enum(arguments, "depth", DEPTHS)?;
            let instruction = match depth {
                "overview" => "Give a three-sentence overview of what it is and why it matters.",
                "detailed" => {
                    "Describe the problem, the approach, the stack, and the outcome in a few paragraphs."
                }
                _ => {
                    "Walk through the architecture and implementation in depth, including design \
                     decisions, trade-offs, and what you would do differently."
                }
            };
            Ok((
                format!("Explanation of project '{slug}' ({depth})"),
                format!(
                    "Fetch the project with get_content (type \"project\", slug \"{slug}\"). \
                     {instruction}"
                ),
            ))
        }

        "compare_skills" => {
            let required = require_str(arguments, "requiredSkills")?;
            let nice_to_have = arguments
                .get("niceToHave")
                .and_then(Value::as_str)
                .unwrap_or("");
            let mut text = format!(
                "List the portfolio's skills with list_content (type \"skill\") and compare \
                 them against these required skills: {required}."
            );
            if !nice_to_have.is_empty() {
                text.push_str(&format!(" Also note coverage of these nice-to-have skills: {nice_to_have}."));
            }
            text.push_str(
                " Report matches, near-matches (related skills), and gaps, each as a short list.",
            );
            Ok(("Skill comparison against a role's requirements".to_string(), text))
        }

        other => Err(McpError::MethodNotFound(format!("unknown prompt: {other}"))),
    }
}

fn require_str<'a>(arguments: &'a Value, key: &str) -> Result<&'a str, McpError> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| McpError::InvalidParams(format!("missing required argument: {key}")))
}

fn require_enum<'a>(
    arguments: &'a Value,
    key: &str,
    allowed: &[&str],
) -> Result<&'a str, McpError> {
    let value = require_str(arguments, key)?;
    if allowed.contains(&value) {
        Ok(value)
    } else {
        Err(McpError::InvalidParams(format!(
            "{key} must be one of: {}",
            allowed.join(", ")
        )))
    }
}
