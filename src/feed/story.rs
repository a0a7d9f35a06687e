use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

pub const REDACTED: &str = "[REDACTED]";

static TAINT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{\{#taint\}\}.*?\{\{/taint\}\}").expect("valid regex"));
static LEFTOVER_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{.*?\}\}").expect("valid regex"));

/// Render the `story` object of a story response into redacted plain text.
///
/// Chapters contribute their intro and body text in order, followed by the
/// risk section. Empty chunks are dropped.
pub fn render_story(story: &Value) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(chapters) = story.get("chapters").and_then(Value::as_array) {
        for chapter in chapters {
            parts.extend(render_chunk(chapter, "introTextFormat", "introTextVariables"));
            parts.extend(render_chunk(chapter, "bodyFormat", "bodyFormatVariables"));
        }
    }
    if let Some(risk) = story.get("risk") {
        parts.extend(render_chunk(risk, "formattedText", "formattedTextVariables"));
    }

    parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_chunk(node: &Value, text_key: &str, vars_key: &str) -> Option<String> {
    let text = node.get(text_key)?.as_str()?;
    let empty = serde_json::Map::new();
    let vars = node.get(vars_key).and_then(Value::as_object).unwrap_or(&empty);
    Some(redact_template(text, vars))
}

/// Apply the feed's templating rules with redaction:
/// taint blocks and tainted variables become `[REDACTED]`, paragraph and
/// newline markers become newlines, unresolved placeholders are redacted.
pub fn redact_template(text: &str, vars: &serde_json::Map<String, Value>) -> String {
    let mut out = TAINT_BLOCK.replace_all(text, REDACTED).into_owned();

    for (key, value) in vars {
        let placeholder = format!("{{{{{}}}}}", key);
        if !out.contains(&placeholder) {
            continue;
        }
        let replacement = if key.to_lowercase().contains("tainted") {
            REDACTED.to_string()
        } else {
            value_text(value)
        };
        out = out.replace(&placeholder, &replacement);
    }

    out = out
        .replace("{{#paragraph}}", "\n")
        .replace("{{/paragraph}}", "\n")
        .replace("{{{nl}}}", "\n");

    LEFTOVER_PLACEHOLDER.replace_all(&out, REDACTED).trim().to_string()
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_taint_block_redacted() {
        let vars = serde_json::Map::new();
        let out = redact_template("query {{#taint}}' OR 1=1 --{{/taint}} executed", &vars);
        assert_eq!(out, "query [REDACTED] executed");
    }

    #[test]
    fn test_variables_substituted_and_tainted_keys_redacted() {
        let vars = json!({"method": "executeQuery", "taintedValue": "secret"});
        let out = redact_template(
            "Call to {{method}} with {{taintedValue}}",
            vars.as_object().unwrap(),
        );
        assert_eq!(out, "Call to executeQuery with [REDACTED]");
    }

    #[test]
    fn test_paragraph_markers_and_leftovers() {
        let vars = serde_json::Map::new();
        let out = redact_template("{{#paragraph}}First{{/paragraph}}Second {{unknown}}", &vars);
        assert_eq!(out, "First\nSecond [REDACTED]");
    }

    #[test]
    fn test_non_string_variables_rendered() {
        let vars = json!({"line": 42});
        let out = redact_template("at line {{line}}", vars.as_object().unwrap());
        assert_eq!(out, "at line 42");
    }

    #[test]
    fn test_render_story_orders_chapters_then_risk() {
        let story = json!({
            "chapters": [
                {"introTextFormat": "Data came from {{source}}", "introTextVariables": {"source": "a request parameter"},
                 "bodyFormat": "", "bodyFormatVariables": {}},
                {"introTextFormat": "It reached {{sink}}", "introTextVariables": {"sink": "a SQL query"}}
            ],
            "risk": {"formattedText": "Attackers can read {{what}}", "formattedTextVariables": {"what": "the database"}}
        });
        assert_eq!(
            render_story(&story),
            "Data came from a request parameter\nIt reached a SQL query\nAttackers can read the database"
        );
    }

    #[test]
    fn test_render_story_without_chapters() {
        assert_eq!(render_story(&json!({})), "");
    }
}
