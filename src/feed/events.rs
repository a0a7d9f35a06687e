use serde_json::Value;

use super::story::REDACTED;

const EVENT_VIEWS: &[&str] = &["codeView", "probableStartLocationView"];

/// Render one event from the events summary: its description followed by the
/// code views. Taint values inside code fragments are redacted.
pub fn render_event(event: &Value) -> String {
    let mut out = String::new();
    if let Some(description) = event.get("description").filter(|d| !d.is_null()) {
        out.push_str(&plain(description));
        out.push('\n');
    }
    for view in EVENT_VIEWS {
        if let Some(rendered) = render_view(event, view) {
            out.push_str(&rendered);
            out.push('\n');
        }
    }
    out
}

fn render_view(event: &Value, view_name: &str) -> Option<String> {
    let view = event.get(view_name)?.as_object()?;
    if view.get("nested").and_then(Value::as_bool).unwrap_or(false) {
        return None;
    }
    let lines = view.get("lines")?.as_array()?;
    if lines.is_empty() {
        return None;
    }
    let rendered: Vec<String> = lines
        .iter()
        .filter_map(|line| line.get("fragments").and_then(Value::as_array))
        .map(|fragments| render_fragments(fragments))
        .collect();
    Some(format!("{}: {}", view_name, rendered.join("\n")))
}

fn render_fragments(fragments: &[Value]) -> String {
    fragments
        .iter()
        .filter_map(|fragment| {
            if fragment.get("type").and_then(Value::as_str) == Some("TAINT_VALUE") {
                return Some(REDACTED.to_string());
            }
            fragment
                .get("value")
                .filter(|v| !v.is_null())
                .map(|v| plain(v).replace("&quot;", "\""))
        })
        .collect()
}

/// Render the stack frames of an event-details response as `  at <frame>` lines.
pub fn render_stacktraces(details: &Value) -> String {
    if !details.get("success").and_then(Value::as_bool).unwrap_or(false) {
        return String::new();
    }
    details
        .get("event")
        .and_then(|e| e.get("stacktraces"))
        .and_then(Value::as_array)
        .map(|traces| {
            traces
                .iter()
                .filter_map(|t| t.get("description").and_then(Value::as_str))
                .filter(|d| !d.is_empty())
                .map(|d| format!("  at {}\n", d))
                .collect()
        })
        .unwrap_or_default()
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
