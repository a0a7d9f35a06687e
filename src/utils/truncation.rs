const MAX_OUTPUT_LENGTH: usize = 15_000;
const MAX_LOG_TAIL: usize = 1_000;

/// Keep the head and tail of long tool output, cutting on char boundaries.
pub fn truncate_output(output: &str) -> String {
    truncate_middle(output, MAX_OUTPUT_LENGTH)
}

pub fn truncate_middle(output: &str, max_len: usize) -> String {
    if output.len() <= max_len {
        return output.to_string();
    }
    let half = max_len / 2;
    let start = &output[..floor_char_boundary(output, half)];
    let end = &output[ceil_char_boundary(output, output.len() - half)..];
    format!(
        "{}\n\n... [truncated {} chars] ...\n\n{}",
        start,
        output.len() - start.len() - end.len(),
        end
    )
}

/// The last `MAX_LOG_TAIL` bytes of build output, for debug logging.
pub fn log_tail(output: &str) -> &str {
    if output.len() <= MAX_LOG_TAIL {
        output
    } else {
        &output[ceil_char_boundary(output, output.len() - MAX_LOG_TAIL)..]
    }
}

/// Truncate to at most `max_len` bytes, appending "..." when cut.
pub fn truncate_chars(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        text.to_string()
    } else {
        format!("{}...", &text[..floor_char_boundary(text, max_len)])
    }
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_output_untouched() {
        assert_eq!(truncate_middle("error: X", 100), "error: X");
    }

    #[test]
    fn test_long_output_keeps_head_and_tail() {
        let text = format!("{}{}", "a".repeat(50), "b".repeat(50));
        let out = truncate_middle(&text, 20);
        assert!(out.starts_with("aaaaaaaaaa"));
        assert!(out.ends_with("bbbbbbbbbb"));
        assert!(out.contains("[truncated 80 chars]"));
    }

    #[test]
    fn test_multibyte_boundaries_do_not_panic() {
        let text = "é".repeat(40);
        let out = truncate_middle(&text, 11);
        assert!(out.contains("truncated"));
        assert!(log_tail(&"ü".repeat(2000)).len() <= 1001);
        assert!(truncate_chars("ééé", 3).ends_with("..."));
    }
}
