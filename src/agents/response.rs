use std::sync::LazyLock;

use regex::Regex;

static PR_BODY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<pr_body>(.*?)</pr_body>").expect("valid regex"));
static COMMAND_REQUEST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\brun\s+`([^`]+)`").expect("valid regex"));

const FATAL_MARKERS: &[&str] = &[
    "no filesystem tools",
    "cannot make changes to files",
];

/// The pull request body inside `<pr_body>` tags, or the whole response.
pub fn extract_pr_body(response: &str) -> String {
    match PR_BODY.captures(response) {
        Some(cap) => cap[1].trim().to_string(),
        None => response.trim().to_string(),
    }
}

/// A command the agent asks the controller to run, written as ``run `cmd` ``.
/// The last request wins; earlier mentions usually narrate what failed.
pub fn parse_command_request(response: &str) -> Option<String> {
    COMMAND_REQUEST
        .captures_iter(response)
        .map(|cap| cap[1].trim().to_string())
        .filter(|cmd| !cmd.is_empty())
        .last()
}

/// True when the agent reports it had no way to touch the repository.
pub fn is_fatal_response(response: &str) -> bool {
    if response.trim_start().starts_with("FATAL:") {
        return true;
    }
    let lower = response.to_lowercase();
    FATAL_MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_pr_body_from_tags() {
        let response = "<analytics>Confidence: 80%</analytics>\n<pr_body>\n## Fix Summary\nParameterised the query.\n</pr_body>\ntrailing";
        assert_eq!(extract_pr_body(response), "## Fix Summary\nParameterised the query.");
    }

    #[test]
    fn test_extract_pr_body_falls_back_to_full_text() {
        assert_eq!(extract_pr_body("  plain summary \n"), "plain summary");
    }

    #[test]
    fn test_parse_command_request() {
        assert_eq!(
            parse_command_request("Please run `mvn spotless:apply`."),
            Some("mvn spotless:apply".to_string())
        );
        assert_eq!(
            parse_command_request("Formatting only. RUN ` cargo fmt `"),
            Some("cargo fmt".to_string())
        );
        assert_eq!(parse_command_request("Fixed the import in Foo.java"), None);
        assert_eq!(parse_command_request("I ran `ls` earlier"), None);
    }

    #[test]
    fn test_parse_command_request_prefers_last() {
        let reply = "I could not run `mvn test` because of formatting.\nPlease run `mvn spotless:apply`.";
        assert_eq!(parse_command_request(reply), Some("mvn spotless:apply".to_string()));
    }

    #[test]
    fn test_fatal_response_detection() {
        assert!(is_fatal_response("FATAL: could not start tools"));
        assert!(is_fatal_response("No filesystem tools were available."));
        assert!(!is_fatal_response("Applied the fix; nothing fatal happened"));
    }
}
