use std::fmt::Write;

use crate::qa::QaResult;

/// Machine-generated "Review" section appended to the agent's PR narrative.
pub fn review_section(qa: &QaResult, skip_reason: Option<&str>) -> String {
    let mut section = String::from("\n\n---\n\n## Review\n\n");

    match (&qa.build_command, qa.build_ran()) {
        (Some(command), true) => {
            let _ = writeln!(section, "*   **Build Run:** Yes (`{}`)", command);
            let _ = writeln!(section, "*   **QA Attempts:** {}", qa.attempts);
            if qa.success {
                let _ = writeln!(section, "*   **Final Build Status:** Success \u{2705}");
            } else {
                let _ = writeln!(section, "*   **Final Build Status:** Failure \u{274c}");
            }
        }
        _ => {
            let reason = skip_reason.unwrap_or("no build command configured");
            let _ = writeln!(section, "*   **Build Run:** No ({})", reason);
            let _ = writeln!(section, "*   **Final Build Status:** Skipped");
        }
    }
    section
}

pub fn pr_body(narrative: &str, qa: &QaResult, skip_reason: Option<&str>) -> String {
    format!("{}{}", narrative.trim_end(), review_section(qa, skip_reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qa::{QaHistory, QaState};

    fn qa(state: QaState, success: bool, attempts: u32) -> QaResult {
        QaResult {
            success,
            state,
            attempts,
            changed_files: vec![],
            build_command: (state != QaState::Skipped).then(|| "mvn test".to_string()),
            history: QaHistory::new(),
            agent_error: None,
        }
    }

    #[test]
    fn test_review_for_passing_build() {
        let section = review_section(&qa(QaState::Converged, true, 2), None);
        assert!(section.contains("## Review"));
        assert!(section.contains("**Build Run:** Yes (`mvn test`)"));
        assert!(section.contains("**QA Attempts:** 2"));
        assert!(section.contains("**Final Build Status:** Success"));
    }

    #[test]
    fn test_review_when_build_not_run() {
        let body = pr_body(
            "## Fix\nParameterized the query.\n\n",
            &qa(QaState::Skipped, true, 0),
            Some("no build command configured"),
        );
        assert!(body.starts_with("## Fix\nParameterized the query.\n\n---"));
        assert!(body.contains("**Build Run:** No (no build command configured)"));
        assert!(body.contains("**Final Build Status:** Skipped"));
    }

    #[test]
    fn test_review_skipped_by_configuration() {
        let section = review_section(
            &qa(QaState::Skipped, true, 0),
            Some("QA review skipped by configuration"),
        );
        assert!(section.contains("Build Run:** No (QA review skipped by configuration)"));
    }
}
