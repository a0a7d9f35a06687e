use std::fmt::Write as _;
use std::path::Path;

use crate::agents::port::{QaTask, RemediationTask};

pub const FIX_SYSTEM_PROMPT: &str = "fix-system";
pub const QA_SYSTEM_PROMPT: &str = "qa-system";

pub const DEFAULT_FIX_SYSTEM: &str = "\
You are a security engineer remediating a vulnerability in the repository at {{REPO_ROOT}}.
Make the smallest change that removes the vulnerability while preserving behaviour.
Edit files directly. Do not commit, push or create branches.";

pub const DEFAULT_QA_SYSTEM: &str = "\
You are a build engineer repairing a failing build in the repository at {{REPO_ROOT}}.
Fix only the compilation errors or test failures introduced by the recent changes.
Edit files directly. Do not commit, push or create branches.";

const ANALYSIS_STEPS: &str = "\
1. Identify the specific file(s) and line(s) of code that need modification.
2. Consider several approaches to fix the vulnerability:
   a. Generate at least 2-3 different potential solutions.
   b. Evaluate each on simplicity, scope of change (prefer minimal changes), ease of testing, regression risk and consistency with existing code.
   c. Select the best approach.
3. Apply the chosen solution directly to the files.";

const SECURITY_TEST_STEPS: &str = "\
4. Where feasible, add or update a test that verifies the fix, following the `<BaseName>SecurityTest.<ext>` convention:
   - Use the original HTTP request above as a basis for realistic test input.
   - If a matching security test file exists, add a case to it; otherwise create it in the project's standard test directory.
   - Before mocking any class or method, read it and confirm the mocked methods exist with matching signatures.
   - If testing is not feasible, explain why in the Testing section.";

/// Render the task prompt handed to the fix agent.
pub fn fix_task_prompt(task: &RemediationTask, repo_root: &Path) -> String {
    let candidate = &task.candidate;
    let url = task.vulnerability_url.as_deref().unwrap_or("(not available)");
    let mut prompt = String::new();

    let _ = writeln!(prompt, "Analyze the following vulnerability and apply a fix in the repository.\n");
    let _ = writeln!(prompt, "Vulnerability ID: {}", candidate.id);
    let _ = writeln!(prompt, "Vulnerability Title: {}", candidate.title);
    let _ = writeln!(prompt, "Rule Name: {}", candidate.rule);
    if !candidate.severity.is_empty() {
        let _ = writeln!(prompt, "Severity: {}", candidate.severity);
    }
    let _ = writeln!(prompt, "Details URL: {}\n", url);
    let _ = writeln!(prompt, "{}\n", task.narrative);
    let _ = writeln!(prompt, "Original HTTP request associated with this vulnerability:");
    let _ = writeln!(prompt, "--- HTTP REQUEST START ---\n{}\n--- HTTP REQUEST END ---\n", task.reproduction_request);
    let _ = writeln!(prompt, "Repository root: {}", repo_root.display());
    if let Some(cmd) = &task.build_command {
        let _ = writeln!(prompt, "The change will be verified with: `{}`", cmd);
    }
    let _ = writeln!(prompt, "\n{}", ANALYSIS_STEPS);
    if task.write_security_test {
        let _ = writeln!(prompt, "{}", SECURITY_TEST_STEPS);
    }

    let testing_section = if task.write_security_test {
        "[Briefly describe how the fix was tested or why testing was not feasible.]"
    } else {
        "Automated test writing was skipped based on configuration."
    };
    let _ = write!(
        prompt,
        "\nConclude your response with the pull request body inside <pr_body> tags, in this format:\n\
<pr_body>\n\
This PR addresses vulnerability [{id}]({url}).\n\n\
## Vulnerability Summary\n\n\
[One or two sentences describing the vulnerability.]\n\n\
## Fix Summary\n\n\
[One or two sentences describing the change, and why it mitigates the vulnerability.]\n\n\
## Testing\n\n\
{testing}\n\
</pr_body>\n",
        id = candidate.id,
        url = url,
        testing = testing_section,
    );

    prompt
}

/// Render the prompt asking the QA agent to repair a failing build.
///
/// Earlier summaries are listed so the agent can notice it is undoing and
/// reapplying the same change.
pub fn qa_task_prompt(task: &QaTask) -> String {
    let files = task.changed_files.join(", ");
    let mut prompt = String::new();

    let _ = writeln!(prompt, "The previous agent made changes to the following files:\n{}\n", files);
    let _ = writeln!(prompt, "Running `{}` resulted in the following errors or test failures:", task.build_command);
    let _ = writeln!(prompt, "--- BUILD OUTPUT ---\n{}\n--- END BUILD OUTPUT ---", task.build_output);

    if !task.history.is_empty() {
        let _ = writeln!(prompt, "\nQA History from previous attempts:");
        for (i, summary) in task.history.iter().enumerate() {
            let _ = writeln!(prompt, "Attempt {}: {}", i + 1, summary);
        }
    }

    let _ = writeln!(prompt, "\nYour task is to analyze the build output and the changes made to the files listed above.");
    let _ = writeln!(prompt, "1. Identify the root cause of the compilation errors or test failures within the changed files.");
    let _ = writeln!(prompt, "2. Correct these issues only in the changed files: {}.", files);
    let _ = writeln!(prompt, "3. Fix only the reported errors. Do not introduce unrelated changes or refactor code.");
    let _ = writeln!(
        prompt,
        "4. IMPORTANT: If the QA history shows you repeatedly applying and undoing the same fix, try a different approach instead of repeating one that has been tried before."
    );

    match &task.formatting_command {
        Some(fmt) => {
            let _ = writeln!(
                prompt,
                "5. If the errors are purely formatting or whitespace issues, do not fix them by hand. Respond only with: Please run `{}`.",
                fmt
            );
            let _ = writeln!(prompt, "6. Otherwise apply the fix directly.");
            let _ = writeln!(prompt, "7. Conclude with a brief summary. Start your response directly with the summary.");
            let _ = writeln!(prompt, "\nExample summary (fix applied): Corrected syntax error in Foo.java line 52.");
            let _ = writeln!(prompt, "Example summary (formatting): Please run `{}`.", fmt);
        }
        None => {
            let _ = writeln!(prompt, "5. After applying fixes, conclude with a brief summary. Start your response directly with the summary.");
            let _ = writeln!(prompt, "\nExample summary: Corrected syntax error in Foo.java line 52.");
        }
    }

    prompt
}
