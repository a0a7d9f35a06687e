use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::errors::VulnfixError;

static INCLUDE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@include\(([^)]+)\)").expect("valid regex"));

/// Variables available for `{{NAME}}` interpolation in prompt files.
#[derive(Debug, Clone, Default)]
pub struct PromptVariables {
    pub repo_root: String,
    pub vuln_id: Option<String>,
    pub vuln_title: Option<String>,
    pub rule: Option<String>,
    pub build_command: Option<String>,
    pub formatting_command: Option<String>,
}

/// Loads prompt files (`<name>.md`) with include directives and variable interpolation.
pub struct PromptLoader {
    prompts_dir: Option<PathBuf>,
}

const MAX_INCLUDE_DEPTH: u8 = 5;

impl PromptLoader {
    pub fn new(prompts_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = &prompts_dir {
            debug!(dir = %dir.display(), "PromptLoader initialized");
        }
        Self { prompts_dir }
    }

    /// Load a prompt by name, processing @include directives.
    pub fn load(&self, prompt_name: &str) -> Result<String, VulnfixError> {
        let dir = self.prompts_dir.as_ref().ok_or_else(|| {
            VulnfixError::Prompt(format!("No prompts directory configured for {}", prompt_name))
        })?;
        let file_path = dir.join(format!("{}.md", prompt_name));
        if !file_path.exists() {
            return Err(VulnfixError::Prompt(format!(
                "Prompt file not found: {}",
                file_path.display()
            )));
        }
        let content = std::fs::read_to_string(&file_path).map_err(|e| {
            VulnfixError::Prompt(format!("Failed to read prompt {}: {}", file_path.display(), e))
        })?;
        self.process_includes(dir, &content, 0)
    }

    /// Load a prompt if the file exists, otherwise use `default`.
    /// A prompt file that exists but fails to load is still an error.
    pub fn load_or(&self, prompt_name: &str, default: &str) -> Result<String, VulnfixError> {
        if self.has_prompt(prompt_name) {
            self.load(prompt_name)
        } else {
            debug!(prompt = prompt_name, "Using built-in prompt");
            Ok(default.to_string())
        }
    }

    /// Replace {{VARIABLE}} placeholders. None values become empty strings.
    pub fn interpolate(&self, template: &str, vars: &PromptVariables) -> String {
        let mut result = template.replace("{{REPO_ROOT}}", &vars.repo_root);

        let optional_replacements: &[(&str, &Option<String>)] = &[
            ("{{VULN_ID}}", &vars.vuln_id),
            ("{{VULN_TITLE}}", &vars.vuln_title),
            ("{{RULE}}", &vars.rule),
            ("{{BUILD_COMMAND}}", &vars.build_command),
            ("{{FORMATTING_COMMAND}}", &vars.formatting_command),
        ];
        for (placeholder, value) in optional_replacements {
            result = result.replace(placeholder, value.as_deref().unwrap_or(""));
        }

        result
    }

    fn process_includes(&self, dir: &Path, content: &str, depth: u8) -> Result<String, VulnfixError> {
        if depth >= MAX_INCLUDE_DEPTH {
            return Err(VulnfixError::Prompt(format!(
                "Include depth limit ({}) exceeded, possible circular include",
                MAX_INCLUDE_DEPTH
            )));
        }

        let matches: Vec<(String, String)> = INCLUDE_RE
            .captures_iter(content)
            .map(|cap| (cap[0].to_string(), cap[1].to_string()))
            .collect();

        let mut result = content.to_string();
        for (full_match, include_path) in matches {
            let file_path = dir.join(&include_path);
            if !file_path.exists() {
                return Err(VulnfixError::Prompt(format!(
                    "Included file not found: {} (referenced as @include({}))",
                    file_path.display(),
                    include_path
                )));
            }
            let included = std::fs::read_to_string(&file_path).map_err(|e| {
                VulnfixError::Prompt(format!("Failed to read included file {}: {}", file_path.display(), e))
            })?;
            let processed = self.process_includes(dir, &included, depth + 1)?;
            result = result.replace(&full_match, &processed);
        }

        Ok(result)
    }

    pub fn has_prompt(&self, prompt_name: &str) -> bool {
        self.prompts_dir
            .as_ref()
            .map_or(false, |dir| dir.join(format!("{}.md", prompt_name)).exists())
    }
}
