use std::path::Path;
use crate::errors::VulnfixError;
use super::types::VulnfixConfig;
use super::security::validate_security_patterns;
use super::schema::CONFIG_SCHEMA;
use super::settings::{MAX_BUILD_ATTEMPTS_CEILING, MIN_BUILD_ATTEMPTS};
use tracing::warn;

pub async fn parse_config(path: &Path) -> Result<VulnfixConfig, VulnfixError> {
    if !path.exists() {
        return Err(VulnfixError::Config(format!("Config file not found: {}", path.display())));
    }

    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > 1_048_576 {
        return Err(VulnfixError::Config("Config file exceeds 1MB limit".into()));
    }

    let content = tokio::fs::read_to_string(path).await?;
    parse_config_str(&content)
}

pub fn parse_config_str(content: &str) -> Result<VulnfixConfig, VulnfixError> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(content)?;
    if yaml.is_null() {
        return Ok(VulnfixConfig::default());
    }

    validate_security_patterns(&yaml)?;
    validate_schema(&yaml)?;

    let config: VulnfixConfig = serde_yaml::from_value(yaml)?;

    validate_conflicts(&config)?;

    Ok(config)
}

/// Structural check against the JSON schema. Violations are logged, not fatal.
fn validate_schema(yaml: &serde_yaml::Value) -> Result<(), VulnfixError> {
    let json_value = serde_json::to_value(yaml)
        .map_err(|e| VulnfixError::Config(format!("Config conversion error: {}", e)))?;

    let compiled = jsonschema::JSONSchema::compile(&CONFIG_SCHEMA)
        .map_err(|e| VulnfixError::Config(format!("Schema compilation error: {}", e)))?;

    let result = compiled.validate(&json_value);
    if let Err(errors) = result {
        for e in errors {
            warn!(validation_error = %format!("{} at {}", e, e.instance_path), "Config schema warning");
        }
    }

    Ok(())
}

/// Detect semantic conflicts in the parsed configuration.
fn validate_conflicts(config: &VulnfixConfig) -> Result<(), VulnfixError> {
    if let Some(github) = &config.github {
        if let Some(max) = github.max_open_prs {
            if max < 0 {
                return Err(VulnfixError::Config(format!(
                    "github.max_open_prs must not be negative (got {})",
                    max
                )));
            }
        }
    }

    if let Some(build) = &config.build {
        let has_build = build.command.as_ref().map_or(false, |c| !c.trim().is_empty());
        let has_formatter = build.formatting_command.as_ref().map_or(false, |c| !c.trim().is_empty());
        if has_formatter && !has_build {
            warn!("Formatting command configured without a build command; it will never run");
        }
        if let Some(attempts) = build.max_attempts {
            if attempts < MIN_BUILD_ATTEMPTS as i64 || attempts > MAX_BUILD_ATTEMPTS_CEILING as i64 {
                warn!(
                    configured = attempts,
                    min = MIN_BUILD_ATTEMPTS,
                    max = MAX_BUILD_ATTEMPTS_CEILING,
                    "build.max_attempts outside allowed range; it will be clamped"
                );
            }
        }
        if build.skip_qa_review == Some(true) && has_build {
            warn!("build.skip_qa_review is set; the build command will not be run");
        }
    }

    if let Some(feed) = &config.feed {
        if let Some(severities) = &feed.severities {
            if severities.is_empty() {
                return Err(VulnfixError::Config("feed.severities must not be an empty list".into()));
            }
        }
    }

    Ok(())
}
