use crate::errors::VulnfixError;

/// Patterns that never belong anywhere in a config file.
const DANGEROUS_PATTERNS: &[&str] = &[
    "<script",
    "javascript:",
    "vbscript:",
    "data:text/html",
];

/// Keys whose values are filesystem locations. Directory traversal is only
/// rejected for these; build commands may legitimately reference `../`.
const PATH_KEYS: &[&str] = &["prompts_dir", "output_dir"];

const TRAVERSAL_PATTERNS: &[&str] = &["../", "..\\"];

pub fn validate_security_patterns(value: &serde_yaml::Value) -> Result<(), VulnfixError> {
    check_value(value, &[])
}

fn check_value(value: &serde_yaml::Value, path: &[String]) -> Result<(), VulnfixError> {
    match value {
        serde_yaml::Value::String(s) => {
            let lower = s.to_lowercase();
            let path_str = if path.is_empty() { "root".to_string() } else { path.join(".") };
            for pattern in DANGEROUS_PATTERNS {
                if lower.contains(pattern) {
                    return Err(VulnfixError::Config(
                        format!("Dangerous pattern '{}' found at config path: {}", pattern, path_str)
                    ));
                }
            }
            let is_path_key = path.last().map_or(false, |k| PATH_KEYS.contains(&k.as_str()));
            if is_path_key {
                for pattern in TRAVERSAL_PATTERNS {
                    if lower.contains(pattern) {
                        return Err(VulnfixError::Config(
                            format!("Directory traversal '{}' found at config path: {}", pattern, path_str)
                        ));
                    }
                }
            }
            Ok(())
        }
        serde_yaml::Value::Mapping(map) => {
            for (k, v) in map {
                let key = k.as_str().unwrap_or("unknown").to_string();
                let mut new_path = path.to_vec();
                new_path.push(key);
                check_value(v, &new_path)?;
            }
            Ok(())
        }
        serde_yaml::Value::Sequence(seq) => {
            for (i, v) in seq.iter().enumerate() {
                let mut new_path = path.to_vec();
                new_path.push(format!("[{}]", i));
                check_value(v, &new_path)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
