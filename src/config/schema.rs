use serde_json::{json, Value};
use std::sync::LazyLock;

pub static CONFIG_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "feed": {
                "type": "object",
                "properties": {
                    "host": { "type": "string" },
                    "org_id": { "type": "string" },
                    "app_id": { "type": "string" },
                    "authorization_key": { "type": "string" },
                    "api_key": { "type": "string" },
                    "severities": {
                        "type": "array",
                        "items": { "type": "string", "enum": ["CRITICAL", "HIGH", "MEDIUM", "LOW", "NOTE"] }
                    },
                    "limit": { "type": "integer", "minimum": 1 }
                }
            },
            "build": {
                "type": "object",
                "properties": {
                    "command": { "type": "string" },
                    "formatting_command": { "type": "string" },
                    "max_attempts": { "type": "integer" },
                    "timeout_secs": { "type": "integer", "minimum": 1 },
                    "skip_qa_review": { "type": "boolean" }
                }
            },
            "agent": {
                "type": "object",
                "properties": {
                    "command": { "type": "string" },
                    "model": { "type": "string" },
                    "timeout_secs": { "type": "integer", "minimum": 1 },
                    "prompts_dir": { "type": "string" },
                    "write_security_test": { "type": "boolean" }
                }
            },
            "github": {
                "type": "object",
                "properties": {
                    "base_branch": { "type": "string" },
                    "max_open_prs": { "type": "integer" },
                    "skip_comments": { "type": "boolean" },
                    "keep_failed_branches": { "type": "boolean" }
                }
            },
            "git": {
                "type": "object",
                "properties": {
                    "author_name": { "type": "string" },
                    "author_email": { "type": "string" }
                }
            },
            "run": {
                "type": "object",
                "properties": {
                    "max_runtime_minutes": { "type": "integer", "minimum": 1 },
                    "output_dir": { "type": "string" }
                }
            }
        }
    })
});
