use serde::{Deserialize, Serialize};

/// Steps of one candidate's life cycle, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Dedup,
    Prepare,
    Fix,
    Commit,
    Qa,
    Publish,
}

pub struct StageDefinition {
    pub stage: Stage,
    pub display_name: &'static str,
    pub description: &'static str,
}

pub static STAGES: &[StageDefinition] = &[
    StageDefinition {
        stage: Stage::Dedup,
        display_name: "Dedup",
        description: "Skip candidates that already have an open remediation PR",
    },
    StageDefinition {
        stage: Stage::Prepare,
        display_name: "Prepare",
        description: "Reset the working tree and check out the base branch",
    },
    StageDefinition {
        stage: Stage::Fix,
        display_name: "Fix",
        description: "Ask the fix agent to remediate the vulnerability",
    },
    StageDefinition {
        stage: Stage::Commit,
        display_name: "Commit",
        description: "Create the candidate branch and commit the fix",
    },
    StageDefinition {
        stage: Stage::Qa,
        display_name: "QA",
        description: "Build and let the QA agent repair failures",
    },
    StageDefinition {
        stage: Stage::Publish,
        display_name: "Publish",
        description: "Push the branch, label it and open the pull request",
    },
];

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dedup => "dedup",
            Self::Prepare => "prepare",
            Self::Fix => "fix",
            Self::Commit => "commit",
            Self::Qa => "qa",
            Self::Publish => "publish",
        }
    }

    pub fn display_name(&self) -> &'static str {
        STAGES
            .iter()
            .find(|d| d.stage == *self)
            .map(|d| d.display_name)
            .unwrap_or("Unknown")
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
