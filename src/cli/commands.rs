use clap::{Args, Parser, Subcommand, ValueEnum};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_HASH"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

#[derive(Parser)]
#[command(
    name = "vulnfix",
    version = VERSION,
    about = "Fix one reported vulnerability per run and open a pull request for it"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true, env = "VULNFIX_LOG_FORMAT")]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the remediation pipeline once
    Run(Box<RunArgs>),
    /// Validate a configuration file
    Validate(ValidateArgs),
}

#[derive(Args, Clone, Debug, Default)]
pub struct RunArgs {
    /// Repository to remediate
    #[arg(short, long, env = "REPO_ROOT", default_value = ".")]
    pub repo: String,

    /// YAML configuration file
    #[arg(short, long, env = "VULNFIX_CONFIG")]
    pub config: Option<String>,

    /// Directory for run audit trails (relative paths are inside the repository)
    #[arg(short, long, env = "VULNFIX_OUTPUT_DIR")]
    pub output: Option<String>,

    /// Branch fixes are based on and PRs target
    #[arg(long, env = "BASE_BRANCH")]
    pub base_branch: Option<String>,

    /// Command that builds and tests the project; enables QA
    #[arg(long, env = "BUILD_COMMAND")]
    pub build_command: Option<String>,

    /// Auto-formatter the QA agent may ask for
    #[arg(long, env = "FORMATTING_COMMAND")]
    pub formatting_command: Option<String>,

    /// Build attempts in the QA loop (clamped to 1..=6)
    #[arg(long, env = "MAX_BUILD_ATTEMPTS", allow_negative_numbers = true)]
    pub max_build_attempts: Option<String>,

    /// Do nothing when this many remediation PRs are already open
    #[arg(long, env = "MAX_OPEN_PRS", allow_negative_numbers = true)]
    pub max_open_prs: Option<String>,

    /// Skip the QA loop even when a build command is set
    #[arg(long, env = "SKIP_QA_REVIEW")]
    pub skip_qa_review: bool,

    /// Do not add a note to the vulnerability after opening a PR
    #[arg(long, env = "SKIP_COMMENTS")]
    pub skip_comments: bool,

    /// Keep branches of abandoned candidates for inspection
    #[arg(long, env = "KEEP_FAILED_BRANCHES")]
    pub keep_failed_branches: bool,

    /// Stop starting new candidates after this many minutes
    #[arg(long, env = "MAX_RUNTIME_MINUTES")]
    pub max_runtime_minutes: Option<u64>,

    /// Vulnerability feed host
    #[arg(long, env = "CONTRAST_HOST")]
    pub contrast_host: Option<String>,

    #[arg(long, env = "CONTRAST_ORG_ID")]
    pub contrast_org_id: Option<String>,

    #[arg(long, env = "CONTRAST_APP_ID")]
    pub contrast_app_id: Option<String>,

    #[arg(long, env = "CONTRAST_AUTHORIZATION_KEY", hide_env_values = true)]
    pub contrast_authorization_key: Option<String>,

    #[arg(long, env = "CONTRAST_API_KEY", hide_env_values = true)]
    pub contrast_api_key: Option<String>,

    /// Comma-separated severities to remediate (e.g. CRITICAL,HIGH)
    #[arg(long, env = "VULNERABILITY_SEVERITIES")]
    pub severities: Option<String>,

    /// Number of candidates fetched per run
    #[arg(long, env = "CANDIDATE_LIMIT")]
    pub candidate_limit: Option<u32>,

    /// Agent CLI invoked with the prompt on stdin
    #[arg(long, env = "AGENT_COMMAND")]
    pub agent_command: Option<String>,

    /// Model name passed to the agent as VULNFIX_AGENT_MODEL
    #[arg(long, env = "AGENT_MODEL")]
    pub agent_model: Option<String>,

    #[arg(long, env = "AGENT_TIMEOUT_MINUTES")]
    pub agent_timeout_minutes: Option<u64>,

    /// Directory with fix-system.md / qa-system.md overrides
    #[arg(long, env = "VULNFIX_PROMPTS_DIR")]
    pub prompts_dir: Option<String>,

    /// Ask the fix agent to add a security test
    #[arg(long, env = "WRITE_SECURITY_TEST")]
    pub write_security_test: bool,

    #[arg(long, env = "GIT_USER_NAME")]
    pub git_user_name: Option<String>,

    #[arg(long, env = "GIT_USER_EMAIL")]
    pub git_user_email: Option<String>,
}

#[derive(Args, Clone)]
pub struct ValidateArgs {
    /// Configuration file to validate
    pub config: String,
}
