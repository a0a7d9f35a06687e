use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agents::CommandAgent;
use crate::audit::AuditSession;
use crate::cli::commands::RunArgs;
use crate::config::credentials::resolve_credential;
use crate::config::settings::{
    clamp_build_attempts, default_severities, non_blank, parse_severities, resolve_max_open_prs,
    AgentSettings, BuildSettings, FeedSettings, GitIdentity, DEFAULT_AGENT_TIMEOUT,
    DEFAULT_BASE_BRANCH, DEFAULT_BUILD_TIMEOUT, DEFAULT_CANDIDATE_LIMIT, DEFAULT_MAX_RUNTIME,
    DEFAULT_OUTPUT_DIR,
};
use crate::config::{self, Settings, VulnfixConfig};
use crate::errors::VulnfixError;
use crate::feed::ContrastClient;
use crate::git::{GhCli, GitWorkspace, Workspace};
use crate::pipeline::{Collaborators, PipelineConfig, PipelineController, RunSummary};
use crate::qa::ShellBuildRunner;

pub async fn handle_run(args: RunArgs) -> Result<RunSummary, VulnfixError> {
    let file_config = match &args.config {
        Some(path) => Some(config::parse_config(Path::new(path)).await?),
        None => None,
    };
    let settings = build_settings(&args, file_config.as_ref())?;
    info!(
        repo = %settings.repo_root.display(),
        base_branch = %settings.base_branch,
        qa = settings.qa_enabled(),
        max_attempts = settings.build.max_attempts,
        max_open_prs = settings.max_open_prs,
        "Starting vulnfix"
    );

    let workspace = Arc::new(
        GitWorkspace::open(&settings.repo_root, &settings.base_branch)?
            .with_identity(settings.git.clone()),
    );
    if workspace.exclude_dir(&settings.output_dir)? {
        info!(dir = %settings.output_dir.display(), "Added output directory to .git/info/exclude");
    }

    let run_id = format!(
        "{}-{}",
        Utc::now().format("%Y%m%d-%H%M%S"),
        &uuid::Uuid::new_v4().simple().to_string()[..8]
    );
    let audit = Arc::new(
        AuditSession::initialize(&settings.output_dir, &run_id, &settings.repo_root).await?,
    );
    info!(run_id = %run_id, audit_dir = %audit.base_dir().display(), "Audit trail initialized");

    let workspace: Arc<dyn Workspace> = workspace;
    let secrets = settings.secrets().into_iter().map(str::to_string).collect();
    let agent = CommandAgent::new(
        settings.agent.clone(),
        settings.repo_root.clone(),
        workspace.clone(),
    )
    .with_audit(audit.clone())
    .with_secrets(secrets);

    let collaborators = Collaborators {
        feed: Arc::new(ContrastClient::new(&settings.feed)?),
        agent: Arc::new(agent),
        runner: Arc::new(ShellBuildRunner::new(
            settings.repo_root.clone(),
            settings.build.timeout,
        )),
        workspace,
        host: Arc::new(GhCli::new(&settings.repo_root)),
    };

    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing the current candidate");
            token.cancel();
        }
    });

    let controller = PipelineController::new(PipelineConfig::from_settings(&settings), collaborators)
        .with_audit(audit)
        .with_cancel_token(cancel_token);
    controller.run().await
}

/// Merge CLI/environment values over the config file into `Settings`.
pub fn build_settings(
    args: &RunArgs,
    file_config: Option<&VulnfixConfig>,
) -> Result<Settings, VulnfixError> {
    let file = file_config.cloned().unwrap_or_default();
    let build = file.build.unwrap_or_default();
    let feed = file.feed.unwrap_or_default();
    let agent = file.agent.unwrap_or_default();
    let github = file.github.unwrap_or_default();
    let git = file.git.unwrap_or_default();
    let run = file.run.unwrap_or_default();

    let repo_root = std::fs::canonicalize(&args.repo).map_err(|e| {
        VulnfixError::Config(format!("Repository path '{}' is not accessible: {}", args.repo, e))
    })?;

    let output_dir = PathBuf::from(
        non_blank(args.output.clone())
            .or(non_blank(run.output_dir))
            .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string()),
    );
    let output_dir = if output_dir.is_absolute() {
        output_dir
    } else {
        repo_root.join(output_dir)
    };

    let severities = match non_blank(args.severities.clone()) {
        Some(list) => {
            let parsed = parse_severities(&list);
            if parsed.is_empty() {
                return Err(VulnfixError::Config(format!("No valid severities in '{}'", list)));
            }
            parsed
        }
        None => feed.severities.unwrap_or_else(default_severities),
    };

    let feed = FeedSettings {
        host: required("CONTRAST_HOST", args.contrast_host.clone().or(feed.host))?,
        org_id: required("CONTRAST_ORG_ID", args.contrast_org_id.clone().or(feed.org_id))?,
        app_id: required("CONTRAST_APP_ID", args.contrast_app_id.clone().or(feed.app_id))?,
        authorization_key: required(
            "CONTRAST_AUTHORIZATION_KEY",
            args.contrast_authorization_key.clone().or(feed.authorization_key),
        )?,
        api_key: required("CONTRAST_API_KEY", args.contrast_api_key.clone().or(feed.api_key))?,
        severities,
        limit: args.candidate_limit.or(feed.limit).unwrap_or(DEFAULT_CANDIDATE_LIMIT).max(1),
    };

    let build = BuildSettings {
        command: non_blank(args.build_command.clone()).or(non_blank(build.command)),
        formatting_command: non_blank(args.formatting_command.clone())
            .or(non_blank(build.formatting_command)),
        max_attempts: clamp_build_attempts(
            parse_count("MAX_BUILD_ATTEMPTS", args.max_build_attempts.as_deref()).or(build.max_attempts),
        ),
        timeout: build.timeout_secs.map(Duration::from_secs).unwrap_or(DEFAULT_BUILD_TIMEOUT),
        skip_qa_review: args.skip_qa_review || build.skip_qa_review.unwrap_or(false),
    };

    let agent = AgentSettings {
        command: required("AGENT_COMMAND", args.agent_command.clone().or(agent.command))?,
        model: non_blank(args.agent_model.clone()).or(non_blank(agent.model)),
        timeout: args
            .agent_timeout_minutes
            .map(|m| Duration::from_secs(m * 60))
            .or(agent.timeout_secs.map(Duration::from_secs))
            .unwrap_or(DEFAULT_AGENT_TIMEOUT),
        prompts_dir: non_blank(args.prompts_dir.clone())
            .or(non_blank(agent.prompts_dir))
            .map(PathBuf::from),
        write_security_test: args.write_security_test || agent.write_security_test.unwrap_or(false),
    };

    Ok(Settings {
        repo_root,
        output_dir,
        base_branch: non_blank(args.base_branch.clone())
            .or(non_blank(github.base_branch))
            .unwrap_or_else(|| DEFAULT_BASE_BRANCH.to_string()),
        build,
        max_open_prs: resolve_max_open_prs(
            parse_count("MAX_OPEN_PRS", args.max_open_prs.as_deref()).or(github.max_open_prs),
        ),
        max_runtime: args
            .max_runtime_minutes
            .or(run.max_runtime_minutes)
            .map(|m| Duration::from_secs(m * 60))
            .unwrap_or(DEFAULT_MAX_RUNTIME),
        skip_comments: args.skip_comments || github.skip_comments.unwrap_or(false),
        keep_failed_branches: args.keep_failed_branches
            || github.keep_failed_branches.unwrap_or(false),
        feed,
        agent,
        git: GitIdentity {
            name: non_blank(args.git_user_name.clone()).or(non_blank(git.author_name)),
            email: non_blank(args.git_user_email.clone()).or(non_blank(git.author_email)),
        },
    })
}

/// A mandatory value; `$VAR` references are resolved from the environment.
fn required(name: &str, value: Option<String>) -> Result<String, VulnfixError> {
    non_blank(value)
        .map(|v| resolve_credential(&v))
        .ok_or_else(|| VulnfixError::Config(format!("{} is required", name)))
}

/// An optional integer knob. Malformed values are logged and ignored.
fn parse_count(name: &str, value: Option<&str>) -> Option<i64> {
    let value = value.map(str::trim).filter(|v| !v.is_empty())?;
    match value.parse::<i64>() {
        Ok(n) => Some(n),
        Err(_) => {
            warn!(setting = name, value = %value, "Not an integer, using the default");
            None
        }
    }
}
