use clap::Parser;
use tracing_subscriber::EnvFilter;

use vulnfix::cli::{self, Cli, Commands, LogFormat};
use vulnfix::config;
use vulnfix::errors::VulnfixError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(!cli.no_color);
    match cli.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }

    let result = match cli.command {
        Commands::Run(args) => cli::run::handle_run(*args).await.map(|summary| {
            println!("{}", summary.headline());
        }),
        Commands::Validate(args) => handle_validate(args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(exit_code(&e));
    }
}

fn exit_code(error: &VulnfixError) -> i32 {
    match error {
        VulnfixError::Config(_) => 2,
        VulnfixError::Git(_) | VulnfixError::Libgit2(_) => 3,
        VulnfixError::Authentication(_) => 4,
        _ => 1,
    }
}

async fn handle_validate(args: cli::commands::ValidateArgs) -> Result<(), VulnfixError> {
    let path = std::path::PathBuf::from(&args.config);
    let _config = config::parse_config(&path).await?;
    println!("Configuration is valid: {}", args.config);
    Ok(())
}
