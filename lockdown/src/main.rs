use std::{path::PathBuf, process::ExitCode, sync::Arc};

use chrono::Duration;
use clap::{Parser, Subcommand};
use lockdown::{
    Lockdown, LockdownBuilder, LockdownBuilderError, LockdownError, MemoryUserDirectory,
    PolicyConfig, SqliteRepositoryProvider, normalize,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line interface for Lockdown
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database connection string
    #[arg(long, env = "LOCKDOWN_DATABASE_URL")]
    db_url: Option<String>,

    /// JSON file with the lockout policy, merged over LOCKDOWN_* variables
    #[arg(long)]
    policy: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// List active lockouts
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check whether an address is currently locked out
    Check { address: String },
    /// Show the normalized form and subnet key of an address
    Subnet { address: String },
    /// Delete records that no longer affect any lockout decision
    Prune {
        /// Keep released lockouts and old failures for this many days
        #[arg(long, default_value_t = 30)]
        retention_days: i64,
    },
    /// Print version information
    Version,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("--db-url or LOCKDOWN_DATABASE_URL is required for this command")]
    MissingDatabaseUrl,
    #[error("Failed to read policy file {}: {source}", path.display())]
    PolicyFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid policy file {}: {source}", path.display())]
    PolicyFormat {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("--retention-days must be between 0 and {}", i64::MAX / 86_400_000)]
    InvalidRetention,
    #[error(transparent)]
    Core(#[from] lockdown_core::Error),
    #[error(transparent)]
    Builder(#[from] LockdownBuilderError),
    #[error(transparent)]
    Lockdown(#[from] LockdownError),
    #[error("Failed to encode output: {0}")]
    Output(serde_json::Error),
}

fn load_policy(path: Option<&PathBuf>) -> Result<PolicyConfig, CliError> {
    let env_policy = PolicyConfig::from_env()?;
    let Some(path) = path else {
        return Ok(env_policy);
    };

    let contents = std::fs::read_to_string(path).map_err(|source| CliError::PolicyFile {
        path: path.clone(),
        source,
    })?;

    // Keys missing from the file keep the value from the environment.
    let mut merged = serde_json::to_value(&env_policy).map_err(CliError::Output)?;
    let overrides: serde_json::Value =
        serde_json::from_str(&contents).map_err(|source| CliError::PolicyFormat {
            path: path.clone(),
            source,
        })?;
    if let (Some(base), serde_json::Value::Object(overrides)) = (merged.as_object_mut(), overrides)
    {
        base.extend(overrides);
    }

    serde_json::from_value(merged).map_err(|source| CliError::PolicyFormat {
        path: path.clone(),
        source,
    })
}

async fn connect(cli: &Cli) -> Result<Lockdown<SqliteRepositoryProvider>, CliError> {
    let url = cli.db_url.as_deref().ok_or(CliError::MissingDatabaseUrl)?;
    let policy = load_policy(cli.policy.as_ref())?;

    // Admin commands never resolve login names.
    let lockdown = LockdownBuilder::new()
        .with_sqlite(url)
        .await?
        .with_policy(policy)
        .with_user_directory(Arc::new(MemoryUserDirectory::new()))
        .build()
        .await?;
    Ok(lockdown)
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match &cli.command {
        Commands::Migrate => {
            println!("Running migrations...");
            let lockdown = connect(&cli).await?;
            lockdown.migrate().await?;
            println!("Done");
        }
        Commands::List { json } => {
            let lockdown = connect(&cli).await?;
            let lockouts = lockdown.list_active_lockouts().await?;

            if *json {
                let output = serde_json::to_string_pretty(&lockouts).map_err(CliError::Output)?;
                println!("{output}");
            } else if lockouts.is_empty() {
                println!("No active lockouts");
            } else {
                for lockout in lockouts {
                    let user = lockout
                        .user_id
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    println!(
                        "{:<40} user {:<10} {} minutes left",
                        lockout.ip_address, user, lockout.minutes_remaining
                    );
                }
            }
        }
        Commands::Check { address } => {
            let lockdown = connect(&cli).await?;
            match lockdown.active_lockout(address).await? {
                Some(lockout) => println!(
                    "{address} is locked out until {} (subnet {})",
                    lockout.release_at, lockout.subnet
                ),
                None => println!("{address} is not locked out"),
            }
        }
        Commands::Subnet { address } => {
            let normalized = normalize(address)?;
            println!("address: {}", normalized.address);
            println!("subnet:  {}", normalized.subnet);
        }
        Commands::Prune { retention_days } => {
            let retention = Duration::try_days(*retention_days)
                .filter(|_| *retention_days >= 0)
                .ok_or(CliError::InvalidRetention)?;
            let lockdown = connect(&cli).await?;
            let stats = lockdown.prune(retention).await?;
            println!(
                "Removed {} failed attempts and {} lockouts",
                stats.failures, stats.lockouts
            );
        }
        Commands::Version => {
            println!("Lockdown v{}", env!("CARGO_PKG_VERSION"));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::FAILURE
        }
    }
}
