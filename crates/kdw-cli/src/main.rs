use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kdw_config::RunMode;
use kdw_db::PgStore;
use kdw_reconcile::SubjectStore;

#[derive(Parser)]
#[command(name = "kdw")]
#[command(about = "KDA watch CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env overrides ...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Run one reconciliation cycle against the configured DB and print the summary
    Cycle {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Mode (DRY_RUN | LIVE). DRY_RUN logs notifications instead of sending them.
        #[arg(long, default_value = "DRY_RUN")]
        mode: String,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = kdw_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = kdw_db::status(&pool).await?;
                    println!(
                        "db_ok={} has_subjects_table={} active_subjects={}",
                        s.ok, s.has_subjects_table, s.active_subjects
                    );
                }
                DbCmd::Migrate => {
                    kdw_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = kdw_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Cycle { config_paths, mode } => {
            let mode = RunMode::parse(&mode)?;
            let path_refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();
            let loaded = kdw_config::load_layered_yaml(&path_refs)?;
            let settings = loaded.settings()?;
            let secrets = kdw_config::resolve_secrets_for_mode(&settings, mode)?;

            let pool = kdw_db::connect_from_env().await?;
            let store: Arc<dyn SubjectStore> = Arc::new(PgStore::new(pool));
            let engine = kdw_daemon::wiring::build_engine(&settings, &secrets, store);

            let report = engine.run_cycle().await.context("cycle aborted")?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", serde_json::to_string_pretty(&report.summary())?);
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
