mod checkin;
mod profile;
mod session;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::checkin::CheckinCommands;
use crate::profile::ProfileCommands;
use crate::session::SessionCommands;

#[derive(Debug, Parser)]
#[command(name = "barterlink-cli")]
#[command(about = "Barterlink operator command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Create and inspect profiles
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Issue and revoke session tokens
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// Debug check-in QR tokens
    Checkin {
        #[command(subcommand)]
        command: CheckinCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Apply pending migrations
    Migrate,
    /// Check database connectivity
    Ping,
    /// Load demo profiles and offers from a YAML file
    Seed {
        #[arg(long, default_value = "config/seed.yaml")]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("barterlink-cli: run with --help to list commands");
        return Ok(());
    };

    let config = barterlink_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match command {
        Commands::Checkin { command } => checkin::run(&config, command),
        Commands::Db { command } => run_db(&connect(&config).await?, command).await,
        Commands::Profile { command } => profile::run(&connect(&config).await?, command).await,
        Commands::Session { command } => {
            session::run(&connect(&config).await?, &config, command).await
        }
    }
}

async fn connect(config: &barterlink_core::AppConfig) -> anyhow::Result<sqlx::PgPool> {
    let pool_config = barterlink_db::PoolConfig::from_app_config(config);
    Ok(barterlink_db::connect_pool(&config.database_url, pool_config).await?)
}

async fn run_db(pool: &sqlx::PgPool, command: DbCommands) -> anyhow::Result<()> {
    match command {
        DbCommands::Migrate => {
            let applied = barterlink_db::run_migrations(pool).await?;
            println!("applied {applied} migration(s)");
        }
        DbCommands::Ping => {
            barterlink_db::ping(pool).await?;
            println!("database ok");
        }
        DbCommands::Seed { file } => {
            let seed = barterlink_core::load_seed(&file)?;
            let summary = barterlink_db::seed_demo_data(pool, &seed).await?;
            println!(
                "seeded {} profile(s), {} new offer(s), {} existing offer(s) skipped",
                summary.profiles, summary.offers_inserted, summary.offers_skipped
            );
        }
    }
    Ok(())
}
