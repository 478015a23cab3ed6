//! Session token commands. Tokens stand in for the identity provider's
//! sessions in local and test environments.

use barterlink_core::{AppConfig, MAX_SESSION_TTL_HOURS};
use chrono::Utc;
use clap::Subcommand;

#[derive(Debug, Subcommand)]
pub enum SessionCommands {
    /// Issue a bearer token for a profile
    Issue {
        #[arg(long)]
        email: String,
        /// Overrides BARTERLINK_SESSION_TTL_HOURS
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_SESSION_TTL_HOURS)))]
        ttl_hours: Option<u32>,
    },
    /// Revoke every live session of a profile
    Revoke {
        #[arg(long)]
        email: String,
    },
}

pub(crate) async fn run(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    command: SessionCommands,
) -> anyhow::Result<()> {
    match command {
        SessionCommands::Issue { email, ttl_hours } => {
            let profile = barterlink_db::get_profile_by_email(pool, &email)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no profile with email '{email}'"))?;
            let issued = barterlink_db::issue_session(
                pool,
                profile.id,
                &config.session_hash_salt,
                ttl_hours.unwrap_or(config.session_ttl_hours),
                Utc::now(),
            )
            .await?;
            tracing::info!(
                profile_id = %profile.id,
                session_id = %issued.session_id,
                "session issued from cli"
            );
            println!("{}", issued.token);
            eprintln!(
                "session {} for {} expires {}",
                issued.session_id,
                profile.email,
                issued.expires_at.format("%Y-%m-%d %H:%M UTC")
            );
        }
        SessionCommands::Revoke { email } => {
            let profile = barterlink_db::get_profile_by_email(pool, &email)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no profile with email '{email}'"))?;
            let revoked =
                barterlink_db::revoke_sessions_for_profile(pool, profile.id, Utc::now()).await?;
            println!("revoked {revoked} session(s) for {}", profile.email);
        }
    }
    Ok(())
}
