use barterlink_core::{AppConfig, CheckinSigner};
use chrono::Utc;
use clap::Subcommand;

#[derive(Debug, Subcommand)]
pub enum CheckinCommands {
    /// Verify a scanned QR token and print its payload
    Inspect {
        #[arg(long)]
        token: String,
    },
}

pub(crate) fn run(config: &AppConfig, command: CheckinCommands) -> anyhow::Result<()> {
    match command {
        CheckinCommands::Inspect { token } => {
            let signer = CheckinSigner::new(
                config.checkin_signing_key.as_bytes(),
                config.checkin_token_ttl_secs,
            );
            let payload = signer.decode(&token, Utc::now())?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
    }
    Ok(())
}
