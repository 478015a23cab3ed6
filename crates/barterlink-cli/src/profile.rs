//! Profile commands. Profiles normally arrive through the identity provider;
//! these exist for local setup and support.

use barterlink_core::{ProfileDraft, UserType};
use barterlink_db::ProfileRow;
use clap::{Subcommand, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum UserTypeArg {
    Influencer,
    Business,
}

impl From<UserTypeArg> for UserType {
    fn from(arg: UserTypeArg) -> Self {
        match arg {
            UserTypeArg::Influencer => Self::Influencer,
            UserTypeArg::Business => Self::Business,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum ProfileCommands {
    /// Create a profile
    Create {
        #[arg(long, value_enum)]
        user_type: UserTypeArg,
        #[arg(long)]
        email: String,
        #[arg(long)]
        display_name: String,
        #[arg(long)]
        instagram_handle: Option<String>,
        /// Required for business profiles
        #[arg(long)]
        business_name: Option<String>,
        #[arg(long)]
        business_category: Option<String>,
        #[arg(long)]
        address: Option<String>,
    },
    /// Show a profile by email
    Show {
        #[arg(long)]
        email: String,
    },
}

pub(crate) async fn run(pool: &sqlx::PgPool, command: ProfileCommands) -> anyhow::Result<()> {
    match command {
        ProfileCommands::Create {
            user_type,
            email,
            display_name,
            instagram_handle,
            business_name,
            business_category,
            address,
        } => {
            let draft = ProfileDraft {
                user_type: user_type.into(),
                email,
                display_name,
                avatar_url: None,
                instagram_handle,
                tiktok_handle: None,
                follower_count: None,
                engagement_rate: None,
                niche: None,
                business_name,
                business_category,
                address,
                website_url: None,
                metadata: None,
            };
            let row = barterlink_db::create_profile(pool, draft).await?;
            println!("created {} profile {} <{}>", row.user_type, row.id, row.email);
        }
        ProfileCommands::Show { email } => {
            let row = barterlink_db::get_profile_by_email(pool, &email)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no profile with email '{email}'"))?;
            print_profile(&row);
        }
    }
    Ok(())
}

fn print_profile(row: &ProfileRow) {
    let dash = || "-".to_string();
    println!("{:<18}{}", "ID", row.id);
    println!("{:<18}{}", "TYPE", row.user_type);
    println!("{:<18}{}", "EMAIL", row.email);
    println!("{:<18}{}", "NAME", row.display_name);
    println!(
        "{:<18}{}",
        "INSTAGRAM",
        row.instagram_handle.clone().unwrap_or_else(dash)
    );
    if row.user_type == UserType::Business.as_str() {
        println!(
            "{:<18}{}",
            "BUSINESS",
            row.business_name.clone().unwrap_or_else(dash)
        );
        println!(
            "{:<18}{}",
            "CATEGORY",
            row.business_category.clone().unwrap_or_else(dash)
        );
    } else {
        println!(
            "{:<18}{}",
            "FOLLOWERS",
            row.follower_count.map_or_else(dash, |c| c.to_string())
        );
    }
    println!("{:<18}{}", "CREATED", row.created_at.format("%Y-%m-%d %H:%M"));
}
