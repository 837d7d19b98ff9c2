//! AWS MFA session refresher
//!
//! Replaces the `[default]` profile of the shared AWS credentials file with a
//! short-lived session obtained through MFA.
//!
//! The program performs the following operations:
//! 1. Parses command-line arguments for configuration
//! 2. Prompts for the MFA code on standard input
//! 3. Resolves the caller's ARN and derives the MFA device from it
//! 4. Exchanges the MFA code for temporary credentials through STS
//! 5. Rewrites the credentials file through a temporary file and a rename

use std::io;

use anyhow::Result;
use clap::Parser;

mod cli;
mod credentials;
mod prompt;
mod updater;

use cli::Args;
use credentials::{RoleSettings, StsIdentityService};
use updater::{AwsMfaUpdater, UpdaterConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // INFO unless RUST_LOG says otherwise
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Args {
        role_arn,
        source_profile,
        profile,
        credentials_path,
        duration,
        region,
    } = Args::parse();

    let config = credentials_path
        .map(UpdaterConfig::with_target)
        .unwrap_or_default();
    let role = RoleSettings {
        role_arn,
        source_profile,
    };

    let token = prompt::read_token(prompt::PROMPT, &mut io::stdin().lock(), &mut io::stdout())?;

    let service = StsIdentityService::from_profile(&profile, region, duration).await;
    AwsMfaUpdater::new(service, role, config)
        .update_credentials(&token)
        .await?;

    println!("Credentials have been updated!");
    Ok(())
}
