//! Session credentials and the STS exchange that produces them.

use std::fmt;

use anyhow::{Context, Result};
use aws_config::{
    SdkConfig, meta::region::RegionProviderChain, profile::ProfileFileCredentialsProvider,
};
use aws_sdk_sts::{Client, config::Region};
use aws_smithy_types::date_time::Format;
use log::{debug, info};

/// Region used when neither the flag nor the profile names one. STS is global.
const FALLBACK_REGION: &str = "us-east-1";

/// Temporary credentials as returned by the identity service.
#[derive(Clone)]
pub struct SessionToken {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: Option<String>,
}

/// Optional role settings given on the command line.
#[derive(Clone, Debug)]
pub struct RoleSettings {
    pub role_arn: Option<String>,
    pub source_profile: String,
}

impl Default for RoleSettings {
    fn default() -> Self {
        Self {
            role_arn: None,
            source_profile: "default".to_string(),
        }
    }
}

/// Credentials written to the `[default]` profile.
#[derive(Clone)]
pub struct SessionCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    assume_role_arn: Option<String>,
    source_profile: String,
    expiration: Option<String>,
}

impl SessionCredentials {
    pub fn new(token: SessionToken, role: RoleSettings) -> Self {
        Self {
            access_key_id: token.access_key_id,
            secret_access_key: token.secret_access_key,
            session_token: token.session_token,
            assume_role_arn: role.role_arn.filter(|arn| !arn.is_empty()),
            source_profile: role.source_profile,
            expiration: token.expiration,
        }
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    pub fn session_token(&self) -> &str {
        &self.session_token
    }

    /// Role to assume, `None` when no role (or an empty one) was given.
    pub fn assume_role_arn(&self) -> Option<&str> {
        self.assume_role_arn.as_deref()
    }

    pub fn source_profile(&self) -> &str {
        &self.source_profile
    }

    pub fn expiration(&self) -> Option<&str> {
        self.expiration.as_deref()
    }
}

impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &"** redacted **")
            .field("assume_role_arn", &self.assume_role_arn)
            .field("source_profile", &self.source_profile)
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// The identity service the MFA exchange talks to.
pub trait IdentityService {
    /// ARN of the caller owning the long-lived credentials.
    async fn caller_arn(&self) -> Result<String>;

    /// Exchanges an MFA code for temporary credentials.
    async fn session_token(&self, token_code: &str, serial_number: &str) -> Result<SessionToken>;
}

/// [`IdentityService`] backed by AWS STS.
pub struct StsIdentityService {
    client: Client,
    duration: Option<u32>,
}

impl StsIdentityService {
    /// Builds an STS client from the long-lived credentials of `profile`.
    pub async fn from_profile(profile: &str, region: Option<String>, duration: Option<u32>) -> Self {
        let config = load_config(profile, region).await;
        debug!("Using long-lived credentials from profile {profile}");

        Self {
            client: Client::new(&config),
            duration,
        }
    }
}

/// SDK config signing with the keys of `profile` only.
///
/// The default chain would prefer `AWS_ACCESS_KEY_ID` and friends, or fall
/// through to container and instance metadata, so the profile provider is
/// set explicitly. A profile without keys fails the first STS call.
async fn load_config(profile: &str, region: Option<String>) -> SdkConfig {
    let region = RegionProviderChain::first_try(region.map(Region::new))
        .or_default_provider()
        .or_else(Region::new(FALLBACK_REGION));
    let credentials = ProfileFileCredentialsProvider::builder()
        .profile_name(profile)
        .build();

    aws_config::from_env()
        .profile_name(profile)
        .credentials_provider(credentials)
        .region(region)
        .load()
        .await
}

impl IdentityService for StsIdentityService {
    async fn caller_arn(&self) -> Result<String> {
        self.client
            .get_caller_identity()
            .send()
            .await?
            .arn()
            .map(str::to_string)
            .context("No ARN returned")
    }

    async fn session_token(&self, token_code: &str, serial_number: &str) -> Result<SessionToken> {
        let credentials = self
            .client
            .get_session_token()
            .set_duration_seconds(self.duration.map(|d| d as i32))
            .serial_number(serial_number)
            .token_code(token_code)
            .send()
            .await?
            .credentials()
            .cloned()
            .context("No credentials returned")?;

        Ok(SessionToken {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().to_string(),
            expiration: Some(credentials.expiration().fmt(Format::DateTime)?),
        })
    }
}

/// Derives the virtual MFA device ARN from an IAM user ARN.
///
/// Only the first `:user/` is replaced, so `arn:aws:iam::123:user/alice`
/// becomes `arn:aws:iam::123:mfa/alice`.
pub fn mfa_device_arn(identity_arn: &str) -> String {
    identity_arn.replacen(":user/", ":mfa/", 1)
}

/// Resolves the caller, then trades `token_code` for session credentials.
pub async fn exchange_session(
    service: &impl IdentityService,
    token_code: &str,
    role: RoleSettings,
) -> Result<SessionCredentials> {
    let arn = service
        .caller_arn()
        .await
        .context("Failed to resolve caller identity")?;
    let device = mfa_device_arn(&arn);
    info!("Requesting session token for MFA device {device}");

    let token = service
        .session_token(token_code, &device)
        .await
        .context("Error while creating session")?;

    Ok(SessionCredentials::new(token, role))
}
