//! AWS credentials file updater
//!
//! Writes freshly issued session credentials into one profile of the shared
//! credentials file while keeping every other profile as it was.
//!
//! The update never edits the target in place. The whole configuration is
//! rendered into a temporary file next to it, which is then renamed over the
//! target. A failed write therefore leaves the original untouched. A failed
//! rename is not rolled back and leaves the temporary file behind.
//!
//! Running two updates against the same file at once is not supported.
//!
//! ## Resulting profile
//!
//! ```ini
//! # Updated by Boynux authenticator
//! [default]
//! aws_access_key_id=ASIA...
//! aws_session_token=...
//! aws_secret_access_key=...
//! role_arn=arn:aws:iam::123456789012:role/admin    # only with a role
//! source_profile=default                           # only with a role
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use configparser::ini::Ini;
use log::{debug, error, info};
use tokio::fs;

use crate::credentials::{self, IdentityService, RoleSettings, SessionCredentials};

const ACCESS_KEY_ID: &str = "aws_access_key_id";
const SESSION_TOKEN: &str = "aws_session_token";
const SECRET_ACCESS_KEY: &str = "aws_secret_access_key";
const ROLE_ARN: &str = "role_arn";
const SOURCE_PROFILE: &str = "source_profile";

/// Section holding keys found before any `[header]`. configparser names it
/// `default` unless told otherwise, which would swallow the AWS `[default]`
/// profile header on write.
const HEADLESS_SECTION: &str = "";

/// Where and how the credentials file gets written.
#[derive(Clone, Debug)]
pub struct UpdaterConfig {
    /// Profile receiving the session credentials
    pub section: String,
    /// Credentials file to replace, may start with `~/`
    pub target_path: PathBuf,
    /// Scratch file renamed over the target, must share its filesystem
    pub temp_path: PathBuf,
    /// Unix permission bits of the written file
    pub mode: u32,
    /// Comment placed on the first line of the file
    pub header: String,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            section: "default".to_string(),
            target_path: PathBuf::from("~/.aws/credentials"),
            temp_path: PathBuf::from("~/.aws/credentials.tmp"),
            mode: 0o644,
            header: "Updated by Boynux authenticator".to_string(),
        }
    }
}

impl UpdaterConfig {
    /// Config targeting `path`, with the temporary file next to it.
    pub fn with_target(path: PathBuf) -> Self {
        let mut temp = path.clone().into_os_string();
        temp.push(".tmp");
        Self {
            target_path: path,
            temp_path: PathBuf::from(temp),
            ..Self::default()
        }
    }

    /// Writes `credentials` into the configured profile and swaps the file in.
    ///
    /// The current target is loaded (or an empty configuration when it cannot
    /// be), the session keys are set on `self.section`, and the result is
    /// written to `self.temp_path` with `self.header` on the first line and
    /// `self.mode` permissions. The temporary file is then renamed over
    /// `self.target_path`. Both paths may start with `~/`.
    ///
    /// # Arguments
    ///
    /// * `credentials` - Session credentials to store. `role_arn` and
    ///   `source_profile` are only written when a role is set.
    ///
    /// # Returns
    ///
    /// * `Ok(PathBuf)` - The expanded path of the replaced credentials file
    /// * `Err(anyhow::Error)` - The update failed because:
    ///   - a path starts with `~/` and the home directory is unknown
    ///   - the temporary file or its directory could not be written
    ///   - the rename failed, in which case the temporary file is left behind
    ///
    /// # Errors
    ///
    /// A write failure leaves the target untouched. A rename failure is
    /// logged and not rolled back.
    pub async fn write_credentials(&self, credentials: &SessionCredentials) -> Result<PathBuf> {
        let target = expand_path(&self.target_path)?;
        let temp = expand_path(&self.temp_path)?;

        let mut ini = load_existing(&target).await;
        apply_credentials(&mut ini, &self.section, credentials);
        let content = format!("# {}\n{}", self.header, ini.writes());

        if let Err(e) = self.write_temp(&temp, content).await {
            error!("Could not write {}: {e:#}", temp.display());
            return Err(e);
        }

        if let Err(e) = fs::rename(&temp, &target).await {
            error!(
                "Could not replace {} with {}, the temporary file is left behind: {e}",
                target.display(),
                temp.display()
            );
            return Err(e).with_context(|| format!("Failed to replace {}", target.display()));
        }

        Ok(target)
    }

    async fn write_temp(&self, temp: &Path, content: String) -> Result<()> {
        if let Some(parent) = temp.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        fs::write(temp, content)
            .await
            .with_context(|| format!("Failed to write {}", temp.display()))?;

        #[cfg(unix)]
        {
            use std::{fs::Permissions, os::unix::fs::PermissionsExt};

            fs::set_permissions(temp, Permissions::from_mode(self.mode))
                .await
                .with_context(|| format!("Failed to set permissions on {}", temp.display()))?;
        }

        Ok(())
    }
}

/// Replaces a leading `~/` in `path` with `home`.
///
/// Any other path comes back unchanged. Expanding without a known home
/// directory is an error.
pub fn expand_home(path: &Path, home: Option<&Path>) -> Result<PathBuf> {
    let Some(rest) = path.to_str().and_then(|p| p.strip_prefix("~/")) else {
        return Ok(path.to_path_buf());
    };
    home.map(|home| home.join(rest))
        .ok_or_else(|| anyhow!("Could not determine home directory"))
}

/// [`expand_home`] against the current user's home directory.
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    expand_home(path, dirs::home_dir().as_deref())
}

/// Empty parser set up for the shared credentials file syntax.
fn credentials_ini() -> Ini {
    let mut defaults = Ini::new_cs().defaults();
    defaults.default_section = HEADLESS_SECTION.to_string();
    defaults.comment_symbols = vec!['#'];
    // Only whole-line comments; values such as SSO URLs may contain `#`
    defaults.enable_inline_comments = false;
    defaults.delimiters = vec!['='];
    Ini::new_from_defaults(defaults)
}

/// Loads the current credentials file.
///
/// A missing or unparsable file is not an error: the update then starts
/// from an empty configuration and only the target profile gets written.
pub async fn load_existing(path: &Path) -> Ini {
    let mut ini = credentials_ini();
    let loaded = match fs::read_to_string(path).await {
        Ok(content) => ini.read(content),
        Err(e) => Err(e.to_string()),
    };

    match loaded {
        Ok(_) => ini,
        Err(e) => {
            debug!("Starting from an empty configuration, {} not loaded: {e}", path.display());
            credentials_ini()
        }
    }
}

/// Sets the session keys of `section`, creating it when missing.
///
/// `role_arn` and `source_profile` only survive when a role is set, which
/// also clears ones left over from a previous update.
pub fn apply_credentials(ini: &mut Ini, section: &str, credentials: &SessionCredentials) {
    let role_arn = credentials.assume_role_arn().unwrap_or_default();

    ini.set(section, ACCESS_KEY_ID, Some(credentials.access_key_id().to_string()));
    ini.set(section, SESSION_TOKEN, Some(credentials.session_token().to_string()));
    ini.set(section, SECRET_ACCESS_KEY, Some(credentials.secret_access_key().to_string()));
    ini.set(section, ROLE_ARN, Some(role_arn.to_string()));
    ini.set(section, SOURCE_PROFILE, Some(credentials.source_profile().to_string()));

    if role_arn.is_empty() {
        ini.remove_key(section, ROLE_ARN);
        ini.remove_key(section, SOURCE_PROFILE);
    }
}

/// Refreshes the credentials file with an MFA session.
pub struct AwsMfaUpdater<S> {
    service: S,
    role: RoleSettings,
    config: UpdaterConfig,
}

impl<S: IdentityService> AwsMfaUpdater<S> {
    pub fn new(service: S, role: RoleSettings, config: UpdaterConfig) -> Self {
        Self { service, role, config }
    }

    /// Exchanges `token` for session credentials and writes them out.
    ///
    /// # Arguments
    ///
    /// * `token` - The MFA code as typed by the user, passed to the
    ///   identity service without validation
    ///
    /// # Returns
    ///
    /// * `Ok(SessionCredentials)` - The credentials now stored in the file
    /// * `Err(anyhow::Error)` - The update failed due to:
    ///   - the caller identity could not be resolved
    ///   - the MFA code was rejected or the token request failed
    ///   - the credentials file could not be written or replaced
    ///
    /// # Errors
    ///
    /// Identity and token failures happen before any file is touched, so
    /// they never leave a temporary file behind.
    pub async fn update_credentials(&self, token: &str) -> Result<SessionCredentials> {
        let credentials =
            credentials::exchange_session(&self.service, token, self.role.clone()).await?;

        let path = self.config.write_credentials(&credentials).await?;
        match credentials.expiration() {
            Some(expiration) => info!("Updated {}, expires at: {expiration}", path.display()),
            None => info!("Updated {}", path.display()),
        }

        Ok(credentials)
    }
}
