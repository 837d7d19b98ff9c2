//! Command-line interface definitions.

use std::path::PathBuf;

use clap::Parser;

/// AWS MFA session refresher.
///
/// Asks for an MFA code, exchanges it for temporary credentials using the
/// long-lived keys of `--profile`, and rewrites the `[default]` profile of
/// the shared credentials file with them. Other profiles are kept.
#[derive(Parser)]
#[command(author, version, about)]
pub struct Args {
    /// Role to assume with the session credentials (written as `role_arn`)
    pub role_arn: Option<String>,

    /// Profile used as `source_profile` when a role is given
    #[arg(default_value = "default")]
    pub source_profile: String,

    /// Profile holding the long-lived credentials
    #[arg(short, long, env = "AWS_MFA_PROFILE", default_value = "getToken")]
    pub profile: String,

    /// Path to AWS credentials file [default: ~/.aws/credentials]
    #[arg(short, long, env = "AWS_SHARED_CREDENTIALS_FILE")]
    pub credentials_path: Option<PathBuf>,

    /// Session duration in seconds (900-129600)
    #[arg(
        short,
        long,
        env = "AWS_SESSION_DURATION",
        value_parser = clap::value_parser!(u32).range(900..=129600)
    )]
    pub duration: Option<u32>,

    /// Region of the STS endpoint
    #[arg(short, long, env = "AWS_REGION")]
    pub region: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_arguments_are_optional() {
        let args = Args::try_parse_from(["aws-mfa-session"]).unwrap();
        assert_eq!(args.role_arn, None);
        assert_eq!(args.source_profile, "default");
    }

    #[test]
    fn flags_override_environment() {
        let args = Args::try_parse_from(["aws-mfa-session", "--profile", "longterm"]).unwrap();
        assert_eq!(args.profile, "longterm");
    }

    #[test]
    fn role_and_source_profile_are_positional() {
        let args = Args::try_parse_from([
            "aws-mfa-session",
            "arn:aws:iam::123:role/admin",
            "work",
        ])
        .unwrap();
        assert_eq!(args.role_arn.as_deref(), Some("arn:aws:iam::123:role/admin"));
        assert_eq!(args.source_profile, "work");
    }

    #[test]
    fn duration_outside_sts_limits_is_rejected() {
        assert!(Args::try_parse_from(["aws-mfa-session", "--duration", "60"]).is_err());
        let args = Args::try_parse_from(["aws-mfa-session", "-d", "3600"]).unwrap();
        assert_eq!(args.duration, Some(3600));
    }
}
