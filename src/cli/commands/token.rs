use anyhow::Result;
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_JWT_EXPIRY_SECONDS: &str = "jwt-expiry-seconds";
pub const ARG_JWT_ISSUER: &str = "jwt-issuer";

#[derive(Debug, Clone)]
pub struct Options {
    pub secret: SecretString,
    pub expiry_seconds: u64,
    pub issuer: String,
}

impl Options {
    /// Parse session token arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the signing secret is missing or empty.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let secret = match matches.get_one::<String>(ARG_JWT_SECRET) {
            Some(value) if !value.trim().is_empty() => SecretString::from(value.clone()),
            _ => anyhow::bail!("missing required argument: --{ARG_JWT_SECRET}"),
        };

        let expiry_seconds = matches
            .get_one::<u64>(ARG_JWT_EXPIRY_SECONDS)
            .copied()
            .unwrap_or(86_400);

        let issuer = matches
            .get_one::<String>(ARG_JWT_ISSUER)
            .cloned()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());

        Ok(Self {
            secret,
            expiry_seconds,
            issuer,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("HMAC secret used to sign session tokens")
                .env("OTP_AUTH_JWT_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_JWT_EXPIRY_SECONDS)
                .long(ARG_JWT_EXPIRY_SECONDS)
                .help("Session token lifetime in seconds")
                .env("OTP_AUTH_JWT_EXPIRY_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_JWT_ISSUER)
                .long(ARG_JWT_ISSUER)
                .help("Issuer (`iss`) claim of session tokens")
                .env("OTP_AUTH_JWT_ISSUER")
                .default_value(env!("CARGO_PKG_NAME")),
        )
}
