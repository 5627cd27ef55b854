use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};

pub const ARG_OTP_LENGTH: &str = "otp-length";
pub const ARG_OTP_EXPIRY_SECONDS: &str = "otp-expiry-seconds";
pub const ARG_OTP_MAX_ATTEMPTS: &str = "otp-max-attempts";
pub const ARG_OTP_RATE_LIMIT_WINDOW_SECONDS: &str = "otp-rate-limit-window-seconds";
pub const ARG_OTP_MAX_REQUESTS_PER_WINDOW: &str = "otp-max-requests-per-window";
pub const ARG_STORE_TIMEOUT_SECONDS: &str = "store-timeout-seconds";
pub const ARG_CACHE_JANITOR_SECONDS: &str = "cache-janitor-seconds";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub length: usize,
    pub expiry_seconds: u64,
    pub max_attempts: u32,
    pub rate_limit_window_seconds: u64,
    pub max_requests_per_window: u32,
    pub store_timeout_seconds: u64,
    pub cache_janitor_seconds: u64,
}

impl Options {
    /// Parse passcode and cache arguments from matches.
    ///
    /// # Errors
    /// Returns an error if an argument is missing or out of range.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let get_u64 = |id: &str| {
            matches
                .get_one::<u64>(id)
                .copied()
                .with_context(|| format!("missing required argument: --{id}"))
        };
        let get_u32 = |id: &str| {
            matches
                .get_one::<u32>(id)
                .copied()
                .with_context(|| format!("missing required argument: --{id}"))
        };

        let length = matches
            .get_one::<usize>(ARG_OTP_LENGTH)
            .copied()
            .with_context(|| format!("missing required argument: --{ARG_OTP_LENGTH}"))?;
        if length == 0 {
            anyhow::bail!("--{ARG_OTP_LENGTH} must be at least 1");
        }

        let store_timeout_seconds = get_u64(ARG_STORE_TIMEOUT_SECONDS)?;
        if store_timeout_seconds == 0 {
            anyhow::bail!("--{ARG_STORE_TIMEOUT_SECONDS} must be at least 1");
        }

        Ok(Self {
            length,
            expiry_seconds: get_u64(ARG_OTP_EXPIRY_SECONDS)?,
            max_attempts: get_u32(ARG_OTP_MAX_ATTEMPTS)?,
            rate_limit_window_seconds: get_u64(ARG_OTP_RATE_LIMIT_WINDOW_SECONDS)?,
            max_requests_per_window: get_u32(ARG_OTP_MAX_REQUESTS_PER_WINDOW)?,
            store_timeout_seconds,
            cache_janitor_seconds: get_u64(ARG_CACHE_JANITOR_SECONDS)?.max(1),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_OTP_LENGTH)
                .long(ARG_OTP_LENGTH)
                .help("Number of digits in a passcode")
                .env("OTP_AUTH_OTP_LENGTH")
                .default_value("6")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_OTP_EXPIRY_SECONDS)
                .long(ARG_OTP_EXPIRY_SECONDS)
                .help("Passcode lifetime in seconds")
                .env("OTP_AUTH_OTP_EXPIRY_SECONDS")
                .default_value("120")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_OTP_MAX_ATTEMPTS)
                .long(ARG_OTP_MAX_ATTEMPTS)
                .help("Wrong submissions allowed before a passcode is discarded")
                .env("OTP_AUTH_OTP_MAX_ATTEMPTS")
                .default_value("3")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_OTP_RATE_LIMIT_WINDOW_SECONDS)
                .long(ARG_OTP_RATE_LIMIT_WINDOW_SECONDS)
                .help("Issuance rate-limit window in seconds")
                .env("OTP_AUTH_OTP_RATE_LIMIT_WINDOW_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_OTP_MAX_REQUESTS_PER_WINDOW)
                .long(ARG_OTP_MAX_REQUESTS_PER_WINDOW)
                .help("Passcodes issued per phone number within one window")
                .env("OTP_AUTH_OTP_MAX_REQUESTS_PER_WINDOW")
                .default_value("3")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_STORE_TIMEOUT_SECONDS)
                .long(ARG_STORE_TIMEOUT_SECONDS)
                .help("Deadline for a single cache operation in seconds")
                .env("OTP_AUTH_STORE_TIMEOUT_SECONDS")
                .default_value("3")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_CACHE_JANITOR_SECONDS)
                .long(ARG_CACHE_JANITOR_SECONDS)
                .help("Interval between sweeps of expired cache entries in seconds")
                .env("OTP_AUTH_CACHE_JANITOR_SECONDS")
                .default_value("30")
                .value_parser(clap::value_parser!(u64)),
        )
}
