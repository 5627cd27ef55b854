//! Map parsed command-line arguments to the action to run.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{otp, token};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or out of range.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .filter(|v| !v.trim().is_empty());
    let redis_url = matches
        .get_one::<String>("redis-url")
        .cloned()
        .filter(|v| !v.trim().is_empty());

    let otp_opts = otp::Options::parse(matches)?;
    let token_opts = token::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        redis_url,
        jwt_secret: token_opts.secret,
        jwt_expiry_seconds: token_opts.expiry_seconds,
        jwt_issuer: token_opts.issuer,
        otp_length: otp_opts.length,
        otp_expiry_seconds: otp_opts.expiry_seconds,
        otp_max_attempts: otp_opts.max_attempts,
        otp_rate_limit_window_seconds: otp_opts.rate_limit_window_seconds,
        otp_max_requests_per_window: otp_opts.max_requests_per_window,
        store_timeout_seconds: otp_opts.store_timeout_seconds,
        cache_janitor_seconds: otp_opts.cache_janitor_seconds,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::{new, tests::with_env};
    use secrecy::ExposeSecret;

    #[test]
    fn jwt_secret_required() {
        with_env(&[], || {
            let matches = new().get_matches_from(vec!["otp-auth"]);
            let result = handler(&matches);
            assert!(result.is_err());
            if let Err(err) = result {
                assert!(err
                    .to_string()
                    .contains("missing required argument: --jwt-secret"));
            }
        });
    }

    #[test]
    fn blank_jwt_secret_rejected() {
        with_env(&[("OTP_AUTH_JWT_SECRET", "   ")], || {
            let matches = new().get_matches_from(vec!["otp-auth"]);
            assert!(handler(&matches).is_err());
        });
    }

    #[test]
    fn zero_length_code_rejected() {
        with_env(&[("OTP_AUTH_JWT_SECRET", "s3cret")], || {
            let matches = new().get_matches_from(vec!["otp-auth", "--otp-length", "0"]);
            assert!(handler(&matches).is_err());
        });
    }

    #[test]
    fn redis_url_selects_shared_cache() {
        with_env(
            &[
                ("OTP_AUTH_JWT_SECRET", "s3cret"),
                ("OTP_AUTH_REDIS_URL", "redis://cache:6379/0"),
            ],
            || {
                let matches = new().get_matches_from(vec!["otp-auth"]);
                let result = handler(&matches);
                assert!(result.is_ok());
                if let Ok(Action::Server(args)) = result {
                    assert_eq!(args.redis_url.as_deref(), Some("redis://cache:6379/0"));
                }
            },
        );
    }

    #[test]
    fn blank_redis_url_means_memory_cache() {
        with_env(
            &[("OTP_AUTH_JWT_SECRET", "s3cret"), ("OTP_AUTH_REDIS_URL", " ")],
            || {
                let matches = new().get_matches_from(vec!["otp-auth"]);
                let result = handler(&matches);
                assert!(result.is_ok());
                if let Ok(Action::Server(args)) = result {
                    assert_eq!(args.redis_url, None);
                }
            },
        );
    }

    #[test]
    fn server_args_from_env() {
        with_env(
            &[
                ("OTP_AUTH_JWT_SECRET", "s3cret"),
                ("OTP_AUTH_PORT", "9090"),
                ("OTP_AUTH_OTP_LENGTH", "8"),
                ("OTP_AUTH_OTP_MAX_REQUESTS_PER_WINDOW", "5"),
                ("OTP_AUTH_JWT_ISSUER", "auth.example.com"),
            ],
            || {
                let matches = new().get_matches_from(vec!["otp-auth"]);
                let result = handler(&matches);
                assert!(result.is_ok());
                if let Ok(Action::Server(args)) = result {
                    assert_eq!(args.port, 9090);
                    assert_eq!(args.dsn, None);
                    assert_eq!(args.redis_url, None);
                    assert_eq!(args.jwt_secret.expose_secret(), "s3cret");
                    assert_eq!(args.jwt_issuer, "auth.example.com");
                    assert_eq!(args.jwt_expiry_seconds, 86_400);
                    assert_eq!(args.otp_length, 8);
                    assert_eq!(args.otp_expiry_seconds, 120);
                    assert_eq!(args.otp_max_attempts, 3);
                    assert_eq!(args.otp_rate_limit_window_seconds, 600);
                    assert_eq!(args.otp_max_requests_per_window, 5);
                    assert_eq!(args.store_timeout_seconds, 3);
                }
            },
        );
    }
}
