use crate::{
    api,
    otp::{
        redis_cache::DEFAULT_KEY_PREFIX, KeyValueCache, LogSink, MemoryCache, OtpConfig,
        OtpService, RedisCache,
    },
    session::{IdentityStore, JwtIssuer, MemoryIdentityStore, PgIdentityStore, SessionIssuer},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub redis_url: Option<String>,
    pub jwt_secret: SecretString,
    pub jwt_expiry_seconds: u64,
    pub jwt_issuer: String,
    pub otp_length: usize,
    pub otp_expiry_seconds: u64,
    pub otp_max_attempts: u32,
    pub otp_rate_limit_window_seconds: u64,
    pub otp_max_requests_per_window: u32,
    pub store_timeout_seconds: u64,
    pub cache_janitor_seconds: u64,
}

impl Args {
    fn otp_config(&self) -> OtpConfig {
        OtpConfig::new()
            .with_otp_length(self.otp_length)
            .with_otp_expiry(Duration::from_secs(self.otp_expiry_seconds))
            .with_max_attempts(self.otp_max_attempts)
            .with_rate_limit_window(Duration::from_secs(self.otp_rate_limit_window_seconds))
            .with_max_requests_per_window(self.otp_max_requests_per_window)
            .with_store_timeout(Duration::from_secs(self.store_timeout_seconds))
    }
}

async fn identity_store(dsn: Option<&str>) -> Result<Arc<dyn IdentityStore>> {
    let Some(dsn) = dsn else {
        warn!("No --dsn given; users are kept in memory");
        return Ok(Arc::new(MemoryIdentityStore::new()));
    };

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .acquire_timeout(Duration::from_secs(5))
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")?;

    let store = PgIdentityStore::new(pool);
    store
        .ensure_schema()
        .await
        .context("Failed to prepare users table")?;
    Ok(Arc::new(store))
}

/// Shared Redis cache when a URL is given, otherwise an in-process cache plus
/// the janitor task sweeping it.
async fn otp_cache(
    redis_url: Option<&str>,
    janitor_every: Duration,
) -> Result<(Arc<dyn KeyValueCache>, Option<JoinHandle<()>>)> {
    if let Some(url) = redis_url {
        let cache = RedisCache::connect(url, DEFAULT_KEY_PREFIX)
            .await
            .context("Failed to connect to Redis")?;
        info!("Passcodes and rate limits are stored in Redis");
        let shared: Arc<dyn KeyValueCache> = Arc::new(cache);
        return Ok((shared, None));
    }

    warn!("No --redis-url given; passcodes and rate limits are local to this instance");
    let cache = Arc::new(MemoryCache::new());
    let janitor = MemoryCache::spawn_janitor(&cache, janitor_every);
    let local: Arc<dyn KeyValueCache> = cache;
    Ok((local, Some(janitor)))
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database or Redis is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let config = args.otp_config();

    let (cache, janitor) = otp_cache(
        args.redis_url.as_deref(),
        Duration::from_secs(args.cache_janitor_seconds),
    )
    .await?;

    let identities = identity_store(args.dsn.as_deref()).await?;

    let tokens = Arc::new(JwtIssuer::new(&args.jwt_secret, args.jwt_issuer.clone()));
    let sessions = SessionIssuer::new(tokens.clone(), Duration::from_secs(args.jwt_expiry_seconds));

    let otp = Arc::new(OtpService::new(
        config,
        cache,
        identities,
        sessions,
        Arc::new(LogSink),
    ));

    info!(
        otp_length = args.otp_length,
        otp_expiry_seconds = args.otp_expiry_seconds,
        otp_max_attempts = args.otp_max_attempts,
        "OTP service configured"
    );

    let result = api::new(args.port, otp, tokens).await;
    if let Some(janitor) = janitor {
        janitor.abort();
    }
    result
}
