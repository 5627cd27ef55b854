//! One-time passcode lifecycle: phone validation, code generation, challenge
//! storage, issuance rate limiting and verification.

pub mod cache;
pub mod code;
pub mod error;
mod lock;
pub mod models;
pub mod notify;
pub mod phone;
pub mod rate_limit;
pub mod redis_cache;
pub mod service;
pub mod store;

pub use cache::{KeyValueCache, MemoryCache};
pub use error::{CacheError, OtpError};
pub use models::{IssuedOtp, OtpChallenge, OtpConfig};
pub use notify::{LogSink, NotificationSink, RecordingSink};
pub use phone::PhoneNumber;
pub use redis_cache::RedisCache;
pub use service::OtpService;
