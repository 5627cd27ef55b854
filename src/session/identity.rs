//! Identity records keyed by phone number.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt};
use tokio::sync::RwLock;

/// Opaque identifier handed out by an identity store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdentityId {
    Numeric(i64),
    Text(String),
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(id) => write!(f, "{id}"),
            Self::Text(id) => f.write_str(id),
        }
    }
}

impl IdentityId {
    /// Parse a path or claim value; all-digit values become numeric ids.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        raw.parse::<i64>()
            .map_or_else(|_| Self::Text(raw.to_string()), Self::Numeric)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub phone_number: String,
    pub registered_at: DateTime<Utc>,
}

/// One page of identities plus the total matching the filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityPage {
    pub identities: Vec<Identity>,
    pub total: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("identity backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_phone(&self, phone_number: &str) -> Result<Option<Identity>, IdentityError>;

    /// Create the identity for `phone_number`. If one already exists (for example
    /// created concurrently), that one is returned.
    async fn create(&self, phone_number: &str) -> Result<Identity, IdentityError>;

    async fn find_by_id(&self, id: &IdentityId) -> Result<Option<Identity>, IdentityError>;

    /// Newest first. `page` starts at 1.
    async fn list(
        &self,
        page: u32,
        page_size: u32,
        phone_filter: Option<&str>,
    ) -> Result<IdentityPage, IdentityError>;

    async fn ping(&self) -> Result<(), IdentityError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    by_phone: HashMap<String, Identity>,
}

/// Process-local identity store, used when no database is configured.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    state: RwLock<MemoryState>,
}

impl MemoryIdentityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_by_phone(&self, phone_number: &str) -> Result<Option<Identity>, IdentityError> {
        Ok(self.state.read().await.by_phone.get(phone_number).cloned())
    }

    async fn create(&self, phone_number: &str) -> Result<Identity, IdentityError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.by_phone.get(phone_number) {
            return Ok(existing.clone());
        }
        state.next_id += 1;
        let identity = Identity {
            id: IdentityId::Numeric(state.next_id),
            phone_number: phone_number.to_string(),
            registered_at: Utc::now(),
        };
        state
            .by_phone
            .insert(phone_number.to_string(), identity.clone());
        Ok(identity)
    }

    async fn find_by_id(&self, id: &IdentityId) -> Result<Option<Identity>, IdentityError> {
        Ok(self
            .state
            .read()
            .await
            .by_phone
            .values()
            .find(|identity| &identity.id == id)
            .cloned())
    }

    async fn list(
        &self,
        page: u32,
        page_size: u32,
        phone_filter: Option<&str>,
    ) -> Result<IdentityPage, IdentityError> {
        let state = self.state.read().await;
        let mut matching: Vec<&Identity> = state
            .by_phone
            .values()
            .filter(|identity| phone_filter.map_or(true, |f| identity.phone_number.contains(f)))
            .collect();
        matching.sort_by(|a, b| {
            b.registered_at
                .cmp(&a.registered_at)
                .then_with(|| b.id.to_string().cmp(&a.id.to_string()))
        });

        let offset = usize::try_from(page.saturating_sub(1))
            .unwrap_or(usize::MAX)
            .saturating_mul(usize::try_from(page_size).unwrap_or(usize::MAX));
        let identities = matching
            .iter()
            .skip(offset)
            .take(usize::try_from(page_size).unwrap_or(usize::MAX))
            .map(|identity| (*identity).clone())
            .collect();

        Ok(IdentityPage {
            identities,
            total: u64::try_from(matching.len()).unwrap_or(u64::MAX),
        })
    }

    async fn ping(&self) -> Result<(), IdentityError> {
        Ok(())
    }
}
