//! `PostgreSQL` identity store.

use async_trait::async_trait;
use sqlx::{postgres::PgRow, FromRow, PgPool, Row};
use tracing::{info_span, Instrument};

use super::identity::{Identity, IdentityError, IdentityId, IdentityPage, IdentityStore};

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/db/sql/01_users.sql"));

impl<'r> FromRow<'r, PgRow> for Identity {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: IdentityId::Numeric(row.try_get("id")?),
            phone_number: row.try_get("phone_number")?,
            registered_at: row.try_get("registered_at")?,
        })
    }
}

#[derive(Clone, Debug)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `users` table and its index if missing.
    ///
    /// # Errors
    /// Returns an error if the DDL fails.
    pub async fn ensure_schema(&self) -> Result<(), IdentityError> {
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "DDL");
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(())
    }
}

/// Escape LIKE metacharacters so the filter matches literally.
fn like_pattern(filter: &str) -> String {
    let escaped = filter
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn find_by_phone(&self, phone_number: &str) -> Result<Option<Identity>, IdentityError> {
        let query = "SELECT id, phone_number, registered_at FROM users WHERE phone_number = $1";
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
        let identity = sqlx::query_as::<_, Identity>(query)
            .bind(phone_number)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;
        Ok(identity)
    }

    async fn create(&self, phone_number: &str) -> Result<Identity, IdentityError> {
        // A concurrent first login for the same number lands on the existing row.
        let query = r"
            INSERT INTO users (phone_number)
            VALUES ($1)
            ON CONFLICT (phone_number) DO UPDATE SET updated_at = NOW()
            RETURNING id, phone_number, registered_at
        ";
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "INSERT");
        let identity = sqlx::query_as::<_, Identity>(query)
            .bind(phone_number)
            .fetch_one(&self.pool)
            .instrument(span)
            .await?;
        Ok(identity)
    }

    async fn find_by_id(&self, id: &IdentityId) -> Result<Option<Identity>, IdentityError> {
        let IdentityId::Numeric(id) = id else {
            return Ok(None);
        };
        let query = "SELECT id, phone_number, registered_at FROM users WHERE id = $1";
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
        let identity = sqlx::query_as::<_, Identity>(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;
        Ok(identity)
    }

    async fn list(
        &self,
        page: u32,
        page_size: u32,
        phone_filter: Option<&str>,
    ) -> Result<IdentityPage, IdentityError> {
        let pattern = phone_filter.map(like_pattern);
        let limit = i64::from(page_size);
        let offset = i64::from(page.saturating_sub(1)) * limit;

        let count_span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
        let total: i64 = sqlx::query(
            "SELECT COUNT(*) FROM users WHERE ($1::text IS NULL OR phone_number LIKE $1)",
        )
        .bind(pattern.as_deref())
        .fetch_one(&self.pool)
        .instrument(count_span)
        .await?
        .try_get(0)?;

        let query = r"
            SELECT id, phone_number, registered_at
            FROM users
            WHERE ($1::text IS NULL OR phone_number LIKE $1)
            ORDER BY registered_at DESC, id DESC
            LIMIT $2 OFFSET $3
        ";
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
        let identities = sqlx::query_as::<_, Identity>(query)
            .bind(pattern.as_deref())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .instrument(span)
            .await?;

        Ok(IdentityPage {
            identities,
            total: u64::try_from(total).unwrap_or(0),
        })
    }

    async fn ping(&self) -> Result<(), IdentityError> {
        let span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(())
    }
}
