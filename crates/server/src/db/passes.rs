//! Pass repository for `PostgreSQL`.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::instrument;

use wallet_core::{PassKey, UnixTime, merge_json};

use super::{PassStore, RepositoryError};
use crate::models::{NewPass, Pass};

const PASS_COLUMNS: &str = r"
    id, pass_type_identifier, serial_number, template_type, data,
    version_updated_at, created_at, updated_at
";

/// Repository for pass database operations.
#[derive(Clone)]
pub struct PassRepository {
    pool: PgPool,
}

impl PassRepository {
    /// Create a new pass repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Issue the next pass version from the shared clock.
///
/// The clock row stays locked until `tx` ends, which serializes pass writers
/// so versions become visible in the order they were issued. Take it before
/// any pass row lock to keep a single lock order.
async fn issue_version(
    tx: &mut Transaction<'_, Postgres>,
) -> Result<UnixTime, RepositoryError> {
    let (last,): (i64,) = sqlx::query_as(
        r"
        UPDATE wallet.version_clock
        SET last_version = GREATEST($1, last_version + 1)
        RETURNING last_version
        ",
    )
    .bind(UnixTime::now())
    .fetch_one(&mut **tx)
    .await?;

    Ok(UnixTime::from_secs(last))
}

#[async_trait]
impl PassStore for PassRepository {
    /// Upsert on `(pass_type_identifier, serial_number)`.
    #[instrument(skip(self, new), fields(pass = %new.key))]
    async fn create_or_replace(&self, new: NewPass) -> Result<Pass, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let version = issue_version(&mut tx).await?;

        let pass = sqlx::query_as::<_, Pass>(&format!(
            r"
            INSERT INTO wallet.passes
                (pass_type_identifier, serial_number, template_type, data, version_updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (pass_type_identifier, serial_number) DO UPDATE
            SET template_type = EXCLUDED.template_type,
                data = EXCLUDED.data,
                version_updated_at = EXCLUDED.version_updated_at,
                updated_at = NOW()
            RETURNING {PASS_COLUMNS}
            "
        ))
        .bind(&new.key.pass_type_identifier)
        .bind(&new.key.serial_number)
        .bind(&new.template_type)
        .bind(&new.data)
        .bind(version)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(pass)
    }

    /// Merge under a row lock so two partial updates cannot lose each other.
    #[instrument(skip(self, partial), fields(pass = %key))]
    async fn merge_update(&self, key: &PassKey, partial: Value) -> Result<Pass, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let version = issue_version(&mut tx).await?;

        let current = sqlx::query_as::<_, Pass>(&format!(
            r"
            SELECT {PASS_COLUMNS}
            FROM wallet.passes
            WHERE pass_type_identifier = $1 AND serial_number = $2
            FOR UPDATE
            "
        ))
        .bind(&key.pass_type_identifier)
        .bind(&key.serial_number)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        let mut data = current.data;
        merge_json(&mut data, partial);

        let pass = sqlx::query_as::<_, Pass>(&format!(
            r"
            UPDATE wallet.passes
            SET data = $2, version_updated_at = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {PASS_COLUMNS}
            "
        ))
        .bind(current.id)
        .bind(&data)
        .bind(version)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(pass)
    }

    #[instrument(skip(self), fields(pass = %key))]
    async fn get(&self, key: &PassKey) -> Result<Pass, RepositoryError> {
        sqlx::query_as::<_, Pass>(&format!(
            r"
            SELECT {PASS_COLUMNS}
            FROM wallet.passes
            WHERE pass_type_identifier = $1 AND serial_number = $2
            "
        ))
        .bind(&key.pass_type_identifier)
        .bind(&key.serial_number)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    async fn health_check(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
