//! Registration repository for `PostgreSQL`.
//!
//! Also hosts the change-detection query, which joins registrations to passes
//! on `(pass_type_identifier, serial_number)`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use wallet_core::{PassKey, PushToken, UnixTime};

use super::{RegistrationStore, RepositoryError};
use crate::models::{ChangedSerials, Registration, UpsertedRegistration};

const REGISTRATION_COLUMNS: &str = r"
    id, device_library_identifier, pass_type_identifier, serial_number,
    push_token, registered_at, updated_at, last_notified_at
";

/// Repository for device registration operations.
#[derive(Clone)]
pub struct RegistrationRepository {
    pool: PgPool,
}

impl RegistrationRepository {
    /// Create a new registration repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RegistrationStore for RegistrationRepository {
    /// Single-statement upsert. `xmax = 0` holds only for a freshly inserted
    /// row, which tells a new registration apart from a refresh.
    #[instrument(skip(self, push_token), fields(device = %device_id, pass = %key))]
    async fn upsert(
        &self,
        device_id: &str,
        key: &PassKey,
        push_token: &str,
    ) -> Result<UpsertedRegistration, RepositoryError> {
        let push_token = PushToken::parse(push_token)?;

        let row = sqlx::query_as::<_, UpsertedRegistration>(&format!(
            r"
            INSERT INTO wallet.registrations
                (device_library_identifier, pass_type_identifier, serial_number, push_token)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (device_library_identifier, pass_type_identifier, serial_number)
            DO UPDATE SET push_token = EXCLUDED.push_token, updated_at = NOW()
            RETURNING {REGISTRATION_COLUMNS}, (xmax = 0) AS created
            "
        ))
        .bind(device_id)
        .bind(&key.pass_type_identifier)
        .bind(&key.serial_number)
        .bind(&push_token)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    #[instrument(skip(self), fields(device = %device_id, pass = %key))]
    async fn remove(&self, device_id: &str, key: &PassKey) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            DELETE FROM wallet.registrations
            WHERE device_library_identifier = $1
              AND pass_type_identifier = $2
              AND serial_number = $3
            ",
        )
        .bind(device_id)
        .bind(&key.pass_type_identifier)
        .bind(&key.serial_number)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self), fields(pass = %key))]
    async fn list_by_pass(&self, key: &PassKey) -> Result<Vec<Registration>, RepositoryError> {
        let rows = sqlx::query_as::<_, Registration>(&format!(
            r"
            SELECT {REGISTRATION_COLUMNS}
            FROM wallet.registrations
            WHERE pass_type_identifier = $1 AND serial_number = $2
            ORDER BY id
            "
        ))
        .bind(&key.pass_type_identifier)
        .bind(&key.serial_number)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    #[instrument(skip(self), fields(device = %device_id, pass_type = %pass_type_identifier))]
    async fn list_changed_serials(
        &self,
        device_id: &str,
        pass_type_identifier: &str,
        since: UnixTime,
    ) -> Result<ChangedSerials, RepositoryError> {
        // Read the clock before the join: every pass committed after this read
        // carries a larger version, so the tag built from it cannot skip one.
        let (clock,): (UnixTime,) =
            sqlx::query_as("SELECT last_version FROM wallet.version_clock")
                .fetch_one(&self.pool)
                .await?;

        let rows: Vec<(String, UnixTime)> = sqlx::query_as(
            r"
            SELECT r.serial_number, p.version_updated_at
            FROM wallet.registrations r
            JOIN wallet.passes p
              ON p.pass_type_identifier = r.pass_type_identifier
             AND p.serial_number = r.serial_number
            WHERE r.device_library_identifier = $1
              AND r.pass_type_identifier = $2
              AND p.version_updated_at > $3
            ",
        )
        .bind(device_id)
        .bind(pass_type_identifier)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(ChangedSerials::from_changed(rows, clock.max(since)))
    }

    async fn mark_notified(
        &self,
        device_id: &str,
        key: &PassKey,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            UPDATE wallet.registrations
            SET last_notified_at = $4
            WHERE device_library_identifier = $1
              AND pass_type_identifier = $2
              AND serial_number = $3
            ",
        )
        .bind(device_id)
        .bind(&key.pass_type_identifier)
        .bind(&key.serial_number)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
