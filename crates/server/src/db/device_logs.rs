//! Device log repository for `PostgreSQL`.

use async_trait::async_trait;
use sqlx::PgPool;

use super::{LogSink, RepositoryError};
use crate::models::{DeviceLog, NewDeviceLog};

/// Repository for the append-only device log table.
#[derive(Clone)]
pub struct DeviceLogRepository {
    pool: PgPool,
}

impl DeviceLogRepository {
    /// Create a new device log repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LogSink for DeviceLogRepository {
    async fn append(&self, entry: NewDeviceLog) -> Result<DeviceLog, RepositoryError> {
        let row = sqlx::query_as::<_, DeviceLog>(
            r"
            INSERT INTO wallet.device_logs
                (device_library_identifier, level, message,
                 pass_type_identifier, serial_number, context)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, device_library_identifier, level, message,
                      pass_type_identifier, serial_number, context, created_at
            ",
        )
        .bind(&entry.device_library_identifier)
        .bind(entry.level)
        .bind(&entry.message)
        .bind(&entry.pass_type_identifier)
        .bind(&entry.serial_number)
        .bind(&entry.context)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<DeviceLog>, RepositoryError> {
        let rows = sqlx::query_as::<_, DeviceLog>(
            r"
            SELECT id, device_library_identifier, level, message,
                   pass_type_identifier, serial_number, context, created_at
            FROM wallet.device_logs
            ORDER BY id DESC
            LIMIT $1
            ",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
