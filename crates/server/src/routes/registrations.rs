//! Device registration endpoints.
//!
//! ```text
//! POST   /v1/devices/{deviceId}/registrations/{passType}/{serial}
//! DELETE /v1/devices/{deviceId}/registrations/{passType}/{serial}
//! GET    /v1/devices/{deviceId}/registrations/{passType}?lastUpdated={ts}
//! ```

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use wallet_core::{LogLevel, PassKey, UnixTime};

use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::ApplePassAuth;
use crate::models::NewDeviceLog;
use crate::state::AppState;

/// Body of a registration request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub push_token: String,
}

/// Query parameters for listing updated passes.
///
/// `passesUpdatedSince` is accepted as an alias of `lastUpdated`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUpdatedParams {
    pub last_updated: Option<String>,
    pub passes_updated_since: Option<String>,
}

impl ListUpdatedParams {
    /// The update tag to compare against. Missing or unparseable means 0.
    #[must_use]
    pub fn since(&self) -> UnixTime {
        self.last_updated
            .as_deref()
            .or(self.passes_updated_since.as_deref())
            .and_then(UnixTime::parse_tag)
            .unwrap_or(UnixTime::ZERO)
    }
}

/// Response for listing updated passes.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SerialNumbersResponse {
    /// UNIX seconds, as a string.
    pub last_updated: String,
    pub serial_numbers: Vec<String>,
}

/// Register a device for push updates of a pass.
///
/// Registering again refreshes the push token. Always answers 201 on success.
#[instrument(skip_all, fields(device = %device_id))]
pub async fn register(
    _auth: ApplePassAuth,
    State(state): State<AppState>,
    Path((device_id, pass_type_identifier, serial_number)): Path<(String, String, String)>,
    body: std::result::Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<StatusCode> {
    let Json(body) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let key = PassKey::new(pass_type_identifier, serial_number);
    if key.is_blank() || device_id.trim().is_empty() {
        return Err(AppError::BadRequest("identifiers must not be blank".into()));
    }

    let upserted = state
        .registrations()
        .upsert(&device_id, &key, &body.push_token)
        .await?;

    let message = if upserted.created {
        "Device registered"
    } else {
        "Device registration refreshed"
    };
    info!(pass = %key, created = upserted.created, "{message}");
    add_breadcrumb("registration", message, &[("pass", &key.to_string())]);

    let entry = NewDeviceLog {
        device_library_identifier: Some(device_id),
        level: LogLevel::Info,
        message: message.to_string(),
        pass_type_identifier: Some(key.pass_type_identifier),
        serial_number: Some(key.serial_number),
        context: None,
    };
    if let Err(e) = state.device_logs().append(entry).await {
        warn!(error = %e, "Failed to record registration log entry");
    }

    Ok(StatusCode::CREATED)
}

/// Remove a registration. Unknown registrations are not an error.
#[instrument(skip_all, fields(device = %device_id))]
pub async fn unregister(
    _auth: ApplePassAuth,
    State(state): State<AppState>,
    Path((device_id, pass_type_identifier, serial_number)): Path<(String, String, String)>,
) -> Result<StatusCode> {
    let key = PassKey::new(pass_type_identifier, serial_number);
    state.registrations().remove(&device_id, &key).await?;
    info!(pass = %key, "Device unregistered");
    Ok(StatusCode::OK)
}

/// List serial numbers that changed since the device's last update tag.
#[instrument(skip_all, fields(device = %device_id, pass_type = %pass_type_identifier))]
pub async fn list_updated(
    _auth: ApplePassAuth,
    State(state): State<AppState>,
    Path((device_id, pass_type_identifier)): Path<(String, String)>,
    Query(params): Query<ListUpdatedParams>,
) -> Result<Json<SerialNumbersResponse>> {
    let changed = state
        .registrations()
        .list_changed_serials(&device_id, &pass_type_identifier, params.since())
        .await?;

    Ok(Json(SerialNumbersResponse {
        last_updated: changed.last_updated.to_string(),
        serial_numbers: changed.serial_numbers.into_iter().collect(),
    }))
}
