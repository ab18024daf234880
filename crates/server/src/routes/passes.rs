//! Pass delivery and pass administration endpoints.
//!
//! ```text
//! GET  /v1/passes/{passType}/{serial}   - Latest pass file (supports If-Modified-Since)
//! POST /v1/passes                       - Create or replace a pass
//! PUT  /v1/passes/{passType}/{serial}   - Deep-merge new data into a pass
//! ```
//!
//! Both mutations queue a wake-up for every registered device once the write
//! has committed.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CONTENT_TYPE, IF_MODIFIED_SINCE, LAST_MODIFIED},
    },
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};

use wallet_core::{PassKey, UnixTime};

use crate::error::{AppError, Result};
use crate::middleware::ApplePassAuth;
use crate::models::{NewPass, Pass};
use crate::state::AppState;

/// Media type of a signed pass bundle.
pub const PKPASS_CONTENT_TYPE: &str = "application/vnd.apple.pkpass";

/// Body of a create request.
#[derive(Debug, Deserialize)]
pub struct CreatePassRequest {
    #[serde(alias = "passTypeIdentifier")]
    pub pass_type_identifier: String,
    #[serde(alias = "serialNumber")]
    pub serial_number: String,
    #[serde(alias = "templateType")]
    pub template_type: String,
    pub data: Value,
}

/// Body of an update request.
#[derive(Debug, Deserialize)]
pub struct UpdatePassRequest {
    pub data: Value,
}

/// Pass as returned by the administration endpoints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassResponse {
    pub pass_type_identifier: String,
    pub serial_number: String,
    pub template_type: String,
    pub data: Value,
    pub version_updated_at: i64,
}

impl From<Pass> for PassResponse {
    fn from(pass: Pass) -> Self {
        Self {
            pass_type_identifier: pass.pass_type_identifier,
            serial_number: pass.serial_number,
            template_type: pass.template_type,
            data: pass.data,
            version_updated_at: pass.version_updated_at.as_secs(),
        }
    }
}

/// Serve the latest pass file.
///
/// Answers 304 with no body when `If-Modified-Since` is at or after the pass
/// version.
#[instrument(skip_all, fields(pass_type = %pass_type_identifier, serial = %serial_number))]
pub async fn fetch(
    _auth: ApplePassAuth,
    State(state): State<AppState>,
    Path((pass_type_identifier, serial_number)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response> {
    let key = PassKey::new(pass_type_identifier, serial_number);
    let pass = state.passes().get(&key).await?;
    let version = pass.version_updated_at;

    let last_modified = version
        .to_http_date()
        .and_then(|date| HeaderValue::from_str(&date).ok());

    if not_modified_since(&headers, version) {
        debug!(version = %version, "Pass unchanged since client copy");
        let mut response = StatusCode::NOT_MODIFIED.into_response();
        if let Some(value) = last_modified {
            response.headers_mut().insert(LAST_MODIFIED, value);
        }
        return Ok(response);
    }

    let bytes = state.generator().generate(&pass).await?;

    let mut response = (
        StatusCode::OK,
        [(CONTENT_TYPE, HeaderValue::from_static(PKPASS_CONTENT_TYPE))],
        bytes,
    )
        .into_response();
    if let Some(value) = last_modified {
        response.headers_mut().insert(LAST_MODIFIED, value);
    }
    Ok(response)
}

/// Create or fully replace a pass, then notify registered devices.
#[instrument(skip_all)]
pub async fn create(
    _auth: ApplePassAuth,
    State(state): State<AppState>,
    body: std::result::Result<Json<CreatePassRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PassResponse>)> {
    let Json(body) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let key = PassKey::new(body.pass_type_identifier, body.serial_number);
    if key.is_blank() {
        return Err(AppError::BadRequest("identifiers must not be blank".into()));
    }
    require_object(&body.data)?;

    let pass = state
        .passes()
        .create_or_replace(NewPass {
            key: key.clone(),
            template_type: body.template_type,
            data: body.data,
        })
        .await?;

    info!(pass = %key, version = %pass.version_updated_at, "Pass saved");
    state.outbox().enqueue(key);

    Ok((StatusCode::CREATED, Json(pass.into())))
}

/// Deep-merge new data into an existing pass, then notify registered devices.
#[instrument(skip_all, fields(pass_type = %pass_type_identifier, serial = %serial_number))]
pub async fn update(
    _auth: ApplePassAuth,
    State(state): State<AppState>,
    Path((pass_type_identifier, serial_number)): Path<(String, String)>,
    body: std::result::Result<Json<UpdatePassRequest>, JsonRejection>,
) -> Result<Json<PassResponse>> {
    let Json(body) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    require_object(&body.data)?;

    let key = PassKey::new(pass_type_identifier, serial_number);
    let pass = state.passes().merge_update(&key, body.data).await?;

    info!(version = %pass.version_updated_at, "Pass updated");
    state.outbox().enqueue(key);

    Ok(Json(pass.into()))
}

fn require_object(data: &Value) -> Result<()> {
    if data.is_object() {
        Ok(())
    } else {
        Err(AppError::BadRequest("data must be a JSON object".into()))
    }
}

/// True when the client's copy is at least as new as `version`.
fn not_modified_since(headers: &HeaderMap, version: UnixTime) -> bool {
    headers
        .get(IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(UnixTime::parse_http_date)
        .is_some_and(|since| since >= version)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(IF_MODIFIED_SINCE, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_not_modified_since() {
        let version = UnixTime::from_secs(784_111_777);
        let same = headers_with("Sun, 06 Nov 1994 08:49:37 GMT");
        let earlier = headers_with("Sun, 06 Nov 1994 08:49:36 GMT");

        assert!(not_modified_since(&same, version));
        assert!(!not_modified_since(&earlier, version));
        assert!(!not_modified_since(&HeaderMap::new(), version));
        assert!(!not_modified_since(&headers_with("garbage"), version));
    }

    #[test]
    fn test_require_object() {
        assert!(require_object(&json!({"a": 1})).is_ok());
        assert!(require_object(&json!([1, 2])).is_err());
        assert!(require_object(&json!("x")).is_err());
    }

    #[test]
    fn test_create_request_accepts_both_casings() {
        let snake: CreatePassRequest = serde_json::from_value(json!({
            "pass_type_identifier": "pass.t",
            "serial_number": "s1",
            "template_type": "generic",
            "data": {}
        }))
        .unwrap();
        let camel: CreatePassRequest = serde_json::from_value(json!({
            "passTypeIdentifier": "pass.t",
            "serialNumber": "s1",
            "templateType": "generic",
            "data": {}
        }))
        .unwrap();

        assert_eq!(snake.serial_number, camel.serial_number);
    }
}
