//! `ApplePass` authentication extractor.
//!
//! Every protocol endpoint except log upload requires
//! `Authorization: ApplePass <token>`, with exactly one space between the
//! scheme and the token. The token is checked against the configured secret.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use secrecy::ExposeSecret;
use tracing::debug;

use crate::error::AppError;
use crate::state::AppState;

const SCHEME_PREFIX: &str = "ApplePass ";

/// Extractor that requires a valid `ApplePass` authorization header.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(_auth: ApplePassAuth) -> impl IntoResponse {
///     StatusCode::OK
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ApplePassAuth;

impl FromRequestParts<AppState> for ApplePassAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Unauthorized)?;

        let Some(token) = parse_apple_pass(header) else {
            debug!("Malformed ApplePass authorization header");
            return Err(AppError::Unauthorized);
        };

        if !constant_time_compare(token, state.auth_token().expose_secret()) {
            debug!("ApplePass token mismatch");
            return Err(AppError::Unauthorized);
        }

        Ok(Self)
    }
}

/// Extract the token from `ApplePass <token>`.
///
/// Returns `None` for any other scheme, extra whitespace, or an empty token.
fn parse_apple_pass(header: &str) -> Option<&str> {
    let token = header.strip_prefix(SCHEME_PREFIX)?;
    if token.is_empty() || token.chars().any(char::is_whitespace) {
        return None;
    }
    Some(token)
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}
