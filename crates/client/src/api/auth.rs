//! Token authentication against the marketplace.
//!
//! The API issues a short-lived access token and a long-lived refresh token
//! from `POST /token/`. `POST /token/refresh/` trades the refresh token for a
//! new access token.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::ApiError;

/// Access and refresh tokens held by the client.
#[derive(Clone)]
pub struct AuthTokens {
    /// Bearer token attached to every request.
    pub access: SecretString,
    /// Token used to obtain a new access token after a 401.
    pub refresh: Option<SecretString>,
}

impl std::fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthTokens")
            .field("access", &"[REDACTED]")
            .field("refresh", &self.refresh.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    access: String,
    refresh: String,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access: String,
}

/// Obtain a token pair with email and password.
///
/// # Errors
///
/// Returns `ApiError::Unauthorized` if the credentials are rejected,
/// `ApiError::Status` for other non-success responses.
#[instrument(skip(client, password), fields(email = %email))]
pub async fn login(
    client: &reqwest::Client,
    url: &str,
    email: &str,
    password: &SecretString,
) -> Result<AuthTokens, ApiError> {
    let response = client
        .post(url)
        .json(&LoginRequest {
            email,
            password: password.expose_secret(),
        })
        .send()
        .await?;

    let status = response.status();
    if status.is_success() {
        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;
        return Ok(AuthTokens {
            access: SecretString::from(body.access),
            refresh: Some(SecretString::from(body.refresh)),
        });
    }

    let message = response.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::BAD_REQUEST {
        return Err(ApiError::Unauthorized(format!(
            "login rejected ({status}): {message}"
        )));
    }
    Err(ApiError::Status {
        status: status.as_u16(),
        message,
    })
}

/// Exchange a refresh token for a new access token.
///
/// # Errors
///
/// Returns `ApiError::Unauthorized` if the refresh token is invalid or expired.
#[instrument(skip(client, refresh_token))]
pub async fn refresh_access_token(
    client: &reqwest::Client,
    url: &str,
    refresh_token: &SecretString,
) -> Result<SecretString, ApiError> {
    let response = client
        .post(url)
        .json(&RefreshRequest {
            refresh: refresh_token.expose_secret(),
        })
        .send()
        .await?;

    let status = response.status();
    if status.is_success() {
        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;
        return Ok(SecretString::from(body.access));
    }

    let message = response.text().await.unwrap_or_default();
    if status.is_client_error() {
        return Err(ApiError::Unauthorized(format!(
            "token refresh rejected ({status}): {message}"
        )));
    }
    Err(ApiError::Status {
        status: status.as_u16(),
        message,
    })
}
