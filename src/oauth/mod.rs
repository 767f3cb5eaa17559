//! OAuth authentication module
//!
//! Authorization URL construction and code exchange live in [`client`]; identity
//! token verification and the provider key cache live in [`jwt_validation`].

pub mod client;
pub mod jwt_validation;

pub use client::{AuthorizationRequest, OAuthClient, TokenExchangeResult};
pub use jwt_validation::{JwtValidator, OidcDiscoveryDocument, VerifiedIdentity};

use std::time::Duration;

use serde::Deserialize;

use crate::error::AuthError;
use crate::settings::HttpClientSettings;

/// Query parameters the provider appends when redirecting back
#[derive(Deserialize, Debug, Default)]
pub struct OAuthCallback {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Build the HTTP client shared by token exchange and key fetches
///
/// # Errors
///
/// Returns `AuthError::Configuration` if the TLS backend cannot be initialised
pub fn build_http_client(settings: &HttpClientSettings) -> Result<reqwest::Client, AuthError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.timeout_seconds))
        .connect_timeout(Duration::from_secs(settings.connect_timeout_seconds))
        .user_agent(concat!("aurora-gate/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AuthError::Configuration(format!("failed to build HTTP client: {e}")))
}

/// Map a transport-level failure to `ProviderUnavailable`
pub(crate) fn provider_unavailable(operation: &str, error: &reqwest::Error) -> AuthError {
    let kind = if error.is_timeout() {
        "timed out"
    } else if error.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    AuthError::ProviderUnavailable(format!("{operation} {kind}"))
}
