//! Error taxonomy for the sign-in flows
//!
//! Every failure carries a stable reason code for server-side logs and maps to a
//! generic client-facing category. Provider response bodies and token contents
//! never reach the end user.

use thiserror::Error;

/// Why an identity token was refused by the verifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    Malformed,
    UnsupportedAlgorithm,
    UnknownKey,
    Signature,
    Issuer,
    Audience,
    Expiry,
    NotYetValid,
    Nonce,
    MissingClaim,
}

impl TokenRejection {
    /// Stable snake_case code used in log lines
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::UnsupportedAlgorithm => "unsupported_algorithm",
            Self::UnknownKey => "unknown_key",
            Self::Signature => "signature",
            Self::Issuer => "issuer",
            Self::Audience => "audience",
            Self::Expiry => "expiry",
            Self::NotYetValid => "not_yet_valid",
            Self::Nonce => "nonce",
            Self::MissingClaim => "missing_claim",
        }
    }
}

impl std::fmt::Display for TokenRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorization code missing from callback")]
    MissingCode,

    #[error("OAuth state parameter missing or does not match the pending login")]
    StateMismatch,

    #[error("identity provider denied the request: {0}")]
    ProviderDenied(String),

    #[error("token endpoint returned HTTP {status}: {error}")]
    TokenEndpointError {
        status: u16,
        error: String,
        description: Option<String>,
    },

    #[error("token response did not include an id_token (is the openid scope requested?)")]
    MissingIdentityToken,

    #[error("identity token rejected: {0}")]
    InvalidIdentityToken(TokenRejection),

    #[error("identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("stored password hash could not be parsed")]
    InvalidStoredHash,

    #[error("credential store failure: {0}")]
    CredentialStore(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Generic message shown to clients for any rejected login
pub const GENERIC_LOGIN_FAILURE: &str = "Authentication failed. Please try signing in again.";

impl AuthError {
    /// Distinct reason code for server-side diagnostics
    #[must_use]
    pub fn reason_code(&self) -> String {
        match self {
            Self::MissingCode => "missing_code".to_string(),
            Self::StateMismatch => "state_mismatch".to_string(),
            Self::ProviderDenied(_) => "provider_denied".to_string(),
            Self::TokenEndpointError { .. } => "token_endpoint_error".to_string(),
            Self::MissingIdentityToken => "missing_identity_token".to_string(),
            Self::InvalidIdentityToken(reason) => format!("invalid_identity_token:{reason}"),
            Self::ProviderUnavailable(_) => "provider_unavailable".to_string(),
            Self::InvalidCredentials => "invalid_credentials".to_string(),
            Self::InvalidStoredHash => "invalid_stored_hash".to_string(),
            Self::CredentialStore(_) => "credential_store".to_string(),
            Self::Configuration(_) => "configuration".to_string(),
        }
    }

    /// Category exposed to the client in the JSON error body
    #[must_use]
    pub const fn client_category(&self) -> &'static str {
        match self {
            Self::MissingCode | Self::StateMismatch => "invalid_request",
            Self::ProviderDenied(_)
            | Self::TokenEndpointError { .. }
            | Self::InvalidIdentityToken(_)
            | Self::InvalidCredentials => "authentication_failed",
            Self::ProviderUnavailable(_) => "provider_unavailable",
            Self::MissingIdentityToken
            | Self::InvalidStoredHash
            | Self::CredentialStore(_)
            | Self::Configuration(_) => "server_error",
        }
    }

    /// True for faults that point at deployment configuration rather than the user
    #[must_use]
    pub const fn is_configuration_fault(&self) -> bool {
        matches!(self, Self::MissingIdentityToken | Self::Configuration(_))
    }
}

impl From<TokenRejection> for AuthError {
    fn from(reason: TokenRejection) -> Self {
        Self::InvalidIdentityToken(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_codes_are_distinct() {
        let errors = [
            AuthError::MissingCode,
            AuthError::StateMismatch,
            AuthError::ProviderDenied("access_denied".to_string()),
            AuthError::TokenEndpointError {
                status: 401,
                error: "invalid_client".to_string(),
                description: None,
            },
            AuthError::MissingIdentityToken,
            AuthError::InvalidIdentityToken(TokenRejection::Signature),
            AuthError::InvalidIdentityToken(TokenRejection::Audience),
            AuthError::ProviderUnavailable("timeout".to_string()),
            AuthError::InvalidCredentials,
            AuthError::InvalidStoredHash,
        ];

        let mut codes: Vec<String> = errors.iter().map(AuthError::reason_code).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_token_rejection_reason_code() {
        let error = AuthError::from(TokenRejection::Expiry);
        assert_eq!(error.reason_code(), "invalid_identity_token:expiry");
        assert_eq!(error.client_category(), "authentication_failed");
    }

    #[test]
    fn test_client_categories() {
        assert_eq!(AuthError::MissingCode.client_category(), "invalid_request");
        assert_eq!(
            AuthError::ProviderUnavailable("connect".to_string()).client_category(),
            "provider_unavailable"
        );
        assert!(AuthError::MissingIdentityToken.is_configuration_fault());
        assert!(!AuthError::InvalidCredentials.is_configuration_fault());
    }
}
