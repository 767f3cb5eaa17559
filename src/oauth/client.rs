// OAuth2 authorization-code client for the configured identity provider

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};
use reqwest::header::ACCEPT;
use serde::Deserialize;

use super::jwt_validation::OidcDiscoveryDocument;
use super::provider_unavailable;
use crate::error::AuthError;
use crate::settings::{AuroraSettings, ProviderSettings};
use crate::utils::logging::LoggingHelper;

/// One login attempt's authorization request; rendered into the provider redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub authorization_endpoint: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub response_type: &'static str,
    pub state: String,
    pub nonce: String,
    pub extra_params: BTreeMap<String, String>,
}

impl AuthorizationRequest {
    /// Render the request as the provider authorization URL
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the authorization endpoint is not a valid URL
    pub fn to_url(&self) -> Result<String, AuthError> {
        let mut url = url::Url::parse(&self.authorization_endpoint).map_err(|e| {
            AuthError::Configuration(format!("invalid authorization endpoint: {e}"))
        })?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", &self.redirect_uri)
                .append_pair("response_type", self.response_type)
                .append_pair("scope", &self.scopes.join(" "))
                .append_pair("state", &self.state)
                .append_pair("nonce", &self.nonce);

            for (key, value) in &self.extra_params {
                query.append_pair(key, value);
            }
        }

        Ok(url.to_string())
    }
}

/// Tokens returned by a successful code exchange
#[derive(Clone)]
pub struct TokenExchangeResult {
    pub access_token: String,
    pub id_token: String,
    pub token_type: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for TokenExchangeResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenExchangeResult")
            .field("access_token", &format_args!("<{} bytes>", self.access_token.len()))
            .field("id_token", &format_args!("<{} bytes>", self.id_token.len()))
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    id_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<i64>,
    scope: Option<String>,
    refresh_token: Option<String>,
}

/// Error body defined by RFC 6749 section 5.2
#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

#[derive(Clone)]
pub struct OAuthClient {
    http_client: reqwest::Client,
    provider_name: String,
    authorization_endpoint: String,
    token_endpoint: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    scopes: Vec<String>,
    extra_params: BTreeMap<String, String>,
}

impl OAuthClient {
    /// Build the client from settings
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the client id or secret is missing
    pub fn from_settings(
        settings: &AuroraSettings,
        http_client: reqwest::Client,
    ) -> Result<Self, AuthError> {
        let provider: &ProviderSettings = &settings.provider;
        let client_id = provider.get_client_id().ok_or_else(|| {
            AuthError::Configuration(format!("client id not configured for {}", provider.name))
        })?;
        let client_secret = provider.get_client_secret().ok_or_else(|| {
            AuthError::Configuration(format!(
                "client secret not configured for {}",
                provider.name
            ))
        })?;

        Ok(Self {
            http_client,
            provider_name: provider.name.clone(),
            authorization_endpoint: provider.authorization_endpoint.clone(),
            token_endpoint: provider.token_endpoint.clone(),
            client_id,
            client_secret,
            redirect_uri: settings.callback_url(),
            scopes: provider.scopes.clone(),
            extra_params: provider
                .extra_auth_params
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        })
    }

    /// Take the endpoints published in the provider's discovery document
    pub fn apply_discovery(&mut self, document: &OidcDiscoveryDocument) {
        self.authorization_endpoint
            .clone_from(&document.authorization_endpoint);
        self.token_endpoint.clone_from(&document.token_endpoint);
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    #[must_use]
    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    /// Describe the redirect for a new login attempt
    #[must_use]
    pub fn authorization_request(&self, state: &str, nonce: &str) -> AuthorizationRequest {
        let request = AuthorizationRequest {
            authorization_endpoint: self.authorization_endpoint.clone(),
            client_id: self.client_id.clone(),
            redirect_uri: self.redirect_uri.clone(),
            scopes: self.scopes.clone(),
            response_type: "code",
            state: state.to_string(),
            nonce: nonce.to_string(),
            extra_params: self.extra_params.clone(),
        };
        LoggingHelper::log_oauth_url_built(&self.provider_name, &request.scopes, &request.extra_params);
        request
    }

    /// Exchange an authorization code for tokens
    ///
    /// Authorization codes are single use, so a failed exchange is never retried.
    ///
    /// # Errors
    ///
    /// - `MissingCode` if `code` is empty
    /// - `TokenEndpointError` if the provider answers with a non-success status
    /// - `MissingIdentityToken` if the response carries no `id_token`
    /// - `ProviderUnavailable` on timeout or connection failure
    pub async fn exchange(&self, code: &str) -> Result<TokenExchangeResult, AuthError> {
        if code.trim().is_empty() {
            return Err(AuthError::MissingCode);
        }

        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        LoggingHelper::log_token_exchange_start(&self.provider_name);
        let response = self
            .http_client
            .post(&self.token_endpoint)
            .header(ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| provider_unavailable("token exchange", &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| provider_unavailable("reading token response", &e))?;

        if !status.is_success() {
            let (error, description) = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(parsed) => (parsed.error, parsed.error_description),
                Err(_) => ("unparseable_error_body".to_string(), None),
            };
            warn!(
                "Token endpoint for {} returned {status}: error={error} description={description:?}",
                self.provider_name
            );
            return Err(AuthError::TokenEndpointError {
                status: status.as_u16(),
                error,
                description,
            });
        }

        let token_response: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            warn!("Token endpoint for {} returned an unreadable body: {e}", self.provider_name);
            AuthError::TokenEndpointError {
                status: status.as_u16(),
                error: "invalid_token_response".to_string(),
                description: None,
            }
        })?;

        LoggingHelper::log_token_exchange_summary(
            &self.provider_name,
            token_response.id_token.is_some(),
            token_response.refresh_token.is_some(),
            token_response.token_type.as_deref(),
            token_response.scope.as_deref(),
        );

        let Some(id_token) = token_response.id_token.filter(|t| !t.is_empty()) else {
            error!(
                "Token response from {} has no id_token; check that the openid scope is requested",
                self.provider_name
            );
            return Err(AuthError::MissingIdentityToken);
        };

        let expires_at = token_response
            .expires_in
            .filter(|secs| *secs > 0)
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime));
        debug!("Token exchange for {} succeeded", self.provider_name);
        info!("Authorization code exchanged with {}", self.provider_name);

        Ok(TokenExchangeResult {
            access_token: token_response.access_token,
            id_token,
            token_type: token_response
                .token_type
                .unwrap_or_else(|| "Bearer".to_string()),
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::TestFixtures;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server_uri: &str) -> OAuthClient {
        let settings = TestFixtures::settings_for_provider(server_uri);
        OAuthClient::from_settings(&settings, TestFixtures::http_client()).unwrap()
    }

    #[test]
    fn test_authorization_url() {
        let client = client_for("https://provider.test");
        let url = client
            .authorization_request("state-abc", "nonce-xyz")
            .to_url()
            .unwrap();

        assert!(url.starts_with("https://provider.test/o/oauth2/auth?"));
        let parsed = url::Url::parse(&url).unwrap();
        let pairs: BTreeMap<String, String> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert_eq!(pairs["client_id"], TestFixtures::CLIENT_ID);
        assert_eq!(
            pairs["redirect_uri"],
            "http://localhost:8080/api/authentication/callback"
        );
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["scope"], "openid email profile");
        assert_eq!(pairs["state"], "state-abc");
        assert_eq!(pairs["nonce"], "nonce-xyz");
    }

    #[test]
    fn test_redirect_uri_is_percent_encoded() {
        let url = client_for("https://provider.test")
            .authorization_request("s", "n")
            .to_url()
            .unwrap();
        assert!(url.contains(
            "redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fapi%2Fauthentication%2Fcallback"
        ));
    }

    #[test]
    fn test_missing_credentials() {
        let mut settings = TestFixtures::settings_for_provider("https://provider.test");
        settings.provider.client_secret = None;
        settings.provider.client_secret_env = None;
        let result = OAuthClient::from_settings(&settings, TestFixtures::http_client());
        assert!(matches!(result, Err(AuthError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_exchange_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=auth-code-1"))
            .and(body_string_contains("client_secret="))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.access",
                "id_token": "header.payload.signature",
                "token_type": "Bearer",
                "expires_in": 3599,
                "scope": "openid email profile"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = client_for(&server.uri())
            .exchange("auth-code-1")
            .await
            .unwrap();
        assert_eq!(result.id_token, "header.payload.signature");
        assert_eq!(result.token_type, "Bearer");
        assert!(result.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_exchange_with_huge_expires_in() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.access",
                "id_token": "header.payload.signature",
                "expires_in": i64::MAX
            })))
            .mount(&server)
            .await;

        let result = client_for(&server.uri())
            .exchange("auth-code-1")
            .await
            .unwrap();
        assert!(result.expires_at.is_none());
    }

    #[tokio::test]
    async fn test_exchange_requires_code() {
        let client = client_for("http://127.0.0.1:9");
        assert!(matches!(client.exchange("").await, Err(AuthError::MissingCode)));
        assert!(matches!(client.exchange("   ").await, Err(AuthError::MissingCode)));
    }

    #[tokio::test]
    async fn test_exchange_token_endpoint_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": "invalid_client",
                "error_description": "The OAuth client was not found."
            })))
            .mount(&server)
            .await;

        let err = client_for(&server.uri())
            .exchange("auth-code-1")
            .await
            .unwrap_err();
        match err {
            AuthError::TokenEndpointError {
                status,
                error,
                description,
            } => {
                assert_eq!(status, 401);
                assert_eq!(error, "invalid_client");
                assert_eq!(
                    description.as_deref(),
                    Some("The OAuth client was not found.")
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exchange_missing_id_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.access",
                "token_type": "Bearer",
                "expires_in": 3599
            })))
            .mount(&server)
            .await;

        let err = client_for(&server.uri())
            .exchange("auth-code-1")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingIdentityToken));
    }

    #[tokio::test]
    async fn test_exchange_timeout_is_provider_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let settings = TestFixtures::settings_for_provider(&server.uri());
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(200))
            .build()
            .unwrap();
        let client = OAuthClient::from_settings(&settings, http_client).unwrap();

        let err = client.exchange("auth-code-1").await.unwrap_err();
        assert!(matches!(err, AuthError::ProviderUnavailable(_)));
    }

    #[test]
    fn test_debug_does_not_leak_tokens() {
        let result = TokenExchangeResult {
            access_token: "secret-access".to_string(),
            id_token: "secret-id".to_string(),
            token_type: "Bearer".to_string(),
            expires_at: None,
        };
        let rendered = format!("{result:?}");
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-id"));
    }
}
