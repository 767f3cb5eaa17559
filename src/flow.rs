//! Auth Flow Controller
//!
//! Drives both login flows:
//!
//! ```text
//! Anonymous --login--> AwaitingProviderCallback --callback--> Authenticated
//!     |                                          \-----------> Rejected
//!     \--password login--> Authenticated | Rejected
//! ```
//!
//! The controller is built once at startup and shared through `web::Data`;
//! every dependency it needs is passed in explicitly.

use std::fmt;
use std::sync::Arc;

use log::{info, warn};

use crate::error::AuthError;
use crate::oauth::jwt_validation::fetch_discovery_document;
use crate::oauth::{build_http_client, JwtValidator, OAuthCallback, OAuthClient, VerifiedIdentity};
use crate::password::{PasswordHasher, PasswordVerifiedUser};
use crate::session::{PendingLogin, SessionManager};
use crate::settings::AuroraSettings;
use crate::store::{InMemoryUserStore, PgUserStore, UserStore};
use crate::utils::crypto::constant_time_eq;
use crate::utils::logging::LoggingHelper;

/// Where a browser stands in the login state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    AwaitingProviderCallback,
    Authenticated,
    Rejected,
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Anonymous => "anonymous",
            Self::AwaitingProviderCallback => "awaiting_provider_callback",
            Self::Authenticated => "authenticated",
            Self::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// Provider redirect for a new login plus the state to remember until callback
#[derive(Debug)]
pub struct LoginRedirect {
    pub url: String,
    pub pending: PendingLogin,
}

#[derive(Clone)]
struct GoogleSignIn {
    client: OAuthClient,
    validator: JwtValidator,
}

#[derive(Clone)]
pub struct AuthController {
    google: Option<GoogleSignIn>,
    sessions: SessionManager,
    hasher: PasswordHasher,
    users: Arc<dyn UserStore>,
    landing_path: String,
    provider_display_name: String,
}

impl AuthController {
    /// Controller with password sign-in only; add Google with [`Self::with_google`]
    #[must_use]
    pub fn new(
        sessions: SessionManager,
        hasher: PasswordHasher,
        users: Arc<dyn UserStore>,
        landing_path: &str,
    ) -> Self {
        Self {
            google: None,
            sessions,
            hasher,
            users,
            landing_path: landing_path.to_string(),
            provider_display_name: "Google".to_string(),
        }
    }

    #[must_use]
    pub fn with_google(mut self, client: OAuthClient, validator: JwtValidator) -> Self {
        self.google = Some(GoogleSignIn { client, validator });
        self
    }

    /// Wire up every dependency from settings
    ///
    /// Discovery and key prefetch failures are logged and tolerated; the
    /// configured endpoints are used and keys are fetched on first login.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` for invalid Argon2 parameters, an
    /// unparseable database URL, or an HTTP client that cannot be built
    pub async fn from_settings(settings: &AuroraSettings) -> Result<Self, AuthError> {
        let sessions = SessionManager::from_settings(settings);
        let hasher = PasswordHasher::new(&settings.password)?;
        let users = Self::user_store(settings)?;

        let mut controller = Self::new(
            sessions,
            hasher,
            users,
            &settings.application.landing_path,
        );
        controller.provider_display_name = settings.provider.display_name().to_string();

        let provider = &settings.provider;
        let configured = provider.is_configured();
        LoggingHelper::log_provider_init(&provider.name, provider.display_name(), configured);
        if !configured {
            return Ok(controller);
        }

        let http_client = build_http_client(&settings.http_client)?;
        let mut client = OAuthClient::from_settings(settings, http_client.clone())?;
        let mut validator = JwtValidator::new(
            http_client.clone(),
            provider,
            settings.jwt_validation.clone(),
        );

        if let Some(discovery_url) = provider.discovery_url.as_deref() {
            match fetch_discovery_document(&http_client, discovery_url).await {
                Ok(document) => {
                    client.apply_discovery(&document);
                    validator.apply_discovery(&document);
                    info!("Using endpoints from {discovery_url}");
                }
                Err(e) => warn!("OIDC discovery failed, using configured endpoints: {e}"),
            }
        }

        if let Err(e) = validator.prefetch_keys().await {
            warn!("Could not prefetch signing keys, will retry on first login: {e}");
        }

        Ok(controller.with_google(client, validator))
    }

    fn user_store(settings: &AuroraSettings) -> Result<Arc<dyn UserStore>, AuthError> {
        match settings.database.url.as_deref() {
            Some(url) => {
                info!("Password sign-in backed by Postgres");
                Ok(Arc::new(PgUserStore::connect_lazy(&settings.database, url)?))
            }
            None => {
                warn!("DATABASE_URL not set; password sign-in has no users");
                Ok(Arc::new(InMemoryUserStore::new()))
            }
        }
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    #[must_use]
    pub fn landing_path(&self) -> &str {
        &self.landing_path
    }

    #[must_use]
    pub fn google_enabled(&self) -> bool {
        self.google.is_some()
    }

    #[must_use]
    pub fn provider_display_name(&self) -> &str {
        &self.provider_display_name
    }

    fn google(&self) -> Result<&GoogleSignIn, AuthError> {
        self.google
            .as_ref()
            .ok_or_else(|| AuthError::Configuration("Google sign-in is not configured".to_string()))
    }

    // =========================================================================
    // Provider flow
    // =========================================================================

    /// Start a provider login with a fresh `state` and `nonce`
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if Google sign-in is not configured or
    /// the authorization endpoint is not a valid URL
    pub fn begin_login(&self) -> Result<LoginRedirect, AuthError> {
        let google = self.google()?;
        let pending = PendingLogin::generate();
        let url = google
            .client
            .authorization_request(&pending.state, &pending.nonce)
            .to_url()?;

        LoggingHelper::log_state_transition(
            AuthState::Anonymous,
            AuthState::AwaitingProviderCallback,
        );
        Ok(LoginRedirect { url, pending })
    }

    /// Finish a provider login: check the callback, exchange the code and
    /// verify the identity token against the pending login's nonce
    ///
    /// # Errors
    ///
    /// - `ProviderDenied` if the provider redirected back with an `error`
    /// - `MissingCode` if no authorization code came back
    /// - `StateMismatch` if there is no pending login or its state differs
    /// - any error of [`OAuthClient::exchange`] or [`JwtValidator::verify`]
    pub async fn complete_callback(
        &self,
        params: &OAuthCallback,
        pending: Option<&PendingLogin>,
    ) -> Result<VerifiedIdentity, AuthError> {
        let result = self.run_callback(params, pending).await;
        match &result {
            Ok(_) => LoggingHelper::log_state_transition(
                AuthState::AwaitingProviderCallback,
                AuthState::Authenticated,
            ),
            Err(e) => {
                LoggingHelper::log_rejection("Provider", e);
                LoggingHelper::log_state_transition(
                    AuthState::AwaitingProviderCallback,
                    AuthState::Rejected,
                );
            }
        }
        result
    }

    async fn run_callback(
        &self,
        params: &OAuthCallback,
        pending: Option<&PendingLogin>,
    ) -> Result<VerifiedIdentity, AuthError> {
        if let Some(error) = params.error.as_deref().filter(|e| !e.is_empty()) {
            return Err(AuthError::ProviderDenied(error.to_string()));
        }

        let code = params
            .code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .ok_or(AuthError::MissingCode)?;

        let pending = pending.ok_or(AuthError::StateMismatch)?;
        let state_matches = params
            .state
            .as_deref()
            .is_some_and(|state| constant_time_eq(state, &pending.state));
        if !state_matches {
            return Err(AuthError::StateMismatch);
        }

        let google = self.google()?;
        let tokens = google.client.exchange(code).await?;
        google
            .validator
            .verify(
                &tokens.id_token,
                google.client.client_id(),
                Some(&pending.nonce),
            )
            .await
    }

    // =========================================================================
    // Password flow
    // =========================================================================

    /// Check an email and password against the user store
    ///
    /// Unknown email, wrong password, a provider-only account and a corrupt
    /// stored hash all produce `InvalidCredentials` after one Argon2
    /// verification.
    ///
    /// # Errors
    ///
    /// - `InvalidCredentials` if the credentials do not match a user
    /// - `CredentialStore` if the user store cannot be queried
    pub async fn password_login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<PasswordVerifiedUser, AuthError> {
        let result = self.check_password(email, password).await;
        match &result {
            Ok(_) => {
                LoggingHelper::log_state_transition(AuthState::Anonymous, AuthState::Authenticated);
            }
            Err(e) => {
                LoggingHelper::log_rejection("Password", e);
                LoggingHelper::log_state_transition(AuthState::Anonymous, AuthState::Rejected);
            }
        }
        result
    }

    async fn check_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<PasswordVerifiedUser, AuthError> {
        let email = email.trim();
        let user = if email.is_empty() {
            None
        } else {
            self.users.find_by_email(email).await?
        };

        // Argon2 is deliberately slow; keep it off the async workers
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let verified = tokio::task::spawn_blocking(move || match user {
            Some(user) => hasher.authenticate(user, &password),
            None => {
                hasher.verify_dummy(&password);
                None
            }
        })
        .await
        .map_err(|e| AuthError::Configuration(format!("password verification task failed: {e}")))?;

        verified.ok_or(AuthError::InvalidCredentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TokenRejection;
    use crate::testing::fixtures::TestFixtures;
    use crate::testing::keys::{TestKeys, TokenBuilder};
    use async_trait::async_trait;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn callback(code: Option<&str>, state: Option<&str>) -> OAuthCallback {
        OAuthCallback {
            code: code.map(ToString::to_string),
            state: state.map(ToString::to_string),
            ..Default::default()
        }
    }

    async fn google_mock(id_token: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(TestFixtures::token_response(id_token)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/certs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(TestKeys::jwks()))
            .mount(&server)
            .await;
        server
    }

    /// A pending login whose nonce matches the default test token
    fn pending_for_token() -> PendingLogin {
        PendingLogin {
            nonce: TokenBuilder::NONCE.to_string(),
            ..PendingLogin::generate()
        }
    }

    #[test]
    fn test_begin_login() {
        let controller = TestFixtures::controller_for("https://provider.test");
        let redirect = controller.begin_login().unwrap();

        let url = url::Url::parse(&redirect.url).unwrap();
        let state = url.query_pairs().find(|(k, _)| k == "state").unwrap().1;
        let nonce = url.query_pairs().find(|(k, _)| k == "nonce").unwrap().1;
        assert_eq!(state, redirect.pending.state.as_str());
        assert_eq!(nonce, redirect.pending.nonce.as_str());

        let second = controller.begin_login().unwrap();
        assert_ne!(second.pending.state, redirect.pending.state);
    }

    #[test]
    fn test_begin_login_without_google() {
        let controller = TestFixtures::password_only_controller();
        assert!(!controller.google_enabled());
        assert!(matches!(
            controller.begin_login(),
            Err(AuthError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_callback_success() {
        let server = google_mock(&TokenBuilder::new().build_rs256()).await;
        let controller = TestFixtures::controller_for(&server.uri());
        let pending = pending_for_token();

        let identity = controller
            .complete_callback(
                &callback(Some("auth-code"), Some(&pending.state)),
                Some(&pending),
            )
            .await
            .unwrap();
        assert_eq!(identity.subject(), TokenBuilder::SUBJECT);
        assert_eq!(identity.display_name(), TokenBuilder::NAME);
    }

    #[tokio::test]
    async fn test_callback_provider_error() {
        let controller = TestFixtures::controller_for("https://provider.test");
        let pending = pending_for_token();
        let params = OAuthCallback {
            error: Some("access_denied".to_string()),
            state: Some(pending.state.clone()),
            ..Default::default()
        };

        let err = controller
            .complete_callback(&params, Some(&pending))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ProviderDenied(ref e) if e == "access_denied"));
    }

    #[tokio::test]
    async fn test_callback_missing_code() {
        let controller = TestFixtures::controller_for("https://provider.test");
        let pending = pending_for_token();

        for code in [None, Some(""), Some("   ")] {
            let err = controller
                .complete_callback(&callback(code, Some(&pending.state)), Some(&pending))
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::MissingCode));
        }
    }

    #[tokio::test]
    async fn test_callback_state_checks() {
        let controller = TestFixtures::controller_for("https://provider.test");
        let pending = pending_for_token();

        let no_pending = controller
            .complete_callback(&callback(Some("code"), Some(&pending.state)), None)
            .await;
        assert!(matches!(no_pending, Err(AuthError::StateMismatch)));

        let wrong_state = controller
            .complete_callback(&callback(Some("code"), Some("forged")), Some(&pending))
            .await;
        assert!(matches!(wrong_state, Err(AuthError::StateMismatch)));

        let no_state = controller
            .complete_callback(&callback(Some("code"), None), Some(&pending))
            .await;
        assert!(matches!(no_state, Err(AuthError::StateMismatch)));
    }

    #[tokio::test]
    async fn test_callback_nonce_mismatch() {
        let token = TokenBuilder::new().with_nonce("replayed-nonce").build_rs256();
        let server = google_mock(&token).await;
        let controller = TestFixtures::controller_for(&server.uri());
        let pending = pending_for_token();

        let err = controller
            .complete_callback(
                &callback(Some("auth-code"), Some(&pending.state)),
                Some(&pending),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::InvalidIdentityToken(TokenRejection::Nonce)
        ));
    }

    #[tokio::test]
    async fn test_password_login() {
        let controller = TestFixtures::password_only_controller();

        let verified = controller
            .password_login(TestFixtures::PASSWORD_USER_EMAIL, TestFixtures::PASSWORD)
            .await
            .unwrap();
        assert_eq!(verified.user().email, TestFixtures::PASSWORD_USER_EMAIL);

        let surrounding_space = controller
            .password_login(
                &format!(" {} ", TestFixtures::PASSWORD_USER_EMAIL),
                TestFixtures::PASSWORD,
            )
            .await;
        assert!(surrounding_space.is_ok());
    }

    #[tokio::test]
    async fn test_password_failures_are_indistinguishable() {
        let controller = TestFixtures::password_only_controller();

        let cases = [
            (TestFixtures::PASSWORD_USER_EMAIL, "wrong-password"),
            ("nobody@example.com", TestFixtures::PASSWORD),
            (TestFixtures::PROVIDER_ONLY_EMAIL, TestFixtures::PASSWORD),
            ("", ""),
        ];
        for (email, password) in cases {
            let err = controller.password_login(email, password).await.unwrap_err();
            assert!(matches!(err, AuthError::InvalidCredentials), "{email}");
        }
    }

    struct UnavailableStore;

    #[async_trait]
    impl UserStore for UnavailableStore {
        async fn find_by_email(
            &self,
            _email: &str,
        ) -> Result<Option<crate::store::UserRecord>, AuthError> {
            Err(AuthError::CredentialStore("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_password_store_failure() {
        let controller = AuthController::new(
            TestFixtures::session_manager(),
            TestFixtures::password_hasher(),
            Arc::new(UnavailableStore),
            "/welcome",
        );
        let err = controller
            .password_login("ada@example.com", "pw")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::CredentialStore(_)));
    }

    #[tokio::test]
    async fn test_from_settings_without_provider() {
        let mut settings = TestFixtures::settings_for_provider("https://provider.test");
        settings.provider.client_id = None;
        let controller = AuthController::from_settings(&settings).await.unwrap();
        assert!(!controller.google_enabled());
        assert_eq!(controller.landing_path(), "/welcome");
    }

    #[tokio::test]
    async fn test_from_settings_prefetches_keys() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/certs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(TestKeys::jwks()))
            .expect(1)
            .mount(&server)
            .await;

        let settings = TestFixtures::settings_for_provider(&server.uri());
        let controller = AuthController::from_settings(&settings).await.unwrap();
        assert!(controller.google_enabled());
    }

    #[test]
    fn test_auth_state_display() {
        assert_eq!(AuthState::Anonymous.to_string(), "anonymous");
        assert_eq!(
            AuthState::AwaitingProviderCallback.to_string(),
            "awaiting_provider_callback"
        );
        assert_eq!(AuthState::Rejected.to_string(), "rejected");
    }
}
