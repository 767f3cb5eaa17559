//! Test fixtures providing pre-built test objects
//!
//! Settings here point every provider endpoint at a caller-supplied base URL
//! (normally a `wiremock` server) and use cheap Argon2 parameters.

use std::sync::{Arc, OnceLock};

use actix_web::cookie::Cookie;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::flow::AuthController;
use crate::oauth::{JwtValidator, OAuthClient};
use crate::password::{PasswordHasher, PasswordVerifiedUser};
use crate::session::{LoginMethod, SessionIdentity, SessionManager};
use crate::settings::{AuroraSettings, PasswordSettings};
use crate::store::{InMemoryUserStore, UserRecord};

/// Central fixture provider for all test data
pub struct TestFixtures;

impl TestFixtures {
    pub const CLIENT_ID: &'static str = "test-client.apps.googleusercontent.com";
    pub const CLIENT_SECRET: &'static str = "test-client-secret";
    pub const SESSION_SECRET: &'static str = "test-session-secret-0123456789abcdef";

    pub const PASSWORD_USER_EMAIL: &'static str = "grace@example.com";
    pub const PASSWORD_USER_NAME: &'static str = "Grace Hopper";
    pub const PASSWORD: &'static str = "correct horse battery staple";
    /// An account created through Google sign-in, with no password hash
    pub const PROVIDER_ONLY_EMAIL: &'static str = "ada@example.com";

    /// Settings whose provider endpoints live under `base_url`
    #[must_use]
    pub fn settings_for_provider(base_url: &str) -> AuroraSettings {
        let mut settings = AuroraSettings::default();
        let base_url = base_url.trim_end_matches('/');

        settings.provider.authorization_endpoint = format!("{base_url}/o/oauth2/auth");
        settings.provider.token_endpoint = format!("{base_url}/token");
        settings.provider.jwks_uri = format!("{base_url}/certs");
        settings.provider.client_id = Some(Self::CLIENT_ID.to_string());
        settings.provider.client_secret = Some(Self::CLIENT_SECRET.to_string());
        settings.provider.client_id_env = None;
        settings.provider.client_secret_env = None;

        settings.session.session_secret = Self::SESSION_SECRET.to_string();
        settings.cookies.secure = false;
        settings.password = Self::cheap_password_settings();
        settings
    }

    fn cheap_password_settings() -> PasswordSettings {
        PasswordSettings {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    #[must_use]
    pub fn http_client() -> reqwest::Client {
        reqwest::Client::new()
    }

    /// Create a session manager with the fixed test secret
    #[must_use]
    pub fn session_manager() -> SessionManager {
        SessionManager::new(Self::SESSION_SECRET.as_bytes(), false, 24, 10)
    }

    /// # Panics
    ///
    /// Never with the fixed parameters used here
    #[must_use]
    pub fn password_hasher() -> PasswordHasher {
        PasswordHasher::new(&Self::cheap_password_settings())
            .expect("cheap Argon2 parameters are valid")
    }

    /// A user who signs in with [`Self::PASSWORD`]
    ///
    /// # Panics
    ///
    /// Never with the fixed parameters used here
    #[must_use]
    pub fn password_user() -> UserRecord {
        static HASH: OnceLock<String> = OnceLock::new();
        let hash = HASH.get_or_init(|| {
            Self::password_hasher()
                .hash(Self::PASSWORD)
                .expect("hashing with cheap parameters succeeds")
        });

        UserRecord {
            id: Uuid::from_u128(0x5eed_0000_0000_4000_8000_0000_0000_0001),
            email: Self::PASSWORD_USER_EMAIL.to_string(),
            name: Some(Self::PASSWORD_USER_NAME.to_string()),
            photo_url: None,
            provider: Some("local".to_string()),
            provider_id: None,
            hashed_password: Some(hash.clone()),
        }
    }

    #[must_use]
    pub fn provider_only_user() -> UserRecord {
        UserRecord {
            id: Uuid::from_u128(0x5eed_0000_0000_4000_8000_0000_0000_0002),
            email: Self::PROVIDER_ONLY_EMAIL.to_string(),
            name: Some("Ada Lovelace".to_string()),
            photo_url: Some("https://example.com/ada.png".to_string()),
            provider: Some("google".to_string()),
            provider_id: Some("110169484474386276334".to_string()),
            hashed_password: None,
        }
    }

    /// # Panics
    ///
    /// Never; the fixture password always matches the fixture user
    #[must_use]
    pub fn password_verified_user() -> PasswordVerifiedUser {
        Self::password_hasher()
            .authenticate(Self::password_user(), Self::PASSWORD)
            .expect("fixture password matches fixture user")
    }

    #[must_use]
    pub fn user_store() -> InMemoryUserStore {
        InMemoryUserStore::new()
            .with_user(Self::password_user())
            .with_user(Self::provider_only_user())
    }

    /// Controller with password sign-in only
    #[must_use]
    pub fn password_only_controller() -> AuthController {
        AuthController::new(
            Self::session_manager(),
            Self::password_hasher(),
            Arc::new(Self::user_store()),
            "/welcome",
        )
    }

    /// Controller with both flows, Google endpoints under `base_url`
    ///
    /// # Panics
    ///
    /// Never; the fixture settings always carry client credentials
    #[must_use]
    pub fn controller_for(base_url: &str) -> AuthController {
        let settings = Self::settings_for_provider(base_url);
        let client = OAuthClient::from_settings(&settings, Self::http_client())
            .expect("fixture settings carry client credentials");
        let validator = JwtValidator::new(
            Self::http_client(),
            &settings.provider,
            settings.jwt_validation.clone(),
        );
        Self::password_only_controller().with_google(client, validator)
    }

    /// Token endpoint success body carrying `id_token`
    #[must_use]
    pub fn token_response(id_token: &str) -> Value {
        json!({
            "access_token": "ya29.test-access-token",
            "expires_in": 3599,
            "scope": "openid https://www.googleapis.com/auth/userinfo.email https://www.googleapis.com/auth/userinfo.profile",
            "token_type": "Bearer",
            "id_token": id_token,
        })
    }

    /// A correctly sealed session cookie that expired a minute ago
    ///
    /// # Panics
    ///
    /// Never; sealing only fails for malformed keys
    #[must_use]
    pub fn expired_session_cookie(manager: &SessionManager) -> Cookie<'static> {
        let now = Utc::now();
        let session = SessionIdentity {
            subject: "expired-user".to_string(),
            display_name: "Expired User".to_string(),
            email: None,
            method: LoginMethod::Password,
            issued_at: now - Duration::hours(25),
            expires_at: now - Duration::minutes(1),
        };
        manager.seal(&session).expect("test session seals")
    }
}
