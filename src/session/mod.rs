//! Session Management Module
//!
//! Sessions are stateless: the signed-in identity is sealed into an
//! AES-256-GCM cookie and checked on every read. Nothing is stored server-side.
//!
//! # Modules
//!
//! - [`manager`] - Establishing, reading and clearing sessions
//! - [`cookie`] - Cookie construction and sealing

pub mod cookie;
pub mod manager;

pub use cookie::{CookieFactory, CookieOptions, COOKIE_NAME, OAUTH_STATE_COOKIE};
pub use manager::SessionManager;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::crypto::{generate_csrf_token, generate_nonce};

/// How the session holder proved their identity
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoginMethod {
    Google,
    Password,
}

impl LoginMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Password => "password",
        }
    }
}

/// The identity carried inside a session cookie
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub subject: String,
    pub display_name: String,
    pub email: Option<String>,
    pub method: LoginMethod,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionIdentity {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// `state` and `nonce` issued for one provider round trip
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PendingLogin {
    pub state: String,
    pub nonce: String,
    pub created_at: DateTime<Utc>,
}

impl PendingLogin {
    #[must_use]
    pub fn generate() -> Self {
        Self {
            state: generate_csrf_token(),
            nonce: generate_nonce(32),
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now - self.created_at > max_age
    }
}

impl std::fmt::Debug for PendingLogin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingLogin")
            .field("state", &"[redacted]")
            .field("nonce", &"[redacted]")
            .field("created_at", &self.created_at)
            .finish()
    }
}
