//! Session Manager - stateless sealed session handling
//!
//! The `SessionManager` is the only place sessions are created or read. A
//! session can be established from a [`VerifiedIdentity`] (produced by the
//! identity-token verifier) or a [`PasswordVerifiedUser`] (produced by the
//! password hasher); there is no constructor taking raw claims.

use actix_web::cookie::{time::Duration as CookieDuration, Cookie};
use actix_web::HttpRequest;
use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use serde::Serialize;

use super::cookie::{CookieFactory, CookieOptions, COOKIE_NAME, OAUTH_STATE_COOKIE};
use super::{LoginMethod, PendingLogin, SessionIdentity};
use crate::error::AuthError;
use crate::oauth::VerifiedIdentity;
use crate::password::PasswordVerifiedUser;
use crate::settings::AuroraSettings;
use crate::utils::crypto::derive_encryption_key;
use crate::utils::logging::LoggingHelper;

/// Longest session a login can establish (one year)
pub const MAX_SESSION_DURATION_HOURS: u64 = 24 * 365;

/// Longest a provider round trip may take before its `state` goes stale
pub const MAX_LOGIN_STATE_MINUTES: u64 = 60;

/// Session Manager for stateless encrypted session handling
#[derive(Clone)]
pub struct SessionManager {
    cookie_factory: CookieFactory,
    session_duration: Duration,
    login_state_max_age: Duration,
}

impl SessionManager {
    #[must_use]
    pub fn new(
        secret: &[u8],
        cookie_secure: bool,
        session_duration_hours: u64,
        login_state_minutes: u64,
    ) -> Self {
        let encryption_key = derive_encryption_key(secret);
        let session_hours = capped(
            "session_duration_hours",
            session_duration_hours,
            MAX_SESSION_DURATION_HOURS,
        );
        let state_minutes = capped(
            "login_state_minutes",
            login_state_minutes,
            MAX_LOGIN_STATE_MINUTES,
        );
        Self {
            cookie_factory: CookieFactory::new(encryption_key, cookie_secure),
            session_duration: Duration::hours(session_hours),
            login_state_max_age: Duration::minutes(state_minutes),
        }
    }

    #[must_use]
    pub fn from_settings(settings: &AuroraSettings) -> Self {
        Self::new(
            settings.session.session_secret.as_bytes(),
            settings.cookies.secure,
            settings.session.session_duration_hours,
            settings.session.login_state_minutes,
        )
    }

    // =========================================================================
    // Establishing sessions
    // =========================================================================

    /// Seal a session for a user who signed in with the identity provider
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the session cannot be sealed
    pub fn establish_from_identity(
        &self,
        identity: &VerifiedIdentity,
    ) -> Result<Cookie<'static>, AuthError> {
        let now = Utc::now();
        let session = SessionIdentity {
            subject: identity.subject().to_string(),
            display_name: identity.display_name().to_string(),
            email: identity.email().map(ToString::to_string),
            method: LoginMethod::Google,
            issued_at: now,
            expires_at: self.expiry_from(now)?,
        };
        self.seal(&session)
    }

    /// Seal a session for a user whose password was just verified
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the session cannot be sealed
    pub fn establish_from_user(
        &self,
        verified: &PasswordVerifiedUser,
    ) -> Result<Cookie<'static>, AuthError> {
        let user = verified.user();
        let now = Utc::now();
        let session = SessionIdentity {
            subject: user.id.to_string(),
            display_name: user.display_name().to_string(),
            email: Some(user.email.clone()),
            method: LoginMethod::Password,
            issued_at: now,
            expires_at: self.expiry_from(now)?,
        };
        self.seal(&session)
    }

    fn expiry_from(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, AuthError> {
        now.checked_add_signed(self.session_duration).ok_or_else(|| {
            AuthError::Configuration("session expiry is out of range".to_string())
        })
    }

    /// Seal an arbitrary session; callers outside this module go through the
    /// `establish_*` constructors
    pub(crate) fn seal(&self, session: &SessionIdentity) -> Result<Cookie<'static>, AuthError> {
        let cookie = self.sealed_cookie(COOKIE_NAME, session, self.session_duration)?;
        LoggingHelper::log_session_established(session.method.as_str(), session.expires_at);
        Ok(cookie)
    }

    fn sealed_cookie<T: Serialize>(
        &self,
        name: &str,
        data: &T,
        lifetime: Duration,
    ) -> Result<Cookie<'static>, AuthError> {
        let options = CookieOptions {
            max_age: CookieDuration::seconds(lifetime.num_seconds()),
            ..Default::default()
        };
        self.cookie_factory
            .create_cookie(name, data, options)
            .map_err(|e| AuthError::Configuration(format!("failed to seal {name} cookie: {e}")))
    }

    // =========================================================================
    // Reading sessions
    // =========================================================================

    /// The session carried by the request, if it is present, intact and unexpired
    ///
    /// Tampered, foreign-key and expired cookies all read as no session.
    #[must_use]
    pub fn read(&self, req: &HttpRequest) -> Option<SessionIdentity> {
        let session: SessionIdentity = match self.cookie_factory.read_cookie(req, COOKIE_NAME) {
            Ok(Some(session)) => session,
            Ok(None) => return None,
            Err(e) => {
                debug!("Ignoring unreadable session cookie: {e}");
                return None;
            }
        };

        if session.is_expired(Utc::now()) {
            debug!("Ignoring session that expired at {}", session.expires_at);
            return None;
        }
        Some(session)
    }

    /// Cookie that removes the session (logout)
    #[must_use]
    pub fn clear(&self) -> Cookie<'static> {
        self.cookie_factory.create_expired_cookie(COOKIE_NAME)
    }

    // =========================================================================
    // Provider round trip state
    // =========================================================================

    /// Seal `state` and `nonce` for the duration of one provider round trip
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the cookie cannot be sealed
    pub fn pending_login_cookie(
        &self,
        pending: &PendingLogin,
    ) -> Result<Cookie<'static>, AuthError> {
        self.sealed_cookie(OAUTH_STATE_COOKIE, pending, self.login_state_max_age)
    }

    /// The pending login stored by [`Self::pending_login_cookie`], if still fresh
    #[must_use]
    pub fn take_pending_login(&self, req: &HttpRequest) -> Option<PendingLogin> {
        let pending: PendingLogin = match self.cookie_factory.read_cookie(req, OAUTH_STATE_COOKIE) {
            Ok(Some(pending)) => pending,
            Ok(None) => {
                debug!("No pending login cookie on callback");
                return None;
            }
            Err(e) => {
                debug!("Ignoring unreadable pending login cookie: {e}");
                return None;
            }
        };

        if pending.is_expired(Utc::now(), self.login_state_max_age) {
            debug!("Pending login from {} has expired", pending.created_at);
            return None;
        }
        Some(pending)
    }

    #[must_use]
    pub fn clear_pending_login(&self) -> Cookie<'static> {
        self.cookie_factory.create_expired_cookie(OAUTH_STATE_COOKIE)
    }

    #[must_use]
    pub fn session_duration(&self) -> Duration {
        self.session_duration
    }
}

/// Clamp a configured lifetime to `max`, warning when it had to be cut
fn capped(name: &str, value: u64, max: u64) -> i64 {
    if value > max {
        warn!("{name} = {value} exceeds the maximum of {max}; using {max}");
    }
    i64::try_from(value.min(max)).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::TestFixtures;
    use actix_web::test::TestRequest;

    fn request_with(cookie: Cookie<'static>) -> HttpRequest {
        TestRequest::default().cookie(cookie).to_http_request()
    }

    fn session(expires_in: Duration) -> SessionIdentity {
        let now = Utc::now();
        SessionIdentity {
            subject: "user-1".to_string(),
            display_name: "Ada".to_string(),
            email: Some("ada@example.com".to_string()),
            method: LoginMethod::Password,
            issued_at: now,
            expires_at: now + expires_in,
        }
    }

    #[test]
    fn test_password_session_round_trip() {
        let manager = TestFixtures::session_manager();
        let verified = TestFixtures::password_verified_user();

        let cookie = manager.establish_from_user(&verified).unwrap();
        assert_eq!(cookie.name(), COOKIE_NAME);
        assert_eq!(cookie.http_only(), Some(true));

        let read = manager.read(&request_with(cookie)).unwrap();
        assert_eq!(read.display_name, verified.user().display_name());
        assert_eq!(read.email.as_deref(), Some(verified.user().email.as_str()));
        assert_eq!(read.method, LoginMethod::Password);
        assert!(read.expires_at > Utc::now());
    }

    #[test]
    fn test_oversized_lifetimes_are_capped() {
        let manager = SessionManager::new(b"secret", false, 10_000_000_000, u64::MAX);
        assert_eq!(
            manager.session_duration(),
            Duration::hours(i64::try_from(MAX_SESSION_DURATION_HOURS).unwrap())
        );

        let cookie = manager
            .establish_from_user(&TestFixtures::password_verified_user())
            .unwrap();
        let read = manager.read(&request_with(cookie)).unwrap();
        assert!(read.expires_at <= Utc::now() + Duration::days(366));

        let pending = manager.pending_login_cookie(&PendingLogin::generate()).unwrap();
        let max_minutes = i64::try_from(MAX_LOGIN_STATE_MINUTES).unwrap();
        assert_eq!(pending.max_age().unwrap().whole_minutes(), max_minutes);
    }

    #[test]
    fn test_tampered_cookie_reads_as_no_session() {
        let manager = TestFixtures::session_manager();
        let cookie = manager.seal(&session(Duration::hours(1))).unwrap();

        let mut value = cookie.value().to_string();
        let last = value.pop().unwrap();
        value.push(if last == 'A' { 'B' } else { 'A' });

        let tampered = Cookie::new(COOKIE_NAME, value);
        assert!(manager.read(&request_with(tampered)).is_none());

        let garbage = Cookie::new(COOKIE_NAME, "not-even-base64!");
        assert!(manager.read(&request_with(garbage)).is_none());
    }

    #[test]
    fn test_cookie_from_other_secret_reads_as_no_session() {
        let cookie = SessionManager::new(b"first-secret", false, 24, 10)
            .seal(&session(Duration::hours(1)))
            .unwrap();
        let other = SessionManager::new(b"second-secret", false, 24, 10);
        assert!(other.read(&request_with(cookie)).is_none());
    }

    #[test]
    fn test_expired_session_reads_as_no_session() {
        let manager = TestFixtures::session_manager();
        let cookie = manager.seal(&session(Duration::seconds(-5))).unwrap();
        assert!(manager.read(&request_with(cookie)).is_none());
    }

    #[test]
    fn test_missing_cookie() {
        let manager = TestFixtures::session_manager();
        assert!(manager
            .read(&TestRequest::default().to_http_request())
            .is_none());
    }

    #[test]
    fn test_clear() {
        let cookie = TestFixtures::session_manager().clear();
        assert_eq!(cookie.name(), COOKIE_NAME);
        assert_eq!(cookie.value(), "");
        assert!(cookie.max_age().unwrap().whole_seconds() < 0);
    }

    #[test]
    fn test_pending_login_round_trip() {
        let manager = TestFixtures::session_manager();
        let pending = PendingLogin::generate();

        let cookie = manager.pending_login_cookie(&pending).unwrap();
        assert_eq!(cookie.name(), OAUTH_STATE_COOKIE);
        assert_eq!(cookie.max_age().unwrap().whole_minutes(), 10);

        let taken = manager.take_pending_login(&request_with(cookie)).unwrap();
        assert_eq!(taken, pending);
    }

    #[test]
    fn test_stale_pending_login_is_ignored() {
        let manager = TestFixtures::session_manager();
        let mut pending = PendingLogin::generate();
        pending.created_at = Utc::now() - Duration::minutes(11);

        let cookie = manager.pending_login_cookie(&pending).unwrap();
        assert!(manager.take_pending_login(&request_with(cookie)).is_none());
    }

    #[test]
    fn test_session_cookie_is_not_a_pending_login() {
        let manager = TestFixtures::session_manager();
        let session_cookie = manager.seal(&session(Duration::hours(1))).unwrap();
        let misplaced = Cookie::new(OAUTH_STATE_COOKIE, session_cookie.value().to_string());
        assert!(manager.take_pending_login(&request_with(misplaced)).is_none());
    }
}
