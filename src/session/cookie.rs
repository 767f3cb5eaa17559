use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::HttpRequest;
use anyhow::Result;
use serde::{de::DeserializeOwned, Serialize};

use crate::utils::crypto::{decrypt_data, encrypt_data, ENCRYPTION_KEY_SIZE};

/// Cookie names used across the application
pub const COOKIE_NAME: &str = "aurora_session";
pub const OAUTH_STATE_COOKIE: &str = "aurora_oauth_state";

/// Options for cookie creation
pub struct CookieOptions {
    pub http_only: bool,
    pub same_site: SameSite,
    pub path: String,
    pub max_age: CookieDuration,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            http_only: true,
            same_site: SameSite::Lax,
            path: "/".to_string(),
            max_age: CookieDuration::hours(24),
        }
    }
}

/// Builds sealed cookies with a consistent set of attributes
///
/// `SameSite=Lax` is required for both cookies: the provider's redirect back to
/// the callback is a cross-site top-level navigation.
#[derive(Clone)]
pub struct CookieFactory {
    encryption_key: [u8; ENCRYPTION_KEY_SIZE],
    cookie_secure: bool,
}

impl CookieFactory {
    #[must_use]
    pub fn new(encryption_key: [u8; ENCRYPTION_KEY_SIZE], cookie_secure: bool) -> Self {
        Self {
            encryption_key,
            cookie_secure,
        }
    }

    /// Seal `data` into a cookie named `name`
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or encryption fails
    pub fn create_cookie<T: Serialize>(
        &self,
        name: &str,
        data: &T,
        options: CookieOptions,
    ) -> Result<Cookie<'static>> {
        let value = encrypt_data(data, &self.encryption_key)?;

        Ok(Cookie::build(name.to_owned(), value)
            .http_only(options.http_only)
            .secure(self.cookie_secure)
            .same_site(options.same_site)
            .path(options.path)
            .max_age(options.max_age)
            .finish())
    }

    /// Unseal the named cookie from a request
    ///
    /// Returns `None` when the cookie is absent. A present cookie that fails to
    /// decrypt or deserialize is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the cookie was tampered with, sealed under another
    /// key, or holds a different payload type
    pub fn read_cookie<T: DeserializeOwned>(
        &self,
        req: &HttpRequest,
        name: &str,
    ) -> Result<Option<T>> {
        match req.cookie(name) {
            Some(cookie) if !cookie.value().is_empty() => {
                decrypt_data(cookie.value(), &self.encryption_key).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// An already-expired cookie that makes the browser drop `name`
    #[must_use]
    pub fn create_expired_cookie(&self, name: &str) -> Cookie<'static> {
        create_expired_cookie(name, self.cookie_secure)
    }
}

/// Create an expired cookie to clear a specific cookie
#[must_use]
pub fn create_expired_cookie(name: &str, secure: bool) -> Cookie<'static> {
    Cookie::build(name.to_owned(), "")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(CookieDuration::seconds(-1))
        .finish()
}
