//! HTTP response handling system
//!
//! A unified interface for the JSON errors, redirects and HTML pages the
//! gateway returns. Rejected-login bodies are pre-serialized once, since every
//! rejection of a category returns the same bytes.

use actix_web::{cookie::Cookie, http::header, http::StatusCode, HttpResponse};
use serde_json::{json, Value};

use crate::error::{AuthError, GENERIC_LOGIN_FAILURE};

// ===============================
// CACHED RESPONSES
// ===============================

static CACHED_RESPONSES: std::sync::LazyLock<CachedResponses> =
    std::sync::LazyLock::new(CachedResponses::new);

/// Pre-serialized rejection bodies, one per client-facing category
struct CachedResponses {
    invalid_request: String,
    authentication_failed: String,
    provider_unavailable: String,
    server_error: String,
}

impl CachedResponses {
    fn new() -> Self {
        Self {
            invalid_request: Self::create_json("invalid_request", GENERIC_LOGIN_FAILURE),
            authentication_failed: Self::create_json("authentication_failed", GENERIC_LOGIN_FAILURE),
            provider_unavailable: Self::create_json("provider_unavailable", GENERIC_LOGIN_FAILURE),
            server_error: Self::create_json("server_error", GENERIC_LOGIN_FAILURE),
        }
    }

    fn create_json(error: &str, message: &str) -> String {
        json!({
            "error": error,
            "message": message,
        })
        .to_string()
    }

    fn body_for(&self, category: &str) -> &str {
        match category {
            "invalid_request" => &self.invalid_request,
            "authentication_failed" => &self.authentication_failed,
            "provider_unavailable" => &self.provider_unavailable,
            _ => &self.server_error,
        }
    }
}

/// Unified response builder that handles all types of HTTP responses
pub struct ResponseBuilder;

impl ResponseBuilder {
    // ===============================
    // ERROR RESPONSE METHODS
    // ===============================

    /// Create an `InternalServerError` (500) error response with optional customization
    #[must_use]
    pub fn internal_server_error() -> ErrorResponseBuilder {
        ErrorResponseBuilder::new(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Create a `ServiceUnavailable` (503) error response with optional customization
    #[must_use]
    pub fn service_unavailable() -> ErrorResponseBuilder {
        ErrorResponseBuilder::new(StatusCode::SERVICE_UNAVAILABLE)
    }

    /// The 400 returned for any failed provider callback
    ///
    /// Only the error's category reaches the client; the reason code stays in
    /// the server log.
    #[must_use]
    pub fn login_rejected(err: &AuthError) -> HttpResponse {
        HttpResponse::BadRequest()
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .insert_header((header::CACHE_CONTROL, "no-store"))
            .body(
                CACHED_RESPONSES
                    .body_for(err.client_category())
                    .to_string(),
            )
    }

    // ===============================
    // REDIRECT AND PAGE METHODS
    // ===============================

    /// Create a 302 redirect
    #[must_use]
    pub fn redirect(location: &str) -> RedirectBuilder {
        RedirectBuilder::new(location)
    }

    /// HTML page with the given status
    #[must_use]
    pub fn html(status: StatusCode, body: String) -> HttpResponse {
        HttpResponse::build(status)
            .insert_header((header::CONTENT_TYPE, "text/html; charset=utf-8"))
            .insert_header((header::CACHE_CONTROL, "no-store"))
            .body(body)
    }

    /// Create a 200 JSON response builder
    #[must_use]
    pub fn ok() -> JsonResponseBuilder {
        JsonResponseBuilder::new(StatusCode::OK)
    }
}

// ===============================
// BUILDER TYPES
// ===============================

/// Builder for error responses with fluent interface
pub struct ErrorResponseBuilder {
    status: StatusCode,
    error_code: Option<String>,
    message: Option<String>,
}

/// Builder for redirect responses
pub struct RedirectBuilder {
    location: String,
    cookies: Vec<Cookie<'static>>,
}

/// Builder for JSON responses
pub struct JsonResponseBuilder {
    status: StatusCode,
}

impl ErrorResponseBuilder {
    fn new(status: StatusCode) -> Self {
        Self {
            status,
            error_code: None,
            message: None,
        }
    }

    /// Set a custom error code (e.g., "`invalid_request`")
    #[must_use]
    pub fn with_error_code(mut self, code: &str) -> Self {
        self.error_code = Some(code.to_string());
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    #[must_use]
    pub fn build(self) -> HttpResponse {
        let error_code = self
            .error_code
            .unwrap_or_else(|| default_error_code(self.status).to_string());
        let message = self
            .message
            .unwrap_or_else(|| default_message(self.status).to_string());

        HttpResponse::build(self.status).json(json!({
            "error": error_code,
            "message": message,
        }))
    }
}

fn default_error_code(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "invalid_request",
        StatusCode::SERVICE_UNAVAILABLE => "service_unavailable",
        _ => "server_error",
    }
}

fn default_message(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "The request is malformed or invalid",
        StatusCode::SERVICE_UNAVAILABLE => "The service is temporarily unavailable",
        _ => "An internal server error occurred",
    }
}

impl RedirectBuilder {
    fn new(location: &str) -> Self {
        Self {
            location: location.to_string(),
            cookies: Vec::new(),
        }
    }

    /// Add a cookie to the redirect response
    #[must_use]
    pub fn with_cookie(mut self, cookie: Cookie<'static>) -> Self {
        self.cookies.push(cookie);
        self
    }

    #[must_use]
    pub fn build(self) -> HttpResponse {
        let mut builder = HttpResponse::Found();
        for cookie in self.cookies {
            builder.cookie(cookie);
        }
        builder
            .insert_header((header::LOCATION, self.location))
            .insert_header((header::CACHE_CONTROL, "no-store"))
            .finish()
    }
}

impl JsonResponseBuilder {
    fn new(status: StatusCode) -> Self {
        Self { status }
    }

    #[must_use]
    pub fn json(self, data: &Value) -> HttpResponse {
        HttpResponse::build(self.status).json(data)
    }
}
