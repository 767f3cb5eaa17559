// Centralized logging for the login flows
//
// Token values, codes and secrets never reach these functions; only presence
// flags and lengths do.
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};

use crate::error::AuthError;
use crate::flow::AuthState;
use crate::oauth::OAuthCallback;

pub struct LoggingHelper;

impl LoggingHelper {
    /// Log provider initialization status
    pub fn log_provider_init(provider_name: &str, display_name: &str, configured: bool) {
        if configured {
            info!("✅ {display_name} sign-in configured ({provider_name})");
        } else {
            info!("❌ {display_name} sign-in not configured - missing client credentials");
        }
    }

    /// Log OAuth URL building
    pub fn log_oauth_url_built(
        provider: &str,
        scopes: &[String],
        extra_params: &BTreeMap<String, String>,
    ) {
        info!(
            "🔍 Built {provider} authorization URL with scopes: {} and extra params: {extra_params:?}",
            scopes.join(" ")
        );
    }

    /// Log token exchange start
    pub fn log_token_exchange_start(provider: &str) {
        info!("🔄 Exchanging authorization code for tokens with {provider}");
    }

    /// Log token exchange summary
    pub fn log_token_exchange_summary(
        provider: &str,
        id_token_present: bool,
        refresh_token_present: bool,
        token_type: Option<&str>,
        scope: Option<&str>,
    ) {
        info!(
            "🔍 Token exchange summary for {provider}: id_token={}, refresh_token={}, token_type={}, scope={scope:?}",
            presence(id_token_present),
            presence(refresh_token_present),
            token_type.unwrap_or("unspecified"),
        );
    }

    /// Log OAuth callback details without echoing the code or state values
    pub fn log_callback_debug(req: &actix_web::HttpRequest, callback: &OAuthCallback) {
        debug!(
            "OAuth callback received via {}: code={}, state={}, error={:?}",
            req.method(),
            presence(callback.code.is_some()),
            presence(callback.state.is_some()),
            callback.error,
        );
    }

    /// Log a move through the login state machine
    pub fn log_state_transition(from: AuthState, to: AuthState) {
        debug!("Login state: {from} -> {to}");
    }

    /// Log a rejected login with its reason code
    ///
    /// Configuration faults are logged at error level; everything a user or the
    /// provider can cause is a warning.
    pub fn log_rejection(flow: &str, err: &AuthError) {
        if err.is_configuration_fault() {
            error!("{flow} login rejected [{}]: {err}", err.reason_code());
        } else {
            warn!("{flow} login rejected [{}]: {err}", err.reason_code());
        }
    }

    /// Log session creation success
    pub fn log_session_established(method: &str, expires_at: DateTime<Utc>) {
        info!("Session established via {method}, expires at {expires_at}");
    }
}

fn presence(present: bool) -> &'static str {
    if present {
        "present"
    } else {
        "missing"
    }
}
