// Provider sign-in, callback and sign-out handlers
use actix_web::{web, HttpRequest, HttpResponse, Result};
use log::error;

use crate::flow::AuthController;
use crate::oauth::OAuthCallback;
use crate::utils::logging::LoggingHelper;
use crate::utils::responses::ResponseBuilder;

/// Redirect to the provider with a fresh `state` and `nonce`
///
/// # Errors
/// Infallible; failures are rendered as responses
pub async fn google_login(controller: web::Data<AuthController>) -> Result<HttpResponse> {
    let redirect = match controller.begin_login() {
        Ok(redirect) => redirect,
        Err(e) => {
            error!("Cannot start provider login: {e}");
            return Ok(ResponseBuilder::service_unavailable()
                .with_error_code("provider_not_configured")
                .with_message("Sign-in with this provider is not available")
                .build());
        }
    };

    let state_cookie = match controller.sessions().pending_login_cookie(&redirect.pending) {
        Ok(cookie) => cookie,
        Err(e) => {
            error!("Cannot store login state: {e}");
            return Ok(ResponseBuilder::internal_server_error().build());
        }
    };

    Ok(ResponseBuilder::redirect(&redirect.url)
        .with_cookie(state_cookie)
        .build())
}

/// Provider redirect target
///
/// # Errors
/// Infallible; every rejection becomes a 400 carrying only a generic category
pub async fn google_callback(
    req: HttpRequest,
    query: web::Query<OAuthCallback>,
    controller: web::Data<AuthController>,
) -> Result<HttpResponse> {
    let params = query.into_inner();
    LoggingHelper::log_callback_debug(&req, &params);

    let sessions = controller.sessions();
    let pending = sessions.take_pending_login(&req);

    let session_cookie = match controller
        .complete_callback(&params, pending.as_ref())
        .await
        .and_then(|identity| sessions.establish_from_identity(&identity))
    {
        Ok(cookie) => cookie,
        Err(e) => {
            let mut response = ResponseBuilder::login_rejected(&e);
            // The state is single use whatever the outcome
            response.add_cookie(&sessions.clear_pending_login())?;
            return Ok(response);
        }
    };

    Ok(ResponseBuilder::redirect(controller.landing_path())
        .with_cookie(session_cookie)
        .with_cookie(sessions.clear_pending_login())
        .build())
}

/// Clear the session and return to the login page
///
/// # Errors
/// Infallible; the `Result` matches the other handlers
pub async fn logout(controller: web::Data<AuthController>) -> Result<HttpResponse> {
    Ok(ResponseBuilder::redirect("/")
        .with_cookie(controller.sessions().clear())
        .build())
}
