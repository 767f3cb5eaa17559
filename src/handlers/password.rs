// Email/password sign-in handler
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, Result};
use log::error;
use serde::Deserialize;

use super::pages::{render_login_page, INVALID_CREDENTIALS_MESSAGE};
use crate::error::AuthError;
use crate::flow::AuthController;
use crate::utils::responses::ResponseBuilder;

/// Shown when the credential store cannot be reached
pub const SIGN_IN_UNAVAILABLE_MESSAGE: &str =
    "Sign-in is temporarily unavailable. Please try again shortly.";

#[derive(Deserialize)]
pub struct EmailLoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Check the submitted credentials and start a session
///
/// A rejected login re-renders the login page with status 200 and the same
/// message whether the email is unknown or the password is wrong.
///
/// # Errors
/// Infallible; failures are rendered as responses
pub async fn email_login(
    form: web::Form<EmailLoginForm>,
    controller: web::Data<AuthController>,
) -> Result<HttpResponse> {
    let form = form.into_inner();

    let verified = match controller.password_login(&form.email, &form.password).await {
        Ok(verified) => verified,
        Err(AuthError::InvalidCredentials) => {
            return Ok(ResponseBuilder::html(
                StatusCode::OK,
                render_login_page(&controller, Some(INVALID_CREDENTIALS_MESSAGE)),
            ));
        }
        Err(_) => {
            return Ok(ResponseBuilder::html(
                StatusCode::SERVICE_UNAVAILABLE,
                render_login_page(&controller, Some(SIGN_IN_UNAVAILABLE_MESSAGE)),
            ));
        }
    };

    match controller.sessions().establish_from_user(&verified) {
        Ok(cookie) => Ok(ResponseBuilder::redirect(controller.landing_path())
            .with_cookie(cookie)
            .build()),
        Err(e) => {
            error!("Cannot establish session after password login: {e}");
            Ok(ResponseBuilder::internal_server_error().build())
        }
    }
}
