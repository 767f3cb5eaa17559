// HTTP request handlers for the login flows
pub mod auth;
pub mod pages;
pub mod password;

use actix_web::web;

use crate::settings::CALLBACK_PATH;

// Re-export the main handler functions
pub use auth::{google_callback, google_login, logout};
pub use pages::{health, login_page, welcome};
pub use password::email_login;

/// Register every route of the gateway
pub fn configure_services(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(login_page))
        .route("/api/authentication/login", web::get().to(google_login))
        .route(CALLBACK_PATH, web::get().to(google_callback))
        .route("/login/email", web::post().to(email_login))
        .route("/welcome", web::get().to(welcome))
        .route("/logout", web::post().to(logout))
        .route("/ping", web::get().to(health));
}
