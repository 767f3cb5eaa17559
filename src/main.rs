#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use actix_web::{middleware::Logger, web, App, HttpServer};
use aurora_gate::{configure_services, settings::CALLBACK_PATH, AuroraSettings, AuthController};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load configuration from Settings.toml and environment variables
    // This also loads .env file and initializes the logger
    let settings = AuroraSettings::load()
        .map_err(|e| std::io::Error::other(format!("Failed to load settings: {e}")))?;

    let controller = AuthController::from_settings(&settings)
        .await
        .map_err(|e| std::io::Error::other(format!("Failed to initialize authentication: {e}")))?;

    start_server(controller, &settings).await
}

/// Start the HTTP server
///
/// # Errors
///
/// Returns an error if:
/// - Server binding fails
/// - Server fails to start
async fn start_server(controller: AuthController, settings: &AuroraSettings) -> std::io::Result<()> {
    let bind_address = settings.get_bind_address();
    print_startup_info(&bind_address, settings, controller.google_enabled());

    let controller = web::Data::new(controller);

    HttpServer::new(move || {
        App::new()
            .app_data(controller.clone())
            .wrap(Logger::default())
            .configure(configure_services)
    })
    .bind(&bind_address)?
    .run()
    .await
}

fn print_startup_info(bind_address: &str, settings: &AuroraSettings, google_enabled: bool) {
    println!("Starting aurora-gate on http://{bind_address}");
    println!("Session Backend: stateless sealed cookies");
    println!();
    println!("Endpoints:");
    println!("  GET  /                          - Login page");
    if google_enabled {
        println!("  GET  /api/authentication/login  - Sign in with Google");
        println!("  GET  {CALLBACK_PATH} - Provider callback");
    }
    println!("  POST /login/email               - Email/password sign-in");
    println!("  GET  /welcome                   - Landing page");
    println!("  POST /logout                    - Clear session");
    println!("  GET  /ping                      - Health check");
    println!();
    if google_enabled {
        println!("OAuth callback URL for the identity provider:");
        println!("  {}", settings.callback_url());
    }
}
