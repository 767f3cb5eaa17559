#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the aurora-gate application
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod error;
pub mod flow;
pub mod handlers;
pub mod oauth;
pub mod password;
pub mod session;
pub mod settings;
pub mod store;
pub mod utils;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use error::{AuthError, TokenRejection};
pub use flow::{AuthController, AuthState};
pub use handlers::configure_services;
pub use oauth::{JwtValidator, OAuthClient, VerifiedIdentity};
pub use password::PasswordHasher;
pub use session::{SessionIdentity, SessionManager};
pub use settings::AuroraSettings;
