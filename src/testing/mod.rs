//! Testing utilities shared by unit and integration tests
//!
//! Compiled for `cfg(test)` and behind the `testing` feature for the
//! integration tests under `tests/`.
//!
//! - [`fixtures`] - Settings, users, controllers and session managers
//! - [`keys`] - Fixed RSA/EC signing keys, a JWKS and an identity-token builder
//!
//! ```rust,ignore
//! use aurora_gate::testing::{TestFixtures, TokenBuilder};
//!
//! let controller = TestFixtures::controller_for(&mock_server.uri());
//! let id_token = TokenBuilder::new().with_audience("someone-else").build_rs256();
//! ```

pub mod fixtures;
pub mod keys;

pub use fixtures::TestFixtures;
pub use keys::{TestKeys, TokenBuilder};
