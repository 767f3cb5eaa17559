//! Argon2id password hashing and verification
//!
//! Hashes are stored as PHC strings (`$argon2id$v=19$m=...,t=...,p=...$salt$hash`),
//! so the parameters travel with each hash and older hashes keep verifying after
//! the configured cost changes.

use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString,
    },
    Algorithm, Argon2, Params, Version,
};
use log::warn;

use crate::error::AuthError;
use crate::settings::PasswordSettings;
use crate::store::UserRecord;

/// A user whose password has just been checked against the stored hash
///
/// Only [`PasswordHasher::authenticate`] constructs this type.
#[derive(Debug, Clone)]
pub struct PasswordVerifiedUser(UserRecord);

impl PasswordVerifiedUser {
    #[must_use]
    pub fn user(&self) -> &UserRecord {
        &self.0
    }
}

#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
    /// Verified against when the email is unknown so both failure paths cost the same
    dummy_hash: Option<String>,
}

impl PasswordHasher {
    /// Build a hasher with the configured Argon2id cost
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the cost parameters are out of range
    pub fn new(settings: &PasswordSettings) -> Result<Self, AuthError> {
        let params = Params::new(
            settings.memory_kib,
            settings.iterations,
            settings.parallelism,
            None,
        )
        .map_err(|e| AuthError::Configuration(format!("invalid Argon2 parameters: {e}")))?;

        let mut hasher = Self {
            params,
            dummy_hash: None,
        };
        hasher.dummy_hash = Some(hasher.hash("aurora-gate timing equalizer")?);
        Ok(hasher)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a plaintext password with a fresh random salt
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if hashing fails
    pub fn hash(&self, plaintext: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::Configuration(format!("password hashing failed: {e}")))
    }

    /// Check a plaintext password against a stored PHC hash
    ///
    /// A malformed stored hash yields `false`; the condition is logged but never
    /// reported to the caller.
    #[must_use]
    pub fn verify(&self, plaintext: &str, stored_hash: &str) -> bool {
        match self.verify_detailed(plaintext, stored_hash) {
            Ok(matches) => matches,
            Err(e) => {
                warn!("Password verification skipped: {e}");
                false
            }
        }
    }

    /// Like [`Self::verify`] but distinguishes an unparseable stored hash
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidStoredHash` if `stored_hash` is not a valid PHC string
    pub fn verify_detailed(&self, plaintext: &str, stored_hash: &str) -> Result<bool, AuthError> {
        let parsed = PasswordHash::new(stored_hash).map_err(|_| AuthError::InvalidStoredHash)?;
        Ok(self
            .argon2()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok())
    }

    /// Check `plaintext` against the user's stored hash
    ///
    /// Accounts without a password (provider-only sign-ups) still pay for one
    /// verification so they are indistinguishable from a wrong password.
    #[must_use]
    pub fn authenticate(&self, user: UserRecord, plaintext: &str) -> Option<PasswordVerifiedUser> {
        let Some(stored_hash) = user.hashed_password.as_deref() else {
            self.verify_dummy(plaintext);
            return None;
        };

        if self.verify(plaintext, stored_hash) {
            Some(PasswordVerifiedUser(user))
        } else {
            None
        }
    }

    /// Burn one verification for an account that does not exist
    pub fn verify_dummy(&self, plaintext: &str) {
        if let Some(dummy) = &self.dummy_hash {
            let _ = self.verify(plaintext, dummy);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap_hasher() -> PasswordHasher {
        PasswordHasher::new(&PasswordSettings {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap()
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = cheap_hasher();
        let hash = hasher.hash("correct horse battery staple").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("correct horse battery staple", &hash));
        assert!(!hasher.verify("correct horse battery stapler", &hash));
    }

    #[test]
    fn test_hash_uses_random_salt() {
        let hasher = cheap_hasher();
        let first = hasher.hash("same password").unwrap();
        let second = hasher.hash("same password").unwrap();
        assert_ne!(first, second);
        assert!(hasher.verify("same password", &first));
        assert!(hasher.verify("same password", &second));
    }

    #[test]
    fn test_malformed_hash_returns_false() {
        let hasher = cheap_hasher();
        assert!(!hasher.verify("anything", "not-a-phc-string"));
        assert!(!hasher.verify("anything", ""));
        assert!(matches!(
            hasher.verify_detailed("anything", "$argon2id$broken"),
            Err(AuthError::InvalidStoredHash)
        ));
    }

    #[test]
    fn test_verifies_hash_with_default_parameters() {
        // Hashes written with the crate defaults must verify under a cheaper config
        let default_hasher = PasswordHasher::new(&PasswordSettings::default()).unwrap();
        let hash = default_hasher.hash("s3cret").unwrap();
        assert!(cheap_hasher().verify("s3cret", &hash));
    }

    #[test]
    fn test_authenticate() {
        let hasher = cheap_hasher();
        let user = UserRecord {
            id: uuid::Uuid::new_v4(),
            email: "ada@example.com".to_string(),
            name: Some("Ada".to_string()),
            photo_url: None,
            provider: Some("local".to_string()),
            provider_id: None,
            hashed_password: Some(hasher.hash("pa55word").unwrap()),
        };

        let verified = hasher.authenticate(user.clone(), "pa55word").unwrap();
        assert_eq!(verified.user().email, "ada@example.com");
        assert!(hasher.authenticate(user.clone(), "wrong").is_none());

        let provider_only = UserRecord {
            hashed_password: None,
            ..user
        };
        assert!(hasher.authenticate(provider_only, "pa55word").is_none());
    }

    #[test]
    fn test_invalid_parameters() {
        let result = PasswordHasher::new(&PasswordSettings {
            memory_kib: 1,
            iterations: 0,
            parallelism: 1,
        });
        assert!(matches!(result, Err(AuthError::Configuration(_))));
    }
}
