// ID token validation with JWKS discovery and caching
// Supports RS256/ES256 signature verification and OIDC claims validation

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine as _;
use chrono::{DateTime, Duration, TimeZone, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use p256::ecdsa::{Signature as EcdsaSignature, VerifyingKey as EcdsaVerifyingKey};
use rsa::{pkcs1v15::VerifyingKey, RsaPublicKey};
use sha2::Sha256;

use super::provider_unavailable;
use crate::error::{AuthError, TokenRejection};
use crate::settings::{JwtValidationConfig, ProviderSettings};
use crate::utils::crypto::constant_time_eq;

// ============================================================================
// JWT Structures
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: Option<String>,
    pub kid: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct JwtClaims {
    pub iss: Option<String>,
    pub aud: Option<serde_json::Value>, // string or array
    pub azp: Option<String>,
    pub exp: Option<i64>,
    pub nbf: Option<i64>,
    pub iat: Option<i64>,
    pub sub: Option<String>,
    pub nonce: Option<String>,
    pub email: Option<String>,
    pub email_verified: Option<serde_json::Value>, // bool, or "true" from some issuers
    pub name: Option<String>,
    pub picture: Option<String>,
}

// ============================================================================
// Verified identity
// ============================================================================

/// Claims of an identity token that passed signature and claim validation
///
/// Only [`JwtValidator::verify`] constructs this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    subject: String,
    email: Option<String>,
    email_verified: bool,
    name: Option<String>,
    picture: Option<String>,
    issuer: String,
    audience: String,
    expires_at: DateTime<Utc>,
}

impl VerifiedIdentity {
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    #[must_use]
    pub fn email_verified(&self) -> bool {
        self.email_verified
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn picture(&self) -> Option<&str> {
        self.picture.as_deref()
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Display name, falling back to email and then subject
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .or(self.email.as_deref())
            .unwrap_or(&self.subject)
    }
}

// ============================================================================
// OIDC Discovery Document
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct OidcDiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    #[serde(default)]
    pub id_token_signing_alg_values_supported: Vec<String>,
}

/// Fetch the provider's OIDC discovery document
///
/// # Errors
///
/// Returns `ProviderUnavailable` if the document cannot be fetched or parsed
pub async fn fetch_discovery_document(
    http_client: &reqwest::Client,
    discovery_url: &str,
) -> Result<OidcDiscoveryDocument, AuthError> {
    debug!("Fetching OIDC discovery document from {discovery_url}");

    let response = http_client
        .get(discovery_url)
        .send()
        .await
        .map_err(|e| provider_unavailable("discovery fetch", &e))?;

    if !response.status().is_success() {
        return Err(AuthError::ProviderUnavailable(format!(
            "discovery request failed with status {}",
            response.status()
        )));
    }

    let document: OidcDiscoveryDocument = response.json().await.map_err(|e| {
        AuthError::ProviderUnavailable(format!("failed to parse discovery document: {e}"))
    })?;

    debug!("Discovery document fetched, JWKS URI: {}", document.jwks_uri);
    Ok(document)
}

// ============================================================================
// JWKS Structures
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonWebKeySet {
    pub keys: Vec<JsonWebKey>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonWebKey {
    pub kty: String,
    pub kid: Option<String>,
    pub alg: Option<String>,
    #[serde(rename = "use")]
    pub key_use: Option<String>,

    // RSA keys
    pub n: Option<String>,
    pub e: Option<String>,

    // EC keys
    pub crv: Option<String>,
    pub x: Option<String>,
    pub y: Option<String>,
}

/// An immutable snapshot of the provider's signing keys
#[derive(Debug, Default)]
pub struct KeySet {
    keys: HashMap<String, JsonWebKey>,
    unnamed: Vec<JsonWebKey>,
}

impl KeySet {
    #[must_use]
    pub fn from_jwks(jwks: JsonWebKeySet) -> Self {
        let mut set = Self::default();
        for key in jwks.keys {
            if key.key_use.as_deref().is_some_and(|u| u != "sig") {
                continue;
            }
            match key.kid.clone() {
                Some(kid) => {
                    set.keys.insert(kid, key);
                }
                None => set.unnamed.push(key),
            }
        }
        set
    }

    /// Find the key for a token header; a header without `kid` only matches a lone key
    #[must_use]
    pub fn find(&self, kid: Option<&str>) -> Option<&JsonWebKey> {
        match kid {
            Some(kid) => self.keys.get(kid),
            None if self.keys.len() + self.unnamed.len() == 1 => {
                self.keys.values().next().or_else(|| self.unnamed.first())
            }
            None => None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len() + self.unnamed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// JWKS Cache
// ============================================================================

/// Upper bound on how long a fetched key set is trusted, whatever the provider sends
pub const MAX_KEY_CACHE_SECONDS: u64 = 86_400;

/// Current key set plus refresh bookkeeping
///
/// The key set is replaced wholesale on refresh; readers hold their own `Arc`
/// and never observe a partially updated set.
pub struct JwksCache {
    keys: Option<Arc<KeySet>>,
    fetched_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
}

impl JwksCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            keys: None,
            fetched_at: None,
            expires_at: None,
        }
    }

    #[must_use]
    pub fn is_cache_valid(&self, now: DateTime<Utc>) -> bool {
        self.keys.is_some() && self.expires_at.is_some_and(|expires| now < expires)
    }

    #[must_use]
    pub fn current(&self) -> Option<Arc<KeySet>> {
        self.keys.clone()
    }

    /// True if the last fetch is at least `interval` old
    #[must_use]
    pub fn may_force_refresh(&self, now: DateTime<Utc>, interval: Duration) -> bool {
        match self.fetched_at {
            Some(fetched) => now - fetched >= interval,
            None => true,
        }
    }

    pub fn store_keys(&mut self, keys: KeySet, now: DateTime<Utc>, lifetime: Duration) {
        debug!("Cached {} signing keys", keys.len());
        self.keys = Some(Arc::new(keys));
        self.fetched_at = Some(now);
        self.expires_at = Some(
            now.checked_add_signed(lifetime)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        );
    }
}

impl Default for JwksCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `max-age` out of a Cache-Control header value
#[must_use]
pub fn parse_max_age(cache_control: &str) -> Option<u64> {
    cache_control.split(',').find_map(|directive| {
        let (name, value) = directive.trim().split_once('=')?;
        if name.trim().eq_ignore_ascii_case("max-age") {
            value.trim().trim_matches('"').parse().ok()
        } else {
            None
        }
    })
}

// ============================================================================
// JWT Validator
// ============================================================================

#[derive(Clone)]
pub struct JwtValidator {
    http_client: reqwest::Client,
    jwks_uri: String,
    issuers: Vec<String>,
    config: JwtValidationConfig,
    cache: Arc<RwLock<JwksCache>>,
    refresh_guard: Arc<Mutex<()>>,
}

enum Refresh {
    IfExpired,
    Forced,
}

impl JwtValidator {
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        provider: &ProviderSettings,
        config: JwtValidationConfig,
    ) -> Self {
        Self {
            http_client,
            jwks_uri: provider.jwks_uri.clone(),
            issuers: provider.issuers.clone(),
            config,
            cache: Arc::new(RwLock::new(JwksCache::new())),
            refresh_guard: Arc::new(Mutex::new(())),
        }
    }

    /// Take the JWKS URI and issuer from a discovery document
    pub fn apply_discovery(&mut self, document: &OidcDiscoveryDocument) {
        self.jwks_uri.clone_from(&document.jwks_uri);
        if !self.issuers.contains(&document.issuer) {
            self.issuers.push(document.issuer.clone());
        }
    }

    /// Populate the key cache ahead of the first login
    ///
    /// # Errors
    ///
    /// Returns `ProviderUnavailable` if the key set cannot be fetched
    pub async fn prefetch_keys(&self) -> Result<(), AuthError> {
        self.refresh_keys(Refresh::IfExpired).await.map(|_| ())
    }

    /// Verify an identity token and extract its claims
    ///
    /// Checks, in order: structure, algorithm, signing key, signature, issuer,
    /// audience, expiry, not-before, nonce. The first failing check decides the
    /// rejection reason.
    ///
    /// # Errors
    ///
    /// - `InvalidIdentityToken(reason)` if any check fails
    /// - `ProviderUnavailable` if the key set is needed but cannot be fetched
    pub async fn verify(
        &self,
        token: &str,
        expected_audience: &str,
        expected_nonce: Option<&str>,
    ) -> Result<VerifiedIdentity, AuthError> {
        let parts: Vec<&str> = token.split('.').collect();
        let [header_b64, claims_b64, signature_b64] = parts.as_slice() else {
            return Err(TokenRejection::Malformed.into());
        };

        let header: JwtHeader = decode_segment(header_b64)?;
        debug!("ID token header: alg={}, kid={:?}", header.alg, header.kid);

        if !matches!(header.alg.as_str(), "RS256" | "ES256") {
            return Err(TokenRejection::UnsupportedAlgorithm.into());
        }

        let key = self.key_for(header.kid.as_deref()).await?;

        let signature = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TokenRejection::Malformed)?;
        let signing_input = format!("{header_b64}.{claims_b64}");
        verify_signature(signing_input.as_bytes(), &signature, &header.alg, &key)?;
        debug!("ID token signature verified");

        let claims: JwtClaims = decode_segment(claims_b64)?;
        let identity = self.validate_claims(claims, expected_audience, expected_nonce)?;

        info!("ID token verified (issuer {})", identity.issuer);
        Ok(identity)
    }

    /// Resolve the signing key, refreshing the set once for an unknown `kid`
    async fn key_for(&self, kid: Option<&str>) -> Result<JsonWebKey, AuthError> {
        let keys = self.refresh_keys(Refresh::IfExpired).await?;
        if let Some(key) = keys.find(kid) {
            return Ok(key.clone());
        }

        debug!("Signing key {kid:?} not in cached set, refreshing");
        let keys = self.refresh_keys(Refresh::Forced).await?;
        keys.find(kid)
            .cloned()
            .ok_or_else(|| TokenRejection::UnknownKey.into())
    }

    /// Return the current key set, fetching a new one when required
    ///
    /// A forced refresh is skipped if the last fetch is younger than the minimum
    /// refresh interval. A failed fetch falls back to the stale set when one exists.
    async fn refresh_keys(&self, mode: Refresh) -> Result<Arc<KeySet>, AuthError> {
        let min_interval = duration_secs(self.config.min_refresh_interval_seconds);

        {
            let cache = self.cache.read().await;
            if let Some(keys) = Self::usable_keys(&cache, &mode, min_interval) {
                return Ok(keys);
            }
        }

        // One refresh at a time; late arrivals reuse the winner's result
        let _guard = self.refresh_guard.lock().await;
        {
            let cache = self.cache.read().await;
            if let Some(keys) = Self::usable_keys(&cache, &mode, min_interval) {
                return Ok(keys);
            }
        }

        match self.fetch_jwks().await {
            Ok((keys, lifetime)) => {
                let mut cache = self.cache.write().await;
                cache.store_keys(keys, Utc::now(), lifetime);
                cache
                    .current()
                    .ok_or_else(|| AuthError::ProviderUnavailable("empty key cache".to_string()))
            }
            Err(e) => {
                let cache = self.cache.read().await;
                match cache.current() {
                    Some(stale) => {
                        warn!("JWKS refresh failed, continuing with cached keys: {e}");
                        Ok(stale)
                    }
                    None => Err(e),
                }
            }
        }
    }

    fn usable_keys(
        cache: &JwksCache,
        mode: &Refresh,
        min_interval: Duration,
    ) -> Option<Arc<KeySet>> {
        let now = Utc::now();
        match mode {
            Refresh::IfExpired if cache.is_cache_valid(now) => cache.current(),
            Refresh::Forced if !cache.may_force_refresh(now, min_interval) => cache.current(),
            _ => None,
        }
    }

    async fn fetch_jwks(&self) -> Result<(KeySet, Duration), AuthError> {
        debug!("Fetching JWKS from {}", self.jwks_uri);

        let response = self
            .http_client
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| provider_unavailable("JWKS fetch", &e))?;

        if !response.status().is_success() {
            return Err(AuthError::ProviderUnavailable(format!(
                "JWKS request failed with status {}",
                response.status()
            )));
        }

        let max_age = response
            .headers()
            .get(reqwest::header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_max_age);

        let jwks: JsonWebKeySet = response
            .json()
            .await
            .map_err(|e| AuthError::ProviderUnavailable(format!("failed to parse JWKS: {e}")))?;

        let lifetime = duration_secs(
            max_age
                .unwrap_or(self.config.cache_duration_seconds)
                .min(MAX_KEY_CACHE_SECONDS),
        );
        let keys = KeySet::from_jwks(jwks);
        info!(
            "Fetched {} signing keys, cached for {}s",
            keys.len(),
            lifetime.num_seconds()
        );
        Ok((keys, lifetime))
    }

    fn validate_claims(
        &self,
        claims: JwtClaims,
        expected_audience: &str,
        expected_nonce: Option<&str>,
    ) -> Result<VerifiedIdentity, TokenRejection> {
        let now = Utc::now().timestamp();
        let skew = i64::try_from(self.config.clock_skew_seconds).unwrap_or(300);

        let issuer = claims.iss.ok_or(TokenRejection::MissingClaim)?;
        if !self.issuers.iter().any(|trusted| trusted == &issuer) {
            return Err(TokenRejection::Issuer);
        }

        let audiences = extract_audiences(claims.aud.as_ref());
        if !audiences.iter().any(|aud| aud == expected_audience) {
            return Err(TokenRejection::Audience);
        }
        if audiences.len() > 1 && claims.azp.as_deref() != Some(expected_audience) {
            return Err(TokenRejection::Audience);
        }

        let exp = claims.exp.ok_or(TokenRejection::MissingClaim)?;
        if now > exp.saturating_add(skew) {
            return Err(TokenRejection::Expiry);
        }
        if let Some(nbf) = claims.nbf {
            if now < nbf.saturating_sub(skew) {
                return Err(TokenRejection::NotYetValid);
            }
        }

        if let Some(expected) = expected_nonce {
            let matches = claims
                .nonce
                .as_deref()
                .is_some_and(|nonce| constant_time_eq(nonce, expected));
            if !matches {
                return Err(TokenRejection::Nonce);
            }
        }

        let subject = claims
            .sub
            .filter(|s| !s.is_empty())
            .ok_or(TokenRejection::MissingClaim)?;
        let expires_at = Utc
            .timestamp_opt(exp, 0)
            .single()
            .ok_or(TokenRejection::Malformed)?;

        Ok(VerifiedIdentity {
            subject,
            email: claims.email,
            email_verified: parse_email_verified(claims.email_verified.as_ref()),
            name: claims.name,
            picture: claims.picture,
            issuer,
            audience: expected_audience.to_string(),
            expires_at,
        })
    }
}

fn duration_secs(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, TokenRejection> {
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenRejection::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenRejection::Malformed)
}

fn extract_audiences(aud: Option<&serde_json::Value>) -> Vec<String> {
    match aud {
        Some(serde_json::Value::String(single)) => vec![single.clone()],
        Some(serde_json::Value::Array(many)) => many
            .iter()
            .filter_map(|v| v.as_str().map(ToString::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

fn parse_email_verified(value: Option<&serde_json::Value>) -> bool {
    match value {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn decode_key_component(value: Option<&String>) -> Result<Vec<u8>, TokenRejection> {
    let value = value.ok_or(TokenRejection::Signature)?;
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|_| TokenRejection::Signature)
}

/// Verify a JWS signature over `signing_input` with the selected key
fn verify_signature(
    signing_input: &[u8],
    signature: &[u8],
    algorithm: &str,
    key: &JsonWebKey,
) -> Result<(), TokenRejection> {
    if key.alg.as_deref().is_some_and(|alg| alg != algorithm) {
        return Err(TokenRejection::Signature);
    }

    match (algorithm, key.kty.as_str()) {
        ("RS256", "RSA") => verify_rs256(signing_input, signature, key),
        ("ES256", "EC") => verify_es256(signing_input, signature, key),
        ("RS256" | "ES256", _) => Err(TokenRejection::Signature),
        _ => Err(TokenRejection::UnsupportedAlgorithm),
    }
}

fn verify_rs256(
    signing_input: &[u8],
    signature: &[u8],
    key: &JsonWebKey,
) -> Result<(), TokenRejection> {
    use rsa::signature::Verifier;

    let n = decode_key_component(key.n.as_ref())?;
    let e = decode_key_component(key.e.as_ref())?;
    let public_key = RsaPublicKey::new(
        rsa::BigUint::from_bytes_be(&n),
        rsa::BigUint::from_bytes_be(&e),
    )
    .map_err(|_| TokenRejection::Signature)?;

    let signature =
        rsa::pkcs1v15::Signature::try_from(signature).map_err(|_| TokenRejection::Signature)?;
    VerifyingKey::<Sha256>::new(public_key)
        .verify(signing_input, &signature)
        .map_err(|_| TokenRejection::Signature)
}

/// ES256 signatures in a JWS are the raw 64-byte `r || s`, not DER
fn verify_es256(
    signing_input: &[u8],
    signature: &[u8],
    key: &JsonWebKey,
) -> Result<(), TokenRejection> {
    use p256::ecdsa::signature::Verifier;

    if key.crv.as_deref() != Some("P-256") {
        return Err(TokenRejection::Signature);
    }
    let x = decode_key_component(key.x.as_ref())?;
    let y = decode_key_component(key.y.as_ref())?;

    let mut point = Vec::with_capacity(1 + x.len() + y.len());
    point.push(0x04);
    point.extend_from_slice(&x);
    point.extend_from_slice(&y);

    let verifying_key =
        EcdsaVerifyingKey::from_sec1_bytes(&point).map_err(|_| TokenRejection::Signature)?;
    let signature = EcdsaSignature::from_slice(signature).map_err(|_| TokenRejection::Signature)?;
    verifying_key
        .verify(signing_input, &signature)
        .map_err(|_| TokenRejection::Signature)
}
