use base64::{engine::general_purpose, Engine as _};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Path the identity provider redirects back to after consent
pub const CALLBACK_PATH: &str = "/api/authentication/callback";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuroraSettings {
    pub application: ApplicationSettings,
    pub provider: ProviderSettings,
    pub jwt_validation: JwtValidationConfig,
    pub session: SessionSettings,
    pub cookies: CookieSettings,
    pub database: DatabaseSettings,
    pub http_client: HttpClientSettings,
    pub password: PasswordSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    /// Public origin of this service; the callback URI is derived from it
    pub redirect_base_url: String,
    /// Where a freshly authenticated user lands
    pub landing_path: String,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub name: String,
    pub display_name: Option<String>,
    /// Optional OIDC discovery document; when set it overrides the static endpoints
    pub discovery_url: Option<String>,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    /// Accepted `iss` values. Google issues tokens under two spellings.
    pub issuers: Vec<String>,
    pub scopes: Vec<String>,

    // Direct values (can be overridden by environment variables)
    pub client_id: Option<String>,
    pub client_secret: Option<String>,

    // Environment variable names for overrides
    pub client_id_env: Option<String>,
    pub client_secret_env: Option<String>,

    pub extra_auth_params: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtValidationConfig {
    /// Clock skew tolerance in seconds (default: 300 = 5 minutes)
    pub clock_skew_seconds: u64,

    /// JWKS cache duration in seconds when the provider sends no max-age (default: 3600)
    pub cache_duration_seconds: u64,

    /// Minimum spacing between forced key refreshes triggered by an unknown `kid`
    pub min_refresh_interval_seconds: u64,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub session_duration_hours: u64,
    pub session_secret: String,
    /// Lifetime of the pending-login cookie carrying `state` and `nonce`
    pub login_state_minutes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieSettings {
    pub secure: bool,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientSettings {
    pub timeout_seconds: u64,
    pub connect_timeout_seconds: u64,
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordSettings {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            redirect_base_url: "http://localhost:8080".to_string(),
            landing_path: "/welcome".to_string(),
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            name: "google".to_string(),
            display_name: Some("Google".to_string()),
            discovery_url: None,
            authorization_endpoint: "https://accounts.google.com/o/oauth2/auth".to_string(),
            token_endpoint: "https://oauth2.googleapis.com/token".to_string(),
            jwks_uri: "https://www.googleapis.com/oauth2/v3/certs".to_string(),
            issuers: vec![
                "accounts.google.com".to_string(),
                "https://accounts.google.com".to_string(),
            ],
            scopes: vec![
                "openid".to_string(),
                "email".to_string(),
                "profile".to_string(),
            ],
            client_id: None,
            client_secret: None,
            client_id_env: Some("GOOGLE_CLIENT_ID".to_string()),
            client_secret_env: Some("GOOGLE_CLIENT_SECRET".to_string()),
            extra_auth_params: HashMap::new(),
        }
    }
}

impl Default for JwtValidationConfig {
    fn default() -> Self {
        Self {
            clock_skew_seconds: 300,
            cache_duration_seconds: 3600,
            min_refresh_interval_seconds: 60,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            session_duration_hours: 24,
            session_secret: String::new(), // Will be generated if empty
            login_state_minutes: 10,
        }
    }
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self { secure: true }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
            acquire_timeout_seconds: 5,
        }
    }
}

impl Default for HttpClientSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
            connect_timeout_seconds: 5,
        }
    }
}

impl Default for PasswordSettings {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// Secrets stay out of Debug output so settings can be logged safely

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("name", &self.name)
            .field("discovery_url", &self.discovery_url)
            .field("authorization_endpoint", &self.authorization_endpoint)
            .field("token_endpoint", &self.token_endpoint)
            .field("jwks_uri", &self.jwks_uri)
            .field("issuers", &self.issuers)
            .field("scopes", &self.scopes)
            .field("client_id", &self.client_id)
            .field("client_secret", &redacted(self.client_secret.as_deref()))
            .field("extra_auth_params", &self.extra_auth_params)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSettings")
            .field("session_duration_hours", &self.session_duration_hours)
            .field("session_secret", &redacted(Some(&self.session_secret)))
            .field("login_state_minutes", &self.login_state_minutes)
            .finish()
    }
}

impl std::fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("url", &redacted(self.url.as_deref()))
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout_seconds", &self.acquire_timeout_seconds)
            .finish()
    }
}

fn redacted(value: Option<&str>) -> &'static str {
    match value {
        Some(v) if !v.is_empty() => "<redacted>",
        _ => "<unset>",
    }
}

impl AuroraSettings {
    /// Load settings from configuration files and environment variables
    ///
    /// The logger is initialised as soon as the log level is known, before the
    /// remaining environment overrides run, so their warnings are not lost.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Logger initialization fails
    /// - Settings file cannot be read or parsed
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        // A missing .env file is normal outside development
        let _ = dotenvy::dotenv();

        let (mut settings, sources) = Self::load_base_settings()?;
        Self::apply_logging_env_overrides(&mut settings.logging);
        Self::initialize_logging(&settings.logging)?;
        for source in &sources {
            info!("{source}");
        }

        Self::apply_env_overrides(&mut settings);
        Ok(settings)
    }

    /// Initialize `env_logger` with the configured filter
    ///
    /// # Errors
    ///
    /// Returns an error if a logger is already installed
    fn initialize_logging(logging: &LoggingSettings) -> Result<(), Box<dyn std::error::Error>> {
        env_logger::Builder::new()
            .parse_filters(logging.filter())
            .try_init()?;
        Ok(())
    }

    /// Load base settings from TOML file(s) or use defaults
    /// Settings are loaded with the following priority (highest to lowest):
    /// 1. Environment variables (applied separately after loading base settings)
    /// 2. Settings.toml in `AURORA_SECRETS_DIR` (if specified and exists)
    /// 3. Settings.toml in current directory (if exists)
    /// 4. Default settings
    ///
    /// Also returns one line per file consulted, logged once logging is up.
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file exists but cannot be read or parsed
    fn load_base_settings() -> Result<(Self, Vec<String>), Box<dyn std::error::Error>> {
        let mut settings = Self::default();
        let mut sources = Vec::new();

        let default_config_path = Path::new("Settings.toml");
        if default_config_path.exists() {
            settings = Self::from_file(default_config_path)?;
            sources.push(format!(
                "Loaded base settings from {}",
                default_config_path.display()
            ));
        }

        if let Ok(secrets_dir) = std::env::var("AURORA_SECRETS_DIR") {
            let secrets_path = Path::new(&secrets_dir).join("Settings.toml");
            if secrets_path.exists() {
                settings = Self::from_file(&secrets_path)?;
                sources.push(format!("Overriding settings from {}", secrets_path.display()));
            } else {
                sources.push(format!(
                    "AURORA_SECRETS_DIR set but no Settings.toml found at: {}",
                    secrets_path.display()
                ));
            }
        }

        Ok((settings, sources))
    }

    /// Parse a single TOML settings file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let toml_content = fs::read_to_string(path)?;
        Ok(basic_toml::from_str(&toml_content)?)
    }

    /// Apply environment variable overrides to settings
    pub fn apply_env_overrides(settings: &mut Self) {
        Self::apply_application_env_overrides(&mut settings.application);
        Self::apply_session_env_overrides(&mut settings.session);
        Self::apply_cookie_env_overrides(&mut settings.cookies);
        Self::apply_database_env_overrides(&mut settings.database);
        Self::apply_http_client_env_overrides(&mut settings.http_client);
        Self::apply_logging_env_overrides(&mut settings.logging);
    }

    fn apply_application_env_overrides(app_settings: &mut ApplicationSettings) {
        if let Ok(host) = std::env::var("HOST") {
            app_settings.host = host;
        }
        if let Ok(port_str) = std::env::var("PORT") {
            if let Ok(port) = port_str.parse::<u16>() {
                app_settings.port = port;
            }
        }
        if let Ok(redirect_base_url) = std::env::var("REDIRECT_BASE_URL") {
            app_settings.redirect_base_url = redirect_base_url;
        }
        if let Ok(landing_path) = std::env::var("LANDING_PATH") {
            app_settings.landing_path = landing_path;
        }
    }

    /// Apply environment overrides for session settings
    pub fn apply_session_env_overrides(session_settings: &mut SessionSettings) {
        Self::apply_numeric_env_override(
            "SESSION_DURATION_HOURS",
            &mut session_settings.session_duration_hours,
        );
        Self::handle_session_secret_override(session_settings);
    }

    fn apply_numeric_env_override(env_var: &str, target: &mut u64) {
        if let Ok(value_str) = std::env::var(env_var) {
            if let Ok(value) = value_str.parse::<u64>() {
                *target = value;
            }
        }
    }

    fn handle_session_secret_override(session_settings: &mut SessionSettings) {
        let env_secret_set = std::env::var("SECRET_KEY").is_ok_and(|secret| {
            if secret.is_empty() {
                false
            } else {
                session_settings.session_secret = secret;
                true
            }
        });

        if !env_secret_set && session_settings.session_secret.is_empty() {
            session_settings.session_secret = Self::generate_random_session_secret();
            warn!("Using an auto-generated session secret; sessions will not survive a restart");
            warn!("Set SECRET_KEY or session.session_secret in Settings.toml for production use");
        }
    }

    /// 32 bytes of OS randomness, base64 encoded
    fn generate_random_session_secret() -> String {
        use rand::RngCore;
        let mut secret = [0u8; 32];
        rand::rng().fill_bytes(&mut secret);
        general_purpose::STANDARD.encode(secret)
    }

    fn apply_cookie_env_overrides(cookie_settings: &mut CookieSettings) {
        if let Ok(cookie_secure_str) = std::env::var("COOKIE_SECURE") {
            if let Ok(cookie_secure) = cookie_secure_str.parse::<bool>() {
                cookie_settings.secure = cookie_secure;
            }
        }
    }

    fn apply_database_env_overrides(database_settings: &mut DatabaseSettings) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.is_empty() {
                database_settings.url = Some(url);
            }
        }
    }

    fn apply_http_client_env_overrides(http_settings: &mut HttpClientSettings) {
        Self::apply_numeric_env_override("HTTP_TIMEOUT_SECONDS", &mut http_settings.timeout_seconds);
    }

    fn apply_logging_env_overrides(logging_settings: &mut LoggingSettings) {
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            logging_settings.level = log_level;
        }
    }

    /// Get the bind address for the server
    #[must_use]
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }

    /// The redirect URI registered with the provider, byte for byte
    #[must_use]
    pub fn callback_url(&self) -> String {
        format!(
            "{}{CALLBACK_PATH}",
            self.application.redirect_base_url.trim_end_matches('/')
        )
    }
}

impl LoggingSettings {
    /// `env_logger` filter directives; an empty level means `info`
    #[must_use]
    pub fn filter(&self) -> &str {
        let level = self.level.trim();
        if level.is_empty() {
            "info"
        } else {
            level
        }
    }
}

impl ProviderSettings {
    /// Get the client ID, checking environment variable first, then falling back to direct value
    #[must_use]
    pub fn get_client_id(&self) -> Option<String> {
        Self::env_or_value(self.client_id_env.as_deref(), self.client_id.as_ref())
    }

    /// Get the client secret, checking environment variable first, then falling back to direct value
    #[must_use]
    pub fn get_client_secret(&self) -> Option<String> {
        Self::env_or_value(
            self.client_secret_env.as_deref(),
            self.client_secret.as_ref(),
        )
    }

    fn env_or_value(env_var: Option<&str>, value: Option<&String>) -> Option<String> {
        if let Some(env_var) = env_var {
            if let Ok(value) = std::env::var(env_var) {
                if !value.is_empty() {
                    return Some(value);
                }
            }
        }
        value.filter(|v| !v.is_empty()).cloned()
    }

    /// Both client credentials are present
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.get_client_id().is_some() && self.get_client_secret().is_some()
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}
