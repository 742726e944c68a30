//! Web configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `FIREBASE_API_KEY` - Web API key of the Firebase project
//! - `FIREBASE_AUTH_DOMAIN` - Auth domain (e.g., golibre.firebaseapp.com)
//! - `FIREBASE_PROJECT_ID` - Project id (Firestore database owner)
//! - `FIREBASE_STORAGE_BUCKET` - Cloud Storage bucket name
//! - `FIREBASE_MESSAGING_SENDER_ID` - Messaging sender id
//! - `FIREBASE_APP_ID` - Web app id
//!
//! ## Optional
//! - `FIREBASE_MEASUREMENT_ID` - Analytics measurement id
//! - `GOLIBRE_HOST` - Bind address (default: 127.0.0.1)
//! - `GOLIBRE_PORT` - Listen port (default: 3000)
//! - `GOLIBRE_BASE_URL` - Public URL (default: `http://localhost:3000`)
//! - `GOLIBRE_INIT_TIMEOUT_MS` - Session initialization timeout (default: 2500)
//! - `GOLIBRE_SESSION_IDLE_MINUTES` - Browser session idle expiry (default: 60)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

/// The six parameters the backend platform cannot work without.
pub const REQUIRED_FIREBASE_VARS: [&str; 6] = [
    "FIREBASE_API_KEY",
    "FIREBASE_AUTH_DOMAIN",
    "FIREBASE_PROJECT_ID",
    "FIREBASE_STORAGE_BUCKET",
    "FIREBASE_MESSAGING_SENDER_ID",
    "FIREBASE_APP_ID",
];

const DEFAULT_INIT_TIMEOUT_MS: u64 = 2500;
const DEFAULT_SESSION_IDLE_MINUTES: u64 = 60;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing environment variables: {}", .0.join(", "))]
    MissingEnvVars(Vec<String>),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Web application configuration.
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL
    pub base_url: String,
    /// How long a fresh session waits for the first identity notification
    pub init_timeout: Duration,
    /// Idle time after which a browser session and its controller are dropped
    pub session_idle: Duration,
    /// Backend platform connection parameters
    pub firebase: FirebaseConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Firebase project configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct FirebaseConfig {
    pub api_key: SecretString,
    pub auth_domain: String,
    pub project_id: String,
    pub storage_bucket: String,
    pub messaging_sender_id: String,
    pub app_id: String,
    pub measurement_id: Option<String>,
}

impl std::fmt::Debug for FirebaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseConfig")
            .field("api_key", &"[REDACTED]")
            .field("auth_domain", &self.auth_domain)
            .field("project_id", &self.project_id)
            .field("storage_bucket", &self.storage_bucket)
            .field("messaging_sender_id", &self.messaging_sender_id)
            .field("app_id", &self.app_id)
            .field("measurement_id", &self.measurement_id)
            .finish()
    }
}

impl WebConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let firebase = FirebaseConfig::from_lookup(&lookup)?;

        let host = parse_or_default(&lookup, "GOLIBRE_HOST", "127.0.0.1")?;
        let port = parse_or_default(&lookup, "GOLIBRE_PORT", "3000")?;
        let base_url = non_empty(&lookup, "GOLIBRE_BASE_URL")
            .unwrap_or_else(|| "http://localhost:3000".to_string());
        let init_timeout_ms: u64 = parse_or_default(
            &lookup,
            "GOLIBRE_INIT_TIMEOUT_MS",
            &DEFAULT_INIT_TIMEOUT_MS.to_string(),
        )?;
        let idle_minutes: u64 = parse_or_default(
            &lookup,
            "GOLIBRE_SESSION_IDLE_MINUTES",
            &DEFAULT_SESSION_IDLE_MINUTES.to_string(),
        )?;

        Ok(Self {
            host,
            port,
            base_url,
            init_timeout: Duration::from_millis(init_timeout_ms),
            session_idle: Duration::from_secs(idle_minutes * 60),
            firebase,
            sentry_dsn: non_empty(&lookup, "SENTRY_DSN"),
            sentry_environment: non_empty(&lookup, "SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// True when the public URL is served over TLS.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl FirebaseConfig {
    /// Read the Firebase parameters, reporting every missing one at once.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVars` naming exactly the absent
    /// required parameters, in declaration order.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let missing: Vec<String> = REQUIRED_FIREBASE_VARS
            .iter()
            .filter(|key| non_empty(&lookup, key).is_none())
            .map(|key| (*key).to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingEnvVars(missing));
        }

        let required = |key: &str| non_empty(&lookup, key).unwrap_or_default();

        Ok(Self {
            api_key: SecretString::from(required("FIREBASE_API_KEY")),
            auth_domain: required("FIREBASE_AUTH_DOMAIN"),
            project_id: required("FIREBASE_PROJECT_ID"),
            storage_bucket: required("FIREBASE_STORAGE_BUCKET"),
            messaging_sender_id: required("FIREBASE_MESSAGING_SENDER_ID"),
            app_id: required("FIREBASE_APP_ID"),
            measurement_id: non_empty(&lookup, "FIREBASE_MEASUREMENT_ID"),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Look up a variable, treating blank values as unset.
fn non_empty(lookup: impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a variable, falling back to a default when unset.
fn parse_or_default<T>(
    lookup: impl Fn(&str) -> Option<String>,
    key: &str,
    default: &str,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    non_empty(lookup, key)
        .as_deref()
        .unwrap_or(default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn full_env() -> HashMap<&'static str, String> {
        HashMap::from([
            ("FIREBASE_API_KEY", "AIzaSyTest".to_string()),
            ("FIREBASE_AUTH_DOMAIN", "golibre.firebaseapp.com".to_string()),
            ("FIREBASE_PROJECT_ID", "golibre".to_string()),
            ("FIREBASE_STORAGE_BUCKET", "golibre.appspot.com".to_string()),
            ("FIREBASE_MESSAGING_SENDER_ID", "1234567890".to_string()),
            ("FIREBASE_APP_ID", "1:1234567890:web:abc".to_string()),
        ])
    }

    fn load(env: &HashMap<&'static str, String>) -> Result<WebConfig, ConfigError> {
        WebConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_complete_env_loads_with_defaults() {
        let config = load(&full_env()).unwrap();
        assert_eq!(config.firebase.project_id, "golibre");
        assert_eq!(config.firebase.api_key.expose_secret(), "AIzaSyTest");
        assert_eq!(config.firebase.measurement_id, None);
        assert_eq!(config.init_timeout, Duration::from_millis(2500));
        assert_eq!(config.port, 3000);
        assert!(!config.is_secure());
    }

    #[test]
    fn test_each_missing_var_is_named_exactly() {
        for key in REQUIRED_FIREBASE_VARS {
            let mut env = full_env();
            env.remove(key);
            assert_eq!(
                load(&env).unwrap_err(),
                ConfigError::MissingEnvVars(vec![key.to_string()]),
                "omitting {key}"
            );
        }
    }

    #[test]
    fn test_all_missing_vars_reported_together() {
        let err = load(&HashMap::new()).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingEnvVars(
                REQUIRED_FIREBASE_VARS.iter().map(ToString::to_string).collect()
            )
        );
        assert!(err.to_string().contains("FIREBASE_API_KEY, FIREBASE_AUTH_DOMAIN"));
    }

    #[test]
    fn test_blank_value_counts_as_missing() {
        let mut env = full_env();
        env.insert("FIREBASE_APP_ID", "   ".to_string());
        assert_eq!(
            load(&env).unwrap_err(),
            ConfigError::MissingEnvVars(vec!["FIREBASE_APP_ID".to_string()])
        );
    }

    #[test]
    fn test_optional_measurement_id() {
        let mut env = full_env();
        env.insert("FIREBASE_MEASUREMENT_ID", "G-XYZ".to_string());
        assert_eq!(
            load(&env).unwrap().firebase.measurement_id.as_deref(),
            Some("G-XYZ")
        );
    }

    #[test]
    fn test_invalid_port_rejected() {
        let mut env = full_env();
        env.insert("GOLIBRE_PORT", "eighty".to_string());
        assert!(matches!(
            load(&env).unwrap_err(),
            ConfigError::InvalidEnvVar(key, _) if key == "GOLIBRE_PORT"
        ));
    }

    #[test]
    fn test_socket_addr() {
        let mut env = full_env();
        env.insert("GOLIBRE_HOST", "0.0.0.0".to_string());
        env.insert("GOLIBRE_PORT", "8080".to_string());
        let addr = load(&env).unwrap().socket_addr();
        assert_eq!(addr.ip().to_string(), "0.0.0.0");
        assert_eq!(addr.port(), 8080);
    }

    #[test]
    fn test_firebase_config_debug_redacts_api_key() {
        let config = load(&full_env()).unwrap();
        let debug_output = format!("{:?}", config.firebase);

        assert!(debug_output.contains("golibre.appspot.com"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("AIzaSyTest"));
    }
}
