//! Configuration types, read from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Process-wide configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Path of the libSQL database file.
    pub db_path: PathBuf,
    /// Port of the webhook/admin HTTP server.
    pub http_port: u16,
    /// Optional JSON message catalog; the builtin catalog is used when unset.
    pub catalog_path: Option<PathBuf>,
    /// Locale used when a sender has no known preference.
    pub default_locale: String,
    /// Health scores strictly below this value trigger a warning reply.
    pub low_health_threshold: i64,
    /// Registration sessions idle longer than this are swept.
    pub session_retention: Duration,
    /// Interval between session sweeps.
    pub session_sweep_interval: Duration,
    /// Directory uploaded meal images are written to.
    pub media_dir: PathBuf,
    /// Public base URL under which `media_dir` is served.
    pub media_base_url: String,
    /// Bearer token guarding the admin routes; admin routes are disabled
    /// when unset.
    pub admin_token: Option<SecretString>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/nutri-assist.db"),
            http_port: 8080,
            catalog_path: None,
            default_locale: "en".to_string(),
            low_health_threshold: 5,
            session_retention: Duration::from_secs(24 * 3600), // 24 hours
            session_sweep_interval: Duration::from_secs(3600), // 1 hour
            media_dir: PathBuf::from("./data/media"),
            media_base_url: "http://localhost:8080/media".to_string(),
            admin_token: None,
        }
    }
}

impl AppConfig {
    /// Build the configuration from `NUTRI_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let retention_hours: u64 = parse_var("NUTRI_SESSION_RETENTION_HOURS")?.unwrap_or(24);
        let sweep_secs: u64 = parse_var("NUTRI_SESSION_SWEEP_SECS")?.unwrap_or(3600);

        Ok(Self {
            db_path: std::env::var("NUTRI_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            http_port: parse_var("NUTRI_HTTP_PORT")?.unwrap_or(defaults.http_port),
            catalog_path: std::env::var("NUTRI_CATALOG_PATH").ok().map(PathBuf::from),
            default_locale: std::env::var("NUTRI_DEFAULT_LOCALE")
                .unwrap_or(defaults.default_locale),
            low_health_threshold: parse_var("NUTRI_LOW_HEALTH_THRESHOLD")?
                .unwrap_or(defaults.low_health_threshold),
            session_retention: Duration::from_secs(retention_hours * 3600),
            session_sweep_interval: Duration::from_secs(sweep_secs),
            media_dir: std::env::var("NUTRI_MEDIA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.media_dir),
            media_base_url: std::env::var("NUTRI_MEDIA_BASE_URL")
                .unwrap_or(defaults.media_base_url),
            admin_token: std::env::var("NUTRI_ADMIN_TOKEN").ok().map(SecretString::from),
        })
    }
}

/// Telegram Bot API settings. Present only when a bot token is configured.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    /// Long-poll timeout passed to `getUpdates`.
    pub poll_timeout_secs: u64,
}

impl TelegramConfig {
    pub fn from_env() -> Option<Self> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN").ok()?;
        let poll_timeout_secs = std::env::var("TELEGRAM_POLL_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);
        Some(Self {
            bot_token: SecretString::from(bot_token),
            poll_timeout_secs,
        })
    }
}

/// WhatsApp Cloud API settings.
#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    pub access_token: SecretString,
    pub phone_number_id: String,
    /// Token echoed back by Meta during webhook verification.
    pub verify_token: SecretString,
    /// App secret for `X-Hub-Signature-256` checks; unchecked when unset.
    pub app_secret: Option<SecretString>,
    pub api_version: String,
}

impl WhatsAppConfig {
    pub fn from_env() -> Option<Self> {
        let access_token = std::env::var("WHATSAPP_ACCESS_TOKEN").ok()?;
        let phone_number_id = std::env::var("WHATSAPP_PHONE_NUMBER_ID").ok()?;
        let verify_token = std::env::var("WHATSAPP_VERIFY_TOKEN").unwrap_or_default();
        let api_version =
            std::env::var("WHATSAPP_API_VERSION").unwrap_or_else(|_| "v21.0".to_string());
        Some(Self {
            access_token: SecretString::from(access_token),
            phone_number_id,
            verify_token: SecretString::from(verify_token),
            app_secret: std::env::var("WHATSAPP_APP_SECRET")
                .ok()
                .map(SecretString::from),
            api_version,
        })
    }
}

/// Vision model settings.
#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub api_key: SecretString,
    pub model: String,
    /// Base URL of an OpenAI-compatible API.
    pub api_base: String,
    pub timeout: Duration,
}

impl VisionConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("VISION_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("VISION_API_KEY".to_string()))?;
        let timeout_secs: u64 = parse_var("VISION_TIMEOUT_SECS")?.unwrap_or(60);
        Ok(Self {
            api_key: SecretString::from(api_key),
            model: std::env::var("VISION_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            api_base: std::env::var("VISION_API_BASE")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// Read and parse an optional environment variable.
fn parse_var<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.default_locale, "en");
        assert_eq!(config.low_health_threshold, 5);
        assert_eq!(config.session_retention, Duration::from_secs(86_400));
    }

    #[test]
    fn parse_var_rejects_garbage() {
        // SAFETY: This test is the only reader of this variable.
        unsafe { std::env::set_var("NUTRI_TEST_PARSE_GARBAGE", "eighty") };
        let result: Result<Option<u16>, _> = parse_var("NUTRI_TEST_PARSE_GARBAGE");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
        unsafe { std::env::remove_var("NUTRI_TEST_PARSE_GARBAGE") };
    }

    #[test]
    fn parse_var_missing_is_none() {
        // SAFETY: This test is the only reader of this variable.
        unsafe { std::env::remove_var("NUTRI_TEST_PARSE_MISSING") };
        let result: Option<u16> = parse_var("NUTRI_TEST_PARSE_MISSING").unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn telegram_config_absent_without_token() {
        // SAFETY: No other test reads TELEGRAM_BOT_TOKEN concurrently.
        unsafe { std::env::remove_var("TELEGRAM_BOT_TOKEN") };
        assert!(TelegramConfig::from_env().is_none());
    }
}
