use std::fmt::Display;
use std::str::FromStr;

use anyhow::Context;

/// Runtime configuration, read once at startup and passed into `AppState`.
/// There is no ambient global; components receive what they need explicitly.
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    pub host: String,
    pub port: u16,
    pub db_path: String,
    pub api_prefix: String,
    pub jwt_secret: String,
    pub otp_secret: String,
    pub otp_length: usize,
    pub otp_ttl_minutes: i64,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,
    pub resend_api_key: Option<String>,
    pub email_from: Option<String>,
    pub resend_base_url: String,
    pub auth_rate_limit: u32,
    pub rate_window_seconds: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            environment: env_or("BLOOM_ENVIRONMENT", "local"),
            host: env_or("BLOOM_HOST", "0.0.0.0"),
            port: env_parsed("BLOOM_PORT", 3000)?,
            db_path: env_or("BLOOM_DB_PATH", "bloom.db"),
            api_prefix: env_or("BLOOM_API_PREFIX", "/api/v1"),
            jwt_secret: env_or("BLOOM_JWT_SECRET", "dev-secret-change-me"),
            otp_secret: env_or("BLOOM_OTP_SECRET", "dev-otp-secret-change-me"),
            otp_length: env_parsed("BLOOM_OTP_LENGTH", 6)?,
            otp_ttl_minutes: env_parsed("BLOOM_OTP_TTL_MINUTES", 10)?,
            access_token_ttl_minutes: env_parsed("BLOOM_ACCESS_TOKEN_TTL_MINUTES", 15)?,
            refresh_token_ttl_days: env_parsed("BLOOM_REFRESH_TOKEN_TTL_DAYS", 30)?,
            resend_api_key: env_optional("BLOOM_RESEND_API_KEY"),
            email_from: env_optional("BLOOM_EMAIL_FROM"),
            resend_base_url: env_or("BLOOM_RESEND_BASE_URL", "https://api.resend.com"),
            auth_rate_limit: env_parsed("BLOOM_AUTH_RATE_LIMIT", 10)?,
            rate_window_seconds: env_parsed("BLOOM_RATE_WINDOW_SECONDS", 60)?,
        })
    }

    /// Production forbids returning plaintext OTP codes and requires a
    /// configured email sender.
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

fn env_parsed<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display + Send + Sync + std::error::Error + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw}")),
        Err(_) => Ok(default),
    }
}
