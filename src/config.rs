use std::env;
use std::str::FromStr;

use chrono::{Duration, FixedOffset};

use crate::error::{AppError, AppResult};

/// Credentials and endpoint of the payment-link provider.
#[derive(Clone, Debug)]
pub struct PaymentConfig {
    pub client_id: String,
    pub api_key: String,
    pub checksum_key: String,
    pub api_url: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,
    pub server_host: String,
    pub server_port: u16,
    pub frontend_url: String,
    pub backend_url: String,
    pub payment: PaymentConfig,
    pub booking_timeout_minutes: i64,
    pub booking_warning_minutes: i64,
    pub local_utc_offset_minutes: i32,
    pub admin_username: String,
    pub admin_password: String,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            jwt_expiration_hours: parsed("JWT_EXPIRATION_HOURS", 24)?,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: parsed("SERVER_PORT", 3000)?,
            frontend_url: trimmed_url("FRONTEND_URL", "http://localhost:5173"),
            backend_url: trimmed_url("BACKEND_URL", "http://localhost:3000"),
            payment: PaymentConfig {
                client_id: required("PAYOS_CLIENT_ID")?,
                api_key: required("PAYOS_API_KEY")?,
                checksum_key: required("PAYOS_CHECKSUM_KEY")?,
                api_url: trimmed_url("PAYOS_API_URL", "https://api-merchant.payos.vn"),
            },
            booking_timeout_minutes: parsed("BOOKING_TIMEOUT_MINUTES", 5)?,
            booking_warning_minutes: parsed("BOOKING_WARNING_MINUTES", 3)?,
            local_utc_offset_minutes: parsed("LOCAL_UTC_OFFSET_MINUTES", 420)?,
            admin_username: env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string()),
            admin_password: env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "admin123".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> AppResult<()> {
        if self.booking_timeout_minutes <= 0 {
            return Err(AppError::Internal(
                "BOOKING_TIMEOUT_MINUTES must be positive".to_string(),
            ));
        }
        if self.booking_warning_minutes >= self.booking_timeout_minutes {
            return Err(AppError::Internal(
                "BOOKING_WARNING_MINUTES must be below BOOKING_TIMEOUT_MINUTES".to_string(),
            ));
        }
        if self.local_offset().is_none() {
            return Err(AppError::Internal(
                "LOCAL_UTC_OFFSET_MINUTES is out of range".to_string(),
            ));
        }
        Ok(())
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn booking_timeout(&self) -> Duration {
        Duration::minutes(self.booking_timeout_minutes)
    }

    pub fn booking_warning(&self) -> Duration {
        Duration::minutes(self.booking_warning_minutes)
    }

    /// Offset in which schedule pattern departure times are written.
    pub fn local_offset(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.local_utc_offset_minutes * 60)
    }
}

fn required(key: &str) -> AppResult<String> {
    env::var(key).map_err(|_| AppError::Internal(format!("{} must be set", key)))
}

fn parsed<T: FromStr>(key: &str, default: T) -> AppResult<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Internal(format!("{} must be a number", key))),
        Err(_) => Ok(default),
    }
}

fn trimmed_url(key: &str, default: &str) -> String {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "test-secret".to_string(),
        jwt_expiration_hours: 1,
        server_host: "127.0.0.1".to_string(),
        server_port: 3000,
        frontend_url: "http://localhost:5173".to_string(),
        backend_url: "http://localhost:3000".to_string(),
        payment: PaymentConfig {
            client_id: "client".to_string(),
            api_key: "api-key".to_string(),
            checksum_key: "checksum".to_string(),
            api_url: "http://localhost:9".to_string(),
        },
        booking_timeout_minutes: 5,
        booking_warning_minutes: 3,
        local_utc_offset_minutes: 420,
        admin_username: "admin".to_string(),
        admin_password: "admin123".to_string(),
    }
}
