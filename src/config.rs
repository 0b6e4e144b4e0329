use std::{env, fmt::Display, str::FromStr};

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::errors::{AppError, Result};

/// Runtime settings, read from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: String,
    pub port: u16,
    pub jwt_secret: String,
    /// Seconds a cook or delivery agent has to answer an alert.
    pub response_window_secs: i64,
    pub rate_limit_per_sec: u64,
    pub delivery_charge: Decimal,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| AppError::ConfigError("JWT_SECRET must be set".to_string()))?;
        if jwt_secret.len() < 16 {
            return Err(AppError::ConfigError(
                "JWT_SECRET must be at least 16 characters".to_string(),
            ));
        }

        Ok(Self {
            database_path: try_load("DATABASE_PATH", "foodhub.db")?,
            port: try_load("PORT", "8080")?,
            jwt_secret,
            response_window_secs: try_load("RESPONSE_WINDOW_SECS", "120")?,
            rate_limit_per_sec: try_load("RATE_LIMIT_PER_SEC", "10")?,
            delivery_charge: try_load("DELIVERY_CHARGE", "30")?,
        })
    }

    /// Settings used by tests and by CLI commands that never serve HTTP.
    pub fn for_tests() -> Self {
        Self {
            database_path: ":memory:".to_string(),
            port: 0,
            jwt_secret: "test-secret-test-secret".to_string(),
            response_window_secs: 120,
            rate_limit_per_sec: 1000,
            delivery_charge: Decimal::new(30, 0),
        }
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse().map_err(|e| {
        warn!("Invalid {key} value: {e}");
        AppError::ConfigError(format!("Invalid {}: {}", key, e))
    })
}
