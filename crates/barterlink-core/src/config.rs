use crate::app_config::{AppConfig, Environment, StorageConfig, MAX_SESSION_TTL_HOURS};
use crate::ConfigError;

const MIN_SIGNING_KEY_LEN: usize = 32;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so tests can drive it from a
/// `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_num = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let narrow = |var: &str, value: u64| -> Result<u32, ConfigError> {
        u32::try_from(value).map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let to_usize = |var: &str, value: u64| -> Result<usize, ConfigError> {
        usize::try_from(value).map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let database_url = require("DATABASE_URL")?;
    let session_hash_salt = require("BARTERLINK_SESSION_HASH_SALT")?;
    let checkin_signing_key = require("BARTERLINK_CHECKIN_SIGNING_KEY")?;
    if checkin_signing_key.len() < MIN_SIGNING_KEY_LEN {
        return Err(ConfigError::InvalidEnvVar {
            var: "BARTERLINK_CHECKIN_SIGNING_KEY".to_string(),
            reason: format!("must be at least {MIN_SIGNING_KEY_LEN} bytes"),
        });
    }

    let env = parse_environment(&or_default("BARTERLINK_ENV", "development"))?;

    let bind_raw = or_default("BARTERLINK_BIND_ADDR", "0.0.0.0:3000");
    let bind_addr = bind_raw
        .parse::<SocketAddr>()
        .map_err(|e| ConfigError::InvalidEnvVar {
            var: "BARTERLINK_BIND_ADDR".to_string(),
            reason: e.to_string(),
        })?;
    let log_level = or_default("BARTERLINK_LOG_LEVEL", "info");

    let session_ttl_hours = narrow(
        "BARTERLINK_SESSION_TTL_HOURS",
        parse_num("BARTERLINK_SESSION_TTL_HOURS", "720")?,
    )?;
    if session_ttl_hours == 0 || session_ttl_hours > MAX_SESSION_TTL_HOURS {
        return Err(ConfigError::InvalidEnvVar {
            var: "BARTERLINK_SESSION_TTL_HOURS".to_string(),
            reason: format!("must be between 1 and {MAX_SESSION_TTL_HOURS}"),
        });
    }
    let checkin_token_ttl_secs = parse_num("BARTERLINK_CHECKIN_TOKEN_TTL_SECS", "86400")?;

    let db_max_connections = narrow(
        "BARTERLINK_DB_MAX_CONNECTIONS",
        parse_num("BARTERLINK_DB_MAX_CONNECTIONS", "10")?,
    )?;
    let db_min_connections = narrow(
        "BARTERLINK_DB_MIN_CONNECTIONS",
        parse_num("BARTERLINK_DB_MIN_CONNECTIONS", "1")?,
    )?;
    let db_acquire_timeout_secs = parse_num("BARTERLINK_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let storage = match lookup("BARTERLINK_STORAGE_URL")
        .ok()
        .filter(|v| !v.trim().is_empty())
    {
        Some(base_url) => Some(StorageConfig {
            base_url,
            service_key: require("BARTERLINK_STORAGE_SERVICE_KEY")?,
            bucket: or_default("BARTERLINK_STORAGE_BUCKET", "collab-content"),
            timeout_secs: parse_num("BARTERLINK_STORAGE_TIMEOUT_SECS", "60")?,
            max_retries: narrow(
                "BARTERLINK_STORAGE_MAX_RETRIES",
                parse_num("BARTERLINK_STORAGE_MAX_RETRIES", "3")?,
            )?,
        }),
        None => None,
    };

    let max_video_bytes = to_usize(
        "BARTERLINK_MAX_VIDEO_BYTES",
        parse_num("BARTERLINK_MAX_VIDEO_BYTES", "104857600")?,
    )?;
    let rate_limit_per_minute = to_usize(
        "BARTERLINK_RATE_LIMIT_PER_MINUTE",
        parse_num("BARTERLINK_RATE_LIMIT_PER_MINUTE", "120")?,
    )?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        session_hash_salt,
        session_ttl_hours,
        checkin_signing_key,
        checkin_token_ttl_secs,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        storage,
        max_video_bytes,
        rate_limit_per_minute,
    })
}

fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "BARTERLINK_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
