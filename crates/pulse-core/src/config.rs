use crate::app_config::{AppConfig, Environment, OrphanPolicy};
use crate::ConfigError;

const MAX_TOP_N: usize = 20;

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
/// Decoupled from the process environment so it can be tested with a pure
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let database_url = require("DATABASE_URL")?;

    let env = parse_environment(&or_default("PULSE_ENV", "development"))?;
    let bind_addr = parse_addr("PULSE_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("PULSE_LOG_LEVEL", "info");
    let catalog_path = PathBuf::from(or_default("PULSE_CATALOG_PATH", "./config/catalog.yaml"));

    let db_max_connections = parse_u32("PULSE_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("PULSE_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("PULSE_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let top_n = parse_usize("PULSE_TOP_N", "10")?;
    if !(1..=MAX_TOP_N).contains(&top_n) {
        return Err(invalid(
            "PULSE_TOP_N",
            format!("must be between 1 and {MAX_TOP_N}, got {top_n}"),
        ));
    }

    let orphan_policy = parse_orphan_policy(&or_default("PULSE_ORPHAN_POLICY", "drop"))?;

    let max_concurrent_fetches = parse_usize("PULSE_MAX_CONCURRENT_FETCHES", "4")?;
    if max_concurrent_fetches == 0 {
        return Err(invalid(
            "PULSE_MAX_CONCURRENT_FETCHES",
            "must be at least 1".to_string(),
        ));
    }

    let provider_timeout_secs = parse_u64("PULSE_PROVIDER_TIMEOUT_SECS", "20")?;
    let http_user_agent = or_default("PULSE_HTTP_USER_AGENT", "pulse/0.1 (ranking-engine)");
    let alpha_vantage_api_key = lookup("ALPHA_VANTAGE_API_KEY")
        .ok()
        .filter(|key| !key.trim().is_empty());

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        catalog_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        top_n,
        orphan_policy,
        max_concurrent_fetches,
        provider_timeout_secs,
        http_user_agent,
        alpha_vantage_api_key,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "PULSE_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

fn parse_orphan_policy(s: &str) -> Result<OrphanPolicy, ConfigError> {
    match s {
        "drop" => Ok(OrphanPolicy::Drop),
        "promote" => Ok(OrphanPolicy::Promote),
        other => Err(ConfigError::InvalidEnvVar {
            var: "PULSE_ORPHAN_POLICY".to_string(),
            reason: format!("expected 'drop' or 'promote', got '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
