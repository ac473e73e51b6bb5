//! Offline unit tests for pulse-db pool configuration and row types.
//! These tests do not require a live database connection.

use pulse_core::{AppConfig, Environment, OrphanPolicy};
use pulse_db::{PoolConfig, RefreshRunProviderRow, RefreshRunRow};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let app_config = AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        log_level: "info".to_string(),
        catalog_path: PathBuf::from("./config/catalog.yaml"),
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        top_n: 10,
        orphan_policy: OrphanPolicy::Drop,
        max_concurrent_fetches: 4,
        provider_timeout_secs: 20,
        http_user_agent: "ua".to_string(),
        alpha_vantage_api_key: None,
    };

    let pool_config = PoolConfig::from_app_config(&app_config);
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

/// Compile-time smoke test: confirm that [`RefreshRunRow`] has all expected
/// fields with the correct types. No database required.
#[test]
fn refresh_run_row_has_expected_fields() {
    use chrono::Utc;
    use uuid::Uuid;

    let row = RefreshRunRow {
        id: 1_i64,
        public_id: Uuid::new_v4(),
        category: "hottest".to_string(),
        trigger_source: "scheduler".to_string(),
        status: "queued".to_string(),
        started_at: None,
        completed_at: None,
        signal_count: 0_i32,
        groups_published: 0_i32,
        error_message: None,
        created_at: Utc::now(),
    };

    assert_eq!(row.id, 1);
    assert_eq!(row.category, "hottest");
    assert_eq!(row.status, "queued");
    assert!(row.started_at.is_none());
    assert!(row.error_message.is_none());
}

#[test]
fn refresh_run_provider_row_has_expected_fields() {
    use chrono::Utc;

    let row = RefreshRunProviderRow {
        id: 3_i64,
        refresh_run_id: 1_i64,
        provider: "gdelt".to_string(),
        status: "timed_out".to_string(),
        signal_count: 0_i32,
        retryable: true,
        error_message: Some("timed out after 20s".to_string()),
        elapsed_ms: 20_000_i64,
        created_at: Utc::now(),
    };

    assert_eq!(row.provider, "gdelt");
    assert!(row.retryable);
    assert_eq!(row.elapsed_ms, 20_000);
}
