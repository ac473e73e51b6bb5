use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// What the hierarchy assembler does with a state or city whose parent is
/// not among the emitted entries of the same cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrphanPolicy {
    /// Leave the orphan out of the snapshot.
    Drop,
    /// Rank the orphan in a parent-less bucket for its level.
    Promote,
}

impl std::fmt::Display for OrphanPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrphanPolicy::Drop => write!(f, "drop"),
            OrphanPolicy::Promote => write!(f, "promote"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub catalog_path: PathBuf,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub top_n: usize,
    pub orphan_policy: OrphanPolicy,
    pub max_concurrent_fetches: usize,
    pub provider_timeout_secs: u64,
    pub http_user_agent: String,
    pub alpha_vantage_api_key: Option<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("catalog_path", &self.catalog_path)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("top_n", &self.top_n)
            .field("orphan_policy", &self.orphan_policy)
            .field("max_concurrent_fetches", &self.max_concurrent_fetches)
            .field("provider_timeout_secs", &self.provider_timeout_secs)
            .field("http_user_agent", &self.http_user_agent)
            .field(
                "alpha_vantage_api_key",
                &self.alpha_vantage_api_key.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}
