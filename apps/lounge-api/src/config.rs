use std::time::Duration;

/// Which implementation backs the message/room/session store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

/// Which implementation backs presence and pub/sub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceBackend {
    Redis,
    Memory,
}

/// Liveness timing for stream connections.
///
/// The heartbeat interval must stay below the TTL, otherwise a healthy
/// connection's liveness key would expire between two refreshes.
#[derive(Debug, Clone, Copy)]
pub struct PresenceTiming {
    pub liveness_ttl: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for PresenceTiming {
    fn default() -> Self {
        Self {
            liveness_ttl: Duration::from_secs(15),
            heartbeat_interval: Duration::from_secs(5),
        }
    }
}

/// Lounge API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string. Unused with the memory store backend.
    pub database_url: String,
    /// Redis connection string.
    pub redis_url: String,
    pub store_backend: StoreBackend,
    pub presence_backend: PresenceBackend,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Users allowed to manage rooms, sessions and clear chat history.
    pub admin_user_ids: Vec<String>,
    pub presence: PresenceTiming,
    /// Snowflake worker ID; must differ between processes sharing a database.
    pub worker_id: u16,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        let store_backend = match std::env::var("STORE_BACKEND").as_deref() {
            Ok("memory") => StoreBackend::Memory,
            _ => StoreBackend::Postgres,
        };
        let presence_backend = match std::env::var("PRESENCE_BACKEND").as_deref() {
            Ok("memory") => PresenceBackend::Memory,
            _ => PresenceBackend::Redis,
        };

        let database_url = match store_backend {
            StoreBackend::Postgres => required_var("DATABASE_URL"),
            StoreBackend::Memory => std::env::var("DATABASE_URL").unwrap_or_default(),
        };

        let defaults = PresenceTiming::default();
        let presence = PresenceTiming {
            liveness_ttl: secs_var("LIVENESS_TTL_SECS").unwrap_or(defaults.liveness_ttl),
            heartbeat_interval: secs_var("HEARTBEAT_INTERVAL_SECS")
                .unwrap_or(defaults.heartbeat_interval),
        };
        if presence.heartbeat_interval >= presence.liveness_ttl {
            panic!("HEARTBEAT_INTERVAL_SECS must be lower than LIVENESS_TTL_SECS");
        }

        Self {
            database_url,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379/0".to_string()),
            store_backend,
            presence_backend,
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4002),
            admin_user_ids: parse_list(&std::env::var("ADMIN_USER_IDS").unwrap_or_default()),
            presence,
            worker_id: std::env::var("WORKER_ID")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        }
    }

    /// In-memory configuration used by tests and local demos.
    pub fn in_memory() -> Self {
        Self {
            database_url: String::new(),
            redis_url: String::new(),
            store_backend: StoreBackend::Memory,
            presence_backend: PresenceBackend::Memory,
            port: 0,
            admin_user_ids: Vec::new(),
            presence: PresenceTiming::default(),
            worker_id: 0,
        }
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admin_user_ids.iter().any(|id| id == user_id)
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn secs_var(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
