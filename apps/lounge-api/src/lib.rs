pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod permissions;
pub mod routes;

use std::sync::Arc;

use config::Config;
use db::kv::KeyValueStore;
use db::store::ChatStore;
use gateway::fanout::RoomBroadcast;
use gateway::presence::RoomPresence;
use lounge_common::SnowflakeGenerator;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ChatStore>,
    pub kv: Arc<dyn KeyValueStore>,
    pub config: Arc<Config>,
    pub snowflake: Arc<SnowflakeGenerator>,
    pub broadcast: RoomBroadcast,
    pub presence: RoomPresence,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn ChatStore>, kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            snowflake: Arc::new(SnowflakeGenerator::new(config.worker_id)),
            broadcast: RoomBroadcast::new(kv.clone()),
            presence: RoomPresence::new(kv.clone(), config.presence),
            config: Arc::new(config),
            store,
            kv,
        }
    }
}
