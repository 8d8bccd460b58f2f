pub mod engine;
pub mod envelope;
pub mod events;
mod handlers;
pub mod policy;
mod publisher;
pub mod repository;

use serde::{Deserialize, Serialize};

use utils::xlogging::LoggingSettings;
use wallet_connector::WalletConnectorSettings;

pub use crate::engine::BridgeEngine;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BridgeEngineSettings {
    /// url to the postgres database.
    pub psql_url: String,
    pub relay_url: String,
    /// Service identity secret key, hex.
    pub nostr_secret_key: String,
    /// High-water mark for concurrently processed events.
    pub max_concurrent_events: usize,
    /// How long to wait for a relay ACK before treating a publish as
    /// unconfirmed.
    pub publish_ack_timeout_ms: u64,
    pub reconnect_delay_ms: u64,
    pub wallet: WalletConnectorSettings,
    pub logging_settings: LoggingSettings,
}
