pub mod engine;
pub mod envelope;
pub mod relay_client;
pub mod wallet_connector;
