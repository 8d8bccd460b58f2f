use std::sync::Arc;
use std::time::Duration;

use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;
use slog as log;
use tokio::sync::watch;

use bridge_engine::engine::BridgeEngine;
use bridge_engine::envelope::ServiceKeys;
use bridge_engine::events::EventLogger;
use bridge_engine::repository::{PgRepository, Repository};
use bridge_engine::BridgeEngineSettings;
use relay_client::RelayConnection;
use wallet_connector::{launch_wallet_backend, WalletConnector};

#[tokio::main]
async fn main() {
    let settings = utils::config::get_config_from_env::<BridgeEngineSettings>()
        .expect("Failed to load settings.");
    let logger = utils::xlogging::init_log(&settings.logging_settings);

    let db_pool = Pool::builder()
        .build(ConnectionManager::<PgConnection>::new(settings.psql_url.clone()))
        .expect("Failed to create pool.");
    {
        let conn = db_pool.get().expect("Failed to get a db connection.");
        models::init(&conn).expect("Failed to run migrations.");
    }

    let keys = ServiceKeys::from_secret_hex(&settings.nostr_secret_key)
        .expect("Invalid nostr secret key.");
    log::info!(logger, "Service identity: {}", keys.public_key());

    let wallet = launch_wallet_backend(&settings.wallet, None)
        .await
        .expect("Failed to launch wallet backend.");
    let repo: Arc<dyn Repository> = Arc::new(PgRepository::new(db_pool));
    let event_logger = EventLogger::spawn(logger.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    {
        let logger = logger.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            log::info!(logger, "Shutdown signal received");
            let _ = shutdown_tx.send(true);
        });
    }

    let ack_timeout = Duration::from_millis(settings.publish_ack_timeout_ms);
    let reconnect_delay = Duration::from_millis(settings.reconnect_delay_ms);
    let since_seconds = utils::time::time_now_seconds();

    while !*shutdown_rx.borrow() {
        let relay = match RelayConnection::connect(&settings.relay_url, ack_timeout, logger.clone()).await
        {
            Ok(relay) => Arc::new(relay),
            Err(err) => {
                log::error!(logger, "Failed to connect to relay, error: {}", err);
                tokio::time::sleep(reconnect_delay).await;
                continue;
            }
        };

        let engine = Arc::new(BridgeEngine::new(
            keys.clone(),
            repo.clone(),
            wallet.clone(),
            relay,
            event_logger.clone(),
            settings.max_concurrent_events,
            logger.clone(),
        ));

        match engine.run(since_seconds, shutdown_rx.clone()).await {
            Ok(()) => break,
            Err(err) => {
                log::error!(logger, "Relay subscription ended, error: {}", err);
                tokio::time::sleep(reconnect_delay).await;
            }
        }
    }

    if let Err(err) = wallet.shutdown().await {
        log::error!(logger, "Wallet shutdown failed, error: {}", err);
    }
    log::info!(logger, "Exiting");
}
