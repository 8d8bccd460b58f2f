//! Event-dispatch state machine and subscription loop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use serde_json::json;
use slog as log;
use slog::Logger;
use tokio::sync::{watch, Mutex, Semaphore};

use core_types::event::Event;
use core_types::payload::{
    ErrorCode, Request, Response, GET_BALANCE_METHOD, GET_INFO_METHOD, LIST_TRANSACTIONS_METHOD,
    LOOKUP_INVOICE_METHOD, MAKE_INVOICE_METHOD, METHODS, MULTI_PAY_INVOICE_METHOD,
    MULTI_PAY_KEYSEND_METHOD, PAY_INVOICE_METHOD, PAY_KEYSEND_METHOD,
};
use core_types::{INFO_KIND, REQUEST_EVENT_STATE_PROCESSED, REQUEST_KIND, RESPONSE_KIND};
use models::apps::App;
use relay_client::{Filter, PublishStatus, RelayClient};
use wallet_connector::WalletConnector;
use xerror::engine::EngineError;
use xerror::envelope::EnvelopeError;
use xerror::relay_client::RelayClientError;

use crate::envelope::{self, ServiceKeys};
use crate::events::EventLogger;
use crate::repository::Repository;

pub struct BridgeEngine {
    pub(crate) keys: ServiceKeys,
    pub(crate) repo: Arc<dyn Repository>,
    pub(crate) wallet: Arc<dyn WalletConnector>,
    pub(crate) relay: Arc<dyn RelayClient>,
    pub(crate) event_logger: EventLogger,
    pub(crate) logger: Logger,
    semaphore: Arc<Semaphore>,
    handler_width: usize,
    payment_locks: StdMutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl BridgeEngine {
    pub fn new(
        keys: ServiceKeys,
        repo: Arc<dyn Repository>,
        wallet: Arc<dyn WalletConnector>,
        relay: Arc<dyn RelayClient>,
        event_logger: EventLogger,
        handler_width: usize,
        logger: Logger,
    ) -> Self {
        Self {
            keys,
            repo,
            wallet,
            relay,
            event_logger,
            logger,
            semaphore: Arc::new(Semaphore::new(handler_width)),
            handler_width,
            payment_locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Serializes the budget-check/payment path per app so two concurrent
    /// payments cannot both pass the check.
    pub(crate) fn payment_lock(&self, app_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.payment_locks.lock().unwrap();
        locks.entry(app_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Subscribe for requests addressed to the service key and dispatch each
    /// incoming event on its own task, bounded by the handler semaphore.
    /// Returns `Err` when the relay drops the subscription; the caller owns
    /// reconnect and backoff.
    pub async fn run(
        self: Arc<Self>,
        since_seconds: u64,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), RelayClientError> {
        let filter = Filter {
            kinds: vec![REQUEST_KIND],
            p_tags: vec![self.keys.public_key().to_string()],
            since: Some(since_seconds),
        };
        let mut sub = self.relay.subscribe(filter).await?;

        if let Err(err) = self.publish_info().await {
            log::error!(self.logger, "Failed to publish info event, error: {}", err);
        }

        tokio::select! {
            _ = &mut sub.eos => {
                log::info!(self.logger, "Received end of stored events");
            }
            _ = shutdown.changed() => {
                log::info!(self.logger, "Exiting subscription");
                return Ok(());
            }
        }

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    log::info!(self.logger, "Exiting subscription");
                    break;
                }
                maybe_event = sub.events.recv() => match maybe_event {
                    Some(event) => {
                        let permit = match self.semaphore.clone().acquire_owned().await {
                            Ok(permit) => permit,
                            Err(_) => break,
                        };
                        let engine = Arc::clone(&self);
                        tokio::spawn(async move {
                            engine.handle_event(event).await;
                            drop(permit);
                        });
                    }
                    None => {
                        self.drain().await;
                        return Err(RelayClientError::ConnectionClosed);
                    }
                }
            }
        }

        self.drain().await;
        Ok(())
    }

    async fn drain(&self) {
        let _ = self.semaphore.acquire_many(self.handler_width as u32).await;
    }

    /// Publish the capability advertisement. Called on every relay attach.
    pub async fn publish_info(&self) -> Result<(), EngineError> {
        let mut event = Event {
            id: String::new(),
            pubkey: self.keys.public_key().to_string(),
            created_at: utils::time::time_now_seconds(),
            kind: INFO_KIND,
            tags: vec![],
            content: METHODS.join(" "),
            sig: String::new(),
        };
        envelope::sign_event(&mut event, &self.keys).map_err(|_| EngineError::InfoPublishFailed)?;
        match self.relay.publish(&event).await {
            Ok(PublishStatus::Succeeded) => Ok(()),
            _ => Err(EngineError::InfoPublishFailed),
        }
    }

    /// Receive → deduplicate → identify app → decrypt → parse → authorize →
    /// dispatch → respond. Errors never escape: they end as a persisted
    /// outcome or a dropped event.
    pub async fn handle_event(&self, event: Event) {
        log::info!(self.logger, "Processing event";
            "event_id" => %event.id, "event_kind" => event.kind);

        match self.repo.find_request_event_by_nostr_id(&event.id) {
            Ok(None) => {}
            Ok(Some(_)) => {
                log::warn!(self.logger, "Event already processed"; "event_id" => %event.id);
                return;
            }
            Err(err) => {
                log::error!(self.logger, "Dedup probe failed, error: {}", err;
                    "event_id" => %event.id);
                return;
            }
        }

        if envelope::verify_event(&event).is_err() {
            log::warn!(self.logger, "Dropping event with invalid signature";
                "event_id" => %event.id, "pubkey" => %event.pubkey);
            return;
        }

        let app = match self.repo.find_app_by_pubkey(&event.pubkey) {
            Ok(Some(app)) => app,
            Ok(None) => {
                self.reply_unauthorized(&event).await;
                return;
            }
            Err(err) => {
                log::error!(self.logger, "App lookup failed, error: {}", err;
                    "event_id" => %event.id);
                return;
            }
        };

        log::info!(self.logger, "App found for event";
            "event_id" => %event.id, "app_id" => app.id);

        // Rederive from the stored pubkey rather than the event author.
        let shared_secret = match envelope::shared_secret(&app.nostr_pubkey, self.keys.secret_key()) {
            Ok(shared_secret) => shared_secret,
            Err(err) => {
                log::error!(self.logger, "Failed to derive shared secret, error: {}", err;
                    "event_id" => %event.id, "app_id" => app.id);
                return;
            }
        };

        let plaintext = match envelope::decrypt(&event.content, &shared_secret) {
            Ok(plaintext) => plaintext,
            Err(err) => {
                // No response: nothing can be encrypted back safely.
                log::warn!(self.logger, "Failed to decrypt event content, error: {}", err;
                    "event_id" => %event.id, "app_id" => app.id);
                return;
            }
        };

        let request = match serde_json::from_str::<Request>(&plaintext) {
            Ok(request) => request,
            Err(err) => {
                log::warn!(self.logger, "Failed to parse request payload, error: {}", err;
                    "event_id" => %event.id, "app_id" => app.id);
                return;
            }
        };

        let request_event_id =
            match self.repo.insert_request_event(Some(app.id), &event.id, &event.content) {
                Ok(id) => id,
                Err(err) => {
                    log::error!(self.logger, "Failed to persist request event, error: {}", err;
                        "event_id" => %event.id, "app_id" => app.id);
                    return;
                }
            };

        match request.method.as_str() {
            MULTI_PAY_INVOICE_METHOD => {
                self.handle_multi_pay_invoice(&event, &app, request_event_id, &request, &shared_secret)
                    .await;
            }
            MULTI_PAY_KEYSEND_METHOD => {
                self.handle_multi_pay_keysend(&event, &app, request_event_id, &request, &shared_secret)
                    .await;
            }
            _ => {
                let response = self.dispatch_single(&app, request_event_id, &request).await;
                match self.create_response(&event, &response, vec![], &shared_secret) {
                    Ok(resp) => {
                        self.publish_response(&event, Some(app.id), Some(request_event_id), resp, &shared_secret)
                            .await;
                    }
                    Err(err) => {
                        log::error!(self.logger, "Failed to build response, error: {}", err;
                            "event_id" => %event.id, "app_id" => app.id);
                    }
                }
            }
        }

        if let Err(err) = self
            .repo
            .update_request_event_state(request_event_id, REQUEST_EVENT_STATE_PROCESSED)
        {
            log::error!(self.logger, "Failed to mark request event processed, error: {}", err;
                "event_id" => %event.id, "app_id" => app.id);
        }
    }

    async fn dispatch_single(&self, app: &App, request_event_id: i64, request: &Request) -> Response {
        match request.method.as_str() {
            PAY_INVOICE_METHOD => self.handle_pay_invoice(app, request_event_id, request).await,
            PAY_KEYSEND_METHOD => self.handle_pay_keysend(app, request_event_id, request).await,
            GET_BALANCE_METHOD => self.handle_get_balance(app, request).await,
            MAKE_INVOICE_METHOD => self.handle_make_invoice(app, request).await,
            LOOKUP_INVOICE_METHOD => self.handle_lookup_invoice(app, request).await,
            LIST_TRANSACTIONS_METHOD => self.handle_list_transactions(app, request).await,
            GET_INFO_METHOD => self.handle_get_info(app, request).await,
            unknown => {
                self.event_logger
                    .log("unknown_method", json!({ "method": unknown }));
                Response::error(
                    &request.method,
                    ErrorCode::NotImplemented,
                    format!("Unknown method: {}", unknown),
                )
            }
        }
    }

    async fn reply_unauthorized(&self, event: &Event) {
        log::info!(self.logger, "No app found for pubkey"; "pubkey" => %event.pubkey);
        let shared_secret = match envelope::shared_secret(&event.pubkey, self.keys.secret_key()) {
            Ok(shared_secret) => shared_secret,
            Err(err) => {
                log::error!(self.logger, "Failed to derive shared secret, error: {}", err;
                    "event_id" => %event.id);
                return;
            }
        };
        let response = Response::error(
            "",
            ErrorCode::Unauthorized,
            "The public key does not have a wallet connected.",
        );
        match self.create_response(event, &response, vec![], &shared_secret) {
            Ok(resp) => {
                self.publish_response(event, None, None, resp, &shared_secret).await;
            }
            Err(err) => {
                log::error!(self.logger, "Failed to build response, error: {}", err;
                    "event_id" => %event.id);
            }
        }
        self.event_logger
            .log("request_unauthorized", json!({ "pubkey": event.pubkey }));
    }

    /// Encrypt and sign one response event. Tags always carry the sender
    /// (`p`) and the originating event (`e`); multi responses add `d`.
    pub(crate) fn create_response(
        &self,
        request_event: &Event,
        payload: &Response,
        extra_tags: Vec<Vec<String>>,
        shared_secret: &[u8; 32],
    ) -> Result<Event, EnvelopeError> {
        let plaintext =
            serde_json::to_string(payload).map_err(|_| EnvelopeError::SerializationFailed)?;
        let content = envelope::encrypt(&plaintext, shared_secret);

        let mut tags = vec![
            vec!["p".to_string(), request_event.pubkey.clone()],
            vec!["e".to_string(), request_event.id.clone()],
        ];
        tags.extend(extra_tags);

        let mut resp = Event {
            id: String::new(),
            pubkey: self.keys.public_key().to_string(),
            created_at: utils::time::time_now_seconds(),
            kind: RESPONSE_KIND,
            tags,
            content,
            sig: String::new(),
        };
        envelope::sign_event(&mut resp, &self.keys)?;
        Ok(resp)
    }
}
