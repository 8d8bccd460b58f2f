//! End-to-end dispatch tests against in-memory repository, wallet and
//! relay doubles.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use slog::{o, Drain, Logger};

use bridge_engine::engine::BridgeEngine;
use bridge_engine::envelope::{self, ServiceKeys};
use bridge_engine::events::EventLogger;
use bridge_engine::repository::Repository;
use core_types::event::Event;
use core_types::payload::{NodeInfo, TlvRecord, Transaction};
use core_types::REQUEST_KIND;
use models::app_permissions::AppPermission;
use models::apps::App;
use models::payments::Payment;
use models::request_events::RequestEvent;
use models::response_events::ResponseEvent;
use relay_client::{Filter, PublishStatus, RelayClient, Subscription};
use wallet_connector::WalletConnector;
use xerror::engine::EngineError;
use xerror::relay_client::RelayClientError;
use xerror::wallet_connector::WalletConnectorError;

const SERVICE_SECRET: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const CLIENT_SECRET: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
const DEFAULT_PREIMAGE: &str = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";

#[derive(Default)]
struct MemoryState {
    apps: Vec<App>,
    permissions: Vec<AppPermission>,
    request_events: Vec<RequestEvent>,
    response_events: Vec<ResponseEvent>,
    payments: Vec<Payment>,
    next_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default, Clone)]
struct MemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRepository {
    fn add_app(&self, pubkey: &str) -> i64 {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.apps.push(App {
            id,
            name: "test app".to_string(),
            nostr_pubkey: pubkey.to_string(),
            created_at: 0,
        });
        id
    }

    fn add_permission(
        &self,
        app_id: i64,
        method: &str,
        max_amount: i64,
        budget_renewal: &str,
        expires_at: Option<i64>,
    ) {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.permissions.push(AppPermission {
            id,
            app_id,
            request_method: method.to_string(),
            max_amount,
            budget_renewal: budget_renewal.to_string(),
            expires_at,
            created_at: 0,
        });
    }

    fn add_settled_payment(&self, app_id: i64, amount: i32) {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.payments.push(Payment {
            id,
            app_id,
            request_event_id: 0,
            amount,
            preimage: Some(DEFAULT_PREIMAGE.to_string()),
            payment_request: None,
            created_at: utils::time::time_now() as i64,
        });
    }

    fn payments(&self) -> Vec<Payment> {
        self.state.lock().unwrap().payments.clone()
    }

    fn request_events(&self) -> Vec<RequestEvent> {
        self.state.lock().unwrap().request_events.clone()
    }

    fn response_events(&self) -> Vec<ResponseEvent> {
        self.state.lock().unwrap().response_events.clone()
    }
}

impl Repository for MemoryRepository {
    fn find_request_event_by_nostr_id(&self, nostr_id: &str) -> Result<Option<RequestEvent>, EngineError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .request_events
            .iter()
            .find(|row| row.nostr_id == nostr_id)
            .cloned())
    }

    fn find_app_by_pubkey(&self, pubkey: &str) -> Result<Option<App>, EngineError> {
        let state = self.state.lock().unwrap();
        Ok(state.apps.iter().find(|app| app.nostr_pubkey == pubkey).cloned())
    }

    fn find_permission(&self, app_id: i64, method: &str) -> Result<Option<AppPermission>, EngineError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .permissions
            .iter()
            .find(|p| p.app_id == app_id && p.request_method == method)
            .cloned())
    }

    fn list_permission_methods(&self, app_id: i64) -> Result<Vec<String>, EngineError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .permissions
            .iter()
            .filter(|p| p.app_id == app_id)
            .map(|p| p.request_method.clone())
            .collect())
    }

    fn insert_request_event(
        &self,
        app_id: Option<i64>,
        nostr_id: &str,
        content: &str,
    ) -> Result<i64, EngineError> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.request_events.push(RequestEvent {
            id,
            app_id,
            nostr_id: nostr_id.to_string(),
            content: content.to_string(),
            state: core_types::REQUEST_EVENT_STATE_RECEIVED.to_string(),
            replied_at: None,
            created_at: utils::time::time_now() as i64,
        });
        Ok(id)
    }

    fn update_request_event_state(&self, id: i64, new_state: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        if let Some(row) = state.request_events.iter_mut().find(|row| row.id == id) {
            row.state = new_state.to_string();
        }
        Ok(())
    }

    fn set_request_event_replied(&self, id: i64, replied_at: i64) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        if let Some(row) = state.request_events.iter_mut().find(|row| row.id == id) {
            row.replied_at = Some(replied_at);
        }
        Ok(())
    }

    fn insert_response_event(
        &self,
        app_id: Option<i64>,
        request_event_id: Option<i64>,
        nostr_id: &str,
        content: &str,
        decrypted_content: &str,
    ) -> Result<i64, EngineError> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.response_events.push(ResponseEvent {
            id,
            app_id,
            request_event_id,
            nostr_id: nostr_id.to_string(),
            content: content.to_string(),
            decrypted_content: decrypted_content.to_string(),
            state: core_types::RESPONSE_EVENT_STATE_RECEIVED.to_string(),
            replied_at: None,
            created_at: utils::time::time_now() as i64,
        });
        Ok(id)
    }

    fn update_response_event_state(&self, id: i64, new_state: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        if let Some(row) = state.response_events.iter_mut().find(|row| row.id == id) {
            row.state = new_state.to_string();
        }
        Ok(())
    }

    fn set_response_event_replied(&self, id: i64, new_state: &str, replied_at: i64) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        if let Some(row) = state.response_events.iter_mut().find(|row| row.id == id) {
            row.state = new_state.to_string();
            row.replied_at = Some(replied_at);
        }
        Ok(())
    }

    fn insert_payment(
        &self,
        app_id: i64,
        request_event_id: i64,
        amount: i64,
        payment_request: Option<&str>,
    ) -> Result<i64, EngineError> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.payments.push(Payment {
            id,
            app_id,
            request_event_id,
            amount: amount as i32,
            preimage: None,
            payment_request: payment_request.map(|s| s.to_string()),
            created_at: utils::time::time_now() as i64,
        });
        Ok(id)
    }

    fn update_payment_preimage(&self, id: i64, preimage: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        if let Some(row) = state.payments.iter_mut().find(|row| row.id == id) {
            row.preimage = Some(preimage.to_string());
        }
        Ok(())
    }

    fn sum_payments_since(&self, app_id: i64, cutoff: i64) -> Result<u64, EngineError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .payments
            .iter()
            .filter(|p| p.app_id == app_id && p.preimage.is_some() && p.created_at > cutoff)
            .map(|p| p.amount as u64)
            .sum())
    }
}

#[derive(Default)]
struct MockWallet {
    pay_results: Mutex<VecDeque<Result<String, WalletConnectorError>>>,
    paid_invoices: Mutex<Vec<String>>,
    keysend_destinations: Mutex<Vec<String>>,
}

impl MockWallet {
    fn queue_pay_result(&self, result: Result<&str, WalletConnectorError>) {
        self.pay_results
            .lock()
            .unwrap()
            .push_back(result.map(|s| s.to_string()));
    }

    fn pay_call_count(&self) -> usize {
        self.paid_invoices.lock().unwrap().len() + self.keysend_destinations.lock().unwrap().len()
    }
}

#[async_trait]
impl WalletConnector for MockWallet {
    async fn send_payment(&self, invoice: String) -> Result<String, WalletConnectorError> {
        self.paid_invoices.lock().unwrap().push(invoice);
        self.pay_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(DEFAULT_PREIMAGE.to_string()))
    }

    async fn send_keysend(
        &self,
        _amount_msat: u64,
        dest_pubkey: String,
        preimage: Option<String>,
        _tlv_records: Vec<TlvRecord>,
    ) -> Result<String, WalletConnectorError> {
        self.keysend_destinations.lock().unwrap().push(dest_pubkey);
        self.pay_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(preimage.unwrap_or_else(|| DEFAULT_PREIMAGE.to_string())))
    }

    async fn get_balance(&self) -> Result<u64, WalletConnectorError> {
        Ok(21_000_000)
    }

    async fn make_invoice(
        &self,
        amount_msat: u64,
        description: String,
        _description_hash: String,
        expiry_seconds: u64,
    ) -> Result<Transaction, WalletConnectorError> {
        let created_at = utils::time::time_now_seconds() as i64;
        Ok(Transaction {
            transaction_type: "incoming".to_string(),
            invoice: "lnbcrt1test".to_string(),
            description,
            amount: amount_msat as i64,
            created_at,
            expires_at: Some(created_at + expiry_seconds as i64),
            ..Default::default()
        })
    }

    async fn lookup_invoice(&self, _payment_hash: String) -> Result<Transaction, WalletConnectorError> {
        Err(WalletConnectorError::NotFound)
    }

    async fn list_transactions(
        &self,
        _from: u64,
        _until: u64,
        _limit: u64,
        _offset: u64,
        _unpaid: bool,
        _transaction_type: Option<String>,
    ) -> Result<Vec<Transaction>, WalletConnectorError> {
        Ok(vec![])
    }

    async fn get_info(&self) -> Result<NodeInfo, WalletConnectorError> {
        Ok(NodeInfo {
            pubkey: "02abcdef".to_string(),
            alias: "test node".to_string(),
            color: "#ff9900".to_string(),
            network: "regtest".to_string(),
            block_height: 100,
            block_hash: "deadbeef".to_string(),
        })
    }

    async fn shutdown(&self) -> Result<(), WalletConnectorError> {
        Ok(())
    }
}

#[derive(Default)]
struct MockRelay {
    published: Mutex<Vec<Event>>,
    statuses: Mutex<VecDeque<PublishStatus>>,
    subscription: Mutex<Option<Subscription>>,
}

impl MockRelay {
    fn published(&self) -> Vec<Event> {
        self.published.lock().unwrap().clone()
    }

    fn queue_status(&self, status: PublishStatus) {
        self.statuses.lock().unwrap().push_back(status);
    }
}

#[async_trait]
impl RelayClient for MockRelay {
    async fn subscribe(&self, _filter: Filter) -> Result<Subscription, RelayClientError> {
        self.subscription
            .lock()
            .unwrap()
            .take()
            .ok_or(RelayClientError::FailedToConnect)
    }

    async fn publish(&self, event: &Event) -> Result<PublishStatus, RelayClientError> {
        self.published.lock().unwrap().push(event.clone());
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(PublishStatus::Succeeded))
    }
}

struct Harness {
    engine: Arc<BridgeEngine>,
    repo: MemoryRepository,
    wallet: Arc<MockWallet>,
    relay: Arc<MockRelay>,
    client: ServiceKeys,
    service_pubkey: String,
    shared_secret: [u8; 32],
}

fn harness() -> Harness {
    let service = ServiceKeys::from_secret_hex(SERVICE_SECRET).unwrap();
    let client = ServiceKeys::from_secret_hex(CLIENT_SECRET).unwrap();
    let shared_secret = envelope::shared_secret(service.public_key(), client.secret_key()).unwrap();
    let service_pubkey = service.public_key().to_string();

    let repo = MemoryRepository::default();
    let wallet = Arc::new(MockWallet::default());
    let relay = Arc::new(MockRelay::default());
    let logger = Logger::root(slog::Discard.fuse(), o!());
    let event_logger = EventLogger::spawn(logger.clone());

    let engine = Arc::new(BridgeEngine::new(
        service,
        Arc::new(repo.clone()),
        wallet.clone(),
        relay.clone(),
        event_logger,
        8,
        logger,
    ));

    Harness {
        engine,
        repo,
        wallet,
        relay,
        client,
        service_pubkey,
        shared_secret,
    }
}

impl Harness {
    fn request_event(&self, method: &str, params: Value) -> Event {
        let plaintext = json!({ "method": method, "params": params }).to_string();
        let content = envelope::encrypt(&plaintext, &self.shared_secret);
        let mut event = Event {
            id: String::new(),
            pubkey: self.client.public_key().to_string(),
            created_at: utils::time::time_now_seconds(),
            kind: REQUEST_KIND,
            tags: vec![vec!["p".to_string(), self.service_pubkey.clone()]],
            content,
            sig: String::new(),
        };
        envelope::sign_event(&mut event, &self.client).unwrap();
        event
    }

    fn decrypt_response(&self, response: &Event) -> Value {
        let plaintext = envelope::decrypt(&response.content, &self.shared_secret).unwrap();
        serde_json::from_str(&plaintext).unwrap()
    }
}

#[tokio::test]
async fn unknown_app_gets_unauthorized_response() {
    let h = harness();
    let event = h.request_event("get_balance", json!({}));

    h.engine.handle_event(event.clone()).await;

    let published = h.relay.published();
    assert_eq!(published.len(), 1);
    let response = &published[0];
    assert_eq!(response.tag_value("p"), Some(event.pubkey.as_str()));
    assert_eq!(response.tag_value("e"), Some(event.id.as_str()));

    let payload = h.decrypt_response(response);
    assert_eq!(payload["error"]["code"], "UNAUTHORIZED");

    assert!(h.repo.payments().is_empty());
    assert!(h.repo.request_events().is_empty());
}

#[tokio::test]
async fn pay_invoice_succeeds_within_budget() {
    let h = harness();
    let app_id = h.repo.add_app(h.client.public_key());
    h.repo.add_permission(app_id, "pay_invoice", 1000, "never", None);
    h.wallet.queue_pay_result(Ok("deadbeef"));

    let event = h.request_event(
        "pay_invoice",
        json!({ "invoice": "lnbc500n1testinvoice", "amount": 500_000 }),
    );
    h.engine.handle_event(event.clone()).await;

    let payments = h.repo.payments();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].amount, 500);
    assert_eq!(payments[0].preimage.as_deref(), Some("deadbeef"));
    assert_eq!(payments[0].payment_request.as_deref(), Some("lnbc500n1testinvoice"));

    let request_events = h.repo.request_events();
    assert_eq!(request_events.len(), 1);
    assert_eq!(request_events[0].state, "processed");
    assert!(request_events[0].replied_at.is_some());

    let response_events = h.repo.response_events();
    assert_eq!(response_events.len(), 1);
    assert_eq!(response_events[0].state, "confirmed");

    let published = h.relay.published();
    assert_eq!(published.len(), 1);
    let payload = h.decrypt_response(&published[0]);
    assert_eq!(payload["result_type"], "pay_invoice");
    assert_eq!(payload["result"]["preimage"], "deadbeef");
    assert!(payload.get("error").is_none());
}

#[tokio::test]
async fn exhausted_budget_rejects_without_backend_call() {
    let h = harness();
    let app_id = h.repo.add_app(h.client.public_key());
    h.repo.add_permission(app_id, "pay_invoice", 1000, "never", None);
    h.repo.add_settled_payment(app_id, 900);

    let event = h.request_event(
        "pay_invoice",
        json!({ "invoice": "lnbc2u1testinvoice", "amount": 200_000 }),
    );
    h.engine.handle_event(event).await;

    assert_eq!(h.wallet.pay_call_count(), 0);
    // Only the pre-existing settled payment remains.
    assert_eq!(h.repo.payments().len(), 1);

    let published = h.relay.published();
    assert_eq!(published.len(), 1);
    let payload = h.decrypt_response(&published[0]);
    assert_eq!(payload["error"]["code"], "QUOTA_EXCEEDED");
}

#[tokio::test]
async fn multi_pay_reports_each_sub_request() {
    let h = harness();
    let app_id = h.repo.add_app(h.client.public_key());
    h.repo.add_permission(app_id, "multi_pay_invoice", 0, "never", None);
    h.wallet.queue_pay_result(Ok("aaaa"));
    h.wallet
        .queue_pay_result(Err(WalletConnectorError::FailedToSendPayment));

    let event = h.request_event(
        "multi_pay_invoice",
        json!({
            "invoices": [
                { "id": "first", "invoice": "lnbc1first", "amount": 1_000 },
                { "id": "second", "invoice": "lnbc1second", "amount": 2_000 },
            ]
        }),
    );
    h.engine.handle_event(event.clone()).await;

    let published = h.relay.published();
    assert_eq!(published.len(), 2);

    let mut seen_ids = vec![];
    for response in &published {
        assert_eq!(response.tag_value("e"), Some(event.id.as_str()));
        let d_tag = response.tag_value("d").expect("missing d tag").to_string();
        let payload = h.decrypt_response(response);
        match d_tag.as_str() {
            "first" => assert_eq!(payload["result"]["preimage"], "aaaa"),
            "second" => assert_eq!(payload["error"]["code"], "PAYMENT_FAILED"),
            other => panic!("unexpected d tag {}", other),
        }
        seen_ids.push(d_tag);
    }
    seen_ids.sort();
    assert_eq!(seen_ids, vec!["first", "second"]);
}

#[tokio::test]
async fn replayed_event_is_a_no_op() {
    let h = harness();
    let app_id = h.repo.add_app(h.client.public_key());
    h.repo.add_permission(app_id, "pay_invoice", 0, "never", None);

    let event = h.request_event(
        "pay_invoice",
        json!({ "invoice": "lnbc1replay", "amount": 1_000 }),
    );
    h.engine.handle_event(event.clone()).await;
    h.engine.handle_event(event).await;

    assert_eq!(h.repo.request_events().len(), 1);
    assert_eq!(h.wallet.pay_call_count(), 1);
    assert_eq!(h.relay.published().len(), 1);
}

#[tokio::test]
async fn expired_permission_is_rejected() {
    let h = harness();
    let app_id = h.repo.add_app(h.client.public_key());
    let past = utils::time::time_now() as i64 - 1000;
    h.repo.add_permission(app_id, "pay_invoice", 0, "never", Some(past));

    let event = h.request_event(
        "pay_invoice",
        json!({ "invoice": "lnbc1expired", "amount": 1_000 }),
    );
    h.engine.handle_event(event).await;

    assert_eq!(h.wallet.pay_call_count(), 0);
    let published = h.relay.published();
    assert_eq!(published.len(), 1);
    let payload = h.decrypt_response(&published[0]);
    assert_eq!(payload["error"]["code"], "EXPIRED");
}

#[tokio::test]
async fn missing_permission_is_restricted() {
    let h = harness();
    h.repo.add_app(h.client.public_key());

    let event = h.request_event("get_balance", json!({}));
    h.engine.handle_event(event).await;

    let published = h.relay.published();
    assert_eq!(published.len(), 1);
    let payload = h.decrypt_response(&published[0]);
    assert_eq!(payload["error"]["code"], "RESTRICTED");
}

#[tokio::test]
async fn invalid_signature_has_no_side_effects() {
    let h = harness();
    h.repo.add_app(h.client.public_key());

    let mut event = h.request_event("get_balance", json!({}));
    event.content = envelope::encrypt("{\"method\":\"get_balance\"}", &h.shared_secret);

    h.engine.handle_event(event).await;

    assert!(h.relay.published().is_empty());
    assert!(h.repo.request_events().is_empty());
    assert!(h.repo.response_events().is_empty());
}

#[tokio::test]
async fn unknown_method_is_not_implemented() {
    let h = harness();
    h.repo.add_app(h.client.public_key());

    let event = h.request_event("open_channel", json!({}));
    h.engine.handle_event(event).await;

    let published = h.relay.published();
    assert_eq!(published.len(), 1);
    let payload = h.decrypt_response(&published[0]);
    assert_eq!(payload["result_type"], "open_channel");
    assert_eq!(payload["error"]["code"], "NOT_IMPLEMENTED");
}

#[tokio::test]
async fn failed_publish_marks_response_failed() {
    let h = harness();
    let app_id = h.repo.add_app(h.client.public_key());
    h.repo.add_permission(app_id, "get_balance", 0, "never", None);
    h.relay.queue_status(PublishStatus::Failed);

    let event = h.request_event("get_balance", json!({}));
    h.engine.handle_event(event).await;

    let response_events = h.repo.response_events();
    assert_eq!(response_events.len(), 1);
    assert_eq!(response_events[0].state, "failed");
    assert!(response_events[0].replied_at.is_none());
    assert!(h.repo.request_events()[0].replied_at.is_none());
}

#[tokio::test]
async fn unconfirmed_publish_is_recorded() {
    let h = harness();
    let app_id = h.repo.add_app(h.client.public_key());
    h.repo.add_permission(app_id, "get_balance", 0, "never", None);
    h.relay.queue_status(PublishStatus::Unconfirmed);

    let event = h.request_event("get_balance", json!({}));
    h.engine.handle_event(event).await;

    let response_events = h.repo.response_events();
    assert_eq!(response_events.len(), 1);
    assert_eq!(response_events[0].state, "unconfirmed");
}

#[tokio::test]
async fn get_info_reports_granted_methods() {
    let h = harness();
    let app_id = h.repo.add_app(h.client.public_key());
    h.repo.add_permission(app_id, "get_info", 0, "never", None);
    h.repo.add_permission(app_id, "pay_invoice", 1000, "daily", None);

    let event = h.request_event("get_info", json!({}));
    h.engine.handle_event(event).await;

    let published = h.relay.published();
    assert_eq!(published.len(), 1);
    let payload = h.decrypt_response(&published[0]);
    assert_eq!(payload["result"]["alias"], "test node");
    let methods: Vec<String> = payload["result"]["methods"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert!(methods.contains(&"get_info".to_string()));
    assert!(methods.contains(&"pay_invoice".to_string()));
}

#[tokio::test]
async fn keysend_records_payment_and_preimage() {
    let h = harness();
    let app_id = h.repo.add_app(h.client.public_key());
    h.repo.add_permission(app_id, "pay_keysend", 0, "never", None);
    h.wallet.queue_pay_result(Ok("cafebabe"));

    let event = h.request_event(
        "pay_keysend",
        json!({ "amount": 3_000, "pubkey": "02aabb" }),
    );
    h.engine.handle_event(event).await;

    let payments = h.repo.payments();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].amount, 3);
    assert_eq!(payments[0].preimage.as_deref(), Some("cafebabe"));
    assert!(payments[0].payment_request.is_none());

    let published = h.relay.published();
    let payload = h.decrypt_response(&published[0]);
    assert_eq!(payload["result"]["preimage"], "cafebabe");
}

#[tokio::test]
async fn subscription_loop_dispatches_and_surfaces_disconnect() {
    let h = harness();
    let app_id = h.repo.add_app(h.client.public_key());
    h.repo.add_permission(app_id, "get_balance", 0, "never", None);

    let (events_tx, events_rx) = tokio::sync::mpsc::channel(8);
    let (eos_tx, eos_rx) = tokio::sync::oneshot::channel();
    *h.relay.subscription.lock().unwrap() = Some(Subscription {
        events: events_rx,
        eos: eos_rx,
    });

    let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let run = tokio::spawn(h.engine.clone().run(0, shutdown_rx));

    eos_tx.send(()).unwrap();
    let event = h.request_event("get_balance", json!({}));
    events_tx.send(event).await.unwrap();
    drop(events_tx);

    let result = run.await.unwrap();
    assert_eq!(result, Err(RelayClientError::ConnectionClosed));

    // The info announcement plus the one response.
    let published = h.relay.published();
    assert_eq!(published.len(), 2);
    assert_eq!(published[0].kind, core_types::INFO_KIND);
    let payload = h.decrypt_response(&published[1]);
    assert_eq!(payload["result"]["balance"], 21_000_000);
}

#[tokio::test]
async fn shutdown_drains_and_exits_cleanly() {
    let h = harness();

    let (_events_tx, events_rx) = tokio::sync::mpsc::channel(8);
    let (eos_tx, eos_rx) = tokio::sync::oneshot::channel();
    *h.relay.subscription.lock().unwrap() = Some(Subscription {
        events: events_rx,
        eos: eos_rx,
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let run = tokio::spawn(h.engine.clone().run(0, shutdown_rx));

    eos_tx.send(()).unwrap();
    shutdown_tx.send(true).unwrap();

    let result = run.await.unwrap();
    assert_eq!(result, Ok(()));
}
