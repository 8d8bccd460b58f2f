//! Websocket relay connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, StreamExt};
use futures_util::SinkExt;
use serde_json::{json, Value};
use slog as log;
use slog::Logger;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use core_types::event::Event;
use xerror::relay_client::RelayClientError;

use crate::{Filter, PublishStatus, RelayClient, Subscription};

const EVENT_CHANNEL_SIZE: usize = 256;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

struct SubscriptionSlot {
    sub_id: String,
    events_tx: mpsc::Sender<Event>,
    eos_tx: Option<oneshot::Sender<()>>,
}

/// One websocket connection to a relay. Publish calls are concurrent-safe;
/// a single live subscription is supported and a second subscribe on the
/// same connection fails.
pub struct RelayConnection {
    write: Mutex<WsSink>,
    pending_acks: Arc<StdMutex<HashMap<String, oneshot::Sender<bool>>>>,
    subscription: Arc<StdMutex<Option<SubscriptionSlot>>>,
    sub_counter: AtomicU64,
    ack_timeout: Duration,
}

impl RelayConnection {
    pub async fn connect(url: &str, ack_timeout: Duration, logger: Logger) -> Result<Self, RelayClientError> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|_| RelayClientError::FailedToConnect)?;
        let (write, read) = ws.split();

        let pending_acks: Arc<StdMutex<HashMap<String, oneshot::Sender<bool>>>> =
            Arc::new(StdMutex::new(HashMap::new()));
        let subscription: Arc<StdMutex<Option<SubscriptionSlot>>> = Arc::new(StdMutex::new(None));

        tokio::spawn(read_loop(read, pending_acks.clone(), subscription.clone(), logger));

        Ok(Self {
            write: Mutex::new(write),
            pending_acks,
            subscription,
            sub_counter: AtomicU64::new(0),
            ack_timeout,
        })
    }

    async fn send_frame(&self, frame: Value) -> Result<(), RelayClientError> {
        let mut write = self.write.lock().await;
        write
            .send(Message::Text(frame.to_string()))
            .await
            .map_err(|_| RelayClientError::FailedToSend)
    }
}

#[async_trait]
impl RelayClient for RelayConnection {
    async fn subscribe(&self, filter: Filter) -> Result<Subscription, RelayClientError> {
        let sub_id = format!("sub{}", self.sub_counter.fetch_add(1, Ordering::SeqCst));
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let (eos_tx, eos_rx) = oneshot::channel();

        {
            let mut slot = self.subscription.lock().unwrap();
            if slot.is_some() {
                return Err(RelayClientError::SubscriptionLimit);
            }
            *slot = Some(SubscriptionSlot {
                sub_id: sub_id.clone(),
                events_tx,
                eos_tx: Some(eos_tx),
            });
        }

        self.send_frame(json!(["REQ", sub_id, filter.to_json()])).await?;

        Ok(Subscription {
            events: events_rx,
            eos: eos_rx,
        })
    }

    async fn publish(&self, event: &Event) -> Result<PublishStatus, RelayClientError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.pending_acks
            .lock()
            .unwrap()
            .insert(event.id.clone(), ack_tx);

        if let Err(err) = self.send_frame(json!(["EVENT", event])).await {
            self.pending_acks.lock().unwrap().remove(&event.id);
            return Err(err);
        }

        match tokio::time::timeout(self.ack_timeout, ack_rx).await {
            Ok(Ok(true)) => Ok(PublishStatus::Succeeded),
            Ok(Ok(false)) => Ok(PublishStatus::Failed),
            // Sender dropped: the connection died before an ACK arrived.
            Ok(Err(_)) => Ok(PublishStatus::Unconfirmed),
            Err(_) => {
                self.pending_acks.lock().unwrap().remove(&event.id);
                Ok(PublishStatus::Unconfirmed)
            }
        }
    }
}

async fn read_loop(
    mut read: futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    pending_acks: Arc<StdMutex<HashMap<String, oneshot::Sender<bool>>>>,
    subscription: Arc<StdMutex<Option<SubscriptionSlot>>>,
    logger: Logger,
) {
    while let Some(msg) = read.next().await {
        let txt = match msg {
            Ok(Message::Text(txt)) => txt,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                log::warn!(logger, "Relay read failed, error: {:?}", err);
                break;
            }
        };
        let frame = match serde_json::from_str::<Value>(&txt) {
            Ok(frame) => frame,
            Err(_) => continue,
        };
        let arr = match frame.as_array() {
            Some(arr) => arr,
            None => continue,
        };
        match arr.first().and_then(|v| v.as_str()) {
            Some("EVENT") if arr.len() >= 3 => {
                let event = match serde_json::from_value::<Event>(arr[2].clone()) {
                    Ok(event) => event,
                    Err(err) => {
                        log::warn!(logger, "Dropping malformed event frame, error: {:?}", err);
                        continue;
                    }
                };
                let events_tx = {
                    let slot = subscription.lock().unwrap();
                    match slot.as_ref() {
                        Some(slot) if Some(slot.sub_id.as_str()) == arr[1].as_str() => {
                            Some(slot.events_tx.clone())
                        }
                        _ => None,
                    }
                };
                if let Some(events_tx) = events_tx {
                    // Applies backpressure to the relay read when the
                    // handler queue is saturated.
                    if events_tx.send(event).await.is_err() {
                        break;
                    }
                }
            }
            Some("EOSE") => {
                let mut slot = subscription.lock().unwrap();
                if let Some(slot) = slot.as_mut() {
                    if Some(slot.sub_id.as_str()) == arr.get(1).and_then(|v| v.as_str()) {
                        if let Some(eos_tx) = slot.eos_tx.take() {
                            let _ = eos_tx.send(());
                        }
                    }
                }
            }
            Some("OK") if arr.len() >= 3 => {
                let event_id = arr[1].as_str().unwrap_or_default();
                let accepted = arr[2].as_bool().unwrap_or(false);
                if let Some(ack_tx) = pending_acks.lock().unwrap().remove(event_id) {
                    let _ = ack_tx.send(accepted);
                }
            }
            Some("NOTICE") => {
                log::info!(logger, "Relay notice: {:?}", arr.get(1));
            }
            _ => {}
        }
    }

    // Connection gone: close the subscription so the engine loop exits and
    // fail any publishes still waiting for an ACK.
    subscription.lock().unwrap().take();
    pending_acks.lock().unwrap().clear();
    log::info!(logger, "Relay connection closed");
}
