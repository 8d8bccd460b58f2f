//! Relay client seam: subscription and publish with NIP-20 style ACK
//! tracking. The engine only sees this interface; the websocket transport
//! lives in [`relay`].

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};

use core_types::event::Event;
use xerror::relay_client::RelayClientError;

pub mod relay;

pub use relay::RelayConnection;

/// Outcome of publishing one event to the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStatus {
    Succeeded,
    Failed,
    /// The relay never acknowledged within the timeout.
    Unconfirmed,
}

#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub kinds: Vec<u64>,
    pub p_tags: Vec<String>,
    pub since: Option<u64>,
}

impl Filter {
    pub fn to_json(&self) -> Value {
        let mut filter = serde_json::Map::new();
        if !self.kinds.is_empty() {
            filter.insert("kinds".into(), json!(self.kinds));
        }
        if !self.p_tags.is_empty() {
            filter.insert("#p".into(), json!(self.p_tags));
        }
        if let Some(since) = self.since {
            filter.insert("since".into(), json!(since));
        }
        Value::Object(filter)
    }
}

/// Live subscription handed to the engine. `events` closes when the relay
/// connection dies; `eos` fires once after stored events are replayed.
pub struct Subscription {
    pub events: mpsc::Receiver<Event>,
    pub eos: oneshot::Receiver<()>,
}

#[async_trait]
pub trait RelayClient: Send + Sync {
    async fn subscribe(&self, filter: Filter) -> Result<Subscription, RelayClientError>;

    async fn publish(&self, event: &Event) -> Result<PublishStatus, RelayClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_serializes_tag_query() {
        let filter = Filter {
            kinds: vec![23194],
            p_tags: vec!["ab".into()],
            since: Some(1700000000),
        };
        let json = filter.to_json();
        assert_eq!(json["kinds"][0], 23194);
        assert_eq!(json["#p"][0], "ab");
        assert_eq!(json["since"], 1700000000);
    }

    #[test]
    fn empty_filter_fields_are_omitted() {
        let json = Filter::default().to_json();
        assert!(json.as_object().unwrap().is_empty());
    }
}
