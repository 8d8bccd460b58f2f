//! Fire-and-forget business events.

use serde::Serialize;
use serde_json::Value;
use slog as log;
use slog::Logger;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Serialize)]
pub struct BusinessEvent {
    pub event: String,
    pub properties: Value,
}

/// Sink for metrics/business events. Logging one never blocks and never
/// fails the calling handler; events are dropped if the drain task is gone.
#[derive(Clone)]
pub struct EventLogger {
    tx: mpsc::UnboundedSender<BusinessEvent>,
}

impl EventLogger {
    pub fn spawn(logger: Logger) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<BusinessEvent>();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let properties = event.properties.to_string();
                log::info!(logger, "Business event";
                    "event" => &event.event,
                    "properties" => properties,
                );
            }
        });
        Self { tx }
    }

    pub fn log(&self, event: &str, properties: Value) {
        let _ = self.tx.send(BusinessEvent {
            event: event.to_string(),
            properties,
        });
    }
}
