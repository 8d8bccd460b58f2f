//! Nostr event model.

use serde::{Deserialize, Serialize};

/// Signed event as carried on the relay wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Event identifier (hex of SHA-256 over the canonical serialization).
    pub id: String,
    /// Author public key (x-only, hex).
    pub pubkey: String,
    /// Unix timestamp of creation, seconds.
    pub created_at: u64,
    /// Kind number, e.g. `23194`.
    pub kind: u64,
    /// Arbitrary tags.
    pub tags: Vec<Vec<String>>,
    /// Event content body.
    pub content: String,
    /// Schnorr signature over the event hash (hex).
    pub sig: String,
}

impl Event {
    /// First value of the first tag with the given name.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.first().map(|n| n == name).unwrap_or(false))
            .and_then(|tag| tag.get(1))
            .map(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_value_returns_first_match() {
        let event = Event {
            id: String::new(),
            pubkey: String::new(),
            created_at: 0,
            kind: 23195,
            tags: vec![
                vec!["p".into(), "abc".into()],
                vec!["e".into(), "def".into()],
                vec!["e".into(), "ghi".into()],
            ],
            content: String::new(),
            sig: String::new(),
        };
        assert_eq!(event.tag_value("e"), Some("def"));
        assert_eq!(event.tag_value("d"), None);
    }
}
