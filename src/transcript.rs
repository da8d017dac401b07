use serde::{Deserialize, Serialize};

/// One committed round trip. Sent to the chat endpoint as `[user, assistant]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct Exchange {
    pub user: String,
    pub assistant: String,
}

impl Exchange {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
        }
    }
}

impl From<(String, String)> for Exchange {
    fn from((user, assistant): (String, String)) -> Self {
        Self { user, assistant }
    }
}

impl From<Exchange> for (String, String) {
    fn from(exchange: Exchange) -> Self {
        (exchange.user, exchange.assistant)
    }
}

/// Conversational context for the session. Append-only; only a full reset removes entries.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Transcript {
    exchanges: Vec<Exchange>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, exchange: Exchange) {
        self.exchanges.push(exchange);
    }

    pub fn clear(&mut self) {
        self.exchanges.clear();
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    pub fn exchanges(&self) -> &[Exchange] {
        &self.exchanges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_serializes_as_pair() {
        let exchange = Exchange::new("Hello", "Hi there");
        let json = serde_json::to_value(&exchange).unwrap();
        assert_eq!(json, serde_json::json!(["Hello", "Hi there"]));
    }

    #[test]
    fn test_transcript_keeps_insertion_order() {
        let mut transcript = Transcript::new();
        transcript.push(Exchange::new("one", "1"));
        transcript.push(Exchange::new("two", "2"));

        let json = serde_json::to_value(&transcript).unwrap();
        assert_eq!(json, serde_json::json!([["one", "1"], ["two", "2"]]));
        assert_eq!(transcript.exchanges()[1].user, "two");
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut transcript = Transcript::new();
        transcript.push(Exchange::new("q", "a"));
        assert_eq!(transcript.len(), 1);

        transcript.clear();
        assert!(transcript.is_empty());
    }
}
