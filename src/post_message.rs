// Cross-document message bridge
//
// Messages from outside the application arrive as `NEW_MESSAGE` envelopes on
// a shared broadcast channel. The bridge listens on that channel and feeds
// every message it receives into the store. Posting writes to the same
// channel, so a bridge also hears what it posts.

use log::{debug, info, warn};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::models::Message;
use crate::store::MessageStore;

pub const NEW_MESSAGE: &str = "NEW_MESSAGE";

const CHANNEL_CAPACITY: usize = 64;

/// Create the shared channel envelopes travel on
pub fn channel() -> broadcast::Sender<Value> {
    let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
    tx
}

/// Wrap a message in a `NEW_MESSAGE` envelope
pub fn encode_new_message(message: &Message) -> Result<Value, serde_json::Error> {
    Ok(json!({
        "type": NEW_MESSAGE,
        "payload": serde_json::to_value(message)?,
    }))
}

/// Extract the message from a `NEW_MESSAGE` envelope. Any other envelope
/// yields `None`.
pub fn decode_new_message(envelope: &Value) -> Option<Message> {
    if envelope.get("type").and_then(Value::as_str) != Some(NEW_MESSAGE) {
        return None;
    }

    let payload = envelope.get("payload")?.clone();
    match serde_json::from_value(payload) {
        Ok(message) => Some(message),
        Err(e) => {
            warn!("Ignoring malformed {} payload: {}", NEW_MESSAGE, e);
            None
        }
    }
}

pub struct PostMessageBridge {
    channel: broadcast::Sender<Value>,
    listener: Option<JoinHandle<()>>,
}

impl PostMessageBridge {
    pub fn new(channel: broadcast::Sender<Value>) -> Self {
        PostMessageBridge {
            channel,
            listener: None,
        }
    }

    /// Start delivering incoming messages into `store`. Calling it again
    /// replaces the previous listener.
    pub fn init(&mut self, store: Arc<MessageStore>) {
        self.destroy();

        let mut rx = self.channel.subscribe();
        self.listener = Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => {
                        if let Some(message) = decode_new_message(&envelope) {
                            debug!("External message {} for chat {}", message.id, message.chat_id);
                            store.add_message(message);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Post message listener lagged, {} envelopes lost", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Post message listener finished");
        }));
        info!("Post message bridge listening");
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    /// Post a message onto the channel. Returns false when it could not be
    /// encoded or nobody is listening.
    pub fn post(&self, message: &Message) -> bool {
        let envelope = match encode_new_message(message) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Failed to encode message {}: {}", message.id, e);
                return false;
            }
        };
        self.channel.send(envelope).is_ok()
    }

    /// Stop delivering messages. Safe to call more than once.
    pub fn destroy(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
            debug!("Post message bridge stopped");
        }
    }
}

impl Drop for PostMessageBridge {
    fn drop(&mut self) {
        self.destroy();
    }
}
