// Wire format spoken between the UI side and the transport worker
//
// Both directions use the envelope `{ "type": <TYPE>, "payload": {...} }`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::Message;

pub mod message_types {
    pub const LOAD_MESSAGES_PAGINATED: &str = "LOAD_MESSAGES_PAGINATED";
    pub const LOAD_ALL_MESSAGES: &str = "LOAD_ALL_MESSAGES";
    pub const MESSAGES_LOADED: &str = "MESSAGES_LOADED";
    pub const ALL_MESSAGES_LOADED: &str = "ALL_MESSAGES_LOADED";
    pub const GENERATE_REPLY: &str = "GENERATE_REPLY";
    pub const MOCK_REPLY: &str = "MOCK_REPLY";

    pub const REQUEST_TYPES: [&str; 3] = [LOAD_MESSAGES_PAGINATED, LOAD_ALL_MESSAGES, GENERATE_REPLY];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadMessagesPaginated {
    pub chat_id: String,
    pub messages: Vec<Message>,
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadAllMessages {
    pub chat_id: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateReply {
    pub chat_id: String,
    pub user_message: String,
}

/// Requests the worker understands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerRequest {
    LoadMessagesPaginated(LoadMessagesPaginated),
    LoadAllMessages(LoadAllMessages),
    GenerateReply(GenerateReply),
}

impl WorkerRequest {
    pub fn chat_id(&self) -> &str {
        match self {
            WorkerRequest::LoadMessagesPaginated(p) => &p.chat_id,
            WorkerRequest::LoadAllMessages(p) => &p.chat_id,
            WorkerRequest::GenerateReply(p) => &p.chat_id,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            WorkerRequest::LoadMessagesPaginated(_) => message_types::LOAD_MESSAGES_PAGINATED,
            WorkerRequest::LoadAllMessages(_) => message_types::LOAD_ALL_MESSAGES,
            WorkerRequest::GenerateReply(_) => message_types::GENERATE_REPLY,
        }
    }

    /// Serialize into a wire envelope
    pub fn to_envelope(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesLoaded {
    pub chat_id: String,
    pub messages: Vec<Message>,
    pub offset: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllMessagesLoaded {
    pub chat_id: String,
    pub messages: Vec<Message>,
    pub has_more: bool,
}

/// Responses the worker emits. Every variant carries the chat id so
/// listeners sharing one worker can tell their responses apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerResponse {
    MessagesLoaded(MessagesLoaded),
    AllMessagesLoaded(AllMessagesLoaded),
    MockReply(Message),
}

impl WorkerResponse {
    pub fn chat_id(&self) -> &str {
        match self {
            WorkerResponse::MessagesLoaded(p) => &p.chat_id,
            WorkerResponse::AllMessagesLoaded(p) => &p.chat_id,
            WorkerResponse::MockReply(m) => &m.chat_id,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            WorkerResponse::MessagesLoaded(_) => message_types::MESSAGES_LOADED,
            WorkerResponse::AllMessagesLoaded(_) => message_types::ALL_MESSAGES_LOADED,
            WorkerResponse::MockReply(_) => message_types::MOCK_REPLY,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Envelope has no type field")]
    MissingType,

    #[error("Unknown worker message type: {0}")]
    UnknownType(String),

    #[error("Malformed {kind} payload: {source}")]
    MalformedPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Decode a request envelope, separating unknown types from bad payloads
pub fn decode_request(envelope: Value) -> Result<WorkerRequest, ProtocolError> {
    let kind = envelope
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(ProtocolError::MissingType)?;

    if !message_types::REQUEST_TYPES.contains(&kind.as_str()) {
        return Err(ProtocolError::UnknownType(kind));
    }

    serde_json::from_value(envelope).map_err(|source| ProtocolError::MalformedPayload { kind, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_envelope_shape() {
        let request = WorkerRequest::LoadMessagesPaginated(LoadMessagesPaginated {
            chat_id: "c1".to_string(),
            messages: Vec::new(),
            offset: 20,
            limit: 20,
        });

        let envelope = request.to_envelope().unwrap();
        assert_eq!(envelope["type"], "LOAD_MESSAGES_PAGINATED");
        assert_eq!(envelope["payload"]["chatId"], "c1");
        assert_eq!(envelope["payload"]["offset"], 20);
        assert_eq!(decode_request(envelope).unwrap(), request);
    }

    #[test]
    fn test_response_envelope_shape() {
        let response = WorkerResponse::AllMessagesLoaded(AllMessagesLoaded {
            chat_id: "c2".to_string(),
            messages: Vec::new(),
            has_more: false,
        });

        let envelope = serde_json::to_value(&response).unwrap();
        assert_eq!(envelope["type"], "ALL_MESSAGES_LOADED");
        assert_eq!(envelope["payload"]["hasMore"], false);
        assert_eq!(response.chat_id(), "c2");
    }

    #[test]
    fn test_decode_rejects_unknown_and_malformed() {
        match decode_request(json!({"type": "DELETE_EVERYTHING", "payload": {}})) {
            Err(ProtocolError::UnknownType(kind)) => assert_eq!(kind, "DELETE_EVERYTHING"),
            other => panic!("Expected unknown type, got {:?}", other),
        }

        assert!(matches!(decode_request(json!({"payload": {}})), Err(ProtocolError::MissingType)));

        match decode_request(json!({"type": "GENERATE_REPLY", "payload": {"chatId": 5}})) {
            Err(ProtocolError::MalformedPayload { kind, .. }) => assert_eq!(kind, "GENERATE_REPLY"),
            other => panic!("Expected malformed payload, got {:?}", other),
        }
    }
}
