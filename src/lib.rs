// Re-export modules for the binary and the integration tests
pub mod models;
pub mod pagination; // Per-pane windowing over the store
pub mod post_message;
pub mod seed;
pub mod selection;
pub mod session;
pub mod store;
pub mod transport; // Worker protocol and the worker task itself

// Re-export main types for convenience
pub use models::*;
pub use pagination::{EngineConfig, PaginationEngine};
pub use selection::ChatSelection;
pub use session::Session;
pub use store::{MessageStore, StoreConfig};
pub use transport::{TransportWorker, WorkerConfig, WorkerHandle};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_status_serialization() {
        let statuses = [
            (MessageStatus::Sending, "\"sending\""),
            (MessageStatus::Sent, "\"sent\""),
            (MessageStatus::Delivered, "\"delivered\""),
            (MessageStatus::Read, "\"read\""),
        ];

        for (status, expected) in statuses {
            assert_eq!(serde_json::to_string(&status).unwrap(), expected);
        }
    }

    #[test]
    fn test_message_without_status_round_trips() {
        let json = r#"{"id":"m1","chatId":"c1","content":"hi","sender":"Bob","timestamp":5,"isOwn":false}"#;
        let message: Message = serde_json::from_str(json).unwrap();

        assert_eq!(message.status, None);
        assert_eq!(message.chat_id, "c1");
        assert!(!serde_json::to_string(&message).unwrap().contains("status"));
    }

    #[test]
    fn test_generated_ids_are_unique_and_prefixed() {
        let a = generate_id(MESSAGE_ID_PREFIX);
        let b = generate_id(MESSAGE_ID_PREFIX);

        assert!(a.starts_with("msg_"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_chat_defaults_when_fields_missing() {
        let chat: Chat = serde_json::from_str(r#"{"id":"c1","name":"One"}"#).unwrap();
        assert_eq!(chat, Chat::new("c1", "One"));
    }
}
