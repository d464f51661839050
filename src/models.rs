use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Pagination
pub const MESSAGES_PER_PAGE: usize = 20;
pub const MAX_MESSAGES_PER_CHAT: usize = 1000;

// Prefixes used when generating ids
pub const MESSAGE_ID_PREFIX: &str = "msg";
pub const REPLY_ID_PREFIX: &str = "reply";

// Sender names
pub const DEFAULT_SENDER_NAME: &str = "You";
pub const BOT_SENDER_NAME: &str = "Chat Bot";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub content: String,
    pub sender: String,
    pub timestamp: i64, // milliseconds since epoch
    pub is_own: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,   // Not yet persisted
    Sent,      // Persisted locally
    Delivered, // Arrived from the other side
    Read,      // Seen by the recipient
}

/// What the UI hands the store when the user sends something.
#[derive(Debug, Clone)]
pub struct MessagePayload {
    pub content: String,
    pub chat_id: String,
    pub sender: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<Message>,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_online: Option<bool>,
}

impl Chat {
    pub fn new(id: &str, name: &str) -> Self {
        Chat {
            id: id.to_string(),
            name: name.to_string(),
            avatar: None,
            last_message: None,
            unread_count: 0,
            is_online: None,
        }
    }
}

/// Current wall clock in milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate an id of the form `<prefix>_<millis>_<random>`
pub fn generate_id(prefix: &str) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", prefix, now_millis(), &random[..9])
}

/// Sort messages oldest first. The sort is stable, so messages sharing a
/// timestamp keep their insertion order.
pub fn sort_by_timestamp(messages: &mut [Message]) {
    messages.sort_by_key(|m| m.timestamp);
}
