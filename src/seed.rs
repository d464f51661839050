// Demo data
// Five chats with a long synthetic history, written only when the store is empty

use log::info;
use once_cell::sync::Lazy;

use crate::models::{now_millis, Chat, Message, MessageStatus, DEFAULT_SENDER_NAME, MESSAGE_ID_PREFIX};
use crate::store::MessageStore;

/// Spacing between consecutive generated messages
pub const MOCK_MESSAGE_INTERVAL_MS: i64 = 60_000;

/// Default history length generated for every demo chat
pub const MOCK_MESSAGES_PER_CHAT: usize = 1000;

pub static MOCK_CHATS: Lazy<Vec<Chat>> = Lazy::new(|| {
    [
        ("chat_1", "John Doe", 5, true),
        ("chat_2", "Jane Smith", 0, true),
        ("chat_3", "Team Development", 2, false),
        ("chat_4", "Alice Johnson", 0, true),
        ("chat_5", "Bob Wilson", 1, false),
    ]
    .iter()
    .enumerate()
    .map(|(i, &(id, name, unread_count, is_online))| Chat {
        id: id.to_string(),
        name: name.to_string(),
        avatar: Some(format!("https://i.pravatar.cc/150?img={}", i + 1)),
        last_message: None,
        unread_count,
        is_online: Some(is_online),
    })
    .collect()
});

/// `count` messages for a chat, one minute apart and ending now.
/// Every third message, starting with the first, is our own.
pub fn generate_mock_messages(chat_id: &str, count: usize) -> Vec<Message> {
    let start = now_millis() - count as i64 * MOCK_MESSAGE_INTERVAL_MS;

    (0..count)
        .map(|i| {
            let is_own = i % 3 == 0;
            let kind = if is_own { "This is my message" } else { "This is a received message" };
            Message {
                id: format!("{}_{}_{}", MESSAGE_ID_PREFIX, chat_id, i),
                chat_id: chat_id.to_string(),
                content: format!(
                    "Message {}: {}. Lorem ipsum dolor sit amet, consectetur adipiscing elit.",
                    i + 1,
                    kind
                ),
                sender: if is_own {
                    DEFAULT_SENDER_NAME.to_string()
                } else {
                    format!("User {}", i % 5 + 1)
                },
                timestamp: start + i as i64 * MOCK_MESSAGE_INTERVAL_MS,
                is_own,
                status: Some(MessageStatus::Delivered),
            }
        })
        .collect()
}

/// Fill an empty store with the demo chats. Chats and messages are checked
/// separately, so existing data of either kind is left alone. Histories are
/// clamped to the store's retention cap.
pub fn initialize_mock_data(store: &MessageStore, messages_per_chat: usize) {
    let seed_chats = !store.has_chats();
    let seed_messages = !store.has_messages();
    if !seed_chats && !seed_messages {
        return;
    }

    let cap = store.config().max_messages_per_chat;
    let count = messages_per_chat.min(cap);
    if count < messages_per_chat {
        info!("Clamping demo history from {} to {} messages per chat", messages_per_chat, cap);
    }

    let histories: Vec<(&Chat, Vec<Message>)> = MOCK_CHATS
        .iter()
        .map(|chat| (chat, generate_mock_messages(&chat.id, count)))
        .collect();

    if seed_chats {
        let chats: Vec<Chat> = histories
            .iter()
            .map(|(chat, messages)| Chat {
                last_message: messages.last().cloned(),
                ..(*chat).clone()
            })
            .collect();
        store.replace_chats(&chats);
        info!("Seeded {} demo chats", chats.len());
    }

    if seed_messages {
        let messages: Vec<Message> = histories.into_iter().flat_map(|(_, messages)| messages).collect();
        store.replace_messages(&messages);
        info!("Seeded {} demo messages", messages.len());
    }
}
