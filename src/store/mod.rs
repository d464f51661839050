// Message store
// Synchronous CRUD over a key-value medium plus fan-out of change notifications

use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};

pub mod storage;
pub mod subscription;

pub use storage::{JsonFileStorage, KeyValueStorage, MemoryStorage, StorageError, CHATS_KEY, MESSAGES_KEY};
pub use subscription::{Subscribers, Subscription};

use crate::models::{
    generate_id, now_millis, sort_by_timestamp, Chat, Message, MessagePayload, MessageStatus,
    MAX_MESSAGES_PER_CHAT, MESSAGE_ID_PREFIX,
};

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Upper bound on the number of messages kept per chat
    pub max_messages_per_chat: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            max_messages_per_chat: MAX_MESSAGES_PER_CHAT,
        }
    }
}

/// Owner of every persisted chat and message.
///
/// All operations are synchronous and never fail from the caller's point of
/// view: unknown chat ids are ignored and medium failures are logged. Share it
/// between components as `Arc<MessageStore>`.
pub struct MessageStore {
    storage: Mutex<Box<dyn KeyValueStorage>>,
    config: StoreConfig,
    message_subscribers: Arc<Mutex<Subscribers<Message>>>,
    chat_subscribers: Arc<Mutex<Subscribers<Vec<Chat>>>>,
}

impl MessageStore {
    pub fn new<S: KeyValueStorage + 'static>(storage: S, config: StoreConfig) -> Self {
        MessageStore {
            storage: Mutex::new(Box::new(storage)),
            config,
            message_subscribers: Arc::new(Mutex::new(Subscribers::new())),
            chat_subscribers: Arc::new(Mutex::new(Subscribers::new())),
        }
    }

    /// A store over fresh volatile storage with default limits
    pub fn in_memory() -> Self {
        Self::new(MemoryStorage::new(), StoreConfig::default())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn lock_storage(&self) -> MutexGuard<'_, Box<dyn KeyValueStorage>> {
        self.storage.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// All chats, in persisted order
    pub fn get_chats(&self) -> Vec<Chat> {
        let storage = self.lock_storage();
        read_list(&**storage, CHATS_KEY)
    }

    /// Every message of a chat, in storage order
    pub fn get_messages(&self, chat_id: &str) -> Vec<Message> {
        let storage = self.lock_storage();
        read_list::<Message>(&**storage, MESSAGES_KEY)
            .into_iter()
            .filter(|m| m.chat_id == chat_id)
            .collect()
    }

    /// Messages of a chat sorted oldest first, sliced to `[offset, offset + limit)`.
    /// An offset past the end yields an empty page.
    pub fn get_messages_paginated(&self, chat_id: &str, offset: usize, limit: usize) -> Vec<Message> {
        let mut messages = self.get_messages(chat_id);
        sort_by_timestamp(&mut messages);
        messages.into_iter().skip(offset).take(limit).collect()
    }

    pub fn get_total_message_count(&self, chat_id: &str) -> usize {
        self.get_messages(chat_id).len()
    }

    /// Whether a message with this id is stored for the chat
    pub fn contains_message(&self, chat_id: &str, message_id: &str) -> bool {
        self.get_messages(chat_id).iter().any(|m| m.id == message_id)
    }

    /// Persist a message written by the local user and return it
    pub fn send_message(&self, payload: MessagePayload) -> Message {
        let message = Message {
            id: generate_id(MESSAGE_ID_PREFIX),
            chat_id: payload.chat_id,
            content: payload.content,
            sender: payload.sender,
            timestamp: now_millis(),
            is_own: true,
            status: Some(MessageStatus::Sent),
        };

        self.add_message(message.clone());
        message
    }

    /// Persist any message, own or received.
    ///
    /// Trims the chat to the retention cap, refreshes the chat's last message,
    /// bumps the unread count for messages that are not our own, then notifies
    /// message subscribers followed by chat subscribers. If the message list
    /// cannot be read at all, nothing is written and nobody is notified.
    pub fn add_message(&self, message: Message) {
        // Lock order: storage, then subscriber registries. Notifying under the
        // storage guard publishes snapshots in the order they were written.
        let mut storage = self.lock_storage();

        let Some(Records {
            items: all_messages,
            undecodable,
        }) = read_records::<Message>(&**storage, MESSAGES_KEY)
        else {
            error!("Message list unreadable, message {} not stored", message.id);
            return;
        };
        let updated = self.enforce_message_limit(all_messages, message.clone());
        write_records(&mut **storage, MESSAGES_KEY, &updated, &undecodable);

        let chats = read_records::<Chat>(&**storage, CHATS_KEY).map(|records| {
            let Records {
                items: mut chats,
                undecodable,
            } = records;
            if let Some(chat) = chats.iter_mut().find(|c| c.id == message.chat_id) {
                chat.last_message = Some(message.clone());
                if !message.is_own {
                    chat.unread_count += 1;
                }
                write_records(&mut **storage, CHATS_KEY, &chats, &undecodable);
            } else {
                debug!("Message {} added for unknown chat {}", message.id, message.chat_id);
            }
            chats
        });

        self.notify_message_subscribers(&message);
        if let Some(chats) = chats {
            self.notify_chat_subscribers(chats);
        }
    }

    fn enforce_message_limit(&self, all_messages: Vec<Message>, new_message: Message) -> Vec<Message> {
        let (mut chat_messages, mut other_messages): (Vec<Message>, Vec<Message>) = all_messages
            .into_iter()
            .partition(|m| m.chat_id == new_message.chat_id);

        chat_messages.push(new_message);

        let cap = self.config.max_messages_per_chat;
        if chat_messages.len() > cap {
            sort_by_timestamp(&mut chat_messages);
            let excess = chat_messages.len() - cap;
            chat_messages.drain(..excess);
            debug!("Trimmed {} old messages to keep chat under {}", excess, cap);
        }

        other_messages.extend(chat_messages);
        other_messages
    }

    /// Reset a chat's unread count to zero
    pub fn mark_as_read(&self, chat_id: &str) {
        self.set_unread_count(chat_id, 0);
    }

    /// Force a chat's unread count, e.g. when the user flags it for later
    pub fn mark_as_unread(&self, chat_id: &str, count: u32) {
        self.set_unread_count(chat_id, count);
    }

    fn set_unread_count(&self, chat_id: &str, count: u32) {
        // Same lock order as add_message
        let mut storage = self.lock_storage();
        let Some(Records {
            items: mut chats,
            undecodable,
        }) = read_records::<Chat>(&**storage, CHATS_KEY)
        else {
            return;
        };

        match chats.iter_mut().find(|c| c.id == chat_id) {
            Some(chat) => chat.unread_count = count,
            None => return,
        }
        write_records(&mut **storage, CHATS_KEY, &chats, &undecodable);

        self.notify_chat_subscribers(chats);
    }

    /// Subscribe to every message added from now on
    pub fn subscribe_to_messages(&self) -> Subscription<Message> {
        subscription::subscribe(&self.message_subscribers)
    }

    /// Subscribe to the full chat list after every change
    pub fn subscribe_to_chats(&self) -> Subscription<Vec<Chat>> {
        subscription::subscribe(&self.chat_subscribers)
    }

    fn notify_message_subscribers(&self, message: &Message) {
        self.message_subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .notify(message);
    }

    fn notify_chat_subscribers(&self, chats: Vec<Chat>) {
        self.chat_subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .notify(&chats);
    }

    /// True once chats have been written at least once
    pub fn has_chats(&self) -> bool {
        key_present(&**self.lock_storage(), CHATS_KEY)
    }

    /// True once messages have been written at least once
    pub fn has_messages(&self) -> bool {
        key_present(&**self.lock_storage(), MESSAGES_KEY)
    }

    /// Overwrite the chat list wholesale. Used by seeding.
    pub fn replace_chats(&self, chats: &[Chat]) {
        write_records(&mut **self.lock_storage(), CHATS_KEY, chats, &[]);
        info!("Stored {} chats", chats.len());
    }

    /// Overwrite the message list wholesale. Used by seeding.
    pub fn replace_messages(&self, messages: &[Message]) {
        write_records(&mut **self.lock_storage(), MESSAGES_KEY, messages, &[]);
        info!("Stored {} messages", messages.len());
    }
}

fn key_present(storage: &dyn KeyValueStorage, key: &str) -> bool {
    match storage.get(key) {
        Ok(value) => value.is_some(),
        Err(e) => {
            error!("Failed to read {}: {}", key, e);
            false
        }
    }
}

/// Records stored under one key. Records that no longer decode are kept
/// aside so a rewrite of the key does not lose them.
struct Records<T> {
    items: Vec<T>,
    undecodable: Vec<Value>,
}

/// Read and decode every record under `key`, skipping the ones that do not
/// decode. `None` means the medium could not be read or the key does not
/// hold a list; callers must not overwrite the key in that case.
fn read_records<T: DeserializeOwned>(storage: &dyn KeyValueStorage, key: &str) -> Option<Records<T>> {
    let raw = match storage.get(key) {
        Ok(Some(Value::Array(raw))) => raw,
        Ok(Some(_)) => {
            error!("Stored value for {} is not a list", key);
            return None;
        }
        Ok(None) => Vec::new(),
        Err(e) => {
            error!("Failed to read {}: {}", key, e);
            return None;
        }
    };

    let mut records = Records {
        items: Vec::with_capacity(raw.len()),
        undecodable: Vec::new(),
    };
    for record in raw {
        match T::deserialize(&record) {
            Ok(item) => records.items.push(item),
            Err(e) => {
                warn!("Skipping unreadable record in {}: {}", key, e);
                records.undecodable.push(record);
            }
        }
    }
    Some(records)
}

fn read_list<T: DeserializeOwned>(storage: &dyn KeyValueStorage, key: &str) -> Vec<T> {
    read_records(storage, key).map(|records| records.items).unwrap_or_default()
}

/// Write `items` under `key`, carrying over records that did not decode
fn write_records<T: Serialize>(storage: &mut dyn KeyValueStorage, key: &str, items: &[T], undecodable: &[Value]) {
    let mut list = undecodable.to_vec();
    for item in items {
        match serde_json::to_value(item) {
            Ok(value) => list.push(value),
            Err(e) => {
                error!("Failed to serialize {}: {}", key, e);
                return;
            }
        }
    }

    if let Err(e) = storage.set(key, Value::Array(list)) {
        error!("Failed to write {}: {}", key, e);
    }
}
