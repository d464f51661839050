// Pagination and sync engine
//
// One engine drives the message window of one pane. It pulls pages from the
// store, either through the transport worker or directly when no worker is
// available, merges live messages from the store subscription, and ignores
// worker responses meant for any other chat.

use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Arc;

use crate::models::{sort_by_timestamp, Chat, Message, MessagePayload, DEFAULT_SENDER_NAME, MESSAGES_PER_PAGE};
use crate::store::{MessageStore, Subscription};
use crate::transport::{
    AllMessagesLoaded, GenerateReply, LoadAllMessages, LoadMessagesPaginated, MessagesLoaded, WorkerHandle,
    WorkerRequest, WorkerResponse,
};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Messages requested per page
    pub page_size: usize,
    /// Sender name stamped on messages sent from this pane
    pub sender_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            page_size: MESSAGES_PER_PAGE,
            sender_name: DEFAULT_SENDER_NAME.to_string(),
        }
    }
}

/// The load currently in flight for the active chat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingLoad {
    Page { offset: usize },
    All,
}

pub struct PaginationEngine {
    store: Arc<MessageStore>,
    worker: Option<WorkerHandle>,
    deep_link: Option<String>,
    config: EngineConfig,

    active_chat: Option<String>,
    messages: Vec<Message>,
    offset: usize,
    has_more: bool,
    pending: Option<PendingLoad>,
    reveal_done: bool,

    chats: Vec<Chat>,
    chat_updates: Subscription<Vec<Chat>>,
    live_messages: Option<Subscription<Message>>,
}

impl PaginationEngine {
    /// Build an engine with no chat active. Pass `None` for `worker` to load
    /// straight from the store.
    pub fn new(
        store: Arc<MessageStore>,
        worker: Option<WorkerHandle>,
        deep_link: Option<String>,
        config: EngineConfig,
    ) -> Self {
        let chats = store.get_chats();
        let chat_updates = store.subscribe_to_chats();

        PaginationEngine {
            store,
            worker,
            deep_link,
            config,
            active_chat: None,
            messages: Vec::new(),
            offset: 0,
            has_more: true,
            pending: None,
            reveal_done: false,
            chats,
            chat_updates,
            live_messages: None,
        }
    }

    pub fn active_chat(&self) -> Option<&str> {
        self.active_chat.as_deref()
    }

    /// The current message window, oldest first
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// Latest chat list seen by this engine
    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    /// The chat record of the active chat, if it exists
    pub fn active_chat_info(&self) -> Option<&Chat> {
        let id = self.active_chat.as_deref()?;
        self.chats.iter().find(|c| c.id == id)
    }

    pub fn deep_link_target(&self) -> Option<&str> {
        self.deep_link.as_deref()
    }

    pub fn page_size(&self) -> usize {
        self.config.page_size
    }

    fn reset(&mut self) {
        self.messages.clear();
        self.offset = 0;
        self.has_more = true;
        self.pending = None;
    }

    /// Switch the engine to `chat_id`, or clear it with `None`.
    ///
    /// Any response still in flight for the previous chat is ignored when it
    /// arrives. With a deep-link target the whole history is loaded at once,
    /// otherwise the first page is requested.
    pub fn activate(&mut self, chat_id: Option<&str>) {
        self.live_messages = None;
        self.reset();

        let chat_id = match chat_id {
            Some(id) => id.to_string(),
            None => {
                debug!("Engine cleared");
                self.active_chat = None;
                return;
            }
        };

        info!("Activating chat {}", chat_id);
        self.active_chat = Some(chat_id.clone());
        self.live_messages = Some(self.store.subscribe_to_messages());

        if let Some(target) = &self.deep_link {
            info!("Deep-link target {} set, loading all messages for chat {}", target, chat_id);
            self.load_all(&chat_id);
        } else {
            self.load_page(&chat_id, 0);
        }

        self.store.mark_as_read(&chat_id);
    }

    fn sorted_messages(&self, chat_id: &str) -> Vec<Message> {
        let mut messages = self.store.get_messages(chat_id);
        sort_by_timestamp(&mut messages);
        messages
    }

    fn load_all(&mut self, chat_id: &str) {
        self.pending = Some(PendingLoad::All);
        let messages = self.sorted_messages(chat_id);

        if let Some(worker) = &self.worker {
            let request = WorkerRequest::LoadAllMessages(LoadAllMessages {
                chat_id: chat_id.to_string(),
                messages,
            });
            if worker.post(&request) {
                return;
            }
            warn!("Worker unavailable, loading all messages for {} directly", chat_id);
            if let WorkerRequest::LoadAllMessages(payload) = request {
                self.apply_all(payload.messages, false);
            }
            return;
        }

        debug!("Loading all {} messages directly (no worker)", messages.len());
        self.apply_all(messages, false);
    }

    /// Request the page starting at `offset`. Ignored while a load is in
    /// flight or when `chat_id` is not the active chat.
    pub fn load_page(&mut self, chat_id: &str, offset: usize) {
        if self.active_chat.as_deref() != Some(chat_id) {
            debug!("Ignoring page request for inactive chat {}", chat_id);
            return;
        }
        if let Some(pending) = self.pending {
            debug!("Load already in flight for {} ({:?}), ignoring", chat_id, pending);
            return;
        }

        self.pending = Some(PendingLoad::Page { offset });
        let limit = self.config.page_size;

        if let Some(worker) = &self.worker {
            let request = WorkerRequest::LoadMessagesPaginated(LoadMessagesPaginated {
                chat_id: chat_id.to_string(),
                messages: self.sorted_messages(chat_id),
                offset,
                limit,
            });
            if worker.post(&request) {
                return;
            }
            warn!("Worker unavailable, loading page for {} directly", chat_id);
        }

        let page = self.store.get_messages_paginated(chat_id, offset, limit);
        let total = self.store.get_total_message_count(chat_id);
        self.apply_page(page, offset.saturating_add(limit) < total);
    }

    /// Fetch the next page of the active chat, if there is one and nothing
    /// is already loading
    pub fn load_more(&mut self) {
        let chat_id = match (&self.active_chat, self.has_more, self.pending) {
            (Some(id), true, None) => id.clone(),
            _ => {
                debug!(
                    "load_more rejected (chat {:?}, has_more {}, loading {})",
                    self.active_chat,
                    self.has_more,
                    self.is_loading()
                );
                return;
            }
        };
        self.load_page(&chat_id, self.offset);
    }

    /// Post the load in flight again, for when its response may have been
    /// lost. A duplicate response later fails the pending check and is
    /// dropped. No-op when nothing is loading.
    pub fn reissue_pending_load(&mut self) {
        let (Some(chat_id), Some(pending)) = (self.active_chat.clone(), self.pending) else {
            return;
        };
        info!("Re-issuing {:?} for chat {}", pending, chat_id);
        self.pending = None;
        match pending {
            PendingLoad::Page { offset } => self.load_page(&chat_id, offset),
            PendingLoad::All => self.load_all(&chat_id),
        }
    }

    /// Apply a worker response. Returns true when it changed this engine.
    ///
    /// Responses addressed to another chat, or that do not match the load in
    /// flight, are discarded. Replies are not handled here: they reach the
    /// window through the store once persisted.
    pub fn handle_response(&mut self, response: &WorkerResponse) -> bool {
        if self.active_chat.as_deref() != Some(response.chat_id()) {
            return false;
        }

        match response {
            WorkerResponse::MessagesLoaded(MessagesLoaded {
                messages,
                offset,
                has_more,
                ..
            }) => {
                if self.pending != Some(PendingLoad::Page { offset: *offset }) {
                    warn!("Discarding stale page at offset {} for {}", offset, response.chat_id());
                    return false;
                }
                self.apply_page(messages.clone(), *has_more);
                true
            }
            WorkerResponse::AllMessagesLoaded(AllMessagesLoaded { messages, has_more, .. }) => {
                if self.pending != Some(PendingLoad::All) {
                    warn!("Discarding stale full load for {}", response.chat_id());
                    return false;
                }
                info!("All messages loaded from worker: {}", messages.len());
                self.apply_all(messages.clone(), *has_more);
                true
            }
            WorkerResponse::MockReply(_) => false,
        }
    }

    fn apply_page(&mut self, page: Vec<Message>, has_more: bool) {
        debug!("Page of {} messages at offset {} (has_more {})", page.len(), self.offset, has_more);
        self.merge_into_window(page);
        self.offset += self.config.page_size;
        self.has_more = has_more;
        self.pending = None;
    }

    fn apply_all(&mut self, mut messages: Vec<Message>, has_more: bool) {
        sort_by_timestamp(&mut messages);
        self.offset = messages.len();
        self.messages = messages;
        self.has_more = has_more;
        self.pending = None;
    }

    // Pages arrive sorted; each message lands after every message in the
    // window with an equal or older timestamp, so the window stays ordered.
    fn merge_into_window(&mut self, page: Vec<Message>) {
        let mut known: HashSet<String> = self.messages.iter().map(|m| m.id.clone()).collect();
        for message in page {
            if !known.insert(message.id.clone()) {
                continue;
            }
            let index = self.messages.partition_point(|m| m.timestamp <= message.timestamp);
            self.messages.insert(index, message);
        }
    }

    /// Returns false when the message is already in the window
    fn append_live(&mut self, message: Message) -> bool {
        if self.messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        match self.messages.last() {
            Some(last) if last.timestamp > message.timestamp => {
                debug!("Live message {} is older than the window tail, inserting in order", message.id);
                let index = self.messages.partition_point(|m| m.timestamp <= message.timestamp);
                self.messages.insert(index, message);
            }
            _ => self.messages.push(message),
        }
        true
    }

    /// Drain queued store notifications: refresh the chat list and append
    /// live messages for the active chat, marking it read again.
    /// Returns how many messages were appended; ones already in the window
    /// are not counted.
    pub fn process_store_events(&mut self) -> usize {
        if let Some(latest) = self.chat_updates.drain().pop() {
            self.chats = latest;
        }

        let Some(chat_id) = self.active_chat.clone() else {
            return 0;
        };
        let incoming = match self.live_messages.as_mut() {
            Some(subscription) => subscription.drain(),
            None => return 0,
        };

        let mut appended = 0;
        for message in incoming.into_iter().filter(|m| m.chat_id == chat_id) {
            if self.append_live(message) {
                appended += 1;
            }
        }

        if appended > 0 {
            self.store.mark_as_read(&chat_id);
            // Pick up the chat list produced by the read marker
            if let Some(latest) = self.chat_updates.drain().pop() {
                self.chats = latest;
            }
        }
        appended
    }

    /// Send `content` to the active chat and ask the worker for a reply.
    /// Blank content or no active chat is a no-op.
    pub fn send_message(&mut self, content: &str) -> Option<Message> {
        let chat_id = self.active_chat.clone()?;
        if content.trim().is_empty() {
            return None;
        }

        let sent = self.store.send_message(MessagePayload {
            content: content.to_string(),
            chat_id: chat_id.clone(),
            sender: self.config.sender_name.clone(),
        });
        // The store notification is what puts the message in the window
        self.process_store_events();

        if let Some(worker) = &self.worker {
            worker.post(&WorkerRequest::GenerateReply(GenerateReply {
                chat_id,
                user_message: content.to_string(),
            }));
        }
        Some(sent)
    }

    /// Window index of the deep-link target, reported once per engine as soon
    /// as the target is loaded
    pub fn take_reveal(&mut self) -> Option<usize> {
        if self.reveal_done {
            return None;
        }
        let target = self.deep_link.as_deref()?;
        if self.messages.is_empty() {
            return None;
        }

        match self.messages.iter().position(|m| m.id == target) {
            Some(index) => {
                info!("Revealing message {} at position {}", target, index);
                self.reveal_done = true;
                Some(index)
            }
            None => {
                debug!("Message {} not in current window, more history needed", target);
                None
            }
        }
    }
}
