// Application session
//
// Builds the object graph once: one store, at most one worker shared by every
// pane, the chat selection and one pagination engine per open pane. Nothing
// here is global; callers own the session and pass it around.

use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::models::{Chat, Message};
use crate::pagination::{EngineConfig, PaginationEngine};
use crate::selection::ChatSelection;
use crate::store::MessageStore;
use crate::transport::{WorkerHandle, WorkerResponse};

/// Unread count applied by "mark as unread"
pub const MARK_UNREAD_COUNT: u32 = 1;

pub struct Session {
    store: Arc<MessageStore>,
    worker: Option<WorkerHandle>,
    selection: ChatSelection,
    panes: HashMap<String, PaginationEngine>,
    engine_config: EngineConfig,
    deep_link: Option<String>,
}

impl Session {
    pub fn new(
        store: Arc<MessageStore>,
        worker: Option<WorkerHandle>,
        engine_config: EngineConfig,
        deep_link: Option<String>,
    ) -> Self {
        Session {
            store,
            worker,
            selection: ChatSelection::new(),
            panes: HashMap::new(),
            engine_config,
            deep_link,
        }
    }

    pub fn store(&self) -> &Arc<MessageStore> {
        &self.store
    }

    pub fn selection(&self) -> &ChatSelection {
        &self.selection
    }

    pub fn chats(&self) -> Vec<Chat> {
        self.store.get_chats()
    }

    /// A fresh receiver for worker responses, if a worker is attached
    pub fn worker_responses(&self) -> Option<broadcast::Receiver<WorkerResponse>> {
        self.worker.as_ref().map(WorkerHandle::subscribe)
    }

    pub fn pane(&self, chat_id: &str) -> Option<&PaginationEngine> {
        self.panes.get(chat_id)
    }

    pub fn pane_mut(&mut self, chat_id: &str) -> Option<&mut PaginationEngine> {
        self.panes.get_mut(chat_id)
    }

    /// Open panes, left to right
    pub fn panes(&self) -> Vec<&PaginationEngine> {
        self.selection
            .selected()
            .iter()
            .filter_map(|id| self.panes.get(id))
            .collect()
    }

    /// Open a chat in a new pane. Returns the chat that had to be closed to
    /// make room, if any.
    pub fn open_chat(&mut self, chat_id: &str) -> Option<String> {
        if self.selection.contains(chat_id) {
            return None;
        }

        let evicted = self.selection.select(chat_id);
        if let Some(old) = &evicted {
            self.panes.remove(old);
            info!("Closed pane for {}", old);
        }
        self.attach_pane(chat_id);
        evicted
    }

    fn attach_pane(&mut self, chat_id: &str) {
        let mut engine = PaginationEngine::new(
            self.store.clone(),
            self.worker.clone(),
            self.deep_link.clone(),
            self.engine_config.clone(),
        );
        engine.activate(Some(chat_id));
        self.panes.insert(chat_id.to_string(), engine);
        info!("Opened pane for {}", chat_id);
    }

    pub fn close_chat(&mut self, chat_id: &str) -> bool {
        if !self.selection.close(chat_id) {
            return false;
        }
        self.panes.remove(chat_id);
        info!("Closed pane for {}", chat_id);
        true
    }

    /// Open the chat owning the deep-link target when nothing is open yet
    pub fn auto_select_deep_link(&mut self) -> Option<String> {
        let target = self.deep_link.clone()?;
        let chat_id = self.selection.auto_select_for_deep_link(&self.store, &target)?;
        self.attach_pane(&chat_id);
        Some(chat_id)
    }

    /// Route a worker response. Replies are persisted and reach their pane
    /// through the store; load results go to the pane that asked for them.
    pub fn handle_worker_response(&mut self, response: WorkerResponse) -> bool {
        match response {
            WorkerResponse::MockReply(reply) => {
                debug!("Persisting reply {} for chat {}", reply.id, reply.chat_id);
                self.store.add_message(reply);
                self.pump();
                true
            }
            other => {
                let mut applied = false;
                for engine in self.panes.values_mut() {
                    applied |= engine.handle_response(&other);
                }
                applied
            }
        }
    }

    /// Re-post the load each pane is waiting on. Used when worker responses
    /// were dropped before this session saw them.
    pub fn reissue_pending_loads(&mut self) {
        for engine in self.panes.values_mut() {
            engine.reissue_pending_load();
        }
    }

    /// Let every pane catch up with queued store notifications
    pub fn pump(&mut self) -> usize {
        self.panes.values_mut().map(PaginationEngine::process_store_events).sum()
    }

    pub fn load_more(&mut self, chat_id: &str) {
        if let Some(engine) = self.panes.get_mut(chat_id) {
            engine.load_more();
        }
    }

    /// Send from the pane showing `chat_id`. Other panes see the message
    /// on their next pump if they show the same chat.
    pub fn send_message(&mut self, chat_id: &str, content: &str) -> Option<Message> {
        let sent = self.panes.get_mut(chat_id)?.send_message(content);
        self.pump();
        sent
    }

    pub fn mark_as_unread(&self, chat_id: &str) {
        self.store.mark_as_unread(chat_id, MARK_UNREAD_COUNT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::initialize_mock_data;

    fn seeded_session() -> Session {
        let store = Arc::new(MessageStore::in_memory());
        initialize_mock_data(&store, 30);
        Session::new(store, None, EngineConfig::default(), None)
    }

    #[test]
    fn test_opening_third_chat_drops_oldest_pane() {
        let mut session = seeded_session();

        assert_eq!(session.open_chat("chat_1"), None);
        assert_eq!(session.open_chat("chat_2"), None);
        assert_eq!(session.open_chat("chat_3"), Some("chat_1".to_string()));

        assert!(session.pane("chat_1").is_none());
        let open: Vec<&str> = session.panes().iter().filter_map(|p| p.active_chat()).collect();
        assert_eq!(open, vec!["chat_2", "chat_3"]);

        // Reopening an open chat keeps its pane untouched
        session.load_more("chat_2");
        assert_eq!(session.open_chat("chat_2"), None);
        assert_eq!(session.pane("chat_2").map(|p| p.messages().len()), Some(30));
    }

    #[test]
    fn test_reply_is_routed_through_store() {
        let mut session = seeded_session();
        session.open_chat("chat_1");
        session.open_chat("chat_2");

        let reply = Message {
            id: "reply_1".to_string(),
            chat_id: "chat_2".to_string(),
            content: "I see what you mean.".to_string(),
            sender: "Chat Bot".to_string(),
            timestamp: i64::MAX,
            is_own: false,
            status: None,
        };
        assert!(session.handle_worker_response(WorkerResponse::MockReply(reply)));

        let right = session.pane("chat_2").unwrap();
        assert_eq!(right.messages().last().map(|m| m.id.as_str()), Some("reply_1"));
        let left = session.pane("chat_1").unwrap();
        assert!(left.messages().iter().all(|m| m.chat_id == "chat_1"));
        assert_eq!(session.store().get_total_message_count("chat_2"), 31);
    }

    #[test]
    fn test_mark_as_unread_and_close() {
        let mut session = seeded_session();
        session.open_chat("chat_4");
        assert_eq!(session.chats()[3].unread_count, 0);

        session.mark_as_unread("chat_4");
        assert_eq!(session.chats()[3].unread_count, 1);

        assert!(session.close_chat("chat_4"));
        assert!(!session.close_chat("chat_4"));
        assert!(session.panes().is_empty());
    }

    #[test]
    fn test_deep_link_opens_owning_chat() {
        let store = Arc::new(MessageStore::in_memory());
        initialize_mock_data(&store, 30);
        let mut session = Session::new(store, None, EngineConfig::default(), Some("msg_chat_3_4".to_string()));

        assert_eq!(session.auto_select_deep_link(), Some("chat_3".to_string()));
        assert_eq!(session.auto_select_deep_link(), None);

        let pane = session.pane_mut("chat_3").unwrap();
        assert_eq!(pane.messages().len(), 30);
        assert_eq!(pane.take_reveal(), Some(4));
    }
}
