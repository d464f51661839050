// Multi-chat selection
//
// Tracks which chats are open side by side. The list is ordered, holds no
// duplicates and never grows past its capacity: opening one more chat closes
// the oldest pane.

use log::{debug, info};

use crate::store::MessageStore;

/// Number of panes shown at once
pub const MAX_OPEN_CHATS: usize = 2;

#[derive(Debug, Clone)]
pub struct ChatSelection {
    selected: Vec<String>,
    capacity: usize,
}

impl Default for ChatSelection {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSelection {
    pub fn new() -> Self {
        Self::with_capacity(MAX_OPEN_CHATS)
    }

    /// A selection holding at most `capacity` chats (at least one)
    pub fn with_capacity(capacity: usize) -> Self {
        ChatSelection {
            selected: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn contains(&self, chat_id: &str) -> bool {
        self.selected.iter().any(|id| id == chat_id)
    }

    /// Left pane
    pub fn left(&self) -> Option<&str> {
        self.selected.first().map(String::as_str)
    }

    /// Right pane, only when two chats are open
    pub fn right(&self) -> Option<&str> {
        self.selected.get(1).map(String::as_str)
    }

    /// Open a chat. Selecting an open chat changes nothing. When full, the
    /// oldest selection is evicted and returned.
    pub fn select(&mut self, chat_id: &str) -> Option<String> {
        if self.contains(chat_id) {
            debug!("Chat {} already open", chat_id);
            return None;
        }

        let evicted = if self.selected.len() >= self.capacity {
            let oldest = self.selected.remove(0);
            debug!("Closing {} to make room for {}", oldest, chat_id);
            Some(oldest)
        } else {
            None
        };

        self.selected.push(chat_id.to_string());
        evicted
    }

    /// Close a chat. Returns false if it was not open.
    pub fn close(&mut self, chat_id: &str) -> bool {
        let before = self.selected.len();
        self.selected.retain(|id| id != chat_id);
        self.selected.len() != before
    }

    /// Open the chat that owns `message_id`, but only when nothing is open
    /// yet. Chats are scanned in store order; the first match wins.
    pub fn auto_select_for_deep_link(&mut self, store: &MessageStore, message_id: &str) -> Option<String> {
        if !self.selected.is_empty() {
            return None;
        }

        let owner = store
            .get_chats()
            .into_iter()
            .find(|chat| store.contains_message(&chat.id, message_id))?;

        info!("Deep link {} belongs to chat {}", message_id, owner.id);
        self.select(&owner.id);
        Some(owner.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chat, Message};

    #[test]
    fn test_select_is_ordered_bounded_and_unique() {
        let mut selection = ChatSelection::new();

        assert_eq!(selection.select("x"), None);
        assert_eq!(selection.select("y"), None);
        assert_eq!(selection.selected(), ["x", "y"]);

        assert_eq!(selection.select("z"), Some("x".to_string()));
        assert_eq!(selection.selected(), ["y", "z"]);

        assert_eq!(selection.select("y"), None);
        assert_eq!(selection.selected(), ["y", "z"]);
        assert_eq!(selection.left(), Some("y"));
        assert_eq!(selection.right(), Some("z"));
    }

    #[test]
    fn test_close_removes_only_that_chat() {
        let mut selection = ChatSelection::new();
        selection.select("a");
        selection.select("b");

        assert!(selection.close("a"));
        assert!(!selection.close("a"));
        assert_eq!(selection.selected(), ["b"]);
        assert_eq!(selection.left(), Some("b"));
        assert_eq!(selection.right(), None);
    }

    #[test]
    fn test_deep_link_auto_select_only_when_empty() {
        let store = MessageStore::in_memory();
        store.replace_chats(&[Chat::new("c1", "One"), Chat::new("c2", "Two")]);
        store.replace_messages(&[Message {
            id: "target".to_string(),
            chat_id: "c2".to_string(),
            content: "hi".to_string(),
            sender: "Bob".to_string(),
            timestamp: 1,
            is_own: false,
            status: None,
        }]);

        let mut selection = ChatSelection::new();
        assert_eq!(selection.auto_select_for_deep_link(&store, "missing"), None);
        assert!(selection.is_empty());

        assert_eq!(selection.auto_select_for_deep_link(&store, "target"), Some("c2".to_string()));
        assert_eq!(selection.selected(), ["c2"]);

        let mut busy = ChatSelection::new();
        busy.select("c1");
        assert_eq!(busy.auto_select_for_deep_link(&store, "target"), None);
        assert_eq!(busy.selected(), ["c1"]);
    }
}
