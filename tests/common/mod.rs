// Common test utilities for integration tests
// Each test binary compiles this module separately, so not every helper is
// used everywhere.
#![allow(dead_code)]

use std::sync::{Arc, Once};
use std::time::Duration;

use anyhow::{anyhow, Result};
use log::LevelFilter;
use tokio::sync::broadcast;
use tokio::time::timeout;

use chatfeed::models::{Chat, Message, MessageStatus};
use chatfeed::session::Session;
use chatfeed::store::MessageStore;
use chatfeed::transport::{WorkerConfig, WorkerResponse};

// Initialize logging once
static INIT_LOGGER: Once = Once::new();

/// Set up the logger for the tests
pub fn setup_logging() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::Builder::new()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .try_init();
    });
}

/// How long a test waits for a single worker response
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Worker timings short enough for tests running in real time
pub fn fast_worker_config() -> WorkerConfig {
    WorkerConfig {
        processing_delay: Duration::from_millis(10),
        reply_delay_min: Duration::from_millis(20),
        reply_delay_max: Duration::from_millis(40),
    }
}

/// A received message with an explicit timestamp, id `<chat>_<timestamp>`
pub fn message_at(chat_id: &str, timestamp: i64) -> Message {
    Message {
        id: format!("{}_{}", chat_id, timestamp),
        chat_id: chat_id.to_string(),
        content: format!("Message {} in {}", timestamp, chat_id),
        sender: "Alice".to_string(),
        timestamp,
        is_own: false,
        status: Some(MessageStatus::Delivered),
    }
}

/// A store holding `count` messages per chat, timestamps 1 through `count`
pub fn store_with_history(chat_ids: &[&str], count: i64) -> Arc<MessageStore> {
    let store = MessageStore::in_memory();
    let chats: Vec<Chat> = chat_ids.iter().map(|id| Chat::new(id, &format!("Chat {}", id))).collect();
    store.replace_chats(&chats);

    let messages: Vec<Message> = chat_ids
        .iter()
        .flat_map(|id| (1..=count).map(move |ts| message_at(id, ts)))
        .collect();
    store.replace_messages(&messages);

    Arc::new(store)
}

/// Wait for the next worker response or fail after `RESPONSE_TIMEOUT`
pub async fn wait_for_response(rx: &mut broadcast::Receiver<WorkerResponse>) -> Result<WorkerResponse> {
    match timeout(RESPONSE_TIMEOUT, rx.recv()).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) => Err(anyhow!("Worker response channel failed: {}", e)),
        Err(_) => Err(anyhow!("No worker response within {:?}", RESPONSE_TIMEOUT)),
    }
}

/// Feed responses to the session until one of the given type arrives
pub async fn route_until(
    session: &mut Session,
    rx: &mut broadcast::Receiver<WorkerResponse>,
    type_name: &str,
) -> Result<WorkerResponse> {
    loop {
        let response = wait_for_response(rx).await?;
        let matched = response.type_name() == type_name;
        session.handle_worker_response(response.clone());
        if matched {
            return Ok(response);
        }
    }
}
