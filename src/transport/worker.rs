// Transport worker
// An isolated task that answers load and reply requests after an artificial
// delay. It owns no persisted state: everything it needs arrives in the request.

use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

use super::protocol::{
    decode_request, AllMessagesLoaded, GenerateReply, LoadAllMessages, LoadMessagesPaginated, MessagesLoaded,
    WorkerRequest, WorkerResponse,
};
use super::WorkerHandle;
use crate::models::{generate_id, now_millis, Message, MessageStatus, BOT_SENDER_NAME, REPLY_ID_PREFIX};

/// Canned replies picked at random for GENERATE_REPLY
pub const MOCK_REPLIES: [&str; 10] = [
    "That's interesting! Tell me more.",
    "I see what you mean.",
    "Got it! Thanks for letting me know.",
    "That sounds great!",
    "Absolutely! I agree with you.",
    "Hmm, let me think about that...",
    "Sure thing! I'll get back to you on that.",
    "Thanks for sharing that with me!",
    "Interesting point of view!",
    "I appreciate you reaching out!",
];

/// Capacity of the response broadcast. Listeners that fall further behind
/// lag and should re-issue their pending loads.
const RESPONSE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Delay applied to both load requests
    pub processing_delay: Duration,
    /// Lower bound of the random reply delay
    pub reply_delay_min: Duration,
    /// Upper bound of the random reply delay
    pub reply_delay_max: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            processing_delay: Duration::from_millis(100),
            reply_delay_min: Duration::from_millis(1000),
            reply_delay_max: Duration::from_millis(3000),
        }
    }
}

impl WorkerConfig {
    fn random_reply_delay(&self) -> Duration {
        let min = self.reply_delay_min.as_millis() as u64;
        let max = self.reply_delay_max.as_millis() as u64;
        if max <= min {
            return self.reply_delay_min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

pub struct TransportWorker {
    request_rx: mpsc::UnboundedReceiver<Value>,
    response_tx: broadcast::Sender<WorkerResponse>,
    config: WorkerConfig,
}

impl TransportWorker {
    /// Start a worker on the current tokio runtime and return its handle.
    /// The worker stops once every handle has been dropped.
    pub fn spawn(config: WorkerConfig) -> WorkerHandle {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (response_tx, _) = broadcast::channel(RESPONSE_CHANNEL_CAPACITY);

        let worker = TransportWorker {
            request_rx,
            response_tx: response_tx.clone(),
            config,
        };
        tokio::spawn(worker.run());

        WorkerHandle::new(request_tx, response_tx)
    }

    async fn run(mut self) {
        info!("Transport worker started");
        while let Some(envelope) = self.request_rx.recv().await {
            match decode_request(envelope) {
                Ok(request) => self.handle_request(request),
                Err(e) => warn!("Dropping worker request: {}", e),
            }
        }
        info!("Transport worker stopped");
    }

    fn handle_request(&self, request: WorkerRequest) {
        debug!("Worker received {} for chat {}", request.type_name(), request.chat_id());
        match request {
            WorkerRequest::LoadMessagesPaginated(payload) => {
                let response = paginate(payload);
                self.respond_after(self.config.processing_delay, move || response);
            }
            WorkerRequest::LoadAllMessages(LoadAllMessages { chat_id, messages }) => {
                let response = WorkerResponse::AllMessagesLoaded(AllMessagesLoaded {
                    chat_id,
                    messages,
                    has_more: false,
                });
                self.respond_after(self.config.processing_delay, move || response);
            }
            WorkerRequest::GenerateReply(GenerateReply { chat_id, .. }) => {
                let delay = self.config.random_reply_delay();
                // The reply is stamped when it is produced, not when requested
                self.respond_after(delay, move || WorkerResponse::MockReply(mock_reply(&chat_id)));
            }
        }
    }

    /// Each response gets its own timer so a slow reply never holds up a page
    fn respond_after<F>(&self, delay: Duration, build: F)
    where
        F: FnOnce() -> WorkerResponse + Send + 'static,
    {
        let response_tx = self.response_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let response = build();
            let kind = response.type_name();
            if response_tx.send(response).is_err() {
                debug!("No listeners for {} response", kind);
            }
        });
    }
}

fn paginate(payload: LoadMessagesPaginated) -> WorkerResponse {
    let LoadMessagesPaginated {
        chat_id,
        messages,
        offset,
        limit,
    } = payload;

    let has_more = offset.saturating_add(limit) < messages.len();
    let page = messages.into_iter().skip(offset).take(limit).collect();

    WorkerResponse::MessagesLoaded(MessagesLoaded {
        chat_id,
        messages: page,
        offset,
        has_more,
    })
}

fn mock_reply(chat_id: &str) -> Message {
    let content = MOCK_REPLIES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(MOCK_REPLIES[0]);

    Message {
        id: generate_id(REPLY_ID_PREFIX),
        chat_id: chat_id.to_string(),
        content: content.to_string(),
        sender: BOT_SENDER_NAME.to_string(),
        timestamp: now_millis(),
        is_own: false,
        status: Some(MessageStatus::Delivered),
    }
}
