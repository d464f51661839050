// Transport worker protocol
// Message-passing boundary between the pagination engines and the worker task

use log::{debug, error};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};

pub mod protocol;
pub mod worker;

pub use protocol::{
    message_types, AllMessagesLoaded, GenerateReply, LoadAllMessages, LoadMessagesPaginated, MessagesLoaded,
    ProtocolError, WorkerRequest, WorkerResponse,
};
pub use worker::{TransportWorker, WorkerConfig, MOCK_REPLIES};

/// Cloneable handle for posting requests to a worker and listening to its
/// responses. Requests cross the boundary as JSON envelopes only.
#[derive(Clone)]
pub struct WorkerHandle {
    request_tx: mpsc::UnboundedSender<Value>,
    response_tx: broadcast::Sender<WorkerResponse>,
}

impl WorkerHandle {
    /// Wrap an existing pair of channels. `TransportWorker::spawn` is the usual
    /// way to get a handle; tests use this to observe posted envelopes.
    pub fn new(request_tx: mpsc::UnboundedSender<Value>, response_tx: broadcast::Sender<WorkerResponse>) -> Self {
        WorkerHandle {
            request_tx,
            response_tx,
        }
    }

    /// Fire-and-forget a typed request. Returns false if it could not be sent.
    pub fn post(&self, request: &WorkerRequest) -> bool {
        match request.to_envelope() {
            Ok(envelope) => {
                debug!("Posting {} for chat {}", request.type_name(), request.chat_id());
                self.post_envelope(envelope)
            }
            Err(e) => {
                error!("Failed to encode {} request: {}", request.type_name(), e);
                false
            }
        }
    }

    /// Fire-and-forget a raw envelope
    pub fn post_envelope(&self, envelope: Value) -> bool {
        match self.request_tx.send(envelope) {
            Ok(_) => true,
            Err(_) => {
                error!("Transport worker is gone, request dropped");
                false
            }
        }
    }

    /// Listen to every response emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerResponse> {
        self.response_tx.subscribe()
    }
}
