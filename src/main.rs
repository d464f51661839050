#![deny(dead_code)]
use anyhow::Result;
use clap::Parser;
use log::{debug, info, warn, LevelFilter};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

mod config;
mod utils;

use chatfeed::models::{generate_id, now_millis, Message, MessageStatus};
use chatfeed::post_message::{self, PostMessageBridge};
use chatfeed::seed::initialize_mock_data;
use chatfeed::session::Session;
use chatfeed::store::{JsonFileStorage, MemoryStorage, MessageStore};
use chatfeed::transport::{TransportWorker, WorkerResponse};

/// How often external messages are picked up from the store
const PUMP_INTERVAL: Duration = Duration::from_millis(250);

/// Lines shown when a pane is first printed
const TAIL_LINES: usize = 5;

/// Command line arguments for chatfeed
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "chatfeed: a paginated two-pane chat feed driven from the terminal.",
    long_about = "chatfeed keeps chats and messages in a local store, pages history in through a \
    background transport worker and shows up to two chats side by side.\n\n\
    Commands once running:\n\
    /open <chat>  /close <chat>  /more <chat>  /send <chat> <text>\n\
    /post <chat> <text>  /unread <chat>  /chats  /quit"
)]
struct Args {
    /// Directory holding settings.json, the log file and the default data directory
    #[arg(long, value_name = "PATH")]
    config_dir: Option<PathBuf>,

    /// Open the chat containing this message and load its full history
    #[arg(long, value_name = "ID")]
    message_id: Option<String>,

    /// Write logs here instead of <config_dir>/chatfeed.log
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Load pages straight from the store without the transport worker
    #[arg(long)]
    no_worker: bool,

    /// Throw away stored chats and messages and seed fresh demo data
    #[arg(long)]
    reseed: bool,

    /// Keep everything in memory for this run only
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(dir) = &args.config_dir {
        config::set_config_dir_override(dir.clone());
    }

    let log_file_path = match &args.log_file {
        Some(path) => path.clone(),
        None => config::get_config_dir()?.join("chatfeed.log"),
    };
    utils::setup_logging(log_file_path.to_str(), LevelFilter::Debug)?;
    info!("Logging to file: {}", log_file_path.display());

    let settings = config::load_settings()?;
    debug!("Settings: {:?}", settings);

    let store = if args.in_memory {
        info!("Using in-memory storage");
        MessageStore::new(MemoryStorage::new(), settings.store_config())
    } else {
        let data_dir = settings.data_dir()?;
        if args.reseed && data_dir.exists() {
            info!("Removing stored data in {}", data_dir.display());
            std::fs::remove_dir_all(&data_dir)?;
        }
        MessageStore::new(JsonFileStorage::open(&data_dir)?, settings.store_config())
    };
    let store = Arc::new(store);
    initialize_mock_data(&store, settings.seed_messages_per_chat);

    let worker = if args.no_worker {
        info!("Running without transport worker");
        None
    } else {
        Some(TransportWorker::spawn(settings.worker_config()))
    };

    let mut session = Session::new(store.clone(), worker, settings.engine_config(), args.message_id.clone());
    let mut responses = session.worker_responses();

    let mut bridge = PostMessageBridge::new(post_message::channel());
    bridge.init(store.clone());

    print_chats(&session);
    if let Some(chat_id) = session.auto_select_deep_link() {
        println!("Opened {} for the linked message", chat_id);
    } else if let Some(target) = &args.message_id {
        println!("Message {} was not found in any chat", target);
    }

    let mut seen: HashMap<String, String> = HashMap::new();
    print_updates(&mut session, &mut seen);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pump_timer = tokio::time::interval(PUMP_INTERVAL);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if !handle_command(&mut session, &bridge, line.trim()) {
                    break;
                }
            }
            Some(event) = next_response(&mut responses) => match event {
                WorkerEvent::Response(response) => {
                    session.handle_worker_response(response);
                }
                WorkerEvent::Lagged(skipped) => {
                    warn!("Missed {} worker responses, re-issuing pending loads", skipped);
                    session.reissue_pending_loads();
                }
            },
            _ = pump_timer.tick() => {
                session.pump();
            }
        }
        print_updates(&mut session, &mut seen);
    }

    bridge.destroy();
    info!("chatfeed shutting down");
    Ok(())
}

enum WorkerEvent {
    Response(WorkerResponse),
    /// The listener fell behind and this many responses were dropped
    Lagged(u64),
}

async fn next_response(responses: &mut Option<broadcast::Receiver<WorkerResponse>>) -> Option<WorkerEvent> {
    let Some(rx) = responses.as_mut() else {
        return std::future::pending().await;
    };

    loop {
        match rx.recv().await {
            Ok(response) => return Some(WorkerEvent::Response(response)),
            Err(RecvError::Lagged(skipped)) => return Some(WorkerEvent::Lagged(skipped)),
            Err(RecvError::Closed) => {
                warn!("Transport worker closed its response channel");
                *responses = None;
                return None;
            }
        }
    }
}

/// Run one command line. Returns false when the user asked to quit.
fn handle_command(session: &mut Session, bridge: &PostMessageBridge, line: &str) -> bool {
    if line.is_empty() {
        return true;
    }

    let mut parts = line.splitn(3, ' ');
    let command = parts.next().unwrap_or_default();
    let chat_id = parts.next().unwrap_or_default();
    let text = parts.next().unwrap_or_default();

    match (command, chat_id.is_empty()) {
        ("/quit", _) => return false,
        ("/chats", _) => print_chats(session),
        ("/open", false) => {
            if let Some(closed) = session.open_chat(chat_id) {
                println!("Closed {} to make room", closed);
            }
        }
        ("/close", false) => {
            if !session.close_chat(chat_id) {
                println!("{} is not open", chat_id);
            }
        }
        ("/more", false) => match session.pane(chat_id).map(|pane| pane.has_more()) {
            Some(true) => session.load_more(chat_id),
            Some(false) => println!("{}: no older messages", chat_id),
            None => println!("{} is not open", chat_id),
        },
        ("/send", false) => {
            if session.send_message(chat_id, text).is_none() {
                println!("Nothing sent (is {} open and the text non-empty?)", chat_id);
            }
        }
        ("/post", false) => {
            let message = Message {
                id: generate_id("ext"),
                chat_id: chat_id.to_string(),
                content: text.to_string(),
                sender: "External".to_string(),
                timestamp: now_millis(),
                is_own: false,
                status: Some(MessageStatus::Delivered),
            };
            if !bridge.post(&message) {
                println!("Post message bridge is not listening");
            }
        }
        ("/unread", false) => session.mark_as_unread(chat_id),
        _ => println!("Unknown command: {}", line),
    }
    true
}

fn print_chats(session: &Session) {
    for chat in session.chats() {
        let open = if session.selection().contains(&chat.id) { "*" } else { " " };
        let online = if chat.is_online.unwrap_or(false) { "online" } else { "" };
        println!("{} {:<8} {:<20} unread {:<3} {}", open, chat.id, chat.name, chat.unread_count, online);
    }
}

/// Print messages each pane gained since the last call, plus any deep-link reveal
fn print_updates(session: &mut Session, seen: &mut HashMap<String, String>) {
    let open: Vec<String> = session.selection().selected().to_vec();
    seen.retain(|chat_id, _| open.contains(chat_id));

    for chat_id in &open {
        let Some(pane) = session.pane_mut(chat_id) else {
            continue;
        };

        if let Some(index) = pane.take_reveal() {
            if let Some(message) = pane.messages().get(index) {
                println!("[{}] linked message #{}:", chat_id, index);
                println!("{}", utils::format_message(message));
            }
        }

        let messages = pane.messages();
        let Some(last) = messages.last() else {
            continue;
        };
        if seen.get(chat_id) == Some(&last.id) {
            continue;
        }

        let start = seen
            .get(chat_id)
            .and_then(|id| messages.iter().position(|m| &m.id == id))
            .map(|i| i + 1)
            .unwrap_or_else(|| messages.len().saturating_sub(TAIL_LINES));

        for message in &messages[start..] {
            println!("[{}] {}", chat_id, utils::format_message(message));
        }
        seen.insert(chat_id.clone(), last.id.clone());
    }
}
