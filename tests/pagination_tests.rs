// Pagination engine driven by a real transport worker
use anyhow::Result;
use log::info;

use chatfeed::pagination::{EngineConfig, PaginationEngine};
use chatfeed::transport::{TransportWorker, WorkerConfig, WorkerResponse};

mod common;
use common::{setup_logging, store_with_history, wait_for_response};

fn timestamps(engine: &PaginationEngine) -> Vec<i64> {
    engine.messages().iter().map(|m| m.timestamp).collect()
}

#[tokio::test(start_paused = true)]
async fn test_two_pages_fill_window_in_order() -> Result<()> {
    setup_logging();
    let store = store_with_history(&["c1"], 25);
    let worker = TransportWorker::spawn(WorkerConfig::default());
    let mut responses = worker.subscribe();

    let mut engine = PaginationEngine::new(store, Some(worker), None, EngineConfig::default());
    engine.activate(Some("c1"));
    assert!(engine.is_loading());
    assert!(engine.messages().is_empty());

    let first = wait_for_response(&mut responses).await?;
    assert!(engine.handle_response(&first));
    assert_eq!(timestamps(&engine), (1..=20).collect::<Vec<i64>>());
    assert_eq!(engine.offset(), 20);
    assert!(engine.has_more());

    engine.load_more();
    let second = wait_for_response(&mut responses).await?;
    match &second {
        WorkerResponse::MessagesLoaded(page) => {
            assert_eq!(page.offset, 20);
            assert_eq!(page.messages.len(), 5);
            assert!(!page.has_more);
        }
        other => panic!("Unexpected response {:?}", other),
    }
    assert!(engine.handle_response(&second));

    info!("Window after two pages: {:?}", timestamps(&engine));
    assert_eq!(timestamps(&engine), (1..=25).collect::<Vec<i64>>());
    assert!(!engine.has_more());
    assert!(!engine.is_loading());

    // Exhausted, nothing more gets requested
    engine.load_more();
    assert!(!engine.is_loading());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_deep_link_loads_whole_history_and_reveals_target() -> Result<()> {
    setup_logging();
    let store = store_with_history(&["c1"], 60);
    let worker = TransportWorker::spawn(WorkerConfig::default());
    let mut responses = worker.subscribe();

    let mut engine = PaginationEngine::new(store, Some(worker), Some("c1_50".to_string()), EngineConfig::default());
    engine.activate(Some("c1"));
    assert_eq!(engine.take_reveal(), None);

    let response = wait_for_response(&mut responses).await?;
    assert_eq!(response.type_name(), "ALL_MESSAGES_LOADED");
    assert!(engine.handle_response(&response));

    assert_eq!(engine.messages().len(), 60);
    assert!(!engine.has_more());
    assert_eq!(engine.take_reveal(), Some(49));
    assert_eq!(engine.take_reveal(), None);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_engines_sharing_a_worker_stay_isolated() -> Result<()> {
    setup_logging();
    let store = store_with_history(&["A", "B"], 30);
    let worker = TransportWorker::spawn(WorkerConfig::default());
    let mut responses = worker.subscribe();

    let mut left = PaginationEngine::new(store.clone(), Some(worker.clone()), None, EngineConfig::default());
    let mut right = PaginationEngine::new(store, Some(worker), None, EngineConfig::default());
    left.activate(Some("A"));
    right.activate(Some("B"));

    // Every listener sees every response
    for _ in 0..2 {
        let response = wait_for_response(&mut responses).await?;
        let applied_left = left.handle_response(&response);
        let applied_right = right.handle_response(&response);
        assert!(applied_left != applied_right, "exactly one engine takes {:?}", response.chat_id());
    }

    assert_eq!(left.messages().len(), 20);
    assert_eq!(right.messages().len(), 20);
    assert!(left.messages().iter().all(|m| m.chat_id == "A"));
    assert!(right.messages().iter().all(|m| m.chat_id == "B"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_switching_chats_discards_late_page() -> Result<()> {
    setup_logging();
    let store = store_with_history(&["c1", "c2"], 10);
    let worker = TransportWorker::spawn(WorkerConfig::default());
    let mut responses = worker.subscribe();

    let mut engine = PaginationEngine::new(store, Some(worker), None, EngineConfig::default());
    engine.activate(Some("c1"));
    engine.activate(Some("c2"));

    let mut applied = 0;
    for _ in 0..2 {
        let response = wait_for_response(&mut responses).await?;
        if engine.handle_response(&response) {
            applied += 1;
        }
    }

    assert_eq!(applied, 1);
    assert_eq!(engine.active_chat(), Some("c2"));
    assert_eq!(engine.messages().len(), 10);
    assert!(engine.messages().iter().all(|m| m.chat_id == "c2"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_smaller_page_size_is_respected() -> Result<()> {
    setup_logging();
    let store = store_with_history(&["c1"], 12);
    let worker = TransportWorker::spawn(WorkerConfig::default());
    let mut responses = worker.subscribe();

    let config = EngineConfig {
        page_size: 5,
        ..EngineConfig::default()
    };
    let mut engine = PaginationEngine::new(store, Some(worker), None, config);
    engine.activate(Some("c1"));

    let mut pages = 0;
    loop {
        let response = wait_for_response(&mut responses).await?;
        assert!(engine.handle_response(&response));
        pages += 1;
        if !engine.has_more() {
            break;
        }
        engine.load_more();
    }

    assert_eq!(pages, 3);
    assert_eq!(timestamps(&engine), (1..=12).collect::<Vec<i64>>());
    assert_eq!(engine.offset(), 15);
    Ok(())
}
