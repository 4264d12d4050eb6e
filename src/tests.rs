//! End-to-end pipeline scenarios driven through the public queue and
//! worker-pool API, with scripted collaborators.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::gateway::Update;
use crate::runtime::queue::DispatchQueue;
use crate::runtime::worker::DownloadWorker;
use crate::storage::{MemoryUserStore, UserStore};
use crate::utils::test::{sample_metadata, test_state, text_update, FakeFetcher, FakeGateway, FakeHttp, GatewayCall};

struct Rig {
    queue: Arc<DispatchQueue<Update>>,
    workers: DownloadWorker,
    gateway: Arc<FakeGateway>,
    store: MemoryUserStore,
}

fn rig(concurrency: usize, fetcher: FakeFetcher) -> Rig {
    let gateway = Arc::new(FakeGateway::new());
    let store = MemoryUserStore::new();
    let state = test_state(
        Arc::new(store.clone()),
        gateway.clone(),
        Arc::new(fetcher),
        Arc::new(FakeHttp { reachable: true }),
    );
    let queue = Arc::new(DispatchQueue::new());
    let workers = DownloadWorker::new("e2e_worker", concurrency, Arc::clone(&queue), state);
    Rig {
        queue,
        workers,
        gateway,
        store,
    }
}

async fn drain_and_stop(r: &Rig) {
    timeout(Duration::from_secs(5), r.queue.join())
        .await
        .expect("queue never drained");
    r.queue.close().await;
    r.workers.stop().await;
}

#[tokio::test]
async fn test_messages_from_distinct_users_are_all_processed() {
    let r = rig(2, FakeFetcher::ok(sample_metadata(5400)));

    r.queue.push(text_update(1, 10, 10, "https://valid.example/a")).await;
    r.queue.push(text_update(2, 11, 11, "https://valid.example/b")).await;
    r.workers.start();

    drain_and_stop(&r).await;

    assert_eq!(r.gateway.audio_calls().len(), 2);
    assert!(!r.store.is_downloading(10).await.unwrap());
    assert!(!r.store.is_downloading(11).await.unwrap());
    assert_eq!(r.store.count_users().await.unwrap(), 2);
}

#[tokio::test]
async fn test_second_message_from_same_user_hits_busy_conflict() {
    // a slow download keeps the first job inside the locked section while
    // the second worker picks up the duplicate request
    let fetcher = FakeFetcher::ok(sample_metadata(60)).with_fetch_delay(Duration::from_millis(300));
    let r = rig(2, fetcher);

    r.queue.push(text_update(1, 10, 10, "https://valid.example/a")).await;
    r.queue.push(text_update(2, 10, 10, "https://valid.example/a")).await;
    r.workers.start();

    drain_and_stop(&r).await;

    // exactly one download happened; the loser was told the user is busy
    assert_eq!(r.gateway.audio_calls().len(), 1);
    let busy = t!("messages.busy").to_string();
    let texts: Vec<String> = r
        .gateway
        .sent_texts()
        .into_iter()
        .chain(r.gateway.edit_texts())
        .collect();
    assert!(texts.contains(&busy));
    assert!(!r.store.is_downloading(10).await.unwrap());
}

#[tokio::test]
async fn test_injected_failures_never_leak_a_lock() {
    let r = rig(2, FakeFetcher::probe_error("extractor exploded"));

    for (update_id, user_id) in [(1, 20), (2, 21), (3, 22)] {
        r.queue
            .push(text_update(update_id, user_id, user_id, "https://valid.example/x"))
            .await;
    }
    r.workers.start();

    drain_and_stop(&r).await;

    assert_eq!(r.gateway.audio_calls().len(), 0);
    for user_id in [20, 21, 22] {
        assert!(r.store.exists(user_id).await.unwrap());
        assert!(!r.store.is_downloading(user_id).await.unwrap());
    }
}

#[tokio::test]
async fn test_shutdown_drains_queued_work_before_stopping() {
    let r = rig(1, FakeFetcher::ok(sample_metadata(60)));

    for (update_id, user_id) in [(1, 30), (2, 31), (3, 32)] {
        r.queue
            .push(text_update(update_id, user_id, user_id, "https://valid.example/x"))
            .await;
    }
    r.workers.start();

    // close first, as the shutdown path does; queued items must still be
    // handled before join resolves
    r.queue.close().await;
    timeout(Duration::from_secs(5), r.queue.join())
        .await
        .expect("queue never drained");
    r.workers.stop().await;

    assert_eq!(r.gateway.audio_calls().len(), 3);
}

#[tokio::test]
async fn test_single_worker_preserves_submission_order() {
    let r = rig(1, FakeFetcher::ok(sample_metadata(60)));

    r.queue.push(text_update(1, 40, 40, "https://valid.example/a")).await;
    r.queue.push(text_update(2, 41, 41, "https://valid.example/b")).await;
    r.workers.start();

    drain_and_stop(&r).await;

    let chats: Vec<i64> = r
        .gateway
        .audio_calls()
        .into_iter()
        .map(|call| match call {
            GatewayCall::Audio { chat_id, .. } => chat_id,
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(chats, vec![40, 41]);
}
