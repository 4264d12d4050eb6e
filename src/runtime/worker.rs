use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use super::queue::DispatchQueue;
use super::task::DownloadJob;
use crate::commands::Command;
use crate::error::BotResult;
use crate::gateway::{AudioUpload, IncomingMessage, MessageHandle, Update};
use crate::state::AppState;
use crate::utils::extract_link;

/// Fixed pool of consumers draining the dispatch queue. Every message runs
/// the full pipeline to completion inside its worker, error paths
/// included; nothing escapes a worker loop.
#[derive(Clone)]
pub struct DownloadWorker {
    name: String,
    concurrency: usize,
    queue: Arc<DispatchQueue<Update>>,
    state: Arc<AppState>,
    shutdown: broadcast::Sender<()>,
    running: Arc<AtomicBool>,
}

impl DownloadWorker {
    pub fn new(name: &str, concurrency: usize, queue: Arc<DispatchQueue<Update>>, state: Arc<AppState>) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            name: name.to_string(),
            concurrency,
            queue,
            state,
            shutdown,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        for i in 0..self.concurrency {
            let worker = self.clone();
            let worker_name = format!("{}_{}", self.name, i);
            let mut rx = self.shutdown.subscribe();

            tokio::spawn(async move {
                while worker.running.load(Ordering::SeqCst) {
                    tokio::select! {
                        popped = worker.queue.pop() => {
                            let Some(update) = popped else { break };
                            worker.handle_update(update).await;
                            worker.queue.task_done().await;
                        }
                        _ = rx.recv() => break,
                    }
                }
                debug!("Worker {} exited", worker_name);
            });
        }
    }

    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.shutdown.send(());
    }

    async fn handle_update(&self, update: Update) {
        let Some(message) = update.message else {
            debug!("Ignoring update {} without a message", update.update_id);
            return;
        };
        let Some(text) = message.text.clone() else {
            debug!("Ignoring non-text message in chat {}", message.chat.id);
            return;
        };

        if let Some(command) = Command::parse(&text) {
            if let Err(e) = self.handle_command(&message, command).await {
                error!("Command handling failed in chat {}: {}", message.chat.id, e);
            }
            return;
        }

        let candidate = extract_link(&text).unwrap_or_else(|| text.trim());
        let Some(job) = DownloadJob::from_message(&message, candidate) else {
            debug!("Ignoring message without a sender in chat {}", message.chat.id);
            return;
        };

        if let Err(e) = self.process_job(&job).await {
            error!("Job {} for user {} failed: {}", job.id, job.user_id, e);
        }
    }

    async fn handle_command(&self, message: &IncomingMessage, command: Command) -> BotResult<()> {
        let chat_id = message.chat.id;
        match command {
            Command::Start => {
                if let Some(sender) = &message.from {
                    self.state.store.register(sender.id).await?;
                }
                let limit = self.state.config.download.max_duration_mins;
                self.state
                    .gateway
                    .send_message(chat_id, &t!("messages.start", limit = limit.to_string()))
                    .await?;
            }
            Command::Status => {
                let count = self.state.store.count_users().await?;
                self.state
                    .gateway
                    .send_message(chat_id, &t!("messages.status", count = count.to_string()))
                    .await?;
            }
        }
        Ok(())
    }

    async fn process_job(&self, job: &DownloadJob) -> BotResult<()> {
        let store = &self.state.store;
        let gateway = &self.state.gateway;

        // registration is idempotent; two workers racing on first contact
        // still end up with a single record. A store failure here reads as
        // "not registered" and is reported to the sender.
        if !self.ensure_registered(job.user_id).await {
            gateway
                .send_message(job.chat_id, &t!("messages.registration_failed"))
                .await?;
            return Ok(());
        }

        // cheap busy reject before touching anything else
        match store.is_downloading(job.user_id).await {
            Ok(true) => {
                gateway.send_message(job.chat_id, &t!("messages.busy")).await?;
                return Ok(());
            }
            Ok(false) => {}
            Err(e) => {
                error!("User store failed while checking user {}: {}", job.user_id, e);
                gateway
                    .send_message(job.chat_id, &t!("messages.registration_failed"))
                    .await?;
                return Ok(());
            }
        }

        if !self.state.http.is_reachable(&job.url).await {
            gateway
                .send_message(job.chat_id, &t!("messages.invalid_link", url = job.url.as_str()))
                .await?;
            return Ok(());
        }

        let status = gateway
            .send_message(job.chat_id, &t!("messages.finding", url = job.url.as_str()))
            .await?;

        // the actual lock; losing the race to a concurrent message from the
        // same user counts as busy
        if !store.try_acquire_download(job.user_id).await? {
            gateway.edit_message(status, &t!("messages.busy")).await?;
            return Ok(());
        }

        let outcome = self.run_locked(job, status).await;

        // released on every path out of the locked section
        if let Err(e) = store.release_download(job.user_id).await {
            error!("Failed to release download slot for user {}: {}", job.user_id, e);
        }

        outcome
    }

    /// Idempotent create plus existence confirmation. Store failures come
    /// back as "not registered" so the caller reports them to the sender.
    async fn ensure_registered(&self, user_id: i64) -> bool {
        let store = &self.state.store;
        let outcome = match store.register(user_id).await {
            Ok(true) => store.exists(user_id).await,
            other => other,
        };
        match outcome {
            Ok(present) => present,
            Err(e) => {
                error!("User store failed while registering user {}: {}", user_id, e);
                false
            }
        }
    }

    async fn run_locked(&self, job: &DownloadJob, status: MessageHandle) -> BotResult<()> {
        let gateway = &self.state.gateway;

        let metadata = match self.state.fetcher.probe(&job.url).await {
            Ok(metadata) => metadata,
            Err(e) => {
                gateway
                    .edit_message(status, &t!("messages.download_failed", error = e.to_string()))
                    .await?;
                return Ok(());
            }
        };

        let limit = self.state.config.download.max_duration_mins;
        let duration = metadata.duration_minutes();
        if duration > limit {
            gateway
                .edit_message(
                    status,
                    &t!(
                        "messages.duration_exceeded",
                        limit = limit.to_string(),
                        duration = duration.to_string()
                    ),
                )
                .await?;
            return Ok(());
        }

        gateway.edit_message(status, &t!("messages.downloading")).await?;
        let download = match self.state.fetcher.fetch(&job.url).await {
            Ok(download) => download,
            Err(e) => {
                gateway
                    .edit_message(status, &t!("messages.download_failed", error = e.to_string()))
                    .await?;
                return Ok(());
            }
        };

        let upload = AudioUpload {
            path: &download.path,
            title: &download.metadata.title,
            performer: &download.metadata.channel,
            duration_seconds: download.metadata.duration_seconds,
        };
        match gateway.send_audio(job.chat_id, upload).await {
            Ok(()) => {
                gateway
                    .edit_message(status, &t!("messages.completed", title = download.metadata.title.as_str()))
                    .await?;
            }
            Err(e) => {
                gateway
                    .edit_message(status, &t!("messages.upload_failed", error = e.to_string()))
                    .await?;
            }
        }

        // the artifact never outlives the job, whatever the upload did
        if let Err(e) = tokio::fs::remove_file(&download.path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove artifact {}: {}", download.path.display(), e);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryUserStore, StorageError, UserStore};
    use crate::utils::test::{
        sample_metadata, test_state, text_update, FakeFetcher, FakeGateway, FakeHttp, GatewayCall,
    };

    /// Store wrapper with injectable read failures.
    struct FailingStore {
        inner: MemoryUserStore,
        fail_register: bool,
        fail_busy_check: bool,
    }

    impl FailingStore {
        fn broken() -> Self {
            Self {
                inner: MemoryUserStore::new(),
                fail_register: true,
                fail_busy_check: false,
            }
        }

        fn busy_check_broken() -> Self {
            Self {
                inner: MemoryUserStore::new(),
                fail_register: false,
                fail_busy_check: true,
            }
        }

        fn failure() -> StorageError {
            StorageError::Redis("connection refused".to_string())
        }
    }

    #[async_trait::async_trait]
    impl UserStore for FailingStore {
        async fn register(&self, user_id: i64) -> Result<bool, StorageError> {
            if self.fail_register {
                return Err(Self::failure());
            }
            self.inner.register(user_id).await
        }

        async fn exists(&self, user_id: i64) -> Result<bool, StorageError> {
            self.inner.exists(user_id).await
        }

        async fn is_downloading(&self, user_id: i64) -> Result<bool, StorageError> {
            if self.fail_busy_check {
                return Err(Self::failure());
            }
            self.inner.is_downloading(user_id).await
        }

        async fn try_acquire_download(&self, user_id: i64) -> Result<bool, StorageError> {
            self.inner.try_acquire_download(user_id).await
        }

        async fn release_download(&self, user_id: i64) -> Result<(), StorageError> {
            self.inner.release_download(user_id).await
        }

        async fn count_users(&self) -> Result<u64, StorageError> {
            self.inner.count_users().await
        }
    }

    struct Harness {
        worker: DownloadWorker,
        gateway: Arc<FakeGateway>,
        store: MemoryUserStore,
        fetcher: Arc<FakeFetcher>,
    }

    fn harness(fetcher: FakeFetcher, reachable: bool) -> Harness {
        let gateway = Arc::new(FakeGateway::new());
        let store = MemoryUserStore::new();
        let fetcher = Arc::new(fetcher);
        let state = test_state(
            Arc::new(store.clone()),
            gateway.clone(),
            fetcher.clone(),
            Arc::new(FakeHttp { reachable }),
        );
        let queue = Arc::new(DispatchQueue::new());
        let worker = DownloadWorker::new("test_worker", 1, queue, state);
        Harness {
            worker,
            gateway,
            store,
            fetcher,
        }
    }

    #[tokio::test]
    async fn test_happy_path_delivers_audio_and_cleans_up() {
        let fetcher = FakeFetcher::ok(sample_metadata(5400));
        let h = harness(fetcher, true);

        h.worker
            .handle_update(text_update(1, 10, 20, "https://valid.example/video"))
            .await;

        let audio = h.gateway.audio_calls();
        assert_eq!(audio.len(), 1);
        match &audio[0] {
            GatewayCall::Audio {
                chat_id,
                path,
                title,
                performer,
                duration_seconds,
            } => {
                assert_eq!(*chat_id, 20);
                assert_eq!(title, "T");
                assert_eq!(performer, "C");
                assert_eq!(*duration_seconds, 5400);
                // artifact removed after upload
                assert!(!path.exists());
            }
            other => panic!("unexpected call {:?}", other),
        }

        let edits = h.gateway.edit_texts();
        assert_eq!(*edits.last().unwrap(), t!("messages.completed", title = "T").to_string());

        assert!(h.store.exists(10).await.unwrap());
        assert!(!h.store.is_downloading(10).await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_link_mutates_nothing_beyond_registration() {
        let h = harness(FakeFetcher::ok(sample_metadata(60)), false);

        h.worker.handle_update(text_update(1, 10, 20, "not-a-url")).await;

        assert_eq!(
            h.gateway.sent_texts(),
            vec![t!("messages.invalid_link", url = "not-a-url").to_string()]
        );
        assert!(h.store.exists(10).await.unwrap());
        assert!(!h.store.is_downloading(10).await.unwrap());
        assert_eq!(h.fetcher.probe_calls(), 0);
    }

    #[tokio::test]
    async fn test_busy_user_is_rejected_without_new_work() {
        let h = harness(FakeFetcher::ok(sample_metadata(60)), true);
        h.store.register(10).await.unwrap();
        assert!(h.store.try_acquire_download(10).await.unwrap());

        h.worker
            .handle_update(text_update(1, 10, 20, "https://valid.example/video"))
            .await;

        assert_eq!(h.gateway.sent_texts(), vec![t!("messages.busy").to_string()]);
        assert_eq!(h.fetcher.probe_calls(), 0);
        assert_eq!(h.fetcher.fetch_calls(), 0);
        // the slot still belongs to the first download
        assert!(h.store.is_downloading(10).await.unwrap());
    }

    #[tokio::test]
    async fn test_duration_at_limit_is_accepted() {
        let h = harness(FakeFetcher::ok(sample_metadata(230 * 60)), true);

        h.worker
            .handle_update(text_update(1, 10, 20, "https://valid.example/video"))
            .await;

        assert_eq!(h.gateway.audio_calls().len(), 1);
        assert!(!h.store.is_downloading(10).await.unwrap());
    }

    #[tokio::test]
    async fn test_duration_over_limit_is_rejected_before_download() {
        let h = harness(FakeFetcher::ok(sample_metadata(230 * 60 + 60)), true);

        h.worker
            .handle_update(text_update(1, 10, 20, "https://valid.example/video"))
            .await;

        let edits = h.gateway.edit_texts();
        assert_eq!(
            *edits.last().unwrap(),
            t!("messages.duration_exceeded", limit = "230", duration = "231").to_string()
        );
        assert_eq!(h.fetcher.fetch_calls(), 0);
        assert!(!h.store.is_downloading(10).await.unwrap());
    }

    #[tokio::test]
    async fn test_probe_failure_releases_the_lock() {
        let h = harness(FakeFetcher::probe_error("no extractor"), true);

        h.worker
            .handle_update(text_update(1, 10, 20, "https://valid.example/video"))
            .await;

        let edits = h.gateway.edit_texts();
        assert!(edits.last().unwrap().contains("no extractor"));
        assert!(!h.store.is_downloading(10).await.unwrap());
    }

    #[tokio::test]
    async fn test_fetch_failure_releases_the_lock() {
        let h = harness(
            FakeFetcher::ok(sample_metadata(60)).with_fetch_error("network reset"),
            true,
        );

        h.worker
            .handle_update(text_update(1, 10, 20, "https://valid.example/video"))
            .await;

        let edits = h.gateway.edit_texts();
        assert!(edits.last().unwrap().contains("network reset"));
        assert_eq!(h.gateway.audio_calls().len(), 0);
        assert!(!h.store.is_downloading(10).await.unwrap());
    }

    #[tokio::test]
    async fn test_upload_failure_still_releases_and_cleans_up() {
        let h = harness(FakeFetcher::ok(sample_metadata(60)), true);
        h.gateway.fail_send_audio();

        h.worker
            .handle_update(text_update(1, 10, 20, "https://valid.example/video"))
            .await;

        let edits = h.gateway.edit_texts();
        assert!(edits.last().unwrap().contains("upload rejected"));
        assert!(!h.store.is_downloading(10).await.unwrap());

        match &h.gateway.audio_calls()[0] {
            GatewayCall::Audio { path, .. } => assert!(!path.exists()),
            other => panic!("unexpected call {:?}", other),
        }
    }

    async fn run_with_store(store: FailingStore) -> (Arc<FakeGateway>, Arc<FakeFetcher>) {
        let gateway = Arc::new(FakeGateway::new());
        let fetcher = Arc::new(FakeFetcher::ok(sample_metadata(60)));
        let state = test_state(
            Arc::new(store),
            gateway.clone(),
            fetcher.clone(),
            Arc::new(FakeHttp { reachable: true }),
        );
        let worker = DownloadWorker::new("test_worker", 1, Arc::new(DispatchQueue::new()), state);

        worker
            .handle_update(text_update(1, 10, 20, "https://valid.example/video"))
            .await;
        (gateway, fetcher)
    }

    #[tokio::test]
    async fn test_store_failure_during_registration_is_reported() {
        let (gateway, fetcher) = run_with_store(FailingStore::broken()).await;

        assert_eq!(
            gateway.sent_texts(),
            vec![t!("messages.registration_failed").to_string()]
        );
        assert_eq!(fetcher.probe_calls(), 0);
        assert_eq!(fetcher.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_during_busy_check_is_reported() {
        let (gateway, fetcher) = run_with_store(FailingStore::busy_check_broken()).await;

        assert_eq!(
            gateway.sent_texts(),
            vec![t!("messages.registration_failed").to_string()]
        );
        assert_eq!(fetcher.probe_calls(), 0);
    }

    #[tokio::test]
    async fn test_start_command_registers_and_greets() {
        let h = harness(FakeFetcher::ok(sample_metadata(60)), true);

        h.worker.handle_update(text_update(1, 10, 20, "/start")).await;

        assert!(h.store.exists(10).await.unwrap());
        assert_eq!(
            h.gateway.sent_texts(),
            vec![t!("messages.start", limit = "230").to_string()]
        );
    }

    #[tokio::test]
    async fn test_status_command_reports_user_count() {
        let h = harness(FakeFetcher::ok(sample_metadata(60)), true);
        h.store.register(1).await.unwrap();
        h.store.register(2).await.unwrap();

        h.worker.handle_update(text_update(1, 10, 20, "/status")).await;

        assert_eq!(
            h.gateway.sent_texts(),
            vec![t!("messages.status", count = "2").to_string()]
        );
    }

    #[tokio::test]
    async fn test_updates_without_message_or_text_are_ignored() {
        let h = harness(FakeFetcher::ok(sample_metadata(60)), true);

        h.worker
            .handle_update(Update {
                update_id: 1,
                message: None,
            })
            .await;
        let mut sticker = text_update(2, 10, 20, "x");
        sticker.message.as_mut().unwrap().text = None;
        h.worker.handle_update(sticker).await;

        assert!(h.gateway.calls().is_empty());
    }
}
