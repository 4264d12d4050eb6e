use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::queue::DispatchQueue;
use super::RuntimeError;
use crate::gateway::{Gateway, Update};

const MAX_CONSECUTIVE_FAILURES: u32 = 5;
const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Single producer feeding the dispatch queue: long-polls the gateway with
/// a monotonically advancing offset and pushes every update in arrival
/// order. Transient fetch failures are retried with backoff; running out
/// of retries terminates the poller task with an error, which is fatal for
/// the process.
pub struct Poller {
    gateway: Arc<dyn Gateway>,
    queue: Arc<DispatchQueue<Update>>,
    poll_timeout_secs: u64,
    shutdown: broadcast::Sender<()>,
    running: Arc<AtomicBool>,
}

impl Poller {
    pub fn new(gateway: Arc<dyn Gateway>, queue: Arc<DispatchQueue<Update>>, poll_timeout_secs: u64) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            gateway,
            queue,
            poll_timeout_secs,
            shutdown,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn start(&self) -> JoinHandle<Result<(), RuntimeError>> {
        self.running.store(true, Ordering::SeqCst);
        let gateway = Arc::clone(&self.gateway);
        let queue = Arc::clone(&self.queue);
        let running = Arc::clone(&self.running);
        let timeout = self.poll_timeout_secs;
        let mut rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            // offset is owned here and nowhere else; it never rewinds
            // within one process lifetime
            let mut offset: Option<i64> = None;
            let mut failures: u32 = 0;

            while running.load(Ordering::SeqCst) {
                tokio::select! {
                    _ = rx.recv() => break,
                    result = gateway.fetch_updates(offset, timeout) => match result {
                        Ok(batch) => {
                            failures = 0;
                            for update in batch {
                                offset = Some(update.update_id + 1);
                                queue.push(update).await;
                            }
                        }
                        Err(e) => {
                            failures += 1;
                            if failures >= MAX_CONSECUTIVE_FAILURES {
                                error!("Giving up after {} consecutive fetch failures: {}", failures, e);
                                return Err(RuntimeError::Poller(e.to_string()));
                            }
                            let delay = backoff_delay(failures);
                            warn!("fetch_updates failed (attempt {}): {}, retrying in {:?}", failures, e, delay);
                            // a stop request must not wait out the backoff
                            tokio::select! {
                                _ = rx.recv() => break,
                                _ = tokio::time::sleep(delay) => {}
                            }
                        }
                    }
                }
            }

            info!("Poller stopped");
            Ok(())
        })
    }

    /// Stop issuing fetches. An in-flight long poll is abandoned, not
    /// awaited.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.shutdown.send(());
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let exponential = BACKOFF_BASE.saturating_mul(1u32 << (attempt - 1).min(5));
    let jitter = rand::thread_rng().gen_range(0..250);
    exponential.min(BACKOFF_CAP) + Duration::from_millis(jitter)
}
