use std::sync::Arc;

use crate::error::{BotError, BotResult};
use crate::runtime::poller::Poller;
use crate::runtime::queue::DispatchQueue;
use crate::runtime::worker::DownloadWorker;
use crate::state::AppState;

pub struct BotService {
    state: Arc<AppState>,
}

impl BotService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Runs until a shutdown signal or a fatal poller failure, then drains
    /// the queue before cancelling the workers.
    pub async fn run(&self) -> BotResult<()> {
        info!("Testing connection to Telegram API...");
        match self.state.gateway.get_me().await {
            Ok(me) => info!("Connected as @{}", me.username.as_deref().unwrap_or("unknown")),
            Err(e) => {
                error!("Failed to connect to Telegram API: {:?}", e);
                return Err(BotError::Gateway(e));
            }
        }

        let queue = Arc::new(DispatchQueue::new());
        let poller = Poller::new(
            Arc::clone(&self.state.gateway),
            Arc::clone(&queue),
            self.state.config.runtime.poll_timeout_secs,
        );
        let workers = DownloadWorker::new(
            "download_worker",
            self.state.config.runtime.concurrency,
            Arc::clone(&queue),
            Arc::clone(&self.state),
        );

        workers.start();
        let poller_handle = poller.start();
        info!(
            "Bot has been started with {} workers",
            self.state.config.runtime.concurrency
        );

        let mut fatal: Option<BotError> = None;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
            joined = poller_handle => match joined {
                Ok(Ok(())) => info!("Poller exited"),
                Ok(Err(e)) => {
                    error!("Poller failed: {}", e);
                    fatal = Some(e.into());
                }
                Err(e) => {
                    fatal = Some(anyhow::anyhow!("Poller task panicked: {e}").into());
                }
            },
        }

        // no new fetches, let the workers finish what was queued, then
        // cancel them
        poller.stop();
        queue.close().await;
        queue.join().await;
        workers.stop().await;
        info!("Bot has been stopped");

        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
