pub mod poller;
pub mod queue;
pub mod task;
pub mod worker;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Poller error: {0}")]
    Poller(String),
}
