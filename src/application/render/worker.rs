use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::job::Job;

use super::types::WorkerError;

/// One live headless-browser process.
#[async_trait]
pub trait BrowserWorker: Send {
    /// Navigate to the job URL and print it. The pool enforces the deadline.
    async fn print_pdf(&mut self, job: &Job) -> Result<Bytes, WorkerError>;

    /// Cheap health check run before a job is handed over.
    async fn is_alive(&mut self) -> bool {
        true
    }

    /// Tear the process down. Must be safe to call on a crashed worker.
    async fn shutdown(&mut self);
}

/// Starts browser workers for pool slots.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn launch(&self, slot: usize) -> Result<Box<dyn BrowserWorker>, WorkerError>;
}
