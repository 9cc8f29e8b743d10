use std::{num::NonZeroUsize, time::Duration};

use serde::Serialize;
use thiserror::Error;

/// Failures reported by a single browser worker.
#[derive(Debug, Clone, Error)]
pub enum WorkerError {
    #[error("browser worker failed to start: {message}")]
    Launch { message: String },
    #[error("browser worker failed to print: {message}")]
    Print { message: String },
}

impl WorkerError {
    pub fn launch(message: impl Into<String>) -> Self {
        Self::Launch {
            message: message.into(),
        }
    }

    pub fn print(message: impl Into<String>) -> Self {
        Self::Print {
            message: message.into(),
        }
    }
}

/// Structured errors surfaced by the renderer pool. A job is attempted at most once.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("render did not finish before its deadline")]
    Timeout,
    #[error("render failed")]
    Failed(#[source] WorkerError),
    #[error("render queue is full")]
    QueueFull,
    #[error("renderer pool is closed")]
    PoolClosed,
    #[error("no renderer worker could be started")]
    NoWorkers(#[source] WorkerError),
}

/// Lifecycle of one worker slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum WorkerState {
    Idle = 0,
    Busy = 1,
    Crashed = 2,
    Restarting = 3,
    Stopped = 4,
}

impl WorkerState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Idle,
            1 => WorkerState::Busy,
            2 => WorkerState::Crashed,
            3 => WorkerState::Restarting,
            _ => WorkerState::Stopped,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub workers: NonZeroUsize,
    pub queue_capacity: NonZeroUsize,
    pub restart_attempts: u32,
    /// Multiplied by the attempt number before each relaunch.
    pub restart_backoff: Duration,
    pub graceful_shutdown: Duration,
}

impl PoolConfig {
    pub fn new(workers: NonZeroUsize) -> Self {
        Self {
            workers,
            queue_capacity: NonZeroUsize::new(workers.get().saturating_mul(4)).unwrap_or(workers),
            restart_attempts: 3,
            restart_backoff: Duration::from_millis(500),
            graceful_shutdown: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PoolStats {
    pub size: usize,
    pub idle: usize,
    pub busy: usize,
    pub crashed: usize,
    pub restarting: usize,
    pub stopped: usize,
    pub queued: usize,
}

impl PoolStats {
    /// At least one slot is serving or about to serve again.
    pub fn has_capacity(&self) -> bool {
        self.idle + self.busy + self.restarting + self.crashed > 0
    }
}
