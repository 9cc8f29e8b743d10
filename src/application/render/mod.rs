//! Renderer pool: shares a fixed set of headless-browser workers across requests.
//!
//! The pool owns the worker processes through per-slot supervisors, enforces
//! per-job deadlines and replaces workers that crash or hang. Browser specifics
//! stay behind [`WorkerLauncher`] and [`BrowserWorker`].

mod pool;
mod types;
mod worker;

pub use pool::RendererPool;
pub use types::{PoolConfig, PoolStats, RenderError, WorkerError, WorkerState};
pub use worker::{BrowserWorker, WorkerLauncher};
