//! Supervised pool of browser workers.
//!
//! Every slot is owned by one supervisor task. Jobs enter a bounded FIFO queue
//! and are pulled by whichever supervisor is idle. A worker that times out or
//! fails is torn down and relaunched with bounded attempts; the job itself is
//! never retried.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    time::{Duration, Instant as StdInstant},
};

use async_channel::{Receiver, Sender, TrySendError};
use bytes::Bytes;
use futures::future::join_all;
use metrics::{counter, gauge, histogram};
use parking_lot::Mutex;
use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{sleep, timeout, timeout_at},
};
use tracing::{debug, error, info, warn};

use crate::domain::job::Job;

use super::types::{PoolConfig, PoolStats, RenderError, WorkerError, WorkerState};
use super::worker::{BrowserWorker, WorkerLauncher};

const METRIC_RENDER_TOTAL: &str = "pressroom_render_total";
const METRIC_RENDER_MS: &str = "pressroom_render_ms";
const METRIC_WORKER_RESTART_TOTAL: &str = "pressroom_worker_restart_total";
const METRIC_POOL_IDLE_WORKERS: &str = "pressroom_pool_idle_workers";
const LIVENESS_TIMEOUT: Duration = Duration::from_secs(2);

struct Dispatch {
    job: Job,
    reply: oneshot::Sender<Result<Bytes, RenderError>>,
}

struct Slot {
    state: AtomicU8,
}

impl Slot {
    fn new(state: WorkerState) -> Self {
        Self {
            state: AtomicU8::new(state as u8),
        }
    }

    fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }
}

struct PoolShared {
    slots: Vec<Slot>,
    config: PoolConfig,
    launcher: Arc<dyn WorkerLauncher>,
}

impl PoolShared {
    fn set_state(&self, index: usize, state: WorkerState) {
        self.slots[index].state.store(state as u8, Ordering::Release);
        let idle = self
            .slots
            .iter()
            .filter(|slot| slot.get() == WorkerState::Idle)
            .count();
        gauge!(METRIC_POOL_IDLE_WORKERS).set(idle as f64);
    }
}

pub struct RendererPool {
    sender: Sender<Dispatch>,
    shared: Arc<PoolShared>,
    supervisors: Mutex<Vec<JoinHandle<()>>>,
}

impl RendererPool {
    /// Launch every worker concurrently. Fails only when none could be started.
    pub async fn start(
        config: PoolConfig,
        launcher: Arc<dyn WorkerLauncher>,
    ) -> Result<Self, RenderError> {
        let size = config.workers.get();
        let started_at = StdInstant::now();
        let launches = (0..size).map(|index| {
            let launcher = Arc::clone(&launcher);
            async move { launcher.launch(index).await }
        });
        let results: Vec<Result<Box<dyn BrowserWorker>, WorkerError>> = join_all(launches).await;

        let launched = results.iter().filter(|result| result.is_ok()).count();
        if launched == 0 {
            let cause = results
                .into_iter()
                .find_map(Result::err)
                .unwrap_or_else(|| WorkerError::launch("pool has no slots"));
            error!(
                target = "pressroom::render::pool",
                op = "start",
                workers = size,
                error = %cause,
                "no renderer worker could be started"
            );
            return Err(RenderError::NoWorkers(cause));
        }
        if launched < size {
            warn!(
                target = "pressroom::render::pool",
                op = "start",
                workers = size,
                launched,
                "renderer pool started degraded; missing workers will be relaunched"
            );
        }

        let slots = results
            .iter()
            .map(|result| match result {
                Ok(_) => Slot::new(WorkerState::Idle),
                Err(_) => Slot::new(WorkerState::Restarting),
            })
            .collect();
        let shared = Arc::new(PoolShared {
            slots,
            config: config.clone(),
            launcher,
        });
        let (sender, receiver) = async_channel::bounded(config.queue_capacity.get());

        let supervisors = results
            .into_iter()
            .enumerate()
            .map(|(index, result)| {
                let worker = match result {
                    Ok(worker) => Some(worker),
                    Err(err) => {
                        warn!(
                            target = "pressroom::render::pool",
                            op = "start",
                            slot = index,
                            error = %err,
                            "worker failed to start"
                        );
                        None
                    }
                };
                tokio::spawn(supervise(
                    index,
                    worker,
                    receiver.clone(),
                    Arc::clone(&shared),
                ))
            })
            .collect();

        info!(
            target = "pressroom::render::pool",
            op = "start",
            workers = size,
            launched,
            queue_capacity = config.queue_capacity.get(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "renderer pool started"
        );

        Ok(Self {
            sender,
            shared,
            supervisors: Mutex::new(supervisors),
        })
    }

    /// Queue a job and wait for its PDF, bounded by the job deadline.
    pub async fn render(&self, job: Job) -> Result<Bytes, RenderError> {
        let deadline = job.deadline;
        let (reply, response) = oneshot::channel();
        self.sender
            .try_send(Dispatch { job, reply })
            .map_err(|err| match err {
                TrySendError::Full(_) => RenderError::QueueFull,
                TrySendError::Closed(_) => RenderError::PoolClosed,
            })?;

        match timeout_at(deadline, response).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(RenderError::PoolClosed),
            Err(_) => Err(RenderError::Timeout),
        }
    }

    pub fn stats(&self) -> PoolStats {
        let mut stats = PoolStats {
            size: self.shared.slots.len(),
            queued: self.sender.len(),
            ..PoolStats::default()
        };
        for slot in &self.shared.slots {
            match slot.get() {
                WorkerState::Idle => stats.idle += 1,
                WorkerState::Busy => stats.busy += 1,
                WorkerState::Crashed => stats.crashed += 1,
                WorkerState::Restarting => stats.restarting += 1,
                WorkerState::Stopped => stats.stopped += 1,
            }
        }
        stats
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Stop admission, let supervisors drain, then abort whatever is left.
    pub async fn close(&self) {
        self.sender.close();
        let handles = std::mem::take(&mut *self.supervisors.lock());
        if handles.is_empty() {
            return;
        }

        let grace = self.shared.config.graceful_shutdown;
        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        if timeout(grace, join_all(handles)).await.is_err() {
            warn!(
                target = "pressroom::render::pool",
                op = "close",
                grace_ms = grace.as_millis() as u64,
                "supervisors did not drain in time; aborting"
            );
            for abort in aborts {
                abort.abort();
            }
        }
        for index in 0..self.shared.slots.len() {
            self.shared.set_state(index, WorkerState::Stopped);
        }
        info!(
            target = "pressroom::render::pool",
            op = "close",
            "renderer pool closed"
        );
    }
}

async fn supervise(
    index: usize,
    mut worker: Option<Box<dyn BrowserWorker>>,
    queue: Receiver<Dispatch>,
    shared: Arc<PoolShared>,
) {
    if worker.is_none() {
        worker = relaunch(index, &shared).await;
    }

    while worker.is_some() {
        shared.set_state(index, WorkerState::Idle);
        let Ok(Dispatch { job, reply }) = queue.recv().await else {
            break;
        };

        if reply.is_closed() || job.is_expired() {
            debug!(
                target = "pressroom::render::pool",
                op = "dispatch",
                slot = index,
                job_id = %job.id,
                "discarding abandoned or expired job"
            );
            let _ = reply.send(Err(RenderError::Timeout));
            continue;
        }

        if !worker_alive(worker.as_mut()).await {
            warn!(
                target = "pressroom::render::pool",
                op = "dispatch",
                slot = index,
                job_id = %job.id,
                "idle worker is gone; relaunching before dispatch"
            );
            shared.set_state(index, WorkerState::Crashed);
            if let Some(mut dead) = worker.take() {
                dead.shutdown().await;
            }
            worker = relaunch(index, &shared).await;
        }
        let Some(active) = worker.as_mut() else {
            let _ = reply.send(Err(RenderError::Failed(WorkerError::launch(
                "worker could not be relaunched",
            ))));
            break;
        };

        shared.set_state(index, WorkerState::Busy);
        let started_at = StdInstant::now();
        let outcome = match timeout_at(job.deadline, active.print_pdf(&job)).await {
            Ok(Ok(pdf)) => Ok(pdf),
            Ok(Err(err)) => Err(RenderError::Failed(err)),
            Err(_) => Err(RenderError::Timeout),
        };
        let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
        let result_label = match &outcome {
            Ok(_) => "ok",
            Err(RenderError::Timeout) => "timeout",
            Err(_) => "failed",
        };
        counter!(METRIC_RENDER_TOTAL, "result" => result_label).increment(1);
        histogram!(METRIC_RENDER_MS).record(elapsed_ms);

        match &outcome {
            Ok(pdf) => debug!(
                target = "pressroom::render::pool",
                op = "render",
                slot = index,
                job_id = %job.id,
                pdf_bytes = pdf.len(),
                elapsed_ms = elapsed_ms as u64,
                "job rendered"
            ),
            Err(err) => warn!(
                target = "pressroom::render::pool",
                op = "render",
                slot = index,
                job_id = %job.id,
                result = result_label,
                error = %err,
                elapsed_ms = elapsed_ms as u64,
                "job failed; recycling worker"
            ),
        }

        let failed = outcome.is_err();
        let _ = reply.send(outcome);

        if failed {
            shared.set_state(index, WorkerState::Crashed);
            if let Some(mut broken) = worker.take() {
                broken.shutdown().await;
            }
            worker = relaunch(index, &shared).await;
        }
    }

    if let Some(mut remaining) = worker.take() {
        remaining.shutdown().await;
    }
    shared.set_state(index, WorkerState::Stopped);
    debug!(
        target = "pressroom::render::pool",
        op = "supervise",
        slot = index,
        "supervisor exited"
    );
}

async fn worker_alive(worker: Option<&mut Box<dyn BrowserWorker>>) -> bool {
    match worker {
        Some(worker) => timeout(LIVENESS_TIMEOUT, worker.is_alive())
            .await
            .unwrap_or(false),
        None => false,
    }
}

async fn relaunch(index: usize, shared: &PoolShared) -> Option<Box<dyn BrowserWorker>> {
    let attempts = shared.config.restart_attempts;
    for attempt in 1..=attempts {
        shared.set_state(index, WorkerState::Restarting);
        sleep(shared.config.restart_backoff * attempt).await;

        match shared.launcher.launch(index).await {
            Ok(worker) => {
                counter!(METRIC_WORKER_RESTART_TOTAL, "result" => "ok").increment(1);
                info!(
                    target = "pressroom::render::pool",
                    op = "relaunch",
                    slot = index,
                    attempt,
                    "worker relaunched"
                );
                return Some(worker);
            }
            Err(err) => {
                counter!(METRIC_WORKER_RESTART_TOTAL, "result" => "failed").increment(1);
                warn!(
                    target = "pressroom::render::pool",
                    op = "relaunch",
                    slot = index,
                    attempt,
                    error = %err,
                    "worker relaunch failed"
                );
            }
        }
    }

    error!(
        target = "pressroom::render::pool",
        op = "relaunch",
        slot = index,
        attempts,
        "worker restarts exhausted; slot stopped"
    );
    None
}
