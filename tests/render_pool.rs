use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use pressroom::application::render::{
    BrowserWorker, PoolConfig, PoolStats, RenderError, RendererPool, WorkerError, WorkerLauncher,
};
use pressroom::domain::job::{Job, RenderOptions};
use tokio::time::{Instant, sleep};

#[derive(Default)]
struct Counters {
    launches: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    shutdowns: AtomicUsize,
    die_while_idle: AtomicBool,
}

/// Sleeps for the duration encoded in the job URL, then returns a fixed PDF.
/// A URL of `fail` makes the print fail immediately.
struct SleepyWorker {
    counters: Arc<Counters>,
}

#[async_trait]
impl BrowserWorker for SleepyWorker {
    async fn print_pdf(&mut self, job: &Job) -> Result<Bytes, WorkerError> {
        if job.url == "fail" {
            return Err(WorkerError::print("tab crashed"));
        }
        let millis: u64 = job.url.parse().unwrap_or(0);

        let now = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_active.fetch_max(now, Ordering::SeqCst);
        sleep(Duration::from_millis(millis)).await;
        self.counters.active.fetch_sub(1, Ordering::SeqCst);

        Ok(Bytes::from_static(b"%PDF-1.4"))
    }

    async fn is_alive(&mut self) -> bool {
        !self.counters.die_while_idle.swap(false, Ordering::SeqCst)
    }

    async fn shutdown(&mut self) {
        self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

struct SleepyLauncher {
    counters: Arc<Counters>,
    failing_launches: usize,
}

#[async_trait]
impl WorkerLauncher for SleepyLauncher {
    async fn launch(&self, _slot: usize) -> Result<Box<dyn BrowserWorker>, WorkerError> {
        let launch = self.counters.launches.fetch_add(1, Ordering::SeqCst);
        if launch < self.failing_launches {
            return Err(WorkerError::launch("chrome binary missing"));
        }
        Ok(Box::new(SleepyWorker {
            counters: Arc::clone(&self.counters),
        }))
    }
}

fn config(workers: usize) -> PoolConfig {
    PoolConfig::new(NonZeroUsize::new(workers).expect("non-zero workers"))
}

async fn start(config: PoolConfig, failing_launches: usize) -> (Arc<RendererPool>, Arc<Counters>) {
    let counters = Arc::new(Counters::default());
    let launcher = Arc::new(SleepyLauncher {
        counters: Arc::clone(&counters),
        failing_launches,
    });
    let pool = RendererPool::start(config, launcher)
        .await
        .expect("pool starts");
    (Arc::new(pool), counters)
}

fn job(url: &str, within: Duration) -> Job {
    Job::new(url, RenderOptions::default(), Instant::now() + within)
}

async fn wait_for(pool: &RendererPool, predicate: impl Fn(&PoolStats) -> bool) -> PoolStats {
    for _ in 0..1_000 {
        let stats = pool.stats();
        if predicate(&stats) {
            return stats;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("pool never reached expected state: {:?}", pool.stats());
}

#[tokio::test(start_paused = true)]
async fn single_worker_serializes_concurrent_jobs() {
    let (pool, counters) = start(config(1), 0).await;

    let (first, second) = tokio::join!(
        pool.render(job("200", Duration::from_secs(5))),
        pool.render(job("200", Duration::from_secs(5))),
    );

    assert_eq!(first.expect("first render").as_ref(), b"%PDF-1.4");
    assert_eq!(second.expect("second render").as_ref(), b"%PDF-1.4");
    assert_eq!(counters.max_active.load(Ordering::SeqCst), 1);
    pool.close().await;
}

#[tokio::test(start_paused = true)]
async fn workers_run_jobs_in_parallel_up_to_pool_size() {
    let (pool, counters) = start(config(3), 0).await;

    let renders = (0..3).map(|_| pool.render(job("500", Duration::from_secs(5))));
    let results = futures::future::join_all(renders).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(counters.max_active.load(Ordering::SeqCst), 3);
    pool.close().await;
}

#[tokio::test(start_paused = true)]
async fn hung_worker_times_out_and_is_replaced() {
    let (pool, counters) = start(config(1), 0).await;

    let outcome = pool.render(job("60000", Duration::from_secs(1))).await;
    assert!(matches!(outcome, Err(RenderError::Timeout)));

    let stats = wait_for(&pool, |stats| stats.idle == 1).await;
    assert_eq!(stats.size, 1);
    assert_eq!(counters.launches.load(Ordering::SeqCst), 2);
    assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 1);

    let next = pool.render(job("10", Duration::from_secs(5))).await;
    assert!(next.is_ok(), "replacement worker serves: {next:?}");
    pool.close().await;
}

#[tokio::test(start_paused = true)]
async fn failed_print_is_not_retried_and_worker_recycles() {
    let (pool, counters) = start(config(1), 0).await;

    let outcome = pool.render(job("fail", Duration::from_secs(5))).await;
    match outcome {
        Err(RenderError::Failed(WorkerError::Print { message })) => {
            assert_eq!(message, "tab crashed")
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    wait_for(&pool, |stats| stats.idle == 1).await;
    assert_eq!(counters.launches.load(Ordering::SeqCst), 2);
    pool.close().await;
}

#[tokio::test(start_paused = true)]
async fn full_queue_rejects_immediately() {
    let mut config = config(1);
    config.queue_capacity = NonZeroUsize::new(1).expect("non-zero capacity");
    let (pool, _counters) = start(config, 0).await;

    let running = tokio::spawn({
        let pool = Arc::clone(&pool);
        async move { pool.render(job("1000", Duration::from_secs(10))).await }
    });
    wait_for(&pool, |stats| stats.busy == 1).await;

    let queued = tokio::spawn({
        let pool = Arc::clone(&pool);
        async move { pool.render(job("10", Duration::from_secs(10))).await }
    });
    wait_for(&pool, |stats| stats.queued == 1).await;

    let rejected = pool.render(job("10", Duration::from_secs(10))).await;
    assert!(matches!(rejected, Err(RenderError::QueueFull)));

    assert!(running.await.expect("join running").is_ok());
    assert!(queued.await.expect("join queued").is_ok());
    pool.close().await;
}

#[tokio::test(start_paused = true)]
async fn pool_starts_degraded_and_relaunches_missing_slots() {
    let (pool, counters) = start(config(2), 1).await;

    let stats = wait_for(&pool, |stats| stats.idle == 2).await;
    assert_eq!(stats.restarting, 0);
    assert_eq!(counters.launches.load(Ordering::SeqCst), 3);
    pool.close().await;
}

#[tokio::test(start_paused = true)]
async fn start_fails_when_no_worker_launches() {
    let counters = Arc::new(Counters::default());
    let launcher = Arc::new(SleepyLauncher {
        counters: Arc::clone(&counters),
        failing_launches: usize::MAX,
    });

    let outcome = RendererPool::start(config(2), launcher).await;
    assert!(matches!(outcome, Err(RenderError::NoWorkers(_))));
}

#[tokio::test(start_paused = true)]
async fn closed_pool_refuses_jobs_and_reports_stopped() {
    let (pool, counters) = start(config(2), 0).await;
    pool.close().await;

    let outcome = pool.render(job("10", Duration::from_secs(5))).await;
    assert!(matches!(outcome, Err(RenderError::PoolClosed)));
    assert!(pool.is_closed());

    let stats = pool.stats();
    assert_eq!(stats.stopped, 2);
    assert!(!stats.has_capacity());
    assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn dead_idle_worker_is_replaced_before_taking_a_job() {
    let (pool, counters) = start(config(1), 0).await;
    counters.die_while_idle.store(true, Ordering::SeqCst);

    let outcome = pool.render(job("10", Duration::from_secs(5))).await;

    assert!(outcome.is_ok(), "job served by replacement: {outcome:?}");
    assert_eq!(counters.launches.load(Ordering::SeqCst), 2);
    assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 1);
    pool.close().await;
}

#[tokio::test(start_paused = true)]
async fn close_lets_in_flight_job_finish_within_grace() {
    let (pool, _counters) = start(config(1), 0).await;

    let running = tokio::spawn({
        let pool = Arc::clone(&pool);
        async move { pool.render(job("2000", Duration::from_secs(30))).await }
    });
    wait_for(&pool, |stats| stats.busy == 1).await;

    pool.close().await;

    let outcome = running.await.expect("join running");
    assert_eq!(outcome.expect("answered before close returns").as_ref(), b"%PDF-1.4");
    assert_eq!(pool.stats().stopped, 1);
}

#[tokio::test(start_paused = true)]
async fn close_aborts_jobs_that_outlast_grace() {
    let mut config = config(1);
    config.graceful_shutdown = Duration::from_secs(1);
    let (pool, _counters) = start(config, 0).await;

    let running = tokio::spawn({
        let pool = Arc::clone(&pool);
        async move { pool.render(job("60000", Duration::from_secs(120))).await }
    });
    wait_for(&pool, |stats| stats.busy == 1).await;

    let closing_started = Instant::now();
    pool.close().await;
    assert!(closing_started.elapsed() < Duration::from_secs(2));

    let outcome = running.await.expect("join running");
    assert!(matches!(outcome, Err(RenderError::PoolClosed)), "{outcome:?}");
    assert_eq!(pool.stats().stopped, 1);
}
