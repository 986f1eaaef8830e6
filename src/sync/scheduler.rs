//! Batch scheduler for watch tasks
//!
//! Every `interval_hours` the scheduler loads the active, due tasks and runs
//! them one after another. Each run is spawned onto its own tokio task with a
//! timeout, so a panic or a hang in one task is counted as a failure and the
//! batch moves on. Manual runs arrive through `ManualRunHandle` and are
//! executed next to the scheduled batches, even while one is in flight.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::database::TaskStore;
use crate::error::{DbError, SchedulerError};
use crate::otel::Metrics;
use crate::radar::RunOutcome;

/// Executes a single task run
///
/// Implementations report failures through the outcome instead of an error.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run_task(&self, task_id: i64) -> RunOutcome;
}

/// Aggregate result of one batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    /// Tasks selected as active and due
    pub due: usize,
    pub completed: usize,
    /// Errors, panics and timeouts
    pub failed: usize,
    /// Runs skipped because the task was already processing
    pub skipped: usize,
    pub duration: Duration,
}

impl BatchSummary {
    fn record(&mut self, outcome: &RunOutcome) {
        match outcome {
            RunOutcome::Completed { .. } => self.completed += 1,
            RunOutcome::Failed(_) => self.failed += 1,
            RunOutcome::AlreadyRunning => self.skipped += 1,
        }
    }
}

/// Manual run request
struct ManualRunRequest {
    task_id: i64,
    response: mpsc::Sender<RunOutcome>,
}

/// State a batch needs, cloned into the periodic loop
#[derive(Clone)]
struct Batch {
    tasks: Arc<dyn TaskStore>,
    runner: Arc<dyn TaskRunner>,
    metrics: Option<Arc<Metrics>>,
    run_timeout: Duration,
}

impl Batch {
    async fn run(&self) -> Result<BatchSummary, DbError> {
        let started = Instant::now();
        info!("Starting release radar batch");

        let due = self.tasks.list_active_due(Utc::now()).await?;
        let mut summary = BatchSummary {
            due: due.len(),
            ..BatchSummary::default()
        };

        for task in &due {
            let outcome = run_one(&self.runner, task.id_or_default(), self.run_timeout).await;
            summary.record(&outcome);
        }

        summary.duration = started.elapsed();
        info!(
            tasks = summary.due,
            completed = summary.completed,
            failed = summary.failed,
            skipped = summary.skipped,
            duration_ms = summary.duration.as_millis() as u64,
            "Release radar batch completed"
        );

        if let Some(ref metrics) = self.metrics {
            metrics.record_batch(summary.duration.as_secs_f64());
        }

        Ok(summary)
    }

    /// Run one batch unless shutdown arrives first; returns true on shutdown
    async fn run_until_shutdown(&self, shutdown_rx: &mut broadcast::Receiver<()>) -> bool {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received during batch, abandoning remaining tasks");
                true
            }
            result = self.run() => {
                if let Err(e) = result {
                    error!(error = %e, "Failed to load due tasks");
                }
                false
            }
        }
    }
}

/// Run one task on its own tokio task so panics and hangs stay contained
///
/// The run is aborted when the timeout fires or when this future is dropped.
async fn run_one(runner: &Arc<dyn TaskRunner>, task_id: i64, timeout: Duration) -> RunOutcome {
    let runner = Arc::clone(runner);
    let mut run = JoinSet::new();
    run.spawn(async move { runner.run_task(task_id).await });

    match tokio::time::timeout(timeout, run.join_next()).await {
        Ok(Some(Ok(outcome))) => outcome,
        Ok(Some(Err(e))) => {
            error!(task_id, error = %e, "Task run panicked");
            RunOutcome::Failed(format!("Task run panicked: {}", e))
        }
        Ok(None) => RunOutcome::Failed("Task run was not started".to_string()),
        Err(_) => {
            run.abort_all();
            warn!(
                task_id,
                timeout_secs = timeout.as_secs(),
                "Task run timed out"
            );
            RunOutcome::Failed("Task run timed out".to_string())
        }
    }
}

/// Periodic batch runner for watch tasks
pub struct BatchScheduler {
    config: SchedulerConfig,
    batch: Batch,
    shutdown_rx: broadcast::Receiver<()>,
    manual_run_rx: mpsc::Receiver<ManualRunRequest>,
    manual_run_tx: mpsc::Sender<ManualRunRequest>,
}

impl BatchScheduler {
    pub fn new(
        config: SchedulerConfig,
        tasks: Arc<dyn TaskStore>,
        runner: Arc<dyn TaskRunner>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        let (manual_run_tx, manual_run_rx) = mpsc::channel(32);
        let batch = Batch {
            tasks,
            runner,
            metrics: None,
            run_timeout: Duration::from_secs(config.run_timeout_secs),
        };

        Self {
            config,
            batch,
            shutdown_rx,
            manual_run_rx,
            manual_run_tx,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.batch.metrics = Some(metrics);
        self
    }

    /// Get a handle for triggering manual runs
    pub fn manual_run_handle(&self) -> ManualRunHandle {
        ManualRunHandle {
            tx: self.manual_run_tx.clone(),
        }
    }

    /// Run every active, due task once
    pub async fn run_batch(&self) -> Result<BatchSummary, DbError> {
        self.batch.run().await
    }

    /// Run the scheduler until shutdown is signalled
    ///
    /// Batches run on a spawned task so manual runs and shutdown are served
    /// while a batch is in flight.
    pub async fn run(mut self) {
        info!(
            interval_hours = self.config.interval_hours,
            "Starting batch scheduler"
        );

        let (batch_shutdown_tx, batch_shutdown_rx) = broadcast::channel::<()>(1);
        let periodic = tokio::spawn(Self::run_periodic(
            self.config.clone(),
            self.batch.clone(),
            batch_shutdown_rx,
        ));

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping batch scheduler");
                    let _ = batch_shutdown_tx.send(());
                    break;
                }
                Some(request) = self.manual_run_rx.recv() => {
                    self.handle_manual_run(request);
                }
            }
        }

        let _ = periodic.await;
        info!("Batch scheduler stopped");
    }

    async fn run_periodic(
        config: SchedulerConfig,
        batch: Batch,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let jitter = if config.jitter_secs > 0 {
            rand::thread_rng().gen_range(0..config.jitter_secs)
        } else {
            0
        };
        let delay = Duration::from_secs(config.initial_delay_secs + jitter);

        if !delay.is_zero() {
            debug!(delay_secs = delay.as_secs(), "Waiting for initial delay");
            tokio::select! {
                _ = shutdown_rx.recv() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        if config.run_on_startup && batch.run_until_shutdown(&mut shutdown_rx).await {
            return;
        }

        let period = Duration::from_secs(config.interval_hours.max(1) * 3600);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = ticker.tick() => {
                    if batch.run_until_shutdown(&mut shutdown_rx).await {
                        break;
                    }
                }
            }
        }
    }

    fn handle_manual_run(&self, request: ManualRunRequest) {
        let runner = Arc::clone(&self.batch.runner);
        let timeout = self.batch.run_timeout;

        tokio::spawn(async move {
            info!(task_id = request.task_id, "Manual run triggered");
            let outcome = run_one(&runner, request.task_id, timeout).await;
            let _ = request.response.send(outcome).await;
        });
    }
}

/// Handle for triggering manual runs
#[derive(Clone)]
pub struct ManualRunHandle {
    tx: mpsc::Sender<ManualRunRequest>,
}

impl ManualRunHandle {
    /// Run a task now, outside the batch schedule
    pub async fn trigger(&self, task_id: i64) -> Result<RunOutcome, SchedulerError> {
        let (response_tx, mut response_rx) = mpsc::channel(1);

        self.tx
            .send(ManualRunRequest {
                task_id,
                response: response_tx,
            })
            .await
            .map_err(|_| SchedulerError::NotRunning)?;

        response_rx.recv().await.ok_or(SchedulerError::NoResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MockTaskStore;
    use crate::models::WatchTask;
    use std::sync::Mutex;
    use tokio::time::timeout;

    /// Runner that records calls and misbehaves for selected task ids
    #[derive(Default)]
    struct TestRunner {
        calls: Arc<Mutex<Vec<i64>>>,
        fail_on: Option<i64>,
        panic_on: Option<i64>,
        hang_on: Option<i64>,
    }

    impl TestRunner {
        fn calls(&self) -> Arc<Mutex<Vec<i64>>> {
            self.calls.clone()
        }
    }

    #[async_trait]
    impl TaskRunner for TestRunner {
        async fn run_task(&self, task_id: i64) -> RunOutcome {
            self.calls.lock().unwrap().push(task_id);

            if self.panic_on == Some(task_id) {
                panic!("runner exploded");
            }
            if self.hang_on == Some(task_id) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.fail_on == Some(task_id) {
                return RunOutcome::Failed("boom".to_string());
            }
            RunOutcome::Completed {
                albums: 1,
                tracks_added: 1,
            }
        }
    }

    fn due_tasks(ids: &'static [i64]) -> MockTaskStore {
        let mut tasks = MockTaskStore::new();
        tasks.expect_list_active_due().returning(move |_| {
            Ok(ids
                .iter()
                .map(|id| {
                    let mut task = WatchTask::new("alice", "radar");
                    task.id = Some(*id);
                    task
                })
                .collect())
        });
        tasks
    }

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            interval_hours: 24,
            initial_delay_secs: 0,
            jitter_secs: 0,
            run_timeout_secs: 10,
            run_on_startup: true,
        }
    }

    fn scheduler(
        config: SchedulerConfig,
        tasks: MockTaskStore,
        runner: TestRunner,
    ) -> (BatchScheduler, broadcast::Sender<()>) {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let scheduler = BatchScheduler::new(config, Arc::new(tasks), Arc::new(runner), shutdown_rx);
        (scheduler, shutdown_tx)
    }

    // Test 1: Every due task runs once, in order
    #[tokio::test]
    async fn test_run_batch_runs_all_due_tasks() {
        let runner = TestRunner::default();
        let calls = runner.calls();
        let (scheduler, _tx) = scheduler(config(), due_tasks(&[1, 2, 3]), runner);

        let summary = scheduler.run_batch().await.unwrap();

        assert_eq!(*calls.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(summary.due, 3);
        assert_eq!(summary.completed, 3);
    }

    // Test 2: A failing first task does not stop the second
    #[tokio::test]
    async fn test_failed_task_isolated() {
        let runner = TestRunner {
            fail_on: Some(1),
            ..TestRunner::default()
        };
        let calls = runner.calls();
        let (scheduler, _tx) = scheduler(config(), due_tasks(&[1, 2]), runner);

        let summary = scheduler.run_batch().await.unwrap();

        assert_eq!(*calls.lock().unwrap(), vec![1, 2]);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.completed, 1);
    }

    // Test 3: A panicking task is counted as failed and the batch continues
    #[tokio::test]
    async fn test_panicking_task_isolated() {
        let runner = TestRunner {
            panic_on: Some(1),
            ..TestRunner::default()
        };
        let calls = runner.calls();
        let (scheduler, _tx) = scheduler(config(), due_tasks(&[1, 2]), runner);

        let summary = scheduler.run_batch().await.unwrap();

        assert_eq!(*calls.lock().unwrap(), vec![1, 2]);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.completed, 1);
    }

    // Test 4: A hanging task times out
    #[tokio::test(start_paused = true)]
    async fn test_hanging_task_times_out() {
        let runner = TestRunner {
            hang_on: Some(1),
            ..TestRunner::default()
        };
        let (scheduler, _tx) = scheduler(
            SchedulerConfig {
                run_timeout_secs: 1,
                ..config()
            },
            due_tasks(&[1, 2]),
            runner,
        );

        let summary = scheduler.run_batch().await.unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.completed, 1);
    }

    // Test 5: Task store errors surface from run_batch
    #[tokio::test]
    async fn test_run_batch_store_error() {
        let mut tasks = MockTaskStore::new();
        tasks
            .expect_list_active_due()
            .returning(|_| Err(DbError::NotFound));

        let (scheduler, _tx) = scheduler(config(), tasks, TestRunner::default());

        assert!(matches!(scheduler.run_batch().await, Err(DbError::NotFound)));
    }

    // Test 6: Startup batch runs and shutdown stops the loop
    #[tokio::test]
    async fn test_startup_batch_and_shutdown() {
        let runner = TestRunner::default();
        let calls = runner.calls();
        let (scheduler, shutdown_tx) = scheduler(config(), due_tasks(&[4]), runner);

        let handle = tokio::spawn(scheduler.run());
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(*calls.lock().unwrap(), vec![4]);

        shutdown_tx.send(()).unwrap();
        assert!(timeout(Duration::from_secs(2), handle).await.is_ok());
    }

    // Test 7: No startup batch when disabled
    #[tokio::test]
    async fn test_no_startup_batch() {
        let runner = TestRunner::default();
        let calls = runner.calls();
        let (scheduler, shutdown_tx) = scheduler(
            SchedulerConfig {
                run_on_startup: false,
                ..config()
            },
            due_tasks(&[4]),
            runner,
        );

        let handle = tokio::spawn(scheduler.run());
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(calls.lock().unwrap().is_empty());

        shutdown_tx.send(()).unwrap();
        let _ = handle.await;
    }

    // Test 8: Batches repeat on the interval
    #[tokio::test(start_paused = true)]
    async fn test_interval_batches() {
        let runner = TestRunner::default();
        let calls = runner.calls();
        let (scheduler, shutdown_tx) = scheduler(
            SchedulerConfig {
                interval_hours: 1,
                ..config()
            },
            due_tasks(&[1]),
            runner,
        );

        let handle = tokio::spawn(scheduler.run());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.lock().unwrap().len(), 1);

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(calls.lock().unwrap().len(), 2);

        shutdown_tx.send(()).unwrap();
        let _ = handle.await;
    }

    // Test 9: Manual trigger runs the task and returns its outcome
    #[tokio::test]
    async fn test_manual_trigger() {
        let runner = TestRunner {
            fail_on: Some(9),
            ..TestRunner::default()
        };
        let calls = runner.calls();
        let (scheduler, shutdown_tx) = scheduler(
            SchedulerConfig {
                run_on_startup: false,
                ..config()
            },
            MockTaskStore::new(),
            runner,
        );

        let manual = scheduler.manual_run_handle();
        let handle = tokio::spawn(scheduler.run());

        assert_eq!(
            manual.trigger(9).await,
            Ok(RunOutcome::Failed("boom".to_string()))
        );
        assert_eq!(*calls.lock().unwrap(), vec![9]);

        shutdown_tx.send(()).unwrap();
        let _ = handle.await;
    }

    // Test 10: Trigger fails once the scheduler is gone
    #[tokio::test]
    async fn test_manual_trigger_not_running() {
        let (scheduler, _tx) = scheduler(config(), MockTaskStore::new(), TestRunner::default());
        let manual = scheduler.manual_run_handle();
        drop(scheduler);

        assert_eq!(manual.trigger(1).await, Err(SchedulerError::NotRunning));
    }

    // Test 11: Manual runs and shutdown are served while a batch hangs
    #[tokio::test(start_paused = true)]
    async fn test_manual_trigger_and_shutdown_during_batch() {
        let runner = TestRunner {
            hang_on: Some(1),
            ..TestRunner::default()
        };
        let calls = runner.calls();
        let (scheduler, shutdown_tx) = scheduler(
            SchedulerConfig {
                run_timeout_secs: 7200,
                ..config()
            },
            due_tasks(&[1]),
            runner,
        );

        let manual = scheduler.manual_run_handle();
        let handle = tokio::spawn(scheduler.run());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(*calls.lock().unwrap(), vec![1]);

        let triggered = Instant::now();
        assert_eq!(
            manual.trigger(2).await,
            Ok(RunOutcome::Completed {
                albums: 1,
                tracks_added: 1,
            })
        );
        assert!(triggered.elapsed() < Duration::from_secs(60));
        assert_eq!(*calls.lock().unwrap(), vec![1, 2]);

        let stopping = Instant::now();
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
        assert!(stopping.elapsed() < Duration::from_secs(60));
    }

    // Test 12: Dropping an in-flight run aborts the spawned task
    #[tokio::test(start_paused = true)]
    async fn test_dropped_run_is_aborted() {
        let finished = Arc::new(Mutex::new(false));

        struct SlowRunner(Arc<Mutex<bool>>);

        #[async_trait]
        impl TaskRunner for SlowRunner {
            async fn run_task(&self, _task_id: i64) -> RunOutcome {
                tokio::time::sleep(Duration::from_secs(100)).await;
                *self.0.lock().unwrap() = true;
                RunOutcome::Failed("late".to_string())
            }
        }

        let runner: Arc<dyn TaskRunner> = Arc::new(SlowRunner(finished.clone()));
        let run = run_one(&runner, 1, Duration::from_secs(1000));
        assert!(timeout(Duration::from_secs(10), run).await.is_err());

        tokio::time::sleep(Duration::from_secs(200)).await;
        assert!(!*finished.lock().unwrap());
    }

    // Test 13: Summary tallies outcomes
    #[test]
    fn test_batch_summary_record() {
        let mut summary = BatchSummary::default();
        summary.record(&RunOutcome::Completed {
            albums: 0,
            tracks_added: 0,
        });
        summary.record(&RunOutcome::Failed("x".to_string()));
        summary.record(&RunOutcome::AlreadyRunning);

        assert_eq!(
            (summary.completed, summary.failed, summary.skipped),
            (1, 1, 1)
        );
    }
}
