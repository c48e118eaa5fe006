//! The scheduler dispatch loop.

use super::queue::TaskQueue;
use super::stats::SchedulerStats;
use super::task::{FailedTask, Task, TaskId};
use crate::config::SchedulerSettings;
use crate::error::ScrapeError;
use crate::marketplace::{MarketplaceRegistry, TaskKind};
use chrono::Utc;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Mutable scheduler state behind one lock.
struct SchedState {
    queue: TaskQueue,
    paused_until: Option<Instant>,
    consecutive_failures: u32,
    last_dequeue: Option<Instant>,
    failed: Vec<FailedTask>,
    scheduled: u64,
    completed: u64,
    failed_count: u64,
    abandoned: u64,
    retried: u64,
    pauses: u64,
    active_workers: usize,
}

struct Shared {
    settings: SchedulerSettings,
    registry: Arc<MarketplaceRegistry>,
    state: Mutex<SchedState>,
    shutdown: CancellationToken,
    started_at: Instant,
}

/// Priority scheduler with a bounded worker pool.
///
/// Workers dequeue strictly by priority (FIFO within a band) through a
/// pool-wide minimum inter-dequeue interval. Failure handling follows the
/// error taxonomy:
///
/// - outage-classified failures re-enqueue the task unchanged and pause
///   the whole pool until a cool-down deadline;
/// - ordinary network failures re-enqueue at decremented priority and feed
///   a consecutive-failure counter that escalates to the outage path at a
///   configured threshold;
/// - quota and lease failures re-enqueue at decremented priority without
///   feeding the counter;
/// - validation and application errors end the task and are recorded in
///   the failed-task ledger.
///
/// The pause is a gate checked between dequeues; in-flight attempts finish
/// normally.
#[derive(Clone)]
pub struct TaskScheduler {
    shared: Arc<Shared>,
}

enum Step {
    Run(Task),
    Idle,
}

impl TaskScheduler {
    /// Creates a scheduler over the given adapter registry.
    pub fn new(settings: SchedulerSettings, registry: Arc<MarketplaceRegistry>) -> Self {
        Self {
            shared: Arc::new(Shared {
                settings,
                registry,
                state: Mutex::new(SchedState {
                    queue: TaskQueue::new(),
                    paused_until: None,
                    consecutive_failures: 0,
                    last_dequeue: None,
                    failed: Vec::new(),
                    scheduled: 0,
                    completed: 0,
                    failed_count: 0,
                    abandoned: 0,
                    retried: 0,
                    pauses: 0,
                    active_workers: 0,
                }),
                shutdown: CancellationToken::new(),
                started_at: Instant::now(),
            }),
        }
    }

    /// Enqueues a new task and returns its id.
    pub fn schedule(
        &self,
        marketplace: impl Into<String>,
        kind: TaskKind,
        params: Value,
        priority: u8,
    ) -> TaskId {
        let task = Task::new(marketplace, kind, params, priority);
        let id = task.id;
        debug!(task = %id, marketplace = %task.marketplace, kind = %task.kind, priority, "Scheduled task");

        let mut state = self.shared.state.lock().unwrap();
        state.queue.push(task);
        state.scheduled += 1;
        id
    }

    /// Runs the worker pool until the queue drains, `max_runtime` elapses,
    /// or [`TaskScheduler::shutdown`] is called, then returns final
    /// statistics.
    pub async fn run(&self, max_runtime: Option<Duration>) -> SchedulerStats {
        let settings = &self.shared.settings;
        info!(
            concurrency = settings.concurrency,
            task_interval_ms = settings.task_interval.as_millis() as u64,
            "Task scheduler started"
        );

        let deadline = max_runtime.map(|limit| Instant::now() + limit);
        let mut workers = Vec::with_capacity(settings.concurrency);
        for worker_id in 0..settings.concurrency {
            let scheduler = self.clone();
            workers.push(tokio::spawn(async move {
                scheduler.worker_loop(worker_id).await;
            }));
        }

        loop {
            tokio::time::sleep(settings.idle_sleep).await;

            if self.shared.shutdown.is_cancelled() {
                break;
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    info!("Maximum runtime reached, stopping scheduler");
                    break;
                }
            }

            let state = self.shared.state.lock().unwrap();
            if state.queue.is_empty() && state.active_workers == 0 {
                break;
            }
        }

        self.shared.shutdown.cancel();
        for worker in workers {
            let _ = worker.await;
        }

        let stats = self.stats();
        info!(
            completed = stats.completed,
            failed = stats.failed,
            abandoned = stats.abandoned,
            retried = stats.retried,
            "Task scheduler stopped"
        );
        stats
    }

    /// Signals the pool to stop after in-flight tasks finish.
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
    }

    /// Current statistics snapshot.
    pub fn stats(&self) -> SchedulerStats {
        let state = self.shared.state.lock().unwrap();
        let now = Instant::now();
        let pause_remaining = state
            .paused_until
            .filter(|deadline| *deadline > now)
            .map(|deadline| (deadline - now).as_secs_f64());

        SchedulerStats {
            runtime_secs: self.shared.started_at.elapsed().as_secs_f64(),
            scheduled: state.scheduled,
            completed: state.completed,
            failed: state.failed_count,
            abandoned: state.abandoned,
            retried: state.retried,
            pauses: state.pauses,
            success_rate: SchedulerStats::compute_success_rate(
                state.completed,
                state.failed_count,
                state.abandoned,
            ),
            queue_depth: state.queue.len(),
            active_workers: state.active_workers,
            paused: pause_remaining.is_some(),
            pause_remaining_secs: pause_remaining,
            consecutive_failures: state.consecutive_failures,
        }
    }

    /// Terminal failure records accumulated so far.
    pub fn failed_tasks(&self) -> Vec<FailedTask> {
        self.shared.state.lock().unwrap().failed.clone()
    }

    async fn worker_loop(&self, worker_id: usize) {
        debug!(worker_id, "Worker started");
        loop {
            if self.shared.shutdown.is_cancelled() {
                break;
            }

            match self.next_step() {
                Step::Run(task) => {
                    let result = self.execute_task(&task).await;
                    self.finish(task, result);
                }
                Step::Idle => {
                    tokio::select! {
                        _ = self.shared.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.shared.settings.idle_sleep) => {}
                    }
                }
            }
        }
        debug!(worker_id, "Worker stopped");
    }

    /// Dequeues the next task if the pause gate and the pool-wide dequeue
    /// interval both allow it.
    fn next_step(&self) -> Step {
        let mut state = self.shared.state.lock().unwrap();
        let now = Instant::now();

        if let Some(deadline) = state.paused_until {
            if now < deadline {
                return Step::Idle;
            }
            state.paused_until = None;
            state.consecutive_failures = 0;
            info!("Outage pause elapsed, resuming dispatch");
        }

        if let Some(last) = state.last_dequeue {
            if now.duration_since(last) < self.shared.settings.task_interval {
                return Step::Idle;
            }
        }

        match state.queue.pop() {
            Some(task) => {
                state.last_dequeue = Some(now);
                state.active_workers += 1;
                Step::Run(task)
            }
            None => Step::Idle,
        }
    }

    async fn execute_task(&self, task: &Task) -> Result<Value, ScrapeError> {
        let adapter = self.shared.registry.get(&task.marketplace).ok_or_else(|| {
            ScrapeError::Application(format!(
                "no adapter registered for marketplace {}",
                task.marketplace
            ))
        })?;

        debug!(
            task = %task.id,
            marketplace = %task.marketplace,
            kind = %task.kind,
            retries = task.retries,
            "Executing task"
        );
        adapter.execute(task.kind, &task.params).await
    }

    /// Applies the failure policy for one finished attempt and releases the
    /// worker slot.
    fn finish(&self, task: Task, result: Result<Value, ScrapeError>) {
        let mut state = self.shared.state.lock().unwrap();
        match result {
            Ok(_) => {
                debug!(task = %task.id, "Task completed");
                state.completed += 1;
                state.consecutive_failures = 0;
            }
            Err(error @ ScrapeError::OutageDetected(_)) => {
                warn!(task = %task.id, error = %error, "Outage classified, pausing pool");
                self.pause_locked(&mut state);
                state.queue.push(task);
            }
            Err(error @ ScrapeError::Network(_)) => {
                state.consecutive_failures += 1;
                if state.consecutive_failures >= self.shared.settings.failure_threshold {
                    warn!(
                        task = %task.id,
                        consecutive = state.consecutive_failures,
                        "Consecutive failures reached threshold, pausing pool"
                    );
                    self.pause_locked(&mut state);
                    state.queue.push(task);
                } else {
                    self.requeue_or_abandon(&mut state, task, &error);
                }
            }
            Err(error) if error.is_retryable() => {
                // Quota and lease failures back off without feeding the
                // outage escalation counter.
                self.requeue_or_abandon(&mut state, task, &error);
            }
            Err(error) => {
                warn!(task = %task.id, condition = error.condition(), error = %error, "Task failed terminally");
                state.failed_count += 1;
                state.failed.push(FailedTask {
                    task,
                    condition: error.condition(),
                    error: error.to_string(),
                    failed_at: Utc::now(),
                });
            }
        }
        state.active_workers -= 1;
    }

    fn pause_locked(&self, state: &mut SchedState) {
        state.paused_until = Some(Instant::now() + self.shared.settings.outage_pause);
        state.pauses += 1;
        warn!(
            pause_secs = self.shared.settings.outage_pause.as_secs(),
            "Pool paused"
        );
    }

    fn requeue_or_abandon(&self, state: &mut SchedState, mut task: Task, error: &ScrapeError) {
        if task.retries >= self.shared.settings.max_task_retries {
            warn!(
                task = %task.id,
                retries = task.retries,
                condition = error.condition(),
                "Retry budget exhausted, abandoning task"
            );
            state.abandoned += 1;
            state.failed.push(FailedTask {
                condition: error.condition(),
                error: format!("abandoned after {} retries: {}", task.retries, error),
                failed_at: Utc::now(),
                task,
            });
            return;
        }

        task.retries += 1;
        task.priority = task.priority.saturating_sub(1);
        debug!(
            task = %task.id,
            retries = task.retries,
            priority = task.priority,
            condition = error.condition(),
            "Re-enqueued task"
        );
        state.retried += 1;
        state.queue.push(task);
    }
}

impl fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("settings", &self.shared.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marketplace::{Marketplace, MarketplaceFuture};
    use serde_json::json;

    /// Adapter scripted with a sequence of outcomes; records the label of
    /// every call it receives.
    struct ScriptedMarketplace {
        script: Mutex<Vec<Result<Value, ScrapeError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedMarketplace {
        fn new(script: Vec<Result<Value, ScrapeError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn always_ok() -> Arc<Self> {
            Self::new(vec![])
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Marketplace for ScriptedMarketplace {
        fn name(&self) -> &str {
            "mock"
        }

        fn execute(&self, _kind: TaskKind, params: &Value) -> MarketplaceFuture<'_> {
            let label = params
                .get("label")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            Box::pin(async move {
                self.calls.lock().unwrap().push(label);
                let mut script = self.script.lock().unwrap();
                if script.is_empty() {
                    Ok(json!({}))
                } else {
                    script.remove(0)
                }
            })
        }
    }

    fn registry_with(adapter: Arc<ScriptedMarketplace>) -> Arc<MarketplaceRegistry> {
        let mut registry = MarketplaceRegistry::new();
        registry.register(adapter);
        Arc::new(registry)
    }

    fn fast_settings(concurrency: usize) -> SchedulerSettings {
        SchedulerSettings {
            concurrency,
            task_interval: Duration::from_millis(10),
            failure_threshold: 10,
            outage_pause: Duration::from_millis(500),
            max_task_retries: 5,
            idle_sleep: Duration::from_millis(5),
        }
    }

    fn network_err() -> ScrapeError {
        ScrapeError::Network("connection reset".to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_ordering_with_single_worker() {
        let adapter = ScriptedMarketplace::always_ok();
        let scheduler = TaskScheduler::new(fast_settings(1), registry_with(Arc::clone(&adapter)));

        for priority in [1u8, 9, 5] {
            scheduler.schedule(
                "mock",
                TaskKind::Search,
                json!({"label": priority.to_string()}),
                priority,
            );
        }

        let stats = scheduler.run(None).await;
        assert_eq!(stats.completed, 3);
        assert_eq!(adapter.calls(), vec!["9", "5", "1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_failure_requeues_behind_lower_band() {
        // A fails once and drops from priority 5 to 4; B was already
        // waiting at 4, so B completes before A's retry.
        let adapter = ScriptedMarketplace::new(vec![Err(network_err())]);
        let scheduler = TaskScheduler::new(fast_settings(1), registry_with(Arc::clone(&adapter)));

        scheduler.schedule("mock", TaskKind::Search, json!({"label": "A"}), 5);
        scheduler.schedule("mock", TaskKind::Search, json!({"label": "B"}), 4);

        let stats = scheduler.run(None).await;
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.retried, 1);
        assert_eq!(adapter.calls(), vec!["A", "B", "A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_failure_is_terminal() {
        let adapter = ScriptedMarketplace::new(vec![Err(ScrapeError::Validation(
            "missing keyword".to_string(),
        ))]);
        let scheduler = TaskScheduler::new(fast_settings(1), registry_with(adapter));

        scheduler.schedule("mock", TaskKind::Search, json!({"label": "A"}), 5);
        let stats = scheduler.run(None).await;

        assert_eq!(stats.completed, 0);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.retried, 0);

        let failed = scheduler.failed_tasks();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].condition, "validation_error");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_marketplace_fails_terminally() {
        let scheduler = TaskScheduler::new(
            fast_settings(1),
            registry_with(ScriptedMarketplace::always_ok()),
        );

        scheduler.schedule("unregistered", TaskKind::Search, json!({}), 5);
        let stats = scheduler.run(None).await;

        assert_eq!(stats.failed, 1);
        assert_eq!(scheduler.failed_tasks()[0].condition, "application_error");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_abandons_task() {
        let adapter = ScriptedMarketplace::new(vec![Err(network_err()), Err(network_err())]);
        let mut settings = fast_settings(1);
        settings.max_task_retries = 1;
        let scheduler = TaskScheduler::new(settings, registry_with(Arc::clone(&adapter)));

        scheduler.schedule("mock", TaskKind::Search, json!({"label": "A"}), 5);
        let stats = scheduler.run(None).await;

        assert_eq!(stats.completed, 0);
        assert_eq!(stats.abandoned, 1);
        assert_eq!(stats.retried, 1);
        assert_eq!(adapter.calls().len(), 2);

        let failed = scheduler.failed_tasks();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].condition, "network_error");
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_failures_escalate_to_pause() {
        let adapter = ScriptedMarketplace::new(vec![Err(network_err()), Err(network_err())]);
        let mut settings = fast_settings(1);
        settings.failure_threshold = 2;
        let scheduler = TaskScheduler::new(settings, registry_with(Arc::clone(&adapter)));

        scheduler.schedule("mock", TaskKind::Search, json!({"label": "A"}), 5);
        let stats = scheduler.run(None).await;

        assert_eq!(stats.pauses, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_outage_error_pauses_pool_and_requeues_unchanged() {
        let adapter = ScriptedMarketplace::new(vec![Err(ScrapeError::OutageDetected(
            "rapid failures across targets".to_string(),
        ))]);
        let scheduler = TaskScheduler::new(fast_settings(1), registry_with(Arc::clone(&adapter)));

        scheduler.schedule("mock", TaskKind::Search, json!({"label": "A"}), 5);
        let stats = scheduler.run(None).await;

        assert_eq!(stats.pauses, 1);
        assert_eq!(stats.completed, 1);
        // Outage re-enqueue does not consume the retry budget.
        assert_eq!(stats.retried, 0);
        assert_eq!(adapter.calls(), vec!["A", "A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quota_failure_requeues_without_escalation() {
        let adapter = ScriptedMarketplace::new(vec![Err(ScrapeError::QuotaExceeded(
            "daily cap".to_string(),
        ))]);
        let mut settings = fast_settings(1);
        settings.failure_threshold = 1;
        let scheduler = TaskScheduler::new(settings, registry_with(Arc::clone(&adapter)));

        scheduler.schedule("mock", TaskKind::Search, json!({"label": "A"}), 5);
        let stats = scheduler.run(None).await;

        assert_eq!(stats.completed, 1);
        assert_eq!(stats.retried, 1);
        assert_eq!(stats.pauses, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_runtime_stops_idle_pool() {
        let scheduler = TaskScheduler::new(
            fast_settings(2),
            registry_with(ScriptedMarketplace::always_ok()),
        );

        // Paused pool with work queued: only the runtime limit can end the
        // run.
        scheduler.schedule("mock", TaskKind::Search, json!({}), 5);
        {
            let mut state = scheduler.shared.state.lock().unwrap();
            state.paused_until = Some(Instant::now() + Duration::from_secs(3600));
        }

        let stats = scheduler.run(Some(Duration::from_millis(200))).await;
        assert_eq!(stats.completed, 0);
        assert_eq!(stats.queue_depth, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_report_pause_deadline() {
        let scheduler = TaskScheduler::new(
            fast_settings(1),
            registry_with(ScriptedMarketplace::always_ok()),
        );
        {
            let mut state = scheduler.shared.state.lock().unwrap();
            state.paused_until = Some(Instant::now() + Duration::from_secs(60));
        }

        let stats = scheduler.stats();
        assert!(stats.paused);
        assert!(stats.pause_remaining_secs.unwrap() > 59.0);
    }
}
