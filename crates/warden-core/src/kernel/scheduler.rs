//! Scheduler - single-flight priority queue and its run loop.
//!
//! At most one task is Executing at a time: the run loop is the only consumer
//! and `current` is a single slot. The loop is spawned on demand by `submit`
//! and exits as soon as the queue drains, the scheduler is paused, or an
//! override holds the slot.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use agent_core::{History, Task, TaskId, TaskKind, TaskOrigin, TaskStatus};
use serde::Serialize;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use super::dispatcher::HandlerRegistry;
use crate::config::{HandlerConfig, SchedulerConfig};
use crate::error::TaskError;
use crate::handlers::TaskContext;
use crate::world::WorldSurface;

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub current: Option<Task>,
    pub queue_depth: usize,
    /// Queued ids in execution order.
    pub queued: Vec<TaskId>,
    pub paused: bool,
    pub recent_history: Vec<Task>,
}

/// Highest priority first, then submission order.
type QueueKey = (Reverse<i32>, TaskId);

struct Running {
    task: Task,
    token: CancellationToken,
    preempted_by: Option<String>,
}

struct State {
    queue: BTreeMap<QueueKey, Task>,
    current: Option<Running>,
    history: History<Task>,
    looping: bool,
    paused: bool,
    held: bool,
}

enum Outcome {
    Done(Result<serde_json::Value, TaskError>),
    Interrupted,
}

struct Inner {
    state: Mutex<State>,
    registry: HandlerRegistry,
    world: Arc<dyn WorldSurface>,
    settings: Arc<HandlerConfig>,
    config: SchedulerConfig,
    next_id: AtomicU64,
    idle: Notify,
    slot_freed: Notify,
    outcomes: mpsc::UnboundedSender<Task>,
}

/// Cloneable handle to the shared task queue.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Returns the scheduler and the stream of finished task records.
    pub fn new(
        config: SchedulerConfig,
        registry: HandlerRegistry,
        world: Arc<dyn WorldSurface>,
        settings: HandlerConfig,
    ) -> (Self, mpsc::UnboundedReceiver<Task>) {
        let (outcomes, rx) = mpsc::unbounded_channel();
        let inner = Inner {
            state: Mutex::new(State {
                queue: BTreeMap::new(),
                current: None,
                history: History::new(config.history_capacity),
                looping: false,
                paused: false,
                held: false,
            }),
            registry,
            world,
            settings: Arc::new(settings),
            config,
            next_id: AtomicU64::new(1),
            idle: Notify::new(),
            slot_freed: Notify::new(),
            outcomes,
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    /// Queue a task.
    ///
    /// A kind with no registered handler is recorded as Failed right away and
    /// still gets an id; only a full queue is an error.
    pub fn submit(
        &self,
        kind: TaskKind,
        params: serde_json::Value,
        priority: i32,
        origin: TaskOrigin,
    ) -> Result<TaskId, TaskError> {
        let mut state = self.inner.lock();

        if !self.inner.registry.contains(kind) {
            let id = self.inner.next_id();
            let mut task = Task::new(id, kind, params, priority, origin);
            let error = TaskError::UnknownTaskType(kind.to_string());
            if let Err(e) = task.fail(error.to_string()) {
                tracing::warn!(error = %e, "Failed to record dispatch failure");
            }
            tracing::warn!(task_id = %id, kind = %kind, "No handler registered, task failed");
            state.history.push(task.clone());
            self.inner.publish(task);
            return Ok(id);
        }

        if state.queue.len() >= self.inner.config.max_queue {
            tracing::warn!(kind = %kind, max_queue = self.inner.config.max_queue, "Task queue full");
            return Err(TaskError::QueueFull(state.queue.len()));
        }

        let id = self.inner.next_id();
        let task = Task::new(id, kind, params, priority, origin);
        state.queue.insert((Reverse(priority), id), task);
        tracing::info!(
            task_id = %id,
            kind = %kind,
            priority,
            origin = ?origin,
            queue_depth = state.queue.len(),
            "Task queued"
        );

        self.inner.ensure_running(&mut state);
        Ok(id)
    }

    /// Remove a still-queued task. Executing and unknown tasks return false.
    pub fn cancel(&self, id: TaskId) -> bool {
        let mut state = self.inner.lock();
        let Some(key) = state.queue.iter().find(|(_, t)| t.id == id).map(|(k, _)| *k) else {
            return false;
        };
        let Some(mut task) = state.queue.remove(&key) else {
            return false;
        };
        if let Err(e) = task.cancel(Some("cancelled before start".to_string())) {
            tracing::warn!(error = %e, "Failed to record cancellation");
        }
        tracing::info!(task_id = %id, kind = %task.kind, "Queued task cancelled");
        state.history.push(task.clone());
        self.inner.publish(task);
        true
    }

    /// Cancel every queued task; returns how many were removed.
    pub fn clear_queue(&self) -> usize {
        let mut state = self.inner.lock();
        let drained: Vec<Task> = std::mem::take(&mut state.queue).into_values().collect();
        let count = drained.len();
        for mut task in drained {
            if let Err(e) = task.cancel(Some("queue cleared".to_string())) {
                tracing::warn!(error = %e, "Failed to record cancellation");
            }
            state.history.push(task.clone());
            self.inner.publish(task);
        }
        drop(state);

        if count > 0 {
            tracing::info!(count, "Task queue cleared");
        }
        count
    }

    /// Trip the executing task's cancellation token.
    ///
    /// The task ends as Cancelled with a "preempted by <reason>" error once the
    /// run loop observes the token.
    pub fn preempt_current(&self, reason: impl Into<String>) -> Option<TaskId> {
        let mut state = self.inner.lock();
        let running = state.current.as_mut()?;
        let reason = reason.into();
        tracing::info!(task_id = %running.task.id, kind = %running.task.kind, reason = %reason, "Preempting task");
        running.preempted_by = Some(reason);
        running.token.cancel();
        Some(running.task.id)
    }

    /// Wait until nothing is executing. Returns false on timeout.
    pub async fn wait_slot_clear(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let freed = self.inner.slot_freed.notified();
            if self.inner.lock().current.is_none() {
                return true;
            }
            if tokio::time::timeout_at(deadline, freed).await.is_err() {
                return self.inner.lock().current.is_none();
            }
        }
    }

    /// Finish the current task but start no new one until `resume`.
    pub fn pause(&self) {
        let mut state = self.inner.lock();
        if !state.paused {
            state.paused = true;
            tracing::info!(queue_depth = state.queue.len(), "Scheduler paused");
        }
    }

    pub fn resume(&self) {
        let mut state = self.inner.lock();
        if state.paused {
            state.paused = false;
            tracing::info!(queue_depth = state.queue.len(), "Scheduler resumed");
        }
        self.inner.ensure_running(&mut state);
    }

    /// Keep queued tasks from starting while an override owns the agent.
    pub fn hold(&self) {
        self.inner.lock().held = true;
    }

    pub fn release(&self) {
        let mut state = self.inner.lock();
        state.held = false;
        self.inner.ensure_running(&mut state);
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    /// True when the run loop is not running.
    pub fn is_idle(&self) -> bool {
        !self.inner.lock().looping
    }

    /// Resolve once the run loop has stopped (queue drained, paused or held).
    pub async fn wait_idle(&self) {
        loop {
            let idle = self.inner.idle.notified();
            if !self.inner.lock().looping {
                return;
            }
            idle.await;
        }
    }

    /// An equivalent task is queued or executing.
    pub fn has_pending(&self, kind: TaskKind, origin: TaskOrigin) -> bool {
        let state = self.inner.lock();
        state
            .current
            .as_ref()
            .is_some_and(|r| r.task.kind == kind && r.task.origin == origin)
            || state
                .queue
                .values()
                .any(|t| t.kind == kind && t.origin == origin)
    }

    pub fn current(&self) -> Option<Task> {
        self.inner.lock().current.as_ref().map(|r| r.task.clone())
    }

    pub fn queue_depth(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = self.inner.lock();
        let recent = self.inner.config.recent_window;
        SchedulerStatus {
            current: state.current.as_ref().map(|r| r.task.clone()),
            queue_depth: state.queue.len(),
            queued: state.queue.values().map(|t| t.id).collect(),
            paused: state.paused,
            recent_history: state.history.recent(recent).cloned().collect(),
        }
    }

    /// Look a task up wherever it currently lives.
    pub fn task(&self, id: TaskId) -> Option<Task> {
        let state = self.inner.lock();
        if let Some(running) = state.current.as_ref().filter(|r| r.task.id == id) {
            return Some(running.task.clone());
        }
        state
            .queue
            .values()
            .find(|t| t.id == id)
            .or_else(|| state.history.find(|t| t.id == id))
            .cloned()
    }

    /// Finished tasks, oldest first.
    pub fn history(&self) -> Vec<Task> {
        self.inner.lock().history.to_vec()
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.inner.registry
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id(&self) -> TaskId {
        TaskId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Called with the state lock held, so history and the outcome channel
    /// never disagree about a finished task.
    fn publish(&self, task: Task) {
        // the controller may already be gone
        let _ = self.outcomes.send(task);
    }

    fn ensure_running(self: &Arc<Self>, state: &mut State) {
        if state.looping || state.paused || state.held || state.queue.is_empty() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                state.looping = true;
                handle.spawn(run_loop(Arc::clone(self)));
            }
            Err(e) => {
                tracing::error!(error = %e, "No runtime to start the task loop, tasks stay queued");
            }
        }
    }

    fn next_task(&self) -> Option<(Task, CancellationToken)> {
        let mut state = self.lock();
        let next = if state.paused || state.held {
            None
        } else {
            state.queue.pop_first().map(|(_, task)| task)
        };

        let Some(mut task) = next else {
            state.looping = false;
            drop(state);
            self.idle.notify_waiters();
            return None;
        };

        if let Err(e) = task.start() {
            tracing::warn!(error = %e, "Failed to start task");
        }
        let token = CancellationToken::new();
        state.current = Some(Running {
            task: task.clone(),
            token: token.clone(),
            preempted_by: None,
        });
        Some((task, token))
    }

    async fn execute(&self, task: &Task, token: &CancellationToken) -> Outcome {
        let Some(handler) = self.registry.get(task.kind) else {
            return Outcome::Done(Err(TaskError::UnknownTaskType(task.kind.to_string())));
        };
        let ctx = TaskContext {
            task_id: task.id,
            kind: task.kind,
            params: task.params.clone(),
            world: Arc::clone(&self.world),
            settings: Arc::clone(&self.settings),
            cancel: token.clone(),
        };

        let mut run = tokio::spawn(async move { handler.run(&ctx).await });
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                run.abort();
                // wait for the handler future to be dropped
                let _ = run.await;
                Outcome::Interrupted
            }
            joined = &mut run => match joined {
                Ok(result) => Outcome::Done(result),
                Err(e) => Outcome::Done(Err(TaskError::Failed(format!("handler aborted: {e}")))),
            },
        }
    }

    fn finish(&self, mut task: Task, outcome: Outcome) {
        let mut state = self.lock();
        let preempted_by = state.current.take().and_then(|r| r.preempted_by);

        let recorded = match outcome {
            Outcome::Done(Ok(value)) => task.complete(value),
            Outcome::Done(Err(e)) => task.fail(e.to_string()),
            Outcome::Interrupted => {
                let reason = preempted_by.unwrap_or_else(|| "cancellation".to_string());
                task.cancel(Some(TaskError::Preempted(reason).to_string()))
            }
        };
        if let Err(e) = recorded {
            tracing::warn!(error = %e, "Failed to record task outcome");
        }

        let duration_ms = match (task.started_at, task.completed_at) {
            (Some(start), Some(end)) => (end - start).num_milliseconds(),
            _ => 0,
        };
        match task.status {
            TaskStatus::Completed => {
                tracing::info!(task_id = %task.id, kind = %task.kind, duration_ms, "Task completed");
            }
            TaskStatus::Failed => {
                tracing::warn!(
                    task_id = %task.id,
                    kind = %task.kind,
                    duration_ms,
                    error = task.error.as_deref().unwrap_or(""),
                    "Task failed"
                );
            }
            _ => {
                tracing::info!(
                    task_id = %task.id,
                    kind = %task.kind,
                    duration_ms,
                    reason = task.error.as_deref().unwrap_or(""),
                    "Task cancelled"
                );
            }
        }

        state.history.push(task.clone());
        self.publish(task);
        drop(state);
        self.slot_freed.notify_waiters();
    }
}

async fn run_loop(inner: Arc<Inner>) {
    while let Some((task, token)) = inner.next_task() {
        let outcome = inner.execute(&task, &token).await;
        inner.finish(task, outcome);
    }
}
