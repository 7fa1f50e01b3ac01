use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_core::{TaskId, TaskKind, TaskOrigin, TaskStatus};
use async_trait::async_trait;
use serde_json::json;
use warden_core::config::{HandlerConfig, SchedulerConfig};
use warden_core::handlers::{TaskContext, TaskHandler};
use warden_core::{HandlerRegistry, Scheduler, ScriptedWorld, TaskError};

/// Records labels in execution order; `hang` blocks until preempted.
struct Probe {
    kind: TaskKind,
    log: Arc<Mutex<Vec<String>>>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl TaskHandler for Probe {
    fn kind(&self) -> TaskKind {
        self.kind
    }

    async fn run(&self, ctx: &TaskContext) -> Result<serde_json::Value, TaskError> {
        let label = ctx.params["label"].as_str().unwrap_or("").to_string();
        self.log.lock().unwrap().push(label.clone());

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if ctx.params["hang"] == true {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        if ctx.params["fail"] == true {
            return Err(TaskError::Failed(format!("{label} failed")));
        }
        Ok(json!({ "label": label }))
    }
}

struct Rig {
    scheduler: Scheduler,
    outcomes: tokio::sync::mpsc::UnboundedReceiver<agent_core::Task>,
    log: Arc<Mutex<Vec<String>>>,
    peak: Arc<AtomicUsize>,
}

fn rig(config: SchedulerConfig) -> Rig {
    let log = Arc::new(Mutex::new(Vec::new()));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(Probe {
        kind: TaskKind::Goto,
        log: Arc::clone(&log),
        active: Arc::new(AtomicUsize::new(0)),
        peak: Arc::clone(&peak),
    }));
    let (scheduler, outcomes) = Scheduler::new(
        config,
        registry,
        Arc::new(ScriptedWorld::new()),
        HandlerConfig::default(),
    );
    Rig {
        scheduler,
        outcomes,
        log,
        peak,
    }
}

fn submit(scheduler: &Scheduler, label: &str, priority: i32) -> TaskId {
    scheduler
        .submit(TaskKind::Goto, json!({ "label": label }), priority, TaskOrigin::External)
        .unwrap()
}

async fn until_executing(scheduler: &Scheduler) {
    while scheduler.current().is_none() {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn higher_priority_first_then_submission_order() {
    let rig = rig(SchedulerConfig::default());
    submit(&rig.scheduler, "A", 1);
    submit(&rig.scheduler, "B", 5);
    submit(&rig.scheduler, "C", 1);

    rig.scheduler.wait_idle().await;

    assert_eq!(*rig.log.lock().unwrap(), vec!["B", "A", "C"]);
    let history = rig.scheduler.history();
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|t| t.status == TaskStatus::Completed));
}

#[tokio::test(start_paused = true)]
async fn cancel_only_touches_queued_tasks() {
    let rig = rig(SchedulerConfig::default());
    let running = rig
        .scheduler
        .submit(TaskKind::Goto, json!({ "label": "X", "hang": true }), 0, TaskOrigin::External)
        .unwrap();
    let queued = submit(&rig.scheduler, "Y", 0);
    until_executing(&rig.scheduler).await;

    assert!(rig.scheduler.cancel(queued));
    assert!(!rig.scheduler.cancel(queued));
    assert!(!rig.scheduler.cancel(running));
    assert!(!rig.scheduler.cancel(TaskId(999)));
    assert_eq!(rig.scheduler.task(queued).unwrap().status, TaskStatus::Cancelled);
    assert_eq!(rig.scheduler.task(running).unwrap().status, TaskStatus::Executing);

    assert_eq!(rig.scheduler.preempt_current("test"), Some(running));
    assert!(rig.scheduler.wait_slot_clear(Duration::from_secs(1)).await);
    let preempted = rig.scheduler.task(running).unwrap();
    assert_eq!(preempted.status, TaskStatus::Cancelled);
    assert_eq!(preempted.error.as_deref(), Some("preempted by test"));
    assert_eq!(*rig.log.lock().unwrap(), vec!["X"]);
}

#[tokio::test(start_paused = true)]
async fn unknown_kind_fails_without_blocking_the_queue() {
    let mut rig = rig(SchedulerConfig::default());
    let unknown = rig
        .scheduler
        .submit(TaskKind::Build, json!({}), 9, TaskOrigin::External)
        .unwrap();
    let known = submit(&rig.scheduler, "after", 0);

    let failed = rig.scheduler.task(unknown).unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("unknown task type: build"));

    rig.scheduler.wait_idle().await;
    assert_eq!(rig.scheduler.task(known).unwrap().status, TaskStatus::Completed);

    let first = rig.outcomes.recv().await.unwrap();
    assert_eq!(first.id, unknown);
    let second = rig.outcomes.recv().await.unwrap();
    assert_eq!(second.id, known);
}

#[tokio::test(start_paused = true)]
async fn wait_idle_tracks_the_run_loop() {
    let rig = rig(SchedulerConfig::default());
    let mut idle = tokio_test::task::spawn(rig.scheduler.wait_idle());
    tokio_test::assert_ready!(idle.poll());
    drop(idle);

    rig.scheduler
        .submit(TaskKind::Goto, json!({ "label": "H", "hang": true }), 0, TaskOrigin::External)
        .unwrap();
    let mut idle = tokio_test::task::spawn(rig.scheduler.wait_idle());
    tokio_test::assert_pending!(idle.poll());

    until_executing(&rig.scheduler).await;
    rig.scheduler.preempt_current("test");
    assert!(rig.scheduler.wait_slot_clear(Duration::from_secs(1)).await);
    assert!(idle.is_woken());
    tokio_test::assert_ready!(idle.poll());
}

#[tokio::test(start_paused = true)]
async fn handler_errors_are_recorded_as_failed() {
    let rig = rig(SchedulerConfig::default());
    let id = rig
        .scheduler
        .submit(TaskKind::Goto, json!({ "label": "F", "fail": true }), 0, TaskOrigin::External)
        .unwrap();
    rig.scheduler.wait_idle().await;

    let task = rig.scheduler.task(id).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.as_deref(), Some("F failed"));
}

#[tokio::test(start_paused = true)]
async fn paused_scheduler_keeps_tasks_queued() {
    let rig = rig(SchedulerConfig::default());
    rig.scheduler.pause();
    let id = submit(&rig.scheduler, "later", 0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rig.scheduler.is_paused());
    assert!(rig.scheduler.is_idle());
    assert_eq!(rig.scheduler.queue_depth(), 1);
    assert_eq!(rig.scheduler.task(id).unwrap().status, TaskStatus::Queued);

    rig.scheduler.resume();
    rig.scheduler.wait_idle().await;
    assert_eq!(rig.scheduler.task(id).unwrap().status, TaskStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn full_queue_rejects_submissions() {
    let rig = rig(SchedulerConfig {
        max_queue: 2,
        ..SchedulerConfig::default()
    });
    rig.scheduler.pause();
    submit(&rig.scheduler, "a", 0);
    submit(&rig.scheduler, "b", 0);

    let err = rig
        .scheduler
        .submit(TaskKind::Goto, json!({}), 0, TaskOrigin::External)
        .unwrap_err();
    assert!(matches!(err, TaskError::QueueFull(2)));
    assert_eq!(rig.scheduler.queue_depth(), 2);
}

#[tokio::test(start_paused = true)]
async fn clear_queue_cancels_everything_waiting() {
    let mut rig = rig(SchedulerConfig::default());
    rig.scheduler.pause();
    for label in ["a", "b", "c"] {
        submit(&rig.scheduler, label, 0);
    }

    assert_eq!(rig.scheduler.clear_queue(), 3);
    assert_eq!(rig.scheduler.queue_depth(), 0);
    for _ in 0..3 {
        let task = rig.outcomes.recv().await.unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
    }
    assert!(rig.log.lock().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn at_most_one_task_executes() {
    let rig = rig(SchedulerConfig::default());
    let submitters: Vec<_> = (0..8)
        .map(|i| {
            let scheduler = rig.scheduler.clone();
            tokio::spawn(async move {
                for j in 0..4 {
                    submit(&scheduler, &format!("{i}-{j}"), j);
                }
            })
        })
        .collect();
    for joined in futures::future::join_all(submitters).await {
        joined.unwrap();
    }

    while rig.scheduler.history().len() < 32 {
        rig.scheduler.wait_idle().await;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(rig.peak.load(Ordering::SeqCst), 1);
    assert_eq!(rig.log.lock().unwrap().len(), 32);
}

#[tokio::test(start_paused = true)]
async fn history_keeps_the_newest_records() {
    let rig = rig(SchedulerConfig {
        max_queue: 200,
        history_capacity: 100,
        recent_window: 10,
    });
    for i in 0..105 {
        submit(&rig.scheduler, &i.to_string(), 0);
    }
    rig.scheduler.wait_idle().await;

    let history = rig.scheduler.history();
    assert_eq!(history.len(), 100);
    assert_eq!(history.first().map(|t| t.id), Some(TaskId(6)));
    assert_eq!(history.last().map(|t| t.id), Some(TaskId(105)));

    let status = rig.scheduler.status();
    assert_eq!(status.recent_history.len(), 10);
    assert!(status.current.is_none());
}
