use std::sync::Arc;
use std::time::Duration;

use agent_core::{ActionId, AgentMode, Position, TaskKind, TaskOrigin, TaskStatus};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use warden_core::sim::{FailureKind, Scenario};
use warden_core::{Controller, OverrideOutcome, ScriptedWorld, TaskError, WardenConfig};

const MINING_SCENARIO: &str = r#"
name: iron
agent:
  position: {x: 0.5, y: 64.0, z: 0.5}
blocks:
  - position: {x: 3, y: 64, z: 3}
    material: iron_ore
  - position: {x: 4, y: 64, z: 4}
    material: iron_ore
goal:
  description: collect iron
  kind: mine
  params: {block: iron_ore, count: 2}
"#;

fn controller(world: &Arc<ScriptedWorld>) -> Controller {
    Controller::new(WardenConfig::default(), world.clone())
}

#[tokio::test(start_paused = true)]
async fn goal_task_completes_and_clears_goal() {
    let scenario = Scenario::from_yaml(MINING_SCENARIO).unwrap();
    let world = Arc::new(ScriptedWorld::from_scenario(&scenario));
    let mut controller = controller(&world);
    let handle = controller.handle();
    handle.set_goal(scenario.goal.clone().unwrap());

    let first = controller.tick().await;
    assert_eq!(first.decision.action, ActionId::ExecuteGoal);
    assert!(matches!(
        first.outcome,
        OverrideOutcome::Submitted {
            kind: TaskKind::Mine,
            ..
        }
    ));

    controller.scheduler().wait_idle().await;
    let second = controller.tick().await;
    assert_eq!(second.outcomes_recorded, 1);
    assert_ne!(second.decision.action, ActionId::ExecuteGoal);

    let status = handle.status();
    assert!(status.goal.is_none());
    assert_eq!(status.stats.completed, 1);
    assert_eq!(world.item_count("raw_iron"), 2);
    assert_eq!(handle.decision_history().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn goal_finishing_during_perception_is_not_rerun() {
    let scenario = Scenario::from_yaml(MINING_SCENARIO).unwrap();
    let world = Arc::new(ScriptedWorld::from_scenario(&scenario));
    world.set_latency(Duration::from_millis(10));
    let mut controller = controller(&world);
    let handle = controller.handle();
    handle.set_goal(scenario.goal.clone().unwrap());

    for _ in 0..6 {
        controller.tick().await;
    }
    controller.scheduler().wait_idle().await;
    controller.tick().await;

    let goal_tasks: Vec<_> = handle
        .task_history()
        .into_iter()
        .filter(|t| t.origin == TaskOrigin::Goal)
        .collect();
    assert_eq!(goal_tasks.len(), 1);
    assert_eq!(goal_tasks[0].status, TaskStatus::Completed);
    assert!(handle.status().goal.is_none());
    assert_eq!(world.item_count("raw_iron"), 2);
}

#[tokio::test(start_paused = true)]
async fn low_health_retreats_immediately() {
    let world = Arc::new(ScriptedWorld::new());
    world.set_health(3.0);
    let mut controller = controller(&world);

    let report = controller.tick().await;

    assert_eq!(report.decision.action, ActionId::Retreat);
    assert!(matches!(
        report.outcome,
        OverrideOutcome::Executed {
            action: ActionId::Retreat,
            preempted: None,
        }
    ));
    assert_eq!(Some(world.position()), report.decision.target);
}

#[tokio::test(start_paused = true)]
async fn nearby_threat_switches_to_alert_period() {
    let world = Arc::new(ScriptedWorld::new());
    let mut controller = controller(&world);
    assert_eq!(controller.period(), Duration::from_millis(4_000));

    world.spawn(7, "zombie", Position::new(3.5, 64.0, 0.5));
    let report = controller.tick().await;
    assert!(report.in_combat);
    assert_eq!(report.threats, 1);
    assert_eq!(controller.period(), Duration::from_millis(2_000));

    world.despawn(7);
    let report = controller.tick().await;
    assert!(!report.in_combat);
    assert_eq!(controller.period(), Duration::from_millis(4_000));

    controller.handle().set_mode(AgentMode::Advanced);
    assert_eq!(controller.period(), Duration::from_millis(2_000));
}

#[tokio::test(start_paused = true)]
async fn stale_tick_still_decides() {
    let world = Arc::new(ScriptedWorld::new());
    world.fail("status", FailureKind::Hang, Some(1));
    let mut controller = controller(&world);

    let report = controller.tick().await;
    assert!(report.decision.stale);
    assert_eq!(report.decision.tick, 1);
}

#[tokio::test(start_paused = true)]
async fn named_submission_rejects_unknown_types() {
    let world = Arc::new(ScriptedWorld::new());
    let controller = controller(&world);
    let handle = controller.handle();

    let err = handle.submit_named("dance", json!({}), 0).unwrap_err();
    assert_eq!(err, TaskError::UnknownTaskType("dance".into()));

    let id = handle
        .submit_named("goto", json!({ "x": 2.0, "y": 64.0, "z": 2.0 }), 0)
        .unwrap();
    controller.scheduler().wait_idle().await;
    assert_eq!(handle.task(id).unwrap().status, TaskStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_executing_task() {
    let world = Arc::new(ScriptedWorld::new());
    world.fail("move_near", FailureKind::Hang, None);
    let mut controller = controller(&world);
    let handle = controller.handle();

    let stuck = handle
        .submit(TaskKind::Goto, json!({ "x": 9.0, "y": 64.0, "z": 9.0 }), 5)
        .unwrap();

    let shutdown = CancellationToken::new();
    let running = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            controller.run(shutdown).await;
            controller
        }
    });

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(handle.task(stuck).unwrap().status, TaskStatus::Executing);
    shutdown.cancel();
    let controller = running.await.unwrap();

    let task = handle.task(stuck).unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert_eq!(task.error.as_deref(), Some("preempted by shutdown"));
    assert_eq!(controller.scheduler().queue_depth(), 0);
    assert!(controller.scheduler().wait_slot_clear(Duration::from_secs(1)).await);
}

#[tokio::test(start_paused = true)]
async fn bundled_scenario_runs() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../scenarios/iron-run.yaml");
    let scenario = Scenario::load(&path).unwrap();
    assert_eq!(scenario.failures["find_entities"].times, Some(1));

    let world = Arc::new(ScriptedWorld::from_scenario(&scenario));
    let mut controller = controller(&world);
    let handle = controller.handle();
    handle.set_goal(scenario.goal.clone().unwrap());

    for _ in 0..5 {
        controller.tick().await;
        tokio::time::sleep(controller.period()).await;
    }
    controller.shutdown().await;

    let history = handle.decision_history();
    assert_eq!(history.len(), 5);
    assert!(history[0].stale);
    assert!(world.count_calls("status") >= 5);
}
