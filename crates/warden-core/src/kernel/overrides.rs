//! Control bus and override controller.
//!
//! Every decision is tagged either Immediate (runs now against the world,
//! bypassing the queue) or Queued (becomes a task). Immediate actions own the
//! agent's body: the scheduler is held so no queued task starts meanwhile, and
//! with preemption enabled the executing task is cancelled first.

use std::sync::Arc;

use agent_core::{
    ActionId, AgentMode, AgentState, Decision, Position, TaskId, TaskKind, TaskOrigin,
};
use serde::Serialize;
use serde_json::json;

use super::scheduler::Scheduler;
use crate::config::{HandlerConfig, OverrideConfig};
use crate::error::{TaskError, WorldError};
use crate::handlers::{eat_carried, engage};
use crate::world::WorldSurface;

/// Default food sources for the find-food behavior.
const FOOD_SOURCES: &[&str] = &["melon", "sweet_berry_bush", "carrots", "potatoes"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRequest {
    pub kind: TaskKind,
    pub params: serde_json::Value,
    pub priority: i32,
    pub origin: TaskOrigin,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum Route {
    Immediate { action: ActionId },
    Queued(TaskRequest),
    Idle,
}

/// Maps decisions onto the immediate path or the task queue.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlBus;

impl ControlBus {
    pub fn route(&self, decision: &Decision, state: &AgentState) -> Route {
        let priority = decision.priority.unwrap_or(0);
        let queued = |kind, params| {
            Route::Queued(TaskRequest {
                kind,
                params,
                priority,
                origin: TaskOrigin::Decision,
            })
        };

        match decision.action {
            ActionId::Retreat | ActionId::Escape => Route::Immediate {
                action: decision.action,
            },
            ActionId::Defend if state.mode() == AgentMode::Advanced => Route::Immediate {
                action: ActionId::Defend,
            },
            ActionId::Defend => queued(
                TaskKind::Defend,
                json!({ "entity": decision.focus.as_ref().map(|t| t.entity_id.0) }),
            ),
            ActionId::FindFood => queued(
                TaskKind::Gather,
                json!({ "kinds": FOOD_SOURCES, "count": 1, "consume": true }),
            ),
            ActionId::DepositItems => queued(TaskKind::Deposit, json!({})),
            ActionId::CraftTools => match state.goal().and_then(|g| g.required_tool) {
                Some(tool) => queued(TaskKind::Craft, json!({ "item": tool.starter_item(), "count": 1 })),
                None => Route::Idle,
            },
            ActionId::ExecuteGoal => match state.goal() {
                Some(goal) => Route::Queued(TaskRequest {
                    kind: goal.kind,
                    params: goal.params.clone(),
                    priority: goal.priority,
                    origin: TaskOrigin::Goal,
                }),
                None => Route::Idle,
            },
            ActionId::Wander => match decision.target {
                Some(target) => queued(TaskKind::Explore, json!({ "target": target })),
                None => Route::Idle,
            },
            ActionId::AntiIdle => match decision.target {
                Some(target) => queued(
                    TaskKind::Patrol,
                    json!({ "points": [target, decision.snapshot.position], "loops": 1 }),
                ),
                None => Route::Idle,
            },
            ActionId::Idle => Route::Idle,
        }
    }
}

/// What happened to one decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OverrideOutcome {
    Executed {
        action: ActionId,
        preempted: Option<TaskId>,
    },
    Failed {
        action: ActionId,
        error: String,
    },
    Submitted {
        task_id: TaskId,
        kind: TaskKind,
    },
    /// An equivalent task is already queued or executing.
    AlreadyPending {
        kind: TaskKind,
    },
    Rejected {
        kind: TaskKind,
        error: String,
    },
    Idle,
}

pub struct OverrideController {
    bus: ControlBus,
    world: Arc<dyn WorldSurface>,
    scheduler: Scheduler,
    config: OverrideConfig,
    settings: HandlerConfig,
}

impl OverrideController {
    pub fn new(
        world: Arc<dyn WorldSurface>,
        scheduler: Scheduler,
        config: OverrideConfig,
        settings: HandlerConfig,
    ) -> Self {
        Self {
            bus: ControlBus,
            world,
            scheduler,
            config,
            settings,
        }
    }

    pub fn bus(&self) -> &ControlBus {
        &self.bus
    }

    /// Route and apply one decision. Never fails: errors come back as outcomes.
    pub async fn apply(&self, decision: &Decision, state: &AgentState) -> OverrideOutcome {
        match self.bus.route(decision, state) {
            Route::Immediate { action } => self.run_immediate(action, decision).await,
            Route::Queued(request) => self.submit(request),
            Route::Idle => OverrideOutcome::Idle,
        }
    }

    fn submit(&self, request: TaskRequest) -> OverrideOutcome {
        if self.scheduler.has_pending(request.kind, request.origin) {
            tracing::debug!(kind = %request.kind, origin = ?request.origin, "Equivalent task pending, not resubmitting");
            return OverrideOutcome::AlreadyPending { kind: request.kind };
        }
        match self
            .scheduler
            .submit(request.kind, request.params, request.priority, request.origin)
        {
            Ok(task_id) => OverrideOutcome::Submitted {
                task_id,
                kind: request.kind,
            },
            Err(e) => {
                tracing::warn!(kind = %request.kind, error = %e, "Task submission rejected");
                OverrideOutcome::Rejected {
                    kind: request.kind,
                    error: e.to_string(),
                }
            }
        }
    }

    async fn run_immediate(&self, action: ActionId, decision: &Decision) -> OverrideOutcome {
        self.scheduler.hold();

        let mut preempted = None;
        if self.config.preempt_running_task {
            preempted = self.scheduler.preempt_current(action.name());
            if preempted.is_some()
                && !self.scheduler.wait_slot_clear(self.config.preempt_grace()).await
            {
                tracing::warn!(
                    action = %action,
                    grace_ms = self.config.preempt_grace_ms,
                    "Preempted task still running after grace period"
                );
            }
        }

        let timeout = self.config.override_timeout();
        let result = match tokio::time::timeout(timeout, self.execute(action, decision)).await {
            Ok(result) => result,
            Err(_) => Err(TaskError::World(WorldError::Timeout(timeout))),
        };

        self.scheduler.release();

        match result {
            Ok(()) => {
                tracing::info!(action = %action, tick = decision.tick, preempted = ?preempted, "Override executed");
                OverrideOutcome::Executed { action, preempted }
            }
            Err(e) => {
                tracing::warn!(action = %action, tick = decision.tick, error = %e, "Override failed");
                OverrideOutcome::Failed {
                    action,
                    error: e.to_string(),
                }
            }
        }
    }

    async fn execute(&self, action: ActionId, decision: &Decision) -> Result<(), TaskError> {
        let world = self.world.as_ref();
        match action {
            ActionId::Retreat => {
                let target = require_target(action, decision.target)?;
                world.move_to(target).await?;
                if self.config.eat_after_retreat {
                    if let Some(food) = eat_carried(world).await? {
                        tracing::debug!(food = %food, "Ate after retreat");
                    }
                }
                Ok(())
            }
            ActionId::Escape => {
                let target = require_target(action, decision.target)?;
                world.move_to(target).await?;
                Ok(())
            }
            ActionId::Defend => {
                let focus = decision
                    .focus
                    .as_ref()
                    .ok_or_else(|| TaskError::Failed("defend without a focus threat".into()))?;
                let engagement = engage(world, focus.entity_id, &self.settings).await?;
                tracing::debug!(
                    target = %engagement.target,
                    strikes = engagement.strikes,
                    defeated = engagement.defeated,
                    "Engagement finished"
                );
                Ok(())
            }
            other => Err(TaskError::Failed(format!("{other} is not an immediate action"))),
        }
    }
}

fn require_target(action: ActionId, target: Option<Position>) -> Result<Position, TaskError> {
    target.ok_or_else(|| TaskError::Failed(format!("{action} without a target position")))
}

#[cfg(test)]
mod tests {
    use agent_core::{
        DecisionConfig, DecisionEngine, EntityId, Goal, Position, ThreatEntry, ToolClass,
        WorldSnapshot,
    };

    use super::*;

    fn decide(engine: &mut DecisionEngine, edit: impl FnOnce(&mut WorldSnapshot)) -> Decision {
        let mut snapshot = WorldSnapshot::empty(1);
        snapshot.stale = false;
        snapshot.position = Position::new(0.0, 64.0, 0.0);
        edit(&mut snapshot);
        engine.decide(Arc::new(snapshot))
    }

    fn zombie() -> ThreatEntry {
        ThreatEntry {
            entity_id: EntityId(9),
            kind: "zombie".into(),
            position: Position::new(3.0, 64.0, 0.0),
            distance: 3.0,
            danger_score: 8.5,
        }
    }

    #[test]
    fn survival_actions_are_immediate() {
        let mut engine = DecisionEngine::new(DecisionConfig {
            initial_mode: AgentMode::Advanced,
            ..DecisionConfig::default()
        });
        let bus = ControlBus;

        let d = decide(&mut engine, |s| s.health = 2.0);
        assert_eq!(
            bus.route(&d, engine.state()),
            Route::Immediate {
                action: ActionId::Retreat
            }
        );

        let d = decide(&mut engine, |s| s.threats = vec![zombie()]);
        assert_eq!(
            bus.route(&d, engine.state()),
            Route::Immediate {
                action: ActionId::Defend
            }
        );
    }

    #[test]
    fn defend_outside_advanced_is_queued() {
        let mut engine = DecisionEngine::new(DecisionConfig::default());
        let mut d = decide(&mut engine, |_| {});
        d.action = ActionId::Defend;
        d.focus = Some(zombie());

        match ControlBus.route(&d, engine.state()) {
            Route::Queued(request) => {
                assert_eq!(request.kind, TaskKind::Defend);
                assert_eq!(request.params["entity"], 9);
            }
            other => panic!("expected queued defend, got {other:?}"),
        }
    }

    #[test]
    fn goal_routes_with_goal_priority_and_origin() {
        let mut engine = DecisionEngine::new(DecisionConfig::default());
        engine.set_goal(
            Goal::new("logs", TaskKind::Gather, json!({"kinds": ["oak_log"], "count": 8}))
                .with_priority(4),
        );
        let d = decide(&mut engine, |_| {});
        assert_eq!(d.action, ActionId::ExecuteGoal);

        let Route::Queued(request) = ControlBus.route(&d, engine.state()) else {
            panic!("goal should queue");
        };
        assert_eq!(request.kind, TaskKind::Gather);
        assert_eq!(request.priority, 4);
        assert_eq!(request.origin, TaskOrigin::Goal);
    }

    #[test]
    fn missing_tool_crafts_starter_item() {
        let mut engine = DecisionEngine::new(DecisionConfig::default());
        engine.set_goal(Goal::new("iron", TaskKind::Mine, json!({})).requiring(ToolClass::Pickaxe));
        let d = decide(&mut engine, |_| {});

        let Route::Queued(request) = ControlBus.route(&d, engine.state()) else {
            panic!("craft should queue");
        };
        assert_eq!(request.kind, TaskKind::Craft);
        assert_eq!(request.params["item"], "wooden_pickaxe");
    }

    #[test]
    fn wander_and_anti_idle_become_movement_tasks() {
        let mut engine = DecisionEngine::new(DecisionConfig::default());
        let d = decide(&mut engine, |_| {});
        let Route::Queued(request) = ControlBus.route(&d, engine.state()) else {
            panic!("wander should queue");
        };
        assert_eq!(request.kind, TaskKind::Explore);
        assert_eq!(request.priority, 0);

        engine.set_mode(AgentMode::Afk);
        let d = decide(&mut engine, |_| {});
        let Route::Queued(request) = ControlBus.route(&d, engine.state()) else {
            panic!("anti-idle should queue");
        };
        assert_eq!(request.kind, TaskKind::Patrol);
        assert_eq!(request.params["points"].as_array().map(Vec::len), Some(2));
    }
}
