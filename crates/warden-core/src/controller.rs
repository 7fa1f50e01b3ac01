//! Tick loop: perception -> decision -> override/submit.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use agent_core::threat::threats_within;
use agent_core::{
    AgentMode, AgentState, DecisionEngine, DecisionSummary, Goal, OutcomeStats, Task, TaskId,
    TaskKind, TaskOrigin,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::WardenConfig;
use crate::error::TaskError;
use crate::kernel::{HandlerRegistry, OverrideController, OverrideOutcome, Scheduler, SchedulerStatus};
use crate::perception::PerceptionBuilder;
use crate::world::WorldSurface;

type SharedEngine = Arc<Mutex<DecisionEngine>>;

fn lock_engine(engine: &SharedEngine) -> MutexGuard<'_, DecisionEngine> {
    engine.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Result of one tick.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub decision: DecisionSummary,
    pub outcome: OverrideOutcome,
    pub threats: usize,
    pub hazards: usize,
    pub in_combat: bool,
    /// Finished tasks folded into the agent state this tick.
    pub outcomes_recorded: usize,
}

/// Combined status for the command surface.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub mode: AgentMode,
    pub goal: Option<Goal>,
    pub in_combat: bool,
    pub stats: OutcomeStats,
    pub last_decision: Option<DecisionSummary>,
    pub scheduler: SchedulerStatus,
}

pub struct Controller {
    world: Arc<dyn WorldSurface>,
    perception: PerceptionBuilder,
    engine: SharedEngine,
    scheduler: Scheduler,
    overrides: OverrideController,
    outcomes: mpsc::UnboundedReceiver<Task>,
    config: WardenConfig,
}

impl Controller {
    pub fn new(config: WardenConfig, world: Arc<dyn WorldSurface>) -> Self {
        Self::with_registry(config, world, HandlerRegistry::with_defaults())
    }

    pub fn with_registry(
        config: WardenConfig,
        world: Arc<dyn WorldSurface>,
        registry: HandlerRegistry,
    ) -> Self {
        let settings = config.handler_settings();
        let (scheduler, outcomes) = Scheduler::new(
            config.scheduler.clone(),
            registry,
            Arc::clone(&world),
            settings.clone(),
        );
        let overrides = OverrideController::new(
            Arc::clone(&world),
            scheduler.clone(),
            config.overrides.clone(),
            settings,
        );

        Self {
            perception: PerceptionBuilder::new(config.perception.clone()),
            engine: Arc::new(Mutex::new(DecisionEngine::new(config.decision.clone()))),
            world,
            scheduler,
            overrides,
            outcomes,
            config,
        }
    }

    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle {
            engine: Arc::clone(&self.engine),
            scheduler: self.scheduler.clone(),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub async fn tick(&mut self) -> TickReport {
        let snapshot = self.perception.build(self.world.as_ref()).await;

        // Tasks can finish while perception is awaiting. Fold them in before
        // deciding so a finished goal task is not routed again.
        let outcomes_recorded = self.drain_outcomes();
        let (decision, state) = {
            let mut engine = lock_engine(&self.engine);
            let decision = engine.decide(Arc::clone(&snapshot));
            (decision, engine.state().clone())
        };

        let outcome = self.overrides.apply(&decision, &state).await;

        let defend_radius = self.config.decision.thresholds.defend_radius;
        let in_combat = threats_within(&snapshot, defend_radius).next().is_some();
        {
            let mut engine = lock_engine(&self.engine);
            if engine.state().in_combat() != in_combat {
                tracing::info!(in_combat, tick = decision.tick, "Combat state changed");
            }
            engine.set_combat(in_combat);
        }

        TickReport {
            decision: decision.summary(),
            outcome,
            threats: snapshot.threats.len(),
            hazards: snapshot.hazards.len(),
            in_combat,
            outcomes_recorded,
        }
    }

    /// Alert period in advanced mode or while in combat.
    pub fn period(&self) -> Duration {
        let engine = lock_engine(&self.engine);
        let state = engine.state();
        if state.mode() == AgentMode::Advanced || state.in_combat() {
            self.config.ticks.alert_period()
        } else {
            self.config.ticks.normal_period()
        }
    }

    /// Tick until `shutdown` fires, then shut down.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        tracing::info!(
            normal_ms = self.config.ticks.normal_period_ms,
            alert_ms = self.config.ticks.alert_period_ms,
            "Controller started"
        );
        loop {
            let report = tokio::select! {
                _ = shutdown.cancelled() => break,
                report = self.tick() => report,
            };
            tracing::debug!(tick = report.decision.tick, action = %report.decision.action, "Tick finished");

            let period = self.period();
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(period) => {}
            }
        }

        self.shutdown().await;
    }

    /// Drop queued work, stop the executing task and fold the last outcomes
    /// into the agent state.
    pub async fn shutdown(&mut self) {
        let dropped = self.scheduler.clear_queue();
        if self.scheduler.preempt_current("shutdown").is_some()
            && !self
                .scheduler
                .wait_slot_clear(self.config.overrides.preempt_grace())
                .await
        {
            tracing::warn!("Executing task did not stop before shutdown");
        }
        // an interrupted override may have left the slot held
        self.scheduler.release();
        self.drain_outcomes();
        tracing::info!(dropped, "Controller stopped");
    }

    fn drain_outcomes(&mut self) -> usize {
        let mut recorded = 0;
        while let Ok(task) = self.outcomes.try_recv() {
            lock_engine(&self.engine).record_task_outcome(&task);
            recorded += 1;
        }
        recorded
    }
}

/// Cloneable command surface over a running controller.
#[derive(Clone)]
pub struct ControllerHandle {
    engine: SharedEngine,
    scheduler: Scheduler,
}

impl ControllerHandle {
    pub fn submit(
        &self,
        kind: TaskKind,
        params: serde_json::Value,
        priority: i32,
    ) -> Result<TaskId, TaskError> {
        self.scheduler
            .submit(kind, params, priority, TaskOrigin::External)
    }

    /// Submit by task type name, as typed by a player or operator.
    pub fn submit_named(
        &self,
        name: &str,
        params: serde_json::Value,
        priority: i32,
    ) -> Result<TaskId, TaskError> {
        let kind: TaskKind = name
            .parse()
            .map_err(|_| TaskError::UnknownTaskType(name.to_string()))?;
        self.submit(kind, params, priority)
    }

    pub fn cancel(&self, id: TaskId) -> bool {
        self.scheduler.cancel(id)
    }

    pub fn task(&self, id: TaskId) -> Option<Task> {
        self.scheduler.task(id)
    }

    pub fn status(&self) -> AgentStatus {
        let engine = lock_engine(&self.engine);
        let state: &AgentState = engine.state();
        AgentStatus {
            mode: state.mode(),
            goal: state.goal().cloned(),
            in_combat: state.in_combat(),
            stats: state.stats().clone(),
            last_decision: engine.last_decision().map(|d| d.summary()),
            scheduler: self.scheduler.status(),
        }
    }

    pub fn set_mode(&self, mode: AgentMode) {
        lock_engine(&self.engine).set_mode(mode);
    }

    pub fn set_goal(&self, goal: Goal) {
        lock_engine(&self.engine).set_goal(goal);
    }

    pub fn clear_goal(&self) {
        lock_engine(&self.engine).clear_goal();
    }

    pub fn pause(&self) {
        self.scheduler.pause();
    }

    pub fn resume(&self) {
        self.scheduler.resume();
    }

    pub fn decision_history(&self) -> Vec<DecisionSummary> {
        lock_engine(&self.engine)
            .history()
            .iter()
            .map(|d| d.summary())
            .collect()
    }

    pub fn task_history(&self) -> Vec<Task> {
        self.scheduler.history()
    }
}
