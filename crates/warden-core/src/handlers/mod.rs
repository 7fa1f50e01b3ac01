//! Task handlers: one capability implementation per task kind.

mod building;
mod combat;
mod mining;
mod movement;

use std::sync::Arc;

use agent_core::{TaskId, TaskKind};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::config::HandlerConfig;
use crate::error::TaskError;
use crate::world::WorldSurface;

pub use building::{BuildHandler, CraftHandler, DepositHandler};
pub use combat::{engage, DefendHandler, Engagement};
pub use mining::{GatherHandler, MineHandler};
pub(crate) use mining::eat_carried;
pub use movement::{ExploreHandler, FollowHandler, GotoHandler, PatrolHandler};

/// Everything a handler may touch while running one task.
#[derive(Clone)]
pub struct TaskContext {
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub params: serde_json::Value,
    pub world: Arc<dyn WorldSurface>,
    pub settings: Arc<HandlerConfig>,
    /// Tripped when the task is preempted; the scheduler also drops the
    /// handler future, so checking it is only needed around non-world work.
    pub cancel: CancellationToken,
}

impl TaskContext {
    /// Decode params into a typed struct. Missing params decode as `{}`.
    pub fn params<T: DeserializeOwned>(&self) -> Result<T, TaskError> {
        let raw = if self.params.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            self.params.clone()
        };
        serde_json::from_value(raw).map_err(|e| TaskError::InvalidParams {
            kind: self.kind,
            reason: e.to_string(),
        })
    }
}

#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn kind(&self) -> TaskKind;

    async fn run(&self, ctx: &TaskContext) -> Result<serde_json::Value, TaskError>;
}

/// The ten built-in handlers.
pub fn builtin() -> Vec<Arc<dyn TaskHandler>> {
    vec![
        Arc::new(MineHandler),
        Arc::new(ExploreHandler),
        Arc::new(BuildHandler),
        Arc::new(GatherHandler),
        Arc::new(GotoHandler),
        Arc::new(FollowHandler),
        Arc::new(CraftHandler),
        Arc::new(DepositHandler),
        Arc::new(PatrolHandler),
        Arc::new(DefendHandler),
    ]
}
