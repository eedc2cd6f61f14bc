//! Interceptor chain executed by the buses.
//!
//! Each [`Middleware`] receives the input and a [`Next`] continuation. A stage
//! may return early (short-circuit), call `next.run` with a modified copy of
//! the input (substitution), or inspect the outcome `next.run` returned
//! (wrap). Stages run strictly in order; the last `Next` invokes the
//! terminal [`Handler`].

use std::sync::Arc;

use async_trait::async_trait;
use jsonapi_ops_core::{ResourceId, ResourceType};

use crate::context::RequestContext;
use crate::error::BusError;
use crate::outcome::Outcome;
use crate::store::Model;

/// What every command and query exposes to shared pipeline stages.
pub trait Input: Clone + Send + Sync + 'static {
    /// Action name for logs, e.g. `"store"` or `"fetchOne"`.
    fn action(&self) -> &'static str;
    fn resource_type(&self) -> &ResourceType;
    fn resource_id(&self) -> Option<&ResourceId>;
    /// Client-generated `lid` addressing the resource when no id is known.
    fn local_id(&self) -> Option<&ResourceId> {
        None
    }
    fn model(&self) -> Option<&Arc<Model>>;
    #[must_use]
    fn with_model(&self, model: Arc<Model>) -> Self;
    fn request(&self) -> Option<&RequestContext>;
}

/// One pipeline stage.
#[async_trait]
pub trait Middleware<I: Input>: Send + Sync {
    /// Stage name for logs.
    fn name(&self) -> &'static str;

    async fn handle(&self, input: I, next: Next<'_, I>) -> Result<Outcome, BusError>;
}

/// Terminal step that performs the action once every stage has passed.
#[async_trait]
pub trait Handler<I: Input>: Send + Sync {
    async fn execute(&self, input: I) -> Result<Outcome, BusError>;
}

/// The remainder of the chain after the current stage.
pub struct Next<'a, I: Input> {
    stages: &'a [Arc<dyn Middleware<I>>],
    handler: &'a dyn Handler<I>,
}

impl<I: Input> Next<'_, I> {
    /// Runs the remaining stages, then the handler.
    ///
    /// # Errors
    ///
    /// Propagates any fault raised by a later stage or the handler.
    pub async fn run(self, input: I) -> Result<Outcome, BusError> {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                tracing::debug!(stage = stage.name(), action = input.action(), "entering stage");
                stage
                    .handle(
                        input,
                        Next {
                            stages: rest,
                            handler: self.handler,
                        },
                    )
                    .await
            }
            None => self.handler.execute(input).await,
        }
    }
}

/// Ordered list of stages for one action.
pub struct Pipeline<I: Input> {
    stages: Vec<Arc<dyn Middleware<I>>>,
}

impl<I: Input> Pipeline<I> {
    #[must_use]
    pub fn new(stages: Vec<Arc<dyn Middleware<I>>>) -> Self {
        Self { stages }
    }

    /// Stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Runs `input` through every stage and finally `handler`.
    ///
    /// # Errors
    ///
    /// Propagates the first fault raised by a stage or the handler.
    pub async fn run(&self, input: I, handler: &dyn Handler<I>) -> Result<Outcome, BusError> {
        Next {
            stages: &self.stages,
            handler,
        }
        .run(input)
        .await
    }
}
