//! The command and query buses.
//!
//! Each action kind has a fixed, ordered list of stages:
//!
//! | Action | Stages |
//! |---|---|
//! | store | parse-operation, check-content-compliance, authorize, validate, trigger-hooks |
//! | update, relationship changes | parse-operation, locate-model, check-content-compliance, authorize, validate, trigger-hooks |
//! | destroy | locate-model, authorize, validate, trigger-hooks |
//! | fetch-many | authorize, validate-query, trigger-hooks |
//! | fetch-one, fetch-related, fetch-relationship | locate-model, authorize, validate-query, trigger-hooks |
//!
//! After the last stage the [`HandlerRouter`] resolves the terminal handler.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use jsonapi_ops_core::{Operation, SchemaContainer};
use tower::Service;

use crate::authorization::{AllowAll, Gate, MessageTable, ResourceAuthorizer, Translator};
use crate::command::{Command, CommandKind};
use crate::config::BusConfig;
use crate::context::RequestContext;
use crate::error::BusError;
use crate::handlers::{
    DestroyHandler, FetchManyHandler, FetchOneHandler, FetchRelatedHandler, RelationshipHandler,
    StoreHandler, UpdateHandler,
};
use crate::middleware::{
    AuthorizeCommand, AuthorizeQuery, CheckContentCompliance, LocateModel, ParseOperation,
    TriggerCommandHooks, TriggerQueryHooks, ValidateCommand, ValidateQuery,
};
use crate::outcome::Outcome;
use crate::pipeline::{Handler, Middleware, Pipeline};
use crate::query::{Query, QueryKind};
use crate::router::HandlerRouter;
use crate::store::Store;
use crate::validation::{PassThrough, ValidatorFactory};

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Everything the buses delegate to.
///
/// Defaults: an allow-all gate, the English message table and a validator
/// factory that accepts everything.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn Store>,
    pub schemas: Arc<dyn SchemaContainer>,
    pub gate: Arc<dyn Gate>,
    pub translator: Arc<dyn Translator>,
    pub validators: Arc<dyn ValidatorFactory>,
    pub config: BusConfig,
}

impl Collaborators {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, schemas: Arc<dyn SchemaContainer>) -> Self {
        Self {
            store,
            schemas,
            gate: Arc::new(AllowAll),
            translator: Arc::new(MessageTable::new()),
            validators: Arc::new(PassThrough),
            config: BusConfig::default(),
        }
    }

    #[must_use]
    pub fn with_gate(mut self, gate: Arc<dyn Gate>) -> Self {
        self.gate = gate;
        self
    }

    #[must_use]
    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = translator;
        self
    }

    #[must_use]
    pub fn with_validators(mut self, validators: Arc<dyn ValidatorFactory>) -> Self {
        self.validators = validators;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: BusConfig) -> Self {
        self.config = config;
        self
    }

    fn authorizer(&self) -> Arc<ResourceAuthorizer> {
        Arc::new(ResourceAuthorizer::new(
            self.gate.clone(),
            self.translator.clone(),
            &self.config.default_locale,
        ))
    }
}

// ---------------------------------------------------------------------------
// CommandBus
// ---------------------------------------------------------------------------

/// Executes write actions.
pub struct CommandBus {
    pipelines: HashMap<CommandKind, Pipeline<Command>>,
    router: HandlerRouter<CommandKind, Command>,
}

impl CommandBus {
    /// A bus with the default store-backed handler for every kind.
    #[must_use]
    pub fn new(collaborators: &Collaborators) -> Self {
        let store = &collaborators.store;
        let mut router: HandlerRouter<CommandKind, Command> = HandlerRouter::new();
        router.register(CommandKind::Store, Arc::new(StoreHandler::new(store.clone())));
        router.register(CommandKind::Update, Arc::new(UpdateHandler::new(store.clone())));
        router.register(CommandKind::Destroy, Arc::new(DestroyHandler::new(store.clone())));
        let relationships: Arc<dyn Handler<Command>> = Arc::new(RelationshipHandler::new(store.clone()));
        for kind in [
            CommandKind::UpdateRelationship,
            CommandKind::AttachRelationship,
            CommandKind::DetachRelationship,
        ] {
            router.register(kind, relationships.clone());
        }
        Self::with_router(collaborators, router)
    }

    /// A bus dispatching to the given handlers.
    #[must_use]
    pub fn with_router(collaborators: &Collaborators, router: HandlerRouter<CommandKind, Command>) -> Self {
        let c = collaborators;
        let parse: Arc<dyn Middleware<Command>> =
            Arc::new(ParseOperation::new(c.schemas.clone(), c.config.base_path.clone()));
        let locate: Arc<dyn Middleware<Command>> = Arc::new(LocateModel::new(c.store.clone()));
        let comply: Arc<dyn Middleware<Command>> = Arc::new(CheckContentCompliance::new(c.schemas.clone()));
        let authorize: Arc<dyn Middleware<Command>> =
            Arc::new(AuthorizeCommand::new(c.authorizer(), c.schemas.clone(), c.store.clone()));
        let validate: Arc<dyn Middleware<Command>> =
            Arc::new(ValidateCommand::new(c.validators.clone(), c.schemas.clone()));
        let hooks: Arc<dyn Middleware<Command>> = Arc::new(TriggerCommandHooks);

        let pipelines = CommandKind::ALL
            .into_iter()
            .map(|kind| {
                let stages = match kind {
                    CommandKind::Store => vec![
                        parse.clone(),
                        comply.clone(),
                        authorize.clone(),
                        validate.clone(),
                        hooks.clone(),
                    ],
                    CommandKind::Destroy => vec![
                        locate.clone(),
                        authorize.clone(),
                        validate.clone(),
                        hooks.clone(),
                    ],
                    _ => vec![
                        parse.clone(),
                        locate.clone(),
                        comply.clone(),
                        authorize.clone(),
                        validate.clone(),
                        hooks.clone(),
                    ],
                };
                (kind, Pipeline::new(stages))
            })
            .collect();

        Self { pipelines, router }
    }

    /// Replaces the handler for one kind.
    #[must_use]
    pub fn with_handler(mut self, kind: CommandKind, handler: Arc<dyn Handler<Command>>) -> Self {
        self.router.register(kind, handler);
        self
    }

    #[must_use]
    pub fn stage_names(&self, kind: CommandKind) -> Vec<&'static str> {
        self.pipelines
            .get(&kind)
            .map(Pipeline::stage_names)
            .unwrap_or_default()
    }

    /// Runs `command` through its action's stages and handler.
    ///
    /// Domain failures (denied, invalid, conflicting) are returned as a
    /// failed [`Outcome`].
    ///
    /// # Errors
    ///
    /// Unparseable bodies, contract violations, transport-level
    /// authorization failures, hook aborts, store errors, and kinds without a
    /// registered handler.
    pub async fn dispatch(&self, command: Command) -> Result<Outcome, BusError> {
        let kind = command.kind();
        let handler = self.router.get(kind)?;
        let pipeline = self
            .pipelines
            .get(&kind)
            .ok_or_else(|| BusError::UnknownHandler { action: kind.to_string() })?;
        tracing::debug!(action = %kind, resource_type = %command.resource_type(), "dispatching command");
        pipeline.run(command, handler).await
    }

    /// Executes parsed operations in request order, stopping after the
    /// first one that does not succeed.
    ///
    /// The returned outcomes line up with the operations that ran. Earlier
    /// operations are not rolled back; the store owns transactional
    /// behaviour.
    ///
    /// # Errors
    ///
    /// Stops at, and returns, the first fault.
    pub async fn dispatch_batch(
        &self,
        operations: Vec<Operation>,
        request: Option<&RequestContext>,
    ) -> Result<Vec<Outcome>, BusError> {
        let mut outcomes = Vec::with_capacity(operations.len());
        for (index, operation) in operations.into_iter().enumerate() {
            let mut command = Command::from_operation(operation);
            if let Some(request) = request {
                command = command.with_request(request.clone());
            }
            let outcome = self.dispatch(command).await?;
            let failed = outcome.did_fail();
            outcomes.push(outcome);
            if failed {
                tracing::debug!(index, "batch stopped at failed operation");
                break;
            }
        }
        Ok(outcomes)
    }
}

impl Service<Command> for Arc<CommandBus> {
    type Response = Outcome;
    type Error = BusError;
    type Future = Pin<Box<dyn Future<Output = Result<Outcome, BusError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, command: Command) -> Self::Future {
        let bus = Arc::clone(self);
        Box::pin(async move { bus.dispatch(command).await })
    }
}

// ---------------------------------------------------------------------------
// QueryBus
// ---------------------------------------------------------------------------

/// Executes read actions.
pub struct QueryBus {
    pipelines: HashMap<QueryKind, Pipeline<Query>>,
    router: HandlerRouter<QueryKind, Query>,
}

impl QueryBus {
    #[must_use]
    pub fn new(collaborators: &Collaborators) -> Self {
        let c = collaborators;
        let mut router: HandlerRouter<QueryKind, Query> = HandlerRouter::new();
        router.register(QueryKind::FetchMany, Arc::new(FetchManyHandler::new(c.store.clone())));
        router.register(QueryKind::FetchOne, Arc::new(FetchOneHandler));
        let related: Arc<dyn Handler<Query>> =
            Arc::new(FetchRelatedHandler::new(c.store.clone(), c.schemas.clone()));
        router.register(QueryKind::FetchRelated, related.clone());
        router.register(QueryKind::FetchRelationship, related);
        Self::with_router(c, router)
    }

    #[must_use]
    pub fn with_router(collaborators: &Collaborators, router: HandlerRouter<QueryKind, Query>) -> Self {
        let c = collaborators;
        let locate: Arc<dyn Middleware<Query>> = Arc::new(LocateModel::new(c.store.clone()));
        let authorize: Arc<dyn Middleware<Query>> = Arc::new(AuthorizeQuery::new(c.authorizer()));
        let validate: Arc<dyn Middleware<Query>> = Arc::new(ValidateQuery::new(c.validators.clone()));
        let hooks: Arc<dyn Middleware<Query>> = Arc::new(TriggerQueryHooks);

        let pipelines = QueryKind::ALL
            .into_iter()
            .map(|kind| {
                let mut stages = Vec::with_capacity(4);
                if kind != QueryKind::FetchMany {
                    stages.push(locate.clone());
                }
                stages.extend([authorize.clone(), validate.clone(), hooks.clone()]);
                (kind, Pipeline::new(stages))
            })
            .collect();

        Self { pipelines, router }
    }

    #[must_use]
    pub fn with_handler(mut self, kind: QueryKind, handler: Arc<dyn Handler<Query>>) -> Self {
        self.router.register(kind, handler);
        self
    }

    #[must_use]
    pub fn stage_names(&self, kind: QueryKind) -> Vec<&'static str> {
        self.pipelines
            .get(&kind)
            .map(Pipeline::stage_names)
            .unwrap_or_default()
    }

    /// # Errors
    ///
    /// Contract violations, transport-level authorization failures, hook
    /// aborts, store errors, and kinds without a registered handler.
    pub async fn dispatch(&self, query: Query) -> Result<Outcome, BusError> {
        let kind = query.kind();
        let handler = self.router.get(kind)?;
        let pipeline = self
            .pipelines
            .get(&kind)
            .ok_or_else(|| BusError::UnknownHandler { action: kind.to_string() })?;
        tracing::debug!(action = %kind, resource_type = %query.resource_type(), "dispatching query");
        pipeline.run(query, handler).await
    }
}

impl Service<Query> for Arc<QueryBus> {
    type Response = Outcome;
    type Error = BusError;
    type Future = Pin<Box<dyn Future<Output = Result<Outcome, BusError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, query: Query) -> Self::Future {
        let bus = Arc::clone(self);
        Box::pin(async move { bus.dispatch(query).await })
    }
}
