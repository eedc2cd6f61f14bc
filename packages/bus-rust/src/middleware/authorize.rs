//! Authorization stages for both buses.
//!
//! Skipped when the input's authorize flag is off or when it carries no
//! request (trusted, internal execution).

use std::sync::Arc;

use async_trait::async_trait;
use jsonapi_ops_core::{Operation, SchemaContainer};
use serde_json::Value;

use crate::authorization::{AuthorizationOutcome, ResourceAuthorizer};
use crate::command::{Command, CommandKind};
use crate::error::BusError;
use crate::lazy::LazyRelation;
use crate::outcome::Outcome;
use crate::pipeline::{Input, Middleware, Next};
use crate::query::{Query, QueryKind};
use crate::store::{Model, Store};

async fn proceed<I: Input>(
    decision: AuthorizationOutcome,
    input: I,
    next: Next<'_, I>,
) -> Result<Outcome, BusError> {
    match decision {
        AuthorizationOutcome::Allowed => next.run(input).await,
        AuthorizationOutcome::Denied(errors) => Ok(Outcome::failed(errors)),
        AuthorizationOutcome::Escalate(failure) => Err(failure.into()),
    }
}

fn located<I: Input>(input: &I) -> Result<&Model, BusError> {
    input
        .model()
        .map(AsRef::as_ref)
        .ok_or_else(|| BusError::contract(format!("{} must be authorized against a located model", input.action())))
}

fn required_field(field: Option<&str>, action: &str) -> Result<String, BusError> {
    field
        .map(str::to_string)
        .ok_or_else(|| BusError::contract(format!("{action} requires a relationship field")))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub struct AuthorizeCommand {
    authorizer: Arc<ResourceAuthorizer>,
    schemas: Arc<dyn SchemaContainer>,
    store: Arc<dyn Store>,
}

impl AuthorizeCommand {
    #[must_use]
    pub fn new(
        authorizer: Arc<ResourceAuthorizer>,
        schemas: Arc<dyn SchemaContainer>,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            authorizer,
            schemas,
            store,
        }
    }

    /// The proposed related value, read from the request body or, failing
    /// that, from the parsed operation.
    fn proposed(&self, command: &Command, field: &str) -> Result<LazyRelation, BusError> {
        let relation = self
            .schemas
            .relationship(command.resource_type(), field)
            .ok_or_else(|| {
                BusError::contract(format!(
                    "{} has no relationship named {field}",
                    command.resource_type()
                ))
            })?;

        let raw = match command.request().and_then(|request| request.body_data()) {
            Some(data) => data.clone(),
            None => match command.operation() {
                Some(Operation::UpdateToOne(op)) => serde_json::to_value(&op.data)
                    .map_err(|e| BusError::contract(format!("unserializable linkage: {e}")))?,
                Some(Operation::UpdateToMany(op)) => serde_json::to_value(&op.data)
                    .map_err(|e| BusError::contract(format!("unserializable linkage: {e}")))?,
                _ => Value::Null,
            },
        };
        Ok(LazyRelation::new(self.store.clone(), relation.clone(), raw))
    }

    async fn decide(&self, command: &Command) -> Result<AuthorizationOutcome, BusError> {
        let request = command.request();
        let authorizer = &self.authorizer;
        match command.kind() {
            CommandKind::Store => authorizer.store(request, command.resource_type()).await,
            CommandKind::Update => authorizer.update(request, located(command)?).await,
            CommandKind::Destroy => authorizer.destroy(request, located(command)?).await,
            kind => {
                let model = located(command)?;
                let field = required_field(command.field(), kind.as_str())?;
                let related = self.proposed(command, &field)?;
                match kind {
                    CommandKind::AttachRelationship => {
                        authorizer.attach_relationship(request, model, &related).await
                    }
                    CommandKind::DetachRelationship => {
                        authorizer.detach_relationship(request, model, &related).await
                    }
                    _ => authorizer.update_relationship(request, model, &related).await,
                }
            }
        }
    }
}

#[async_trait]
impl Middleware<Command> for AuthorizeCommand {
    fn name(&self) -> &'static str {
        "authorize"
    }

    async fn handle(&self, command: Command, next: Next<'_, Command>) -> Result<Outcome, BusError> {
        if !command.must_authorize() || command.request().is_none() {
            return next.run(command).await;
        }
        let decision = self.decide(&command).await?;
        proceed(decision, command, next).await
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

pub struct AuthorizeQuery {
    authorizer: Arc<ResourceAuthorizer>,
}

impl AuthorizeQuery {
    #[must_use]
    pub fn new(authorizer: Arc<ResourceAuthorizer>) -> Self {
        Self { authorizer }
    }

    async fn decide(&self, query: &Query) -> Result<AuthorizationOutcome, BusError> {
        let request = query.request();
        match query.kind() {
            QueryKind::FetchMany => self.authorizer.index(request, query.resource_type()).await,
            QueryKind::FetchOne => self.authorizer.show(request, located(query)?).await,
            QueryKind::FetchRelated => {
                let field = required_field(query.field(), query.kind().as_str())?;
                self.authorizer
                    .show_related(request, located(query)?, &field)
                    .await
            }
            QueryKind::FetchRelationship => {
                let field = required_field(query.field(), query.kind().as_str())?;
                self.authorizer
                    .show_relationship(request, located(query)?, &field)
                    .await
            }
        }
    }
}

#[async_trait]
impl Middleware<Query> for AuthorizeQuery {
    fn name(&self) -> &'static str {
        "authorize"
    }

    async fn handle(&self, query: Query, next: Next<'_, Query>) -> Result<Outcome, BusError> {
        if !query.must_authorize() || query.request().is_none() {
            return next.run(query).await;
        }
        let decision = self.decide(&query).await?;
        proceed(decision, query, next).await
    }
}
