//! Terminal handlers: the store calls behind each action.
//!
//! Handlers run after every pipeline stage passed, so they expect a parsed
//! operation, a located model and validated data where the action needs
//! them. A missing prerequisite is a `BusError::Contract`.

use std::sync::Arc;

use async_trait::async_trait;
use jsonapi_ops_core::{Operation, SchemaContainer};

use crate::command::Command;
use crate::error::{ApiError, BusError};
use crate::outcome::{Outcome, Payload};
use crate::pipeline::{Handler, Input};
use crate::query::Query;
use crate::store::{Model, Related, Store};

fn located<I: Input>(input: &I) -> Result<Arc<Model>, BusError> {
    input
        .model()
        .cloned()
        .ok_or_else(|| BusError::contract(format!("{} handler requires a located model", input.action())))
}

fn operation(command: &Command) -> Result<&Operation, BusError> {
    command
        .operation()
        .ok_or_else(|| BusError::contract(format!("{} handler requires an operation", command.kind())))
}

fn relationship_field<'a>(field: Option<&'a str>, action: &str) -> Result<&'a str, BusError> {
    field.ok_or_else(|| BusError::contract(format!("{action} handler requires a relationship field")))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Creates a resource.
pub struct StoreHandler {
    store: Arc<dyn Store>,
}

impl StoreHandler {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Handler<Command> for StoreHandler {
    async fn execute(&self, command: Command) -> Result<Outcome, BusError> {
        let Operation::Create(op) = operation(&command)? else {
            return Err(BusError::contract("store handler requires a create operation"));
        };
        let validated = command.validated().cloned().unwrap_or_default();
        let model = self.store.create(&op.data, &validated).await?;
        tracing::debug!(resource_type = %model.resource_type, id = %model.id, "resource created");
        Ok(Outcome::ok(Payload::model(Some(Arc::new(model)))))
    }
}

/// Updates the located resource.
pub struct UpdateHandler {
    store: Arc<dyn Store>,
}

impl UpdateHandler {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Handler<Command> for UpdateHandler {
    async fn execute(&self, command: Command) -> Result<Outcome, BusError> {
        let model = located(&command)?;
        let Operation::Update(op) = operation(&command)? else {
            return Err(BusError::contract("update handler requires an update operation"));
        };
        let validated = command.validated().cloned().unwrap_or_default();
        let updated = self.store.update(&model, &op.data, &validated).await?;
        Ok(Outcome::ok(Payload::model(Some(Arc::new(updated)))))
    }
}

/// Deletes the located resource. Succeeds without primary data.
pub struct DestroyHandler {
    store: Arc<dyn Store>,
}

impl DestroyHandler {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Handler<Command> for DestroyHandler {
    async fn execute(&self, command: Command) -> Result<Outcome, BusError> {
        let model = located(&command)?;
        self.store.delete(&model).await?;
        tracing::debug!(resource_type = %model.resource_type, id = %model.id, "resource deleted");
        Ok(Outcome::empty())
    }
}

/// Replaces, attaches or detaches relationship members, then answers with
/// the relationship's new contents.
pub struct RelationshipHandler {
    store: Arc<dyn Store>,
}

impl RelationshipHandler {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Handler<Command> for RelationshipHandler {
    async fn execute(&self, command: Command) -> Result<Outcome, BusError> {
        let model = located(&command)?;
        let field = relationship_field(command.field(), command.kind().as_str())?;
        let updated = match operation(&command)? {
            Operation::UpdateToOne(op) => {
                self.store
                    .modify_to_one(&model, field, op.data.as_ref())
                    .await?
            }
            Operation::UpdateToMany(op) => {
                self.store
                    .modify_to_many(&model, field, op.op, op.data.as_slice())
                    .await?
            }
            other => {
                return Err(BusError::contract(format!(
                    "relationship handler cannot execute a {} operation",
                    other.kind()
                )))
            }
        };
        let related = self.store.related(&updated, field).await?;
        Ok(Outcome::ok(Payload::related(related)).with_related_to(Arc::new(updated), field))
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Lists a resource collection.
pub struct FetchManyHandler {
    store: Arc<dyn Store>,
}

impl FetchManyHandler {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Handler<Query> for FetchManyHandler {
    async fn execute(&self, query: Query) -> Result<Outcome, BusError> {
        let models = self
            .store
            .query_all(query.resource_type(), query.parameters())
            .await?;
        let models = models.into_iter().map(Arc::new).collect();
        Ok(Outcome::ok_with_query(Payload::models(models), query.parameters().clone()))
    }
}

/// Answers with the located resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOneHandler;

#[async_trait]
impl Handler<Query> for FetchOneHandler {
    async fn execute(&self, query: Query) -> Result<Outcome, BusError> {
        let model = located(&query)?;
        Ok(Outcome::ok_with_query(
            Payload::model(Some(model)),
            query.parameters().clone(),
        ))
    }
}

/// Answers with the models behind one relationship of the located
/// resource. Serves both the related-resource and the relationship
/// endpoints; they differ only in how the payload is serialized.
pub struct FetchRelatedHandler {
    store: Arc<dyn Store>,
    schemas: Arc<dyn SchemaContainer>,
}

impl FetchRelatedHandler {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, schemas: Arc<dyn SchemaContainer>) -> Self {
        Self { store, schemas }
    }
}

#[async_trait]
impl Handler<Query> for FetchRelatedHandler {
    async fn execute(&self, query: Query) -> Result<Outcome, BusError> {
        let model = located(&query)?;
        let field = relationship_field(query.field(), query.kind().as_str())?;

        let Some(relation) = self.schemas.relationship(query.resource_type(), field) else {
            return Ok(Outcome::failed(ApiError::not_found().with_detail(format!(
                "Resource {} has no relationship named {field}.",
                query.resource_type()
            ))));
        };

        let related = match self.store.related(&model, field).await? {
            Related::ToOne(None) if relation.to_many => Related::ToMany(Vec::new()),
            related => related,
        };
        Ok(Outcome::ok_with_query(Payload::related(related), query.parameters().clone())
            .with_related_to(model, field))
    }
}
