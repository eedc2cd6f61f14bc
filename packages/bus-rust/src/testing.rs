//! Recording doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use jsonapi_ops_core::{
    OpCode, Operation, RelationDef, ResourceId, ResourceIdentifier, ResourceObject,
    ResourceSchema, ResourceType, Schemas,
};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use crate::authorization::{Ability, Gate, GateResponse, Subject};
use crate::context::{QueryParameters, RequestContext};
use crate::hooks::{HookEvent, ResourceHooks};
use crate::lazy::LazyRelation;
use crate::store::{InMemoryStore, Linkage, Model, Store};
use crate::validation::{ValidationFailure, Validator, ValidatorFactory};

/// Shared, ordered log of calls made to several doubles.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn rt(value: &str) -> ResourceType {
    ResourceType::new(value).unwrap()
}

pub fn rid(value: &str) -> ResourceId {
    ResourceId::new(value).unwrap()
}

/// `posts` (`author` to-one users, `tags` to-many tags),
/// `users` and `tags`.
pub fn schemas() -> Schemas {
    Schemas::new()
        .with(
            ResourceSchema::new(rt("posts"))
                .with_relationship(RelationDef::to_one("author", rt("users")))
                .with_relationship(RelationDef::to_many("tags", rt("tags"))),
        )
        .with(ResourceSchema::new(rt("users")))
        .with(ResourceSchema::new(rt("tags")))
}

/// posts 1 and 2, user 9, tags 1 and 2. Post 1 is written by user 9 and
/// tagged with tag 1.
pub fn seeded_store() -> InMemoryStore {
    let store = InMemoryStore::new();
    store.insert(
        Model::new(rt("posts"), rid("1"))
            .with_attribute("title", json!("Hello World"))
            .with_linkage(
                "author",
                Linkage::ToOne(Some(ResourceIdentifier::new(rt("users"), rid("9")))),
            )
            .with_linkage(
                "tags",
                Linkage::ToMany(vec![ResourceIdentifier::new(rt("tags"), rid("1"))]),
            ),
    );
    store.insert(Model::new(rt("posts"), rid("2")).with_attribute("title", json!("Second")));
    store.insert(Model::new(rt("users"), rid("9")).with_attribute("name", json!("Ada")));
    store.insert(Model::new(rt("tags"), rid("1")));
    store.insert(Model::new(rt("tags"), rid("2")));
    store
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Wraps an [`InMemoryStore`], counting lookups and logging mutations.
pub struct CountingStore {
    inner: InMemoryStore,
    finds: AtomicUsize,
    find_manys: AtomicUsize,
    log: CallLog,
}

impl CountingStore {
    pub fn new(inner: InMemoryStore) -> Self {
        Self::with_log(inner, CallLog::default())
    }

    pub fn with_log(inner: InMemoryStore, log: CallLog) -> Self {
        Self {
            inner,
            finds: AtomicUsize::new(0),
            find_manys: AtomicUsize::new(0),
            log,
        }
    }

    pub fn finds(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
    }

    pub fn find_manys(&self) -> usize {
        self.find_manys.load(Ordering::SeqCst)
    }

    /// Mutating calls, e.g. `["store.create"]`.
    pub fn mutations(&self) -> Vec<String> {
        self.log
            .lock()
            .iter()
            .filter(|entry| entry.starts_with("store."))
            .cloned()
            .collect()
    }

    fn record(&self, call: &str) {
        self.log.lock().push(format!("store.{call}"));
    }
}

#[async_trait]
impl Store for CountingStore {
    async fn find(
        &self,
        resource_type: &ResourceType,
        id: &ResourceId,
    ) -> anyhow::Result<Option<Model>> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        self.inner.find(resource_type, id).await
    }

    async fn find_many(&self, identifiers: &[ResourceIdentifier]) -> anyhow::Result<Vec<Model>> {
        self.find_manys.fetch_add(1, Ordering::SeqCst);
        self.inner.find_many(identifiers).await
    }

    async fn query_all(
        &self,
        resource_type: &ResourceType,
        query: &QueryParameters,
    ) -> anyhow::Result<Vec<Model>> {
        self.inner.query_all(resource_type, query).await
    }

    async fn create(
        &self,
        data: &ResourceObject,
        validated: &Map<String, Value>,
    ) -> anyhow::Result<Model> {
        self.record("create");
        self.inner.create(data, validated).await
    }

    async fn update(
        &self,
        model: &Model,
        data: &ResourceObject,
        validated: &Map<String, Value>,
    ) -> anyhow::Result<Model> {
        self.record("update");
        self.inner.update(model, data, validated).await
    }

    async fn delete(&self, model: &Model) -> anyhow::Result<()> {
        self.record("delete");
        self.inner.delete(model).await
    }

    async fn modify_to_one(
        &self,
        model: &Model,
        field: &str,
        related: Option<&ResourceIdentifier>,
    ) -> anyhow::Result<Model> {
        self.record("modify_to_one");
        self.inner.modify_to_one(model, field, related).await
    }

    async fn modify_to_many(
        &self,
        model: &Model,
        field: &str,
        op: OpCode,
        related: &[ResourceIdentifier],
    ) -> anyhow::Result<Model> {
        self.record("modify_to_many");
        self.inner.modify_to_many(model, field, op, related).await
    }
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// Logs every event name; optionally refuses one event.
#[derive(Default)]
pub struct RecordingHooks {
    log: CallLog,
    refuse: Option<&'static str>,
}

impl RecordingHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(log: CallLog) -> Self {
        Self { log, refuse: None }
    }

    #[must_use]
    pub fn refusing(mut self, event: &'static str) -> Self {
        self.refuse = Some(event);
        self
    }

    /// Logged hook event names, in order.
    pub fn events(&self) -> Vec<String> {
        self.log
            .lock()
            .iter()
            .filter(|entry| !entry.starts_with("store."))
            .cloned()
            .collect()
    }
}

impl ResourceHooks for RecordingHooks {
    fn handle(&self, event: &HookEvent<'_>, _request: Option<&RequestContext>) -> anyhow::Result<()> {
        if self.refuse == Some(event.name()) {
            anyhow::bail!("{} refused", event.name());
        }
        self.log.lock().push(event.name().to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Answers per ability, allowing anything not configured. Records every
/// inspected ability and can resolve the lazy relation it is handed.
#[derive(Default)]
pub struct ScriptedGate {
    responses: HashMap<String, GateResponse>,
    failures: HashMap<String, String>,
    resolve_related: bool,
    inspected: Mutex<Vec<String>>,
    related_seen: Mutex<Vec<usize>>,
}

impl ScriptedGate {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn answer(mut self, ability: &str, response: impl Into<GateResponse>) -> Self {
        self.responses.insert(ability.to_string(), response.into());
        self
    }

    /// Makes `inspect` fail for `ability`, as a transport exception would.
    #[must_use]
    pub fn failing(mut self, ability: &str, message: &str) -> Self {
        self.failures.insert(ability.to_string(), message.to_string());
        self
    }

    #[must_use]
    pub fn resolving_related(mut self) -> Self {
        self.resolve_related = true;
        self
    }

    pub fn inspected(&self) -> Vec<String> {
        self.inspected.lock().clone()
    }

    /// Number of related models seen per relationship check.
    pub fn related_seen(&self) -> Vec<usize> {
        self.related_seen.lock().clone()
    }
}

#[async_trait]
impl Gate for ScriptedGate {
    async fn inspect(
        &self,
        ability: &Ability,
        _subject: Subject<'_>,
        related: Option<&LazyRelation>,
        _request: Option<&RequestContext>,
    ) -> anyhow::Result<GateResponse> {
        self.inspected.lock().push(ability.to_string());
        if let Some(message) = self.failures.get(ability.as_str()) {
            anyhow::bail!("{message}");
        }
        if self.resolve_related {
            if let Some(related) = related {
                let count = related.get().await?.models().len();
                self.related_seen.lock().push(count);
            }
        }
        Ok(self
            .responses
            .get(ability.as_str())
            .cloned()
            .unwrap_or(GateResponse::Allowed(true)))
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

struct Fixed(Result<Map<String, Value>, Vec<ValidationFailure>>);

impl Validator for Fixed {
    fn validate(&self) -> Result<Map<String, Value>, Vec<ValidationFailure>> {
        self.0.clone()
    }
}

/// Fails every resource validation with the configured failures, and every
/// query validation with the configured query failures.
#[derive(Default)]
pub struct ScriptedValidators {
    resource: Vec<ValidationFailure>,
    destroy: Vec<ValidationFailure>,
    query: Vec<ValidationFailure>,
    made: Mutex<Vec<&'static str>>,
}

impl ScriptedValidators {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failing_resource(mut self, failures: Vec<ValidationFailure>) -> Self {
        self.resource = failures;
        self
    }

    #[must_use]
    pub fn failing_destroy(mut self, failures: Vec<ValidationFailure>) -> Self {
        self.destroy = failures;
        self
    }

    #[must_use]
    pub fn failing_query(mut self, failures: Vec<ValidationFailure>) -> Self {
        self.query = failures;
        self
    }

    pub fn made(&self) -> Vec<&'static str> {
        self.made.lock().clone()
    }

    fn fixed(failures: &[ValidationFailure], validated: Map<String, Value>) -> Box<dyn Validator> {
        if failures.is_empty() {
            Box::new(Fixed(Ok(validated)))
        } else {
            Box::new(Fixed(Err(failures.to_vec())))
        }
    }
}

impl ValidatorFactory for ScriptedValidators {
    fn make(&self, operation: &Operation, _model: Option<&Model>) -> Box<dyn Validator> {
        self.made.lock().push("make");
        let validated = operation
            .resource_object()
            .map(|data| data.attributes().clone())
            .unwrap_or_default();
        Self::fixed(&self.resource, validated)
    }

    fn make_destroy(&self, _model: &Model) -> Option<Box<dyn Validator>> {
        self.made.lock().push("make_destroy");
        Some(Self::fixed(&self.destroy, Map::new()))
    }

    fn make_query(&self, _parameters: &QueryParameters) -> Box<dyn Validator> {
        self.made.lock().push("make_query");
        Self::fixed(&self.query, Map::new())
    }
}
