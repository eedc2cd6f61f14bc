//! Read requests dispatched through the [`QueryBus`](crate::bus::QueryBus).

use std::fmt;
use std::sync::Arc;

use jsonapi_ops_core::{ResourceId, ResourceType};
use serde_json::{Map, Value};

use crate::context::{QueryParameters, RequestContext};
use crate::hooks::ResourceHooks;
use crate::pipeline::Input;
use crate::store::Model;

/// The read actions of a JSON:API server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    FetchMany,
    FetchOne,
    FetchRelated,
    FetchRelationship,
}

impl QueryKind {
    pub const ALL: [Self; 4] = [
        Self::FetchMany,
        Self::FetchOne,
        Self::FetchRelated,
        Self::FetchRelationship,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FetchMany => "fetchMany",
            Self::FetchOne => "fetchOne",
            Self::FetchRelated => "fetchRelated",
            Self::FetchRelationship => "fetchRelationship",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One read request. Copy-on-write like [`Command`](crate::command::Command).
#[derive(Clone)]
pub struct Query {
    kind: QueryKind,
    resource_type: ResourceType,
    request: Option<Arc<RequestContext>>,
    id: Option<ResourceId>,
    model: Option<Arc<Model>>,
    field: Option<String>,
    parameters: QueryParameters,
    validated: Option<Arc<Map<String, Value>>>,
    authorize: bool,
    validate: bool,
    hooks: Option<Arc<dyn ResourceHooks>>,
}

impl Query {
    #[must_use]
    pub fn new(kind: QueryKind, resource_type: ResourceType) -> Self {
        Self {
            kind,
            resource_type,
            request: None,
            id: None,
            model: None,
            field: None,
            parameters: QueryParameters::default(),
            validated: None,
            authorize: true,
            validate: true,
            hooks: None,
        }
    }

    #[must_use]
    pub fn fetch_many(resource_type: ResourceType) -> Self {
        Self::new(QueryKind::FetchMany, resource_type)
    }

    #[must_use]
    pub fn fetch_one(resource_type: ResourceType, id: ResourceId) -> Self {
        Self::new(QueryKind::FetchOne, resource_type).with_id(id)
    }

    #[must_use]
    pub fn fetch_related(resource_type: ResourceType, id: ResourceId, field: impl Into<String>) -> Self {
        Self::new(QueryKind::FetchRelated, resource_type)
            .with_id(id)
            .with_field(field)
    }

    #[must_use]
    pub fn fetch_relationship(
        resource_type: ResourceType,
        id: ResourceId,
        field: impl Into<String>,
    ) -> Self {
        Self::new(QueryKind::FetchRelationship, resource_type)
            .with_id(id)
            .with_field(field)
    }

    // -- copy-on-write modifiers --------------------------------------------

    /// Attaches the transport request and adopts its query parameters.
    #[must_use]
    pub fn with_request(&self, request: RequestContext) -> Self {
        Self {
            parameters: request.query.clone(),
            request: Some(Arc::new(request)),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_parameters(&self, parameters: QueryParameters) -> Self {
        Self {
            parameters,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_id(&self, id: ResourceId) -> Self {
        Self {
            id: Some(id),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_model(&self, model: Arc<Model>) -> Self {
        Self {
            model: Some(model),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_field(&self, field: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            ..self.clone()
        }
    }

    /// Attaches validated query parameters. Validation will not run again.
    #[must_use]
    pub fn with_validated(&self, validated: Map<String, Value>) -> Self {
        Self {
            validated: Some(Arc::new(validated)),
            validate: false,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_hooks(&self, hooks: Arc<dyn ResourceHooks>) -> Self {
        Self {
            hooks: Some(hooks),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn skip_authorization(&self) -> Self {
        Self {
            authorize: false,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn skip_validation(&self) -> Self {
        Self {
            validate: false,
            ..self.clone()
        }
    }

    // -- accessors ------------------------------------------------------------

    #[must_use]
    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    #[must_use]
    pub fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    #[must_use]
    pub fn request(&self) -> Option<&RequestContext> {
        self.request.as_deref()
    }

    #[must_use]
    pub fn id(&self) -> Option<&ResourceId> {
        self.model
            .as_deref()
            .map(|model| &model.id)
            .or(self.id.as_ref())
    }

    #[must_use]
    pub fn model(&self) -> Option<&Arc<Model>> {
        self.model.as_ref()
    }

    #[must_use]
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    #[must_use]
    pub fn parameters(&self) -> &QueryParameters {
        &self.parameters
    }

    #[must_use]
    pub fn validated(&self) -> Option<&Map<String, Value>> {
        self.validated.as_deref()
    }

    #[must_use]
    pub fn must_authorize(&self) -> bool {
        self.authorize
    }

    #[must_use]
    pub fn must_validate(&self) -> bool {
        self.validate
    }

    #[must_use]
    pub fn hooks(&self) -> Option<&Arc<dyn ResourceHooks>> {
        self.hooks.as_ref()
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("kind", &self.kind)
            .field("resource_type", &self.resource_type)
            .field("id", &self.id())
            .field("field", &self.field)
            .field("parameters", &self.parameters)
            .field("authorize", &self.authorize)
            .field("validate", &self.validate)
            .finish_non_exhaustive()
    }
}

impl Input for Query {
    fn action(&self) -> &'static str {
        self.kind.as_str()
    }

    fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    fn resource_id(&self) -> Option<&ResourceId> {
        self.id()
    }

    fn model(&self) -> Option<&Arc<Model>> {
        self.model.as_ref()
    }

    fn with_model(&self, model: Arc<Model>) -> Self {
        Query::with_model(self, model)
    }

    fn request(&self) -> Option<&RequestContext> {
        self.request.as_deref()
    }
}
