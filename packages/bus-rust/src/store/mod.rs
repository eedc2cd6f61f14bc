//! Persistence contract used by the bus handlers.
//!
//! The bus never talks to a database directly: handlers and lazy helpers go
//! through the [`Store`] trait. [`InMemoryStore`] is the bundled
//! implementation used by the CLI and tests.

pub mod memory;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use jsonapi_ops_core::{OpCode, ResourceId, ResourceIdentifier, ResourceObject, ResourceType};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::context::QueryParameters;

pub use memory::InMemoryStore;

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// Linkage of one relationship field on a stored model.
#[derive(Debug, Clone, PartialEq)]
pub enum Linkage {
    ToOne(Option<ResourceIdentifier>),
    ToMany(Vec<ResourceIdentifier>),
}

impl Linkage {
    /// Reads the `data` member of a relationship object.
    ///
    /// # Errors
    ///
    /// Fails if `data` is neither `null`, an identifier nor an array of
    /// identifiers.
    pub fn from_data(data: &Value) -> anyhow::Result<Self> {
        Ok(match data {
            Value::Null => Self::ToOne(None),
            Value::Array(_) => Self::ToMany(serde_json::from_value(data.clone())?),
            Value::Object(_) => Self::ToOne(Some(serde_json::from_value(data.clone())?)),
            other => anyhow::bail!("relationship data must be null, an object or an array, got {other}"),
        })
    }

    #[must_use]
    pub fn identifiers(&self) -> Vec<&ResourceIdentifier> {
        match self {
            Self::ToOne(identifier) => identifier.iter().collect(),
            Self::ToMany(identifiers) => identifiers.iter().collect(),
        }
    }
}

impl Serialize for Linkage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Self::ToOne(identifier) => map.serialize_entry("data", identifier)?,
            Self::ToMany(identifiers) => map.serialize_entry("data", identifiers)?,
        }
        map.end()
    }
}

/// A persisted resource as returned by a [`Store`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Model {
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub id: ResourceId,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, Linkage>,
}

impl Model {
    #[must_use]
    pub fn new(resource_type: ResourceType, id: ResourceId) -> Self {
        Self {
            resource_type,
            id,
            attributes: Map::new(),
            relationships: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, key: &str, value: Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }

    #[must_use]
    pub fn with_linkage(mut self, field: &str, linkage: Linkage) -> Self {
        self.relationships.insert(field.to_string(), linkage);
        self
    }

    #[must_use]
    pub fn identifier(&self) -> ResourceIdentifier {
        ResourceIdentifier::new(self.resource_type.clone(), self.id.clone())
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    #[must_use]
    pub fn linkage(&self, field: &str) -> Option<&Linkage> {
        self.relationships.get(field)
    }
}

/// Resolved models on the other side of a relationship.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    ToOne(Option<Arc<Model>>),
    ToMany(Vec<Arc<Model>>),
}

impl Related {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::ToOne(model) => model.is_none(),
            Self::ToMany(models) => models.is_empty(),
        }
    }

    #[must_use]
    pub fn models(&self) -> Vec<&Arc<Model>> {
        match self {
            Self::ToOne(model) => model.iter().collect(),
            Self::ToMany(models) => models.iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Whether two identifiers address the same stored resource.
pub(crate) fn same_resource(a: &ResourceIdentifier, b: &ResourceIdentifier) -> bool {
    a.resource_type() == b.resource_type() && a.id().is_some() && a.id() == b.id()
}

/// Reads and mutates persisted resources.
///
/// Used as `Arc<dyn Store>`. Errors are infrastructure failures and abort
/// the execution as `BusError::Store`.
#[async_trait]
pub trait Store: Send + Sync {
    async fn find(&self, resource_type: &ResourceType, id: &ResourceId)
        -> anyhow::Result<Option<Model>>;

    /// Finds every identified resource that exists, in identifier order.
    /// Identifiers without an id are skipped.
    async fn find_many(&self, identifiers: &[ResourceIdentifier]) -> anyhow::Result<Vec<Model>> {
        let mut models = Vec::with_capacity(identifiers.len());
        for identifier in identifiers {
            let Some(id) = identifier.id() else {
                continue;
            };
            if let Some(model) = self.find(identifier.resource_type(), id).await? {
                models.push(model);
            }
        }
        Ok(models)
    }

    async fn query_all(
        &self,
        resource_type: &ResourceType,
        query: &QueryParameters,
    ) -> anyhow::Result<Vec<Model>>;

    /// Persists a new resource from the request data and validated fields.
    async fn create(
        &self,
        data: &ResourceObject,
        validated: &Map<String, Value>,
    ) -> anyhow::Result<Model>;

    async fn update(
        &self,
        model: &Model,
        data: &ResourceObject,
        validated: &Map<String, Value>,
    ) -> anyhow::Result<Model>;

    async fn delete(&self, model: &Model) -> anyhow::Result<()>;

    /// Replaces a to-one relationship. Returns the updated owner.
    async fn modify_to_one(
        &self,
        model: &Model,
        field: &str,
        related: Option<&ResourceIdentifier>,
    ) -> anyhow::Result<Model>;

    /// Adds to, replaces or removes from a to-many relationship according to
    /// `op`. Returns the updated owner.
    async fn modify_to_many(
        &self,
        model: &Model,
        field: &str,
        op: OpCode,
        related: &[ResourceIdentifier],
    ) -> anyhow::Result<Model>;

    /// Resolves the models linked through `field`.
    async fn related(&self, model: &Model, field: &str) -> anyhow::Result<Related> {
        Ok(match model.linkage(field) {
            Some(Linkage::ToMany(identifiers)) => Related::ToMany(
                self.find_many(identifiers)
                    .await?
                    .into_iter()
                    .map(Arc::new)
                    .collect(),
            ),
            Some(Linkage::ToOne(Some(identifier))) => {
                let found = match identifier.id() {
                    Some(id) => self.find(identifier.resource_type(), id).await?,
                    None => None,
                };
                Related::ToOne(found.map(Arc::new))
            }
            Some(Linkage::ToOne(None)) | None => Related::ToOne(None),
        })
    }
}
