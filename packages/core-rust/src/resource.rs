//! Resource objects: the `data` member of create and update operations.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValueError;
use crate::values::{ResourceId, ResourceIdentifier, ResourceType};

/// JSON:API resource object `{type, id?, lid?, attributes, relationships, meta}`.
///
/// A resource object sent to create a resource may carry neither `id` nor
/// `lid` (the server assigns the id). Everywhere else the parser requires one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceObject {
    #[serde(rename = "type")]
    resource_type: ResourceType,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    id: Option<ResourceId>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    lid: Option<ResourceId>,
    #[serde(skip_serializing_if = "Map::is_empty", default)]
    attributes: Map<String, Value>,
    #[serde(skip_serializing_if = "Map::is_empty", default)]
    relationships: Map<String, Value>,
    #[serde(skip_serializing_if = "Map::is_empty", default)]
    meta: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    links: Option<Value>,
}

impl ResourceObject {
    #[must_use]
    pub fn new(resource_type: ResourceType) -> Self {
        Self {
            resource_type,
            id: None,
            lid: None,
            attributes: Map::new(),
            relationships: Map::new(),
            meta: Map::new(),
            links: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: ResourceId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn with_lid(mut self, lid: ResourceId) -> Self {
        self.lid = Some(lid);
        self
    }

    #[must_use]
    pub fn with_attributes(mut self, attributes: Map<String, Value>) -> Self {
        self.attributes = attributes;
        self
    }

    #[must_use]
    pub fn with_relationships(mut self, relationships: Map<String, Value>) -> Self {
        self.relationships = relationships;
        self
    }

    #[must_use]
    pub fn with_meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta = meta;
        self
    }

    #[must_use]
    pub fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    #[must_use]
    pub fn id(&self) -> Option<&ResourceId> {
        self.id.as_ref()
    }

    #[must_use]
    pub fn lid(&self) -> Option<&ResourceId> {
        self.lid.as_ref()
    }

    #[must_use]
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    #[must_use]
    pub fn relationships(&self) -> &Map<String, Value> {
        &self.relationships
    }

    #[must_use]
    pub fn meta(&self) -> &Map<String, Value> {
        &self.meta
    }

    /// The `data` member of one relationship object, if the client sent it.
    #[must_use]
    pub fn relationship_data(&self, field: &str) -> Option<&Value> {
        self.relationships.get(field)?.get("data")
    }

    /// Whether the resource carries an `id` or `lid`.
    #[must_use]
    pub fn has_identity(&self) -> bool {
        self.id.is_some() || self.lid.is_some()
    }

    /// Identifier of this resource, if it has an id or lid.
    #[must_use]
    pub fn identifier(&self) -> Option<ResourceIdentifier> {
        ResourceIdentifier::try_new(self.resource_type.clone(), self.id.clone(), self.lid.clone())
            .ok()
    }

    /// Assigns the server id once the resource has been created.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::IdAlreadySet` if an id is already present.
    pub fn set_id(&mut self, id: ResourceId) -> Result<(), ValueError> {
        if let Some(existing) = &self.id {
            return Err(ValueError::IdAlreadySet {
                resource_type: self.resource_type.to_string(),
                id: existing.to_string(),
            });
        }
        self.id = Some(id);
        Ok(())
    }
}
