//! Self-validating identifier values.
//!
//! [`ResourceType`] and [`ResourceId`] are non-empty string newtypes.
//! [`ResourceIdentifier`] is the `{type, id?, lid?, meta?}` linkage object
//! used in relationship payloads. It must carry an `id`, a `lid`, or both.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValueError;
use crate::schema::IdPattern;

// ---------------------------------------------------------------------------
// ResourceType
// ---------------------------------------------------------------------------

/// Canonical JSON:API resource type, e.g. `"posts"`.
///
/// # Invariants
/// - Never empty or whitespace-only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceType(String);

impl ResourceType {
    /// Creates a resource type.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::EmptyType` if the value is blank.
    pub fn new(value: impl Into<String>) -> Result<Self, ValueError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ValueError::EmptyType);
        }
        Ok(Self(value))
    }

    /// Returns the type as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ResourceType {
    type Error = ValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ResourceType {
    type Error = ValueError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResourceType> for String {
    fn from(value: ResourceType) -> Self {
        value.0
    }
}

impl PartialEq<str> for ResourceType {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ResourceType {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

// ---------------------------------------------------------------------------
// ResourceId
// ---------------------------------------------------------------------------

/// Server-assigned (`id`) or client-generated (`lid`) resource identifier.
///
/// # Invariants
/// - Never empty or whitespace-only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

impl ResourceId {
    /// Creates a resource id.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::EmptyId` if the value is blank.
    pub fn new(value: impl Into<String>) -> Result<Self, ValueError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ValueError::EmptyId);
        }
        Ok(Self(value))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id satisfies a schema-declared id pattern.
    #[must_use]
    pub fn matches(&self, pattern: &IdPattern) -> bool {
        pattern.is_match(&self.0)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ResourceId {
    type Error = ValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ResourceId {
    type Error = ValueError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResourceId> for String {
    fn from(value: ResourceId) -> Self {
        value.0
    }
}

impl PartialEq<str> for ResourceId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ResourceId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

// ---------------------------------------------------------------------------
// ResourceIdentifier
// ---------------------------------------------------------------------------

/// Wire shape shared by identifiers and resource objects before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawIdentifier {
    #[serde(rename = "type")]
    resource_type: ResourceType,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    id: Option<ResourceId>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    lid: Option<ResourceId>,
    #[serde(skip_serializing_if = "Map::is_empty", default)]
    meta: Map<String, Value>,
}

/// Resource linkage `{type, id?, lid?, meta?}`.
///
/// # Invariants
/// - Carries an `id`, a `lid`, or both; never neither.
/// - An `id` can be assigned once to an identifier that only has a `lid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawIdentifier", into = "RawIdentifier")]
pub struct ResourceIdentifier {
    resource_type: ResourceType,
    id: Option<ResourceId>,
    lid: Option<ResourceId>,
    meta: Map<String, Value>,
}

impl ResourceIdentifier {
    /// Creates an identifier addressed by server id.
    #[must_use]
    pub fn new(resource_type: ResourceType, id: ResourceId) -> Self {
        Self {
            resource_type,
            id: Some(id),
            lid: None,
            meta: Map::new(),
        }
    }

    /// Creates an identifier addressed by client-generated local id.
    #[must_use]
    pub fn with_lid(resource_type: ResourceType, lid: ResourceId) -> Self {
        Self {
            resource_type,
            id: None,
            lid: Some(lid),
            meta: Map::new(),
        }
    }

    /// Creates an identifier from optional parts.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::MissingIdentity` when both `id` and `lid` are absent.
    pub fn try_new(
        resource_type: ResourceType,
        id: Option<ResourceId>,
        lid: Option<ResourceId>,
    ) -> Result<Self, ValueError> {
        if id.is_none() && lid.is_none() {
            return Err(ValueError::MissingIdentity {
                resource_type: resource_type.to_string(),
            });
        }
        Ok(Self {
            resource_type,
            id,
            lid,
            meta: Map::new(),
        })
    }

    /// Returns a copy carrying the given meta.
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
    pub fn meta(&self) -> &Map<String, Value> {
        &self.meta
    }

    /// Assigns the server id to an identifier that was created with a `lid`.
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

impl TryFrom<RawIdentifier> for ResourceIdentifier {
    type Error = ValueError;

    fn try_from(raw: RawIdentifier) -> Result<Self, Self::Error> {
        Ok(Self::try_new(raw.resource_type, raw.id, raw.lid)?.with_meta(raw.meta))
    }
}

impl From<ResourceIdentifier> for RawIdentifier {
    fn from(value: ResourceIdentifier) -> Self {
        Self {
            resource_type: value.resource_type,
            id: value.id,
            lid: value.lid,
            meta: value.meta,
        }
    }
}

// ---------------------------------------------------------------------------
// ListOfResourceIdentifiers
// ---------------------------------------------------------------------------

/// Ordered to-many linkage. An empty list is legal and clears a relationship.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListOfResourceIdentifiers(Vec<ResourceIdentifier>);

impl ListOfResourceIdentifiers {
    #[must_use]
    pub fn new(identifiers: Vec<ResourceIdentifier>) -> Self {
        Self(identifiers)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResourceIdentifier> {
        self.0.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[ResourceIdentifier] {
        &self.0
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<ResourceIdentifier> {
        self.0
    }
}

impl<'a> IntoIterator for &'a ListOfResourceIdentifiers {
    type Item = &'a ResourceIdentifier;
    type IntoIter = std::slice::Iter<'a, ResourceIdentifier>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<ResourceIdentifier> for ListOfResourceIdentifiers {
    fn from_iter<I: IntoIterator<Item = ResourceIdentifier>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
