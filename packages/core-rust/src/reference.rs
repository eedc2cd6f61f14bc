//! Explicit `{type, id|lid, relationship?}` addressing.

use serde::{Deserialize, Serialize};

use crate::error::ValueError;
use crate::values::{ResourceId, ResourceIdentifier, ResourceType};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawRef {
    #[serde(rename = "type")]
    resource_type: ResourceType,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    id: Option<ResourceId>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    lid: Option<ResourceId>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    relationship: Option<String>,
}

/// Target of an operation addressed by type and id (or lid), optionally
/// narrowed to one relationship field.
///
/// # Invariants
/// - Exactly one of `id` and `lid` is set.
/// - `relationship`, when present, is not blank.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRef", into = "RawRef")]
pub struct Ref {
    resource_type: ResourceType,
    id: Option<ResourceId>,
    lid: Option<ResourceId>,
    relationship: Option<String>,
}

impl Ref {
    #[must_use]
    pub fn new(resource_type: ResourceType, id: ResourceId) -> Self {
        Self {
            resource_type,
            id: Some(id),
            lid: None,
            relationship: None,
        }
    }

    #[must_use]
    pub fn with_lid(resource_type: ResourceType, lid: ResourceId) -> Self {
        Self {
            resource_type,
            id: None,
            lid: Some(lid),
            relationship: None,
        }
    }

    /// Builds a ref from optional parts.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::MissingIdentity` when neither id nor lid is given,
    /// `ValueError::IdAndLid` when both are, and
    /// `ValueError::BlankRelationship` for a blank relationship name.
    pub fn try_new(
        resource_type: ResourceType,
        id: Option<ResourceId>,
        lid: Option<ResourceId>,
        relationship: Option<String>,
    ) -> Result<Self, ValueError> {
        match (&id, &lid) {
            (None, None) => {
                return Err(ValueError::MissingIdentity {
                    resource_type: resource_type.to_string(),
                })
            }
            (Some(_), Some(_)) => {
                return Err(ValueError::IdAndLid {
                    resource_type: resource_type.to_string(),
                })
            }
            _ => {}
        }
        let reference = Self {
            resource_type,
            id,
            lid,
            relationship: None,
        };
        match relationship {
            Some(name) => reference.with_relationship(name),
            None => Ok(reference),
        }
    }

    /// Returns a copy narrowed to a relationship field.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::BlankRelationship` if `name` is blank.
    pub fn with_relationship(mut self, name: impl Into<String>) -> Result<Self, ValueError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValueError::BlankRelationship);
        }
        self.relationship = Some(name);
        Ok(self)
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
    pub fn relationship(&self) -> Option<&str> {
        self.relationship.as_deref()
    }

    /// The addressed resource as an identifier, without the relationship.
    #[must_use]
    pub fn identifier(&self) -> ResourceIdentifier {
        match (&self.id, &self.lid) {
            (Some(id), _) => ResourceIdentifier::new(self.resource_type.clone(), id.clone()),
            (None, Some(lid)) => {
                ResourceIdentifier::with_lid(self.resource_type.clone(), lid.clone())
            }
            (None, None) => unreachable!("ref invariant guarantees an id or lid"),
        }
    }
}

impl TryFrom<RawRef> for Ref {
    type Error = ValueError;

    fn try_from(raw: RawRef) -> Result<Self, Self::Error> {
        Self::try_new(raw.resource_type, raw.id, raw.lid, raw.relationship)
    }
}

impl From<Ref> for RawRef {
    fn from(value: Ref) -> Self {
        Self {
            resource_type: value.resource_type,
            id: value.id,
            lid: value.lid,
            relationship: value.relationship,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn posts() -> ResourceType {
        ResourceType::new("posts").unwrap()
    }

    fn id(value: &str) -> Option<ResourceId> {
        Some(ResourceId::new(value).unwrap())
    }

    #[test]
    fn ref_requires_exactly_one_of_id_and_lid() {
        assert!(matches!(
            Ref::try_new(posts(), None, None, None),
            Err(ValueError::MissingIdentity { .. })
        ));
        assert!(matches!(
            Ref::try_new(posts(), id("1"), id("a"), None),
            Err(ValueError::IdAndLid { .. })
        ));
        assert!(Ref::try_new(posts(), None, id("a"), None).is_ok());
    }

    #[test]
    fn ref_relationship_must_not_be_blank() {
        assert_eq!(
            Ref::try_new(posts(), id("1"), None, Some(" ".to_string())).unwrap_err(),
            ValueError::BlankRelationship
        );
        let reference = Ref::new(posts(), ResourceId::new("1").unwrap())
            .with_relationship("tags")
            .unwrap();
        assert_eq!(reference.relationship(), Some("tags"));
    }

    #[test]
    fn ref_round_trips_through_json() {
        let value = json!({"type": "posts", "id": "123", "relationship": "tags"});
        let reference: Ref = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(reference.id().unwrap(), "123");
        assert_eq!(serde_json::to_value(&reference).unwrap(), value);

        let both = serde_json::from_value::<Ref>(json!({"type": "posts", "id": "1", "lid": "x"}));
        assert!(both.is_err());
    }

    #[test]
    fn identifier_drops_relationship() {
        let reference = Ref::with_lid(posts(), ResourceId::new("tmp").unwrap())
            .with_relationship("author")
            .unwrap();
        let identifier = reference.identifier();
        assert_eq!(identifier.lid().unwrap(), "tmp");
        assert!(identifier.id().is_none());
    }
}
