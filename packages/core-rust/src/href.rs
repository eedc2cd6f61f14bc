//! URI-style addressing and its decomposition into `(type, id?, relationship?)`.
//!
//! Recognised paths, relative to an optional base path such as `/api/v1`:
//!
//! - `/{type}`
//! - `/{type}/{id}`
//! - `/{type}/{id}/{relationship}`
//! - `/{type}/{id}/relationships/{relationship}`
//!
//! Absolute URLs are accepted; only their path is inspected.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ValueError};
use crate::reference::Ref;
use crate::schema::SchemaContainer;
use crate::values::{ResourceId, ResourceType};

const RELATIONSHIPS_SEGMENT: &str = "relationships";

// ---------------------------------------------------------------------------
// Href
// ---------------------------------------------------------------------------

/// Non-empty URI string as supplied by the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Href(String);

impl Href {
    /// # Errors
    ///
    /// Returns `ValueError::EmptyHref` if the value is blank.
    pub fn new(value: impl Into<String>) -> Result<Self, ValueError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ValueError::EmptyHref);
        }
        Ok(Self(value))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path component without scheme, authority, query string or fragment.
    #[must_use]
    pub fn path(&self) -> &str {
        let mut rest = self.0.as_str();
        if let Some(scheme_end) = rest.find("://") {
            let after_scheme = &rest[scheme_end + 3..];
            rest = after_scheme
                .find('/')
                .map_or("/", |slash| &after_scheme[slash..]);
        }
        rest.split(['?', '#']).next().unwrap_or_default()
    }
}

impl fmt::Display for Href {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Href {
    type Error = ValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Href> for String {
    fn from(value: Href) -> Self {
        value.0
    }
}

// ---------------------------------------------------------------------------
// ParsedHref
// ---------------------------------------------------------------------------

/// An [`Href`] resolved against the schema.
///
/// Serializes back to the original href string.
///
/// # Invariants
/// - `relationship` requires `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHref {
    href: Href,
    resource_type: ResourceType,
    id: Option<ResourceId>,
    relationship: Option<String>,
}

impl ParsedHref {
    /// # Errors
    ///
    /// Returns `ValueError::RelationshipWithoutId` if a relationship is given
    /// without an id, or `ValueError::BlankRelationship` for a blank name.
    pub fn new(
        href: Href,
        resource_type: ResourceType,
        id: Option<ResourceId>,
        relationship: Option<String>,
    ) -> Result<Self, ValueError> {
        if let Some(name) = &relationship {
            if name.trim().is_empty() {
                return Err(ValueError::BlankRelationship);
            }
            if id.is_none() {
                return Err(ValueError::RelationshipWithoutId {
                    href: href.to_string(),
                });
            }
        }
        Ok(Self {
            href,
            resource_type,
            id,
            relationship,
        })
    }

    #[must_use]
    pub fn href(&self) -> &Href {
        &self.href
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
    pub fn relationship(&self) -> Option<&str> {
        self.relationship.as_deref()
    }

    /// Normalized ref view. `None` for collection hrefs, which address no resource.
    #[must_use]
    pub fn to_ref(&self) -> Option<Ref> {
        let id = self.id.clone()?;
        let reference = Ref::new(self.resource_type.clone(), id);
        match &self.relationship {
            // Blank names are rejected at construction.
            Some(name) => reference.with_relationship(name.clone()).ok(),
            None => Some(reference),
        }
    }
}

impl Serialize for ParsedHref {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.href.serialize(serializer)
    }
}

// ---------------------------------------------------------------------------
// HrefParser
// ---------------------------------------------------------------------------

/// Decomposes hrefs using the schema's URI types, id patterns and
/// relationship URI names.
pub struct HrefParser<'a> {
    schemas: &'a dyn SchemaContainer,
    base_path: &'a str,
}

impl<'a> HrefParser<'a> {
    #[must_use]
    pub fn new(schemas: &'a dyn SchemaContainer) -> Self {
        Self {
            schemas,
            base_path: "",
        }
    }

    /// Strips `base_path` (e.g. `/api/v1`) from paths before decomposition.
    #[must_use]
    pub fn with_base_path(mut self, base_path: &'a str) -> Self {
        self.base_path = base_path.trim_end_matches('/');
        self
    }

    /// Resolves an href into type, id and relationship.
    ///
    /// # Errors
    ///
    /// - `ParseError::UnresolvableHref` if the path has no recognisable shape
    /// - `ParseError::UnknownResourceType` for an unknown type segment
    /// - `ParseError::IdPatternMismatch` if the id segment fails the schema pattern
    /// - `ParseError::UnknownRelationship` for an unknown relationship segment
    /// - `ParseError::Value(RelationshipWithoutId)` for `/{type}/relationships/{field}`
    pub fn parse(&self, href: &Href) -> Result<ParsedHref, ParseError> {
        let unresolvable = || ParseError::UnresolvableHref {
            href: href.to_string(),
        };

        let path = self.strip_base(href.path()).ok_or_else(unresolvable)?;
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
        let segments: Vec<&str> = trimmed.split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(unresolvable());
        }

        let (uri_type, rest) = segments.split_first().ok_or_else(unresolvable)?;
        let schema = self.schemas.schema_for_uri_type(uri_type).ok_or_else(|| {
            ParseError::UnknownResourceType {
                segment: (*uri_type).to_string(),
            }
        })?;

        let (id_segment, relationship_segment) = match rest {
            [] => (None, None),
            [id] => (Some(*id), None),
            [RELATIONSHIPS_SEGMENT, _] => {
                return Err(ValueError::RelationshipWithoutId {
                    href: href.to_string(),
                }
                .into())
            }
            [id, relationship] | [id, RELATIONSHIPS_SEGMENT, relationship] => {
                (Some(*id), Some(*relationship))
            }
            _ => return Err(unresolvable()),
        };

        let id = id_segment
            .map(|segment| {
                let id = ResourceId::new(segment)?;
                if id.matches(&schema.id_pattern) {
                    Ok(id)
                } else {
                    Err(ParseError::IdPatternMismatch {
                        resource_type: schema.resource_type.to_string(),
                        id: segment.to_string(),
                    })
                }
            })
            .transpose()?;

        let relationship = relationship_segment
            .map(|segment| {
                schema
                    .relationship_by_uri(segment)
                    .map(|relation| relation.name.clone())
                    .ok_or_else(|| ParseError::UnknownRelationship {
                        resource_type: schema.resource_type.to_string(),
                        field: segment.to_string(),
                    })
            })
            .transpose()?;

        Ok(ParsedHref::new(
            href.clone(),
            schema.resource_type.clone(),
            id,
            relationship,
        )?)
    }

    fn strip_base<'p>(&self, path: &'p str) -> Option<&'p str> {
        if self.base_path.is_empty() {
            return Some(path);
        }
        let rest = path.strip_prefix(self.base_path)?;
        (rest.is_empty() || rest.starts_with('/')).then_some(rest)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
