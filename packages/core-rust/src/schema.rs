//! Schema container: resource types, id patterns and relationship metadata.
//!
//! The parser and href resolver never guess the shape of a relationship from
//! the request payload; they ask the schema. [`SchemaContainer`] is the
//! collaborator contract, [`Schemas`] an in-memory implementation that can be
//! built in code or loaded from a [`SchemaConfig`] document.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::values::ResourceType;

/// Hyphenated 8-4-4-4-12 hex groups.
fn is_uuid(value: &str) -> bool {
    value.len() == 36
        && value.char_indices().all(|(i, c)| match i {
            8 | 13 | 18 | 23 => c == '-',
            _ => c.is_ascii_hexdigit(),
        })
}

// Crockford base32, first character limited to 0-7 so the value fits 128 bits.
fn is_ulid(value: &str) -> bool {
    const ALPHABET: &str = "0123456789ABCDEFGHJKMNPQRSTVWXYZ";
    value.len() == 26
        && value.starts_with(|c: char| ('0'..='7').contains(&c))
        && value.chars().all(|c| ALPHABET.contains(c.to_ascii_uppercase()))
}

// ---------------------------------------------------------------------------
// IdPattern
// ---------------------------------------------------------------------------

/// Shape a resource id must have to be recognised in a URI segment.
#[derive(Debug, Clone, Default)]
pub enum IdPattern {
    /// Any non-empty segment.
    #[default]
    Any,
    /// ASCII digits only.
    Numeric,
    /// Hyphenated UUID, either case.
    Uuid,
    /// 26 character Crockford base32 ULID.
    Ulid,
    /// Schema-supplied expression, matched against the whole segment.
    Custom(Regex),
}

impl IdPattern {
    /// Builds a custom pattern anchored to the whole value.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::InvalidIdPattern` if the expression does not compile.
    pub fn custom(expression: &str) -> Result<Self, SchemaError> {
        Regex::new(&format!("^(?:{expression})$"))
            .map(Self::Custom)
            .map_err(|source| SchemaError::InvalidIdPattern {
                pattern: expression.to_string(),
                source,
            })
    }

    #[must_use]
    pub fn is_match(&self, value: &str) -> bool {
        if value.is_empty() {
            return false;
        }
        match self {
            Self::Any => true,
            Self::Numeric => value.bytes().all(|b| b.is_ascii_digit()),
            Self::Uuid => is_uuid(value),
            Self::Ulid => is_ulid(value),
            Self::Custom(regex) => regex.is_match(value),
        }
    }
}

// ---------------------------------------------------------------------------
// RelationDef / ResourceSchema
// ---------------------------------------------------------------------------

/// A relationship field declared on a resource schema.
#[derive(Debug, Clone)]
pub struct RelationDef {
    /// Canonical field name, e.g. `"author"`.
    pub name: String,
    /// Name used in URIs, e.g. `"blog-author"`. Defaults to `name`.
    pub uri_name: String,
    /// Whether the relationship holds many identifiers.
    pub to_many: bool,
    /// Resource types allowed on the other side of the relationship.
    pub inverse_types: Vec<ResourceType>,
}

impl RelationDef {
    #[must_use]
    pub fn to_one(name: &str, inverse: ResourceType) -> Self {
        Self {
            name: name.to_string(),
            uri_name: name.to_string(),
            to_many: false,
            inverse_types: vec![inverse],
        }
    }

    #[must_use]
    pub fn to_many(name: &str, inverse: ResourceType) -> Self {
        Self {
            name: name.to_string(),
            uri_name: name.to_string(),
            to_many: true,
            inverse_types: vec![inverse],
        }
    }

    /// Returns a copy addressed by a different URI segment.
    #[must_use]
    pub fn with_uri_name(mut self, uri_name: &str) -> Self {
        self.uri_name = uri_name.to_string();
        self
    }

    /// Returns a copy that also accepts another inverse type (polymorphic).
    #[must_use]
    pub fn also_accepts(mut self, inverse: ResourceType) -> Self {
        self.inverse_types.push(inverse);
        self
    }

    /// Whether an identifier of the given type may appear in this relationship.
    #[must_use]
    pub fn accepts(&self, resource_type: &ResourceType) -> bool {
        self.inverse_types.contains(resource_type)
    }
}

/// Schema of one resource type.
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: ResourceType,
    /// Type segment used in URIs. Defaults to the canonical type.
    pub uri_type: String,
    pub id_pattern: IdPattern,
    pub relationships: Vec<RelationDef>,
}

impl ResourceSchema {
    #[must_use]
    pub fn new(resource_type: ResourceType) -> Self {
        Self {
            uri_type: resource_type.to_string(),
            resource_type,
            id_pattern: IdPattern::Any,
            relationships: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_uri_type(mut self, uri_type: &str) -> Self {
        self.uri_type = uri_type.to_string();
        self
    }

    #[must_use]
    pub fn with_id_pattern(mut self, pattern: IdPattern) -> Self {
        self.id_pattern = pattern;
        self
    }

    #[must_use]
    pub fn with_relationship(mut self, relation: RelationDef) -> Self {
        self.relationships.push(relation);
        self
    }

    #[must_use]
    pub fn relationship(&self, name: &str) -> Option<&RelationDef> {
        self.relationships.iter().find(|r| r.name == name)
    }

    #[must_use]
    pub fn relationship_by_uri(&self, uri_name: &str) -> Option<&RelationDef> {
        self.relationships.iter().find(|r| r.uri_name == uri_name)
    }
}

// ---------------------------------------------------------------------------
// SchemaContainer
// ---------------------------------------------------------------------------

/// Read access to the resource schemas of an API.
pub trait SchemaContainer: Send + Sync {
    /// Schema for a canonical resource type.
    fn schema_for(&self, resource_type: &ResourceType) -> Option<&ResourceSchema>;

    /// Schema for a URI-facing type segment.
    fn schema_for_uri_type(&self, uri_type: &str) -> Option<&ResourceSchema>;

    fn exists(&self, resource_type: &ResourceType) -> bool {
        self.schema_for(resource_type).is_some()
    }

    fn relationship(&self, resource_type: &ResourceType, field: &str) -> Option<&RelationDef> {
        self.schema_for(resource_type)
            .and_then(|schema| schema.relationship(field))
    }
}

/// In-memory [`SchemaContainer`].
#[derive(Debug, Clone, Default)]
pub struct Schemas {
    by_type: HashMap<ResourceType, ResourceSchema>,
    by_uri_type: HashMap<String, ResourceType>,
}

impl Schemas {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema, replacing any previous schema for the same type.
    #[must_use]
    pub fn with(mut self, schema: ResourceSchema) -> Self {
        self.register(schema);
        self
    }

    pub fn register(&mut self, schema: ResourceSchema) {
        self.by_uri_type
            .insert(schema.uri_type.clone(), schema.resource_type.clone());
        self.by_type.insert(schema.resource_type.clone(), schema);
    }

    /// Builds a container from a configuration document.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` if a type name is blank or an id pattern is invalid.
    pub fn from_config(config: &SchemaConfig) -> Result<Self, SchemaError> {
        let mut schemas = Self::new();
        for resource in &config.resources {
            schemas.register(resource.to_schema()?);
        }
        Ok(schemas)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

impl SchemaContainer for Schemas {
    fn schema_for(&self, resource_type: &ResourceType) -> Option<&ResourceSchema> {
        self.by_type.get(resource_type)
    }

    fn schema_for_uri_type(&self, uri_type: &str) -> Option<&ResourceSchema> {
        self.by_uri_type
            .get(uri_type)
            .and_then(|resource_type| self.by_type.get(resource_type))
    }
}

// ---------------------------------------------------------------------------
// SchemaConfig
// ---------------------------------------------------------------------------

/// Serialized schema document, e.g. loaded from `schema.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaConfig {
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

/// Named id shapes accepted in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdKind {
    #[default]
    Any,
    Numeric,
    Uuid,
    Ulid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceConfig {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub uri_type: Option<String>,
    #[serde(default)]
    pub id: IdKind,
    /// Custom id expression; takes precedence over `id`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id_pattern: Option<String>,
    #[serde(default)]
    pub relationships: Vec<RelationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationConfig {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub uri_name: Option<String>,
    #[serde(default)]
    pub to_many: bool,
    pub inverse: Vec<String>,
}

impl ResourceConfig {
    fn to_schema(&self) -> Result<ResourceSchema, SchemaError> {
        let resource_type = ResourceType::new(self.resource_type.as_str())?;
        let id_pattern = match (&self.id_pattern, self.id) {
            (Some(expression), _) => IdPattern::custom(expression)?,
            (None, IdKind::Any) => IdPattern::Any,
            (None, IdKind::Numeric) => IdPattern::Numeric,
            (None, IdKind::Uuid) => IdPattern::Uuid,
            (None, IdKind::Ulid) => IdPattern::Ulid,
        };

        let mut schema = ResourceSchema::new(resource_type).with_id_pattern(id_pattern);
        if let Some(uri_type) = &self.uri_type {
            schema = schema.with_uri_type(uri_type);
        }
        for relation in &self.relationships {
            let inverse_types = relation
                .inverse
                .iter()
                .map(|t| ResourceType::new(t.as_str()))
                .collect::<Result<Vec<_>, _>>()?;
            schema = schema.with_relationship(RelationDef {
                name: relation.name.clone(),
                uri_name: relation
                    .uri_name
                    .clone()
                    .unwrap_or_else(|| relation.name.clone()),
                to_many: relation.to_many,
                inverse_types,
            });
        }
        Ok(schema)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn rt(value: &str) -> ResourceType {
        ResourceType::new(value).unwrap()
    }

    #[test]
    fn id_patterns_match_expected_shapes() {
        assert!(IdPattern::Numeric.is_match("42"));
        assert!(!IdPattern::Numeric.is_match("4a"));
        assert!(IdPattern::Uuid.is_match("8a3b1c6e-7f62-4b8e-9d4c-2e1f0a9b8c7d"));
        assert!(!IdPattern::Uuid.is_match("123"));
        assert!(IdPattern::Ulid.is_match("01ARZ3NDEKTSV4RRFFQ69G5FAV"));
        assert!(!IdPattern::Ulid.is_match("81ARZ3NDEKTSV4RRFFQ69G5FAV"));
        assert!(IdPattern::Any.is_match("anything"));
        assert!(!IdPattern::Any.is_match(""));
    }

    #[test]
    fn custom_pattern_is_anchored() {
        let pattern = IdPattern::custom("[a-z]+").unwrap();
        assert!(pattern.is_match("abc"));
        assert!(!pattern.is_match("abc1"));
        assert!(IdPattern::custom("(").is_err());
    }

    #[test]
    fn container_resolves_uri_types_and_relationships() {
        let schemas = Schemas::new().with(
            ResourceSchema::new(rt("blogPosts"))
                .with_uri_type("blog-posts")
                .with_relationship(RelationDef::to_many("tags", rt("tags")))
                .with_relationship(
                    RelationDef::to_one("author", rt("users")).with_uri_name("written-by"),
                ),
        );

        let schema = schemas.schema_for_uri_type("blog-posts").unwrap();
        assert_eq!(schema.resource_type, "blogPosts");
        assert!(schema.relationship("tags").unwrap().to_many);
        assert_eq!(schema.relationship_by_uri("written-by").unwrap().name, "author");
        assert!(schemas.relationship(&rt("blogPosts"), "author").is_some());
        assert!(!schemas.exists(&rt("comments")));
    }

    #[test]
    fn schemas_load_from_config_document() {
        let config: SchemaConfig = serde_json::from_value(json!({
            "resources": [
                {
                    "type": "posts",
                    "id": "numeric",
                    "relationships": [
                        {"name": "tags", "toMany": true, "inverse": ["tags"]},
                        {"name": "author", "inverse": ["users"]}
                    ]
                },
                {"type": "tags", "idPattern": "[a-z-]+"}
            ]
        }))
        .unwrap();

        let schemas = Schemas::from_config(&config).unwrap();
        assert_eq!(schemas.len(), 2);
        let posts = schemas.schema_for(&rt("posts")).unwrap();
        assert!(posts.id_pattern.is_match("7"));
        assert!(!posts.relationship("author").unwrap().to_many);
        let tags = schemas.schema_for_uri_type("tags").unwrap();
        assert!(tags.id_pattern.is_match("rust-lang"));
    }

    #[test]
    fn config_with_blank_type_is_rejected() {
        let config: SchemaConfig =
            serde_json::from_value(json!({"resources": [{"type": " "}]})).unwrap();
        assert!(Schemas::from_config(&config).is_err());
    }
}
