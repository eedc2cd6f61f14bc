//! Error types for value construction and operation parsing.
//!
//! Both enums describe malformed input: the request could not be turned into
//! typed values at all. They never represent domain failures such as a denied
//! authorization or a failed validation.

/// A value type invariant was violated during construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    #[error("resource type must be a non-empty string")]
    EmptyType,
    #[error("resource id must be a non-empty string")]
    EmptyId,
    #[error("href must be a non-empty string")]
    EmptyHref,
    #[error("resource identifier for type {resource_type} must have an id or lid")]
    MissingIdentity { resource_type: String },
    #[error("ref for type {resource_type} must have exactly one of id or lid")]
    IdAndLid { resource_type: String },
    #[error("resource {resource_type}:{id} already has an id")]
    IdAlreadySet { resource_type: String, id: String },
    #[error("relationship name must be a non-empty string")]
    BlankRelationship,
    #[error("href {href} addresses a relationship without a resource id")]
    RelationshipWithoutId { href: String },
}

/// An operation document could not be parsed into a typed [`Operation`].
///
/// [`Operation`]: crate::operation::Operation
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("operation must have a valid op code")]
    InvalidOpCode,
    #[error("operation must be a JSON object")]
    NotAnObject,
    #[error("operation cannot have both a ref and an href")]
    AmbiguousTarget,
    #[error("{op} operation must have a ref or href")]
    MissingTarget { op: &'static str },
    #[error("{op} operation must have data")]
    MissingData { op: &'static str },
    #[error("add operation cannot target an existing resource ({target})")]
    AddressedCreate { target: String },
    #[error("{target} does not address a single resource")]
    NotAResource { target: String },
    #[error("operation member {member} is malformed: {source}")]
    Malformed {
        member: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown resource type in {segment}")]
    UnknownResourceType { segment: String },
    #[error("id {id} does not match the id pattern of {resource_type}")]
    IdPatternMismatch { resource_type: String, id: String },
    #[error("resource type {resource_type} has no relationship {field}")]
    UnknownRelationship { resource_type: String, field: String },
    #[error("to-one relationship {field} only accepts the update op code")]
    InvalidToOneOpCode { field: String },
    #[error("href {href} cannot be resolved to a resource path")]
    UnresolvableHref { href: String },
    #[error("operation batch must contain at least one operation")]
    EmptyBatch,
    #[error("operation {index}: {source}")]
    AtOperation {
        index: usize,
        #[source]
        source: Box<ParseError>,
    },
    #[error(transparent)]
    Value(#[from] ValueError),
}

impl ParseError {
    /// Attaches the position of a failing operation inside a batch.
    #[must_use]
    pub fn at(self, index: usize) -> Self {
        Self::AtOperation {
            index,
            source: Box::new(self),
        }
    }
}

/// A schema document could not be turned into a schema container.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("invalid id pattern {pattern}: {source}")]
    InvalidIdPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error(transparent)]
    Value(#[from] ValueError),
}
