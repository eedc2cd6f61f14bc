//! The five typed operation variants.
//!
//! [`Operation`] is a closed sum type. Each variant serializes back to the
//! wire shape it was parsed from: a target given as `href` is written back as
//! `href`, a target given as `ref` as `ref`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::href::ParsedHref;
use crate::reference::Ref;
use crate::resource::ResourceObject;
use crate::values::{ListOfResourceIdentifiers, ResourceId, ResourceIdentifier, ResourceType};

// ---------------------------------------------------------------------------
// OpCode
// ---------------------------------------------------------------------------

/// Value of the `op` member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpCode {
    Add,
    Update,
    Remove,
}

impl OpCode {
    /// Maps a wire value to an op code. Matching is exact.
    #[must_use]
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "add" => Some(Self::Add),
            "update" => Some(Self::Update),
            "remove" => Some(Self::Remove),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Remove => "remove",
        }
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// Resource-addressing target, remembering whether the client used `ref` or `href`.
///
/// `reference` is always populated so the pipeline never needs to know which
/// form was supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    reference: Ref,
    href: Option<ParsedHref>,
}

impl Target {
    #[must_use]
    pub fn from_ref(reference: Ref) -> Self {
        Self {
            reference,
            href: None,
        }
    }

    /// Builds a target from an href. `None` if the href addresses a collection.
    #[must_use]
    pub fn from_href(href: ParsedHref) -> Option<Self> {
        Some(Self {
            reference: href.to_ref()?,
            href: Some(href),
        })
    }

    #[must_use]
    pub fn reference(&self) -> &Ref {
        &self.reference
    }

    #[must_use]
    pub fn href(&self) -> Option<&ParsedHref> {
        self.href.as_ref()
    }

    #[must_use]
    pub fn resource_type(&self) -> &ResourceType {
        self.reference.resource_type()
    }

    #[must_use]
    pub fn relationship(&self) -> Option<&str> {
        self.reference.relationship()
    }
}

// ---------------------------------------------------------------------------
// Variants
// ---------------------------------------------------------------------------

/// `add` without relationship context.
///
/// `href` is the collection URI if the client sent one; it never addresses
/// an existing resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Create {
    pub href: Option<ParsedHref>,
    pub data: ResourceObject,
    pub meta: Map<String, Value>,
}

/// `update` without relationship context.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub target: Option<Target>,
    pub data: ResourceObject,
    pub meta: Map<String, Value>,
}

/// `remove` without relationship context.
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub target: Target,
    pub meta: Map<String, Value>,
}

/// `update` of a to-one relationship. `data: None` clears it.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateToOne {
    pub target: Target,
    pub data: Option<ResourceIdentifier>,
    pub meta: Map<String, Value>,
}

/// `add`, `update` or `remove` on a to-many relationship.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateToMany {
    pub op: OpCode,
    pub target: Target,
    pub data: ListOfResourceIdentifiers,
    pub meta: Map<String, Value>,
}

/// One typed unit of work.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Create(Create),
    Update(Update),
    Delete(Delete),
    UpdateToOne(UpdateToOne),
    UpdateToMany(UpdateToMany),
}

impl Operation {
    #[must_use]
    pub fn op_code(&self) -> OpCode {
        match self {
            Self::Create(_) => OpCode::Add,
            Self::Update(_) | Self::UpdateToOne(_) => OpCode::Update,
            Self::Delete(_) => OpCode::Remove,
            Self::UpdateToMany(op) => op.op,
        }
    }

    #[must_use]
    pub fn meta(&self) -> &Map<String, Value> {
        match self {
            Self::Create(op) => &op.meta,
            Self::Update(op) => &op.meta,
            Self::Delete(op) => &op.meta,
            Self::UpdateToOne(op) => &op.meta,
            Self::UpdateToMany(op) => &op.meta,
        }
    }

    /// Type of the resource the operation acts on.
    #[must_use]
    pub fn resource_type(&self) -> &ResourceType {
        match self {
            Self::Create(op) => op.data.resource_type(),
            Self::Update(op) => op
                .target
                .as_ref()
                .map_or_else(|| op.data.resource_type(), Target::resource_type),
            Self::Delete(op) => op.target.resource_type(),
            Self::UpdateToOne(op) => op.target.resource_type(),
            Self::UpdateToMany(op) => op.target.resource_type(),
        }
    }

    /// Normalized ref of the addressed resource or relationship.
    ///
    /// `None` for creates, and for updates addressed only through `data`.
    #[must_use]
    pub fn target_ref(&self) -> Option<&Ref> {
        match self {
            Self::Create(_) => None,
            Self::Update(op) => op.target.as_ref().map(Target::reference),
            Self::Delete(op) => Some(op.target.reference()),
            Self::UpdateToOne(op) => Some(op.target.reference()),
            Self::UpdateToMany(op) => Some(op.target.reference()),
        }
    }

    /// Id of the addressed resource: the target id, else `data.id`.
    #[must_use]
    pub fn resource_id(&self) -> Option<&ResourceId> {
        match self {
            Self::Create(op) => op.data.id(),
            Self::Update(op) => op
                .target
                .as_ref()
                .and_then(|t| t.reference().id())
                .or_else(|| op.data.id()),
            Self::Delete(op) => op.target.reference().id(),
            Self::UpdateToOne(op) => op.target.reference().id(),
            Self::UpdateToMany(op) => op.target.reference().id(),
        }
    }

    /// Relationship field for relationship operations.
    #[must_use]
    pub fn relationship(&self) -> Option<&str> {
        match self {
            Self::UpdateToOne(op) => op.target.relationship(),
            Self::UpdateToMany(op) => op.target.relationship(),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_relationship(&self) -> bool {
        matches!(self, Self::UpdateToOne(_) | Self::UpdateToMany(_))
    }

    /// The resource object for create and update operations.
    #[must_use]
    pub fn resource_object(&self) -> Option<&ResourceObject> {
        match self {
            Self::Create(op) => Some(&op.data),
            Self::Update(op) => Some(&op.data),
            _ => None,
        }
    }

    /// Short variant name for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::Update(_) => "update",
            Self::Delete(_) => "delete",
            Self::UpdateToOne(_) => "update_to_one",
            Self::UpdateToMany(_) => "update_to_many",
        }
    }
}

// ---------------------------------------------------------------------------
// Wire serialization
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(untagged)]
enum WireData<'a> {
    Absent,
    Resource(&'a ResourceObject),
    Identifier(Option<&'a ResourceIdentifier>),
    Identifiers(&'a ListOfResourceIdentifiers),
}

impl WireData<'_> {
    fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

#[derive(Serialize)]
struct WireOperation<'a> {
    op: OpCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    href: Option<&'a ParsedHref>,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    reference: Option<&'a Ref>,
    #[serde(skip_serializing_if = "WireData::is_absent")]
    data: WireData<'a>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    meta: &'a Map<String, Value>,
}

fn addressed(target: &Target) -> (Option<&ParsedHref>, Option<&Ref>) {
    match target.href() {
        Some(href) => (Some(href), None),
        None => (None, Some(target.reference())),
    }
}

impl Serialize for Operation {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let ((href, reference), data) = match self {
            Self::Create(op) => ((op.href.as_ref(), None), WireData::Resource(&op.data)),
            Self::Update(op) => (
                op.target.as_ref().map_or((None, None), addressed),
                WireData::Resource(&op.data),
            ),
            Self::Delete(op) => (addressed(&op.target), WireData::Absent),
            Self::UpdateToOne(op) => (
                addressed(&op.target),
                WireData::Identifier(op.data.as_ref()),
            ),
            Self::UpdateToMany(op) => (addressed(&op.target), WireData::Identifiers(&op.data)),
        };

        WireOperation {
            op: self.op_code(),
            href,
            reference,
            data,
            meta: self.meta(),
        }
        .serialize(serializer)
    }
}
