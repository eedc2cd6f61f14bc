//! Operation parsing: converts raw operation documents into typed [`Operation`] values.
//!
//! Variant selection uses the `op` code, the presence of relationship
//! context and the schema's relationship metadata. The shape of `data` never
//! decides between to-one and to-many.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{ParseError, ValueError};
use crate::href::{Href, HrefParser, ParsedHref};
use crate::operation::{Create, Delete, OpCode, Operation, Target, Update, UpdateToMany, UpdateToOne};
use crate::reference::Ref;
use crate::resource::ResourceObject;
use crate::schema::SchemaContainer;
use crate::values::{ListOfResourceIdentifiers, ResourceIdentifier, ResourceType};

/// Member holding the operation list in an atomic batch document.
pub const ATOMIC_OPERATIONS: &str = "atomic:operations";

/// Target as read from the document, before variant selection.
enum RawTarget {
    Ref(Ref),
    Href(ParsedHref),
}

impl RawTarget {
    fn resource_type(&self) -> &ResourceType {
        match self {
            Self::Ref(reference) => reference.resource_type(),
            Self::Href(href) => href.resource_type(),
        }
    }

    fn relationship(&self) -> Option<&str> {
        match self {
            Self::Ref(reference) => reference.relationship(),
            Self::Href(href) => href.relationship(),
        }
    }

    fn into_target(self) -> Option<Target> {
        match self {
            Self::Ref(reference) => Some(Target::from_ref(reference)),
            Self::Href(href) => Target::from_href(href),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Ref(reference) => format!("ref {}", reference.resource_type()),
            Self::Href(href) => format!("href {}", href.href()),
        }
    }
}

// ---------------------------------------------------------------------------
// OperationParser
// ---------------------------------------------------------------------------

/// Parses operation documents against a schema container.
pub struct OperationParser<'a> {
    schemas: &'a dyn SchemaContainer,
    base_path: &'a str,
}

impl<'a> OperationParser<'a> {
    #[must_use]
    pub fn new(schemas: &'a dyn SchemaContainer) -> Self {
        Self {
            schemas,
            base_path: "",
        }
    }

    /// Base path stripped from hrefs, e.g. `/api/v1`.
    #[must_use]
    pub fn with_base_path(mut self, base_path: &'a str) -> Self {
        self.base_path = base_path;
        self
    }

    /// Parse one operation object.
    ///
    /// # Errors
    ///
    /// Returns `ParseError` when the document cannot be turned into an
    /// operation: missing or unknown `op`, both `ref` and `href`, a missing
    /// target or `data`, an unknown type or relationship, or a malformed member.
    pub fn parse(&self, value: &Value) -> Result<Operation, ParseError> {
        let object = value.as_object().ok_or(ParseError::NotAnObject)?;
        let op = object
            .get("op")
            .and_then(Value::as_str)
            .and_then(OpCode::from_wire)
            .ok_or(ParseError::InvalidOpCode)?;

        let meta = match object.get("meta") {
            Some(meta) => decode::<Map<String, Value>>("meta", meta)?,
            None => Map::new(),
        };
        let target = self.target(object)?;

        if let Some(target) = &target {
            if !self.schemas.exists(target.resource_type()) {
                return Err(ParseError::UnknownResourceType {
                    segment: target.resource_type().to_string(),
                });
            }
        }

        let operation = match (op, target) {
            (_, Some(target)) if target.relationship().is_some() => {
                self.relationship_operation(op, target, object.get("data"), meta)?
            }
            (OpCode::Add, target) => self.create(target, object.get("data"), meta)?,
            (OpCode::Update, target) => self.update(target, object.get("data"), meta)?,
            (OpCode::Remove, target) => Self::delete(target, meta)?,
        };

        tracing::trace!(kind = operation.kind(), "parsed operation");
        Ok(operation)
    }

    /// Parse an atomic batch: `{"atomic:operations": [...]}` or a bare array.
    ///
    /// Operations are returned in request order.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::EmptyBatch` for an empty list,
    /// `ParseError::NotAnObject` when no operation list is present, and
    /// `ParseError::AtOperation` wrapping the first failing operation.
    pub fn parse_batch(&self, value: &Value) -> Result<Vec<Operation>, ParseError> {
        let operations = match value {
            Value::Array(items) => items,
            Value::Object(object) => object
                .get(ATOMIC_OPERATIONS)
                .and_then(Value::as_array)
                .ok_or(ParseError::NotAnObject)?,
            _ => return Err(ParseError::NotAnObject),
        };

        if operations.is_empty() {
            return Err(ParseError::EmptyBatch);
        }

        operations
            .iter()
            .enumerate()
            .map(|(index, operation)| self.parse(operation).map_err(|e| e.at(index)))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Target resolution
    // -----------------------------------------------------------------------

    fn target(&self, object: &Map<String, Value>) -> Result<Option<RawTarget>, ParseError> {
        match (object.get("ref"), object.get("href")) {
            (Some(_), Some(_)) => Err(ParseError::AmbiguousTarget),
            (Some(reference), None) => Ok(Some(RawTarget::Ref(decode("ref", reference)?))),
            (None, Some(href)) => {
                let href: Href = decode("href", href)?;
                let parsed = HrefParser::new(self.schemas)
                    .with_base_path(self.base_path)
                    .parse(&href)?;
                Ok(Some(RawTarget::Href(parsed)))
            }
            (None, None) => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Variants
    // -----------------------------------------------------------------------

    fn create(
        &self,
        target: Option<RawTarget>,
        data: Option<&Value>,
        meta: Map<String, Value>,
    ) -> Result<Operation, ParseError> {
        let href = match target {
            None => None,
            Some(RawTarget::Href(href)) if href.id().is_none() => Some(href),
            Some(other) => {
                return Err(ParseError::AddressedCreate {
                    target: other.describe(),
                })
            }
        };

        let data: ResourceObject = decode("data", data.ok_or(ParseError::MissingData { op: "add" })?)?;
        self.ensure_known(data.resource_type())?;

        Ok(Operation::Create(Create { href, data, meta }))
    }

    fn update(
        &self,
        target: Option<RawTarget>,
        data: Option<&Value>,
        meta: Map<String, Value>,
    ) -> Result<Operation, ParseError> {
        let target = match target {
            None => None,
            Some(raw) => {
                let described = raw.describe();
                Some(raw.into_target().ok_or(ParseError::NotAResource { target: described })?)
            }
        };

        let data: ResourceObject =
            decode("data", data.ok_or(ParseError::MissingData { op: "update" })?)?;
        self.ensure_known(data.resource_type())?;
        if !data.has_identity() {
            return Err(ValueError::MissingIdentity {
                resource_type: data.resource_type().to_string(),
            }
            .into());
        }

        Ok(Operation::Update(Update { target, data, meta }))
    }

    fn delete(target: Option<RawTarget>, meta: Map<String, Value>) -> Result<Operation, ParseError> {
        let raw = target.ok_or(ParseError::MissingTarget { op: "remove" })?;
        let described = raw.describe();
        let target = raw
            .into_target()
            .ok_or(ParseError::NotAResource { target: described })?;

        Ok(Operation::Delete(Delete { target, meta }))
    }

    fn relationship_operation(
        &self,
        op: OpCode,
        raw: RawTarget,
        data: Option<&Value>,
        meta: Map<String, Value>,
    ) -> Result<Operation, ParseError> {
        let resource_type = raw.resource_type().clone();
        let field = raw.relationship().unwrap_or_default().to_string();
        let relation = self
            .schemas
            .relationship(&resource_type, &field)
            .ok_or_else(|| ParseError::UnknownRelationship {
                resource_type: resource_type.to_string(),
                field: field.clone(),
            })?;

        let described = raw.describe();
        let target = raw
            .into_target()
            .ok_or(ParseError::NotAResource { target: described })?;
        let data = data.ok_or(ParseError::MissingData { op: op.as_str() })?;

        if relation.to_many {
            let data: ListOfResourceIdentifiers = decode("data", data)?;
            return Ok(Operation::UpdateToMany(UpdateToMany {
                op,
                target,
                data,
                meta,
            }));
        }

        if op != OpCode::Update {
            return Err(ParseError::InvalidToOneOpCode { field });
        }
        let data: Option<ResourceIdentifier> = decode("data", data)?;
        Ok(Operation::UpdateToOne(UpdateToOne { target, data, meta }))
    }

    fn ensure_known(&self, resource_type: &ResourceType) -> Result<(), ParseError> {
        if self.schemas.exists(resource_type) {
            Ok(())
        } else {
            Err(ParseError::UnknownResourceType {
                segment: resource_type.to_string(),
            })
        }
    }
}

fn decode<T: DeserializeOwned>(member: &'static str, value: &Value) -> Result<T, ParseError> {
    T::deserialize(value).map_err(|source| ParseError::Malformed { member, source })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::schema::{IdPattern, RelationDef, ResourceSchema, Schemas};

    fn rt(value: &str) -> ResourceType {
        ResourceType::new(value).unwrap()
    }

    fn schemas() -> Schemas {
        Schemas::new()
            .with(
                ResourceSchema::new(rt("posts"))
                    .with_id_pattern(IdPattern::Numeric)
                    .with_relationship(RelationDef::to_many("tags", rt("tags")))
                    .with_relationship(RelationDef::to_one("author", rt("users"))),
            )
            .with(ResourceSchema::new(rt("tags")))
            .with(ResourceSchema::new(rt("users")))
    }

    fn parse(value: &Value) -> Result<Operation, ParseError> {
        let schemas = schemas();
        OperationParser::new(&schemas).parse(value)
    }

    fn assert_round_trip(value: &Value) {
        let op = parse(value).unwrap();
        assert_eq!(&serde_json::to_value(&op).unwrap(), value);
    }

    // ---- scenarios ----

    #[test]
    fn parses_create_with_collection_href() {
        let value = json!({
            "op": "add",
            "href": "/posts",
            "data": {"type": "posts", "attributes": {"title": "Hello World!"}}
        });
        let Operation::Create(create) = parse(&value).unwrap() else {
            panic!("expected create");
        };
        assert_eq!(create.href.as_ref().unwrap().href().as_str(), "/posts");
        assert_eq!(create.data.attributes()["title"], json!("Hello World!"));
        assert_round_trip(&value);
    }

    #[test]
    fn create_has_no_target_ref() {
        let op = parse(&json!({
            "op": "add",
            "href": "/posts",
            "data": {"type": "posts", "attributes": {"title": "Hello World!"}}
        }))
        .unwrap();
        assert!(op.target_ref().is_none());
    }

    #[test]
    fn parses_delete_with_ref() {
        let value = json!({"op": "remove", "ref": {"type": "posts", "id": "123"}});
        let Operation::Delete(delete) = parse(&value).unwrap() else {
            panic!("expected delete");
        };
        assert_eq!(delete.target.reference(), &Ref::new(rt("posts"), "123".try_into().unwrap()));
        assert_round_trip(&value);
    }

    #[test]
    fn parses_empty_to_many_update_as_clear() {
        let value = json!({"op": "update", "href": "/posts/123/relationships/tags", "data": []});
        let Operation::UpdateToMany(op) = parse(&value).unwrap() else {
            panic!("expected to-many update");
        };
        assert_eq!(op.op, OpCode::Update);
        assert!(op.data.is_empty());
        assert_round_trip(&value);
    }

    #[test]
    fn rejects_invalid_op_code() {
        let err = parse(&json!({"op": "blah!"})).unwrap_err();
        assert!(matches!(err, ParseError::InvalidOpCode));
        assert_eq!(err.to_string(), "operation must have a valid op code");

        assert!(matches!(
            parse(&json!({"ref": {"type": "posts", "id": "1"}})),
            Err(ParseError::InvalidOpCode)
        ));
        assert!(matches!(parse(&json!("add")), Err(ParseError::NotAnObject)));
    }

    // ---- to-one vs to-many dispatch ----

    #[test]
    fn dispatches_on_declared_relationship_kind() {
        for op in ["add", "update", "remove"] {
            let parsed = parse(&json!({
                "op": op,
                "ref": {"type": "posts", "id": "1", "relationship": "tags"},
                "data": [{"type": "tags", "id": "2"}]
            }))
            .unwrap();
            assert!(
                matches!(&parsed, Operation::UpdateToMany(m) if m.op.as_str() == op),
                "op {op} should parse as to-many"
            );
        }

        for data in [json!(null), json!({"type": "users", "id": "9"})] {
            let parsed = parse(&json!({
                "op": "update",
                "ref": {"type": "posts", "id": "1", "relationship": "author"},
                "data": data
            }))
            .unwrap();
            assert!(matches!(parsed, Operation::UpdateToOne(_)));
        }
    }

    #[test]
    fn to_one_rejects_add_and_remove() {
        let err = parse(&json!({
            "op": "add",
            "ref": {"type": "posts", "id": "1", "relationship": "author"},
            "data": {"type": "users", "id": "9"}
        }))
        .unwrap_err();
        assert!(matches!(err, ParseError::InvalidToOneOpCode { .. }));
    }

    #[test]
    fn payload_shape_does_not_override_schema() {
        let err = parse(&json!({
            "op": "update",
            "ref": {"type": "posts", "id": "1", "relationship": "author"},
            "data": []
        }))
        .unwrap_err();
        assert!(matches!(err, ParseError::Malformed { member: "data", .. }));
    }

    // ---- structural errors ----

    #[test]
    fn rejects_both_ref_and_href() {
        let err = parse(&json!({
            "op": "remove",
            "ref": {"type": "posts", "id": "1"},
            "href": "/posts/1"
        }))
        .unwrap_err();
        assert!(matches!(err, ParseError::AmbiguousTarget));
    }

    #[test]
    fn rejects_missing_target_and_data() {
        assert!(matches!(
            parse(&json!({"op": "remove"})),
            Err(ParseError::MissingTarget { op: "remove" })
        ));
        assert!(matches!(
            parse(&json!({"op": "remove", "href": "/posts"})),
            Err(ParseError::NotAResource { .. })
        ));
        assert!(matches!(
            parse(&json!({"op": "add", "href": "/posts"})),
            Err(ParseError::MissingData { op: "add" })
        ));
        assert!(matches!(
            parse(&json!({"op": "update", "href": "/posts/1/relationships/tags"})),
            Err(ParseError::MissingData { op: "update" })
        ));
    }

    #[test]
    fn rejects_create_addressing_existing_resource() {
        let err = parse(&json!({
            "op": "add",
            "href": "/posts/1",
            "data": {"type": "posts"}
        }))
        .unwrap_err();
        assert!(matches!(err, ParseError::AddressedCreate { .. }));
    }

    #[test]
    fn update_data_requires_identity() {
        let err = parse(&json!({
            "op": "update",
            "data": {"type": "posts", "attributes": {"title": "x"}}
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            ParseError::Value(ValueError::MissingIdentity { .. })
        ));
    }

    #[test]
    fn rejects_unknown_types_and_relationships() {
        assert!(matches!(
            parse(&json!({"op": "remove", "ref": {"type": "comments", "id": "1"}})),
            Err(ParseError::UnknownResourceType { .. })
        ));
        assert!(matches!(
            parse(&json!({
                "op": "update",
                "ref": {"type": "posts", "id": "1", "relationship": "likes"},
                "data": []
            })),
            Err(ParseError::UnknownRelationship { .. })
        ));
        assert!(matches!(
            parse(&json!({"op": "add", "data": {"type": "comments"}})),
            Err(ParseError::UnknownResourceType { .. })
        ));
    }

    #[test]
    fn href_id_and_data_id_are_not_cross_checked() {
        let op = parse(&json!({
            "op": "update",
            "href": "/posts/1",
            "data": {"type": "posts", "id": "2"}
        }))
        .unwrap();
        assert_eq!(op.resource_id().unwrap(), "1");
    }

    // ---- batches ----

    #[test]
    fn parses_batch_in_request_order() {
        let schemas = schemas();
        let parser = OperationParser::new(&schemas);
        let ops = parser
            .parse_batch(&json!({
                "atomic:operations": [
                    {"op": "add", "data": {"type": "tags", "lid": "t1"}},
                    {"op": "update", "ref": {"type": "posts", "id": "1", "relationship": "tags"},
                     "data": [{"type": "tags", "lid": "t1"}]},
                    {"op": "remove", "ref": {"type": "posts", "id": "2"}}
                ]
            }))
            .unwrap();
        let kinds: Vec<_> = ops.iter().map(Operation::kind).collect();
        assert_eq!(kinds, ["create", "update_to_many", "delete"]);
    }

    #[test]
    fn batch_errors_carry_index() {
        let schemas = schemas();
        let parser = OperationParser::new(&schemas);
        let err = parser
            .parse_batch(&json!([
                {"op": "remove", "ref": {"type": "posts", "id": "1"}},
                {"op": "nope"}
            ]))
            .unwrap_err();
        assert!(matches!(err, ParseError::AtOperation { index: 1, .. }));
        assert!(matches!(parser.parse_batch(&json!([])), Err(ParseError::EmptyBatch)));
    }

    #[test]
    fn base_path_is_stripped_from_hrefs() {
        let schemas = schemas();
        let op = OperationParser::new(&schemas)
            .with_base_path("/api/v1")
            .parse(&json!({"op": "remove", "href": "/api/v1/posts/5"}))
            .unwrap();
        assert_eq!(op.resource_id().unwrap(), "5");
    }

    // ---- round-trip law ----

    #[test]
    fn round_trips_every_variant_in_both_forms() {
        let documents = [
            json!({"op": "add", "data": {"type": "posts", "lid": "a", "attributes": {"title": "x"}}}),
            json!({"op": "add", "href": "/posts", "data": {"type": "posts"}, "meta": {"m": 1}}),
            json!({"op": "update", "data": {"type": "posts", "id": "1", "attributes": {"n": 2}}}),
            json!({"op": "update", "href": "/posts/1", "data": {"type": "posts", "id": "1"}}),
            json!({"op": "update", "ref": {"type": "posts", "id": "1"},
                   "data": {"type": "posts", "id": "1",
                            "relationships": {"author": {"data": null}}}}),
            json!({"op": "remove", "href": "/posts/1"}),
            json!({"op": "remove", "ref": {"type": "posts", "lid": "tmp"}, "meta": {"why": "dup"}}),
            json!({"op": "update", "href": "/posts/1/relationships/author", "data": null}),
            json!({"op": "update", "ref": {"type": "posts", "id": "1", "relationship": "author"},
                   "data": {"type": "users", "id": "9", "meta": {"k": true}}}),
            json!({"op": "add", "ref": {"type": "posts", "id": "1", "relationship": "tags"},
                   "data": [{"type": "tags", "id": "1"}, {"type": "tags", "lid": "n"}]}),
            json!({"op": "remove", "href": "/posts/1/tags", "data": [{"type": "tags", "id": "1"}]}),
        ];
        for document in &documents {
            assert_round_trip(document);
        }
    }

    fn identifier_strategy() -> impl Strategy<Value = Value> {
        prop_oneof![
            "[a-z0-9]{1,8}".prop_map(|id| json!({"type": "tags", "id": id})),
            "[a-z0-9]{1,8}".prop_map(|lid| json!({"type": "tags", "lid": lid})),
        ]
    }

    fn addressing_strategy() -> impl Strategy<Value = (bool, u32)> {
        (any::<bool>(), 0u32..100_000)
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

        #[test]
        fn to_many_operations_round_trip(
            op in prop_oneof![Just("add"), Just("update"), Just("remove")],
            (use_href, id) in addressing_strategy(),
            data in proptest::collection::vec(identifier_strategy(), 0..5),
        ) {
            let mut document = json!({"op": op, "data": data});
            if use_href {
                document["href"] = json!(format!("/posts/{id}/relationships/tags"));
            } else {
                document["ref"] = json!({"type": "posts", "id": id.to_string(), "relationship": "tags"});
            }
            let parsed = parse(&document).unwrap();
            prop_assert!(matches!(parsed, Operation::UpdateToMany(_)));
            prop_assert_eq!(serde_json::to_value(&parsed).unwrap(), document);
        }

        #[test]
        fn resource_operations_round_trip(
            (use_href, id) in addressing_strategy(),
            title in "[ -~]{0,16}",
        ) {
            let mut document = json!({
                "op": "update",
                "data": {"type": "posts", "id": id.to_string(), "attributes": {"title": title}}
            });
            if use_href {
                document["href"] = json!(format!("/posts/{id}"));
            } else {
                document["ref"] = json!({"type": "posts", "id": id.to_string()});
            }
            let parsed = parse(&document).unwrap();
            prop_assert_eq!(serde_json::to_value(&parsed).unwrap(), document);
        }
    }
}
