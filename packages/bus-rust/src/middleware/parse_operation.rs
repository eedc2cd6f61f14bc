//! Builds the command's [`Operation`] from the request document.

use std::sync::Arc;

use async_trait::async_trait;
use jsonapi_ops_core::{OperationParser, SchemaContainer};
use serde_json::{json, Map, Value};

use crate::command::{Command, CommandKind};
use crate::error::BusError;
use crate::outcome::Outcome;
use crate::pipeline::{Middleware, Next};

/// Parses the request body into an operation addressed at the command's
/// route. Commands that already carry an operation pass through untouched.
pub struct ParseOperation {
    schemas: Arc<dyn SchemaContainer>,
    base_path: String,
}

impl ParseOperation {
    #[must_use]
    pub fn new(schemas: Arc<dyn SchemaContainer>, base_path: impl Into<String>) -> Self {
        Self {
            schemas,
            base_path: base_path.into(),
        }
    }
}

/// The atomic-operation document equivalent to a single-resource request.
fn operation_document(command: &Command, body: &Value) -> Result<Value, BusError> {
    let op = match command.kind() {
        CommandKind::Store | CommandKind::AttachRelationship => "add",
        CommandKind::Update | CommandKind::UpdateRelationship => "update",
        CommandKind::DetachRelationship => "remove",
        CommandKind::Destroy => {
            return Err(BusError::contract("destroy commands carry no operation document"))
        }
    };

    let mut document = Map::new();
    document.insert("op".to_string(), json!(op));

    if command.kind() != CommandKind::Store {
        let id = command.id().ok_or_else(|| {
            BusError::contract(format!("{} command requires a resource id", command.kind()))
        })?;
        let mut reference = json!({"type": command.resource_type(), "id": id});
        if command.kind().is_relationship() {
            let field = command.field().ok_or_else(|| {
                BusError::contract(format!("{} command requires a relationship field", command.kind()))
            })?;
            reference["relationship"] = json!(field);
        }
        document.insert("ref".to_string(), reference);
    }
    if let Some(data) = body.get("data") {
        document.insert("data".to_string(), data.clone());
    }
    if let Some(meta @ Value::Object(_)) = body.get("meta") {
        document.insert("meta".to_string(), meta.clone());
    }
    Ok(Value::Object(document))
}

#[async_trait]
impl Middleware<Command> for ParseOperation {
    fn name(&self) -> &'static str {
        "parse-operation"
    }

    async fn handle(&self, command: Command, next: Next<'_, Command>) -> Result<Outcome, BusError> {
        if command.operation().is_some() {
            return next.run(command).await;
        }

        let body = command
            .request()
            .and_then(|request| request.body.as_ref())
            .ok_or_else(|| BusError::contract("command has neither an operation nor a request body"))?;
        let document = operation_document(&command, body)?;

        let operation = OperationParser::new(self.schemas.as_ref())
            .with_base_path(&self.base_path)
            .parse(&document)?;
        tracing::debug!(kind = operation.kind(), "request body parsed");

        next.run(command.with_operation(operation)).await
    }
}

#[cfg(test)]
mod tests {
    use jsonapi_ops_core::{Operation, ParseError};

    use super::*;
    use crate::context::RequestContext;
    use crate::pipeline::{Handler, Pipeline};
    use crate::testing::{rid, rt, schemas};

    struct Capture;

    #[async_trait]
    impl Handler<Command> for Capture {
        async fn execute(&self, command: Command) -> Result<Outcome, BusError> {
            let operation = command.operation().expect("operation parsed");
            Ok(Outcome::ok(crate::outcome::Payload::none().with_meta(
                json!({"kind": operation.kind()}).as_object().unwrap().clone(),
            )))
        }
    }

    async fn run(command: Command) -> Result<Outcome, BusError> {
        let stage: Arc<dyn Middleware<Command>> =
            Arc::new(ParseOperation::new(Arc::new(schemas()), ""));
        Pipeline::new(vec![stage]).run(command, &Capture).await
    }

    fn kind_of(outcome: &Outcome) -> Value {
        outcome.payload().unwrap().meta["kind"].clone()
    }

    #[tokio::test]
    async fn store_body_becomes_create() {
        let command = Command::store(rt("posts")).with_request(RequestContext::new().with_body(json!({
            "data": {"type": "posts", "attributes": {"title": "Hello World!"}}
        })));
        assert_eq!(kind_of(&run(command).await.unwrap()), json!("create"));
    }

    #[tokio::test]
    async fn relationship_body_is_addressed_at_route() {
        let command = Command::relationship(CommandKind::DetachRelationship, rt("posts"), rid("1"), "tags")
            .with_request(RequestContext::new().with_body(json!({"data": [{"type": "tags", "id": "1"}]})));
        assert_eq!(kind_of(&run(command).await.unwrap()), json!("update_to_many"));
    }

    #[tokio::test]
    async fn body_without_data_is_a_parse_error() {
        let command = Command::update(rt("posts"), rid("1"))
            .with_request(RequestContext::new().with_body(json!({"meta": {}})));
        let err = run(command).await.unwrap_err();
        assert!(matches!(err, BusError::Parse(ParseError::MissingData { .. })));
    }

    #[tokio::test]
    async fn to_one_attach_is_rejected() {
        let command = Command::relationship(CommandKind::AttachRelationship, rt("posts"), rid("1"), "author")
            .with_request(RequestContext::new().with_body(json!({"data": {"type": "users", "id": "9"}})));
        let err = run(command).await.unwrap_err();
        assert!(matches!(err, BusError::Parse(ParseError::InvalidToOneOpCode { .. })));
    }

    #[tokio::test]
    async fn existing_operation_is_kept() {
        let operation = OperationParser::new(&schemas())
            .parse(&json!({"op": "remove", "ref": {"type": "posts", "id": "2"}}))
            .unwrap();
        assert!(matches!(operation, Operation::Delete(_)));
        let command = Command::from_operation(operation);
        assert_eq!(kind_of(&run(command).await.unwrap()), json!("delete"));
    }

    #[tokio::test]
    async fn missing_body_is_a_contract_violation() {
        let err = run(Command::store(rt("posts"))).await.unwrap_err();
        assert!(matches!(err, BusError::Contract(_)));
    }
}
