//! Checks that the request document fits the endpoint it was sent to.
//!
//! Mismatches are client conflicts (409): a resource of the wrong type, an
//! update whose `data.id` differs from the addressed id, or linkage to a type
//! the relationship does not accept. Addressing a relationship the type does
//! not declare is a 404.

use std::sync::Arc;

use async_trait::async_trait;
use jsonapi_ops_core::{
    Operation, RelationDef, ResourceIdentifier, ResourceObject, ResourceType, SchemaContainer,
};

use crate::command::{Command, CommandKind};
use crate::error::{ApiError, BusError, ErrorList};
use crate::outcome::Outcome;
use crate::pipeline::{Middleware, Next};
use crate::store::Linkage;

pub struct CheckContentCompliance {
    schemas: Arc<dyn SchemaContainer>,
}

impl CheckContentCompliance {
    #[must_use]
    pub fn new(schemas: Arc<dyn SchemaContainer>) -> Self {
        Self { schemas }
    }

    fn check(&self, command: &Command, operation: &Operation) -> ErrorList {
        let mut errors = ErrorList::new();
        match operation {
            Operation::Create(op) => {
                check_type(&mut errors, op.data.resource_type(), command.resource_type());
                self.check_linkage(&mut errors, command.resource_type(), &op.data);
            }
            Operation::Update(op) => {
                check_type(&mut errors, op.data.resource_type(), command.resource_type());
                if let (Some(expected), Some(actual)) = (command.id(), op.data.id()) {
                    if expected != actual {
                        errors.push(
                            ApiError::conflict()
                                .with_detail(format!(
                                    "The resource id {actual} does not match the endpoint id {expected}."
                                ))
                                .with_pointer("/data/id"),
                        );
                    }
                }
                self.check_linkage(&mut errors, command.resource_type(), &op.data);
            }
            Operation::Delete(_) => {}
            Operation::UpdateToOne(op) => {
                if let Some(relation) = self.relation(&mut errors, command) {
                    if let Some(identifier) = &op.data {
                        check_inverse(&mut errors, relation, identifier, "/data/type".to_string());
                    }
                }
            }
            Operation::UpdateToMany(op) => {
                if let Some(relation) = self.relation(&mut errors, command) {
                    for (index, identifier) in op.data.iter().enumerate() {
                        check_inverse(&mut errors, relation, identifier, format!("/data/{index}/type"));
                    }
                }
            }
        }
        errors
    }

    /// The addressed relationship, or a 404 when the type has no such field.
    fn relation(&self, errors: &mut ErrorList, command: &Command) -> Option<&RelationDef> {
        let field = command.field().unwrap_or_default();
        let relation = self.schemas.relationship(command.resource_type(), field);
        if relation.is_none() {
            errors.push(
                ApiError::not_found()
                    .with_detail(format!(
                        "Resource {} has no relationship named {field}.",
                        command.resource_type()
                    ))
                    .with_pointer("/ref/relationship"),
            );
        }
        relation
    }

    /// Linkage inside a resource object's `relationships` member.
    fn check_linkage(&self, errors: &mut ErrorList, resource_type: &ResourceType, data: &ResourceObject) {
        for field in data.relationships().keys() {
            let Some(relation) = self.schemas.relationship(resource_type, field) else {
                errors.push(
                    ApiError::conflict()
                        .with_detail(format!("The field {field} is not a relationship of {resource_type}."))
                        .with_pointer(format!("/data/relationships/{field}")),
                );
                continue;
            };
            let Some(raw) = data.relationship_data(field) else {
                continue;
            };
            let pointer = format!("/data/relationships/{field}/data");
            match (Linkage::from_data(raw), relation.to_many) {
                (Ok(Linkage::ToMany(identifiers)), true) => {
                    for (index, identifier) in identifiers.iter().enumerate() {
                        check_inverse(errors, relation, identifier, format!("{pointer}/{index}/type"));
                    }
                }
                (Ok(Linkage::ToOne(identifier)), false) => {
                    if let Some(identifier) = identifier {
                        check_inverse(errors, relation, &identifier, format!("{pointer}/type"));
                    }
                }
                _ => errors.push(
                    ApiError::conflict()
                        .with_detail(format!("The {field} relationship data is not valid linkage."))
                        .with_pointer(pointer),
                ),
            }
        }
    }
}

fn check_type(errors: &mut ErrorList, actual: &ResourceType, expected: &ResourceType) {
    if actual != expected {
        errors.push(
            ApiError::conflict()
                .with_detail(format!(
                    "The resource type {actual} is not supported by this endpoint ({expected})."
                ))
                .with_pointer("/data/type"),
        );
    }
}

fn check_inverse(errors: &mut ErrorList, relation: &RelationDef, identifier: &ResourceIdentifier, pointer: String) {
    if !relation.accepts(identifier.resource_type()) {
        errors.push(
            ApiError::conflict()
                .with_detail(format!(
                    "The {} relationship does not accept resources of type {}.",
                    relation.name,
                    identifier.resource_type()
                ))
                .with_pointer(pointer),
        );
    }
}

#[async_trait]
impl Middleware<Command> for CheckContentCompliance {
    fn name(&self) -> &'static str {
        "check-content-compliance"
    }

    async fn handle(&self, command: Command, next: Next<'_, Command>) -> Result<Outcome, BusError> {
        let operation = command
            .operation()
            .ok_or_else(|| BusError::contract("content compliance requires a parsed operation"))?;

        let expected = CommandKind::for_operation(operation);
        if expected != command.kind() {
            return Err(BusError::contract(format!(
                "{} operation cannot be executed by a {} command",
                operation.kind(),
                command.kind()
            )));
        }

        let errors = self.check(&command, operation);
        if !errors.is_empty() {
            tracing::debug!(errors = errors.len(), "request content does not comply");
            return Ok(Outcome::failed(errors));
        }
        next.run(command).await
    }
}
