//! Validation stages for the command and query buses.
//!
//! Failures become client errors; validated data is attached to the input.

use std::sync::Arc;

use async_trait::async_trait;
use jsonapi_ops_core::SchemaContainer;

use crate::command::{Command, CommandKind};
use crate::error::BusError;
use crate::outcome::Outcome;
use crate::pipeline::{Middleware, Next};
use crate::query::Query;
use crate::validation::{
    destroy_errors, operation_errors, query_errors, ValidationFailure, ValidatorFactory,
};

fn rejected(failures: Vec<ValidationFailure>) -> Result<Vec<ValidationFailure>, BusError> {
    if failures.is_empty() {
        return Err(BusError::contract("validator rejected the input without reporting a failure"));
    }
    Ok(failures)
}

/// Validates the command's operation, or the located model for deletions.
///
/// On success the validated data is attached and the command continues; on
/// failure the execution stops with 422 errors.
pub struct ValidateCommand {
    validators: Arc<dyn ValidatorFactory>,
    schemas: Arc<dyn SchemaContainer>,
}

impl ValidateCommand {
    #[must_use]
    pub fn new(validators: Arc<dyn ValidatorFactory>, schemas: Arc<dyn SchemaContainer>) -> Self {
        Self { validators, schemas }
    }
}

#[async_trait]
impl Middleware<Command> for ValidateCommand {
    fn name(&self) -> &'static str {
        "validate"
    }

    async fn handle(&self, command: Command, next: Next<'_, Command>) -> Result<Outcome, BusError> {
        if !command.must_validate() {
            return next.run(command).await;
        }

        if command.kind() == CommandKind::Destroy {
            let model = command
                .model()
                .ok_or_else(|| BusError::contract("destroy must be validated against a located model"))?;
            let Some(validator) = self.validators.make_destroy(model) else {
                return next.run(command).await;
            };
            return match validator.validate() {
                Ok(validated) => next.run(command.with_validated(validated)).await,
                Err(failures) => {
                    let failures = rejected(failures)?;
                    tracing::debug!(failures = failures.len(), "deletion rejected by validation");
                    Ok(Outcome::failed(destroy_errors(failures)))
                }
            };
        }

        let operation = command
            .operation()
            .ok_or_else(|| BusError::contract(format!("{} has no operation to validate", command.kind())))?;
        let validator = self
            .validators
            .make(operation, command.model().map(AsRef::as_ref));

        match validator.validate() {
            Ok(validated) => next.run(command.with_validated(validated)).await,
            Err(failures) => {
                let failures = rejected(failures)?;
                tracing::debug!(failures = failures.len(), kind = %command.kind(), "operation rejected by validation");
                let schema = self.schemas.schema_for(command.resource_type());
                Ok(Outcome::failed(operation_errors(failures, operation, schema)))
            }
        }
    }
}

/// Validates query parameters; failures are 400 errors naming the parameter.
pub struct ValidateQuery {
    validators: Arc<dyn ValidatorFactory>,
}

impl ValidateQuery {
    #[must_use]
    pub fn new(validators: Arc<dyn ValidatorFactory>) -> Self {
        Self { validators }
    }
}

#[async_trait]
impl Middleware<Query> for ValidateQuery {
    fn name(&self) -> &'static str {
        "validate-query"
    }

    async fn handle(&self, query: Query, next: Next<'_, Query>) -> Result<Outcome, BusError> {
        if !query.must_validate() {
            return next.run(query).await;
        }
        match self.validators.make_query(query.parameters()).validate() {
            Ok(validated) => next.run(query.with_validated(validated)).await,
            Err(failures) => Ok(Outcome::failed(query_errors(rejected(failures)?))),
        }
    }
}
