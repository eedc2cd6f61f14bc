//! Validation contract and the mapping of failures onto JSON:API errors.
//!
//! Resource failures become 422 errors pointing into the request document
//! (`/data/attributes/title`, `/data/relationships/author`, `/meta/...`).
//! Query failures become 400 errors naming the offending parameter.

use http::StatusCode;
use jsonapi_ops_core::{Operation, ResourceSchema};
use serde_json::{Map, Value};

use crate::context::QueryParameters;
use crate::error::{ApiError, ErrorList};
use crate::store::Model;

/// One rule that did not pass.
///
/// `key` is a dotted path to the offending member, e.g. `title`,
/// `author.name`, `meta.reason` or `tags.1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub key: String,
    pub message: String,
    pub code: Option<String>,
}

impl ValidationFailure {
    #[must_use]
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
            code: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// A prepared validation run.
pub trait Validator: Send {
    /// # Errors
    ///
    /// Returns every failure when the input does not pass.
    fn validate(&self) -> Result<Map<String, Value>, Vec<ValidationFailure>>;
}

/// Builds validators for operations, deletions and query parameters.
///
/// Used as `Arc<dyn ValidatorFactory>`.
pub trait ValidatorFactory: Send + Sync {
    /// `model` is the located resource for updates and relationship changes.
    fn make(&self, operation: &Operation, model: Option<&Model>) -> Box<dyn Validator>;

    /// Deletion rules. `None` when deletions are not validated.
    fn make_destroy(&self, model: &Model) -> Option<Box<dyn Validator>> {
        let _ = model;
        None
    }

    fn make_query(&self, parameters: &QueryParameters) -> Box<dyn Validator>;
}

// ---------------------------------------------------------------------------
// Pass-through factory
// ---------------------------------------------------------------------------

struct Accept(Map<String, Value>);

impl Validator for Accept {
    fn validate(&self) -> Result<Map<String, Value>, Vec<ValidationFailure>> {
        Ok(self.0.clone())
    }
}

/// Accepts everything. The validated data of a resource operation is its
/// attributes plus the `data` of each relationship; of a relationship
/// operation, `{field: data}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl ValidatorFactory for PassThrough {
    fn make(&self, operation: &Operation, _model: Option<&Model>) -> Box<dyn Validator> {
        let mut validated = Map::new();
        match operation {
            Operation::Create(op) => collect_fields(&mut validated, &op.data),
            Operation::Update(op) => collect_fields(&mut validated, &op.data),
            Operation::Delete(_) => {}
            Operation::UpdateToOne(op) => {
                if let Some(field) = op.target.relationship() {
                    let data = op
                        .data
                        .as_ref()
                        .and_then(|identifier| serde_json::to_value(identifier).ok())
                        .unwrap_or(Value::Null);
                    validated.insert(field.to_string(), data);
                }
            }
            Operation::UpdateToMany(op) => {
                if let Some(field) = op.target.relationship() {
                    let data = serde_json::to_value(&op.data).unwrap_or(Value::Array(Vec::new()));
                    validated.insert(field.to_string(), data);
                }
            }
        }
        Box::new(Accept(validated))
    }

    fn make_query(&self, parameters: &QueryParameters) -> Box<dyn Validator> {
        let validated = match serde_json::to_value(parameters) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        Box::new(Accept(validated))
    }
}

fn collect_fields(validated: &mut Map<String, Value>, data: &jsonapi_ops_core::ResourceObject) {
    validated.extend(data.attributes().clone());
    for field in data.relationships().keys() {
        if let Some(linkage) = data.relationship_data(field) {
            validated.insert(field.clone(), linkage.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Failure mapping
// ---------------------------------------------------------------------------

fn unprocessable(failure: ValidationFailure) -> ApiError {
    let mut error = ApiError::from_status(StatusCode::UNPROCESSABLE_ENTITY).with_detail(failure.message);
    if let Some(code) = failure.code {
        error = error.with_code(code);
    }
    error
}

/// JSON pointer for a failure key of a resource operation.
fn resource_pointer(key: &str, schema: Option<&ResourceSchema>) -> String {
    let path = key.replace('.', "/");
    let head = key.split('.').next().unwrap_or(key);
    match head {
        "type" | "id" | "lid" => format!("/data/{path}"),
        "meta" => format!("/{path}"),
        _ if schema.is_some_and(|s| s.relationship(head).is_some()) => {
            format!("/data/relationships/{path}")
        }
        _ => format!("/data/attributes/{path}"),
    }
}

/// JSON pointer for a failure key of a relationship operation, whose `data`
/// is the linkage itself: `tags.1` points at `/data/1`.
fn relationship_pointer(key: &str, field: &str) -> String {
    let rest = key
        .strip_prefix(field)
        .map_or(key, |rest| rest.trim_start_matches('.'));
    if rest.is_empty() {
        "/data".to_string()
    } else if rest == "meta" || rest.starts_with("meta.") {
        format!("/{}", rest.replace('.', "/"))
    } else {
        format!("/data/{}", rest.replace('.', "/"))
    }
}

/// Maps failures of an operation's validator to 422 errors with pointers.
#[must_use]
pub fn operation_errors(
    failures: Vec<ValidationFailure>,
    operation: &Operation,
    schema: Option<&ResourceSchema>,
) -> ErrorList {
    failures
        .into_iter()
        .map(|failure| {
            let pointer = match operation.relationship() {
                Some(field) => relationship_pointer(&failure.key, field),
                None => resource_pointer(&failure.key, schema),
            };
            unprocessable(failure).with_pointer(pointer)
        })
        .collect()
}

/// Maps deletion failures to 422 errors without a source.
#[must_use]
pub fn destroy_errors(failures: Vec<ValidationFailure>) -> ErrorList {
    failures.into_iter().map(unprocessable).collect()
}

/// Maps query failures to 400 errors naming the parameter, e.g. `page.size`
/// becomes `page[size]`.
#[must_use]
pub fn query_errors(failures: Vec<ValidationFailure>) -> ErrorList {
    failures
        .into_iter()
        .map(|failure| {
            let mut segments = failure.key.split('.');
            let mut parameter = segments.next().unwrap_or_default().to_string();
            for segment in segments {
                parameter.push('[');
                parameter.push_str(segment);
                parameter.push(']');
            }
            let mut error = ApiError::from_status(StatusCode::BAD_REQUEST)
                .with_detail(failure.message)
                .with_parameter(parameter);
            if let Some(code) = failure.code {
                error = error.with_code(code);
            }
            error
        })
        .collect()
}
