//! Result of a bus execution: a payload on success, errors on failure.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::context::QueryParameters;
use crate::error::{BusError, ErrorList};
use crate::store::{Model, Related};

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Primary data of a successful execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PayloadData {
    None,
    Model(Option<Arc<Model>>),
    Models(Vec<Arc<Model>>),
}

/// `{hasData, data, meta}` returned by a successful execution.
///
/// `has_data` distinguishes "no primary data" (a delete) from "primary data
/// is null" (an empty to-one relationship).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    pub has_data: bool,
    pub data: PayloadData,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
}

impl Payload {
    /// A payload without primary data.
    #[must_use]
    pub fn none() -> Self {
        Self {
            has_data: false,
            data: PayloadData::None,
            meta: Map::new(),
        }
    }

    #[must_use]
    pub fn model(model: Option<Arc<Model>>) -> Self {
        Self {
            has_data: true,
            data: PayloadData::Model(model),
            meta: Map::new(),
        }
    }

    #[must_use]
    pub fn models(models: Vec<Arc<Model>>) -> Self {
        Self {
            has_data: true,
            data: PayloadData::Models(models),
            meta: Map::new(),
        }
    }

    #[must_use]
    pub fn related(related: Related) -> Self {
        match related {
            Related::ToOne(model) => Self::model(model),
            Related::ToMany(models) => Self::models(models),
        }
    }

    #[must_use]
    pub fn with_meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta = meta;
        self
    }

    /// The single model, for resource-shaped payloads.
    #[must_use]
    pub fn as_model(&self) -> Option<&Arc<Model>> {
        match &self.data {
            PayloadData::Model(model) => model.as_ref(),
            _ => None,
        }
    }

    /// The primary data as a relationship view, if there is any.
    #[must_use]
    pub fn as_related(&self) -> Option<Related> {
        match &self.data {
            PayloadData::None => None,
            PayloadData::Model(model) => Some(Related::ToOne(model.clone())),
            PayloadData::Models(models) => Some(Related::ToMany(models.clone())),
        }
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::none()
    }
}

/// Owner of a relationship-shaped payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedTo {
    pub model: Arc<Model>,
    pub field: String,
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Success {
    payload: Payload,
    query: QueryParameters,
    related_to: Option<RelatedTo>,
}

/// Success or failure of one command or query.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Success),
    Failure(ErrorList),
}

impl Outcome {
    #[must_use]
    pub fn ok(payload: Payload) -> Self {
        Self::ok_with_query(payload, QueryParameters::default())
    }

    #[must_use]
    pub fn ok_with_query(payload: Payload, query: QueryParameters) -> Self {
        Self::Success(Success {
            payload,
            query,
            related_to: None,
        })
    }

    /// A success without primary data.
    #[must_use]
    pub fn empty() -> Self {
        Self::ok(Payload::none())
    }

    /// A failure carrying `errors`, which must hold at least one error.
    ///
    /// # Panics
    ///
    /// In debug builds, when `errors` is empty.
    #[must_use]
    pub fn failed(errors: impl Into<ErrorList>) -> Self {
        let errors = errors.into();
        debug_assert!(!errors.is_empty(), "a failed outcome needs at least one error");
        Self::Failure(errors)
    }

    #[must_use]
    pub fn did_succeed(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    #[must_use]
    pub fn did_fail(&self) -> bool {
        !self.did_succeed()
    }

    /// # Errors
    ///
    /// Returns `BusError::Contract` on a failed outcome.
    pub fn payload(&self) -> Result<&Payload, BusError> {
        match self {
            Self::Success(success) => Ok(&success.payload),
            Self::Failure(_) => Err(BusError::contract(
                "cannot read the payload of a failed outcome",
            )),
        }
    }

    /// # Errors
    ///
    /// Returns `BusError::Contract` on a failed outcome.
    pub fn query(&self) -> Result<&QueryParameters, BusError> {
        match self {
            Self::Success(success) => Ok(&success.query),
            Self::Failure(_) => Err(BusError::contract(
                "cannot read the query parameters of a failed outcome",
            )),
        }
    }

    #[must_use]
    pub fn errors(&self) -> Option<&ErrorList> {
        match self {
            Self::Success(_) => None,
            Self::Failure(errors) => Some(errors),
        }
    }

    #[must_use]
    pub fn related_to(&self) -> Option<&RelatedTo> {
        match self {
            Self::Success(success) => success.related_to.as_ref(),
            Self::Failure(_) => None,
        }
    }

    /// Records the relationship owner. Failed outcomes are returned unchanged.
    #[must_use]
    pub fn with_related_to(self, model: Arc<Model>, field: impl Into<String>) -> Self {
        match self {
            Self::Success(mut success) => {
                success.related_to = Some(RelatedTo {
                    model,
                    field: field.into(),
                });
                Self::Success(success)
            }
            failure @ Self::Failure(_) => failure,
        }
    }

    /// Short label for logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Failure(_) => "failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use jsonapi_ops_core::{ResourceId, ResourceType};
    use serde_json::json;

    use super::*;
    use crate::error::ApiError;

    fn post() -> Arc<Model> {
        Arc::new(Model::new(
            ResourceType::new("posts").unwrap(),
            ResourceId::new("1").unwrap(),
        ))
    }

    #[test]
    fn empty_success_has_no_data() {
        let outcome = Outcome::empty();
        assert!(outcome.did_succeed());
        assert!(!outcome.payload().unwrap().has_data);
        assert!(outcome.query().unwrap().is_empty());
        assert!(outcome.errors().is_none());
    }

    #[test]
    fn reading_payload_of_failure_is_a_contract_violation() {
        let outcome = Outcome::failed(ApiError::not_found());
        assert!(outcome.did_fail());
        assert!(matches!(outcome.payload(), Err(BusError::Contract(_))));
        assert!(matches!(outcome.query(), Err(BusError::Contract(_))));
        assert_eq!(outcome.errors().unwrap().len(), 1);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "at least one error")]
    fn failure_requires_an_error() {
        let _ = Outcome::failed(ErrorList::new());
    }

    #[test]
    fn related_to_only_applies_to_success() {
        let outcome = Outcome::ok(Payload::model(None)).with_related_to(post(), "author");
        let related_to = outcome.related_to().unwrap();
        assert_eq!(related_to.field, "author");
        assert!(outcome.payload().unwrap().has_data);

        let failed = Outcome::failed(ApiError::conflict()).with_related_to(post(), "author");
        assert!(failed.related_to().is_none());
    }

    #[test]
    fn payload_serializes_null_to_one() {
        let payload = Payload::model(None);
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({"hasData": true, "data": null})
        );
        assert_eq!(payload.as_related(), Some(Related::ToOne(None)));
        assert_eq!(Payload::none().as_related(), None);
    }
}
