//! JSON:API error objects and the bus fault channel.
//!
//! Domain failures (denied authorization, failed validation, missing
//! resources) are carried as an [`ErrorList`] inside a failed
//! [`Outcome`](crate::outcome::Outcome). [`BusError`] is reserved for faults
//! that abort execution: malformed input, contract violations, escalated
//! authorization failures, gate exceptions, hook aborts and store errors.

use http::StatusCode;
use jsonapi_ops_core::ParseError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// ApiError
// ---------------------------------------------------------------------------

/// Location of the offending input: a JSON pointer into the document or a
/// query parameter name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSource {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pointer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parameter: Option<String>,
}

impl ErrorSource {
    #[must_use]
    pub fn pointer(pointer: impl Into<String>) -> Self {
        Self {
            pointer: Some(pointer.into()),
            parameter: None,
        }
    }

    #[must_use]
    pub fn parameter(parameter: impl Into<String>) -> Self {
        Self {
            pointer: None,
            parameter: Some(parameter.into()),
        }
    }
}

/// A JSON:API error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<String>,
    #[serde(
        with = "status_code",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub status: Option<StatusCode>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub source: Option<ErrorSource>,
    #[serde(skip_serializing_if = "Map::is_empty", default)]
    pub meta: Map<String, Value>,
}

impl ApiError {
    /// Error with the given status and its canonical reason as title.
    #[must_use]
    pub fn from_status(status: StatusCode) -> Self {
        Self {
            status: Some(status),
            title: status.canonical_reason().map(str::to_string),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: ErrorSource) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn with_pointer(self, pointer: impl Into<String>) -> Self {
        self.with_source(ErrorSource::pointer(pointer))
    }

    #[must_use]
    pub fn with_parameter(self, parameter: impl Into<String>) -> Self {
        self.with_source(ErrorSource::parameter(parameter))
    }

    #[must_use]
    pub fn not_found() -> Self {
        Self::from_status(StatusCode::NOT_FOUND)
    }

    #[must_use]
    pub fn conflict() -> Self {
        Self::from_status(StatusCode::CONFLICT)
    }
}

mod status_code {
    use http::StatusCode;
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        status: &Option<StatusCode>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match status {
            Some(status) => serializer.serialize_str(status.as_str()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<StatusCode>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| StatusCode::from_bytes(raw.as_bytes()).map_err(de::Error::custom))
            .transpose()
    }
}

// ---------------------------------------------------------------------------
// ErrorList
// ---------------------------------------------------------------------------

/// Ordered collection of [`ApiError`]s returned by a failed execution.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorList(Vec<ApiError>);

impl ErrorList {
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, error: ApiError) {
        self.0.push(error);
    }

    /// Appends every error of `other`.
    #[must_use]
    pub fn merge(mut self, other: ErrorList) -> Self {
        self.0.extend(other.0);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ApiError> {
        self.0.iter()
    }

    #[must_use]
    pub fn first(&self) -> Option<&ApiError> {
        self.0.first()
    }

    /// The HTTP status that best describes the whole list.
    ///
    /// A single distinct status is returned as-is. Mixed statuses collapse to
    /// 500 if any is a server error, otherwise 400. `None` when no error
    /// carries a status.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        let mut statuses = self.0.iter().filter_map(|error| error.status);
        let first = statuses.next()?;
        let mut server_error = first.is_server_error();
        let mut mixed = false;
        for status in statuses {
            mixed |= status != first;
            server_error |= status.is_server_error();
        }
        Some(match (mixed, server_error) {
            (false, _) => first,
            (true, true) => StatusCode::INTERNAL_SERVER_ERROR,
            (true, false) => StatusCode::BAD_REQUEST,
        })
    }
}

impl From<ApiError> for ErrorList {
    fn from(error: ApiError) -> Self {
        Self(vec![error])
    }
}

impl From<Vec<ApiError>> for ErrorList {
    fn from(errors: Vec<ApiError>) -> Self {
        Self(errors)
    }
}

impl FromIterator<ApiError> for ErrorList {
    fn from_iter<I: IntoIterator<Item = ApiError>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ErrorList {
    type Item = &'a ApiError;
    type IntoIter = std::slice::Iter<'a, ApiError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ---------------------------------------------------------------------------
// AuthFailure / BusError
// ---------------------------------------------------------------------------

/// An authorization failure escalated by a policy response.
///
/// The transport layer renders this as an HTTP error instead of a JSON:API
/// error list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    #[error("unauthenticated: {message}")]
    Unauthenticated { message: String },
    #[error("forbidden: {message}")]
    Forbidden {
        message: String,
        code: Option<String>,
        status: StatusCode,
    },
}

impl AuthFailure {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Self::Forbidden { status, .. } => *status,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Unauthenticated { message } | Self::Forbidden { message, .. } => message,
        }
    }
}

/// Faults that abort a bus execution.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("no handler registered for {action}")]
    UnknownHandler { action: String },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("contract violation: {0}")]
    Contract(String),
    #[error(transparent)]
    Authorization(#[from] AuthFailure),
    /// The gate itself failed, e.g. its policy backend was unreachable.
    #[error("gate error: {source}")]
    Gate { source: anyhow::Error },
    #[error("hook {hook} aborted execution: {source}")]
    Hook {
        hook: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl BusError {
    pub(crate) fn contract(message: impl Into<String>) -> Self {
        Self::Contract(message.into())
    }
}
