//! Transport request context carried by commands and queries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Authenticated principal making the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Principal {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// JSON:API query parameters: `include`, `fields`, `sort`, `page`, `filter`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryParameters {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub page: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub filter: Map<String, Value>,
}

impl QueryParameters {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.include.is_empty()
            && self.fields.is_empty()
            && self.sort.is_empty()
            && self.page.is_empty()
            && self.filter.is_empty()
    }
}

/// The transport request an execution originated from.
///
/// Absent on commands and queries built for trusted, in-process execution.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub principal: Option<Principal>,
    /// Locale used to translate authorization messages.
    pub locale: Option<String>,
    /// Decoded JSON:API request document, if the request had a body.
    pub body: Option<Value>,
    pub query: QueryParameters,
    /// Correlation id for logs, generated per request.
    pub request_id: String,
}

impl RequestContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_query(mut self, query: QueryParameters) -> Self {
        self.query = query;
        self
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }

    /// The `data` member of the request body.
    #[must_use]
    pub fn body_data(&self) -> Option<&Value> {
        self.body.as_ref()?.get("data")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn new_context_gets_request_id() {
        let a = RequestContext::new();
        let b = RequestContext::new();
        assert!(!a.request_id.is_empty());
        assert_ne!(a.request_id, b.request_id);
        assert!(!a.is_authenticated());
    }

    #[test]
    fn body_data_reads_data_member() {
        let ctx = RequestContext::new().with_body(json!({"data": null, "meta": {}}));
        assert_eq!(ctx.body_data(), Some(&Value::Null));
        assert!(RequestContext::new().body_data().is_none());
    }

    #[test]
    fn query_parameters_deserialize_with_defaults() {
        let query: QueryParameters =
            serde_json::from_value(json!({"include": ["author"], "page": {"number": 1}})).unwrap();
        assert_eq!(query.include, vec!["author".to_string()]);
        assert!(query.sort.is_empty());
        assert!(!query.is_empty());
        assert!(QueryParameters::default().is_empty());
    }
}
