//! Resource authorization on top of a pluggable [`Gate`].
//!
//! [`ResourceAuthorizer`] maps each of the ten JSON:API actions to an
//! [`Ability`] and a [`Subject`], asks the gate, and normalises the answer
//! into an [`AuthorizationOutcome`]:
//!
//! - `true` allows the action.
//! - `false` denies it with a single generic error: 403 Forbidden, or 401
//!   Unauthorized when the request carries no principal.
//! - A [`PolicyResponse`] is authorized through the [`Translator`]; a denied
//!   policy response escalates to a transport-level [`AuthFailure`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use jsonapi_ops_core::ResourceType;

use crate::context::RequestContext;
use crate::error::{ApiError, AuthFailure, BusError, ErrorList};
use crate::lazy::LazyRelation;
use crate::store::Model;

// ---------------------------------------------------------------------------
// Ability / Subject
// ---------------------------------------------------------------------------

/// Name of a gate ability, e.g. `viewAny` or `updateAuthor`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ability(String);

impl Ability {
    #[must_use]
    pub fn view_any() -> Self {
        Self("viewAny".to_string())
    }

    #[must_use]
    pub fn create() -> Self {
        Self("create".to_string())
    }

    #[must_use]
    pub fn view() -> Self {
        Self("view".to_string())
    }

    #[must_use]
    pub fn update() -> Self {
        Self("update".to_string())
    }

    #[must_use]
    pub fn delete() -> Self {
        Self("delete".to_string())
    }

    /// `{prefix}{Field}`, e.g. `("attach", "tags")` becomes `attachTags`.
    #[must_use]
    pub fn for_field(prefix: &str, field: &str) -> Self {
        Self(format!("{prefix}{}", studly(field)))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `blog-posts`, `blog_posts` and `blogPosts` all become `BlogPosts`.
fn studly(field: &str) -> String {
    field
        .split(['-', '_', ' '])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect()
}

/// What an ability is checked against.
#[derive(Debug, Clone, Copy)]
pub enum Subject<'a> {
    /// Collection actions (`viewAny`, `create`).
    Type(&'a ResourceType),
    /// Instance actions.
    Model(&'a Model),
}

// ---------------------------------------------------------------------------
// Gate responses
// ---------------------------------------------------------------------------

/// A detailed gate answer carrying a message, code and status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyResponse {
    allowed: bool,
    message: Option<String>,
    code: Option<String>,
    status: Option<StatusCode>,
}

impl PolicyResponse {
    #[must_use]
    pub fn allow() -> Self {
        Self {
            allowed: true,
            message: None,
            code: None,
            status: None,
        }
    }

    #[must_use]
    pub fn deny() -> Self {
        Self {
            allowed: false,
            ..Self::allow()
        }
    }

    /// Message or translation key shown to the client.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn allowed(&self) -> bool {
        self.allowed
    }

    /// Accepts an allowing response; turns a denying one into an
    /// [`AuthFailure`] whose message is translated for `locale`.
    ///
    /// # Errors
    ///
    /// Returns the failure when the response denies the action.
    pub fn authorize(&self, translator: &dyn Translator, locale: &str) -> Result<(), AuthFailure> {
        if self.allowed {
            return Ok(());
        }
        let key = self.message.as_deref().unwrap_or(ACTION_UNAUTHORIZED);
        let message = translator
            .translate(key, locale)
            .unwrap_or_else(|| key.to_string());

        Err(match self.status {
            Some(StatusCode::UNAUTHORIZED) => AuthFailure::Unauthenticated { message },
            status => AuthFailure::Forbidden {
                message,
                code: self.code.clone(),
                status: status.unwrap_or(StatusCode::FORBIDDEN),
            },
        })
    }
}

/// What a [`Gate`] answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateResponse {
    Allowed(bool),
    Response(PolicyResponse),
}

impl From<bool> for GateResponse {
    fn from(allowed: bool) -> Self {
        Self::Allowed(allowed)
    }
}

impl From<PolicyResponse> for GateResponse {
    fn from(response: PolicyResponse) -> Self {
        Self::Response(response)
    }
}

/// Authorization policy lookup.
///
/// Used as `Arc<dyn Gate>`. An `Err` is a transport exception; it aborts
/// the execution as `BusError::Gate` with the error as its source.
#[async_trait]
pub trait Gate: Send + Sync {
    /// `related` is set for relationship mutations; it resolves the
    /// requested related models only if awaited.
    async fn inspect(
        &self,
        ability: &Ability,
        subject: Subject<'_>,
        related: Option<&LazyRelation>,
        request: Option<&RequestContext>,
    ) -> anyhow::Result<GateResponse>;
}

/// Gate that allows everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl Gate for AllowAll {
    async fn inspect(
        &self,
        _ability: &Ability,
        _subject: Subject<'_>,
        _related: Option<&LazyRelation>,
        _request: Option<&RequestContext>,
    ) -> anyhow::Result<GateResponse> {
        Ok(GateResponse::Allowed(true))
    }
}

// ---------------------------------------------------------------------------
// Translator
// ---------------------------------------------------------------------------

pub const ACTION_UNAUTHORIZED: &str = "auth.action_unauthorized";
pub const FORBIDDEN: &str = "auth.forbidden";
pub const UNAUTHORIZED: &str = "auth.unauthorized";

/// Looks up user-facing messages by key and locale.
pub trait Translator: Send + Sync {
    fn translate(&self, key: &str, locale: &str) -> Option<String>;
}

/// Table-backed translator, seeded with English messages. Lookups fall back
/// to the fallback locale.
#[derive(Debug, Clone)]
pub struct MessageTable {
    fallback: String,
    messages: HashMap<(String, String), String>,
}

impl MessageTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            fallback: "en".to_string(),
            messages: HashMap::new(),
        }
        .with("en", ACTION_UNAUTHORIZED, "This action is unauthorized.")
        .with("en", FORBIDDEN, "Forbidden")
        .with("en", UNAUTHORIZED, "Unauthorized")
    }

    #[must_use]
    pub fn with(mut self, locale: &str, key: &str, message: &str) -> Self {
        self.messages
            .insert((locale.to_string(), key.to_string()), message.to_string());
        self
    }
}

impl Default for MessageTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Translator for MessageTable {
    fn translate(&self, key: &str, locale: &str) -> Option<String> {
        let lookup = |locale: &str| {
            self.messages
                .get(&(locale.to_string(), key.to_string()))
                .cloned()
        };
        lookup(locale).or_else(|| lookup(&self.fallback))
    }
}

// ---------------------------------------------------------------------------
// ResourceAuthorizer
// ---------------------------------------------------------------------------

/// Normalised result of an authorization check.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthorizationOutcome {
    Allowed,
    /// Domain failure returned to the client as an error list.
    Denied(ErrorList),
    /// Transport-level failure raised as `BusError::Authorization`.
    Escalate(AuthFailure),
}

/// Asks the gate about the ten JSON:API actions.
pub struct ResourceAuthorizer {
    gate: Arc<dyn Gate>,
    translator: Arc<dyn Translator>,
    default_locale: String,
}

impl ResourceAuthorizer {
    #[must_use]
    pub fn new(gate: Arc<dyn Gate>, translator: Arc<dyn Translator>, default_locale: &str) -> Self {
        Self {
            gate,
            translator,
            default_locale: default_locale.to_string(),
        }
    }

    /// # Errors
    ///
    /// Returns `BusError::Gate` when the gate fails.
    pub async fn index(
        &self,
        request: Option<&RequestContext>,
        resource_type: &ResourceType,
    ) -> Result<AuthorizationOutcome, BusError> {
        self.check(Ability::view_any(), Subject::Type(resource_type), None, request)
            .await
    }

    /// # Errors
    ///
    /// Returns `BusError::Gate` when the gate fails.
    pub async fn store(
        &self,
        request: Option<&RequestContext>,
        resource_type: &ResourceType,
    ) -> Result<AuthorizationOutcome, BusError> {
        self.check(Ability::create(), Subject::Type(resource_type), None, request)
            .await
    }

    /// # Errors
    ///
    /// Returns `BusError::Gate` when the gate fails.
    pub async fn show(
        &self,
        request: Option<&RequestContext>,
        model: &Model,
    ) -> Result<AuthorizationOutcome, BusError> {
        self.check(Ability::view(), Subject::Model(model), None, request)
            .await
    }

    /// # Errors
    ///
    /// Returns `BusError::Gate` when the gate fails.
    pub async fn update(
        &self,
        request: Option<&RequestContext>,
        model: &Model,
    ) -> Result<AuthorizationOutcome, BusError> {
        self.check(Ability::update(), Subject::Model(model), None, request)
            .await
    }

    /// # Errors
    ///
    /// Returns `BusError::Gate` when the gate fails.
    pub async fn destroy(
        &self,
        request: Option<&RequestContext>,
        model: &Model,
    ) -> Result<AuthorizationOutcome, BusError> {
        self.check(Ability::delete(), Subject::Model(model), None, request)
            .await
    }

    /// # Errors
    ///
    /// Returns `BusError::Gate` when the gate fails.
    pub async fn show_related(
        &self,
        request: Option<&RequestContext>,
        model: &Model,
        field: &str,
    ) -> Result<AuthorizationOutcome, BusError> {
        self.check(Ability::for_field("view", field), Subject::Model(model), None, request)
            .await
    }

    /// Same ability as [`show_related`](Self::show_related).
    ///
    /// # Errors
    ///
    /// Returns `BusError::Gate` when the gate fails.
    pub async fn show_relationship(
        &self,
        request: Option<&RequestContext>,
        model: &Model,
        field: &str,
    ) -> Result<AuthorizationOutcome, BusError> {
        self.show_related(request, model, field).await
    }

    /// # Errors
    ///
    /// Returns `BusError::Gate` when the gate fails.
    pub async fn update_relationship(
        &self,
        request: Option<&RequestContext>,
        model: &Model,
        related: &LazyRelation,
    ) -> Result<AuthorizationOutcome, BusError> {
        let ability = Ability::for_field("update", related.field());
        self.check(ability, Subject::Model(model), Some(related), request)
            .await
    }

    /// # Errors
    ///
    /// Returns `BusError::Gate` when the gate fails.
    pub async fn attach_relationship(
        &self,
        request: Option<&RequestContext>,
        model: &Model,
        related: &LazyRelation,
    ) -> Result<AuthorizationOutcome, BusError> {
        let ability = Ability::for_field("attach", related.field());
        self.check(ability, Subject::Model(model), Some(related), request)
            .await
    }

    /// # Errors
    ///
    /// Returns `BusError::Gate` when the gate fails.
    pub async fn detach_relationship(
        &self,
        request: Option<&RequestContext>,
        model: &Model,
        related: &LazyRelation,
    ) -> Result<AuthorizationOutcome, BusError> {
        let ability = Ability::for_field("detach", related.field());
        self.check(ability, Subject::Model(model), Some(related), request)
            .await
    }

    async fn check(
        &self,
        ability: Ability,
        subject: Subject<'_>,
        related: Option<&LazyRelation>,
        request: Option<&RequestContext>,
    ) -> Result<AuthorizationOutcome, BusError> {
        let response = self
            .gate
            .inspect(&ability, subject, related, request)
            .await
            .map_err(|source| BusError::Gate { source })?;
        let outcome = self.normalize(response, request);
        if !matches!(outcome, AuthorizationOutcome::Allowed) {
            tracing::warn!(ability = %ability, "authorization denied");
        }
        Ok(outcome)
    }

    fn normalize(&self, response: GateResponse, request: Option<&RequestContext>) -> AuthorizationOutcome {
        let locale = request
            .and_then(|r| r.locale.as_deref())
            .unwrap_or(&self.default_locale);

        match response {
            GateResponse::Allowed(true) => AuthorizationOutcome::Allowed,
            GateResponse::Allowed(false) => {
                let authenticated = request.is_some_and(RequestContext::is_authenticated);
                let (status, key) = if authenticated {
                    (StatusCode::FORBIDDEN, FORBIDDEN)
                } else {
                    (StatusCode::UNAUTHORIZED, UNAUTHORIZED)
                };
                let mut error = ApiError::from_status(status);
                if let Some(title) = self.translator.translate(key, locale) {
                    error = error.with_title(title);
                }
                AuthorizationOutcome::Denied(error.into())
            }
            GateResponse::Response(policy) => match policy.authorize(self.translator.as_ref(), locale) {
                Ok(()) => AuthorizationOutcome::Allowed,
                Err(failure) => AuthorizationOutcome::Escalate(failure),
            },
        }
    }
}
