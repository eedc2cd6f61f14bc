//! Mutating requests dispatched through the [`CommandBus`](crate::bus::CommandBus).
//!
//! A [`Command`] is an immutable value: every `with_*` method returns a new
//! command and leaves the receiver untouched, so a middleware stage can hand a
//! modified copy to the next stage without affecting its caller.

use std::fmt;
use std::sync::Arc;

use jsonapi_ops_core::{OpCode, Operation, ResourceId, ResourceType};
use serde_json::{Map, Value};

use crate::context::RequestContext;
use crate::hooks::ResourceHooks;
use crate::pipeline::Input;
use crate::store::Model;

/// The mutating actions of a JSON:API server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Store,
    Update,
    Destroy,
    UpdateRelationship,
    AttachRelationship,
    DetachRelationship,
}

impl CommandKind {
    pub const ALL: [Self; 6] = [
        Self::Store,
        Self::Update,
        Self::Destroy,
        Self::UpdateRelationship,
        Self::AttachRelationship,
        Self::DetachRelationship,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Store => "store",
            Self::Update => "update",
            Self::Destroy => "destroy",
            Self::UpdateRelationship => "updateRelationship",
            Self::AttachRelationship => "attachRelationship",
            Self::DetachRelationship => "detachRelationship",
        }
    }

    #[must_use]
    pub fn is_relationship(self) -> bool {
        matches!(
            self,
            Self::UpdateRelationship | Self::AttachRelationship | Self::DetachRelationship
        )
    }

    /// The command kind that executes a parsed operation.
    #[must_use]
    pub fn for_operation(operation: &Operation) -> Self {
        match operation {
            Operation::Create(_) => Self::Store,
            Operation::Update(_) => Self::Update,
            Operation::Delete(_) => Self::Destroy,
            Operation::UpdateToOne(_) => Self::UpdateRelationship,
            Operation::UpdateToMany(op) => match op.op {
                OpCode::Add => Self::AttachRelationship,
                OpCode::Update => Self::UpdateRelationship,
                OpCode::Remove => Self::DetachRelationship,
            },
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One mutating request.
#[derive(Clone)]
pub struct Command {
    kind: CommandKind,
    resource_type: ResourceType,
    request: Option<Arc<RequestContext>>,
    id: Option<ResourceId>,
    model: Option<Arc<Model>>,
    operation: Option<Arc<Operation>>,
    field: Option<String>,
    validated: Option<Arc<Map<String, Value>>>,
    authorize: bool,
    validate: bool,
    hooks: Option<Arc<dyn ResourceHooks>>,
}

impl Command {
    #[must_use]
    pub fn new(kind: CommandKind, resource_type: ResourceType) -> Self {
        Self {
            kind,
            resource_type,
            request: None,
            id: None,
            model: None,
            operation: None,
            field: None,
            validated: None,
            authorize: true,
            validate: true,
            hooks: None,
        }
    }

    #[must_use]
    pub fn store(resource_type: ResourceType) -> Self {
        Self::new(CommandKind::Store, resource_type)
    }

    #[must_use]
    pub fn update(resource_type: ResourceType, id: ResourceId) -> Self {
        Self::new(CommandKind::Update, resource_type).with_id(id)
    }

    #[must_use]
    pub fn destroy(resource_type: ResourceType, id: ResourceId) -> Self {
        Self::new(CommandKind::Destroy, resource_type).with_id(id)
    }

    /// A relationship command of the given kind for `field` of `{type}:{id}`.
    #[must_use]
    pub fn relationship(
        kind: CommandKind,
        resource_type: ResourceType,
        id: ResourceId,
        field: impl Into<String>,
    ) -> Self {
        Self::new(kind, resource_type)
            .with_id(id)
            .with_field(field)
    }

    /// Builds the command that executes an already-parsed operation, e.g. one
    /// entry of an atomic operations batch.
    #[must_use]
    pub fn from_operation(operation: Operation) -> Self {
        let mut command = Self::new(
            CommandKind::for_operation(&operation),
            operation.resource_type().clone(),
        );
        if !matches!(operation, Operation::Create(_)) {
            command.id = operation.resource_id().cloned();
        }
        command.field = operation.relationship().map(str::to_string);
        command.operation = Some(Arc::new(operation));
        command
    }

    // -- copy-on-write modifiers --------------------------------------------

    #[must_use]
    pub fn with_request(&self, request: RequestContext) -> Self {
        Self {
            request: Some(Arc::new(request)),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_id(&self, id: ResourceId) -> Self {
        Self {
            id: Some(id),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_model(&self, model: Arc<Model>) -> Self {
        Self {
            model: Some(model),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_operation(&self, operation: Operation) -> Self {
        Self {
            operation: Some(Arc::new(operation)),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_field(&self, field: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            ..self.clone()
        }
    }

    /// Attaches validated data. Validation will not run again.
    #[must_use]
    pub fn with_validated(&self, validated: Map<String, Value>) -> Self {
        Self {
            validated: Some(Arc::new(validated)),
            validate: false,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_hooks(&self, hooks: Arc<dyn ResourceHooks>) -> Self {
        Self {
            hooks: Some(hooks),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn skip_authorization(&self) -> Self {
        Self {
            authorize: false,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn skip_validation(&self) -> Self {
        Self {
            validate: false,
            ..self.clone()
        }
    }

    // -- accessors ------------------------------------------------------------

    #[must_use]
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    #[must_use]
    pub fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    #[must_use]
    pub fn request(&self) -> Option<&RequestContext> {
        self.request.as_deref()
    }

    /// Id of the addressed resource: the located model's id, else the
    /// explicit id, else the operation's.
    #[must_use]
    pub fn id(&self) -> Option<&ResourceId> {
        self.model
            .as_deref()
            .map(|model| &model.id)
            .or(self.id.as_ref())
            .or_else(|| {
                self.operation
                    .as_deref()
                    .filter(|op| !matches!(op, Operation::Create(_)))
                    .and_then(Operation::resource_id)
            })
    }

    #[must_use]
    pub fn model(&self) -> Option<&Arc<Model>> {
        self.model.as_ref()
    }

    #[must_use]
    pub fn operation(&self) -> Option<&Operation> {
        self.operation.as_deref()
    }

    /// Relationship field for relationship commands.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        self.field
            .as_deref()
            .or_else(|| self.operation.as_deref().and_then(Operation::relationship))
    }

    #[must_use]
    pub fn validated(&self) -> Option<&Map<String, Value>> {
        self.validated.as_deref()
    }

    #[must_use]
    pub fn must_authorize(&self) -> bool {
        self.authorize
    }

    #[must_use]
    pub fn must_validate(&self) -> bool {
        self.validate
    }

    #[must_use]
    pub fn hooks(&self) -> Option<&Arc<dyn ResourceHooks>> {
        self.hooks.as_ref()
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("kind", &self.kind)
            .field("resource_type", &self.resource_type)
            .field("id", &self.id())
            .field("field", &self.field())
            .field("has_request", &self.request.is_some())
            .field("has_model", &self.model.is_some())
            .field("authorize", &self.authorize)
            .field("validate", &self.validate)
            .finish_non_exhaustive()
    }
}

impl Input for Command {
    fn action(&self) -> &'static str {
        self.kind.as_str()
    }

    fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    fn resource_id(&self) -> Option<&ResourceId> {
        self.id()
    }

    fn local_id(&self) -> Option<&ResourceId> {
        self.operation
            .as_deref()
            .and_then(Operation::target_ref)
            .and_then(|reference| reference.lid())
    }

    fn model(&self) -> Option<&Arc<Model>> {
        self.model.as_ref()
    }

    fn with_model(&self, model: Arc<Model>) -> Self {
        Command::with_model(self, model)
    }

    fn request(&self) -> Option<&RequestContext> {
        self.request.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use jsonapi_ops_core::{Delete, ListOfResourceIdentifiers, Ref, Target, UpdateToMany};

    use super::*;

    fn rt(value: &str) -> ResourceType {
        ResourceType::new(value).unwrap()
    }

    fn id(value: &str) -> ResourceId {
        ResourceId::new(value).unwrap()
    }

    #[test]
    fn modifiers_leave_receiver_untouched() {
        let original = Command::store(rt("posts"));
        let validated = original.with_validated(Map::new());

        assert!(original.must_validate());
        assert!(original.validated().is_none());
        assert!(!validated.must_validate());
        assert!(validated.validated().is_some());

        let trusted = original.skip_authorization();
        assert!(original.must_authorize());
        assert!(!trusted.must_authorize());
    }

    #[test]
    fn model_id_takes_precedence() {
        let command = Command::update(rt("posts"), id("1"));
        assert_eq!(command.id().unwrap(), "1");

        let located = command.with_model(Arc::new(Model::new(rt("posts"), id("2"))));
        assert_eq!(located.id().unwrap(), "2");
        assert_eq!(command.id().unwrap(), "1");
    }

    #[test]
    fn from_operation_maps_to_many_op_codes() {
        let target = || {
            Target::from_ref(
                Ref::new(rt("posts"), id("1"))
                    .with_relationship("tags")
                    .unwrap(),
            )
        };
        for (op, kind) in [
            (OpCode::Add, CommandKind::AttachRelationship),
            (OpCode::Update, CommandKind::UpdateRelationship),
            (OpCode::Remove, CommandKind::DetachRelationship),
        ] {
            let command = Command::from_operation(Operation::UpdateToMany(UpdateToMany {
                op,
                target: target(),
                data: ListOfResourceIdentifiers::default(),
                meta: Map::new(),
            }));
            assert_eq!(command.kind(), kind);
            assert_eq!(command.field(), Some("tags"));
            assert_eq!(command.id().unwrap(), "1");
            assert!(command.kind().is_relationship());
        }

        let destroy = Command::from_operation(Operation::Delete(Delete {
            target: Target::from_ref(Ref::new(rt("posts"), id("5"))),
            meta: Map::new(),
        }));
        assert_eq!(destroy.kind(), CommandKind::Destroy);
        assert_eq!(destroy.id().unwrap(), "5");
    }
}
