//! JSON:API operations bus: command and query dispatch through
//! authorization, validation and resource hooks, on top of the operation
//! parser in `jsonapi-ops-core`.

pub mod authorization;
pub mod bus;
pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod hooks;
pub mod lazy;
pub mod middleware;
pub mod outcome;
pub mod pipeline;
pub mod query;
pub mod router;
pub mod store;
pub mod telemetry;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use authorization::{
    AllowAll, Gate, GateResponse, MessageTable, PolicyResponse, ResourceAuthorizer, Translator,
};
pub use bus::{Collaborators, CommandBus, QueryBus};
pub use command::{Command, CommandKind};
pub use config::{load_schemas, BusConfig, LogConfig, LogFormat};
pub use context::{Principal, QueryParameters, RequestContext};
pub use error::{ApiError, AuthFailure, BusError, ErrorList};
pub use hooks::{CompositeHooks, HookEvent, ResourceHooks};
pub use outcome::{Outcome, Payload, PayloadData};
pub use query::{Query, QueryKind};
pub use store::{InMemoryStore, Model, Related, Store};
pub use validation::{PassThrough, ValidationFailure, Validator, ValidatorFactory};
