//! Pipeline stages shared by the command and query buses.
//!
//! - [`parse_operation`]: request body to typed operation
//! - [`locate_model`]: loads the addressed model
//! - [`compliance`]: request content matches the endpoint
//! - [`authorize`]: gate checks for the ten actions
//! - [`validate`]: validator factory and error mapping
//! - [`trigger_hooks`]: lifecycle hooks around the handler
//! - [`instrument`]: tower layer tracing each dispatch

pub mod authorize;
pub mod compliance;
pub mod instrument;
pub mod locate_model;
pub mod parse_operation;
pub mod trigger_hooks;
pub mod validate;

pub use authorize::{AuthorizeCommand, AuthorizeQuery};
pub use compliance::CheckContentCompliance;
pub use instrument::{TracingLayer, TracingService};
pub use locate_model::LocateModel;
pub use parse_operation::ParseOperation;
pub use trigger_hooks::{TriggerCommandHooks, TriggerQueryHooks};
pub use validate::{ValidateCommand, ValidateQuery};
