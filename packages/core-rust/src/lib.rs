//! JSON:API operations core: identifier values, resource objects, href
//! resolution, schema metadata and the operation parser.

pub mod error;
pub mod href;
pub mod operation;
pub mod parser;
pub mod reference;
pub mod resource;
pub mod schema;
pub mod values;

pub use error::{ParseError, SchemaError, ValueError};
pub use href::{Href, HrefParser, ParsedHref};
pub use operation::{Create, Delete, OpCode, Operation, Target, Update, UpdateToMany, UpdateToOne};
pub use parser::{OperationParser, ATOMIC_OPERATIONS};
pub use reference::Ref;
pub use resource::ResourceObject;
pub use schema::{
    IdKind, IdPattern, RelationConfig, RelationDef, ResourceConfig, ResourceSchema,
    SchemaConfig, SchemaContainer, Schemas,
};
pub use values::{ListOfResourceIdentifiers, ResourceId, ResourceIdentifier, ResourceType};
