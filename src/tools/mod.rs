//! Tool system: input schemas, descriptors, the catalog, and handlers

pub mod builtin;
mod catalog;
mod definition;
mod handler;
pub mod schema;

pub use catalog::ToolCatalog;
pub use definition::ToolDescriptor;
pub use handler::{FnHandler, HandlerError, ToolHandler, str_arg, usize_arg};
pub use schema::{InputSchema, ParamKind, ParamSpec, SchemaViolation, UnknownFieldPolicy};
