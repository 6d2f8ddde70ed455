//! Record database loader and resolver
//!
//! A [`Dataset`] is built from a schema file, bound to runtime support,
//! filled from one or more instance files, and then queried by name.

mod bindings;
mod dataset;
mod instance;
pub mod macros;
mod schema;
mod search_path;
mod syntax;

pub use bindings::{BindingTable, RecordSupport, SoftSupport};
pub use dataset::{Dataset, EntryHandle, FieldRef};
pub use instance::Record;
pub use macros::{parse_definitions, Macros};
pub use schema::{DeviceSupport, FieldDef, FieldType, Menu, MenuChoice, RecordType, Schema};
pub use search_path::SearchPath;
