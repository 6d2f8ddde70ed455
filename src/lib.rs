//! Record database test harness
//!
//! Loads a record schema and instance data into a [`db::Dataset`], resolves
//! records by name, and reports checks about them as TAP through a
//! [`tap::TestPlan`].

pub mod common;
pub mod db;
pub mod tap;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use db::{BindingTable, Dataset, EntryHandle, Macros, SearchPath};
pub use tap::{Harness, TestPlan};
