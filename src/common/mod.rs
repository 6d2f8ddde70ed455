//! Common utilities shared by the loader and the test plan

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};
