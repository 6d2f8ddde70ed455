//! Test programs run by `recdb-test`
//!
//! Each program loads its own dataset and makes its assertions through a
//! [`TestPlan`](crate::tap::TestPlan). Programs run one after another under
//! a single [`Harness`].

mod example;
mod support;

use std::io::Write;

use crate::common::config::Config;
use crate::common::Result;
use crate::db::SearchPath;
use crate::tap::{Harness, TestPlan};

pub use example::{
    example_bindings, example_record_test, example_test, load_example, LimitsSupport,
    INSTANCE_FILE, INSTANCE_MACROS, SCHEMA_FILE,
};
pub use support::require_record;

/// Search paths used to locate dataset files
#[derive(Debug, Clone, Default)]
pub struct DatasetPaths {
    pub schema: SearchPath,
    pub instance: SearchPath,
}

impl DatasetPaths {
    pub fn from_config(config: &Config) -> Self {
        Self {
            schema: SearchPath::new(config.paths.schema.iter().cloned()),
            instance: SearchPath::new(config.paths.instance.iter().cloned()),
        }
    }

    /// Use one directory for both kinds of file
    pub fn single(dir: impl Into<std::path::PathBuf>) -> Self {
        let path = SearchPath::new([dir.into()]);
        Self {
            schema: path.clone(),
            instance: path,
        }
    }
}

/// A test program: declares a plan and makes assertions
pub type Procedure = fn(&mut TestPlan<'_>, &DatasetPaths) -> Result<()>;

/// Every program, in run order
pub const PROGRAMS: &[(&str, Procedure)] = &[
    ("exampleTest", example_test as Procedure),
    ("exampleRecordTest", example_record_test as Procedure),
];

/// Run every program in [`PROGRAMS`] under `harness`
pub fn run_all<W: Write>(harness: &mut Harness<W>, paths: &DatasetPaths) -> Result<()> {
    for (name, procedure) in PROGRAMS {
        harness.run(name, |plan| procedure(plan, paths))?;
    }
    Ok(())
}
