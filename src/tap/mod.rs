//! TAP test plan controller
//!
//! Emits the line protocol consumed by TAP aggregators:
//!
//! ```text
//! 1..2
//! ok 1 - record test:xxxExample
//! not ok 2 - record test:aiExample
//! Bail out! Missing record "test:aiExample"
//! ```

mod harness;
mod plan;

pub use harness::{Harness, ProgramResult, EXIT_BAILED};
pub use plan::{
    harness_active, PlanCounts, PlanState, TestPlan, EXIT_FAILED, EXIT_PLAN_MISMATCH,
};
