//! Test programs for the example application database

use tracing::debug;

use super::support::require_record;
use super::DatasetPaths;
use crate::common::Result;
use crate::db::{parse_definitions, BindingTable, Dataset, Record, RecordSupport, SoftSupport};
use crate::tap::TestPlan;

/// Schema file of the example application
pub const SCHEMA_FILE: &str = "exampleTest.dbd";

/// Instance file of the example application
pub const INSTANCE_FILE: &str = "dbExample1.db";

/// Macro definitions used when loading [`INSTANCE_FILE`]
pub const INSTANCE_MACROS: &str = "user=test";

/// Rejects records whose low operating range exceeds the high one
#[derive(Debug, Clone, Copy, Default)]
pub struct LimitsSupport;

impl RecordSupport for LimitsSupport {
    fn init_record(&self, record: &Record) -> std::result::Result<(), String> {
        let limit = |field: &str| -> std::result::Result<Option<f64>, String> {
            match record.field(field).map(str::trim) {
                None | Some("") => Ok(None),
                Some(value) => value
                    .parse()
                    .map(Some)
                    .map_err(|_| format!("{field} '{value}' is not a number")),
            }
        };
        if let (Some(low), Some(high)) = (limit("LOPR")?, limit("HOPR")?) {
            if low > high {
                return Err(format!("LOPR {low} is above HOPR {high}"));
            }
        }
        Ok(())
    }
}

/// Support for every type the example schema declares
pub fn example_bindings() -> BindingTable {
    BindingTable::new()
        .record("ai", LimitsSupport)
        .record("calc", SoftSupport)
        .record("xxx", LimitsSupport)
        .device("devAiSoft")
        .device("devXxxSoft")
}

/// Build the example dataset with the given instance macros
pub fn load_example(paths: &DatasetPaths, macros: &str) -> Result<Dataset> {
    let mut dataset = Dataset::load_schema(SCHEMA_FILE, &paths.schema)?;
    dataset.register_bindings(example_bindings())?;
    dataset.load_instance(INSTANCE_FILE, &paths.instance, &parse_definitions(macros)?)?;
    debug!(records = dataset.len(), "example dataset ready");
    Ok(dataset)
}

/// Check that the example application's records can be found
pub fn example_test(plan: &mut TestPlan<'_>, paths: &DatasetPaths) -> Result<()> {
    plan.begin(2)?;
    plan.diag("check that tests work")?;

    let dataset = load_example(paths, INSTANCE_MACROS)?;

    plan.diag("Searching for records from example application")?;
    for name in ["test:xxxExample", "test:aiExample"] {
        let entry = require_record(plan, &dataset, name)?;
        plan.ok(entry.name() == name, &format!("record {name}"))?;
    }
    Ok(())
}

/// Check field values and aliases of the example records
pub fn example_record_test(plan: &mut TestPlan<'_>, paths: &DatasetPaths) -> Result<()> {
    plan.begin(5)?;

    let dataset = load_example(paths, INSTANCE_MACROS)?;

    let calc = require_record(plan, &dataset, "test:calc")?;
    plan.ok(calc.name() == "test:calcExample", "alias test:calc names test:calcExample")?;

    let (_, egu) = dataset.resolve_address("test:aiExample.EGU")?;
    plan.ok(egu.value() == "Counts", "test:aiExample.EGU is Counts")?;

    let (_, scan) = dataset.resolve_address("test:calcExample.SCAN")?;
    plan.ok(scan.value() == "1 second", "test:calcExample scans every second")?;

    let xxx = require_record(plan, &dataset, "test:xxxExample")?;
    let scan = xxx.field("SCAN").map(|f| f.value());
    plan.ok(scan == Some("Passive"), "test:xxxExample.SCAN defaults to Passive")?;
    plan.ok(
        xxx.info("autosaveFields") == Some("VAL"),
        "test:xxxExample carries autosave info",
    )?;
    Ok(())
}
