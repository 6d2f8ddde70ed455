//! Helpers shared by test procedures

use crate::common::Result;
use crate::db::{Dataset, EntryHandle};
use crate::tap::TestPlan;

/// Resolve `name` or abort the plan with `Missing record "<name>"`
///
/// Errors other than a missing record propagate unchanged.
pub fn require_record<'d>(
    plan: &mut TestPlan<'_>,
    dataset: &'d Dataset,
    name: &str,
) -> Result<EntryHandle<'d>> {
    match dataset.resolve_by_name(name) {
        Ok(entry) => Ok(entry),
        Err(e) if e.is_not_found() => Err(plan.abort(format!("Missing record \"{name}\""))),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Error;
    use crate::db::{BindingTable, Macros, Schema, SearchPath, SoftSupport};
    use crate::tap::PlanState;

    fn dataset() -> Dataset {
        let path = SearchPath::default();
        let schema = Schema::parse_str("t.dbd", "recordtype(ai) { field(VAL, DBF_DOUBLE) }", &path)
            .unwrap();
        let mut dataset = Dataset::from_schema(schema);
        dataset
            .register_bindings(BindingTable::new().record("ai", SoftSupport))
            .unwrap();
        dataset
            .load_instance_str("t.db", "record(ai, \"test:ai\")", &path, &Macros::new())
            .unwrap();
        dataset
    }

    #[test]
    fn test_present_record_resolves() {
        let dataset = dataset();
        let mut buf = Vec::new();
        let mut plan = TestPlan::new(&mut buf);
        plan.begin(1).unwrap();
        let entry = require_record(&mut plan, &dataset, "test:ai").unwrap();
        assert_eq!(entry.type_name(), "ai");
        assert_eq!(plan.state(), PlanState::Planned);
    }

    #[test]
    fn test_missing_record_aborts() {
        let dataset = dataset();
        let mut buf = Vec::new();
        let mut plan = TestPlan::new(&mut buf);
        plan.begin(1).unwrap();
        let err = require_record(&mut plan, &dataset, "test:nothing").unwrap_err();
        assert!(matches!(err, Error::Bail(ref reason) if reason == "Missing record \"test:nothing\""));
        assert_eq!(plan.state(), PlanState::Bailed);
    }
}
