//! End-to-end tests for the record database harness
//!
//! These tests load the shipped example dataset from `db/`, run the test
//! programs through a [`Harness`], and check the TAP stream they produce.

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use recdb_harness::db::parse_definitions;
use recdb_harness::tap::{Harness, EXIT_BAILED, EXIT_PLAN_MISMATCH};
use recdb_harness::testing::{self, example_bindings, DatasetPaths};
use recdb_harness::{Dataset, Error, Macros, SearchPath};

/// Directory holding the shipped dataset files
fn db_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("db")
}

/// Scratch dataset directory seeded with the shipped schema files
struct TestContext {
    dir: tempfile::TempDir,
}

impl TestContext {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        for file in ["menuGlobal.dbd", "dbCommon.dbd", "exampleTest.dbd"] {
            fs::copy(db_dir().join(file), dir.path().join(file)).expect("Failed to copy schema");
        }
        Self { dir }
    }

    fn write(&self, name: &str, content: &str) -> &Self {
        fs::write(self.dir.path().join(name), content).expect("Failed to write dataset file");
        self
    }

    fn paths(&self) -> DatasetPaths {
        DatasetPaths::single(self.dir.path())
    }
}

/// Run procedures by name and return (exit codes, summary code, TAP text)
fn run_programs(paths: &DatasetPaths, names: &[&str]) -> (Vec<i32>, i32, String) {
    let mut buf = Vec::new();
    let mut harness = Harness::new(&mut buf).with_plan_summary(false);
    let mut codes = Vec::new();
    for name in names {
        let (_, procedure) = testing::PROGRAMS
            .iter()
            .find(|(n, _)| n == name)
            .expect("unknown program");
        codes.push(harness.run(name, |plan| procedure(plan, paths)).unwrap());
    }
    let summary = harness.finish().unwrap();
    drop(harness);
    (codes, summary, String::from_utf8(buf).unwrap())
}

#[test]
fn test_example_program_passes() {
    let (codes, summary, text) = run_programs(&DatasetPaths::single(db_dir()), &["exampleTest"]);
    assert_eq!(codes, vec![0]);
    assert_eq!(summary, 0);
    assert!(text.starts_with(
        "\n***** exampleTest *****\n\
         1..2\n\
         # check that tests work\n\
         # Searching for records from example application\n\
         ok 1 - record test:xxxExample\n\
         ok 2 - record test:aiExample\n"
    ));
    assert!(text.contains("\nAll tests successful.\n"));
    assert!(text.contains("Programs=1, Tests=2, "));
}

#[test]
fn test_all_programs_pass() {
    let names: Vec<&str> = testing::PROGRAMS.iter().map(|(n, _)| *n).collect();
    let (codes, summary, text) = run_programs(&DatasetPaths::single(db_dir()), &names);
    assert!(codes.iter().all(|c| *c == 0), "{text}");
    assert_eq!(summary, 0);
    assert!(!text.contains("not ok"));
}

#[test]
fn test_missing_record_bails_out() {
    let ctx = TestContext::new();
    ctx.write(
        "dbExample1.db",
        r#"
        record(ai, "$(user):aiExample") { field(EGU, "Counts") }
        "#,
    );

    let paths = ctx.paths();
    let (codes, summary, text) = run_programs(&paths, &["exampleTest", "exampleRecordTest"]);
    assert_eq!(codes[0], EXIT_BAILED);
    assert_eq!(summary, 1);
    assert!(text.contains(
        "# Searching for records from example application\n\
         Bail out! Missing record \"test:xxxExample\"\n"
    ));
    // The next program still runs
    assert!(text.contains("***** exampleRecordTest *****\n1..5\n"));
    assert!(text.contains("Failing Program"));
}

#[test]
fn test_broken_schema_bails_out() {
    let ctx = TestContext::new();
    ctx.write("exampleTest.dbd", "recordtype(ai) {\n    field(VAL, DBF_NOPE)\n}\n");
    let (codes, _, text) = run_programs(&ctx.paths(), &["exampleTest"]);
    assert_eq!(codes, vec![EXIT_BAILED]);
    assert!(text.contains(":2: unknown field type 'DBF_NOPE'"), "{text}");
    assert!(!text.contains("ok 1"));
}

#[test]
fn test_missing_schema_file_bails_out() {
    let dir = tempfile::tempdir().unwrap();
    let (codes, _, text) = run_programs(&DatasetPaths::single(dir.path()), &["exampleTest"]);
    assert_eq!(codes, vec![EXIT_BAILED]);
    assert!(text.contains("Bail out! Failed to read file 'exampleTest.dbd'"));
}

#[test]
fn test_plan_mismatch_is_reported() {
    let paths = DatasetPaths::single(db_dir());
    let mut buf = Vec::new();
    let mut harness = Harness::new(&mut buf).with_plan_summary(false);
    let code = harness
        .run("overPlanned", |plan| {
            plan.begin(3)?;
            let dataset = testing::load_example(&paths, testing::INSTANCE_MACROS)?;
            let entry = testing::require_record(plan, &dataset, "test:aiExample")?;
            plan.ok(entry.type_name() == "ai", "test:aiExample is an ai record")?;
            Ok(())
        })
        .unwrap();
    assert_eq!(code, EXIT_PLAN_MISMATCH);
    drop(harness);
    let text = String::from_utf8(buf).unwrap();
    assert!(text.contains("ok 1 - test:aiExample is an ai record\n# Planned 3 tests but only ran 1\n"));
}

#[test]
fn test_instance_macros_choose_record_names() {
    let paths = DatasetPaths::single(db_dir());
    let dataset = testing::load_example(&paths, "user=other, scan=Event").unwrap();

    let err = dataset.resolve_by_name("test:aiExample").unwrap_err();
    assert!(matches!(err, Error::NotFound { ref name } if name == "test:aiExample"));

    let entry = dataset.resolve_by_name("other:xxxExample").unwrap();
    assert_eq!(entry.field("SCAN").unwrap().value(), "Event");
    assert_eq!(
        dataset.resolve_by_name("other:calc").unwrap().name(),
        "other:calcExample"
    );
    assert_eq!(dataset.len(), 3);
}

#[test]
fn test_undefined_macro_fails_load() {
    let paths = DatasetPaths::single(db_dir());
    let mut dataset = Dataset::load_schema(testing::SCHEMA_FILE, &paths.schema).unwrap();
    dataset.register_bindings(example_bindings()).unwrap();

    let err = dataset
        .load_instance(testing::INSTANCE_FILE, &paths.instance, &Macros::new())
        .unwrap_err();
    assert!(err.to_string().contains("Macro 'user' is undefined"), "{err}");
    assert!(dataset.is_empty());
}

#[test]
fn test_second_load_adds_records() {
    let ctx = TestContext::new();
    ctx.write("extra.db", "record(calc, \"$(user):extra\")\nalias(\"$(user):extra\", \"$(user):x\")\n");

    let paths = DatasetPaths::single(db_dir());
    let mut dataset = testing::load_example(&paths, "user=test").unwrap();
    let extra_path = SearchPath::new([ctx.dir.path()]);
    dataset
        .load_instance("extra.db", &extra_path, &parse_definitions("user=test").unwrap())
        .unwrap();

    assert_eq!(dataset.len(), 4);
    assert_eq!(dataset.resolve_by_name("test:x").unwrap().name(), "test:extra");

    // Loading the same file again clashes with the existing alias
    let err = dataset
        .load_instance("extra.db", &extra_path, &parse_definitions("user=test").unwrap())
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateName(ref name) if name == "test:x"));
    assert_eq!(dataset.len(), 4);
}

#[test]
fn test_schema_with_unbound_device_is_rejected() {
    let ctx = TestContext::new();
    let schema = fs::read_to_string(ctx.dir.path().join("exampleTest.dbd")).unwrap();
    ctx.write(
        "exampleTest.dbd",
        &format!("{schema}\ndevice(calc, CONSTANT, devCalcSoft, \"Soft Channel\")\n"),
    );

    let paths = ctx.paths();
    let mut dataset = Dataset::load_schema(testing::SCHEMA_FILE, &paths.schema).unwrap();
    let err = dataset.register_bindings(example_bindings()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "No support registered for device support 'devCalcSoft'"
    );
}

/// The binary, run from the crate root, finds `db/` through the default
/// search path
#[test]
fn test_cli_runs_all_programs() {
    let config_home = tempfile::tempdir().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_recdb-test"))
        .current_dir(env!("CARGO_MANIFEST_DIR"))
        .env("XDG_CONFIG_HOME", config_home.path())
        .env_remove("RECDB_SCHEMA_PATH")
        .env_remove("RECDB_INSTANCE_PATH")
        .env_remove("HARNESS_ACTIVE")
        .output()
        .expect("Failed to run recdb-test");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stdout:\n{stdout}");
    assert!(stdout.contains("ok 1 - record test:xxxExample\nok 2 - record test:aiExample\n"));
    assert!(stdout.contains("    Results\n    =======\n"));
    assert!(stdout.contains("All tests successful."));
}

#[test]
fn test_cli_uses_configured_paths() {
    let ctx = TestContext::new();
    ctx.write("dbExample1.db", "record(xxx, \"$(user):xxxExample\")\n");
    let config_home = tempfile::tempdir().unwrap();
    let config_dir = config_home.path().join("recdb-harness");
    fs::create_dir_all(&config_dir).unwrap();
    let report = config_home.path().join("report.json");
    fs::write(
        config_dir.join("config.toml"),
        format!(
            "[paths]\nschema = [{dir:?}]\ninstance = [{dir:?}]\n\n[output]\nreport = {report:?}\n",
            dir = ctx.dir.path().display().to_string(),
            report = report.display().to_string(),
        ),
    )
    .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_recdb-test"))
        .current_dir(config_home.path())
        .env("XDG_CONFIG_HOME", config_home.path())
        .env_remove("RECDB_SCHEMA_PATH")
        .env_remove("RECDB_INSTANCE_PATH")
        .env("HARNESS_ACTIVE", "1")
        .output()
        .expect("Failed to run recdb-test");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(output.status.code(), Some(1), "stdout:\n{stdout}");
    assert!(stdout.contains("ok 1 - record test:xxxExample\nBail out! Missing record \"test:aiExample\"\n"));
    assert!(!stdout.contains("    Results"));

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(report["programs"][0]["name"], "exampleTest");
    assert_eq!(report["programs"][0]["bail_out"], "Missing record \"test:aiExample\"");
}
