//! Instance data: the named records populated from `.db` files
//!
//! Loading works on a staged copy of the instance so that a failed file
//! leaves the previously loaded records untouched.

use std::collections::HashMap;
use std::path::Path;

use indexmap::IndexMap;
use tracing::debug;

use super::bindings::BindingTable;
use super::macros::{self, Macros};
use super::schema::{RecordType, Schema};
use super::search_path::SearchPath;
use super::syntax::{self, Item};
use crate::common::{Error, Result};

const MAX_INCLUDE_DEPTH: usize = 32;

/// One record in the dataset instance
#[derive(Debug, Clone)]
pub struct Record {
    name: String,
    record_type: String,
    fields: IndexMap<String, String>,
    info: IndexMap<String, String>,
    aliases: Vec<String>,
}

impl Record {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record_type(&self) -> &str {
        &self.record_type
    }

    /// Value explicitly set on this record for `field`
    pub fn field(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Explicitly set fields, in the order they were first set
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn info(&self, name: &str) -> Option<&str> {
        self.info.get(name).map(String::as_str)
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }
}

/// All records and aliases loaded so far
#[derive(Debug, Clone, Default)]
pub(crate) struct Instance {
    records: IndexMap<String, Record>,
    aliases: HashMap<String, String>,
}

impl Instance {
    /// Exact lookup by record name or alias
    pub fn lookup(&self, name: &str) -> Option<&Record> {
        self.records.get(name).or_else(|| {
            self.aliases
                .get(name)
                .and_then(|target| self.records.get(target))
        })
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    fn name_in_use(&self, name: &str) -> bool {
        self.records.contains_key(name) || self.aliases.contains_key(name)
    }
}

/// Reads instance files into a staged copy of an [`Instance`]
pub(crate) struct InstanceLoader<'a> {
    schema: &'a Schema,
    bindings: &'a BindingTable,
    macros: &'a Macros,
    search_path: &'a SearchPath,
    staged: Instance,
    created: Vec<String>,
}

impl<'a> InstanceLoader<'a> {
    pub fn new(
        current: &Instance,
        schema: &'a Schema,
        bindings: &'a BindingTable,
        macros: &'a Macros,
        search_path: &'a SearchPath,
    ) -> Self {
        Self {
            schema,
            bindings,
            macros,
            search_path,
            staged: current.clone(),
            created: Vec::new(),
        }
    }

    pub fn load_file(&mut self, file: &Path) -> Result<()> {
        self.read_file(file, 0)
    }

    pub fn load_str(&mut self, source: &str, text: &str) -> Result<()> {
        self.apply_text(source, text, 0)
    }

    /// Run record support for every new record and hand back the result
    pub fn finish(self) -> Result<(Instance, usize)> {
        for name in &self.created {
            let Some(record) = self.staged.records.get(name) else {
                continue;
            };
            let support = self
                .bindings
                .record_support(&record.record_type)
                .ok_or_else(|| Error::MissingBinding {
                    kind: "record type",
                    name: record.record_type.clone(),
                })?;
            support
                .init_record(record)
                .map_err(|message| Error::InitRecord {
                    record: name.clone(),
                    message,
                })?;
        }
        let created = self.created.len();
        Ok((self.staged, created))
    }

    fn read_file(&mut self, file: &Path, depth: usize) -> Result<()> {
        if depth > MAX_INCLUDE_DEPTH {
            return Err(Error::file_read(file, "include nesting too deep"));
        }
        let (resolved, text) = self.search_path.read(file)?;
        let source = resolved.display().to_string();
        debug!(file = %source, "reading instance file");
        self.apply_text(&source, &text, depth)
    }

    fn apply_text(&mut self, source: &str, text: &str, depth: usize) -> Result<()> {
        // Expanded one line at a time so macro errors carry a position
        let mut expanded = String::with_capacity(text.len());
        for (index, line) in text.split_inclusive('\n').enumerate() {
            if line.trim_start().starts_with(['#', '%']) {
                expanded.push_str(line);
                continue;
            }
            let line = macros::expand(line, self.macros)
                .map_err(|e| Error::parse(source, index + 1, e.to_string()))?;
            expanded.push_str(&line);
        }
        let items = syntax::parse_items(source, &expanded)?;

        for item in &items {
            match item.keyword.as_str() {
                "record" | "grecord" => self.add_record(source, item)?,
                "alias" => {
                    item.expect_args(source, 2, 2)?;
                    let target = self
                        .staged
                        .lookup(&item.args[0])
                        .map(|r| r.name.clone())
                        .ok_or_else(|| {
                            Error::parse(
                                source,
                                item.line,
                                format!("alias target record \"{}\" not found", item.args[0]),
                            )
                        })?;
                    self.add_alias(source, item.line, &target, &item.args[1])?;
                }
                "include" => {
                    item.expect_args(source, 1, 1)?;
                    self.read_file(Path::new(&item.args[0]), depth + 1)?;
                }
                other => {
                    return Err(Error::parse(
                        source,
                        item.line,
                        format!("unexpected '{other}' in instance file"),
                    ))
                }
            }
        }
        Ok(())
    }

    fn add_record(&mut self, source: &str, item: &Item) -> Result<()> {
        item.expect_args(source, 2, 2)?;
        let (type_name, name) = (item.args[0].as_str(), item.args[1].as_str());
        check_record_name(source, item.line, name)?;

        let schema = self.schema;
        let record_type: &RecordType = if type_name == "*" {
            let existing = self.staged.records.get(name).ok_or_else(|| {
                Error::parse(
                    source,
                    item.line,
                    format!("record \"{name}\" must already exist to use type '*'"),
                )
            })?;
            schema
                .record_type(&existing.record_type)
                .ok_or_else(|| Error::UndefinedType(existing.record_type.clone()))?
        } else {
            schema
                .record_type(type_name)
                .ok_or_else(|| Error::UndefinedType(type_name.to_string()))?
        };

        match self.staged.records.get(name) {
            Some(existing) if existing.record_type != record_type.name => {
                return Err(Error::TypeRedefined {
                    name: name.to_string(),
                    existing: existing.record_type.clone(),
                    requested: record_type.name.clone(),
                });
            }
            Some(_) => debug!(record = %name, "re-opening record"),
            None => {
                if self.staged.aliases.contains_key(name) {
                    return Err(Error::DuplicateName(name.to_string()));
                }
                self.staged.records.insert(
                    name.to_string(),
                    Record {
                        name: name.to_string(),
                        record_type: record_type.name.clone(),
                        fields: IndexMap::new(),
                        info: IndexMap::new(),
                        aliases: Vec::new(),
                    },
                );
                self.created.push(name.to_string());
                debug!(record = %name, record_type = %record_type.name, "record created");
            }
        }

        for entry in item.body() {
            match entry.keyword.as_str() {
                "field" => {
                    entry.expect_args(source, 2, 2)?;
                    let (field, value) = (&entry.args[0], &entry.args[1]);
                    let def = record_type.field(field).ok_or_else(|| {
                        Error::invalid_field(
                            name,
                            format!("record type '{}' has no field '{field}'", record_type.name),
                        )
                    })?;
                    schema
                        .check_value(record_type, def, value)
                        .map_err(|message| Error::invalid_field(name, message))?;
                    self.record_mut(name)?
                        .fields
                        .insert(field.clone(), value.clone());
                }
                "info" => {
                    entry.expect_args(source, 2, 2)?;
                    self.record_mut(name)?
                        .info
                        .insert(entry.args[0].clone(), entry.args[1].clone());
                }
                "alias" => {
                    entry.expect_args(source, 1, 1)?;
                    self.add_alias(source, entry.line, name, &entry.args[0])?;
                }
                other => {
                    return Err(Error::parse(
                        source,
                        entry.line,
                        format!("unexpected '{other}' in record \"{name}\""),
                    ))
                }
            }
        }
        Ok(())
    }

    fn record_mut(&mut self, name: &str) -> Result<&mut Record> {
        self.staged
            .records
            .get_mut(name)
            .ok_or_else(|| Error::NotFound {
                name: name.to_string(),
            })
    }

    fn add_alias(&mut self, source: &str, line: usize, target: &str, alias: &str) -> Result<()> {
        check_record_name(source, line, alias)?;
        if self.staged.name_in_use(alias) {
            return Err(Error::DuplicateName(alias.to_string()));
        }
        self.record_mut(target)?.aliases.push(alias.to_string());
        self.staged
            .aliases
            .insert(alias.to_string(), target.to_string());
        Ok(())
    }
}

/// Record names and aliases may not be empty or contain whitespace, quotes or `.`
fn check_record_name(source: &str, line: usize, name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '.' | '"' | '\''));
    if bad {
        return Err(Error::parse(
            source,
            line,
            format!("invalid record name \"{name}\""),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::bindings::{RecordSupport, SoftSupport};

    const SCHEMA: &str = r#"
        menu(menuScan) {
            choice(menuScanPassive, "Passive")
            choice(menuScan1_second, "1 second")
        }
        recordtype(ai) {
            field(NAME, DBF_STRING) { size(61) }
            field(DESC, DBF_STRING) { size(41) }
            field(SCAN, DBF_MENU) { menu(menuScan) }
            field(VAL, DBF_DOUBLE)
        }
        recordtype(bi) {
            field(NAME, DBF_STRING) { size(61) }
            field(VAL, DBF_ENUM)
        }
    "#;

    struct Fixture {
        schema: Schema,
        bindings: BindingTable,
        macros: Macros,
        path: SearchPath,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                schema: Schema::parse_str("t.dbd", SCHEMA, &SearchPath::default()).unwrap(),
                bindings: BindingTable::new()
                    .record("ai", SoftSupport)
                    .record("bi", SoftSupport),
                macros: [("P", "lab")].into_iter().collect(),
                path: SearchPath::default(),
            }
        }

        fn load(&self, current: &Instance, text: &str) -> Result<Instance> {
            let mut loader =
                InstanceLoader::new(current, &self.schema, &self.bindings, &self.macros, &self.path);
            loader.load_str("t.db", text)?;
            loader.finish().map(|(instance, _)| instance)
        }
    }

    #[test]
    fn test_records_and_aliases() {
        let fx = Fixture::new();
        let instance = fx
            .load(
                &Instance::default(),
                r#"
                record(ai, "$(P):temp") {
                    field(SCAN, "1 second")
                    field(VAL, "21.5")
                    info(autosaveFields, "VAL")
                    alias("$(P):t")
                }
                alias("$(P):temp", "$(P):temperature")
                "#,
            )
            .unwrap();

        assert_eq!(instance.len(), 1);
        let record = instance.lookup("lab:temp").unwrap();
        assert_eq!(record.record_type(), "ai");
        assert_eq!(record.field("VAL"), Some("21.5"));
        assert_eq!(record.info("autosaveFields"), Some("VAL"));
        assert_eq!(record.aliases(), &["lab:t", "lab:temperature"]);
        assert_eq!(instance.lookup("lab:t").unwrap().name(), "lab:temp");
        assert!(instance.lookup("lab:tem").is_none());
    }

    #[test]
    fn test_reopen_same_type_adds_fields() {
        let fx = Fixture::new();
        let first = fx
            .load(&Instance::default(), "record(ai, \"r\") { field(VAL, \"1\") }")
            .unwrap();
        let second = fx
            .load(&first, "record(ai, \"r\") { field(DESC, \"d\") }\nrecord(\"*\", \"r\") { field(VAL, \"2\") }")
            .unwrap();
        let record = second.lookup("r").unwrap();
        assert_eq!(record.field("VAL"), Some("2"));
        assert_eq!(record.field("DESC"), Some("d"));
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn test_type_redefinition_rejected() {
        let fx = Fixture::new();
        let err = fx
            .load(&Instance::default(), "record(ai, \"r\")\nrecord(bi, \"r\")")
            .unwrap_err();
        assert!(matches!(err, Error::TypeRedefined { ref existing, .. } if existing == "ai"));
    }

    #[test]
    fn test_undefined_type() {
        let fx = Fixture::new();
        let err = fx.load(&Instance::default(), "record(calc, \"r\")").unwrap_err();
        assert!(matches!(err, Error::UndefinedType(ref t) if t == "calc"));
    }

    #[test]
    fn test_field_errors() {
        let fx = Fixture::new();
        let err = fx
            .load(&Instance::default(), "record(ai, \"r\") { field(EGU, \"mm\") }")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Record \"r\": record type 'ai' has no field 'EGU'"
        );

        let err = fx
            .load(&Instance::default(), "record(ai, \"r\") { field(SCAN, \"2 second\") }")
            .unwrap_err();
        assert!(err.to_string().contains("not a valid choice for SCAN"));
    }

    #[test]
    fn test_alias_collisions() {
        let fx = Fixture::new();
        let err = fx
            .load(&Instance::default(), "record(ai, \"a\")\nrecord(ai, \"b\") { alias(\"a\") }")
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateName(ref n) if n == "a"));

        let err = fx
            .load(&Instance::default(), "record(ai, \"a\") { alias(\"x\") }\nrecord(ai, \"x\")")
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateName(ref n) if n == "x"));
    }

    #[test]
    fn test_invalid_record_name() {
        let fx = Fixture::new();
        let err = fx.load(&Instance::default(), "record(ai, \"a.VAL\")").unwrap_err();
        assert_eq!(err.to_string(), "t.db:1: invalid record name \"a.VAL\"");
    }

    #[test]
    fn test_undefined_macro_is_a_parse_error() {
        let fx = Fixture::new();
        let err = fx
            .load(&Instance::default(), "record(ai, \"$(IOC):x\")")
            .unwrap_err();
        assert!(matches!(err, Error::Parse { ref message, .. } if message == "Macro 'IOC' is undefined"));
    }

    #[test]
    fn test_init_record_rejection() {
        struct RequireDesc;
        impl RecordSupport for RequireDesc {
            fn init_record(&self, record: &Record) -> std::result::Result<(), String> {
                record.field("DESC").map(|_| ()).ok_or_else(|| "DESC is required".to_string())
            }
        }

        let mut fx = Fixture::new();
        fx.bindings = BindingTable::new()
            .record("ai", RequireDesc)
            .record("bi", SoftSupport);
        let err = fx
            .load(&Instance::default(), "record(ai, \"r\") { field(VAL, \"1\") }")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Record \"r\": record support rejected it: DESC is required"
        );
    }

    #[test]
    fn test_alias_names_are_checked() {
        let fx = Fixture::new();
        let err = fx
            .load(&Instance::default(), "record(ai, \"a\") { alias(\"\") }")
            .unwrap_err();
        assert_eq!(err.to_string(), "t.db:1: invalid record name \"\"");

        let err = fx
            .load(&Instance::default(), "record(ai, \"a\")\nalias(\"a\", \"b.VAL\")")
            .unwrap_err();
        assert_eq!(err.to_string(), "t.db:2: invalid record name \"b.VAL\"");

        let err = fx
            .load(&Instance::default(), "record(ai, \"a\") {\n    alias(\"c d\")\n}")
            .unwrap_err();
        assert_eq!(err.to_string(), "t.db:2: invalid record name \"c d\"");
    }

    #[test]
    fn test_comment_lines_are_not_expanded() {
        let fx = Fixture::new();
        let instance = fx
            .load(
                &Instance::default(),
                "# needs $(IOC)\n  % also $(IOC)\nrecord(ai, \"$(P):x\") # trailing $(P)\n",
            )
            .unwrap();
        assert!(instance.lookup("lab:x").is_some());
    }

    #[test]
    fn test_include_reads_through_search_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("inner.db"),
            "record(bi, \"$(P):inner\")\nalias(\"$(P):outer\", \"$(P):o\")\n",
        )
        .unwrap();

        let mut fx = Fixture::new();
        fx.path = SearchPath::new([dir.path()]);
        let instance = fx
            .load(
                &Instance::default(),
                "record(ai, \"$(P):outer\")\ninclude \"inner.db\"\n",
            )
            .unwrap();
        assert_eq!(instance.len(), 2);
        assert_eq!(instance.lookup("lab:inner").unwrap().record_type(), "bi");
        assert_eq!(instance.lookup("lab:o").unwrap().name(), "lab:outer");

        let err = fx
            .load(&Instance::default(), "include \"missing.db\"")
            .unwrap_err();
        assert!(matches!(err, Error::FileRead { ref path, .. } if path == "missing.db"));
    }
}
