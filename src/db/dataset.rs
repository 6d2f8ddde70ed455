//! The dataset context object: schema, bindings and loaded records
//!
//! Lifecycle is `load_schema` → `register_bindings` → `load_instance`
//! (any number of times) → resolution. Entry handles borrow the dataset,
//! so nothing can be loaded while a handle is alive.

use std::path::Path;

use tracing::{debug, info};

use super::bindings::BindingTable;
use super::instance::{Instance, InstanceLoader, Record};
use super::macros::Macros;
use super::schema::{FieldDef, FieldType, RecordType, Schema};
use super::search_path::SearchPath;
use crate::common::{Error, Result};

/// Field used when an address names only a record
const DEFAULT_FIELD: &str = "VAL";

/// A loaded record database
#[derive(Debug)]
pub struct Dataset {
    schema: Schema,
    bindings: Option<BindingTable>,
    instance: Instance,
}

impl Dataset {
    /// Read and install a schema
    pub fn load_schema(file: impl AsRef<Path>, search_path: &SearchPath) -> Result<Self> {
        let file = file.as_ref();
        let schema = Schema::load(file, search_path)?;
        info!(
            file = %file.display(),
            record_types = schema.record_types().count(),
            "schema installed"
        );
        Ok(Self::from_schema(schema))
    }

    /// Wrap an already parsed schema
    pub fn from_schema(schema: Schema) -> Self {
        Self {
            schema,
            bindings: None,
            instance: Instance::default(),
        }
    }

    /// Attach runtime support to the schema's types
    ///
    /// Allowed exactly once, before any instance data is loaded.
    pub fn register_bindings(&mut self, table: BindingTable) -> Result<()> {
        if self.bindings.is_some() || self.instance.len() > 0 {
            return Err(Error::BindingsState);
        }
        table.validate(&self.schema)?;
        debug!(?table, "bindings registered");
        self.bindings = Some(table);
        Ok(())
    }

    /// Load instance data from a file, expanding macros from `parameters`
    ///
    /// On error no records from this file are kept.
    pub fn load_instance(
        &mut self,
        file: impl AsRef<Path>,
        search_path: &SearchPath,
        parameters: &Macros,
    ) -> Result<()> {
        let file = file.as_ref();
        let loaded = self.stage(search_path, parameters, |loader| loader.load_file(file))?;
        info!(file = %file.display(), loaded, total = self.len(), "instance loaded");
        Ok(())
    }

    /// Load instance data from text; includes resolve through `search_path`
    pub fn load_instance_str(
        &mut self,
        source: &str,
        text: &str,
        search_path: &SearchPath,
        parameters: &Macros,
    ) -> Result<()> {
        let loaded = self.stage(search_path, parameters, |loader| loader.load_str(source, text))?;
        info!(source, loaded, total = self.len(), "instance loaded");
        Ok(())
    }

    fn stage<F>(&mut self, search_path: &SearchPath, parameters: &Macros, load: F) -> Result<usize>
    where
        F: FnOnce(&mut InstanceLoader<'_>) -> Result<()>,
    {
        let bindings = self.bindings.as_ref().ok_or(Error::BindingsState)?;
        let mut loader =
            InstanceLoader::new(&self.instance, &self.schema, bindings, parameters, search_path);
        load(&mut loader)?;
        let (instance, created) = loader.finish()?;
        self.instance = instance;
        Ok(created)
    }

    /// Exact lookup of a record by name or alias
    pub fn resolve_by_name(&self, name: &str) -> Result<EntryHandle<'_>> {
        self.instance
            .lookup(name)
            .and_then(|record| self.handle(record))
            .ok_or_else(|| Error::NotFound {
                name: name.to_string(),
            })
    }

    /// Resolve `record` or `record.FIELD` to a record and one of its fields
    pub fn resolve_address(&self, address: &str) -> Result<(EntryHandle<'_>, FieldRef<'_>)> {
        let (name, field) = match address.split_once('.') {
            Some((name, field)) => (name, field),
            None => (address, DEFAULT_FIELD),
        };
        let entry = self.resolve_by_name(name)?;
        let field = entry.field(field).ok_or_else(|| Error::FieldNotFound {
            record: entry.name().to_string(),
            field: field.to_string(),
        })?;
        Ok((entry, field))
    }

    /// All records in load order
    pub fn records(&self) -> impl Iterator<Item = EntryHandle<'_>> {
        self.instance
            .records()
            .filter_map(|record| self.handle(record))
    }

    pub fn len(&self) -> usize {
        self.instance.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn handle<'a>(&'a self, record: &'a Record) -> Option<EntryHandle<'a>> {
        let record_type = self.schema.record_type(record.record_type())?;
        Some(EntryHandle {
            record,
            record_type,
        })
    }
}

impl Drop for Dataset {
    fn drop(&mut self) {
        debug!(records = self.instance.len(), "releasing dataset");
    }
}

/// Borrowed reference to one record of a [`Dataset`]
#[derive(Debug, Clone, Copy)]
pub struct EntryHandle<'a> {
    record: &'a Record,
    record_type: &'a RecordType,
}

impl<'a> EntryHandle<'a> {
    pub fn name(&self) -> &'a str {
        self.record.name()
    }

    pub fn type_name(&self) -> &'a str {
        &self.record_type.name
    }

    pub fn record_type(&self) -> &'a RecordType {
        self.record_type
    }

    pub fn record(&self) -> &'a Record {
        self.record
    }

    pub fn aliases(&self) -> &'a [String] {
        self.record.aliases()
    }

    pub fn info(&self, name: &str) -> Option<&'a str> {
        self.record.info(name)
    }

    /// A field of this record; `None` if the record type has no such field
    pub fn field(&self, name: &str) -> Option<FieldRef<'a>> {
        let def = self.record_type.field(name)?;
        Some(FieldRef {
            def,
            value: self.record.field(name),
        })
    }
}

/// A field definition together with the record's value for it
#[derive(Debug, Clone, Copy)]
pub struct FieldRef<'a> {
    def: &'a FieldDef,
    value: Option<&'a str>,
}

impl<'a> FieldRef<'a> {
    pub fn name(&self) -> &'a str {
        &self.def.name
    }

    pub fn field_type(&self) -> FieldType {
        self.def.field_type
    }

    pub fn definition(&self) -> &'a FieldDef {
        self.def
    }

    /// Whether the instance data set this field explicitly
    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    /// The set value, else the schema's initial value, else empty
    pub fn value(&self) -> &'a str {
        self.value
            .or(self.def.initial.as_deref())
            .unwrap_or("")
    }
}
