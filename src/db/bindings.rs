//! Runtime support bound to the types a schema declares
//!
//! Every record type needs a [`RecordSupport`]; every device support table
//! and driver named in the schema must be registered by name.

use std::collections::BTreeSet;
use std::fmt;

use indexmap::IndexMap;

use super::instance::Record;
use super::schema::Schema;
use crate::common::{Error, Result};

/// Behavior attached to one record type
pub trait RecordSupport {
    /// Called once for each record of this type created by an instance load
    ///
    /// Returning an error rejects the whole load.
    fn init_record(&self, record: &Record) -> std::result::Result<(), String> {
        let _ = record;
        Ok(())
    }
}

/// Record support that accepts every record
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftSupport;

impl RecordSupport for SoftSupport {}

/// Registration table handed to [`Dataset::register_bindings`](super::Dataset::register_bindings)
#[derive(Default)]
pub struct BindingTable {
    records: IndexMap<String, Box<dyn RecordSupport>>,
    devices: BTreeSet<String>,
    drivers: BTreeSet<String>,
}

impl fmt::Debug for BindingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingTable")
            .field("records", &self.records.keys().collect::<Vec<_>>())
            .field("devices", &self.devices)
            .field("drivers", &self.drivers)
            .finish()
    }
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind record support to a record type
    pub fn record(mut self, record_type: &str, support: impl RecordSupport + 'static) -> Self {
        self.records
            .insert(record_type.to_string(), Box::new(support));
        self
    }

    /// Register a device support entry table by name
    pub fn device(mut self, dset: &str) -> Self {
        self.devices.insert(dset.to_string());
        self
    }

    /// Register a driver by name
    pub fn driver(mut self, name: &str) -> Self {
        self.drivers.insert(name.to_string());
        self
    }

    pub fn record_support(&self, record_type: &str) -> Option<&dyn RecordSupport> {
        self.records.get(record_type).map(|s| s.as_ref())
    }

    /// Check that the table and the schema cover each other exactly
    pub(crate) fn validate(&self, schema: &Schema) -> Result<()> {
        for name in self.records.keys() {
            if schema.record_type(name).is_none() {
                return Err(Error::UnknownBinding {
                    kind: "record type",
                    name: name.clone(),
                });
            }
        }
        for record_type in schema.record_types() {
            if !self.records.contains_key(&record_type.name) {
                return Err(Error::MissingBinding {
                    kind: "record type",
                    name: record_type.name.clone(),
                });
            }
        }

        check_names("device support", &self.devices, schema.device_sets())?;
        check_names("driver", &self.drivers, schema.drivers().collect())
    }
}

fn check_names(kind: &'static str, bound: &BTreeSet<String>, declared: BTreeSet<&str>) -> Result<()> {
    if let Some(name) = bound.iter().find(|n| !declared.contains(n.as_str())) {
        return Err(Error::UnknownBinding {
            kind,
            name: name.clone(),
        });
    }
    if let Some(name) = declared.iter().find(|n| !bound.contains(**n)) {
        return Err(Error::MissingBinding {
            kind,
            name: name.to_string(),
        });
    }
    Ok(())
}
