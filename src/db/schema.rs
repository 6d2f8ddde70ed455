//! Dataset definition: menus, record types, fields and device support
//!
//! A schema is read from a `.dbd` file and everything it includes. Once
//! loaded it is immutable.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use indexmap::IndexMap;
use tracing::debug;

use super::search_path::SearchPath;
use super::syntax::{self, Item};
use crate::common::{Error, Result};

/// Nesting limit for `include`, which also stops include cycles
const MAX_INCLUDE_DEPTH: usize = 32;

/// Field storage types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Char,
    UChar,
    Short,
    UShort,
    Long,
    ULong,
    Int64,
    UInt64,
    Float,
    Double,
    Enum,
    Menu,
    Device,
    InLink,
    OutLink,
    FwdLink,
    NoAccess,
}

impl FieldType {
    /// Parse a `DBF_*` type name
    pub fn from_dbf(name: &str) -> Option<Self> {
        let ty = match name {
            "DBF_STRING" => Self::String,
            "DBF_CHAR" => Self::Char,
            "DBF_UCHAR" => Self::UChar,
            "DBF_SHORT" => Self::Short,
            "DBF_USHORT" => Self::UShort,
            "DBF_LONG" => Self::Long,
            "DBF_ULONG" => Self::ULong,
            "DBF_INT64" => Self::Int64,
            "DBF_UINT64" => Self::UInt64,
            "DBF_FLOAT" => Self::Float,
            "DBF_DOUBLE" => Self::Double,
            "DBF_ENUM" => Self::Enum,
            "DBF_MENU" => Self::Menu,
            "DBF_DEVICE" => Self::Device,
            "DBF_INLINK" => Self::InLink,
            "DBF_OUTLINK" => Self::OutLink,
            "DBF_FWDLINK" => Self::FwdLink,
            "DBF_NOACCESS" => Self::NoAccess,
            _ => return None,
        };
        Some(ty)
    }

    pub fn dbf_name(self) -> &'static str {
        match self {
            Self::String => "DBF_STRING",
            Self::Char => "DBF_CHAR",
            Self::UChar => "DBF_UCHAR",
            Self::Short => "DBF_SHORT",
            Self::UShort => "DBF_USHORT",
            Self::Long => "DBF_LONG",
            Self::ULong => "DBF_ULONG",
            Self::Int64 => "DBF_INT64",
            Self::UInt64 => "DBF_UINT64",
            Self::Float => "DBF_FLOAT",
            Self::Double => "DBF_DOUBLE",
            Self::Enum => "DBF_ENUM",
            Self::Menu => "DBF_MENU",
            Self::Device => "DBF_DEVICE",
            Self::InLink => "DBF_INLINK",
            Self::OutLink => "DBF_OUTLINK",
            Self::FwdLink => "DBF_FWDLINK",
            Self::NoAccess => "DBF_NOACCESS",
        }
    }

    /// Inclusive range for the integer types
    fn integer_range(self) -> Option<(i128, i128)> {
        let range = match self {
            Self::Char => (i8::MIN as i128, i8::MAX as i128),
            Self::UChar => (0, u8::MAX as i128),
            Self::Short => (i16::MIN as i128, i16::MAX as i128),
            Self::UShort => (0, u16::MAX as i128),
            Self::Long => (i32::MIN as i128, i32::MAX as i128),
            Self::ULong => (0, u32::MAX as i128),
            Self::Int64 => (i64::MIN as i128, i64::MAX as i128),
            Self::UInt64 => (0, u64::MAX as i128),
            _ => return None,
        };
        Some(range)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dbf_name())
    }
}

/// A named list of choices used by `DBF_MENU` fields
#[derive(Debug, Clone)]
pub struct Menu {
    pub name: String,
    pub choices: Vec<MenuChoice>,
}

#[derive(Debug, Clone)]
pub struct MenuChoice {
    pub id: String,
    pub text: String,
}

/// Field definition within a record type
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    pub prompt: Option<String>,
    pub menu: Option<String>,
    pub size: Option<usize>,
    pub initial: Option<String>,
}

/// Device support declared for a record type
#[derive(Debug, Clone)]
pub struct DeviceSupport {
    pub link_type: String,
    pub dset: String,
    pub choice: String,
}

/// A record type and its fields, in declaration order
#[derive(Debug, Clone)]
pub struct RecordType {
    pub name: String,
    pub fields: IndexMap<String, FieldDef>,
    pub devices: Vec<DeviceSupport>,
}

impl RecordType {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }

    pub fn device(&self, choice: &str) -> Option<&DeviceSupport> {
        self.devices.iter().find(|d| d.choice == choice)
    }
}

/// A complete dataset definition
#[derive(Debug, Clone, Default)]
pub struct Schema {
    menus: IndexMap<String, Menu>,
    record_types: IndexMap<String, RecordType>,
    drivers: BTreeSet<String>,
    registrars: BTreeSet<String>,
    variables: IndexMap<String, String>,
}

impl Schema {
    /// Read a schema file and everything it includes
    pub fn load(file: &Path, search_path: &SearchPath) -> Result<Self> {
        let mut schema = Schema::default();
        let mut path = search_path.clone();
        schema.read_file(file, &mut path, 0)?;
        debug!(
            record_types = schema.record_types.len(),
            menus = schema.menus.len(),
            "schema loaded"
        );
        Ok(schema)
    }

    /// Parse schema text; includes are resolved through `search_path`
    pub fn parse_str(source: &str, text: &str, search_path: &SearchPath) -> Result<Self> {
        let mut schema = Schema::default();
        let mut path = search_path.clone();
        let items = syntax::parse_items(source, text)?;
        schema.apply(source, &items, &mut path, 0)?;
        Ok(schema)
    }

    pub fn record_type(&self, name: &str) -> Option<&RecordType> {
        self.record_types.get(name)
    }

    pub fn record_types(&self) -> impl Iterator<Item = &RecordType> {
        self.record_types.values()
    }

    pub fn menu(&self, name: &str) -> Option<&Menu> {
        self.menus.get(name)
    }

    pub fn drivers(&self) -> impl Iterator<Item = &str> {
        self.drivers.iter().map(String::as_str)
    }

    pub fn registrars(&self) -> impl Iterator<Item = &str> {
        self.registrars.iter().map(String::as_str)
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    /// All device support entry table names across record types
    pub fn device_sets(&self) -> BTreeSet<&str> {
        self.record_types
            .values()
            .flat_map(|rt| rt.devices.iter().map(|d| d.dset.as_str()))
            .collect()
    }

    fn read_items(file: &Path, path: &SearchPath, depth: usize) -> Result<(String, Vec<Item>)> {
        if depth > MAX_INCLUDE_DEPTH {
            return Err(Error::file_read(file, "include nesting too deep"));
        }
        let (resolved, text) = path.read(file)?;
        let source = resolved.display().to_string();
        debug!(file = %source, depth, "reading schema file");
        let items = syntax::parse_items(&source, &text)?;
        Ok((source, items))
    }

    fn read_file(&mut self, file: &Path, path: &mut SearchPath, depth: usize) -> Result<()> {
        let (source, items) = Self::read_items(file, path, depth)?;
        self.apply(&source, &items, path, depth)
    }

    fn apply(&mut self, file: &str, items: &[Item], path: &mut SearchPath, depth: usize) -> Result<()> {
        for item in items {
            match item.keyword.as_str() {
                "include" => {
                    item.expect_args(file, 1, 1)?;
                    self.read_file(Path::new(&item.args[0]), path, depth + 1)?;
                }
                "path" => {
                    item.expect_args(file, 1, 1)?;
                    *path = SearchPath::parse(&item.args[0]);
                }
                "addpath" => {
                    item.expect_args(file, 1, 1)?;
                    path.extend(SearchPath::parse(&item.args[0]));
                }
                "menu" => self.add_menu(file, item)?,
                "recordtype" => self.add_record_type(file, item, path, depth)?,
                "device" => self.add_device(file, item)?,
                "driver" => {
                    item.expect_args(file, 1, 1)?;
                    self.drivers.insert(item.args[0].clone());
                }
                "registrar" | "function" => {
                    item.expect_args(file, 1, 1)?;
                    self.registrars.insert(item.args[0].clone());
                }
                "variable" => {
                    item.expect_args(file, 1, 2)?;
                    let ty = item.args.get(1).map(String::as_str).unwrap_or("int");
                    self.variables.insert(item.args[0].clone(), ty.to_string());
                }
                other => {
                    return Err(Error::parse(
                        file,
                        item.line,
                        format!("unknown schema keyword '{other}'"),
                    ))
                }
            }
        }
        Ok(())
    }

    fn add_menu(&mut self, file: &str, item: &Item) -> Result<()> {
        item.expect_args(file, 1, 1)?;
        let name = &item.args[0];
        if self.menus.contains_key(name) {
            debug!(menu = %name, "duplicate menu definition ignored");
            return Ok(());
        }

        let mut choices = Vec::new();
        for choice in item.body() {
            if choice.keyword != "choice" {
                return Err(Error::parse(
                    file,
                    choice.line,
                    format!("unexpected '{}' in menu '{name}'", choice.keyword),
                ));
            }
            choice.expect_args(file, 2, 2)?;
            choices.push(MenuChoice {
                id: choice.args[0].clone(),
                text: choice.args[1].clone(),
            });
        }

        self.menus.insert(
            name.clone(),
            Menu {
                name: name.clone(),
                choices,
            },
        );
        Ok(())
    }

    fn add_record_type(
        &mut self,
        file: &str,
        item: &Item,
        path: &mut SearchPath,
        depth: usize,
    ) -> Result<()> {
        item.expect_args(file, 1, 1)?;
        let name = &item.args[0];
        if self.record_types.contains_key(name) {
            debug!(record_type = %name, "duplicate record type definition ignored");
            return Ok(());
        }

        let mut fields = IndexMap::new();
        self.collect_fields(file, name, item.body(), path, depth, &mut fields)?;

        self.record_types.insert(
            name.clone(),
            RecordType {
                name: name.clone(),
                fields,
                devices: Vec::new(),
            },
        );
        Ok(())
    }

    fn collect_fields(
        &self,
        file: &str,
        record_type: &str,
        items: &[Item],
        path: &mut SearchPath,
        depth: usize,
        fields: &mut IndexMap<String, FieldDef>,
    ) -> Result<()> {
        for item in items {
            match item.keyword.as_str() {
                "field" => {
                    let def = self.parse_field(file, item)?;
                    if fields.contains_key(&def.name) {
                        return Err(Error::parse(
                            file,
                            item.line,
                            format!("field '{}' defined twice in '{record_type}'", def.name),
                        ));
                    }
                    fields.insert(def.name.clone(), def);
                }
                "include" => {
                    item.expect_args(file, 1, 1)?;
                    let (source, included) =
                        Self::read_items(Path::new(&item.args[0]), path, depth + 1)?;
                    self.collect_fields(&source, record_type, &included, path, depth + 1, fields)?;
                }
                other => {
                    return Err(Error::parse(
                        file,
                        item.line,
                        format!("unexpected '{other}' in record type '{record_type}'"),
                    ))
                }
            }
        }
        Ok(())
    }

    fn parse_field(&self, file: &str, item: &Item) -> Result<FieldDef> {
        item.expect_args(file, 2, 2)?;
        let field_type = FieldType::from_dbf(&item.args[1]).ok_or_else(|| {
            Error::parse(
                file,
                item.line,
                format!("unknown field type '{}'", item.args[1]),
            )
        })?;

        let mut def = FieldDef {
            name: item.args[0].clone(),
            field_type,
            prompt: None,
            menu: None,
            size: None,
            initial: None,
        };

        for attr in item.body() {
            attr.expect_args(file, 1, 1)?;
            let value = &attr.args[0];
            match attr.keyword.as_str() {
                "prompt" => def.prompt = Some(value.clone()),
                "menu" => def.menu = Some(value.clone()),
                "initial" => def.initial = Some(value.clone()),
                "size" => {
                    let size = value.parse().map_err(|_| {
                        Error::parse(file, attr.line, format!("invalid size '{value}'"))
                    })?;
                    def.size = Some(size);
                }
                "promptgroup" | "special" | "pp" | "interest" | "base" | "extra" | "asl"
                | "prop" => {}
                other => {
                    return Err(Error::parse(
                        file,
                        attr.line,
                        format!("unknown attribute '{other}' on field '{}'", def.name),
                    ))
                }
            }
        }

        match (field_type, &def.menu) {
            (FieldType::Menu, None) => Err(Error::parse(
                file,
                item.line,
                format!("menu field '{}' does not name a menu", def.name),
            )),
            (FieldType::Menu, Some(menu)) if !self.menus.contains_key(menu) => Err(Error::parse(
                file,
                item.line,
                format!("field '{}' uses undefined menu '{menu}'", def.name),
            )),
            _ => Ok(def),
        }
    }

    fn add_device(&mut self, file: &str, item: &Item) -> Result<()> {
        item.expect_args(file, 4, 4)?;
        let record_type = self.record_types.get_mut(&item.args[0]).ok_or_else(|| {
            Error::parse(
                file,
                item.line,
                format!("device support for undefined record type '{}'", item.args[0]),
            )
        })?;

        let choice = &item.args[3];
        if record_type.device(choice).is_some() {
            debug!(record_type = %record_type.name, choice = %choice, "duplicate device ignored");
            return Ok(());
        }
        record_type.devices.push(DeviceSupport {
            link_type: item.args[1].clone(),
            dset: item.args[2].clone(),
            choice: choice.clone(),
        });
        Ok(())
    }

    /// Check `value` against the definition of `field` in `record_type`
    ///
    /// Returns a message describing the problem on failure.
    pub fn check_value(
        &self,
        record_type: &RecordType,
        field: &FieldDef,
        value: &str,
    ) -> std::result::Result<(), String> {
        let trimmed = value.trim();
        match field.field_type {
            FieldType::String => match field.size {
                Some(size) if value.len() >= size => Err(format!(
                    "value for {} is {} bytes, limit is {}",
                    field.name,
                    value.len(),
                    size.saturating_sub(1)
                )),
                _ => Ok(()),
            },
            FieldType::Float | FieldType::Double => {
                if trimmed.is_empty() || trimmed.parse::<f64>().is_ok() {
                    Ok(())
                } else {
                    Err(format!("'{value}' is not a number for {}", field.name))
                }
            }
            FieldType::Menu => {
                let menu = field.menu.as_deref().and_then(|m| self.menus.get(m));
                let choices: Vec<&str> = menu
                    .map(|m| m.choices.iter().map(|c| c.text.as_str()).collect())
                    .unwrap_or_default();
                check_choice(&field.name, value, &choices)
            }
            FieldType::Device => {
                let choices: Vec<&str> =
                    record_type.devices.iter().map(|d| d.choice.as_str()).collect();
                check_choice(&field.name, value, &choices)
            }
            FieldType::NoAccess => Err(format!("field {} cannot be set", field.name)),
            FieldType::Enum | FieldType::InLink | FieldType::OutLink | FieldType::FwdLink => Ok(()),
            integer => {
                let Some((min, max)) = integer.integer_range() else {
                    return Ok(());
                };
                if trimmed.is_empty() {
                    return Ok(());
                }
                match parse_integer(trimmed) {
                    Some(n) if n >= min && n <= max => Ok(()),
                    Some(_) => Err(format!("'{value}' is out of range for {} ({integer})", field.name)),
                    None => Err(format!("'{value}' is not an integer for {}", field.name)),
                }
            }
        }
    }
}

fn check_choice(field: &str, value: &str, choices: &[&str]) -> std::result::Result<(), String> {
    if value.is_empty() || choices.contains(&value) {
        return Ok(());
    }
    match value.trim().parse::<usize>() {
        Ok(index) if index < choices.len() => Ok(()),
        _ => Err(format!(
            "'{value}' is not a valid choice for {field} (choices: {})",
            choices.join(", ")
        )),
    }
}

fn parse_integer(value: &str) -> Option<i128> {
    let (negative, digits) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.strip_prefix('+').unwrap_or(value)),
    };
    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i128::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i128>().ok()?,
    };
    Some(if negative { -magnitude } else { magnitude })
}
