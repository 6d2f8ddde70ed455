//! Textual macro substitution applied to instance files before parsing
//!
//! References take the form `$(name)` or `${name}`, optionally with a
//! default: `$(name=fallback)`. Values and names may themselves contain
//! references.

use indexmap::IndexMap;

use crate::common::{Error, Result};

/// Named substitution parameters, in definition order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Macros {
    values: IndexMap<String, String>,
}

impl Macros {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define (or redefine) a macro
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Macros {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut macros = Macros::new();
        for (k, v) in iter {
            macros.set(k, v);
        }
        macros
    }
}

/// Parse a definition list such as `user=test,P="a, b"`
///
/// Commas inside double quotes do not separate definitions; surrounding
/// quotes are removed from values.
pub fn parse_definitions(input: &str) -> Result<Macros> {
    let invalid = |reason: &str| Error::MacroDefinition {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in input.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            ',' if !quoted => pieces.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    if quoted {
        return Err(invalid("unterminated quote"));
    }
    pieces.push(current);

    let mut macros = Macros::new();
    for piece in pieces.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
        let (name, value) = piece
            .split_once('=')
            .ok_or_else(|| invalid(&format!("'{piece}' is not of the form name=value")))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(invalid("empty macro name"));
        }
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        macros.set(name, value);
    }

    Ok(macros)
}

/// Expand every macro reference in `text`
pub fn expand(text: &str, macros: &Macros) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    expand_into(text, macros, &mut Vec::new(), &mut out)?;
    Ok(out)
}

fn expand_into(text: &str, macros: &Macros, active: &mut Vec<String>, out: &mut String) -> Result<()> {
    let mut rest = text;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (open, close) = match after.as_bytes().first() {
            Some(b'(') => (b'(', b')'),
            Some(b'{') => (b'{', b'}'),
            _ => {
                out.push('$');
                rest = after;
                continue;
            }
        };

        let inner = &after[1..];
        let end = matching_close(inner, open, close)
            .ok_or_else(|| Error::MacroSyntax(text.trim_end().to_string()))?;
        let reference = &inner[..end];
        rest = &inner[end + 1..];

        let (raw_name, default) = split_default(reference);
        let mut name = String::new();
        expand_into(raw_name, macros, active, &mut name)?;

        match macros.get(&name) {
            Some(value) => {
                if active.contains(&name) {
                    return Err(Error::MacroRecursion(name));
                }
                active.push(name);
                expand_into(value, macros, active, out)?;
                active.pop();
            }
            None => match default {
                Some(fallback) => expand_into(fallback, macros, active, out)?,
                None => return Err(Error::UndefinedMacro(name)),
            },
        }
    }

    out.push_str(rest);
    Ok(())
}

/// Index of the bracket closing a reference whose opener was already consumed
fn matching_close(text: &str, open: u8, close: u8) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in text.bytes().enumerate() {
        if b == open {
            depth += 1;
        } else if b == close {
            if depth == 0 {
                return Some(i);
            }
            depth -= 1;
        }
    }
    None
}

/// Split `name=default` at the first `=` outside nested references
fn split_default(reference: &str) -> (&str, Option<&str>) {
    let mut depth = 0usize;
    for (i, b) in reference.bytes().enumerate() {
        match b {
            b'(' | b'{' => depth += 1,
            b')' | b'}' => depth = depth.saturating_sub(1),
            b'=' if depth == 0 => return (&reference[..i], Some(&reference[i + 1..])),
            _ => {}
        }
    }
    (reference, None)
}
