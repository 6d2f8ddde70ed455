//! Directory search paths for schema and instance files

use std::fmt;
use std::path::{Path, PathBuf};

use crate::common::{Error, Result};

/// Ordered list of directories searched when opening a dataset file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    /// Build a search path from a list of directories
    pub fn new<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            dirs: dirs.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse an OS path list (`a:b` on Unix, `a;b` on Windows)
    pub fn parse(list: &str) -> Self {
        Self {
            dirs: std::env::split_paths(list)
                .filter(|dir| !dir.as_os_str().is_empty())
                .collect(),
        }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Append directories to the end of the path
    pub fn extend(&mut self, other: SearchPath) {
        self.dirs.extend(other.dirs);
    }

    /// Locate `file` on the search path
    ///
    /// Names with more than one component, absolute names, and any name
    /// looked up on an empty path are used as given.
    pub fn find(&self, file: &Path) -> Result<PathBuf> {
        if self.dirs.is_empty() || file.is_absolute() || file.components().count() > 1 {
            return Ok(file.to_path_buf());
        }

        self.dirs
            .iter()
            .map(|dir| dir.join(file))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| Error::file_read(file, format!("not found in search path {}", self)))
    }

    /// Locate and read `file`, returning the resolved path and its contents
    pub fn read(&self, file: &Path) -> Result<(PathBuf, String)> {
        let path = self.find(file)?;
        let text = std::fs::read_to_string(&path).map_err(|e| Error::file_read(&path, e))?;
        Ok((path, text))
    }
}

impl fmt::Display for SearchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dirs: Vec<String> = self.dirs.iter().map(|d| d.display().to_string()).collect();
        write!(f, "[{}]", dirs.join(", "))
    }
}
