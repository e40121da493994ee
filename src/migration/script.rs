//! Migration script loading
//!
//! Script files hold forward SQL, optionally followed by a rollback section:
//!
//! ```sql
//! CREATE TABLE event_attendance (...);
//!
//! -- ROLLBACK
//! DROP TABLE event_attendance;
//! ```
//!
//! Only the apply section (everything before the first rollback separator)
//! is ever served to operators.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Loads raw migration script text by file identifier
pub trait ScriptSource: Send + Sync {
    /// Read the full text of `file`
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the script cannot be read.
    fn load(&self, file: &str) -> io::Result<String>;
}

/// [`ScriptSource`] reading files relative to a migrations directory
#[derive(Debug, Clone)]
pub struct DirectoryScriptSource {
    root: PathBuf,
}

impl DirectoryScriptSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ScriptSource for DirectoryScriptSource {
    fn load(&self, file: &str) -> io::Result<String> {
        let relative = Path::new(file);
        // Catalog entries are relative; refuse anything that would escape the root.
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("migration file must be relative to the migrations directory: {}", file),
            ));
        }
        fs::read_to_string(self.root.join(relative))
    }
}

/// Whether `line` is a rollback separator (`-- ROLLBACK`, any indentation)
fn is_rollback_separator(line: &str) -> bool {
    line.trim_start()
        .strip_prefix("--")
        .map(|rest| rest.trim() == "ROLLBACK")
        .unwrap_or(false)
}

/// The apply section of a script: everything before the first rollback
/// separator line, trimmed
#[must_use]
pub fn split_apply_section(script: &str) -> &str {
    let mut offset = 0;
    for line in script.split_inclusive('\n') {
        if is_rollback_separator(line) {
            return script[..offset].trim();
        }
        offset += line.len();
    }
    script.trim()
}
