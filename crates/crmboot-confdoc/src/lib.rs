//! crmboot-confdoc — the application's config file as a structured tree.
//!
//! The CRM application generates its runtime configuration as a PHP file
//! assigning one nested array to a single variable. Patching that file
//! with line-oriented text substitution cannot add new keys and breaks on
//! formatting drift, so this crate treats the file as a document instead:
//! parse into a key/value tree, mutate by dotted path, serialize back.
//!
//! Serialization is deterministic and parsing is a left inverse of it, so
//! a parse → serialize cycle on an already-generated file is a fixed
//! point. The resume path leans on this: rebuilding an already-complete
//! configuration is byte-for-byte a no-op.
//!
//! Only the subset of PHP the application actually emits is supported:
//! `array(...)` / `[...]` literals, single- and double-quoted strings,
//! integers, booleans, trailing commas, and comments.

pub mod parse;
pub mod seed;
pub mod value;

pub use seed::{db_settings, seed_runtime_config, seed_silent_install};
pub use value::{ConfMap, ConfValue};

use std::path::Path;

// ── Errors ───────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("{path}: expected a nested array, found a scalar")]
    NotAMap { path: String },

    #[error("{path}: {message}")]
    BadValue { path: String, message: String },

    #[error("reading {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("writing {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

// ── ConfDoc ──────────────────────────────────────────────────────────

/// A parsed configuration document: one variable, one nested array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfDoc {
    /// Variable the array is assigned to (without the `$`).
    var_name: String,
    root: ConfMap,
}

impl ConfDoc {
    /// An empty document for the given variable name.
    pub fn new(var_name: impl Into<String>) -> Self {
        Self {
            var_name: var_name.into(),
            root: ConfMap::new(),
        }
    }

    /// Parse a document from PHP source text.
    pub fn parse(source: &str) -> Result<Self> {
        parse::parse_document(source)
    }

    /// Parse the document at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| Error::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse(&source)
    }

    /// Serialize and write the document to `path`.
    pub fn store(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_php()).map_err(|e| Error::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    pub(crate) fn replace_root(&mut self, root: ConfMap) {
        self.root = root;
    }

    /// Variable name the array is assigned to.
    pub fn var_name(&self) -> &str {
        &self.var_name
    }

    /// The root map.
    pub fn root(&self) -> &ConfMap {
        &self.root
    }

    /// Look up a value by dotted path (`dbconfig.db_host_name`).
    pub fn get(&self, path: &str) -> Option<&ConfValue> {
        let mut current = &self.root;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            let value = current.get(segment)?;
            if segments.peek().is_none() {
                return Some(value);
            }
            match value {
                ConfValue::Map(map) => current = map,
                _ => return None,
            }
        }
        None
    }

    /// Convenience: a string value at `path`.
    pub fn get_str(&self, path: &str) -> Option<&str> {
        match self.get(path)? {
            ConfValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Set the value at a dotted path, creating intermediate maps as
    /// needed. Adding a genuinely new key is supported; traversing
    /// through an existing scalar is not.
    pub fn set(&mut self, path: &str, value: ConfValue) -> Result<()> {
        let segments: Vec<&str> = path.split('.').collect();
        let mut current = &mut self.root;
        for segment in &segments[..segments.len() - 1] {
            current = current.entry_map(segment).ok_or_else(|| Error::NotAMap {
                path: path.to_string(),
            })?;
        }
        current.set(segments[segments.len() - 1], value);
        Ok(())
    }

    /// Deterministic PHP serialization.
    pub fn to_php(&self) -> String {
        let mut out = String::new();
        out.push_str("<?php\n");
        out.push('$');
        out.push_str(&self.var_name);
        out.push_str(" = ");
        self.root.write_php(&mut out, 0);
        out.push_str(";\n");
        out
    }
}
