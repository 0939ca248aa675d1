//! Registered schema documents.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::definition::SchemasSpec;
use crate::ConfigError;

/// A schema document and the list it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDocument {
    /// Schema name.
    pub name: String,
    /// Schema version.
    pub version: String,
    /// Compatibility mode of the owning list.
    pub compatibility: Option<String>,
    /// Raw file contents.
    pub content: Vec<u8>,
}

/// Schema documents keyed by `name:version`.
///
/// ```
/// use hubwork_config::{SchemaCatalog, SchemaDocument};
///
/// let mut catalog = SchemaCatalog::new();
/// catalog.insert(SchemaDocument {
///     name: "order".into(),
///     version: "1".into(),
///     compatibility: None,
///     content: b"{}".to_vec(),
/// });
/// assert!(catalog.get("order", "1").is_some());
/// assert!(catalog.get("order", "2").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    documents: HashMap<String, SchemaDocument>,
}

impl SchemaCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog key for a name and version.
    pub fn key(name: &str, version: &str) -> String {
        format!("{name}:{version}")
    }

    /// Adds or replaces a document.
    pub fn insert(&mut self, document: SchemaDocument) -> Option<SchemaDocument> {
        let key = Self::key(&document.name, &document.version);
        self.documents.insert(key, document)
    }

    /// Reads every file a schema list references, relative to `dir`.
    pub fn load_list(&mut self, dir: &Path, list: &SchemasSpec) -> Result<(), ConfigError> {
        for entry in &list.spec.schemas {
            let path = dir.join(&entry.filename);
            let content = fs::read(&path).map_err(|e| ConfigError::read_error(&path, e))?;
            tracing::debug!(schema = %entry.name, version = %entry.version, "registered schema");
            self.insert(SchemaDocument {
                name: entry.name.clone(),
                version: entry.version.clone(),
                compatibility: list.spec.compatibility.clone(),
                content,
            });
        }
        Ok(())
    }

    /// Looks up a document.
    pub fn get(&self, name: &str, version: &str) -> Option<&SchemaDocument> {
        self.documents.get(&Self::key(name, version))
    }

    /// Whether a document is registered.
    pub fn contains(&self, name: &str, version: &str) -> bool {
        self.get(name, version).is_some()
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.documents.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
