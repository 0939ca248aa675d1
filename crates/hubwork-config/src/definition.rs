//! Declarative hub documents.
//!
//! An application home directory looks like:
//!
//! ```text
//! home/
//! ├── hub.yaml            application identity, ports, API list
//! ├── aggregates/
//! │   └── orders.yaml     one service: handlers, workflows, target
//! └── schemas/            optional
//!     ├── schemas.yaml    schema list
//!     └── order.json      schema document referenced from schemas.yaml
//! ```
//!
//! Documents are YAML; files ending in `.json` are read as JSON.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ConfigError;

/// `hub.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubSpec {
    /// Document format version.
    #[serde(default)]
    pub api_version: String,
    /// Document kind, conventionally `Hub`.
    #[serde(default)]
    pub spec_type: String,
    /// Body.
    pub spec: HubDefinition,
}

/// Application-wide settings from `hub.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubDefinition {
    /// Application name.
    pub application_name: String,
    /// Application version.
    #[serde(default)]
    pub application_version: Option<String>,
    /// Public listener port.
    #[serde(default)]
    pub public_port: Option<u16>,
    /// Private listener port.
    #[serde(default)]
    pub private_port: Option<u16>,
    /// Declared APIs.
    #[serde(default)]
    pub apis: Vec<ApiSpec>,
}

/// One API and the aggregate documents it groups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSpec {
    /// API name, the first routing segment.
    pub name: String,
    /// Aggregate name to document mapping.
    #[serde(default)]
    pub aggregates: BTreeMap<String, String>,
}

/// One file under `aggregates/`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateSpec {
    /// Document format version.
    #[serde(default)]
    pub api_version: String,
    /// Document kind, conventionally `Aggregate`.
    #[serde(default)]
    pub spec_type: String,
    /// Free-form namespace.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Body.
    pub spec: AggregateDefinition,
}

/// A service definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateDefinition {
    /// Service name, the second routing segment.
    pub name: String,
    /// Owning API.
    pub api_name: String,
    /// Reachable from the public listener.
    #[serde(default)]
    pub is_public: bool,
    /// Schema name.
    #[serde(default)]
    pub schema_name: Option<String>,
    /// Schema version.
    #[serde(default)]
    pub schema_version: Option<String>,
    /// Per-request deadline in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Related aggregates.
    #[serde(default)]
    pub refs: Vec<String>,
    /// Handlers, each bound to one or more methods.
    #[serde(default)]
    pub handlers: Vec<HandlerSpec>,
}

/// Inbound workflow, target and outbound workflow for a set of methods.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerSpec {
    /// Method names, case-insensitive.
    #[serde(default)]
    pub methods: Vec<String>,
    /// Steps run before the target.
    #[serde(default)]
    pub inbound: Vec<StepSpec>,
    /// Steps run after the target.
    #[serde(default)]
    pub outbound: Vec<StepSpec>,
    /// The terminal operation.
    #[serde(default)]
    pub target: Option<TargetSpec>,
}

/// A target reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSpec {
    /// Instance name, for diagnostics.
    #[serde(default)]
    pub name: String,
    /// Registered target type.
    #[serde(rename = "type")]
    pub target_type: String,
    /// Type-specific configuration.
    #[serde(default)]
    pub config: Value,
}

/// A workflow step reference.
///
/// `executionType`, `mustFinish` and `onError` are kept on the document but
/// do not change how the engine runs the step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSpec {
    /// Step name.
    pub name: String,
    /// Registered task type.
    #[serde(rename = "type")]
    pub task_type: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Ordering; lower runs earlier.
    #[serde(default)]
    pub precedence: i32,
    /// Execution hint.
    #[serde(default)]
    pub execution_type: Option<String>,
    /// Completion hint.
    #[serde(default)]
    pub must_finish: bool,
    /// Error-policy hint.
    #[serde(default)]
    pub on_error: Option<String>,
    /// Disabled steps are left out of the workflow.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Type-specific configuration.
    #[serde(default)]
    pub config: Value,
}

fn default_enabled() -> bool {
    true
}

/// One schema list under `schemas/`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemasSpec {
    /// Document format version.
    #[serde(default)]
    pub api_version: String,
    /// Document kind.
    #[serde(default)]
    pub spec_type: String,
    /// Body.
    pub spec: SchemasDefinition,
}

/// Schema list body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemasDefinition {
    /// Compatibility mode, informational.
    #[serde(default)]
    pub compatibility: Option<String>,
    /// Schemas.
    #[serde(default)]
    pub schemas: Vec<SchemaEntry>,
}

/// A schema document reference, relative to `schemas/`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaEntry {
    /// Schema name.
    pub name: String,
    /// Schema version.
    pub version: String,
    /// File holding the schema.
    #[serde(alias = "file")]
    pub filename: String,
}

/// Everything read from an application home.
#[derive(Debug, Clone, Default)]
pub struct HubDocuments {
    /// Directory the documents came from.
    pub home: PathBuf,
    /// `hub.yaml`.
    pub hub: HubSpec,
    /// Aggregate documents with their paths, sorted by path.
    pub aggregates: Vec<(PathBuf, AggregateSpec)>,
    /// Schema lists with their paths, sorted by path.
    pub schemas: Vec<(PathBuf, SchemasSpec)>,
}

const HUB_FILES: [&str; 3] = ["hub.yaml", "hub.yml", "hub.json"];

impl HubDocuments {
    /// Reads `hub.yaml`, every document under `aggregates/`, and the lists
    /// under `schemas/`.
    ///
    /// Missing `aggregates/` or `schemas/` directories are treated as empty.
    pub fn read(home: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let home = home.as_ref();
        let hub_path = HUB_FILES
            .iter()
            .map(|name| home.join(name))
            .find(|path| path.is_file())
            .ok_or_else(|| ConfigError::file_not_found(home.join(HUB_FILES[0])))?;
        let hub: HubSpec = read_document(&hub_path)?;

        let aggregates = read_dir_documents(&home.join("aggregates"))?;
        if aggregates.is_empty() {
            tracing::warn!(home = %home.display(), "no aggregate documents found");
        }
        let schemas = read_dir_documents(&home.join("schemas"))?;

        Ok(Self {
            home: home.to_path_buf(),
            hub,
            aggregates,
            schemas,
        })
    }
}

/// Decodes one document, choosing JSON or YAML by extension.
pub fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
    if is_json(path) {
        serde_json::from_str(&content).map_err(|e| ConfigError::document_error(path, e))
    } else {
        serde_yaml::from_str(&content).map_err(|e| ConfigError::document_error(path, e))
    }
}

fn read_dir_documents<T: DeserializeOwned>(dir: &Path) -> Result<Vec<(PathBuf, T)>, ConfigError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    let entries = fs::read_dir(dir).map_err(|e| ConfigError::read_error(dir, e))?;
    for entry in entries {
        let path = entry.map_err(|e| ConfigError::read_error(dir, e))?.path();
        if path.is_file() && is_document(&path) {
            paths.push(path);
        }
    }
    paths.sort();

    paths
        .into_iter()
        .map(|path| read_document(&path).map(|doc| (path, doc)))
        .collect()
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
}

fn is_json(path: &Path) -> bool {
    extension(path).as_deref() == Some("json")
}

// Schema documents referenced by a list may sit next to it; only YAML files
// are lists there, so `.json` is accepted for aggregates alone.
fn is_document(path: &Path) -> bool {
    let in_schemas = path
        .parent()
        .and_then(Path::file_name)
        .is_some_and(|name| name == "schemas");
    match extension(path).as_deref() {
        Some("yaml" | "yml") => true,
        Some("json") => !in_schemas,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AGGREGATE: &str = r#"
apiVersion: v1
specType: Aggregate
namespace: shop
spec:
  name: orders
  apiName: shop
  isPublic: true
  schemaName: order
  schemaVersion: "1.0"
  timeoutMs: 1500
  handlers:
    - methods: [GET, post]
      inbound:
        - name: log
          type: request_logger
          precedence: 2
          config:
            logLevel: debug
        - name: audit
          type: log_writer
          enabled: false
          mustFinish: true
          onError: continue
      target:
        name: store
        type: key_value
"#;

    #[test]
    fn test_aggregate_yaml() {
        let doc: AggregateSpec = serde_yaml::from_str(AGGREGATE).unwrap();
        assert_eq!(doc.namespace.as_deref(), Some("shop"));
        assert_eq!(doc.spec.timeout_ms, Some(1500));
        assert!(doc.spec.is_public);

        let handler = &doc.spec.handlers[0];
        assert_eq!(handler.methods, vec!["GET", "post"]);
        assert_eq!(handler.inbound[0].precedence, 2);
        assert_eq!(handler.inbound[0].config["logLevel"], "debug");
        assert!(handler.inbound[0].enabled);
        assert!(!handler.inbound[1].enabled);
        assert!(handler.inbound[1].must_finish);
        assert!(handler.inbound[1].config.is_null());
        assert_eq!(handler.target.as_ref().unwrap().target_type, "key_value");
        assert!(handler.outbound.is_empty());
    }

    #[test]
    fn test_hub_yaml() {
        let doc: HubSpec = serde_yaml::from_str(
            r#"
apiVersion: v1
specType: Hub
spec:
  applicationName: recipes
  applicationVersion: "0.3.0"
  publicPort: 8080
  apis:
    - name: shop
      aggregates:
        orders: aggregates/orders.yaml
"#,
        )
        .unwrap();
        assert_eq!(doc.spec.application_name, "recipes");
        assert_eq!(doc.spec.public_port, Some(8080));
        assert_eq!(doc.spec.private_port, None);
        assert_eq!(doc.spec.apis[0].aggregates["orders"], "aggregates/orders.yaml");
    }

    #[test]
    fn test_schema_entry_accepts_file_alias() {
        let entry: SchemaEntry =
            serde_yaml::from_str("name: order\nversion: '1'\nfile: order.json\n").unwrap();
        assert_eq!(entry.filename, "order.json");
    }

    #[test]
    fn test_read_missing_hub_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = HubDocuments::read(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_read_reports_bad_document_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hub.yaml"), "spec: [unclosed").unwrap();
        let err = HubDocuments::read(dir.path()).unwrap_err();
        assert!(err.to_string().contains("hub.yaml"));
    }

    #[test]
    fn test_read_sorted_documents() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("hub.json"),
            r#"{"spec": {"applicationName": "app"}}"#,
        )
        .unwrap();
        let aggregates = dir.path().join("aggregates");
        fs::create_dir(&aggregates).unwrap();
        fs::write(aggregates.join("b.yaml"), "spec: {name: b, apiName: api}").unwrap();
        fs::write(
            aggregates.join("a.json"),
            r#"{"spec": {"name": "a", "apiName": "api"}}"#,
        )
        .unwrap();
        fs::write(aggregates.join("notes.txt"), "ignored").unwrap();

        let docs = HubDocuments::read(dir.path()).unwrap();
        let names: Vec<&str> = docs
            .aggregates
            .iter()
            .map(|(_, doc)| doc.spec.name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(docs.schemas.is_empty());
    }
}
