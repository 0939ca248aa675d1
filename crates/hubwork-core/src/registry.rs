//! Name-to-factory registries for task and target types.
//!
//! Registries are plain objects owned by the application and handed to the
//! configuration compiler. Registering a name twice replaces the earlier
//! factory; the last registration wins. Both tables are internally locked,
//! so registration may race with resolution without tearing.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::error::{HubError, HubResult};
use crate::plugin::{Target, TargetFactory, Task, TaskFactory};

struct FactoryTable<F: ?Sized> {
    kind: &'static str,
    factories: RwLock<HashMap<String, Arc<F>>>,
}

impl<F: ?Sized> FactoryTable<F> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            factories: RwLock::new(HashMap::new()),
        }
    }

    fn insert(&self, name: String, factory: Arc<F>) {
        let replaced = self.factories.write().insert(name.clone(), factory);
        if replaced.is_some() {
            tracing::debug!(kind = self.kind, name = %name, "replaced registered factory");
        } else {
            tracing::trace!(kind = self.kind, name = %name, "registered factory");
        }
    }

    // The lock is released before the factory runs.
    fn get(&self, name: &str) -> Option<Arc<F>> {
        self.factories.read().get(name).cloned()
    }

    fn contains(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn len(&self) -> usize {
        self.factories.read().len()
    }
}

impl<F: ?Sized> fmt::Debug for FactoryTable<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryTable")
            .field("kind", &self.kind)
            .field("names", &self.names())
            .finish()
    }
}

/// Registry of task types.
///
/// ```
/// use std::sync::Arc;
/// use hubwork_core::{HubError, TaskRegistry};
///
/// let registry = TaskRegistry::new();
/// let err = registry.resolve("audit", &serde_json::Value::Null).err().unwrap();
/// assert!(matches!(err, HubError::TaskNotRegistered { .. }));
/// ```
#[derive(Debug)]
pub struct TaskRegistry {
    table: FactoryTable<dyn TaskFactory>,
}

impl TaskRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: FactoryTable::new("task"),
        }
    }

    /// Registers a closure factory under `name`, replacing any previous one.
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> HubResult<Arc<dyn Task>> + Send + Sync + 'static,
    {
        self.table.insert(name.into(), Arc::new(factory));
    }

    /// Registers a shared factory object under `name`.
    pub fn register_factory(&self, name: impl Into<String>, factory: Arc<dyn TaskFactory>) {
        self.table.insert(name.into(), factory);
    }

    /// Instantiates the task type `name` with `config`.
    pub fn resolve(&self, name: &str, config: &Value) -> HubResult<Arc<dyn Task>> {
        let factory = self
            .table
            .get(name)
            .ok_or_else(|| HubError::task_not_registered(name))?;
        factory.create(config)
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.table.contains(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.table.names()
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of target types.
#[derive(Debug)]
pub struct TargetRegistry {
    table: FactoryTable<dyn TargetFactory>,
}

impl TargetRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: FactoryTable::new("target"),
        }
    }

    /// Registers a closure factory under `name`, replacing any previous one.
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> HubResult<Arc<dyn Target>> + Send + Sync + 'static,
    {
        self.table.insert(name.into(), Arc::new(factory));
    }

    /// Registers a shared factory object under `name`.
    pub fn register_factory(&self, name: impl Into<String>, factory: Arc<dyn TargetFactory>) {
        self.table.insert(name.into(), factory);
    }

    /// Instantiates the target type `name` with `config`.
    pub fn resolve(&self, name: &str, config: &Value) -> HubResult<Arc<dyn Target>> {
        let factory = self
            .table
            .get(name)
            .ok_or_else(|| HubError::target_not_registered(name))?;
        factory.create(config)
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.table.contains(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.table.names()
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TargetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Both registries, as passed to the configuration compiler.
#[derive(Debug, Default, Clone)]
pub struct Registries {
    /// Task types.
    pub tasks: Arc<TaskRegistry>,
    /// Target types.
    pub targets: Arc<TargetRegistry>,
}

impl Registries {
    /// Creates a pair of empty registries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
