use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::RegistryError;

/// Anything that can produce a merged operator registry.
pub trait RegistrySource: Send + Sync {
    fn load(&self) -> Result<LoadedRegistry, RegistryError>;
}

/// A merged view over one or more registry documents.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadedRegistry {
    pub operators: BTreeMap<String, Value>,
    pub sources: Vec<String>,
    pub errors: Vec<String>,
}

impl LoadedRegistry {
    pub fn contains(&self, operator_id: &str) -> bool {
        self.operators.contains_key(operator_id)
    }

    pub fn operator_ids(&self) -> Vec<&str> {
        self.operators.keys().map(String::as_str).collect()
    }

    /// Ids from `referenced` that are not declared, in sorted order.
    pub fn missing<'a, I>(&self, referenced: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut missing: Vec<String> = referenced
            .into_iter()
            .filter(|id| !self.contains(id))
            .map(str::to_string)
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }

    /// Add one operator, recording a conflict if the id is already bound
    /// to a different descriptor.
    fn admit(&mut self, id: String, descriptor: Value, source: &str) {
        match self.operators.get(&id) {
            Some(existing) if *existing != descriptor => {
                warn!(operator_id = %id, source, "Conflicting operator descriptor");
                self.errors
                    .push(format!("conflicting descriptor for operator {id} in {source}"));
            }
            Some(_) => {}
            None => {
                self.operators.insert(id, descriptor);
            }
        }
    }
}

/// Loads and merges JSON registry files in the order given.
///
/// Each file is either `{"operators": [{"operator_id": ..}, ..]}` or a map
/// from operator id to descriptor.
#[derive(Clone, Debug, Default)]
pub struct JsonRegistryLoader {
    paths: Vec<PathBuf>,
}

impl JsonRegistryLoader {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    fn load_file(path: &Path, registry: &mut LoadedRegistry) -> Result<(), RegistryError> {
        let text = std::fs::read_to_string(path).map_err(|source| RegistryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let doc: Value = serde_json::from_str(&text).map_err(|source| RegistryError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let source = path.display().to_string();

        let Value::Object(top) = doc else {
            return Err(RegistryError::Shape {
                path: path.to_path_buf(),
                detail: "top level must be an object".into(),
            });
        };

        match top.get("operators") {
            Some(Value::Array(entries)) => {
                for (index, entry) in entries.iter().enumerate() {
                    match entry_id(entry) {
                        Some(id) => registry.admit(id, entry.clone(), &source),
                        None => registry
                            .errors
                            .push(format!("operator entry {index} in {source} has no operator_id")),
                    }
                }
            }
            Some(_) => {
                return Err(RegistryError::Shape {
                    path: path.to_path_buf(),
                    detail: "\"operators\" must be an array".into(),
                })
            }
            None => load_keyed(top, registry, &source),
        }

        registry.sources.push(source);
        Ok(())
    }
}

fn entry_id(entry: &Value) -> Option<String> {
    let map = entry.as_object()?;
    ["operator_id", "id"]
        .iter()
        .find_map(|k| map.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

fn load_keyed(top: Map<String, Value>, registry: &mut LoadedRegistry, source: &str) {
    for (id, descriptor) in top {
        let id = id.trim().to_string();
        if id.is_empty() {
            registry
                .errors
                .push(format!("operator with empty id in {source}"));
            continue;
        }
        registry.admit(id, descriptor, source);
    }
}

impl RegistrySource for JsonRegistryLoader {
    fn load(&self) -> Result<LoadedRegistry, RegistryError> {
        let mut registry = LoadedRegistry::default();
        for path in &self.paths {
            Self::load_file(path, &mut registry)?;
        }
        debug!(
            operators = registry.operators.len(),
            sources = registry.sources.len(),
            errors = registry.errors.len(),
            "Operator registry loaded"
        );
        Ok(registry)
    }
}

/// An in-memory registry.
#[derive(Clone, Debug, Default)]
pub struct StaticRegistry {
    registry: LoadedRegistry,
}

impl StaticRegistry {
    pub fn new<I, S>(operator_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let operators = operator_ids
            .into_iter()
            .map(|id| {
                let id = id.into();
                let descriptor = serde_json::json!({ "operator_id": id });
                (id, descriptor)
            })
            .collect();
        Self {
            registry: LoadedRegistry {
                operators,
                sources: vec!["static".into()],
                errors: Vec::new(),
            },
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.registry.errors.push(error.into());
        self
    }
}

impl RegistrySource for StaticRegistry {
    fn load(&self) -> Result<LoadedRegistry, RegistryError> {
        Ok(self.registry.clone())
    }
}
