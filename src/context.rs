//! Execution context shared by every target in a run
//!
//! Bundles the command-line option set, the configuration store, the engine
//! registry and the plan loader. Targets hold the context through an `Arc` and
//! never mutate it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::config::ConfigStore;
use crate::engines::EngineRegistry;
use crate::plan::{PlanFileLoader, PlanLoader};

/// Option keys understood by target resolution
pub mod keys {
    pub const ENGINE: &str = "engine";
    pub const DB_HOST: &str = "db_host";
    pub const DB_PORT: &str = "db_port";
    pub const DB_USERNAME: &str = "db_username";
    pub const DB_NAME: &str = "db_name";
    pub const REGISTRY: &str = "registry";
    pub const CLIENT: &str = "client";
    pub const PLAN_FILE: &str = "plan_file";
    pub const TOP_DIR: &str = "top_dir";
    pub const DEPLOY_DIR: &str = "deploy_dir";
    pub const REVERT_DIR: &str = "revert_dir";
    pub const VERIFY_DIR: &str = "verify_dir";
    pub const EXTENSION: &str = "extension";
}

/// Read-only command-line option set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    values: BTreeMap<String, String>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    /// Insert only when a value is present
    pub fn with_opt(self, key: &str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.with(key, value),
            None => self,
        }
    }

    /// Value for a key; empty values count as unset
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Options {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Options, configuration and loaders for one run
#[derive(Clone)]
pub struct Context {
    options: Options,
    config: Arc<dyn ConfigStore>,
    engines: EngineRegistry,
    plans: Arc<dyn PlanLoader>,
}

impl Context {
    /// Create a context with the built-in engines and the default plan loader
    pub fn new(options: Options, config: Arc<dyn ConfigStore>) -> Self {
        Self {
            options,
            config,
            engines: EngineRegistry::with_builtins(),
            plans: Arc::new(PlanFileLoader),
        }
    }

    /// Replace the engine registry
    pub fn with_engines(mut self, engines: EngineRegistry) -> Self {
        self.engines = engines;
        self
    }

    /// Replace the plan loader
    pub fn with_plan_loader(mut self, plans: Arc<dyn PlanLoader>) -> Self {
        self.plans = plans;
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn config(&self) -> &dyn ConfigStore {
        self.config.as_ref()
    }

    pub fn engines(&self) -> &EngineRegistry {
        &self.engines
    }

    pub fn plans(&self) -> &dyn PlanLoader {
        self.plans.as_ref()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("options", &self.options)
            .field("engines", &self.engines)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_empty_values_are_unset() {
        let options = Options::new()
            .with(keys::DB_HOST, "")
            .with(keys::ENGINE, "pg")
            .with_opt(keys::DB_PORT, None::<String>);
        assert_eq!(options.get(keys::DB_HOST), None);
        assert_eq!(options.get(keys::ENGINE), Some("pg"));
        assert_eq!(options.get(keys::DB_PORT), None);
    }

    #[test]
    fn test_options_from_iter() {
        let options: Options = [("registry", "meta")].into_iter().collect();
        assert_eq!(options.get(keys::REGISTRY), Some("meta"));
        assert!(!options.is_empty());
    }
}
