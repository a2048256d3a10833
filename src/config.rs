//! Hierarchical key/value configuration
//!
//! Targets read configuration through the [`ConfigStore`] trait using dotted keys
//! (`core.engine`, `core.pg.target`, `target.prod.uri`). [`Config`] is the TOML-backed
//! store used by the command line: nested tables flatten to dotted keys.

use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

use crate::engines::canonical_engine_key;

/// Read access to a hierarchical configuration store
pub trait ConfigStore: Send + Sync {
    /// Value for a fully qualified key such as `target.prod.uri`
    fn get(&self, key: &str) -> Option<String>;

    /// Keys directly under a section (`target.prod` → `uri`, `registry`, ...).
    /// Empty when the section does not exist.
    fn get_section(&self, name: &str) -> BTreeMap<String, String>;
}

/// TOML-backed configuration store
#[derive(Debug, Default)]
pub struct Config {
    values: RwLock<BTreeMap<String, String>>,
}

impl Config {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))
    }

    /// Load configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let table: toml::Table = contents.parse().context("Invalid TOML")?;

        let mut values = BTreeMap::new();
        flatten("", &table, &mut values);
        debug!("Loaded {} configuration keys", values.len());

        Ok(Self {
            values: RwLock::new(values),
        })
    }

    /// Set a key, replacing any existing value
    pub fn set(&self, key: &str, value: &str) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }

    /// Remove a key, returning its previous value
    pub fn unset(&self, key: &str) -> Option<String> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    /// Names of all configured targets (`[target.<name>]` sections)
    pub fn target_names(&self) -> Vec<String> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        values
            .keys()
            .filter_map(|key| key.strip_prefix("target."))
            .filter_map(|rest| rest.rsplit_once('.').map(|(name, _)| name.to_string()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Create a sample configuration file for an engine
    pub fn create_sample<P: AsRef<Path>>(path: P, engine: &str) -> Result<()> {
        let engine = canonical_engine_key(engine);
        let engine = engine.as_str();

        let mut engine_section = toml::Table::new();
        engine_section.insert("target".into(), "dev".into());

        let mut core = toml::Table::new();
        core.insert("engine".into(), engine.into());
        core.insert("top_dir".into(), ".".into());
        core.insert(engine.into(), toml::Value::Table(engine_section));

        let mut dev = toml::Table::new();
        dev.insert("uri".into(), format!("db:{}://localhost/app_dev", engine).into());

        let mut prod = toml::Table::new();
        prod.insert(
            "uri".into(),
            format!("db:{}://deployer@db.example.com/app", engine).into(),
        );
        prod.insert("registry".into(), "sqitch".into());

        let mut targets = toml::Table::new();
        targets.insert("dev".into(), toml::Value::Table(dev));
        targets.insert("prod".into(), toml::Value::Table(prod));

        let mut sample = toml::Table::new();
        sample.insert("core".into(), toml::Value::Table(core));
        sample.insert("target".into(), toml::Value::Table(targets));

        let toml_string =
            toml::to_string_pretty(&sample).context("Failed to serialize sample config")?;
        fs::write(path.as_ref(), toml_string)
            .with_context(|| format!("Failed to write sample config to {:?}", path.as_ref()))?;

        Ok(())
    }
}

impl ConfigStore for Config {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn get_section(&self, name: &str) -> BTreeMap<String, String> {
        let prefix = format!("{}.", name);
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        values
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(key, value)| {
                let rest = &key[prefix.len()..];
                (!rest.contains('.')).then(|| (rest.to_string(), value.clone()))
            })
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Config {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: RwLock::new(
                iter.into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

fn flatten(prefix: &str, table: &toml::Table, out: &mut BTreeMap<String, String>) {
    for (key, value) in table {
        let key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };

        let value = match value {
            toml::Value::Table(nested) => {
                flatten(&key, nested, out);
                continue;
            }
            toml::Value::String(s) => s.clone(),
            toml::Value::Integer(i) => i.to_string(),
            toml::Value::Float(f) => f.to_string(),
            toml::Value::Boolean(b) => b.to_string(),
            toml::Value::Datetime(dt) => dt.to_string(),
            toml::Value::Array(_) => {
                debug!("Ignoring array value for config key {}", key);
                continue;
            }
        };
        out.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[core]
engine = "pg"
top_dir = "migrations"

[core.pg]
target = "prod"
client = "/usr/local/bin/psql"

[target.prod]
uri = "db:pg://deployer@db.example.com/app"
registry = "meta"

[target.empty]
port = 5432
"#;

    #[test]
    fn test_flattened_keys() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.get("core.engine").as_deref(), Some("pg"));
        assert_eq!(config.get("core.pg.target").as_deref(), Some("prod"));
        assert_eq!(
            config.get("target.prod.uri").as_deref(),
            Some("db:pg://deployer@db.example.com/app")
        );
        assert_eq!(config.get("target.empty.port").as_deref(), Some("5432"));
        assert_eq!(config.get("target.prod.missing"), None);
    }

    #[test]
    fn test_get_section_only_direct_children() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        let core = config.get_section("core");
        assert_eq!(core.len(), 2);
        assert_eq!(core.get("engine").map(String::as_str), Some("pg"));
        assert!(!core.contains_key("pg.target"));

        let prod = config.get_section("target.prod");
        assert_eq!(prod.get("registry").map(String::as_str), Some("meta"));
        assert!(config.get_section("target.nope").is_empty());
    }

    #[test]
    fn test_section_prefix_is_exact() {
        let config: Config = [("target.prod.uri", "db:pg:"), ("target.production.uri", "db:mysql:")]
            .into_iter()
            .collect();
        let prod = config.get_section("target.prod");
        assert_eq!(prod.len(), 1);
        assert_eq!(prod.get("uri").map(String::as_str), Some("db:pg:"));
    }

    #[test]
    fn test_set_and_unset() {
        let config = Config::new();
        config.set("core.engine", "sqlite");
        assert_eq!(config.get("core.engine").as_deref(), Some("sqlite"));
        assert_eq!(config.unset("core.engine").as_deref(), Some("sqlite"));
        assert_eq!(config.get("core.engine"), None);
    }

    #[test]
    fn test_target_names() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.target_names(), vec!["empty", "prod"]);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(Config::from_toml_str("[core\nengine = ").is_err());
    }

    #[test]
    fn test_create_sample_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sqitch.toml");
        Config::create_sample(&path, "pg").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.get("core.engine").as_deref(), Some("pg"));
        assert_eq!(config.get("core.pg.target").as_deref(), Some("dev"));
        assert_eq!(
            config.get("target.dev.uri").as_deref(),
            Some("db:pg://localhost/app_dev")
        );
    }

    #[test]
    fn test_create_sample_uses_canonical_engine() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sqitch.toml");
        Config::create_sample(&path, "postgres").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.get("core.engine").as_deref(), Some("pg"));
        assert_eq!(config.get("core.pg.target").as_deref(), Some("dev"));
        assert!(config.get_section("core.postgres").is_empty());
        assert_eq!(
            config.get("target.prod.uri").as_deref(),
            Some("db:pg://deployer@db.example.com/app")
        );
    }
}
