//! Database engine implementations
//!
//! This module provides the engine abstraction and the registry that maps engine keys
//! to engine factories. Engines supply the defaults a target falls back to:
//! - Registry name (where deployment metadata lives)
//! - Client program used to talk to the database
//!
//! The set of engines is open: callers may register additional factories.

mod builtin;
mod engine;

pub use builtin::{BuiltinEngine, DEFAULT_REGISTRY};
pub use engine::Engine;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::context::Context;
use crate::error::{Result, TargetError};
use crate::target::Target;

/// Built-in engine kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    Pg,
    Sqlite,
    Mysql,
    Oracle,
    Firebird,
    Vertica,
    Exasol,
    Snowflake,
    Cockroach,
}

impl EngineKind {
    pub const ALL: [EngineKind; 9] = [
        EngineKind::Pg,
        EngineKind::Sqlite,
        EngineKind::Mysql,
        EngineKind::Oracle,
        EngineKind::Firebird,
        EngineKind::Vertica,
        EngineKind::Exasol,
        EngineKind::Snowflake,
        EngineKind::Cockroach,
    ];

    pub fn key(self) -> &'static str {
        match self {
            EngineKind::Pg => "pg",
            EngineKind::Sqlite => "sqlite",
            EngineKind::Mysql => "mysql",
            EngineKind::Oracle => "oracle",
            EngineKind::Firebird => "firebird",
            EngineKind::Vertica => "vertica",
            EngineKind::Exasol => "exasol",
            EngineKind::Snowflake => "snowflake",
            EngineKind::Cockroach => "cockroach",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            EngineKind::Pg => "PostgreSQL",
            EngineKind::Sqlite => "SQLite",
            EngineKind::Mysql => "MySQL",
            EngineKind::Oracle => "Oracle",
            EngineKind::Firebird => "Firebird",
            EngineKind::Vertica => "Vertica",
            EngineKind::Exasol => "Exasol",
            EngineKind::Snowflake => "Snowflake",
            EngineKind::Cockroach => "CockroachDB",
        }
    }

    /// Alternate spellings accepted for this engine
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            EngineKind::Pg => &["postgres", "postgresql"],
            EngineKind::Sqlite => &["sqlite3"],
            EngineKind::Mysql => &["mariadb"],
            EngineKind::Cockroach => &["cockroachdb"],
            _ => &[],
        }
    }

    pub fn default_client(self) -> &'static str {
        match self {
            EngineKind::Pg | EngineKind::Cockroach => "psql",
            EngineKind::Sqlite => "sqlite3",
            EngineKind::Mysql => "mysql",
            EngineKind::Oracle => "sqlplus",
            EngineKind::Firebird => "isql",
            EngineKind::Vertica => "vsql",
            EngineKind::Exasol => "exaplus",
            EngineKind::Snowflake => "snowsql",
        }
    }
}

impl std::str::FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        EngineKind::ALL
            .into_iter()
            .find(|kind| kind.key() == lower || kind.aliases().iter().any(|alias| *alias == lower))
            .ok_or_else(|| {
                format!(
                    "Unknown engine: {}. Supported: {}",
                    s,
                    EngineKind::ALL.map(EngineKind::key).join(", ")
                )
            })
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Fold engine aliases (`postgres`, `sqlite3`, ...) to their canonical key.
/// Unknown engines are lowercased and kept as-is.
pub fn canonical_engine_key(engine: &str) -> String {
    engine
        .parse::<EngineKind>()
        .map(|kind| kind.key().to_string())
        .unwrap_or_else(|_| engine.to_lowercase())
}

/// Configuration sections (`core.<section>`) that hold settings for an engine:
/// the canonical key first, then its aliases.
pub fn engine_sections(engine: &str) -> Vec<String> {
    match engine.parse::<EngineKind>() {
        Ok(kind) => std::iter::once(kind.key())
            .chain(kind.aliases().iter().copied())
            .map(str::to_string)
            .collect(),
        Err(_) => vec![engine.to_lowercase()],
    }
}

/// Factory producing an engine for a target
pub type EngineFactory = Arc<dyn Fn(&Context, &Target) -> Arc<dyn Engine> + Send + Sync>;

/// Maps engine keys to engine factories
#[derive(Clone)]
pub struct EngineRegistry {
    factories: BTreeMap<String, EngineFactory>,
}

impl EngineRegistry {
    /// Create a registry with no engines
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Create a registry holding every built-in engine
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        for kind in EngineKind::ALL {
            registry.register(kind.key(), move |_ctx: &Context, target: &Target| {
                Arc::new(BuiltinEngine::new(kind, target.name(), target.uri())) as Arc<dyn Engine>
            });
        }
        registry
    }

    /// Register (or replace) the factory for an engine key
    pub fn register<F>(&mut self, key: &str, factory: F)
    where
        F: Fn(&Context, &Target) -> Arc<dyn Engine> + Send + Sync + 'static,
    {
        let key = canonical_engine_key(key);
        debug!("Registering engine factory for {}", key);
        self.factories.insert(key, Arc::new(factory));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(&canonical_engine_key(key))
    }

    /// Registered engine keys, sorted
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Look up the factory for an engine key
    pub fn factory(&self, key: &str) -> Result<EngineFactory> {
        self.factories
            .get(&canonical_engine_key(key))
            .cloned()
            .ok_or_else(|| TargetError::UnknownEngine(key.to_string()))
    }

    /// Load the engine for a target, keyed by the target's engine key
    pub fn load(&self, context: &Context, target: &Target) -> Result<Arc<dyn Engine>> {
        let factory = self.factory(target.engine_key())?;
        debug!("Loading engine {} for target {}", target.engine_key(), target.name());
        Ok(factory(context, target))
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}
