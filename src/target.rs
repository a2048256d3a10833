//! Deployment targets
//!
//! A [`Target`] couples a resolved name and URI with the execution context and
//! derives everything else lazily. Each derived attribute is computed on first
//! access and cached for the target's lifetime, checking in order:
//!
//! 1. the command-line option of the same name
//! 2. `target.<name>.<key>`, `core.<engine>.<key>`, `core.<key>` in configuration,
//!    where `core.<engine>` is also read under engine aliases (`core.postgres`)
//! 3. a built-in default

use serde::Serialize;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::debug;

use crate::context::{keys, Context};
use crate::engines::{engine_sections, Engine};
use crate::error::{Result, TargetError};
use crate::plan::Plan;
use crate::resolver;
use crate::uri::DbUri;

const PLAN_FILE_NAME: &str = "sqitch.plan";
const DEFAULT_EXTENSION: &str = "sql";

/// A resolved deployment target
pub struct Target {
    name: String,
    uri: DbUri,
    context: Arc<Context>,

    engine: OnceLock<Arc<dyn Engine>>,
    registry: OnceLock<String>,
    client: OnceLock<String>,
    plan_file: OnceLock<PathBuf>,
    plan: OnceLock<Arc<dyn Plan>>,
    top_dir: OnceLock<PathBuf>,
    deploy_dir: OnceLock<PathBuf>,
    revert_dir: OnceLock<PathBuf>,
    verify_dir: OnceLock<PathBuf>,
    extension: OnceLock<String>,
}

impl Target {
    /// Resolve and create a target from an optional name and URI
    pub fn new(context: Arc<Context>, name: Option<&str>, uri: Option<DbUri>) -> Result<Self> {
        let resolved = resolver::resolve(&context, name, uri)?;
        Self::from_parts(context, resolved.name, resolved.uri)
    }

    /// Create a target from an already resolved name and URI.
    /// An empty name falls back to the URI without its password.
    pub fn from_parts(context: Arc<Context>, name: impl Into<String>, uri: DbUri) -> Result<Self> {
        let mut name = name.into();
        if name.is_empty() {
            name = uri.display_name();
        }
        if !context.engines().contains(uri.engine()) {
            return Err(TargetError::UnknownEngine(uri.engine().to_string()));
        }

        debug!("Created target {} ({})", name, uri.engine());

        Ok(Self {
            name,
            uri,
            context,
            engine: OnceLock::new(),
            registry: OnceLock::new(),
            client: OnceLock::new(),
            plan_file: OnceLock::new(),
            plan: OnceLock::new(),
            top_dir: OnceLock::new(),
            deploy_dir: OnceLock::new(),
            revert_dir: OnceLock::new(),
            verify_dir: OnceLock::new(),
            extension: OnceLock::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uri(&self) -> &DbUri {
        &self.uri
    }

    pub fn engine_key(&self) -> &str {
        self.uri.engine()
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Engine loaded through the context's registry for this target's engine key.
    /// Engine factories must not call back into `engine()`.
    pub fn engine(&self) -> &dyn Engine {
        self.engine
            .get_or_init(|| match self.context.engines().load(self.context.as_ref(), self) {
                Ok(engine) => engine,
                // The registry is immutable behind the Arc and was checked in from_parts
                Err(err) => unreachable!("{}", err),
            })
            .as_ref()
    }

    /// Registry name
    pub fn registry(&self) -> &str {
        self.registry.get_or_init(|| {
            self.fetch(keys::REGISTRY)
                .unwrap_or_else(|| self.engine().default_registry().to_string())
        })
    }

    /// Client program
    pub fn client(&self) -> &str {
        self.client.get_or_init(|| {
            self.fetch(keys::CLIENT)
                .unwrap_or_else(|| native_client(self.engine().default_client(), cfg!(windows)))
        })
    }

    /// Root directory for the plan file and script directories
    pub fn top_dir(&self) -> &Path {
        self.top_dir.get_or_init(|| {
            clean_path(Path::new(
                self.fetch(keys::TOP_DIR).as_deref().unwrap_or("."),
            ))
        })
    }

    pub fn plan_file(&self) -> &Path {
        self.plan_file
            .get_or_init(|| self.fetch_path(keys::PLAN_FILE, PLAN_FILE_NAME))
    }

    pub fn deploy_dir(&self) -> &Path {
        self.deploy_dir
            .get_or_init(|| self.fetch_path(keys::DEPLOY_DIR, "deploy"))
    }

    pub fn revert_dir(&self) -> &Path {
        self.revert_dir
            .get_or_init(|| self.fetch_path(keys::REVERT_DIR, "revert"))
    }

    pub fn verify_dir(&self) -> &Path {
        self.verify_dir
            .get_or_init(|| self.fetch_path(keys::VERIFY_DIR, "verify"))
    }

    /// Change script file extension
    pub fn extension(&self) -> &str {
        self.extension.get_or_init(|| {
            self.fetch(keys::EXTENSION)
                .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
        })
    }

    /// Plan loaded from [`plan_file`](Self::plan_file)
    pub fn plan(&self) -> Arc<dyn Plan> {
        self.plan
            .get_or_init(|| self.context.plans().load(self.context.as_ref(), self.plan_file()))
            .clone()
    }

    /// Snapshot of every resolved attribute, password removed from the URI
    pub fn summary(&self) -> TargetSummary {
        TargetSummary {
            name: self.name.clone(),
            uri: self.uri.display_name(),
            engine: self.engine_key().to_string(),
            registry: self.registry().to_string(),
            client: self.client().to_string(),
            top_dir: self.top_dir().to_path_buf(),
            plan_file: self.plan_file().to_path_buf(),
            deploy_dir: self.deploy_dir().to_path_buf(),
            revert_dir: self.revert_dir().to_path_buf(),
            verify_dir: self.verify_dir().to_path_buf(),
            extension: self.extension().to_string(),
        }
    }

    /// Option value, then the first non-empty configuration value for `key`
    fn fetch(&self, key: &str) -> Option<String> {
        if let Some(value) = self.context.options().get(key) {
            debug!("Target {}: {} from option", self.name, key);
            return Some(value.to_string());
        }

        let config = self.context.config();
        let found = config_keys(&self.name, self.engine_key(), key)
            .into_iter()
            .find_map(|candidate| {
                config
                    .get(&candidate)
                    .filter(|v| !v.is_empty())
                    .map(|v| (candidate, v))
            });

        match found {
            Some((candidate, value)) => {
                debug!("Target {}: {} from {}", self.name, key, candidate);
                Some(value)
            }
            None => {
                debug!("Target {}: {} from default", self.name, key);
                None
            }
        }
    }

    /// Configured path for `key`, else `top_dir/<default>`, cleaned
    fn fetch_path(&self, key: &str, default: &str) -> PathBuf {
        match self.fetch(key) {
            Some(path) => clean_path(Path::new(&path)),
            None => clean_path(&self.top_dir().join(default)),
        }
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("name", &self.name)
            .field("uri", &self.uri.display_name())
            .finish_non_exhaustive()
    }
}

/// Serializable view of a target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetSummary {
    pub name: String,
    pub uri: String,
    pub engine: String,
    pub registry: String,
    pub client: String,
    pub top_dir: PathBuf,
    pub plan_file: PathBuf,
    pub deploy_dir: PathBuf,
    pub revert_dir: PathBuf,
    pub verify_dir: PathBuf,
    pub extension: String,
}

/// Configuration keys for an attribute, most specific first. Engine sections are
/// tried under the canonical key, then under each alias.
pub fn config_keys(target: &str, engine: &str, key: &str) -> Vec<String> {
    let mut keys = vec![format!("target.{}.{}", target, key)];
    keys.extend(
        engine_sections(engine)
            .into_iter()
            .map(|section| format!("core.{}.{}", section, key)),
    );
    keys.push(format!("core.{}", key));
    keys
}

/// Append `.exe` to a client name on Windows unless it already names an executable
pub fn native_client(client: &str, windows: bool) -> String {
    if windows && !client.ends_with(".exe") && !client.ends_with(".bat") {
        format!("{}.exe", client)
    } else {
        client.to_string()
    }
}

/// Drop `.` components and redundant separators; an empty result becomes `.`
pub fn clean_path(path: &Path) -> PathBuf {
    let cleaned: PathBuf = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();

    if cleaned.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::Options;

    fn target(options: Options, config: &[(&str, &str)], uri: &str) -> Target {
        let config: Config = config.iter().copied().collect();
        let context = Arc::new(Context::new(options, Arc::new(config)));
        Target::new(context, None, Some(DbUri::parse(uri).unwrap())).unwrap()
    }

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path(Path::new("./deploy")), PathBuf::from("deploy"));
        assert_eq!(clean_path(Path::new("a//b/./c/")), PathBuf::from("a/b/c"));
        assert_eq!(clean_path(Path::new(".")), PathBuf::from("."));
        assert_eq!(clean_path(Path::new("")), PathBuf::from("."));
        assert_eq!(clean_path(Path::new("/srv/./db")), PathBuf::from("/srv/db"));
        assert_eq!(clean_path(Path::new("../up")), PathBuf::from("../up"));
    }

    #[test]
    fn test_native_client() {
        assert_eq!(native_client("psql", false), "psql");
        assert_eq!(native_client("psql", true), "psql.exe");
        assert_eq!(native_client("psql.exe", true), "psql.exe");
        assert_eq!(native_client("run.bat", true), "run.bat");
    }

    #[test]
    fn test_config_keys_order() {
        assert_eq!(
            config_keys("prod", "sqlite", "registry"),
            [
                "target.prod.registry",
                "core.sqlite.registry",
                "core.sqlite3.registry",
                "core.registry",
            ]
        );
        assert_eq!(
            config_keys("dev", "oracle", "client"),
            ["target.dev.client", "core.oracle.client", "core.client"]
        );
    }

    #[test]
    fn test_engine_alias_section_is_read() {
        let t = target(
            Options::new(),
            &[("core.postgres.registry", "meta"), ("core.postgresql.client", "pgcli")],
            "db:postgres://localhost/app",
        );
        assert_eq!(t.engine_key(), "pg");
        assert_eq!(t.registry(), "meta");
        assert_eq!(t.client(), "pgcli");

        let canonical_first = target(
            Options::new(),
            &[("core.pg.registry", "pg_meta"), ("core.postgres.registry", "meta")],
            "db:pg:",
        );
        assert_eq!(canonical_first.registry(), "pg_meta");
    }

    #[test]
    fn test_defaults() {
        let t = target(Options::new(), &[], "db:pg://localhost/app");
        assert_eq!(t.name(), "db:pg://localhost/app");
        assert_eq!(t.engine_key(), "pg");
        assert_eq!(t.engine().name(), "PostgreSQL");
        assert_eq!(t.registry(), "sqitch");
        assert_eq!(t.client(), native_client("psql", cfg!(windows)));
        assert_eq!(t.top_dir(), Path::new("."));
        assert_eq!(t.plan_file(), Path::new("sqitch.plan"));
        assert_eq!(t.deploy_dir(), Path::new("deploy"));
        assert_eq!(t.revert_dir(), Path::new("revert"));
        assert_eq!(t.verify_dir(), Path::new("verify"));
        assert_eq!(t.extension(), "sql");
    }

    #[test]
    fn test_directories_follow_top_dir() {
        let t = target(Options::new(), &[("core.top_dir", "./db/")], "db:sqlite:app.db");
        assert_eq!(t.top_dir(), Path::new("db"));
        assert_eq!(t.plan_file(), Path::new("db/sqitch.plan"));
        assert_eq!(t.deploy_dir(), Path::new("db/deploy"));
        assert_eq!(t.revert_dir(), Path::new("db/revert"));
        assert_eq!(t.verify_dir(), Path::new("db/verify"));
    }

    #[test]
    fn test_config_precedence() {
        let uri = "db:pg://localhost/app";
        let config = [
            ("core.registry", "core"),
            ("core.pg.registry", "engine"),
            ("target.db:pg://localhost/app.registry", "target"),
            ("core.extension", "ddl"),
            ("core.pg.extension", ""),
        ];
        let t = target(Options::new(), &config, uri);
        assert_eq!(t.registry(), "target");
        assert_eq!(t.extension(), "ddl");

        let t = target(Options::new(), &config[..2], uri);
        assert_eq!(t.registry(), "engine");

        let t = target(Options::new(), &config[..1], uri);
        assert_eq!(t.registry(), "core");
    }

    #[test]
    fn test_option_beats_config() {
        let t = target(
            Options::new()
                .with(keys::CLIENT, "/opt/pg/bin/psql")
                .with(keys::DEPLOY_DIR, "./changes//deploy"),
            &[("core.client", "psql"), ("core.deploy_dir", "elsewhere")],
            "db:pg:",
        );
        assert_eq!(t.client(), "/opt/pg/bin/psql");
        assert_eq!(t.deploy_dir(), Path::new("changes/deploy"));
    }

    #[test]
    fn test_from_parts_empty_name() {
        let context = Arc::new(Context::new(Options::new(), Arc::new(Config::new())));
        let uri = DbUri::parse("db:pg://u:p@h/d").unwrap();
        let t = Target::from_parts(context, "", uri).unwrap();
        assert_eq!(t.name(), "db:pg://u@h/d");
    }

    #[test]
    fn test_unknown_engine() {
        let context = Arc::new(Context::new(Options::new(), Arc::new(Config::new())));
        let uri = DbUri::parse("db:db2://h/d").unwrap();
        assert_eq!(
            Target::new(context, None, Some(uri)).err(),
            Some(TargetError::UnknownEngine("db2".to_string()))
        );
    }

    #[test]
    fn test_plan_uses_plan_file() {
        let t = target(Options::new().with(keys::TOP_DIR, "proj"), &[], "db:pg:");
        let plan = t.plan();
        assert_eq!(plan.file(), Path::new("proj/sqitch.plan"));
        assert!(Arc::ptr_eq(&plan, &t.plan()));
    }

    #[test]
    fn test_summary_hides_password() {
        let t = target(Options::new(), &[], "db:pg://fred:secret@localhost/app");
        let summary = t.summary();
        assert_eq!(summary.uri, "db:pg://fred@localhost/app");
        assert!(!format!("{:?}", t).contains("secret"));
        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains("secret"));
    }
}
