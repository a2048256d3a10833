//! CLI parsing and command execution
//!
//! This module handles command-line argument parsing and routes commands to the appropriate handlers.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use sqitch_target::context::keys;
use sqitch_target::{Config, ConfigStore, Context, DbUri, Options, Target, TargetSummary};

/// Configuration file used when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "sqitch.toml";

#[derive(Parser)]
#[command(name = "sqitch-target")]
#[command(about = "Resolve deployment targets from options, configuration and engine defaults", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "SQITCH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Database engine (overrides core.engine)
    #[arg(long, env = "SQITCH_ENGINE", global = true)]
    pub engine: Option<String>,

    /// Target name or URI
    #[arg(short, long, env = "SQITCH_TARGET", global = true)]
    pub target: Option<String>,

    /// Database host (overrides the target URI)
    #[arg(long, global = true)]
    pub db_host: Option<String>,

    /// Database port (overrides the target URI)
    #[arg(long, global = true)]
    pub db_port: Option<u16>,

    /// Database user name (overrides the target URI)
    #[arg(long, global = true)]
    pub db_user: Option<String>,

    /// Database name (overrides the target URI)
    #[arg(long, global = true)]
    pub db_name: Option<String>,

    /// Registry name
    #[arg(long, global = true)]
    pub registry: Option<String>,

    /// Database client program
    #[arg(long, global = true)]
    pub client: Option<String>,

    /// Plan file
    #[arg(long, global = true)]
    pub plan_file: Option<PathBuf>,

    /// Top directory for the plan file and scripts
    #[arg(long, global = true)]
    pub top_dir: Option<PathBuf>,

    /// Deploy scripts directory
    #[arg(long, global = true)]
    pub deploy_dir: Option<PathBuf>,

    /// Revert scripts directory
    #[arg(long, global = true)]
    pub revert_dir: Option<PathBuf>,

    /// Verify scripts directory
    #[arg(long, global = true)]
    pub verify_dir: Option<PathBuf>,

    /// Change script file extension
    #[arg(long, global = true)]
    pub extension: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a sample configuration file
    Init {
        /// Output path for the configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        output: PathBuf,
    },

    /// Resolve a target and show its attributes
    Show {
        /// Target name or db: URI (defaults to --target, then the engine's default target)
        name: Option<String>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List configured targets
    List,

    /// List available engines and their defaults
    Engines,
}

impl Cli {
    /// Option set handed to target resolution
    pub fn options(&self) -> Options {
        let path = |p: &Option<PathBuf>| p.as_ref().map(|p| p.to_string_lossy().into_owned());

        Options::new()
            .with_opt(keys::ENGINE, self.engine.clone())
            .with_opt(keys::DB_HOST, self.db_host.clone())
            .with_opt(keys::DB_PORT, self.db_port.map(|p| p.to_string()))
            .with_opt(keys::DB_USERNAME, self.db_user.clone())
            .with_opt(keys::DB_NAME, self.db_name.clone())
            .with_opt(keys::REGISTRY, self.registry.clone())
            .with_opt(keys::CLIENT, self.client.clone())
            .with_opt(keys::PLAN_FILE, path(&self.plan_file))
            .with_opt(keys::TOP_DIR, path(&self.top_dir))
            .with_opt(keys::DEPLOY_DIR, path(&self.deploy_dir))
            .with_opt(keys::REVERT_DIR, path(&self.revert_dir))
            .with_opt(keys::VERIFY_DIR, path(&self.verify_dir))
            .with_opt(keys::EXTENSION, self.extension.clone())
    }
}

/// Load the configuration file, falling back to `sqitch.toml` or an empty store
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path)),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => Config::from_file(DEFAULT_CONFIG_FILE)
            .with_context(|| format!("Failed to load config from {}", DEFAULT_CONFIG_FILE)),
        None => Ok(Config::new()),
    }
}

/// Execute a CLI command
pub fn execute(cli: Cli) -> Result<()> {
    // Handle init command separately as it doesn't need configuration
    if let Commands::Init { output } = &cli.command {
        let engine = cli.engine.as_deref().unwrap_or("pg");
        Config::create_sample(output, engine)
            .with_context(|| format!("Failed to create sample config at {:?}", output))?;
        info!("Sample configuration created at {:?}", output);
        println!("Created {}", output.display());
        return Ok(());
    }

    let config = Arc::new(load_config(cli.config.as_deref())?);
    let context = Arc::new(Context::new(
        cli.options(),
        config.clone() as Arc<dyn ConfigStore>,
    ));

    match cli.command {
        Commands::Init { .. } => unreachable!(), // Handled above

        Commands::Show { name, json } => {
            let name = name.or(cli.target);
            let target = Target::new(context, name.as_deref(), None)
                .context("Failed to resolve target")?;
            let summary = target.summary();

            if json {
                let out = serde_json::to_string_pretty(&summary)
                    .context("Failed to serialize target")?;
                println!("{}", out);
            } else {
                print_summary(&summary);
            }
        }

        Commands::List => {
            let names = config.target_names();
            if names.is_empty() {
                println!("No targets configured");
            }
            for name in names {
                let uri = config.get(&format!("target.{}.uri", name));
                match uri.as_deref().map(DbUri::parse) {
                    Some(Ok(uri)) => println!("{}\t{}", name, uri.display_name()),
                    Some(Err(e)) => {
                        warn!("Target {} has an invalid URI: {}", name, e);
                        println!("{}\t(invalid URI)", name);
                    }
                    None => println!("{}\t(no URI)", name),
                }
            }
        }

        Commands::Engines => {
            for key in context.engines().keys() {
                let target = DbUri::for_engine(key)
                    .and_then(|uri| Target::from_parts(context.clone(), "", uri))
                    .with_context(|| format!("Failed to load engine {}", key))?;
                let engine = target.engine();
                println!(
                    "{}\t{}\tregistry={}\tclient={}",
                    engine.key(),
                    engine.name(),
                    engine.default_registry(),
                    engine.default_client()
                );
            }
        }
    }

    Ok(())
}

fn print_summary(summary: &TargetSummary) {
    println!("Target: {}", summary.name);
    println!("  URI:        {}", summary.uri);
    println!("  Engine:     {}", summary.engine);
    println!("  Registry:   {}", summary.registry);
    println!("  Client:     {}", summary.client);
    println!("  Top dir:    {}", summary.top_dir.display());
    println!("  Plan file:  {}", summary.plan_file.display());
    println!("  Deploy dir: {}", summary.deploy_dir.display());
    println!("  Revert dir: {}", summary.revert_dir.display());
    println!("  Verify dir: {}", summary.verify_dir.display());
    println!("  Extension:  {}", summary.extension);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_flags() {
        let cli = Cli::parse_from([
            "sqitch-target",
            "--engine",
            "pg",
            "--db-host",
            "db.example.com",
            "--db-port",
            "6543",
            "--db-user",
            "alice",
            "--top-dir",
            "migrations",
            "show",
        ]);
        let options = cli.options();
        assert_eq!(options.get(keys::ENGINE), Some("pg"));
        assert_eq!(options.get(keys::DB_HOST), Some("db.example.com"));
        assert_eq!(options.get(keys::DB_PORT), Some("6543"));
        assert_eq!(options.get(keys::DB_USERNAME), Some("alice"));
        assert_eq!(options.get(keys::TOP_DIR), Some("migrations"));
        assert_eq!(options.get(keys::DB_NAME), None);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["sqitch-target", "show", "prod", "--registry", "meta"]);
        assert_eq!(cli.options().get(keys::REGISTRY), Some("meta"));
        match cli.command {
            Commands::Show { name, json } => {
                assert_eq!(name.as_deref(), Some("prod"));
                assert!(!json);
            }
            _ => panic!("expected show"),
        }
    }

    #[test]
    fn test_invalid_port_rejected() {
        assert!(Cli::try_parse_from(["sqitch-target", "--db-port", "http", "list"]).is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[core]\nengine = \"sqlite\"\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.get("core.engine").as_deref(), Some("sqlite"));
        assert!(load_config(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
