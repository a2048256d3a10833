//! Deployment Target Resolution Library
//!
//! Resolves named database deployment targets from explicit values, command-line
//! options, hierarchical configuration and engine defaults.

pub mod config;
pub mod context;
pub mod engines;
pub mod error;
pub mod plan;
pub mod resolver;
pub mod target;
pub mod uri;

pub use config::{Config, ConfigStore};
pub use context::{Context, Options};
pub use engines::{Engine, EngineKind, EngineRegistry};
pub use error::{Result, TargetError};
pub use plan::{Plan, PlanLoader};
pub use resolver::{resolve, Resolved};
pub use target::{Target, TargetSummary};
pub use uri::DbUri;
