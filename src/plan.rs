//! Plan loading seam
//!
//! The plan file format is owned by the plan collaborator. A target only hands it
//! the resolved plan file path; [`PlanFileLoader`] records that path without reading it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::context::Context;

/// A deployment plan bound to a plan file
pub trait Plan: Send + Sync + fmt::Debug {
    fn file(&self) -> &Path;
}

/// Builds plans for targets
pub trait PlanLoader: Send + Sync {
    fn load(&self, context: &Context, file: &Path) -> Arc<dyn Plan>;
}

/// Plan handle that only knows its file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanFile {
    file: PathBuf,
}

impl PlanFile {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self { file: file.into() }
    }
}

impl Plan for PlanFile {
    fn file(&self) -> &Path {
        &self.file
    }
}

/// Default loader producing [`PlanFile`] handles
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanFileLoader;

impl PlanLoader for PlanFileLoader {
    fn load(&self, _context: &Context, file: &Path) -> Arc<dyn Plan> {
        debug!("Loading plan from {}", file.display());
        Arc::new(PlanFile::new(file))
    }
}
