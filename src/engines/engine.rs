use std::fmt;

/// Trait for database engines (PostgreSQL, SQLite, MySQL, etc.)
///
/// Engines are loaded lazily by a [`Target`](crate::Target) through the
/// [`EngineRegistry`](super::EngineRegistry) and only supply the defaults the
/// target falls back to when nothing is configured.
pub trait Engine: Send + Sync + fmt::Debug {
    /// Short engine key used in URIs and configuration keys (`pg`, `sqlite`, ...)
    fn key(&self) -> &str;

    /// Human readable engine name for display purposes
    fn name(&self) -> &str;

    /// Registry name used when neither options nor configuration supply one
    fn default_registry(&self) -> &str;

    /// Client program used when neither options nor configuration supply one
    fn default_client(&self) -> &str;
}
