//! Target name and URI resolution
//!
//! Turns the raw `name`/`uri` a caller supplies into a `{name, uri}` pair a
//! [`Target`](crate::Target) can trust. Precedence:
//!
//! 1. A URI with a name is taken as-is.
//! 2. A URI without a name names itself (canonical string, password removed).
//! 3. Without a URI the name comes from the caller or from `core.<engine>.target`,
//!    where the engine comes from the `engine` option or `core.engine` with
//!    aliases folded to the canonical key (`postgres` reads `core.pg`). A name
//!    containing `:` is a literal URI; any other name is looked up as
//!    `target.<name>.uri`. With no name at all the URI is `db:<engine>:`.
//!    Command-line overrides (`db_host`, `db_port`, `db_username`, `db_name`)
//!    are then applied in that order.

use tracing::debug;

use crate::context::{keys, Context, Options};
use crate::engines::{canonical_engine_key, engine_sections};
use crate::error::{Result, TargetError};
use crate::uri::DbUri;

/// Resolved target identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub name: String,
    pub uri: DbUri,
}

/// Resolve a target name and URI against the context
pub fn resolve(context: &Context, name: Option<&str>, uri: Option<DbUri>) -> Result<Resolved> {
    let name = name.filter(|n| !n.is_empty());

    match (name, uri) {
        (Some(name), Some(uri)) => Ok(Resolved {
            name: name.to_string(),
            uri,
        }),
        (None, Some(uri)) => Ok(Resolved {
            name: uri.display_name(),
            uri,
        }),
        (name, None) => resolve_from_config(context, name),
    }
}

fn resolve_from_config(context: &Context, name: Option<&str>) -> Result<Resolved> {
    let config = context.config();

    let candidate = match name {
        Some(name) => name.to_string(),
        None => {
            let engine = engine_key(context)?;
            let default_target = engine_sections(&engine)
                .into_iter()
                .find_map(|section| {
                    config
                        .get(&format!("core.{}.target", section))
                        .filter(|target| !target.is_empty())
                });
            match default_target {
                Some(target) => target,
                None => {
                    debug!("No default target for {}, using bare engine URI", engine);
                    return finish(context, None, DbUri::parse(&format!("db:{}:", engine))?);
                }
            }
        }
    };

    if candidate.contains(':') {
        // Not a target name, but a URI
        return finish(context, None, DbUri::parse(&candidate)?);
    }

    let uri = lookup_target_uri(context, &candidate)?;
    finish(context, Some(candidate), uri)
}

/// Canonical engine key from the `engine` option, then `core.engine`
fn engine_key(context: &Context) -> Result<String> {
    context
        .options()
        .get(keys::ENGINE)
        .map(str::to_string)
        .or_else(|| context.config().get("core.engine"))
        .filter(|e| !e.is_empty())
        .map(|e| canonical_engine_key(&e))
        .ok_or(TargetError::MissingEngine)
}

fn lookup_target_uri(context: &Context, name: &str) -> Result<DbUri> {
    let config = context.config();

    match config.get(&format!("target.{}.uri", name)) {
        Some(uri) if !uri.is_empty() => {
            debug!("Found URI for target {}", name);
            DbUri::parse(&uri)
        }
        _ if !config.get_section(&format!("target.{}", name)).is_empty() => {
            Err(TargetError::TargetMissingUri(name.to_string()))
        }
        _ => Err(TargetError::UnknownTarget(name.to_string())),
    }
}

fn finish(context: &Context, name: Option<String>, uri: DbUri) -> Result<Resolved> {
    let uri = apply_overrides(uri, context.options())?;
    let name = name.unwrap_or_else(|| uri.display_name());
    Ok(Resolved { name, uri })
}

/// Apply host, port, username and database name overrides, in that order
pub fn apply_overrides(uri: DbUri, options: &Options) -> Result<DbUri> {
    let mut uri = uri;

    if let Some(host) = options.get(keys::DB_HOST) {
        uri = uri.with_host(host)?;
    }
    if let Some(port) = options.get(keys::DB_PORT) {
        let port = port
            .parse::<u16>()
            .map_err(|_| TargetError::InvalidPort(port.to_string()))?;
        uri = uri.with_port(port)?;
    }
    if let Some(user) = options.get(keys::DB_USERNAME) {
        uri = uri.with_user(user)?;
    }
    if let Some(dbname) = options.get(keys::DB_NAME) {
        uri = uri.with_dbname(dbname)?;
    }

    Ok(uri)
}
