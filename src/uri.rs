//! Database connection URIs
//!
//! Targets are addressed with `db:` URIs of the form
//! `db:<engine>://[user[:password]@][host][:port]/[dbname][?query][#fragment]` or
//! the authority-less form `db:<engine>:[dbname]`. Everything after `db:` is parsed
//! by [`url::Url`] with the engine key as its scheme. A [`DbUri`] is an immutable
//! value; the `with_*` methods return modified copies.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use url::{Position, Url};

use crate::engines::canonical_engine_key;
use crate::error::{Result, TargetError};

const SCHEME: &str = "db:";

/// Stand-in host for authorities that carry credentials or a port but no host
/// (`db:pg://fred@/app`, `db:pg://:5433`), which `url` refuses to represent.
/// It never shows up through the accessors or the rendered string.
const HOSTLESS: &str = "hostless.invalid";

/// Decoded components, read once from the underlying `Url`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
struct Parts {
    authority: bool,
    user: Option<String>,
    password: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    dbname: Option<String>,
    query: Option<String>,
    fragment: Option<String>,
}

/// Parsed `db:` connection URI.
#[derive(Debug, Clone)]
pub struct DbUri {
    engine: String,
    url: Url,
    hostless: bool,
    parts: Parts,
}

impl DbUri {
    /// Parse a `db:` URI string
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: String| TargetError::InvalidUri {
            uri: input.to_string(),
            reason,
        };

        let rest = input
            .strip_prefix(SCHEME)
            .ok_or_else(|| invalid("expected a db: URI".to_string()))?;
        let (engine, rest) = rest
            .split_once(':')
            .ok_or_else(|| invalid("missing engine".to_string()))?;
        if engine.is_empty() {
            return Err(invalid("missing engine".to_string()));
        }
        if !engine.starts_with(|c: char| c.is_ascii_alphabetic())
            || !engine
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            return Err(invalid("engine contains invalid characters".to_string()));
        }

        let engine = canonical_engine_key(engine);
        let source = format!("{}:{}", engine, rest);
        let parsed = match Url::parse(&source) {
            Ok(url) => Self::from_url(engine, url, false),
            Err(err) => match with_hostless_placeholder(&source, engine.len() + 1) {
                Some(patched) => Url::parse(&patched)
                    .map_err(|_| err.to_string())
                    .and_then(|url| Self::from_url(engine, url, true)),
                None => Err(err.to_string()),
            },
        };
        parsed.map_err(invalid)
    }

    /// Bare URI for an engine with no host, credentials or database: `db:<engine>:`
    pub fn for_engine(engine: &str) -> Result<Self> {
        Self::parse(&format!("{}{}:", SCHEME, engine))
    }

    /// Canonical engine key, with scheme aliases such as `postgres` folded to `pg`
    pub fn engine(&self) -> &str {
        &self.engine
    }

    pub fn host(&self) -> Option<&str> {
        self.parts.host.as_deref()
    }

    pub fn port(&self) -> Option<u16> {
        self.parts.port
    }

    pub fn user(&self) -> Option<&str> {
        self.parts.user.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.parts.password.as_deref()
    }

    pub fn dbname(&self) -> Option<&str> {
        self.parts.dbname.as_deref()
    }

    pub fn query(&self) -> Option<&str> {
        self.parts.query.as_deref()
    }

    pub fn fragment(&self) -> Option<&str> {
        self.parts.fragment.as_deref()
    }

    /// Whether the URI carries a `//` authority section
    pub fn has_authority(&self) -> bool {
        self.parts.authority
    }

    /// Copy with the host replaced. Bare IPv6 literals such as `::1` are bracketed.
    pub fn with_host(&self, host: &str) -> Result<Self> {
        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{}]", host)
        } else {
            host.to_string()
        };
        let (mut url, _) = self.editable()?;
        url.set_host(Some(host.as_str()))
            .map_err(|e| self.invalid(format!("invalid host \"{}\": {}", host, e)))?;
        self.rebuilt(url, false)
    }

    /// Copy with the port replaced
    pub fn with_port(&self, port: u16) -> Result<Self> {
        let (mut url, hostless) = self.editable()?;
        url.set_port(Some(port))
            .map_err(|_| self.invalid(format!("cannot set port {}", port)))?;
        self.rebuilt(url, hostless)
    }

    /// Copy with the user name replaced
    pub fn with_user(&self, user: &str) -> Result<Self> {
        let (mut url, hostless) = self.editable()?;
        url.set_username(&encode_component(user))
            .map_err(|_| self.invalid(format!("cannot set user \"{}\"", user)))?;
        self.rebuilt(url, hostless)
    }

    /// Copy with the password replaced
    pub fn with_password(&self, password: Option<&str>) -> Result<Self> {
        if password.is_none() {
            return Ok(self.without_password());
        }
        let (mut url, hostless) = self.editable()?;
        url.set_password(password.map(encode_component).as_deref())
            .map_err(|_| self.invalid("cannot set password".to_string()))?;
        self.rebuilt(url, hostless)
    }

    /// Copy with the database name replaced
    pub fn with_dbname(&self, dbname: &str) -> Result<Self> {
        if self.parts.authority {
            let mut url = self.url.clone();
            if dbname.is_empty() {
                url.set_path("");
            } else {
                url.set_path(&format!("/{}", encode_path(dbname)));
            }
            return self.rebuilt(url, self.hostless);
        }

        // Opaque paths cannot be edited in place; render the new form and reparse
        let source = format!(
            "{}:{}{}",
            self.engine,
            encode_opaque(dbname),
            self.suffix()
        );
        let url = Url::parse(&source).map_err(|e| self.invalid(e.to_string()))?;
        self.rebuilt(url, false)
    }

    /// Copy with any password removed
    pub fn without_password(&self) -> Self {
        let mut uri = self.clone();
        if uri.parts.password.is_some() && uri.url.set_password(None).is_ok() {
            uri.parts.password = None;
        }
        uri
    }

    /// Canonical string with the password removed. Used as the default target name.
    pub fn display_name(&self) -> String {
        self.without_password().to_string()
    }

    fn from_url(engine: String, url: Url, hostless: bool) -> std::result::Result<Self, String> {
        let authority = url.has_authority();
        let host = if hostless {
            None
        } else {
            url.host_str().filter(|h| !h.is_empty()).map(str::to_string)
        };
        let path = decode(url.path())?;
        let dbname = if authority {
            non_empty(path.strip_prefix('/').unwrap_or(&path).to_string())
        } else {
            non_empty(path)
        };

        let parts = Parts {
            authority,
            user: non_empty(decode(url.username())?),
            password: url.password().map(decode).transpose()?,
            host,
            port: url.port(),
            dbname,
            query: url.query().map(str::to_string),
            fragment: url.fragment().map(str::to_string),
        };

        Ok(Self {
            engine,
            url,
            hostless,
            parts,
        })
    }

    /// A `Url` with a non-empty host that accepts credential and port setters,
    /// plus whether that host is the placeholder.
    fn editable(&self) -> Result<(Url, bool)> {
        if !self.parts.authority {
            let mut source = format!("{}://{}", self.engine, HOSTLESS);
            if let Some(dbname) = &self.parts.dbname {
                source.push('/');
                source.push_str(&encode_path(dbname));
            }
            source.push_str(&self.suffix());
            let url = Url::parse(&source).map_err(|e| self.invalid(e.to_string()))?;
            return Ok((url, true));
        }

        let mut url = self.url.clone();
        if self.parts.host.is_none() && !self.hostless {
            url.set_host(Some(HOSTLESS))
                .map_err(|e| self.invalid(e.to_string()))?;
            return Ok((url, true));
        }
        Ok((url, self.hostless))
    }

    fn rebuilt(&self, url: Url, hostless: bool) -> Result<Self> {
        Self::from_url(self.engine.clone(), url, hostless).map_err(|reason| self.invalid(reason))
    }

    fn suffix(&self) -> String {
        let mut suffix = String::new();
        if let Some(query) = &self.parts.query {
            suffix.push('?');
            suffix.push_str(query);
        }
        if let Some(fragment) = &self.parts.fragment {
            suffix.push('#');
            suffix.push_str(fragment);
        }
        suffix
    }

    fn invalid(&self, reason: String) -> TargetError {
        TargetError::InvalidUri {
            uri: self.display_name(),
            reason,
        }
    }
}

/// Fill an empty host slot in `<engine>://[userinfo@][:port]...` with the
/// placeholder host. Returns `None` when the authority already names a host.
fn with_hostless_placeholder(source: &str, rest_start: usize) -> Option<String> {
    let after = source.get(rest_start..)?.strip_prefix("//")?;
    let end = after.find(['/', '?', '#']).unwrap_or(after.len());
    let authority = &after[..end];
    let host_start = authority.rfind('@').map_or(0, |i| i + 1);
    let hostport = &authority[host_start..];
    if !(hostport.is_empty() || hostport.starts_with(':')) {
        return None;
    }

    let at = rest_start + 2 + host_start;
    Some(format!("{}{}{}", &source[..at], HOSTLESS, &source[at..]))
}

fn decode(input: &str) -> std::result::Result<String, String> {
    urlencoding::decode(input)
        .map(|s| s.into_owned())
        .map_err(|e| format!("invalid percent-encoding in \"{}\": {}", input, e))
}

fn encode_component(input: &str) -> String {
    urlencoding::encode(input).into_owned()
}

fn encode_path(input: &str) -> String {
    urlencoding::encode(input).replace("%2F", "/")
}

/// Path encoding for the authority-less form. A leading `//` would read back as
/// an authority, so those two slashes stay escaped.
fn encode_opaque(input: &str) -> String {
    let encoded = encode_path(input);
    match encoded.strip_prefix("//") {
        Some(rest) => format!("%2F%2F{}", rest),
        None => encoded,
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

impl PartialEq for DbUri {
    fn eq(&self, other: &Self) -> bool {
        self.engine == other.engine && self.parts == other.parts
    }
}

impl Eq for DbUri {}

impl Hash for DbUri {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.engine.hash(state);
        self.parts.hash(state);
    }
}

impl fmt::Display for DbUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hostless {
            write!(
                f,
                "{}{}{}",
                SCHEME,
                &self.url[..Position::BeforeHost],
                &self.url[Position::AfterHost..]
            )
        } else {
            write!(f, "{}{}", SCHEME, self.url)
        }
    }
}

impl FromStr for DbUri {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for DbUri {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DbUri {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
