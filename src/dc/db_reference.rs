// src/dc/db_reference.rs

//! Database references of Data Connections and the URLs built from them.
//!
//! URLs follow the SQLAlchemy shape: `sqlite:///<path>` for file databases,
//! `dialect[+driver]://[user[:password]@]host[:port]/database` otherwise.
//! User names and passwords are percent-encoded.

use std::path::{Path, PathBuf};

use crate::config::model::{DatabaseField, DbReferenceConfig, SerializedPath};
use crate::errors::{ItemError, Result};
use crate::resource::posix_string;

pub const SQLITE: &str = "sqlite";

/// Default TCP port of a server dialect (driver suffixes are ignored).
pub fn default_port(dialect: &str) -> Option<u16> {
    match base_dialect(dialect) {
        "mysql" => Some(3306),
        "postgresql" => Some(5432),
        "mssql" => Some(1433),
        "oracle" => Some(1521),
        _ => None,
    }
}

fn base_dialect(dialect: &str) -> &str {
    dialect.split('+').next().unwrap_or(dialect)
}

/// A database a Data Connection points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbReference {
    pub dialect: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// File path for SQLite, database name otherwise.
    pub database: String,
    pub username: Option<String>,
    pub schema: Option<String>,
}

impl DbReference {
    pub fn sqlite(path: &Path) -> Self {
        Self {
            dialect: SQLITE.to_string(),
            host: None,
            port: None,
            database: posix_string(path),
            username: None,
            schema: None,
        }
    }

    pub fn server(
        dialect: impl Into<String>,
        host: impl Into<String>,
        port: Option<u16>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            dialect: dialect.into(),
            host: Some(host.into()),
            port,
            database: database.into(),
            username: None,
            schema: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Read a `db_references` entry; file databases may be stored relative
    /// to the project directory.
    pub fn from_config(config: &DbReferenceConfig, project_dir: &Path) -> Self {
        let database = match &config.database {
            DatabaseField::Path(path) => posix_string(&path.resolve(project_dir)),
            DatabaseField::Name(name) => name.clone(),
        };
        Self {
            dialect: config.dialect.clone(),
            host: config.host.clone().filter(|h| !h.is_empty()),
            port: config.port,
            database,
            username: config.username.clone(),
            schema: config.schema.clone(),
        }
    }

    pub fn to_config(&self, project_dir: &Path) -> DbReferenceConfig {
        let database = if self.is_sqlite() {
            DatabaseField::Path(SerializedPath::from_path(Path::new(&self.database), project_dir))
        } else {
            DatabaseField::Name(self.database.clone())
        };
        DbReferenceConfig {
            dialect: self.dialect.clone(),
            host: self.host.clone(),
            port: self.port,
            database,
            username: self.username.clone(),
            schema: self.schema.clone(),
        }
    }

    pub fn is_sqlite(&self) -> bool {
        base_dialect(&self.dialect) == SQLITE
    }

    /// Database file of a SQLite reference.
    pub fn sqlite_file(&self) -> Option<PathBuf> {
        self.is_sqlite().then(|| PathBuf::from(&self.database))
    }

    /// Full URL; `credentials` are `(username, password)`.
    pub fn url(&self, credentials: Option<&(String, String)>) -> String {
        if self.is_sqlite() {
            return format!("{}:///{}", self.dialect, self.database);
        }
        let mut url = format!("{}://", self.dialect);
        let username = credentials
            .map(|(user, _)| user.as_str())
            .or(self.username.as_deref())
            .filter(|u| !u.is_empty());
        if let Some(user) = username {
            url.push_str(&urlencoding::encode(user));
            if let Some((_, password)) = credentials.filter(|(_, p)| !p.is_empty()) {
                url.push(':');
                url.push_str(&urlencoding::encode(password));
            }
            url.push('@');
        }
        url.push_str(self.host.as_deref().unwrap_or_default());
        if let Some(port) = self.port {
            url.push_str(&format!(":{port}"));
        }
        url.push('/');
        url.push_str(&self.database);
        url
    }

    /// URL without a password; also the key of stored credentials.
    pub fn safe_url(&self) -> String {
        safe_url(&self.url(None))
    }
}

/// Components of a database URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlParts {
    pub dialect: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: String,
    pub query: Option<String>,
}

/// Split a database URL into its components.
pub fn parse_url(url: &str) -> Result<UrlParts> {
    let (dialect, rest) = url
        .split_once("://")
        .ok_or_else(|| ItemError::DbValidationFailed(format!("'{url}' is not a URL")))?;
    if dialect.is_empty() {
        return Err(ItemError::DbValidationFailed(format!("'{url}' has no dialect")));
    }

    let (rest, query) = match rest.split_once('?') {
        Some((rest, query)) => (rest, Some(query.to_string())),
        None => (rest, None),
    };
    let (authority, database) = split_authority(rest);
    let database = database.strip_prefix('/').unwrap_or(database);

    let (userinfo, hostport) = match authority.rsplit_once('@') {
        Some((userinfo, hostport)) => (Some(userinfo), hostport),
        None => (None, authority),
    };
    let (username, password) = match userinfo {
        Some(info) => match info.split_once(':') {
            Some((user, password)) => (Some(decode(user, url)?), Some(decode(password, url)?)),
            None => (Some(decode(info, url)?), None),
        },
        None => (None, None),
    };

    let (host, port) = match hostport.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse().map_err(|_| {
                let message = format!("invalid port '{port}' in '{}'", safe_url(url));
                ItemError::DbValidationFailed(message)
            })?;
            (host, Some(port))
        }
        None => (hostport, None),
    };

    Ok(UrlParts {
        dialect: dialect.to_string(),
        username,
        password,
        host: (!host.is_empty()).then(|| host.to_string()),
        port,
        database: database.to_string(),
        query,
    })
}

fn decode(component: &str, url: &str) -> Result<String> {
    urlencoding::decode(component)
        .map(|c| c.into_owned())
        .map_err(|_| {
            ItemError::DbValidationFailed(format!("invalid escape in '{}'", safe_url(url)))
        })
}

/// Split what follows `scheme://` into the authority and the `/...` tail.
///
/// The authority ends at the first `/` after its last `@`, so a password
/// that was not percent-encoded still stays inside it.
fn split_authority(rest: &str) -> (&str, &str) {
    if rest.starts_with('/') {
        return ("", rest);
    }
    let before_query = rest.split('?').next().unwrap_or(rest);
    let start = before_query.rfind('@').map_or(0, |at| at + 1);
    match rest[start..].find('/') {
        Some(idx) => rest.split_at(start + idx),
        None => (rest, ""),
    }
}

/// `url` with any password removed.
pub fn safe_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let (authority, tail) = split_authority(rest);
    match authority.rsplit_once('@') {
        Some((userinfo, hostport)) => {
            let user = userinfo.split_once(':').map(|(u, _)| u).unwrap_or(userinfo);
            format!("{scheme}://{user}@{hostport}{tail}")
        }
        None => url.to_string(),
    }
}

/// Database file of a `sqlite:///` URL; `None` for other URLs and for
/// in-memory databases.
pub fn sqlite_path(url: &str) -> Option<PathBuf> {
    let (scheme, rest) = url.split_once(":///")?;
    if base_dialect(scheme) != SQLITE {
        return None;
    }
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() || path == ":memory:" {
        return None;
    }
    Some(PathBuf::from(path))
}
