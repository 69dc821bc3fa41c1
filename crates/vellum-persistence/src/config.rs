use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::error::{PersistenceError, PersistenceResult};

/// Which metadata store to run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceKind {
    /// PostgreSQL.
    #[default]
    Real,
    Virtual,
    Nop,
}

impl fmt::Display for PersistenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Real => "real",
            Self::Virtual => "virtual",
            Self::Nop => "nop",
        })
    }
}

impl FromStr for PersistenceKind {
    type Err = PersistenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "real" => Ok(Self::Real),
            "virtual" => Ok(Self::Virtual),
            "nop" => Ok(Self::Nop),
            other => Err(PersistenceError::InvalidConfig(format!(
                "unknown persistence {other:?}, expected one of real, virtual, nop"
            ))),
        }
    }
}

/// PostgreSQL `sslmode`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    Disable,
    Allow,
    #[default]
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disable => "disable",
            Self::Allow => "allow",
            Self::Prefer => "prefer",
            Self::Require => "require",
            Self::VerifyCa => "verify-ca",
            Self::VerifyFull => "verify-full",
        })
    }
}

impl FromStr for SslMode {
    type Err = PersistenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disable" => Ok(Self::Disable),
            "allow" => Ok(Self::Allow),
            "prefer" => Ok(Self::Prefer),
            "require" => Ok(Self::Require),
            "verify-ca" => Ok(Self::VerifyCa),
            "verify-full" => Ok(Self::VerifyFull),
            other => Err(PersistenceError::InvalidConfig(format!(
                "unknown sslmode {other:?}"
            ))),
        }
    }
}

impl From<SslMode> for PgSslMode {
    fn from(mode: SslMode) -> Self {
        match mode {
            SslMode::Disable => Self::Disable,
            SslMode::Allow => Self::Allow,
            SslMode::Prefer => Self::Prefer,
            SslMode::Require => Self::Require,
            SslMode::VerifyCa => Self::VerifyCa,
            SslMode::VerifyFull => Self::VerifyFull,
        }
    }
}

/// Connection settings for the PostgreSQL store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub name: String,
    pub sslmode: SslMode,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".into(),
            port: 5432,
            username: "postgres".into(),
            password: String::new(),
            name: "vellum".into(),
            sslmode: SslMode::default(),
            max_connections: 10,
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .field("sslmode", &self.sslmode)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl DatabaseConfig {
    /// Driver connect options.
    pub fn connect_options(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.hostname)
            .port(self.port)
            .username(&self.username)
            .database(&self.name)
            .ssl_mode(self.sslmode.into());
        if self.password.is_empty() {
            options
        } else {
            options.password(&self.password)
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub kind: PersistenceKind,
    pub database: DatabaseConfig,
}

/// A single transform applied to a [`PersistenceConfig`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PersistenceOption {
    Kind(PersistenceKind),
    HostPort(String, u16),
    Credentials { username: String, password: String },
    Database(String),
    SslMode(SslMode),
    MaxConnections(u32),
}

impl PersistenceConfig {
    /// Fold options over the defaults. The first invalid option aborts.
    pub fn from_options(
        options: impl IntoIterator<Item = PersistenceOption>,
    ) -> PersistenceResult<Self> {
        options
            .into_iter()
            .try_fold(Self::default(), |config, option| config.apply(option))
    }

    /// Apply one option.
    pub fn apply(mut self, option: PersistenceOption) -> PersistenceResult<Self> {
        match option {
            PersistenceOption::Kind(kind) => self.kind = kind,
            PersistenceOption::HostPort(host, port) => {
                if host.is_empty() {
                    return Err(PersistenceError::InvalidConfig("hostname must not be empty".into()));
                }
                if port == 0 {
                    return Err(PersistenceError::InvalidConfig("port must not be zero".into()));
                }
                self.database.hostname = host;
                self.database.port = port;
            }
            PersistenceOption::Credentials { username, password } => {
                if username.is_empty() {
                    return Err(PersistenceError::InvalidConfig("username must not be empty".into()));
                }
                self.database.username = username;
                self.database.password = password;
            }
            PersistenceOption::Database(name) => {
                if name.is_empty() {
                    return Err(PersistenceError::InvalidConfig(
                        "database name must not be empty".into(),
                    ));
                }
                self.database.name = name;
            }
            PersistenceOption::SslMode(mode) => self.database.sslmode = mode,
            PersistenceOption::MaxConnections(n) => {
                if n == 0 {
                    return Err(PersistenceError::InvalidConfig(
                        "max_connections must be at least 1".into(),
                    ));
                }
                self.database.max_connections = n;
            }
        }
        Ok(self)
    }
}
