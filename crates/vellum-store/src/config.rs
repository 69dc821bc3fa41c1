use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Which blob store backend to run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileSystemKind {
    #[default]
    Local,
    Remote,
    Virtual,
    Nop,
}

impl fmt::Display for FileSystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Virtual => "virtual",
            Self::Nop => "nop",
        })
    }
}

impl FromStr for FileSystemKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            "virtual" => Ok(Self::Virtual),
            "nop" => Ok(Self::Nop),
            other => Err(StoreError::InvalidConfig(format!(
                "unknown filesystem {other:?}, expected one of local, remote, virtual, nop"
            ))),
        }
    }
}

/// Object store connection settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub token: String,
    /// Override for S3-compatible services.
    pub endpoint: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: "us-east-1".into(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            token: String::new(),
            endpoint: None,
        }
    }
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("token", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// A single transform applied to a [`RemoteConfig`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteOption {
    Credentials {
        id: String,
        secret: String,
        token: String,
    },
    Region(String),
    Bucket(String),
    Endpoint(String),
}

impl RemoteConfig {
    /// Fold options over the defaults. The first invalid option aborts.
    pub fn from_options(options: impl IntoIterator<Item = RemoteOption>) -> StoreResult<Self> {
        options
            .into_iter()
            .try_fold(Self::default(), |config, option| config.apply(option))
    }

    /// Apply one option.
    pub fn apply(mut self, option: RemoteOption) -> StoreResult<Self> {
        match option {
            RemoteOption::Credentials { id, secret, token } => {
                if id.is_empty() != secret.is_empty() {
                    return Err(StoreError::InvalidConfig(
                        "access key id and secret must be given together".into(),
                    ));
                }
                self.access_key_id = id;
                self.secret_access_key = secret;
                self.token = token;
            }
            RemoteOption::Region(region) => {
                if region.is_empty() {
                    return Err(StoreError::InvalidConfig("region must not be empty".into()));
                }
                self.region = region;
            }
            RemoteOption::Bucket(bucket) => {
                if bucket.is_empty() {
                    return Err(StoreError::InvalidConfig("bucket must not be empty".into()));
                }
                self.bucket = bucket;
            }
            RemoteOption::Endpoint(endpoint) => {
                if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                    return Err(StoreError::InvalidConfig(format!(
                        "endpoint {endpoint:?} must be an http(s) URL"
                    )));
                }
                self.endpoint = Some(endpoint);
            }
        }
        Ok(self)
    }
}

/// Blob store configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSystemConfig {
    pub kind: FileSystemKind,
    /// Root directory for [`FileSystemKind::Local`].
    pub root: PathBuf,
    pub remote: RemoteConfig,
}

impl Default for FileSystemConfig {
    fn default() -> Self {
        Self {
            kind: FileSystemKind::default(),
            root: PathBuf::from("vellum-data"),
            remote: RemoteConfig::default(),
        }
    }
}

/// A single transform applied to a [`FileSystemConfig`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileSystemOption {
    Kind(FileSystemKind),
    Root(PathBuf),
    Remote(RemoteOption),
}

impl FileSystemConfig {
    /// Fold options over the defaults. The first invalid option aborts.
    pub fn from_options(options: impl IntoIterator<Item = FileSystemOption>) -> StoreResult<Self> {
        options
            .into_iter()
            .try_fold(Self::default(), |config, option| config.apply(option))
    }

    /// Apply one option.
    pub fn apply(mut self, option: FileSystemOption) -> StoreResult<Self> {
        match option {
            FileSystemOption::Kind(kind) => self.kind = kind,
            FileSystemOption::Root(root) => {
                if root.as_os_str().is_empty() {
                    return Err(StoreError::InvalidConfig("root must not be empty".into()));
                }
                self.root = root;
            }
            FileSystemOption::Remote(option) => self.remote = self.remote.apply(option)?,
        }
        Ok(self)
    }
}
