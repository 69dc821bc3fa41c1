use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use vellum_crypto::AddressEncoding;
use vellum_persistence::{DatabaseConfig, PersistenceKind, PersistenceOption, SslMode};
use vellum_store::{FileSystemKind, FileSystemOption, RemoteOption};

#[derive(Parser)]
#[command(
    name = "vellum",
    about = "vellum: a content-addressed document repository",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log at debug level
    #[arg(long, global = true)]
    pub debug: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML settings file; flags override its values
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP service
    Serve(ServeArgs),
    /// Print the content address of a file
    Address(AddressArgs),
    /// Remove content no revision refers to
    Sweep(SweepArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// Listen address, e.g. tcp://127.0.0.1:8080
    #[arg(long)]
    pub api: Option<String>,
}

#[derive(Args)]
pub struct AddressArgs {
    pub path: PathBuf,
    /// hex or base64url
    #[arg(long, default_value = "hex")]
    pub encoding: AddressEncoding,
}

#[derive(Args)]
pub struct SweepArgs {
    /// Leave content younger than this many seconds alone
    #[arg(long, default_value_t = 3600)]
    pub grace_secs: i64,
}

/// Blob store and metadata store selection.
#[derive(Args, Debug, Default)]
pub struct StoreArgs {
    #[arg(long, global = true, value_name = "KIND")]
    pub filesystem: Option<FileSystemKind>,
    /// Root directory of the local blob store
    #[arg(long = "filesystem.root", global = true, value_name = "DIR")]
    pub filesystem_root: Option<PathBuf>,

    #[arg(long = "aws.id", global = true)]
    pub aws_id: Option<String>,
    #[arg(long = "aws.secret", global = true)]
    pub aws_secret: Option<String>,
    #[arg(long = "aws.token", global = true)]
    pub aws_token: Option<String>,
    #[arg(long = "aws.region", global = true)]
    pub aws_region: Option<String>,
    #[arg(long = "aws.bucket", global = true)]
    pub aws_bucket: Option<String>,
    /// S3-compatible endpoint URL
    #[arg(long = "aws.endpoint", global = true)]
    pub aws_endpoint: Option<String>,

    #[arg(long, global = true, value_name = "KIND")]
    pub persistence: Option<PersistenceKind>,
    #[arg(long = "db.hostname", global = true)]
    pub db_hostname: Option<String>,
    #[arg(long = "db.port", global = true)]
    pub db_port: Option<u16>,
    #[arg(long = "db.username", global = true)]
    pub db_username: Option<String>,
    #[arg(long = "db.password", global = true)]
    pub db_password: Option<String>,
    #[arg(long = "db.name", global = true)]
    pub db_name: Option<String>,
    #[arg(long = "db.sslmode", global = true)]
    pub db_sslmode: Option<SslMode>,
    #[arg(long = "db.max-connections", global = true)]
    pub db_max_connections: Option<u32>,

    /// Refuse revisions whose content is not stored
    #[arg(long = "verify-references", global = true, value_name = "BOOL")]
    pub verify_references: Option<bool>,
}

impl StoreArgs {
    pub fn filesystem_options(&self) -> Vec<FileSystemOption> {
        let mut options = Vec::new();
        if let Some(kind) = self.filesystem {
            options.push(FileSystemOption::Kind(kind));
        }
        if let Some(root) = &self.filesystem_root {
            options.push(FileSystemOption::Root(root.clone()));
        }
        if self.aws_id.is_some() || self.aws_secret.is_some() || self.aws_token.is_some() {
            options.push(FileSystemOption::Remote(RemoteOption::Credentials {
                id: self.aws_id.clone().unwrap_or_default(),
                secret: self.aws_secret.clone().unwrap_or_default(),
                token: self.aws_token.clone().unwrap_or_default(),
            }));
        }
        if let Some(region) = &self.aws_region {
            options.push(FileSystemOption::Remote(RemoteOption::Region(region.clone())));
        }
        if let Some(bucket) = &self.aws_bucket {
            options.push(FileSystemOption::Remote(RemoteOption::Bucket(bucket.clone())));
        }
        if let Some(endpoint) = &self.aws_endpoint {
            options.push(FileSystemOption::Remote(RemoteOption::Endpoint(endpoint.clone())));
        }
        options
    }

    /// Options for the metadata store. Paired settings given only in part
    /// are completed from `base`.
    pub fn persistence_options(&self, base: &DatabaseConfig) -> Vec<PersistenceOption> {
        let mut options = Vec::new();
        if let Some(kind) = self.persistence {
            options.push(PersistenceOption::Kind(kind));
        }
        if self.db_hostname.is_some() || self.db_port.is_some() {
            options.push(PersistenceOption::HostPort(
                self.db_hostname.clone().unwrap_or_else(|| base.hostname.clone()),
                self.db_port.unwrap_or(base.port),
            ));
        }
        if self.db_username.is_some() || self.db_password.is_some() {
            options.push(PersistenceOption::Credentials {
                username: self.db_username.clone().unwrap_or_else(|| base.username.clone()),
                password: self.db_password.clone().unwrap_or_else(|| base.password.clone()),
            });
        }
        if let Some(name) = &self.db_name {
            options.push(PersistenceOption::Database(name.clone()));
        }
        if let Some(mode) = self.db_sslmode {
            options.push(PersistenceOption::SslMode(mode));
        }
        if let Some(max) = self.db_max_connections {
            options.push(PersistenceOption::MaxConnections(max));
        }
        options
    }
}
