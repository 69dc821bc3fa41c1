use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use vellum_persistence::PersistenceConfig;
use vellum_server::ServerConfig;
use vellum_store::FileSystemConfig;

use crate::cli::StoreArgs;

/// Contents of the `--config` TOML file. Every section is optional.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub filesystem: FileSystemConfig,
    pub persistence: PersistenceConfig,
    pub verify_references: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            filesystem: FileSystemConfig::default(),
            persistence: PersistenceConfig::default(),
            verify_references: true,
        }
    }
}

impl Settings {
    /// Read `path`, or fall back to the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Layer command-line flags over the file values.
    pub fn with_flags(mut self, flags: &StoreArgs) -> anyhow::Result<Self> {
        self.filesystem = flags
            .filesystem_options()
            .into_iter()
            .try_fold(self.filesystem, |config, option| config.apply(option))
            .context("invalid blob store option")?;
        let options = flags.persistence_options(&self.persistence.database);
        self.persistence = options
            .into_iter()
            .try_fold(self.persistence, |config, option| config.apply(option))
            .context("invalid metadata store option")?;
        if let Some(verify) = flags.verify_references {
            self.verify_references = verify;
        }
        Ok(self)
    }
}
