use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs;
use tracing::debug;

use crate::logger::LoggerConfig;

pub mod context;
pub mod debugger;
pub(crate) mod defaults;
pub(crate) mod jsonl;
pub mod isolate;
pub mod logger;

pub use context::ContextConfig;
pub use debugger::DebuggerConfig;
pub use isolate::IsolateConfig;


#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(skip_serializing)]
    path: Option<Utf8PathBuf>,

    #[serde(default)]
    pub isolate: IsolateConfig,

    /// Flags applied to contexts created without explicit settings
    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub logger: LoggerConfig,
}

impl Config {
    #[must_use]
    pub fn with_path(mut self, path: &Utf8PathBuf) -> Self {
        self.path = Some(path.clone());
        self
    }

    pub fn path(&self) -> Utf8PathBuf {
        self.path.clone().unwrap_or(Self::default_path())
    }

    /// Loads config from a json file
    ///
    /// # Errors
    ///
    /// This function will return an error if the config path does not exist or the content is invalid
    pub fn load(path: &Utf8PathBuf) -> Result<Self> {
        debug!("Loading config from {path}");

        if !path.exists() {
            anyhow::bail!("Config file does not exist: {path}");
        }

        let contents =
            fs::read_to_string(path).context(format!("Failed reading config: {path} "))?;

        let mut cfg: Self =
            serde_json::from_str(&contents).context(format!("Failed loading config: {path} "))?;
        cfg.path = Some(path.clone());

        Ok(cfg)
    }

    /// Saves config to json file, falling back on default path if none is provided
    ///
    /// # Errors
    /// This function will error if it fails writing the config
    pub fn save(&self) -> Result<()> {
        let dest = self.path();
        debug!("Saving config to {dest}");
        let contents = serde_json::to_string_pretty(self).unwrap_or(json!(self).to_string());

        fs::write(&dest, contents).context(format!("Failed writing config: {dest}"))?;

        Ok(())
    }

    /// Default config path is ./v8host.json
    pub fn default_path() -> Utf8PathBuf {
        Utf8PathBuf::new().join("v8host.json")
    }
}
