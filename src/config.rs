//! Command line and TOML configuration.

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

#[derive(Debug, Parser)]
#[command(name = "file-ledger", version, about = "File upload service with a hash-linked integrity ledger")]
pub struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, env = "FILE_LEDGER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the data directory (ledger file and uploads live here).
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,

    /// Override the HTTP listen address (e.g. "127.0.0.1:3000").
    #[arg(short, long)]
    pub listen: Option<String>,
}

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSection,
    pub storage: StorageSection,
    pub log: LogSection,
}

/// `[server]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub listen_addr: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3000".to_string(),
        }
    }
}

/// `[storage]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Root directory for everything written to disk.
    pub data_dir: PathBuf,
    /// Ledger file name, relative to `data_dir`.
    pub ledger_file: String,
    /// Upload directory name, relative to `data_dir`.
    pub upload_dir: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            ledger_file: "ledger.json".to_string(),
            upload_dir: "uploads".to_string(),
        }
    }
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`). `RUST_LOG` wins if set.
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load config from a TOML file, or use defaults if no path given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)?;
                Ok(toml::from_str(&content)?)
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply command line overrides on top of the file values.
    pub fn with_overrides(mut self, cli: &Cli) -> Self {
        if let Some(dir) = &cli.data_dir {
            self.storage.data_dir = dir.clone();
        }
        if let Some(addr) = &cli.listen {
            self.server.listen_addr = addr.clone();
        }
        self
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.ledger_file)
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.upload_dir)
    }
}
