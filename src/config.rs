//! Configuration file handling for Money Monitor.
//!
//! The configuration file is stored at `$MONEY_MONITOR_HOME/config.json`. It names the socket
//! address the HTTP API binds to and, optionally, where the SQLite database lives.

use crate::db::Db;
use crate::error::{ErrorType, IntoResult, Res, Result};
use crate::tracker::Tracker;
use crate::utils;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const APP_NAME: &str = "money-monitor";
const CONFIG_VERSION: u8 = 1;
const CONFIG_JSON: &str = "config.json";
const MONEY_MONITOR_SQLITE: &str = "money-monitor.sqlite";
const DEFAULT_PORT: u16 = 8000;

/// The `Config` object represents the data home of the app. You instantiate it by providing the
/// path to `$MONEY_MONITOR_HOME` and from there it loads `config.json` and opens the database.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
    db: Db,
    sqlite_path: PathBuf,
}

impl Config {
    /// Creates the home directory, writes an initial `config.json` and creates the database.
    ///
    /// # Arguments
    /// - `dir` - The directory that will be the data home, e.g. `$HOME/money-monitor`
    /// - `bind` - The address for the HTTP API. Defaults to `127.0.0.1:8000`.
    ///
    /// # Errors
    /// - `ErrorType::Config` if the directory, the config file or the database cannot be created,
    ///   including when a database already exists there.
    pub async fn create(dir: impl Into<PathBuf>, bind: Option<SocketAddr>) -> Result<Self> {
        create(dir.into(), bind).await.pub_result(ErrorType::Config)
    }

    /// Validates that the home and its config file exist, loads them, and opens (and if needed
    /// migrates) the database.
    ///
    /// # Errors
    /// - `ErrorType::Config` if anything is missing or invalid.
    pub async fn load(home: impl Into<PathBuf>) -> Result<Self> {
        load(home.into()).await.pub_result(ErrorType::Config)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn bind(&self) -> SocketAddr {
        self.config_file.bind
    }

    pub fn sqlite_path(&self) -> &Path {
        &self.sqlite_path
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// A `Tracker` over this home's database.
    pub fn tracker(&self) -> Tracker {
        Tracker::new(Arc::new(self.db.clone()))
    }
}

async fn create(maybe_relative: PathBuf, bind: Option<SocketAddr>) -> Res<Config> {
    utils::make_dir(&maybe_relative)
        .await
        .context("Unable to create the money-monitor home directory")?;
    let root = utils::canonicalize(&maybe_relative).await?;

    let config_path = root.join(CONFIG_JSON);
    if config_path.exists() {
        bail!("A config file already exists at '{}'", config_path.display());
    }
    let config_file = ConfigFile {
        bind: bind.unwrap_or_else(default_bind),
        ..ConfigFile::default()
    };
    config_file.save(&config_path).await?;

    let sqlite_path = config_file.sqlite_path(&root);
    let db = Db::init(&sqlite_path)
        .await
        .context("Unable to create SQLite DB")?;

    Ok(Config {
        root,
        config_path,
        config_file,
        db,
        sqlite_path,
    })
}

async fn load(maybe_relative: PathBuf) -> Res<Config> {
    let root = utils::canonicalize(&maybe_relative)
        .await
        .context("The money-monitor home is missing, run `money-monitor init` first")?;

    let config_path = root.join(CONFIG_JSON);
    if !config_path.is_file() {
        bail!("The config file is missing '{}'", config_path.display())
    }
    let config_file = ConfigFile::load(&config_path).await?;

    let sqlite_path = config_file.sqlite_path(&root);
    let db = Db::load(&sqlite_path)
        .await
        .context("Unable to load SQLite DB")?;

    Ok(Config {
        root,
        config_path,
        config_file,
        db,
        sqlite_path,
    })
}

fn default_bind() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT))
}

/// Represents the serialization and deserialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "money-monitor",
///   "config_version": 1,
///   "bind": "127.0.0.1:8000",
///   "sqlite_path": "data/ledger.sqlite"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
struct ConfigFile {
    /// Should always be "money-monitor"
    app_name: String,

    config_version: u8,

    /// Socket address of the HTTP API
    #[serde(default = "default_bind")]
    bind: SocketAddr,

    /// Path to the SQLite database, relative to the home or absolute. Defaults to
    /// `$MONEY_MONITOR_HOME/money-monitor.sqlite`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sqlite_path: Option<PathBuf>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            bind: default_bind(),
            sqlite_path: None,
        }
    }
}

impl ConfigFile {
    async fn load(path: &Path) -> Res<Self> {
        let config: ConfigFile = utils::deserialize(path).await?;
        anyhow::ensure!(
            config.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            config.app_name
        );
        anyhow::ensure!(
            config.config_version == CONFIG_VERSION,
            "Unsupported config_version {} in config file, expected {}",
            config.config_version,
            CONFIG_VERSION
        );
        Ok(config)
    }

    async fn save(&self, path: &Path) -> Res<()> {
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(path, data)
            .await
            .context("Unable to write config file")
    }

    fn sqlite_path(&self, root: &Path) -> PathBuf {
        match &self.sqlite_path {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => root.join(p),
            None => root.join(MONEY_MONITOR_SQLITE),
        }
    }
}
