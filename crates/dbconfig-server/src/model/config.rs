//! Configuration management for the dbconfig server
//!
//! Sources are layered lowest to highest: `conf/application.yml`, then
//! `DBCONFIG__*` environment variables, then command line overrides.

use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use config::{Config, Environment};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tracing::log::LevelFilter;

use dbconfig_common::ValueCodec;
use dbconfig_engine::VersionPolicy;
use dbconfig_engine::service::DEFAULT_KEY_PREFIX;
use dbconfig_persistence::StorageMode;

use super::constants::{
    DB_CONNECT_TIMEOUT_SECS, DB_MAX_CONNECTIONS, DB_SQLX_LOGGING, DB_URL, DEFAULT_CONFIG_FILE, DEFAULT_CONTEXT_PATH,
    DEFAULT_SERVER_PORT, ENCRYPT_GZIP, ENCRYPT_KEY_PREFIX, ENV_PREFIX, SERVER_ADDRESS,
    SERVER_CONTEXT_PATH, SERVER_PORT, STORAGE_MODE, VERSION_FRESH_WINDOW_SECS,
    VERSION_GENERATE_JITTER_MS,
};

/// Command line arguments for the server
#[derive(Debug, Parser)]
#[command(name = "dbconfig-server", version, about = "Hierarchical DB cluster configuration server")]
pub struct Cli {
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: String,
    #[arg(long = "db-url", env = "DATABASE_URL")]
    pub database_url: Option<String>,
    /// external_db or memory
    #[arg(long = "storage")]
    pub storage: Option<String>,
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Print a conf file with its node items and revisions as JSON
    Dump(DumpArgs),
    /// Re-encrypt stored values from one key prefix to another
    Rekey(RekeyArgs),
}

#[derive(Debug, Clone, Args)]
pub struct DumpArgs {
    #[arg(long)]
    pub namespace: String,
    #[arg(long = "conf-type")]
    pub conf_type: String,
    #[arg(long = "conf-file")]
    pub conf_file: String,
    /// Only nodes of this business
    #[arg(long = "bk-biz-id")]
    pub bk_biz_id: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct RekeyArgs {
    #[arg(long = "old-prefix")]
    pub old_prefix: String,
    #[arg(long = "new-prefix")]
    pub new_prefix: String,
    /// Every namespace when omitted
    #[arg(long, default_value = "")]
    pub namespace: String,
    #[arg(long = "conf-type")]
    pub conf_type: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigurationError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("{0}")]
    StorageMode(String),

    #[error("db.url is required for storage mode external_db")]
    MissingDatabaseUrl,
}

/// Application configuration loaded from config files and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    pub fn new(cli: &Cli) -> Result<Self, ConfigurationError> {
        let mut config_builder = Config::builder()
            .add_source(config::File::with_name(&cli.config_file).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Some(v) = &cli.database_url {
            config_builder = config_builder.set_override(DB_URL, v.as_str())?;
        }
        if let Some(v) = &cli.storage {
            config_builder = config_builder.set_override(STORAGE_MODE, v.as_str())?;
        }
        if let Some(v) = cli.port {
            config_builder = config_builder.set_override(SERVER_PORT, i64::from(v))?;
        }

        Ok(Configuration {
            config: config_builder.build()?,
        })
    }

    /// Wrap an already built [`Config`]
    pub fn from_config(config: Config) -> Self {
        Configuration { config }
    }

    // ========================================================================
    // Server Configuration
    // ========================================================================

    pub fn server_address(&self) -> String {
        self.config
            .get_string(SERVER_ADDRESS)
            .unwrap_or("0.0.0.0".to_string())
    }

    pub fn server_port(&self) -> u16 {
        self.config
            .get_int(SERVER_PORT)
            .unwrap_or(DEFAULT_SERVER_PORT.into()) as u16
    }

    pub fn server_context_path(&self) -> String {
        self.config
            .get_string(SERVER_CONTEXT_PATH)
            .unwrap_or(DEFAULT_CONTEXT_PATH.to_string())
    }

    // ========================================================================
    // Storage Configuration
    // ========================================================================

    pub fn storage_mode(&self) -> Result<StorageMode, ConfigurationError> {
        match self.config.get_string(STORAGE_MODE) {
            Ok(v) => v.parse().map_err(ConfigurationError::StorageMode),
            Err(_) => Ok(StorageMode::ExternalDb),
        }
    }

    pub fn database_url(&self) -> Option<String> {
        self.config
            .get_string(DB_URL)
            .ok()
            .filter(|v| !v.is_empty())
    }

    pub async fn database_connection(&self) -> anyhow::Result<DatabaseConnection> {
        let url = self
            .database_url()
            .ok_or(ConfigurationError::MissingDatabaseUrl)?;
        let max_connections = self.config.get_int(DB_MAX_CONNECTIONS).unwrap_or(100) as u32;
        let connect_timeout = self.config.get_int(DB_CONNECT_TIMEOUT_SECS).unwrap_or(30) as u64;
        let sqlx_logging = self.config.get_bool(DB_SQLX_LOGGING).unwrap_or(false);

        let mut opt = ConnectOptions::new(url);
        opt.max_connections(max_connections)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(connect_timeout))
            .sqlx_logging(sqlx_logging)
            .sqlx_logging_level(LevelFilter::Debug);

        tracing::info!(
            max_connections = max_connections,
            connect_timeout = connect_timeout,
            sqlx_logging = sqlx_logging,
            "Database connection pool configured"
        );

        Ok(Database::connect(opt).await?)
    }

    // ========================================================================
    // Engine Configuration
    // ========================================================================

    pub fn key_prefix(&self) -> String {
        self.config
            .get_string(ENCRYPT_KEY_PREFIX)
            .unwrap_or(DEFAULT_KEY_PREFIX.to_string())
    }

    pub fn encrypt_gzip(&self) -> bool {
        self.config.get_bool(ENCRYPT_GZIP).unwrap_or(false)
    }

    /// Codec for the configured key prefix
    pub fn value_codec(&self) -> ValueCodec {
        ValueCodec::new(self.key_prefix(), self.encrypt_gzip())
    }

    pub fn version_policy(&self) -> VersionPolicy {
        let defaults = VersionPolicy::default();
        let jitter = self
            .config
            .get_int(VERSION_GENERATE_JITTER_MS)
            .map(|v| Duration::from_millis(v.max(0) as u64))
            .unwrap_or(defaults.generate_jitter);
        let fresh_window = self
            .config
            .get_int(VERSION_FRESH_WINDOW_SECS)
            .map(|v| Duration::from_secs(v.max(0) as u64))
            .unwrap_or(defaults.fresh_window);
        VersionPolicy::new(jitter, fresh_window)
    }
}
