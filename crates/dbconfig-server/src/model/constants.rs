//! Configuration keys and server defaults

/// Environment variable prefix; `DBCONFIG__SERVER__PORT` maps to `server.port`
pub const ENV_PREFIX: &str = "DBCONFIG";

pub const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_CONTEXT_PATH: &str = "/bkconfig/v1";

// Server
pub const SERVER_ADDRESS: &str = "server.address";
pub const SERVER_PORT: &str = "server.port";
pub const SERVER_CONTEXT_PATH: &str = "server.context_path";

// Storage
pub const STORAGE_MODE: &str = "storage.mode";
pub const DB_URL: &str = "db.url";
pub const DB_MAX_CONNECTIONS: &str = "db.pool.max_connections";
pub const DB_CONNECT_TIMEOUT_SECS: &str = "db.pool.connect_timeout_secs";
pub const DB_SQLX_LOGGING: &str = "db.pool.sqlx_logging";

// Engine
pub const ENCRYPT_KEY_PREFIX: &str = "encrypt.key_prefix";
pub const ENCRYPT_GZIP: &str = "encrypt.gzip";
pub const VERSION_GENERATE_JITTER_MS: &str = "version.generate_jitter_ms";
pub const VERSION_FRESH_WINDOW_SECS: &str = "version.fresh_window_secs";

/// Header carrying the gateway caller identity
pub const AUTHORIZATION_HEADER: &str = "X-Bkapi-Authorization";
