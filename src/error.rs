use thiserror::Error;

/// Error kinds surfaced across the core. Per-request failures (a malformed
/// request line, a closed socket) stay return-code based and never reach
/// this type; it exists for the handful of places that must cross a `?`
/// boundary: config loading, socket setup, and DB acquisition.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid listen address: {0}")]
    AddrParse(#[from] std::net::AddrParseError),

    #[error("database error: {0}")]
    Db(#[from] mysql::Error),

    #[error("database connection pool exhausted (timed out after {0} ms)")]
    PoolTimeout(u64),
}

pub type Result<T> = std::result::Result<T, ServerError>;
