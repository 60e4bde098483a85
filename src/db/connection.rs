//! Database connection management using sqlx

use crate::config::DbConfig;
use crate::error::{AiqlError, Result};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::Connection;
use tracing::debug;

/// Build connect options from configuration
pub fn connect_options(config: &DbConfig) -> MySqlConnectOptions {
    MySqlConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(&config.database)
}

/// Open a single connection; the caller owns it and must close it
pub async fn connect(options: &MySqlConnectOptions) -> Result<MySqlConnection> {
    let conn = MySqlConnection::connect_with(options)
        .await
        .map_err(classify_error)?;
    debug!("database connection opened");
    Ok(conn)
}

/// Map sqlx failures onto the crate taxonomy: unreachable servers are
/// `BackendUnavailable`, everything the server itself rejected is `Execution`.
pub fn classify_error(err: sqlx::Error) -> AiqlError {
    match err {
        sqlx::Error::Database(db_err) => AiqlError::Execution(db_err.to_string()),
        sqlx::Error::Io(e) => AiqlError::BackendUnavailable(format!("Database unreachable: {}", e)),
        sqlx::Error::Tls(e) => AiqlError::BackendUnavailable(format!("Database TLS failure: {}", e)),
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            AiqlError::BackendUnavailable("Database connection pool unavailable".to_string())
        }
        sqlx::Error::Configuration(e) => AiqlError::Config(format!("Database configuration: {}", e)),
        other => AiqlError::Execution(other.to_string()),
    }
}
