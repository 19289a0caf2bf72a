use std::time::Duration;

use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    Error as SqlxError,
};

/// Session timeouts for the order/shop store. Admission transactions hold a row lock on the
/// voucher while they run, so lock waits are kept short and leaked transactions are killed.
pub const DEFAULT_TIMEOUTS: DatabaseTimeouts = DatabaseTimeouts {
    statement_timeout: Duration::from_secs(2),
    lock_timeout: Duration::from_millis(500),
    acquire_timeout: Duration::from_secs(1),
    idle_timeout: Duration::from_secs(300),
    max_lifetime: Duration::from_secs(1800),
    idle_in_transaction_session_timeout: Duration::from_secs(15),
};

#[derive(Debug, Clone, Copy)]
pub struct DatabaseTimeouts {
    pub statement_timeout: Duration,
    pub lock_timeout: Duration,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    pub idle_in_transaction_session_timeout: Duration,
}

pub async fn get_pool(url: &str, max_connections: u32) -> Result<PgPool, SqlxError> {
    get_pool_with_timeouts(url, max_connections, DEFAULT_TIMEOUTS).await
}

pub async fn get_pool_with_timeouts(
    url: &str,
    max_connections: u32,
    timeouts: DatabaseTimeouts,
) -> Result<PgPool, SqlxError> {
    let session_settings = session_settings(&timeouts);

    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(timeouts.acquire_timeout)
        .test_before_acquire(true)
        .idle_timeout(timeouts.idle_timeout)
        .max_lifetime(timeouts.max_lifetime)
        .after_connect(move |conn, _meta| {
            let session_settings = session_settings.clone();
            Box::pin(async move {
                // SET does not accept bind parameters
                for statement in &session_settings {
                    sqlx::query(statement).execute(&mut *conn).await?;
                }
                Ok(())
            })
        })
        .connect(url)
        .await
}

fn session_settings(timeouts: &DatabaseTimeouts) -> Vec<String> {
    vec![
        format!(
            "SET statement_timeout = '{}ms'",
            timeouts.statement_timeout.as_millis()
        ),
        format!("SET lock_timeout = '{}ms'", timeouts.lock_timeout.as_millis()),
        format!(
            "SET idle_in_transaction_session_timeout = '{}s'",
            timeouts.idle_in_transaction_session_timeout.as_secs()
        ),
    ]
}

fn sqlstate(error: &SqlxError) -> Option<String> {
    match error {
        SqlxError::Database(db_error) => db_error.code().map(|c| c.into_owned()),
        _ => None,
    }
}

/// Determines if a sqlx::Error is a unique-constraint violation (SQLSTATE 23505)
pub fn is_unique_violation(error: &SqlxError) -> bool {
    match error {
        SqlxError::Database(db_error) => match db_error.code() {
            Some(code) => code.as_ref() == "23505",
            None => db_error.is_unique_violation(),
        },
        _ => false,
    }
}

/// Determines if a sqlx::Error represents a transient failure that may succeed on retry
pub fn is_transient_error(error: &SqlxError) -> bool {
    match error {
        SqlxError::Io(_) | SqlxError::PoolTimedOut | SqlxError::PoolClosed | SqlxError::Tls(_) => {
            true
        }

        SqlxError::Database(db_error) => match sqlstate(error) {
            // 08 connection, 53 resources, 57 operator intervention, 58 system,
            // 40001 serialization failure, 40003 completion unknown, 40P01 deadlock
            Some(code) => {
                code.starts_with("08")
                    || code.starts_with("53")
                    || code.starts_with("57")
                    || code.starts_with("58")
                    || matches!(code.as_str(), "40001" | "40003" | "40P01")
            }
            None => {
                let msg = db_error.message().to_lowercase();
                [
                    "connection",
                    "timeout",
                    "timed out",
                    "deadlock",
                    "serialization",
                    "terminating connection due to",
                    "ssl",
                ]
                .iter()
                .any(|needle| msg.contains(needle))
            }
        },

        SqlxError::Protocol(msg) => {
            let m = msg.to_lowercase();
            m.contains("connection") || m.contains("timeout")
        }

        _ => false,
    }
}
