//! PostgreSQL persistence for the synchronization engine.

use sqlx::postgres::PgPoolOptions;

pub mod models;
pub mod repositories;

pub type DbPool = sqlx::PgPool;

/// SQLSTATE for unique constraint violations.
const UNIQUE_VIOLATION: &str = "23505";

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Verify the database answers a trivial query.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply all pending migrations from `db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../db/migrations").run(pool).await
}

/// Whether `err` is a PostgreSQL unique constraint violation.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some(UNIQUE_VIOLATION),
        _ => false,
    }
}

/// Name of the violated constraint, if the database reported one.
pub fn violated_constraint(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint(),
        _ => None,
    }
}

/// Whether `err` reflects the database itself being unreachable or broken,
/// as opposed to a problem with one statement's data.
pub fn is_infrastructure_error(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Configuration(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_errors_are_infrastructure() {
        assert!(is_infrastructure_error(&sqlx::Error::PoolTimedOut));
        assert!(is_infrastructure_error(&sqlx::Error::PoolClosed));
    }

    #[test]
    fn row_not_found_is_not_infrastructure() {
        assert!(!is_infrastructure_error(&sqlx::Error::RowNotFound));
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
        assert!(violated_constraint(&sqlx::Error::RowNotFound).is_none());
    }
}
