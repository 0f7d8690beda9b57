use crate::config::DatabaseConfig;
use sqlx::{migrate::Migrator, postgres::PgPoolOptions, PgPool};
use thiserror::Error;
use tracing::{debug, warn};

/// Schema for leagues, members, bets, wagers and the activity log
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Errors that can occur when working with the database
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to create database pool: {0}")]
    PoolCreation(sqlx::Error),

    #[error("Database query error: {0}")]
    QueryError(sqlx::Error),

    #[error("Database connection timeout")]
    ConnectionTimeout,

    #[error("Database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => DatabaseError::ConnectionTimeout,
            other => DatabaseError::QueryError(other),
        }
    }
}

/// Create the PostgreSQL pool backing `PgStore` and check it answers
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout())
        .idle_timeout(config.idle_timeout())
        .max_lifetime(config.max_lifetime())
        .test_before_acquire(config.test_before_acquire)
        .connect(&config.url)
        .await
        .map_err(|e| match e {
            sqlx::Error::PoolTimedOut => DatabaseError::ConnectionTimeout,
            other => DatabaseError::PoolCreation(other),
        })?;

    sqlx::query("SELECT 1").execute(&pool).await?;
    debug!("Database answered on {} connections max", config.max_connections);

    Ok(pool)
}

/// Apply pending migrations.
///
/// `None` runs the migrations compiled into the binary; a path loads them
/// from disk instead.
pub async fn run_migrations(pool: &PgPool, migrations_path: Option<&str>) -> Result<(), DatabaseError> {
    match migrations_path {
        Some(path) => {
            warn!("Loading migrations from {} instead of the embedded set", path);
            let migrator = Migrator::new(std::path::Path::new(path)).await?;
            migrator.run(pool).await?;
        }
        None => MIGRATOR.run(pool).await?,
    }
    Ok(())
}
