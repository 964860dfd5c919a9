use crate::config::DatabaseConfig;
use sqlx::postgres::PgPoolOptions;

pub use sqlx::PgPool;

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
}

/// Apply the embedded migrations under `ragdesk-core/migrations`.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Connect and migrate in one step.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, crate::RagdeskError> {
    let pool = create_pool(config).await?;
    run_migrations(&pool).await?;
    tracing::info!(max_connections = config.max_connections, "Database ready");
    Ok(pool)
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}
