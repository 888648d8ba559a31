use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgPool};
use std::str::FromStr;
use std::time::Duration;

/// `log_statements` mirrors `APP_DEBUG`: when off, sqlx stays silent about
/// individual queries.
pub async fn create_pool(database_url: &str, log_statements: bool) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(connect_options(database_url, log_statements)?)
        .await
}

fn connect_options(database_url: &str, log_statements: bool) -> Result<PgConnectOptions, sqlx::Error> {
    let options = PgConnectOptions::from_str(database_url)?;
    Ok(if log_statements {
        options
    } else {
        options.disable_statement_logging()
    })
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
