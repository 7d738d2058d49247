use mastogate::upstream::MastodonHttpClient;
use mastogate::Gateway;
use miette::{IntoDiagnostic, Result};
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;

mod store;

use store::SqliteStore;

async fn init_db(db_url: &str) -> Result<SqlitePool> {
    let pool = SqlitePool::connect(db_url).await.into_diagnostic()?;

    let migration_sql = include_str!("../migrations/001_initial_schema.sql");
    sqlx::raw_sql(migration_sql)
        .execute(&pool)
        .await
        .into_diagnostic()?;

    Ok(pool)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let db_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:mastogate.db".to_string());
    let pool = init_db(&db_url).await?;

    let store = Arc::new(SqliteStore::new(pool));
    let upstream = Arc::new(MastodonHttpClient::new());
    let gateway = Gateway::new(store, upstream);

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .into_diagnostic()?;
    tracing::info!(addr = %bind_addr, "mastogate listening");

    axum::serve(listener, gateway.router())
        .await
        .into_diagnostic()?;
    Ok(())
}
