use std::{env, net::SocketAddr, sync::Arc};

use common_notify::{LogSink, Notifier};
use common_observability::LoanMetrics;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tracing::info;

use loan_service::{build_router, AppState, MIGRATOR, SERVICE_NAME};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env::var("RUST_LOG").unwrap_or_else(|_| "info".into()))
        .init();

    let database_url = env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let db_pool = PgPool::connect(&database_url).await?;
    MIGRATOR.run(&db_pool).await?;

    let notifier = Notifier::new(Arc::new(LogSink), SERVICE_NAME);
    let metrics = Arc::new(LoanMetrics::new());
    let state = AppState { db: db_pool, notifier, metrics };

    let app = build_router(state);

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8090);
    let ip: std::net::IpAddr = host.parse()?;
    let addr = SocketAddr::from((ip, port));
    info!(%addr, "starting loan-service");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
