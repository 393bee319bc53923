use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use learning_orchestrator::{
    config::Config,
    db::{self, PgStore},
    gateway::Collaborators,
    memory::MemoryStore,
    store::Store,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "learning_orchestrator=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Config::from_env()?;

    let store: Arc<dyn Store> = match &cfg.database_url {
        Some(url) => {
            let pg = PgStore::new(db::connect(url, cfg.db_max_connections).await?);
            pg.migrate().await?;
            Arc::new(pg)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, state is kept in memory and lost on exit");
            Arc::new(MemoryStore::new())
        }
    };
    let remote = Collaborators::http(&cfg)?;
    tracing::info!(
        catalog = %cfg.catalog_url,
        students = %cfg.student_url,
        timeout_ms = cfg.remote_timeout.as_millis() as u64,
        "collaborators configured"
    );

    let app = learning_orchestrator::app(AppState::new(store, remote, &cfg));

    let addr = format!("0.0.0.0:{}", cfg.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}
