//! Order fulfilment API server entry point.

use std::sync::Arc;

use api::routes::orders::AppState;
use api::{Config, create_app};
use engine::{LogNotificationSink, Pricing, ReconciliationEngine};
use gateway::{AirtelGateway, Gateways, MpesaGateway};
use metrics_exporter_prometheus::PrometheusBuilder;
use sqlx::postgres::PgPoolOptions;
use store::PostgresStore;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api=info,engine=info,store=info,gateway=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    let store = PostgresStore::new(pool);
    store
        .run_migrations()
        .await
        .expect("failed to run migrations");

    let mpesa = MpesaGateway::new(config.mpesa()).expect("failed to build M-Pesa adapter");
    let airtel = AirtelGateway::new(config.airtel()).expect("failed to build Airtel adapter");
    let gateways = Gateways::new(Arc::new(mpesa), Arc::new(airtel));

    let pricing: Pricing = config.pricing();
    let engine = ReconciliationEngine::new(store, gateways, Arc::new(LogNotificationSink), pricing);

    let state = Arc::new(AppState { engine });
    let app = create_app(state, metrics_handle);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind listener");
    tracing::info!(%addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
