use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::PendingReservationSweeper;
use booking_queue_cell::QueueWatchService;
use payment_cell::GatewayRegistry;
use shared_config::AppConfig;
use shared_database::Stores;

const SWEEP_EVERY: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Amae booking API server");

    let config = Arc::new(AppConfig::from_env());
    if !config.is_configured() {
        warn!("Supabase is not configured, bookings are kept in memory");
    }

    let stores = Stores::from_config(&config);
    let gateways = GatewayRegistry::from_config(&config);

    if config.sweeper_enabled() {
        let sweeper = Arc::new(PendingReservationSweeper::new(
            &stores,
            config.pending_reservation_ttl_minutes,
        ));
        tokio::spawn(sweeper.run(SWEEP_EVERY));
    }

    let watcher = QueueWatchService::new(&stores, Duration::from_millis(config.queue_debounce_ms));
    tokio::spawn(watcher.clone().run(stores.changes.subscribe()));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router::create_router(config.clone(), &stores, gateways, watcher)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
