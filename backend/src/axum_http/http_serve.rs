use crate::{
    axum_http::{default_routers, routers},
    config::config_model::DotEnvyConfig,
};
use anyhow::Result;
use axum::{Router, http::Method, routing::get};
use crates::domain::events;
use crates::infra::db::postgres::postgres_connection::PgPool;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{debug, info};

pub async fn start(config: Arc<DotEnvyConfig>, db_pool: Arc<PgPool>) -> Result<()> {
    let (seat_events, mut seat_events_rx) = events::seat_event_channel(256);

    // Best-effort subscriber; a realtime seat-map gateway would hang off the
    // same channel. Lagging only drops events, never requests.
    tokio::spawn(async move {
        loop {
            match seat_events_rx.recv().await {
                Ok(event) => debug!(showtime_id = %event.showtime_id, "seat state changed"),
                Err(RecvError::Lagged(missed)) => {
                    debug!(missed, "seat event subscriber lagged")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let app = Router::new()
        .fallback(default_routers::not_found)
        .route("/api/v1/health-check", get(default_routers::health_check))
        .nest(
            "/showtimes",
            routers::showtimes::routes(
                Arc::clone(&config),
                Arc::clone(&db_pool),
                seat_events.clone(),
            ),
        )
        .nest(
            "/bookings",
            routers::bookings::routes(
                Arc::clone(&config),
                Arc::clone(&db_pool),
                seat_events.clone(),
            ),
        )
        .nest(
            "/payments",
            routers::payments::routes(Arc::clone(&config), Arc::clone(&db_pool), seat_events),
        )
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.timeout,
        )))
        .layer(RequestBodyLimitLayer::new(
            (config.server.body_limit * 1024 * 1024).try_into()?,
        ))
        .layer(
            CorsLayer::new()
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PATCH,
                    Method::PUT,
                    Method::DELETE,
                ])
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = TcpListener::bind(addr).await?;

    info!("Server is running on port {}", config.server.port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
    };

    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}
