use backend::axum_http::http_serve;
use backend::config::config_loader;
use crates::infra::db::postgres::postgres_connection;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    if let Err(error) = crates::observability::init_observability("backend") {
        eprintln!("Failed to initialize observability: {error}");
        std::process::exit(1);
    }

    let dotenvy_env = match config_loader::load() {
        Ok(config) => config,
        Err(error) => {
            error!("Invalid configuration: {}", error);
            std::process::exit(1);
        }
    };
    info!("ENV has been loaded");

    let postgres_pool = match postgres_connection::establish_connection(&dotenvy_env.database.url) {
        Ok(pool) => pool,
        Err(error) => {
            error!("Postgres is unreachable: {}", error);
            std::process::exit(2);
        }
    };
    info!("Postgres connection has been established");

    if let Err(error) = http_serve::start(Arc::new(dotenvy_env), Arc::new(postgres_pool)).await {
        error!("Backend exited with error: {}", error);
        std::process::exit(1);
    }
}
