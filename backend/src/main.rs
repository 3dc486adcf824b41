//! Agri-Siddhi yield service - HTTP server

use std::{net::SocketAddr, time::Duration};

use agri_siddhi::{create_app, init_tracing, AppState, Config};
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    tracing::info!("Starting Agri-Siddhi Yield Server");
    tracing::info!("Environment: {}", config.environment);

    let db = match &config.database.url {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .min_connections(config.database.min_connections)
                .acquire_timeout(Duration::from_secs(30))
                .connect(url)
                .await?;
            tracing::info!("Database connection established");

            tracing::info!("Running database migrations...");
            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!("Migrations completed");
            Some(pool)
        }
        None => None,
    };

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    let state = AppState::build(config, db).await?;
    let app = create_app(state);

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
