use std::{error::Error, sync::Arc};

use axum::http::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use tokio::{fs, net, task};
use tower_http::cors::CorsLayer;
use tracing_subscriber::{
    layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter,
};

use it_ticketing::{
    config,
    db::{self, Store},
    server::{self, AppState},
    Config,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = fs::read_to_string("config.toml").await?;
    let config = toml::from_str::<Config>(&config)?;

    let db = open_store(&config.db).await;

    let mut cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);
    for origin in &config.http.cors.allowed_origins {
        cors = cors.allow_origin(origin.parse::<HeaderValue>()?);
    }

    let state =
        AppState::new(db, &config.jwt, config.password, config.tickets)?;
    let app = server::router(state).layer(cors);

    let listener = net::TcpListener::bind(config.http.server.addr).await?;
    tracing::info!(addr = %config.http.server.addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Opens the configured store. An unreachable database is logged and leaves
/// the service running without storage.
async fn open_store(config: &config::Db) -> Option<Arc<dyn Store>> {
    let url = match config {
        config::Db::Memory => {
            tracing::info!("using in-memory storage");
            return Some(Arc::new(db::Memory::default()));
        }
        config::Db::Postgres { url } => url,
    };

    let (client, connection) = match db::connect(url).await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!(error = %e, "database connection failed");
            return None;
        }
    };
    task::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(error = %e, "database connection lost");
        }
    });

    if let Err(e) = client.migrate().await {
        tracing::error!(error = %e, "database migration failed");
        return None;
    }
    tracing::info!("connected to database");

    Some(Arc::new(client))
}
