use std::net::SocketAddr;

use axum::body::Body;
use axum::http::{header, Method, Response};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use sqlx::postgres::{PgConnectOptions, PgPool};
use time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use shared::constants::{DEFAULT_HISTORY_LIMIT, SPIN_COOLDOWN_HOURS};
use shared::shared_roulette_game::{PrizeTable, DEFAULT_PRIZE_TABLE};

use crate::services::roulette_service::RouletteService;
use crate::store::{MemoryStore, PostgresStore, RouletteStore};

mod error;
mod games;
mod logging;
mod models;
mod services;
mod store;

#[derive(Clone)]
pub struct AppState {
    service: RouletteService,
}

pub async fn health_check() -> impl IntoResponse {
    Response::builder().status(200).body(Body::from("OK")).unwrap()
}

/// A replacement table must be wholly valid before it is served; an
/// unreadable or invalid file aborts startup rather than falling back.
fn load_prize_table() -> Result<PrizeTable, Box<dyn std::error::Error>> {
    match std::env::var("ROULETTE_PRIZE_TABLE") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path)?;
            let table: PrizeTable = serde_json::from_str(&raw)?;
            info!("Loaded prize table {} from {}", table.version, path);
            Ok(table)
        }
        Err(_) => Ok(DEFAULT_PRIZE_TABLE.clone()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::setup();
    dotenvy::from_path(".env").ok();

    let cooldown = Duration::hours(SPIN_COOLDOWN_HOURS);
    let history_limit = std::env::var("ROULETTE_HISTORY_LIMIT")
        .ok()
        .and_then(|raw| raw.parse::<usize>().ok())
        .unwrap_or(DEFAULT_HISTORY_LIMIT);

    let store = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let pool = PgPool::connect_with(url.parse::<PgConnectOptions>()?).await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            info!("Connected to Postgres, history limit {}", history_limit);
            RouletteStore::Postgres(PostgresStore::new(pool, cooldown, history_limit))
        }
        Err(_) => {
            warn!("DATABASE_URL not set, state will not survive a restart");
            RouletteStore::Memory(MemoryStore::new(cooldown, history_limit))
        }
    };

    let service = RouletteService::new(store, load_prize_table()?, cooldown)?;
    let state = AppState { service };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(vec![header::CONTENT_TYPE]);

    let app = Router::new()
        .route("/api/health_check", get(health_check))
        .nest("/api", games::backend_roulette_game::create_router())
        .layer(cors)
        .with_state(state);

    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
        .parse()?;
    info!("listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
