//! bq-gateway: HTTP adapter for the session bridge
//!
//! Exposes join/command/state/leave as JSON endpoints so stateless
//! clients (CLIs, automation agents) can drive live world connections.
//!
//! Configuration via environment:
//! - `BQ_GATEWAY_BIND` listen address, default 0.0.0.0:4000
//! - `BQ_WORLD_ADDR`   world server address, default 127.0.0.1:8000

use anyhow::Result;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bq_bot::BotConfig;
use bq_bridge::SessionRegistry;
use bq_core::{BridgeError, ErrorCategory};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Deserialize)]
struct JoinBody {
    name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommandBody {
    player_id: String,
    token: String,
    command: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionQuery {
    player_id: String,
    token: String,
}

fn error_response(err: &BridgeError) -> Response {
    let status = match err.category() {
        ErrorCategory::Auth => StatusCode::UNAUTHORIZED,
        ErrorCategory::Command => StatusCode::BAD_REQUEST,
        ErrorCategory::Connectivity | ErrorCategory::Protocol => StatusCode::BAD_GATEWAY,
    };
    let body = json!({
        "error": err.to_string(),
        "category": err.category().as_str(),
    });
    (status, Json(body)).into_response()
}

async fn join(
    State(registry): State<Arc<SessionRegistry>>,
    Json(body): Json<JoinBody>,
) -> Response {
    let name = body.name.unwrap_or_else(|| "wanderer".to_string());
    match registry.join(&name).await {
        Ok(receipt) => Json(receipt).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn command(
    State(registry): State<Arc<SessionRegistry>>,
    Json(body): Json<CommandBody>,
) -> Response {
    match registry
        .command(&body.player_id, &body.token, &body.command)
        .await
    {
        Ok(outcome) => Json(json!({
            "ok": true,
            "output": outcome.output,
            "state": outcome.state,
        }))
        .into_response(),
        Err(e) => error_response(&e),
    }
}

async fn get_state(
    State(registry): State<Arc<SessionRegistry>>,
    Query(query): Query<SessionQuery>,
) -> Response {
    match registry.snapshot(&query.player_id, &query.token).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn leave(
    State(registry): State<Arc<SessionRegistry>>,
    Json(body): Json<SessionQuery>,
) -> Response {
    match registry.leave(&body.player_id, &body.token).await {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let bind = env_or("BQ_GATEWAY_BIND", "0.0.0.0:4000");
    let world_addr = env_or("BQ_WORLD_ADDR", "127.0.0.1:8000");

    let registry = Arc::new(SessionRegistry::new(BotConfig {
        server_addr: world_addr.clone(),
        ..BotConfig::default()
    }));

    let app = Router::new()
        .route("/join", post(join))
        .route("/command", post(command))
        .route("/state", get(get_state))
        .route("/leave", post(leave))
        .route("/health", get(health))
        .with_state(registry);

    info!("gateway listening on {}, targeting world server at {}", bind, world_addr);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
