pub mod ecbe;
pub mod handlers;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;

/// Path prefix of the ECBE-facing REST interface.
pub const API_PREFIX: &str = "/api/ecbe/v1";

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/message", post(handlers::handle_create_message))
        .route("/message/{message_id}", delete(handlers::handle_delete_message))
        .route("/messages/cbs", get(handlers::handle_list_cbs))
        .route("/messages/etws", get(handlers::handle_list_etws))
        .route("/peers", get(handlers::handle_peers).post(handlers::handle_peer_add))
        .route("/peers/{name}", delete(handlers::handle_peer_remove))
        .route("/status", get(handlers::handle_status))
        .route("/config", get(handlers::handle_running_config))
        .route("/config/write", post(handlers::handle_config_write))
        .route("/config/unknown-peers", put(handlers::handle_unknown_peers))
        .with_state(state);

    Router::new().nest(API_PREFIX, api_routes).layer(cors)
}

/// Serve on an already bound listener. Tests bind port 0 and pass it here.
pub async fn serve_listener(state: ApiState, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub async fn serve(state: ApiState, bind_addr: &str, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind((bind_addr, port)).await?;
    tracing::info!(%bind_addr, port, "ECBE API listening");
    serve_listener(state, listener).await
}
