//! Administrative HTTP API
//!
//! Registration and decommissioning of storage nodes. The wire protocol has
//! no administrative surface, so operators use this instead of editing the
//! database by hand.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{delete, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::store::{DirectoryStore, ServerRecord};

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterServerRequest {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterServerResponse {
    /// Id of the new row; `None` when registration was refused.
    pub id: Option<i64>,
}

pub fn admin_router(store: Arc<DirectoryStore>) -> Router {
    Router::new()
        .route(
            "/servers",
            post(handle_register_server).get(handle_list_servers),
        )
        .route("/servers/:id", delete(handle_remove_server))
        .layer(Extension(store))
}

async fn handle_register_server(
    Extension(store): Extension<Arc<DirectoryStore>>,
    Json(req): Json<RegisterServerRequest>,
) -> (StatusCode, Json<RegisterServerResponse>) {
    match store.add_server(&req.host, req.port) {
        Ok(id) => {
            tracing::info!("Registered server {}:{} as id {}", req.host, req.port, id);
            (StatusCode::OK, Json(RegisterServerResponse { id: Some(id) }))
        }
        Err(e) => {
            // The unique index makes re-registration a conflict, not a crash.
            tracing::error!("Failed to register {}:{}: {}", req.host, req.port, e);
            (
                StatusCode::CONFLICT,
                Json(RegisterServerResponse { id: None }),
            )
        }
    }
}

async fn handle_list_servers(
    Extension(store): Extension<Arc<DirectoryStore>>,
) -> (StatusCode, Json<Vec<ServerRecord>>) {
    match store.list_servers() {
        Ok(servers) => (StatusCode::OK, Json(servers)),
        Err(e) => {
            tracing::error!("Failed to list servers: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(Vec::new()))
        }
    }
}

async fn handle_remove_server(
    Extension(store): Extension<Arc<DirectoryStore>>,
    Path(id): Path<i64>,
) -> StatusCode {
    match store.remove_server(id) {
        Ok(true) => {
            tracing::info!("Decommissioned server {}", id);
            StatusCode::OK
        }
        Ok(false) => StatusCode::NOT_FOUND,
        Err(e) => {
            tracing::error!("Failed to remove server {}: {}", id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
