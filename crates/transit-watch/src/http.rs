use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use transit_proto::protocol::ErrorBody;
use transit_proto::{FeedKey, Route, Station};
use transit_sync::{
    HttpBackend, MutationOutcome, Snapshot, StaticSession, SyncContext, SyncError,
};

pub type Context = SyncContext<HttpBackend, StaticSession>;

#[derive(Clone)]
struct HttpState {
    ctx: Arc<Context>,
}

#[derive(Serialize)]
struct MutationReply {
    station_id: String,
    outcome: MutationOutcome,
}

#[derive(Deserialize)]
struct DirectoryQuery {
    route: Option<String>,
}

pub fn start_server(
    bind_address: String,
    port: u16,
    ctx: Arc<Context>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("[http] failed to bind {}: {}", addr, e);
                return;
            }
        };

        info!("[http] control API listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, router(ctx)).await {
            error!("[http] server error: {}", e);
        }
    })
}

pub fn router(ctx: Arc<Context>) -> Router {
    Router::new()
        .route("/api/snapshot", get(get_snapshot))
        .route("/api/feed/:key", post(set_feed))
        .route(
            "/api/favorites/:id",
            post(add_favorite).delete(delete_favorite),
        )
        .route("/api/focus/:id", post(focus_stop))
        .route("/api/focus", delete(clear_focus))
        .route("/api/directory", get(get_directory))
        .route("/api/outages/reload", post(reload_outages))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(HttpState { ctx })
}

fn reject(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            message: Some(message.into()),
            error: None,
        }),
    )
        .into_response()
}

fn sync_error(e: SyncError) -> Response {
    let status = match &e {
        SyncError::Unauthenticated | SyncError::Auth(_) => StatusCode::UNAUTHORIZED,
        SyncError::UnknownStation(_) => StatusCode::NOT_FOUND,
        SyncError::Api(_) => StatusCode::BAD_GATEWAY,
    };
    reject(status, e.to_string())
}

async fn get_snapshot(State(state): State<HttpState>) -> Json<Snapshot> {
    Json(state.ctx.snapshot())
}

async fn set_feed(State(state): State<HttpState>, Path(key): Path<String>) -> Response {
    match key.parse::<FeedKey>() {
        Ok(feed) => {
            info!("[http] set feed {}", feed);
            state.ctx.set_feed_key(feed);
            StatusCode::OK.into_response()
        }
        Err(e) => {
            warn!("[http] {}", e);
            reject(StatusCode::BAD_REQUEST, e.to_string())
        }
    }
}

async fn add_favorite(State(state): State<HttpState>, Path(id): Path<String>) -> Response {
    info!("[http] add favorite {}", id);
    match state.ctx.add_favorite(&id).await {
        Ok(outcome) => Json(MutationReply {
            station_id: id,
            outcome,
        })
        .into_response(),
        Err(e) => sync_error(e),
    }
}

async fn delete_favorite(State(state): State<HttpState>, Path(id): Path<String>) -> Response {
    info!("[http] delete favorite {}", id);
    match state.ctx.delete_favorite(&id).await {
        Ok(outcome) => Json(MutationReply {
            station_id: id,
            outcome,
        })
        .into_response(),
        Err(e) => sync_error(e),
    }
}

async fn focus_stop(State(state): State<HttpState>, Path(id): Path<String>) -> Response {
    info!("[http] focus {}", id);
    match state.ctx.focus_stop(&id) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => sync_error(e),
    }
}

async fn clear_focus(State(state): State<HttpState>) -> StatusCode {
    info!("[http] clear focus");
    state.ctx.clear_focus();
    StatusCode::OK
}

async fn get_directory(
    State(state): State<HttpState>,
    Query(query): Query<DirectoryQuery>,
) -> Response {
    let route = match query.route.as_deref().map(str::parse::<Route>).transpose() {
        Ok(route) => route,
        Err(e) => {
            warn!("[http] {}", e);
            return reject(StatusCode::BAD_REQUEST, e.to_string());
        }
    };
    let snap = state.ctx.snapshot();
    let page: Vec<Station> = snap.directory_page(route).into_iter().cloned().collect();
    Json(page).into_response()
}

async fn reload_outages(State(state): State<HttpState>) -> Response {
    info!("[http] reload outages");
    match state.ctx.reload_outages().await {
        Ok(()) => Json(state.ctx.snapshot().outages).into_response(),
        Err(e) => sync_error(e),
    }
}
