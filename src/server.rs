//! HTTP API — axum server for the export/query surface, recipient
//! management, the manual email trigger, and health.
//!
//! The export endpoints are strictly read-only over the snapshot store;
//! invalid parameters are rejected up front with a structured error body.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::db::store::Store;
use crate::export::csv::{play_by_play_csv, play_filename, team_rows_csv};
use crate::export::query::{validate_export_query, validate_game_id, ExportFormat};
use crate::game::models::GameSnapshot;
use crate::mailer::Mailer;
use crate::service::HealthState;
use crate::trigger::{self, ManualEmailError};

/// Shared state accessible by all route handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<Store>,
    pub mailer: Arc<dyn Mailer>,
    pub config: Arc<AppConfig>,
    pub health: HealthState,
}

/// Spawn the API server. Returns a handle that can be aborted.
pub fn spawn_server(state: ApiState, bind: &str, port: u16) -> JoinHandle<()> {
    let addr = format!("{bind}:{port}");

    tokio::spawn(async move {
        let app = router(state);

        let listener = match tokio::net::TcpListener::bind(&addr).await {
            Ok(l) => {
                info!(addr = %addr, "API server listening");
                l
            }
            Err(e) => {
                warn!(error = %e, addr = %addr, "Failed to bind API server");
                return;
            }
        };

        if let Err(e) = axum::serve(listener, app).await {
            warn!(error = %e, "API server error");
        }
    })
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/exports/games", get(export_games_handler))
        .route("/api/exports/plays", get(export_plays_handler))
        .route("/api/exports/halftime", get(export_history_handler))
        .route("/api/emails/manual", post(manual_email_handler))
        .route(
            "/api/recipients",
            get(list_recipients_handler).post(create_recipient_handler),
        )
        .route(
            "/api/recipients/{id}",
            axum::routing::patch(update_recipient_handler).delete(delete_recipient_handler),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn error_json(status: StatusCode, message: impl ToString) -> Response {
    (
        status,
        Json(json!({ "success": false, "error": message.to_string() })),
    )
        .into_response()
}

fn internal_error(e: impl std::fmt::Display) -> Response {
    warn!(error = %e, "Request failed");
    error_json(StatusCode::INTERNAL_SERVER_ERROR, e)
}

fn csv_response(filename: &str, body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response()
}

// -- Route handlers --

async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.health.to_json().await)
}

async fn export_games_handler(
    State(state): State<ApiState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let query = match validate_export_query(
        params.get("game_id").map(String::as_str),
        params.get("start_date").map(String::as_str),
        params.get("end_date").map(String::as_str),
        params.get("limit").map(String::as_str),
        params.get("format").map(String::as_str),
        &state.config.export,
    ) {
        Ok(q) => q,
        Err(e) => return error_json(StatusCode::BAD_REQUEST, e),
    };

    let filter = crate::db::store::SnapshotFilter {
        game_id: query.game_id.clone(),
        start_date: query.start_date,
        end_date: query.end_date,
        limit: query.limit,
    };

    let records = match state.store.query_snapshots(&filter).await {
        Ok(records) => records,
        Err(e) => return internal_error(e),
    };

    let snapshots: Vec<GameSnapshot> = records
        .iter()
        .filter_map(|record| match record.to_snapshot() {
            Ok(snap) => Some(snap),
            Err(e) => {
                warn!(error = %e, "Skipping undecodable snapshot row");
                None
            }
        })
        .collect();

    match query.format {
        ExportFormat::Json => Json(json!({
            "success": true,
            "count": snapshots.len(),
            "data": snapshots,
        }))
        .into_response(),
        ExportFormat::Csv => {
            let filename = format!(
                "nfl_data_{}.csv",
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
            );
            csv_response(&filename, team_rows_csv(&snapshots))
        }
    }
}

async fn export_plays_handler(
    State(state): State<ApiState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let game_id = params.get("game_id").map(String::as_str).unwrap_or("");
    if let Err(e) = validate_game_id(game_id) {
        return error_json(StatusCode::BAD_REQUEST, e);
    }

    let record = match state.store.latest_snapshot(game_id).await {
        Ok(Some(record)) => record,
        Ok(None) => return error_json(StatusCode::NOT_FOUND, "Game not found"),
        Err(e) => return internal_error(e),
    };

    let snapshot = match record.to_snapshot() {
        Ok(snap) => snap,
        Err(e) => return internal_error(e),
    };

    let filename = play_filename(&snapshot);
    csv_response(&filename, play_by_play_csv(&snapshot, Utc::now()))
}

async fn export_history_handler(
    State(state): State<ApiState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let parse_filter = |key: &str| -> Result<Option<i64>, Response> {
        match params.get(key) {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<i64>().map(Some).map_err(|_| {
                error_json(
                    StatusCode::BAD_REQUEST,
                    format!("invalid {key} '{raw}': expected an integer"),
                )
            }),
        }
    };

    let year = match parse_filter("year") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let week = match parse_filter("week") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match state.store.list_exports(year, week).await {
        Ok(exports) => Json(json!({
            "success": true,
            "count": exports.len(),
            "data": exports,
        }))
        .into_response(),
        Err(e) => internal_error(e),
    }
}

#[derive(Debug, Deserialize)]
struct ManualEmailRequest {
    game_id: String,
}

async fn manual_email_handler(
    State(state): State<ApiState>,
    Json(request): Json<ManualEmailRequest>,
) -> Response {
    if let Err(e) = validate_game_id(&request.game_id) {
        return error_json(StatusCode::BAD_REQUEST, e);
    }

    match trigger::send_manual_email(
        &state.store,
        state.mailer.as_ref(),
        &state.config.trigger,
        &request.game_id,
        Utc::now(),
    )
    .await
    {
        Ok(outcome) => Json(json!({
            "success": true,
            "game": outcome.game,
            "recipients": outcome.recipients,
            "filename": outcome.filename,
        }))
        .into_response(),
        Err(ManualEmailError::NoRecipients) => {
            error_json(StatusCode::BAD_REQUEST, ManualEmailError::NoRecipients)
        }
        Err(ManualEmailError::NoHalftimeSnapshot) => {
            error_json(StatusCode::NOT_FOUND, ManualEmailError::NoHalftimeSnapshot)
        }
        Err(ManualEmailError::Internal(e)) => internal_error(e),
    }
}

async fn list_recipients_handler(State(state): State<ApiState>) -> Response {
    match state.store.list_recipients().await {
        Ok(recipients) => Json(json!({ "success": true, "data": recipients })).into_response(),
        Err(e) => internal_error(e),
    }
}

#[derive(Debug, Deserialize)]
struct CreateRecipientRequest {
    email: String,
    name: Option<String>,
}

/// Structural email check: one `@`, non-empty local part, dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
        && email.matches('@').count() == 1
}

async fn create_recipient_handler(
    State(state): State<ApiState>,
    Json(request): Json<CreateRecipientRequest>,
) -> Response {
    let email = request.email.trim();
    if !is_valid_email(email) {
        return error_json(StatusCode::BAD_REQUEST, "invalid email address");
    }

    match state
        .store
        .insert_recipient(email, request.name.as_deref())
        .await
    {
        Ok(id) => (
            StatusCode::CREATED,
            Json(json!({ "success": true, "id": id })),
        )
            .into_response(),
        // The unique-constraint violation is buried in the error chain.
        Err(e) if format!("{e:#}").contains("UNIQUE") => {
            error_json(StatusCode::CONFLICT, "recipient already exists")
        }
        Err(e) => internal_error(e),
    }
}

#[derive(Debug, Deserialize)]
struct UpdateRecipientRequest {
    active: bool,
}

async fn update_recipient_handler(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateRecipientRequest>,
) -> Response {
    match state.store.set_recipient_active(id, request.active).await {
        Ok(true) => Json(json!({ "success": true })).into_response(),
        Ok(false) => error_json(StatusCode::NOT_FOUND, "recipient not found"),
        Err(e) => internal_error(e),
    }
}

async fn delete_recipient_handler(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Response {
    match state.store.delete_recipient(id).await {
        Ok(true) => Json(json!({ "success": true })).into_response(),
        Ok(false) => error_json(StatusCode::NOT_FOUND, "recipient not found"),
        Err(e) => internal_error(e),
    }
}
