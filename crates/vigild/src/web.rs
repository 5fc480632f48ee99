//! HTTP routes of the admin dashboard.

use crate::config::AdminConfig;
use crate::db::with_store;
use crate::error::AdminError;
use crate::render;
use axum::extract::rejection::FormRejection;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vigil_store::{EventRecord, IdentityRecord, PurgeScope, Stats};

/// Events returned by `/data`.
pub const RECENT_EVENTS: usize = 20;
/// Events shown on a user's history page.
pub const HISTORY_EVENTS: usize = 50;

type AppState = Arc<AdminConfig>;

pub fn router(config: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/data", get(data))
        .route("/exportar-usuarios", get(export_identities))
        .route("/exportar-accesos", get(export_events))
        .route("/historial-usuario", get(user_history))
        .route("/limpiar", post(cleanup))
        .fallback(not_found)
        .with_state(config)
}

async fn dashboard(State(config): State<AppState>) -> Result<Html<Vec<u8>>, AdminError> {
    match tokio::fs::read(&config.dashboard_path).await {
        Ok(body) => Ok(Html(body)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %config.dashboard_path.display(), "dashboard file missing");
            Err(AdminError::NotFound("Página no encontrada".into()))
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Serialize)]
pub struct DashboardData {
    pub stats: Stats,
    pub identities: Vec<IdentityRecord>,
    pub events: Vec<EventRecord>,
}

async fn data(State(config): State<AppState>) -> Result<Response, AdminError> {
    let data = with_store(&config.db_path, |conn| {
        Ok(DashboardData {
            stats: vigil_store::stats(conn)?,
            identities: vigil_store::list_identities(conn)?,
            events: vigil_store::recent_events(conn, RECENT_EVENTS)?,
        })
    })
    .await?;
    Ok(([(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")], Json(data)).into_response())
}

fn csv_response(filename: &'static str, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        body,
    )
        .into_response()
}

async fn export_identities(State(config): State<AppState>) -> Result<Response, AdminError> {
    let rows = with_store(&config.db_path, |conn| vigil_store::list_identities(conn)).await?;
    let body = render::identities_csv(&rows)?;
    tracing::info!(rows = rows.len(), "identities exported");
    Ok(csv_response("export_usuarios.csv", body))
}

async fn export_events(State(config): State<AppState>) -> Result<Response, AdminError> {
    let rows = with_store(&config.db_path, |conn| vigil_store::all_events(conn)).await?;
    let body = render::events_csv(&rows)?;
    tracing::info!(rows = rows.len(), "access events exported");
    Ok(csv_response("export_accesos.csv", body))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    user: Option<String>,
}

async fn user_history(
    State(config): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Html<String>, AdminError> {
    let Some(user) = query.user.filter(|u| !u.trim().is_empty()) else {
        return Err(AdminError::Validation("Falta parámetro de usuario".into()));
    };

    let lookup = user.clone();
    let events = with_store(&config.db_path, move |conn| {
        vigil_store::events_for(conn, &lookup, HISTORY_EVENTS)
    })
    .await?;
    Ok(Html(render::history_page(&user, &events)))
}

#[derive(Debug, Deserialize)]
struct CleanupForm {
    #[serde(default)]
    tipo: String,
    #[serde(default)]
    confirmacion: String,
}

async fn cleanup(
    State(config): State<AppState>,
    form: Result<Form<CleanupForm>, FormRejection>,
) -> Result<&'static str, AdminError> {
    let Form(form) = form.map_err(|e| AdminError::Validation(e.body_text()))?;

    if !config.token_matches(&form.confirmacion) {
        tracing::warn!(tipo = %form.tipo, "cleanup rejected: bad confirmation");
        return Err(AdminError::Authorization);
    }
    let scope = PurgeScope::from_form(&form.tipo)
        .ok_or_else(|| AdminError::Validation("Tipo de limpieza no válido".into()))?;

    with_store(&config.db_path, move |conn| vigil_store::purge(conn, scope)).await?;

    tracing::info!(?scope, "cleanup executed via web");
    Ok(match scope {
        PurgeScope::Events => "Historial de accesos eliminado correctamente",
        PurgeScope::All => "Todos los datos eliminados correctamente",
    })
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Página no encontrada")
}
