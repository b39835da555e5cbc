use crate::config::AutoLogMode;
use crate::entry::{Field, LogEntry, LogVariant};
use crate::error::{ExportError, UnitflowError};
use crate::events::UnitflowEvent;
use crate::export::{
    csv_file_name, escape_html, render_csv, render_html_document, render_sticker, render_table,
    select_entries,
};
use crate::form::EntryForm;
use crate::history::{search, summarize};
use crate::store::Preferences;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::SystemTime;
use tracing::{debug, info, warn};

use super::server::DashboardState;

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    /// Comma separated entry ids
    pub ids: Option<String>,
}

/// Error body plus the status it maps to
pub struct ApiError(UnitflowError);

impl<E: Into<UnitflowError>> From<E> for ApiError {
    fn from(error: E) -> Self {
        ApiError(error.into())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            UnitflowError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            UnitflowError::Export(ExportError::NotFound(_)) => StatusCode::NOT_FOUND,
            UnitflowError::Export(ExportError::Empty | ExportError::NothingSelected) => {
                StatusCode::NOT_FOUND
            }
            UnitflowError::Export(ExportError::Unsupported(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("Dashboard request failed: {}", self.0);
        } else {
            debug!("Dashboard request rejected: {}", self.0);
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

fn not_found(id: &str) -> ApiError {
    ApiError(ExportError::NotFound(id.to_string()).into())
}

fn attachment(content_type: &'static str, file_name: String, body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        body,
    )
        .into_response()
}

pub async fn list_entries_handler(
    State(state): State<DashboardState>,
    Query(query): Query<SearchQuery>,
) -> Json<Vec<LogEntry>> {
    let entries = state.store.load().await;
    Json(search(&entries, &query.q, &state.zone))
}

pub async fn summary_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let entries = state.store.load().await;
    Json(summarize(&entries, &state.zone, Utc::now()))
}

pub async fn entry_handler(
    State(state): State<DashboardState>,
    Path(id): Path<String>,
) -> Result<Json<LogEntry>, ApiError> {
    state.store.find(&id).await.map(Json).ok_or_else(|| not_found(&id))
}

/// Manual submit. Keys are field names, e.g. `{"unit": "3N", "serial": "SN1"}`.
/// A crash cart check without a tech name falls back to the remembered one.
pub async fn create_entry_handler(
    State(state): State<DashboardState>,
    Json(values): Json<BTreeMap<String, String>>,
) -> Result<(StatusCode, Json<LogEntry>), ApiError> {
    let mut form = EntryForm::from_config(&state.form)
        .with_preferences(Preferences::new(state.store.backend()));
    form.set_auto_log(AutoLogMode::Off);
    for (key, value) in values {
        let field: Field = key.parse()?;
        form.set(field, value)?;
    }
    form.load_remembered().await;

    let entry = form.submit_manual(&state.store).await?;
    info!("Dashboard logged entry {}", entry.id);
    let _ = state.event_bus.publish(UnitflowEvent::EntryLogged {
        id: entry.id.clone(),
        source: entry.source,
        timestamp: SystemTime::now(),
    });

    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn delete_entry_handler(
    State(state): State<DashboardState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.store.remove(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(&id))
    }
}

pub async fn export_csv_handler(State(state): State<DashboardState>) -> Result<Response, ApiError> {
    let entries = state.store.load().await;
    if entries.is_empty() {
        return Err(ExportError::Empty.into());
    }
    let name = csv_file_name(state.variant, Utc::now().date_naive());
    Ok(attachment(
        "text/csv; charset=utf-8",
        name,
        render_csv(state.variant, &entries),
    ))
}

pub async fn export_html_handler(
    State(state): State<DashboardState>,
    Query(query): Query<ExportQuery>,
) -> Result<Html<String>, ApiError> {
    let entries = state.store.load().await;
    if entries.is_empty() {
        return Err(ExportError::Empty.into());
    }

    let rows = match query.ids {
        Some(ids) => {
            let ids: Vec<String> = ids
                .split(',')
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .collect();
            select_entries(&entries, &ids)?
        }
        None => entries,
    };

    Ok(Html(render_html_document(
        state.variant,
        &rows,
        &state.zone,
        Utc::now(),
    )))
}

pub async fn sticker_handler(
    State(state): State<DashboardState>,
    Path(id): Path<String>,
) -> Result<Html<String>, ApiError> {
    let entry = state.store.find(&id).await.ok_or_else(|| not_found(&id))?;
    Ok(Html(render_sticker(&entry, &state.sticker, &state.zone)?))
}

pub async fn health_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let health_info = serde_json::json!({
        "status": "healthy",
        "log": state.variant.storage_key(),
        "entries": state.store.len().await,
        "server_info": {
            "subscribers": state.event_bus.subscriber_count(),
        }
    });

    (StatusCode::OK, Json(health_info))
}

/// Summary cards above a searchable table
pub async fn dashboard_page_handler(
    State(state): State<DashboardState>,
    Query(query): Query<SearchQuery>,
) -> Html<String> {
    let entries = state.store.load().await;
    let summary = summarize(&entries, &state.zone, Utc::now());
    let rows = search(&entries, &query.q, &state.zone);

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title}</title>
    <style>
        body {{ font-family: Arial, Helvetica, sans-serif; margin: 24px; color: #111; }}
        .cards {{ display: flex; gap: 12px; margin-bottom: 16px; }}
        .card {{ border: 1px solid #ccc; border-radius: 6px; padding: 12px 16px; min-width: 120px; }}
        .card b {{ display: block; font-size: 22px; }}
        table {{ border-collapse: collapse; width: 100%; }}
        th, td {{ border: 1px solid #ccc; padding: 6px; font-size: 12px; vertical-align: top; }}
        th {{ background: #f3f3f3; text-align: left; }}
        nav a {{ margin-right: 12px; }}
    </style>
</head>
<body>
    <h1>{title}</h1>
    <div class="cards">
        <div class="card"><b>{total}</b>Total</div>
        <div class="card"><b>{today}</b>Today</div>
        <div class="card"><b>{locations}</b>{location_label}</div>
    </div>
    <form method="get" action="/">
        <input type="search" name="q" value="{query}" placeholder="Search">
        <button type="submit">Search</button>
    </form>
    <nav><a href="/export.csv">Export CSV</a><a href="/export.html">Export HTML</a></nav>
    <p>{shown} of {total} shown</p>
    {table}
</body>
</html>
"#,
        title = escape_html(state.variant.title()),
        total = summary.total,
        today = summary.today,
        locations = summary.distinct_locations,
        location_label = match state.variant {
            LogVariant::WoundVac => "Units",
            LogVariant::CrashCart => "Carts",
        },
        query = escape_html(&query.q),
        shown = rows.len(),
        table = render_table(state.variant, &rows, &state.zone),
    );

    Html(html)
}
