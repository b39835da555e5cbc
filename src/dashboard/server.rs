use crate::config::{DashboardConfig, FormConfig, StickerConfig, UnitflowConfig};
use crate::entry::LogVariant;
use crate::error::{Result, UnitflowError};
use crate::events::EventBus;
use crate::history::DisplayZone;
use crate::store::LogStore;
use axum::{
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers::{
    create_entry_handler, dashboard_page_handler, delete_entry_handler, entry_handler,
    export_csv_handler, export_html_handler, health_handler, list_entries_handler,
    sticker_handler, summary_handler,
};

/// Shared state for the Axum server
#[derive(Clone)]
pub struct DashboardState {
    pub(crate) store: Arc<LogStore>,
    pub(crate) event_bus: EventBus,
    pub(crate) variant: LogVariant,
    pub(crate) form: FormConfig,
    pub(crate) zone: DisplayZone,
    pub(crate) sticker: StickerConfig,
}

impl DashboardState {
    pub fn new(store: Arc<LogStore>, event_bus: EventBus, config: &UnitflowConfig) -> Self {
        Self {
            store,
            event_bus,
            variant: config.form.variant,
            form: config.form.clone(),
            zone: DisplayZone::from_config(&config.display),
            sticker: config.sticker.clone(),
        }
    }
}

/// Route table, split out so tests can drive it without a socket
pub fn router(state: DashboardState) -> Router {
    Router::new()
        .route("/", get(dashboard_page_handler))
        .route(
            "/api/entries",
            get(list_entries_handler).post(create_entry_handler),
        )
        .route("/api/summary", get(summary_handler))
        .route(
            "/api/entries/:id",
            get(entry_handler).delete(delete_entry_handler),
        )
        .route("/export.csv", get(export_csv_handler))
        .route("/export.html", get(export_html_handler))
        .route("/entries/:id/sticker", get(sticker_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// HTTP server for browsing and exporting the log
pub struct DashboardServer {
    pub(crate) config: DashboardConfig,
    pub(crate) state: DashboardState,
}

impl DashboardServer {
    pub fn new(config: DashboardConfig, state: DashboardState) -> Self {
        Self { config, state }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.config.ip, self.config.port)
    }

    /// Serve until `shutdown` resolves
    pub async fn serve<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr = self.address();
        info!("Starting dashboard server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            UnitflowError::component("dashboard".to_string(), format!("Failed to bind {}: {}", addr, e))
        })?;

        info!(
            "Dashboard listening on http://{} ({})",
            addr,
            self.state.variant.title()
        );

        axum::serve(listener, router(self.state.clone()))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| UnitflowError::component("dashboard".to_string(), format!("Server error: {}", e)))?;

        info!("Dashboard server stopped");
        Ok(())
    }
}
