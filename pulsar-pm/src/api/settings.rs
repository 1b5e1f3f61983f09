//! Settings endpoints
//!
//! Saving merges the posted keys into the settings file and rewrites it.
//! The open project keeps running with the layout it was opened with.

use axum::{extract::State, Json};
use pulsar_common::config::Settings;
use pulsar_common::events::PulsarEvent;
use tracing::info;

use super::ApiResult;
use crate::AppState;

/// GET /api/settings
pub async fn get_settings(State(state): State<AppState>) -> Json<Settings> {
    Json(state.settings.settings().await)
}

/// POST /api/settings
pub async fn save_settings(
    State(state): State<AppState>,
    Json(patch): Json<Settings>,
) -> ApiResult<Json<Settings>> {
    let keys: Vec<String> = patch.keys().cloned().collect();
    let merged = state.settings.save(patch).await?;
    info!("Settings updated: {}", keys.join(", "));

    state.bus.emit_lossy(PulsarEvent::SettingsChanged {
        keys,
        timestamp: chrono::Utc::now(),
    });
    Ok(Json(merged))
}
