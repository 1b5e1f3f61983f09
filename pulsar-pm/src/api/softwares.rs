//! Task dispatch and the authoring-software connection endpoints
//!
//! A software instance connects by opening `GET /api/softwares/connect` and
//! keeps the stream open for as long as it runs. Tasks forwarded to it arrive
//! on that stream; it answers each through the `result` endpoint.

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{self, Stream, StreamExt};
use pulsar_common::events::SoftwareInfo;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use super::ApiResult;
use crate::software::{SoftwareHub, TaskOutcome, NEW_INSTANCE};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ExecTaskRequest {
    /// Connected instance id, or `new` to launch one
    #[serde(default = "default_software_id")]
    pub software_id: String,
    pub software_type: String,
    pub command: String,
    #[serde(default)]
    pub args: Value,
}

fn default_software_id() -> String {
    NEW_INSTANCE.to_string()
}

#[derive(Debug, Serialize)]
pub struct ExecTaskResponse {
    pub status: String,
    pub task_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub software: String,
    pub scene: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SoftwareStateRequest {
    pub scene: Option<String>,
    pub saved: Option<bool>,
}

/// POST /api/tasks
///
/// Returns once the task is dispatched. The outcome follows as a
/// `TaskFinished` event.
pub async fn exec_task(
    State(state): State<AppState>,
    Json(request): Json<ExecTaskRequest>,
) -> ApiResult<Json<ExecTaskResponse>> {
    let handle = state
        .project
        .exec_task(
            &request.software_id,
            &request.software_type,
            &request.command,
            request.args,
        )
        .await?;

    let task_id = handle.task_id;
    tokio::spawn(async move {
        let outcome = handle.outcome().await;
        debug!("Task {} settled (success: {})", task_id, outcome.success);
    });

    Ok(Json(ExecTaskResponse {
        status: "ok".to_string(),
        task_id,
    }))
}

/// GET /api/softwares
pub async fn list_softwares(State(state): State<AppState>) -> Json<Vec<SoftwareInfo>> {
    Json(state.hub.list())
}

/// Unregisters the instance when its stream is dropped
struct Connection {
    hub: Arc<SoftwareHub>,
    id: String,
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(e) = self.hub.unregister(&self.id) {
            warn!("Failed to unregister software instance: {}", e);
        }
    }
}

/// GET /api/softwares/connect?software=maya&scene=...
pub async fn connect_software(
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (id, rx) = state.hub.register(&query.software, query.scene);
    let connection = Connection {
        hub: state.hub.clone(),
        id: id.clone(),
    };

    let registered = Event::default()
        .event("registered")
        .data(json!({ "id": id }).to_string());

    let tasks = stream::unfold((rx, connection), |(mut rx, connection)| async move {
        let request = rx.recv().await?;
        let event = match serde_json::to_string(&request) {
            Ok(json) => Event::default().event("task").data(json),
            Err(e) => {
                warn!("Failed to serialize task {}: {}", request.id, e);
                Event::default().comment("dropped task")
            }
        };
        Some((Ok(event), (rx, connection)))
    });

    let stream = stream::once(async move { Ok(registered) }).chain(tasks);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}

/// POST /api/softwares/:id/state
pub async fn update_software(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SoftwareStateRequest>,
) -> ApiResult<Json<SoftwareInfo>> {
    Ok(Json(state.hub.update(&id, request.scene, request.saved)?))
}

/// POST /api/softwares/:id/tasks/:task_id/result
pub async fn report_task_result(
    State(state): State<AppState>,
    Path((id, task_id)): Path<(String, Uuid)>,
    Json(outcome): Json<TaskOutcome>,
) -> ApiResult<Json<Value>> {
    debug!("Instance {} reported task {}", id, task_id);
    state.hub.report(&id, task_id, outcome)?;
    Ok(Json(json!({ "status": "ok" })))
}
