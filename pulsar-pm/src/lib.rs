//! pulsar-pm library - Production manager service
//!
//! Navigates a VFX/animation production tree (asset and shot hierarchies,
//! one per classification x subtype) and drives authoring software against
//! the selected file. The UI talks to it over HTTP and receives project
//! snapshots over SSE.

use axum::Router;
use pulsar_common::config::SettingsService;
use pulsar_common::events::EventBus;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod layout;
pub mod metadata;
pub mod project;
pub mod resolver;
pub mod software;

use project::Project;
use software::SoftwareHub;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Open project and its resolvers
    pub project: Arc<Project>,
    /// Connected software instances and task launcher
    pub hub: Arc<SoftwareHub>,
    /// User settings file
    pub settings: Arc<SettingsService>,
    /// Event broadcaster for SSE
    pub bus: EventBus,
}

impl AppState {
    pub fn new(
        project: Arc<Project>,
        hub: Arc<SoftwareHub>,
        settings: Arc<SettingsService>,
        bus: EventBus,
    ) -> Self {
        Self {
            project,
            hub,
            settings,
            bus,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{delete, get, post};

    let project = Router::new()
        .route("/api/project", get(api::get_project))
        .route("/api/project/axis", post(api::select_axis))
        .route("/api/project/dimension", post(api::set_dimension))
        .route("/api/project/refresh", post(api::refresh))
        .route("/api/groups/select", post(api::select_group_value))
        .route("/api/groups/create", post(api::create_group_value))
        .route("/api/files/create", post(api::create_file))
        .route("/api/files/metadata", get(api::get_file_metadata))
        .route("/api/files/comment", post(api::save_comment))
        .route("/api/files/tags", post(api::save_tag))
        .route("/api/files/tags/:tag", delete(api::delete_tag));

    let softwares = Router::new()
        .route("/api/tasks", post(api::exec_task))
        .route("/api/softwares", get(api::list_softwares))
        .route("/api/softwares/connect", get(api::connect_software))
        .route("/api/softwares/:id/state", post(api::update_software))
        .route(
            "/api/softwares/:id/tasks/:task_id/result",
            post(api::report_task_result),
        );

    let service = Router::new()
        .route("/api/settings", get(api::get_settings).post(api::save_settings))
        .route("/api/events", get(api::event_stream))
        .merge(api::health_routes());

    Router::new()
        .merge(project)
        .merge(softwares)
        .merge(service)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
