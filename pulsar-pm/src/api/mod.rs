//! HTTP API handlers for pulsar-pm

pub mod error;
pub mod health;
pub mod project;
pub mod settings;
pub mod softwares;
pub mod sse;

pub use error::{ApiError, ApiResult};
pub use health::health_routes;
pub use project::{
    create_file, create_group_value, delete_tag, get_file_metadata, get_project, refresh,
    save_comment, save_tag, select_axis, select_group_value, set_dimension,
};
pub use settings::{get_settings, save_settings};
pub use softwares::{connect_software, exec_task, list_softwares, report_task_result, update_software};
pub use sse::event_stream;
