//! Project navigation endpoints
//!
//! Every state-changing call answers with the new snapshot, which is also
//! pushed to SSE subscribers as `ProjectUpdated`.

use axum::{
    extract::{Path, State},
    Json,
};
use pulsar_common::events::ProjectSnapshot;
use pulsar_common::Error;
use serde::Deserialize;
use std::path::PathBuf;

use super::ApiResult;
use crate::layout::{Classification, Dimension, Subtype};
use crate::metadata::FileMetadata;
use crate::AppState;

/// Axis switch; an omitted half keeps its current value
#[derive(Debug, Deserialize)]
pub struct AxisRequest {
    pub classification: Option<String>,
    pub subtype: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DimensionRequest {
    pub dimension: String,
}

#[derive(Debug, Deserialize)]
pub struct GroupValueRequest {
    pub group: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateFileRequest {
    pub name: String,
    /// Template file whose content seeds the new file
    pub template: Option<PathBuf>,
    /// Software type whose empty scene seeds the new file
    pub software: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct TagRequest {
    pub tag: String,
}

/// GET /api/project
pub async fn get_project(State(state): State<AppState>) -> Json<ProjectSnapshot> {
    Json(state.project.snapshot().await)
}

/// POST /api/project/axis
pub async fn select_axis(
    State(state): State<AppState>,
    Json(request): Json<AxisRequest>,
) -> ApiResult<Json<ProjectSnapshot>> {
    let classification = request
        .classification
        .as_deref()
        .map(str::parse::<Classification>)
        .transpose()?;
    let subtype = request.subtype.as_deref().map(str::parse::<Subtype>).transpose()?;

    let snapshot = match (classification, subtype) {
        (Some(c), Some(s)) => state.project.select_axis(c, s).await?,
        (Some(c), None) => state.project.set_classification(c).await?,
        (None, Some(s)) => state.project.set_subtype(s).await?,
        (None, None) => {
            return Err(Error::InvalidInput(
                "classification or subtype is required".to_string(),
            )
            .into())
        }
    };
    Ok(Json(snapshot))
}

/// POST /api/project/dimension
pub async fn set_dimension(
    State(state): State<AppState>,
    Json(request): Json<DimensionRequest>,
) -> ApiResult<Json<ProjectSnapshot>> {
    let dimension: Dimension = request.dimension.parse()?;
    Ok(Json(state.project.set_dimension(dimension).await?))
}

/// POST /api/project/refresh
///
/// Resets the active hierarchy to the project root and re-lists it.
pub async fn refresh(State(state): State<AppState>) -> ApiResult<Json<ProjectSnapshot>> {
    Ok(Json(state.project.get_data().await?))
}

/// POST /api/groups/select
pub async fn select_group_value(
    State(state): State<AppState>,
    Json(request): Json<GroupValueRequest>,
) -> ApiResult<Json<ProjectSnapshot>> {
    let snapshot = state
        .project
        .set_group_value(&request.group, &request.value)
        .await?;
    Ok(Json(snapshot))
}

/// POST /api/groups/create
pub async fn create_group_value(
    State(state): State<AppState>,
    Json(request): Json<GroupValueRequest>,
) -> ApiResult<Json<ProjectSnapshot>> {
    let snapshot = state
        .project
        .create_new_group_value(&request.group, &request.value)
        .await?;
    Ok(Json(snapshot))
}

/// POST /api/files/create
pub async fn create_file(
    State(state): State<AppState>,
    Json(request): Json<CreateFileRequest>,
) -> ApiResult<Json<ProjectSnapshot>> {
    let snapshot = state
        .project
        .create_new_file(
            &request.name,
            request.template.as_deref(),
            request.software.as_deref(),
        )
        .await?;
    Ok(Json(snapshot))
}

/// GET /api/files/metadata
pub async fn get_file_metadata(State(state): State<AppState>) -> ApiResult<Json<FileMetadata>> {
    Ok(Json(state.project.file_metadata().await?))
}

/// POST /api/files/comment
pub async fn save_comment(
    State(state): State<AppState>,
    Json(request): Json<CommentRequest>,
) -> ApiResult<Json<ProjectSnapshot>> {
    Ok(Json(state.project.save_comment(&request.comment).await?))
}

/// POST /api/files/tags
pub async fn save_tag(
    State(state): State<AppState>,
    Json(request): Json<TagRequest>,
) -> ApiResult<Json<ProjectSnapshot>> {
    Ok(Json(state.project.save_tag(&request.tag).await?))
}

/// DELETE /api/files/tags/:tag
pub async fn delete_tag(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> ApiResult<Json<ProjectSnapshot>> {
    Ok(Json(state.project.delete_tag(&tag).await?))
}
