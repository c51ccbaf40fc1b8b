use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
};
use serde::{Deserialize, Serialize};

use crate::{
    error::ApiError,
    gallery,
    routes::{AppState, SessionUser},
    storage::{ImageKind, ImageRecord, ListFilter},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveImageRequest {
    #[serde(default)]
    pub image_url: String,
    #[serde(rename = "type")]
    pub kind: ImageKind,
}

#[derive(Debug, Serialize)]
pub struct SaveImageResponse {
    pub success: bool,
    pub url: String,
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListImagesQuery {
    #[serde(rename = "type")]
    pub kind: Option<ImageKind>,
    pub limit: Option<usize>,
}

pub async fn save_image(
    State(state): State<AppState>,
    SessionUser(user_id): SessionUser,
    request: Result<Json<SaveImageRequest>, JsonRejection>,
) -> Result<Json<SaveImageResponse>, ApiError> {
    let Json(request) = request.map_err(|err| ApiError::bad_request(err.body_text()))?;
    let saved = gallery::save_image(
        state.records.as_ref(),
        &state.files,
        &user_id,
        &request.image_url,
        request.kind,
    )
    .await?;
    Ok(Json(SaveImageResponse {
        success: true,
        url: saved.url,
        message: "Image saved successfully".to_string(),
    }))
}

pub async fn list_images(
    State(state): State<AppState>,
    SessionUser(user_id): SessionUser,
    query: Result<Query<ListImagesQuery>, QueryRejection>,
) -> Result<Json<Vec<ImageRecord>>, ApiError> {
    let Query(query) = query.map_err(|err| ApiError::bad_request(err.body_text()))?;
    let filter = ListFilter {
        kind: query.kind,
        limit: query.limit,
    };
    let records = gallery::list_images(state.records.as_ref(), &user_id, &filter).await?;
    tracing::debug!(user = %user_id, count = records.len(), "images listed");
    Ok(Json(records))
}
