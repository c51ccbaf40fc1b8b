use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartRejection},
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::ApiError,
    gallery,
    routes::{AppState, SessionUser},
    storage::{ImageKind, ImageRecord, LocalFileStorage},
    upload::{self, UploadError},
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveBgResponse {
    pub message: String,
    pub image_url: String,
}

pub async fn remove_background(
    State(state): State<AppState>,
    SessionUser(user_id): SessionUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<RemoveBgResponse>, ApiError> {
    let mut multipart = multipart.map_err(|_| UploadError::NotMultipart)?;
    let upload = upload::receive_image(
        &mut multipart,
        &state.config.scratch_dir,
        state.config.max_upload_bytes,
    )
    .await?;

    let removed = match upload.read().await {
        Ok(bytes) => state.remover.remove(&bytes).await.map_err(ApiError::from),
        Err(err) => Err(ApiError::internal("Failed to read uploaded file", err)),
    };
    upload.discard().await;
    let output = removed?;

    let key = format!("{}.png", Uuid::new_v4());
    state
        .files
        .put_new(&key, &output)
        .await
        .map_err(|err| ApiError::internal("Failed to store processed image", err))?;
    let image_url = LocalFileStorage::public_url(&key);

    let record = ImageRecord::new(&user_id, &image_url, ImageKind::BackgroundRemoval);
    gallery::insert_record(state.records.as_ref(), &state.files, record, Some(&key)).await?;
    tracing::info!(user = %user_id, url = %image_url, "background removed");

    Ok(Json(RemoveBgResponse {
        message: "Background removed successfully".to_string(),
        image_url,
    }))
}
