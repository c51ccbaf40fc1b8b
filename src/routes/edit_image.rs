use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::{
    editor::{self, EditSettings},
    error::ApiError,
    routes::{AppState, SessionUser},
};

pub const EXPORT_FILE_NAME: &str = "edited-image.png";

#[derive(Debug, Deserialize)]
pub struct EditImageRequest {
    pub image: String,
    #[serde(flatten)]
    pub settings: EditSettings,
}

/// Applies the editor settings and answers with the PNG as a download.
pub async fn edit_image(
    State(state): State<AppState>,
    SessionUser(user_id): SessionUser,
    request: Result<Json<EditImageRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(EditImageRequest { image, settings }) =
        request.map_err(|err| ApiError::bad_request(err.body_text()))?;
    settings.validate()?;

    let source =
        editor::load_source(&image, &state.files, &state.http, editor::MAX_SOURCE_BYTES).await?;
    tracing::debug!(user = %user_id, bytes = source.len(), "editing image");
    let png = tokio::task::spawn_blocking(move || editor::export_png(&source, &settings))
        .await
        .map_err(|err| ApiError::internal("Image export failed", err))??;

    Ok((
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{EXPORT_FILE_NAME}\""),
            ),
        ],
        png,
    )
        .into_response())
}
