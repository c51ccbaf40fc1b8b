use axum::{Json, extract::State, extract::rejection::JsonRejection};
use serde::Deserialize;

use crate::{error::ApiError, imagepig::FaceSwapResponse, routes::AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceSwapRequest {
    #[serde(default)]
    pub source_image: String,
    #[serde(default)]
    pub target_image: String,
}

pub async fn face_swap(
    State(state): State<AppState>,
    request: Result<Json<FaceSwapRequest>, JsonRejection>,
) -> Result<Json<FaceSwapResponse>, ApiError> {
    let Json(request) = request.map_err(|err| ApiError::bad_request(err.body_text()))?;
    let source = request.source_image.trim();
    let target = request.target_image.trim();
    if source.is_empty() || target.is_empty() {
        return Err(ApiError::bad_request(
            "Both sourceImage and targetImage are required",
        ));
    }

    let response = state.imagepig.face_swap(source, target).await?;
    Ok(Json(response))
}
