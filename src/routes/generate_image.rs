use axum::{Json, extract::State, extract::rejection::JsonRejection};
use serde::{Deserialize, Serialize};

use crate::{error::ApiError, routes::AppState};

#[derive(Debug, Deserialize)]
pub struct GenerateImageRequest {
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageResponse {
    pub image_url: String,
}

pub async fn generate_image(
    State(state): State<AppState>,
    request: Result<Json<GenerateImageRequest>, JsonRejection>,
) -> Result<Json<GenerateImageResponse>, ApiError> {
    let Json(request) = request.map_err(|err| ApiError::bad_request(err.body_text()))?;
    let prompt = request.prompt.trim();
    if prompt.is_empty() {
        return Err(ApiError::bad_request("Prompt is required"));
    }

    tracing::info!(prompt_len = prompt.len(), "generating image");
    let image_url = state.imagepig.generate(prompt).await?;
    Ok(Json(GenerateImageResponse { image_url }))
}
