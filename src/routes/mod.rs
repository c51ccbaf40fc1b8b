pub mod edit_image;
pub mod faceswap;
pub mod generate_image;
pub mod images;
pub mod removebg;
pub mod session;
pub mod url_validation;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::services::ServeDir;

use crate::{
    background::BackgroundRemover,
    config::Config,
    imagepig::ImagePigClient,
    storage::{ImageRepository, LocalFileStorage},
};

pub use session::SessionUser;
pub use url_validation::validate_http_url;

/// Body limit for JSON routes that carry base64 images.
pub const JSON_BODY_LIMIT: usize = 20 * 1024 * 1024;

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Shared handles injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub files: Arc<LocalFileStorage>,
    pub records: Arc<dyn ImageRepository>,
    pub imagepig: Arc<ImagePigClient>,
    pub remover: Arc<dyn BackgroundRemover>,
    pub http: reqwest::Client,
}

pub fn router(state: AppState) -> Router {
    let upload_limit = usize::try_from(state.config.max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);
    let public_dir = state.files.base_dir().to_path_buf();

    Router::new()
        .route("/api/generate-image", post(generate_image::generate_image))
        .route(
            "/api/faceswap",
            post(faceswap::face_swap).layer(DefaultBodyLimit::max(JSON_BODY_LIMIT)),
        )
        .route(
            "/api/removebg",
            post(removebg::remove_background).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/api/images",
            get(images::list_images)
                .post(images::save_image)
                .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT)),
        )
        .route(
            "/api/edit",
            post(edit_image::edit_image).layer(DefaultBodyLimit::max(JSON_BODY_LIMIT)),
        )
        .fallback_service(ServeDir::new(public_dir))
        .with_state(state)
}
