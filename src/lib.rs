pub mod background;
pub mod config;
pub mod editor;
pub mod error;
pub mod gallery;
pub mod image_processing;
pub mod imagepig;
pub mod logging;
pub mod routes;
pub mod storage;
pub mod upload;

pub use config::Config;
pub use error::ApiError;
pub use routes::{AppState, router};
