pub mod files;
pub mod hash;
pub mod record_store;
pub mod records;

pub use files::LocalFileStorage;
pub use hash::compute_hash;
pub use record_store::{ImageRepository, JsonRecordStore};
pub use records::{ImageKind, ImageRecord, ListFilter};

pub fn get_extension_from_mime_type(mime_type: &str) -> &'static str {
    match mime_type.to_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        _ => "bin",
    }
}
