use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What produced a stored image.
///
/// `bgremoval` is an older spelling of `removebg` still sent by some clients;
/// it is accepted on input and always written back as `removebg`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageKind {
    #[serde(rename = "generated")]
    Generated,
    #[serde(rename = "faceswap")]
    FaceSwap,
    #[serde(rename = "removebg", alias = "bgremoval")]
    BackgroundRemoval,
}

impl ImageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::FaceSwap => "faceswap",
            Self::BackgroundRemoval => "removebg",
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted gallery entry. Never updated after insertion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub id: String,
    pub user_id: String,
    pub image_url: String,
    #[serde(rename = "type")]
    pub kind: ImageKind,
    pub created_at: DateTime<Utc>,
}

impl ImageRecord {
    pub fn new(user_id: &str, image_url: &str, kind: ImageKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            image_url: image_url.to_string(),
            kind,
            created_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ListFilter {
    pub kind: Option<ImageKind>,
    pub limit: Option<usize>,
}
