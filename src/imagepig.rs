use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::image_processing::jpeg_data_uri;

pub const DEFAULT_BASE_URL: &str = "https://api.imagepig.com";
pub const DEFAULT_GENERATE_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_FACESWAP_TIMEOUT: Duration = Duration::from_secs(30);

const GENERATE_PATH: &str = "/flux";
const FACESWAP_PATH: &str = "/faceswap";

#[derive(Debug, Error)]
pub enum VendorError {
    #[error("API key is not configured")]
    MissingApiKey,
    #[error("Unable to connect to the {service} service. Please try again later.")]
    Unavailable { service: &'static str },
    #[error("{0}")]
    Rejected(String),
    #[error("Failed to get image data")]
    MissingImageData,
    #[error("Invalid response from the {service} service: {detail}")]
    InvalidResponse { service: &'static str, detail: String },
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    image_data: Option<String>,
}

/// Face swap result as returned by the vendor, plus `url` when the vendor sent
/// image data. Unknown vendor fields are carried through untouched.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FaceSwapResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct FaceSwapPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    source_image_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_image_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_image_data: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_image_data: Option<&'a str>,
}

impl<'a> FaceSwapPayload<'a> {
    /// Values beginning with `http` are sent as URLs, everything else as
    /// base64 image data.
    fn new(source: &'a str, target: &'a str) -> Self {
        let is_remote = |value: &str| value.starts_with("http");
        Self {
            source_image_url: is_remote(source).then_some(source),
            target_image_url: is_remote(target).then_some(target),
            source_image_data: (!is_remote(source)).then_some(source),
            target_image_data: (!is_remote(target)).then_some(target),
        }
    }
}

/// Client for the ImagePig generation and face swap endpoints. Failures are
/// returned once; nothing is retried.
#[derive(Clone, Debug)]
pub struct ImagePigClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    generate_timeout: Duration,
    faceswap_timeout: Duration,
}

impl ImagePigClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            generate_timeout: DEFAULT_GENERATE_TIMEOUT,
            faceswap_timeout: DEFAULT_FACESWAP_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, generate: Duration, faceswap: Duration) -> Self {
        self.generate_timeout = generate;
        self.faceswap_timeout = faceswap;
        self
    }

    /// Generates an image for `prompt` and returns it as a JPEG data URI.
    pub async fn generate(&self, prompt: &str) -> Result<String, VendorError> {
        let response: GenerationResponse = self
            .post_json(
                GENERATE_PATH,
                &json!({ "prompt": prompt }),
                self.generate_timeout,
                "image generation",
                "Failed to generate image",
            )
            .await?;
        let image_data = response
            .image_data
            .filter(|data| !data.is_empty())
            .ok_or(VendorError::MissingImageData)?;
        tracing::info!(bytes = image_data.len(), "image generated");
        Ok(jpeg_data_uri(&image_data))
    }

    pub async fn face_swap(
        &self,
        source_image: &str,
        target_image: &str,
    ) -> Result<FaceSwapResponse, VendorError> {
        let payload = FaceSwapPayload::new(source_image, target_image);
        let mut response: FaceSwapResponse = self
            .post_json(
                FACESWAP_PATH,
                &payload,
                self.faceswap_timeout,
                "face swap",
                "Failed to process face swap",
            )
            .await?;
        if let Some(image_data) = response.image_data.as_deref().filter(|data| !data.is_empty()) {
            response.url = Some(jpeg_data_uri(image_data));
            tracing::info!(bytes = image_data.len(), "face swap completed");
        } else {
            tracing::warn!("face swap response carried no image data");
        }
        Ok(response)
    }

    async fn post_json<B, T>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
        service: &'static str,
        fallback: &str,
    ) -> Result<T, VendorError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let api_key = self.api_key.as_deref().ok_or(VendorError::MissingApiKey)?;
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .header("Api-Key", api_key)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|err| transport_error(err, service, fallback))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| transport_error(err, service, fallback))?;
        tracing::debug!(service, status = %status, "vendor responded");

        if !status.is_success() {
            tracing::warn!(service, status = %status, body = %text, "vendor request failed");
            let message = vendor_message(&text).unwrap_or_else(|| format!("{fallback}: {status}"));
            return Err(VendorError::Rejected(message));
        }

        serde_json::from_str(&text).map_err(|err| VendorError::InvalidResponse {
            service,
            detail: err.to_string(),
        })
    }
}

fn transport_error(err: reqwest::Error, service: &'static str, fallback: &str) -> VendorError {
    tracing::warn!(service, error = %err, "vendor transport error");
    if err.is_timeout() || err.is_connect() {
        VendorError::Unavailable { service }
    } else {
        VendorError::Rejected(format!("{fallback}: {err}"))
    }
}

/// Picks the vendor's own `error` or `message` string out of an error body.
fn vendor_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["error", "message"]
        .iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|message| !message.is_empty())
        .map(str::to_string)
}
