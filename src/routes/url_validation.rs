use url::Url;

use crate::error::ApiError;

pub fn validate_http_url(raw: &str) -> Result<Url, ApiError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ApiError::bad_request("url must not be empty"));
    }
    let parsed = Url::parse(trimmed)
        .map_err(|err| ApiError::bad_request(format!("invalid url: {err}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(ApiError::bad_request(format!(
            "only http and https urls are allowed, got {scheme}"
        ))),
    }
}
