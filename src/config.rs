use std::{env, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{Context, Result};

use crate::{imagepig, upload};

/// Runtime settings, read once at start-up.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: String,
    pub api_key: Option<String>,
    pub imagepig_base_url: String,
    pub generate_timeout: Duration,
    pub faceswap_timeout: Duration,
    pub fetch_timeout: Duration,
    pub data_dir: PathBuf,
    pub public_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub remove_bg_program: String,
    pub remove_bg_args: Vec<String>,
    pub remove_bg_timeout: Duration,
    pub max_upload_bytes: u64,
    pub auth_user_header: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            api_key: None,
            imagepig_base_url: imagepig::DEFAULT_BASE_URL.to_string(),
            generate_timeout: imagepig::DEFAULT_GENERATE_TIMEOUT,
            faceswap_timeout: imagepig::DEFAULT_FACESWAP_TIMEOUT,
            fetch_timeout: Duration::from_secs(30),
            data_dir: default_data_dir(),
            public_dir: PathBuf::from("public"),
            scratch_dir: PathBuf::from("tmp"),
            remove_bg_program: "python".to_string(),
            remove_bg_args: vec!["scripts/remove_bg.py".to_string()],
            remove_bg_timeout: Duration::from_secs(5 * 60),
            max_upload_bytes: upload::DEFAULT_MAX_UPLOAD_BYTES,
            auth_user_header: "x-auth-request-email".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source. Blank values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();

        let host = get("BIND_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = parse_var(&get, "PORT")?.unwrap_or(3000);
        config.bind_address = format!("{host}:{port}");

        config.api_key = get("API_KEY");
        if let Some(url) = get("IMAGEPIG_BASE_URL") {
            config.imagepig_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = parse_var::<u64, _>(&get, "GENERATE_TIMEOUT_SECS")? {
            config.generate_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&get, "FACESWAP_TIMEOUT_SECS")? {
            config.faceswap_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&get, "FETCH_TIMEOUT_SECS")? {
            config.fetch_timeout = Duration::from_secs(secs);
        }
        if let Some(dir) = get("DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("PUBLIC_DIR") {
            config.public_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("SCRATCH_DIR") {
            config.scratch_dir = PathBuf::from(dir);
        }
        if let Some(program) = get("REMOVE_BG_PROGRAM") {
            config.remove_bg_program = program;
        }
        if let Some(args) = get("REMOVE_BG_ARGS") {
            config.remove_bg_args = args.split_whitespace().map(str::to_string).collect();
        }
        if let Some(secs) = parse_var::<u64, _>(&get, "REMOVE_BG_TIMEOUT_SECS")? {
            config.remove_bg_timeout = Duration::from_secs(secs);
        }
        if let Some(bytes) = parse_var(&get, "MAX_UPLOAD_BYTES")? {
            config.max_upload_bytes = bytes;
        }
        if let Some(header) = get("AUTH_USER_HEADER") {
            config.auth_user_header = header.to_ascii_lowercase();
        }
        Ok(config)
    }
}

fn parse_var<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.parse::<T>()
                .with_context(|| format!("invalid value for {key}: {raw:?}"))
        })
        .transpose()
}

fn default_data_dir() -> PathBuf {
    let mut base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    base.push("pixelforge");
    base.push("records");
    base
}
