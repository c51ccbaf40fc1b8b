//! Tracing setup for the server binary.
//!
//! The level is controlled through `PIXELFORGE_LOG` using the usual
//! `EnvFilter` syntax, e.g. `PIXELFORGE_LOG=pixelforge=debug,tower_http=info`.
//! Defaults to `info`.

use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init() -> Result<()> {
    let env_filter =
        EnvFilter::try_from_env("PIXELFORGE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .try_init()
        .map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))?;

    tracing::debug!("logging initialized");
    Ok(())
}
