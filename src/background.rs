use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::{
    fs,
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
    time::timeout,
};
use uuid::Uuid;

use crate::{image_processing, storage::get_extension_from_mime_type};

#[derive(Debug, Error)]
pub enum RemovalError {
    #[error("Background removal timed out after {}", describe(.0))]
    Timeout(Duration),
    #[error("Background removal failed: {0}")]
    Process(String),
    #[error("Output file was not created")]
    OutputMissing,
    #[error("Background removal I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns an image into the same image with its background made transparent.
#[async_trait]
pub trait BackgroundRemover: Send + Sync {
    async fn remove(&self, image: &[u8]) -> Result<Vec<u8>, RemovalError>;
}

/// Runs an external tool as `<program> <args...> <input> <output>`.
#[derive(Clone, Debug)]
pub struct ScriptRemover {
    program: String,
    args: Vec<String>,
    scratch_dir: PathBuf,
    timeout: Duration,
}

impl ScriptRemover {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        scratch_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            scratch_dir: scratch_dir.into(),
            timeout,
        }
    }

    /// Runs the tool once. The child is killed if it outlives the timeout, and
    /// a clean exit without `output` on disk is an error.
    pub async fn run(&self, input: &Path, output: &Path) -> Result<(), RemovalError> {
        tracing::info!(
            program = %self.program,
            input = %input.display(),
            output = %output.display(),
            "starting background removal"
        );
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(input)
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| RemovalError::Process(format!("failed to start {}: {err}", self.program)))?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, false));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, true));
        }

        match timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => {}
            Ok(Ok(status)) => {
                return Err(RemovalError::Process(format!("process exited with {status}")));
            }
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => {
                if let Err(err) = child.kill().await {
                    tracing::warn!(error = %err, "failed to kill background removal process");
                }
                return Err(RemovalError::Timeout(self.timeout));
            }
        }

        if !fs::try_exists(output).await? {
            return Err(RemovalError::OutputMissing);
        }
        tracing::info!(output = %output.display(), "background removal completed");
        Ok(())
    }
}

#[async_trait]
impl BackgroundRemover for ScriptRemover {
    async fn remove(&self, image: &[u8]) -> Result<Vec<u8>, RemovalError> {
        fs::create_dir_all(&self.scratch_dir).await?;
        let id = Uuid::new_v4();
        let ext = image_processing::detect_mime_type(image)
            .map(get_extension_from_mime_type)
            .unwrap_or("bin");
        let input = self.scratch_dir.join(format!("{id}-input.{ext}"));
        let output = self.scratch_dir.join(format!("{id}-output.png"));

        fs::write(&input, image).await?;
        let result = match self.run(&input, &output).await {
            Ok(()) => fs::read(&output).await.map_err(RemovalError::from),
            Err(err) => Err(err),
        };
        remove_quietly(&input).await;
        remove_quietly(&output).await;
        result
    }
}

async fn forward_lines<R>(reader: R, is_stderr: bool)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if is_stderr {
            tracing::warn!(target: "pixelforge::background::tool", "{line}");
        } else {
            tracing::debug!(target: "pixelforge::background::tool", "{line}");
        }
    }
}

async fn remove_quietly(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(path = %path.display(), error = %err, "failed to remove scratch file"),
    }
}

fn describe(duration: &Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        let minutes = secs / 60;
        format!("{minutes} minute{}", if minutes == 1 { "" } else { "s" })
    } else if secs > 0 {
        format!("{secs} second{}", if secs == 1 { "" } else { "s" })
    } else {
        format!("{} ms", duration.as_millis())
    }
}
