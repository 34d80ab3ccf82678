pub mod clip;
pub mod concat;
pub mod loudness;
pub mod probe;
pub mod stinger;
pub mod tag;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FfmpegError {
    #[error("ffmpeg io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ffmpeg exited with status {status}: {stderr}")]
    CommandFailed {
        status: i32,
        stderr: String,
    },
    #[error("failed to parse ffmpeg output: {0}")]
    Parse(String),
}

/// Runs a prepared ffmpeg/ffprobe command to completion, collecting stderr
/// for diagnostics.
pub(crate) async fn run(
    mut command: tokio::process::Command,
) -> Result<std::process::Output, FfmpegError> {
    let output = command.output().await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        tracing::error!("ffmpeg error: {}", stderr);
        return Err(FfmpegError::CommandFailed {
            status: output.status.code().unwrap_or(-1),
            stderr,
        });
    }

    Ok(output)
}
