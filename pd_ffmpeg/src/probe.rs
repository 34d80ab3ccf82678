use std::path::Path;

use tokio::process::Command;

use crate::FfmpegError;

/// Probes an audio file for its duration in seconds.
pub async fn duration(path: &Path) -> Result<f64, FfmpegError> {
    let output = crate::run(probe_command(path)).await?;

    let stdout = String::from_utf8_lossy(&output.stdout);

    stdout
        .trim()
        .parse::<f64>()
        .map_err(|e| FfmpegError::Parse(format!("ffprobe duration: {e}")))
}

fn probe_command(path: &Path) -> Command {
    let mut cmd = Command::new("ffprobe");
    cmd.arg("-v")
        .arg("error")
        .arg("-show_entries")
        .arg("format=duration")
        .arg("-of")
        .arg("default=noprint_wrappers=1:nokey=1")
        .arg(path);

    cmd
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::probe_command;

    #[test]
    fn probes_format_duration_only() {
        let cmd = probe_command(Path::new("digest.mp3"));
        let args = cmd
            .as_std()
            .get_args()
            .map(|x| x.to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(
            args,
            "-v error -show_entries format=duration -of default=noprint_wrappers=1:nokey=1 digest.mp3"
        );
    }
}
