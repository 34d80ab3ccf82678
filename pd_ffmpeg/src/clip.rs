use std::path::Path;

use tokio::process::Command;

use crate::FfmpegError;

const FADE_IN_SEC: f64 = 0.1;
const FADE_OUT_SEC: f64 = 0.3;

/// Builds the ffmpeg command that cuts [`start_sec`, `end_sec`) out of a
/// source file, applying a 100 ms linear fade-in and a 300 ms linear
/// fade-out ending at the clip boundary.
pub fn build_extract_command(
    source: &Path,
    start_sec: f64,
    end_sec: f64,
    output: &Path,
) -> Command {
    let duration = end_sec - start_sec;
    let fade_out_start = (duration - FADE_OUT_SEC).max(0.0);

    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-hide_banner")
        .arg("-i")
        .arg(source)
        .arg("-af")
        .arg(format!(
            "atrim=start={start_sec}:end={end_sec},asetpts=PTS-STARTPTS,afade=t=in:st=0:d={FADE_IN_SEC},afade=t=out:st={fade_out_start}:d={FADE_OUT_SEC}"
        ))
        .arg("-ar")
        .arg("44100")
        .arg("-ac")
        .arg("2")
        .arg("-codec:a")
        .arg("libmp3lame")
        .arg("-b:a")
        .arg("192k")
        .arg("-y")
        .arg(output);

    cmd
}

/// Extracts one clip from a downloaded episode audio file.
#[tracing::instrument(skip(source, output))]
pub async fn extract(
    source: &Path,
    start_sec: f64,
    end_sec: f64,
    output: &Path,
) -> Result<(), FfmpegError> {
    if end_sec <= start_sec {
        return Err(FfmpegError::Parse(format!(
            "invalid clip bounds: {start_sec}..{end_sec}"
        )));
    }

    crate::run(build_extract_command(source, start_sec, end_sec, output)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use std::path::Path;

    use super::build_extract_command;

    #[test]
    fn builds_trim_and_fade_filter() {
        let cmd = build_extract_command(
            Path::new("source.mp3"),
            120.0,
            300.0,
            Path::new("clip-0.mp3"),
        );

        assert_eq!(
            cmd.as_std()
                .get_args()
                .map(|x| x.to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join(" "),
            "-hide_banner -i source.mp3 -af atrim=start=120:end=300,asetpts=PTS-STARTPTS,afade=t=in:st=0:d=0.1,afade=t=out:st=179.7:d=0.3 -ar 44100 -ac 2 -codec:a libmp3lame -b:a 192k -y clip-0.mp3"
        );
    }

    #[tokio::test]
    async fn rejects_inverted_bounds() {
        let result = super::extract(
            Path::new("source.mp3"),
            10.0,
            5.0,
            Path::new("clip.mp3"),
        )
        .await;

        assert!(result.is_err());
    }
}
