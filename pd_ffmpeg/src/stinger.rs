use std::path::Path;

use tokio::process::Command;

use crate::FfmpegError;

/// Synthesizes the 300 ms transition stinger: a short tone burst with a
/// slight vibrato, faded at both edges so the burst never clicks.
pub fn build_stinger_command(output: &Path) -> Command {
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-hide_banner")
        .arg("-f")
        .arg("lavfi")
        .arg("-i")
        .arg("sine=frequency=880:duration=0.3")
        .arg("-af")
        .arg("vibrato=f=6:d=0.4,afade=t=in:st=0:d=0.03,afade=t=out:st=0.27:d=0.03")
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

/// Synthesizes a silence pad of the given duration.
pub fn build_silence_command(duration_sec: f64, output: &Path) -> Command {
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-hide_banner")
        .arg("-f")
        .arg("lavfi")
        .arg("-i")
        .arg(format!(
            "anullsrc=r=44100:cl=stereo:d={duration_sec}"
        ))
        .arg("-codec:a")
        .arg("libmp3lame")
        .arg("-b:a")
        .arg("192k")
        .arg("-y")
        .arg(output);

    cmd
}

pub async fn synthesize_stinger(output: &Path) -> Result<(), FfmpegError> {
    crate::run(build_stinger_command(output)).await?;
    Ok(())
}

pub async fn synthesize_silence(
    duration_sec: f64,
    output: &Path,
) -> Result<(), FfmpegError> {
    crate::run(build_silence_command(duration_sec, output)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use std::path::Path;

    use super::{build_silence_command, build_stinger_command};

    #[test]
    fn stinger_is_short_vibrato_burst() {
        let cmd = build_stinger_command(Path::new("stinger.mp3"));

        assert_eq!(
            cmd.as_std()
                .get_args()
                .map(|x| x.to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join(" "),
            "-hide_banner -f lavfi -i sine=frequency=880:duration=0.3 -af vibrato=f=6:d=0.4,afade=t=in:st=0:d=0.03,afade=t=out:st=0.27:d=0.03 -ar 44100 -ac 2 -codec:a libmp3lame -b:a 192k -y stinger.mp3"
        );
    }

    #[test]
    fn silence_uses_anullsrc() {
        let cmd = build_silence_command(0.5, Path::new("pad.mp3"));

        let args = cmd
            .as_std()
            .get_args()
            .map(|x| x.to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join(" ");
        assert!(args.contains("anullsrc=r=44100:cl=stereo:d=0.5"));
    }
}
