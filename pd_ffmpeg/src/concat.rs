use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::FfmpegError;

/// Writes the concat demuxer list for an ordered set of segment files.
///
/// Every path is quoted; the demuxer treats unquoted whitespace as a
/// delimiter.
pub fn concat_list_content(segments: &[PathBuf]) -> String {
    segments
        .iter()
        .map(|p| format!("file '{}'\n", p.display()))
        .collect()
}

/// Builds the ffmpeg command that renders the concat list into a single
/// 44.1 kHz stereo MP3.
pub fn build_concat_command(list_file: &Path, output: &Path) -> Command {
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-hide_banner")
        .arg("-f")
        .arg("concat")
        .arg("-safe")
        .arg("0")
        .arg("-i")
        .arg(list_file)
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

/// Concatenates the prepared segment files (narrations, clips, and gap
/// pads, already in playlist order) into one MP3.
#[tracing::instrument(skip(segments, scratch_dir, output))]
pub async fn concat(
    segments: &[PathBuf],
    scratch_dir: &Path,
    output: &Path,
) -> Result<(), FfmpegError> {
    if segments.is_empty() {
        return Err(FfmpegError::Parse("empty segment list".to_string()));
    }

    let list_file = scratch_dir.join("concat.txt");
    tokio::fs::write(&list_file, concat_list_content(segments)).await?;

    crate::run(build_concat_command(&list_file, output)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use std::path::{Path, PathBuf};

    use super::{build_concat_command, concat_list_content};

    #[test]
    fn list_preserves_order() {
        let segments = vec![
            PathBuf::from("/tmp/work/narration-0.mp3"),
            PathBuf::from("/tmp/work/gap-0.mp3"),
            PathBuf::from("/tmp/work/clip-0.mp3"),
        ];

        assert_eq!(
            concat_list_content(&segments),
            "file '/tmp/work/narration-0.mp3'\nfile '/tmp/work/gap-0.mp3'\nfile '/tmp/work/clip-0.mp3'\n"
        );
    }

    #[test]
    fn concat_re_encodes_to_digest_format() {
        let cmd = build_concat_command(
            Path::new("/tmp/work/concat.txt"),
            Path::new("/tmp/work/digest-raw.mp3"),
        );

        assert_eq!(
            cmd.as_std()
                .get_args()
                .map(|x| x.to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join(" "),
            "-hide_banner -f concat -safe 0 -i /tmp/work/concat.txt -ar 44100 -ac 2 -codec:a libmp3lame -b:a 192k -y /tmp/work/digest-raw.mp3"
        );
    }
}
