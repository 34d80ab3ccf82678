use std::path::Path;

use tokio::process::Command;

use crate::FfmpegError;

#[derive(Debug, Clone)]
pub struct Id3Tags {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub genre: String,
    pub year: i32,
}

pub fn build_tag_command(input: &Path, tags: &Id3Tags, output: &Path) -> Command {
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-hide_banner")
        .arg("-i")
        .arg(input)
        // the audio is already rendered; tagging must not re-encode
        .arg("-c")
        .arg("copy")
        .arg("-metadata")
        .arg(format!("title={}", tags.title))
        .arg("-metadata")
        .arg(format!("artist={}", tags.artist))
        .arg("-metadata")
        .arg(format!("album={}", tags.album))
        .arg("-metadata")
        .arg(format!("genre={}", tags.genre))
        .arg("-metadata")
        .arg(format!("date={}", tags.year))
        .arg("-y")
        .arg(output);

    cmd
}

pub async fn write_tags(
    input: &Path,
    tags: &Id3Tags,
    output: &Path,
) -> Result<(), FfmpegError> {
    crate::run(build_tag_command(input, tags, output)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use std::path::Path;

    use super::{build_tag_command, Id3Tags};

    #[test]
    fn tags_without_re_encoding() {
        let tags = Id3Tags {
            title: "Your Weekly Digest".to_string(),
            artist: "PodDigest".to_string(),
            album: "Weekly Digests".to_string(),
            genre: "Podcast".to_string(),
            year: 2026,
        };

        let cmd = build_tag_command(
            Path::new("normalized.mp3"),
            &tags,
            Path::new("digest.mp3"),
        );

        assert_eq!(
            cmd.as_std()
                .get_args()
                .map(|x| x.to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join(" "),
            "-hide_banner -i normalized.mp3 -c copy -metadata title=Your Weekly Digest -metadata artist=PodDigest -metadata album=Weekly Digests -metadata genre=Podcast -metadata date=2026 -y digest.mp3"
        );
    }
}
