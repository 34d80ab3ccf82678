use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use tokio::process::Command;

use crate::FfmpegError;

pub const TARGET_I: f64 = -16.0;
pub const TARGET_TP: f64 = -1.5;
pub const TARGET_LRA: f64 = 11.0;

/// Measurements reported by the loudnorm filter's analysis pass. ffmpeg
/// emits the values as JSON strings, so they stay strings until they are
/// fed back into the correction filter.
#[derive(Debug, Clone, Deserialize)]
pub struct LoudnessMeasurement {
    pub input_i: String,
    pub input_tp: String,
    pub input_lra: String,
    pub input_thresh: String,
    pub target_offset: String,
}

fn loudnorm_target() -> String {
    format!("loudnorm=I={TARGET_I}:TP={TARGET_TP}:LRA={TARGET_LRA}")
}

pub fn build_measure_command(input: &Path) -> Command {
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-hide_banner")
        .arg("-i")
        .arg(input)
        .arg("-af")
        .arg(format!("{}:print_format=json", loudnorm_target()))
        .arg("-f")
        .arg("null")
        .arg("-");

    cmd
}

pub fn build_correct_command(
    input: &Path,
    measurement: &LoudnessMeasurement,
    output: &Path,
) -> Command {
    let filter = format!(
        "{}:measured_I={}:measured_TP={}:measured_LRA={}:measured_thresh={}:offset={}:linear=true",
        loudnorm_target(),
        measurement.input_i,
        measurement.input_tp,
        measurement.input_lra,
        measurement.input_thresh,
        measurement.target_offset,
    );

    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-hide_banner")
        .arg("-i")
        .arg(input)
        .arg("-af")
        .arg(filter)
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

/// Extracts the loudnorm JSON block from the analysis pass stderr.
pub fn parse_measurement(stderr: &str) -> Result<LoudnessMeasurement, FfmpegError> {
    // The JSON block is the last {...} group ffmpeg prints, after the
    // "[Parsed_loudnorm ...]" banner line.
    let re = Regex::new(r"(?s)\{[^{}]*\}")
        .map_err(|e| FfmpegError::Parse(e.to_string()))?;

    let block = re
        .find_iter(stderr)
        .last()
        .ok_or_else(|| FfmpegError::Parse("no loudnorm json in output".to_string()))?;

    serde_json::from_str(block.as_str())
        .map_err(|e| FfmpegError::Parse(format!("loudnorm json: {e}")))
}

/// Two-pass loudness normalization: measure, then correct linearly from
/// the measurements.
#[tracing::instrument(skip(input, output))]
pub async fn normalize(input: &Path, output: &Path) -> Result<(), FfmpegError> {
    let measure_output = crate::run(build_measure_command(input)).await?;
    let stderr = String::from_utf8_lossy(&measure_output.stderr);

    let measurement = parse_measurement(&stderr)?;
    tracing::debug!("loudnorm measurement: {:?}", measurement);

    crate::run(build_correct_command(input, &measurement, output)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use std::path::Path;

    use super::{build_correct_command, build_measure_command, parse_measurement};

    const SAMPLE_STDERR: &str = r#"
[Parsed_loudnorm_0 @ 0x5596fa3fd900]
{
    "input_i" : "-23.62",
    "input_tp" : "-6.85",
    "input_lra" : "18.06",
    "input_thresh" : "-34.52",
    "output_i" : "-16.02",
    "output_tp" : "-1.50",
    "output_lra" : "11.00",
    "output_thresh" : "-26.92",
    "normalization_type" : "dynamic",
    "target_offset" : "0.02"
}
"#;

    #[test]
    fn parses_measurement_block() {
        let m = parse_measurement(SAMPLE_STDERR).unwrap();
        assert_eq!(m.input_i, "-23.62");
        assert_eq!(m.input_tp, "-6.85");
        assert_eq!(m.input_lra, "18.06");
        assert_eq!(m.input_thresh, "-34.52");
        assert_eq!(m.target_offset, "0.02");
    }

    #[test]
    fn missing_block_is_an_error() {
        assert!(parse_measurement("frame=  100 fps=0.0").is_err());
    }

    #[test]
    fn correction_feeds_measurements_back() {
        let m = parse_measurement(SAMPLE_STDERR).unwrap();
        let cmd = build_correct_command(
            Path::new("raw.mp3"),
            &m,
            Path::new("digest.mp3"),
        );

        assert_eq!(
            cmd.as_std()
                .get_args()
                .map(|x| x.to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join(" "),
            "-hide_banner -i raw.mp3 -af loudnorm=I=-16:TP=-1.5:LRA=11:measured_I=-23.62:measured_TP=-6.85:measured_LRA=18.06:measured_thresh=-34.52:offset=0.02:linear=true -ar 44100 -ac 2 -codec:a libmp3lame -b:a 192k -y digest.mp3"
        );
    }

    #[test]
    fn measure_pass_discards_audio() {
        let cmd = build_measure_command(Path::new("raw.mp3"));
        let args = cmd
            .as_std()
            .get_args()
            .map(|x| x.to_string_lossy().to_string())
            .collect::<Vec<_>>();
        assert!(args.contains(&"null".to_string()));
        assert!(args.last() == Some(&"-".to_string()));
    }
}
