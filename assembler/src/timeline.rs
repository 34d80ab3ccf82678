use std::path::PathBuf;

use types::{Chapter, TransitionStyle};

/// Inter-segment gap for the silence transition style: one 500 ms pad.
pub const SILENCE_GAP_SEC: f64 = 0.5;

/// Inter-segment gap for the bumper styles (stinger/softFade/whoosh):
/// 150 ms silence + 300 ms stinger + 150 ms silence.
pub const BUMPER_GAP_SEC: f64 = 0.6;

pub const BUMPER_PAD_SEC: f64 = 0.15;

pub fn gap_for(style: TransitionStyle) -> f64 {
    match style {
        TransitionStyle::Silence => SILENCE_GAP_SEC,
        _ => BUMPER_GAP_SEC,
    }
}

/// One atomic input to the concat step, in playlist order, with the
/// duration its rendered file probes at.
#[derive(Debug, Clone)]
pub struct PlannedSegment {
    pub path: PathBuf,
    pub duration_sec: f64,
    /// Chapter title when the segment is a clip; narration segments do
    /// not become chapters.
    pub chapter_title: Option<String>,
}

/// The gap files inserted between adjacent segments.
#[derive(Debug, Clone)]
pub enum GapFiles {
    /// silence style: one half-second pad
    Silence { pad: PathBuf },
    /// bumper styles: pad + stinger + pad
    Bumper { pad: PathBuf, stinger: PathBuf },
}

/// Expands the ordered segments into the full concat playlist with gap
/// files between each adjacent pair.
pub fn build_playlist(segments: &[PlannedSegment], gaps: &GapFiles) -> Vec<PathBuf> {
    let mut playlist = Vec::new();

    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            match gaps {
                GapFiles::Silence { pad } => playlist.push(pad.clone()),
                GapFiles::Bumper { pad, stinger } => {
                    playlist.push(pad.clone());
                    playlist.push(stinger.clone());
                    playlist.push(pad.clone());
                }
            }
        }
        playlist.push(segment.path.clone());
    }

    playlist
}

/// Computes the chapter index analytically: segment durations plus one
/// inter-segment gap between each adjacent pair. Only clip segments emit
/// chapters. Returns the chapters and the analytic total duration.
pub fn plan_chapters(segments: &[PlannedSegment], gap_sec: f64) -> (Vec<Chapter>, f64) {
    let mut chapters = Vec::new();
    let mut cursor = 0.0;

    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            cursor += gap_sec;
        }

        if let Some(title) = &segment.chapter_title {
            chapters.push(Chapter {
                title: title.clone(),
                start_sec: cursor,
                end_sec: cursor + segment.duration_sec,
            });
        }

        cursor += segment.duration_sec;
    }

    (chapters, cursor)
}

/// `"{podcast}: {episode}"`, ellipsis-truncated to 80 characters.
pub fn chapter_title(podcast_title: &str, episode_title: &str) -> String {
    types::truncate_with_ellipsis(&format!("{podcast_title}: {episode_title}"), 80)
}

/// The rendered file's probed duration wins over the analytic total; the
/// final chapter is clamped to it.
pub fn clamp_final_chapter(chapters: &mut [Chapter], probed_duration_sec: f64) {
    if let Some(last) = chapters.last_mut() {
        if last.end_sec > probed_duration_sec {
            last.end_sec = probed_duration_sec;
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn narration(duration_sec: f64) -> PlannedSegment {
        PlannedSegment {
            path: PathBuf::from(format!("n-{duration_sec}.mp3")),
            duration_sec,
            chapter_title: None,
        }
    }

    fn clip(duration_sec: f64, title: &str) -> PlannedSegment {
        PlannedSegment {
            path: PathBuf::from(format!("c-{duration_sec}.mp3")),
            duration_sec,
            chapter_title: Some(title.to_string()),
        }
    }

    #[test]
    fn gap_depends_on_transition_style() {
        assert_eq!(gap_for(TransitionStyle::Silence), 0.5);
        assert_eq!(gap_for(TransitionStyle::SoftFade), 0.6);
        assert_eq!(gap_for(TransitionStyle::Stinger), 0.6);
        assert_eq!(gap_for(TransitionStyle::Whoosh), 0.6);
    }

    #[test]
    fn chapter_timing_for_soft_fade_digest() {
        // three clips [300, 240, 180], narrations [20, 30, 28, 32, 18],
        // bumper gap 0.6 s
        let segments = vec![
            narration(20.0),
            narration(30.0),
            clip(300.0, "Show A: Ep 1"),
            narration(28.0),
            clip(240.0, "Show B: Ep 2"),
            narration(32.0),
            clip(180.0, "Show C: Ep 3"),
            narration(18.0),
        ];

        let (chapters, total) = plan_chapters(&segments, BUMPER_GAP_SEC);

        assert!((total - 852.2).abs() < 1e-9);
        assert_eq!(chapters.len(), 3);
        assert!((chapters[0].start_sec - 51.2).abs() < 1e-9);
        assert!((chapters[0].end_sec - 351.2).abs() < 1e-9);
        // chapters are emitted in order with non-decreasing starts
        assert!(chapters[0].start_sec <= chapters[1].start_sec);
        assert!(chapters[1].start_sec <= chapters[2].start_sec);
    }

    #[test]
    fn probed_duration_clamps_the_final_chapter() {
        let segments = vec![narration(10.0), clip(100.0, "Show: Ep")];
        let (mut chapters, total) = plan_chapters(&segments, SILENCE_GAP_SEC);

        assert!((total - 110.5).abs() < 1e-9);

        clamp_final_chapter(&mut chapters, 110.2);
        assert!((chapters[0].end_sec - 110.2).abs() < 1e-9);

        // a longer probe leaves the analytic end alone
        clamp_final_chapter(&mut chapters, 200.0);
        assert!((chapters[0].end_sec - 110.2).abs() < 1e-9);
    }

    #[test]
    fn silence_playlist_has_single_pads() {
        let segments = vec![narration(10.0), clip(100.0, "t"), narration(5.0)];
        let gaps = GapFiles::Silence {
            pad: PathBuf::from("pad.mp3"),
        };

        let playlist = build_playlist(&segments, &gaps);
        let names: Vec<_> = playlist
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect();

        assert_eq!(
            names,
            vec!["n-10.mp3", "pad.mp3", "c-100.mp3", "pad.mp3", "n-5.mp3"]
        );
    }

    #[test]
    fn bumper_playlist_wraps_stingers_in_pads() {
        let segments = vec![narration(10.0), clip(100.0, "t")];
        let gaps = GapFiles::Bumper {
            pad: PathBuf::from("pad.mp3"),
            stinger: PathBuf::from("stinger.mp3"),
        };

        let playlist = build_playlist(&segments, &gaps);
        let names: Vec<_> = playlist
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect();

        assert_eq!(
            names,
            vec!["n-10.mp3", "pad.mp3", "stinger.mp3", "pad.mp3", "c-100.mp3"]
        );
    }

    #[test]
    fn chapter_titles_truncate_at_eighty_chars() {
        let long_episode = "e".repeat(100);
        let title = chapter_title("Some Podcast", &long_episode);
        assert_eq!(title.chars().count(), 80);
        assert!(title.starts_with("Some Podcast: "));
        assert!(title.ends_with('…'));
    }
}
