use thiserror::Error;

use types::{NarrationDepth, NarrationKind};

/// Fixed token separating the scripts in the LLM response.
pub const SCRIPT_DELIMITER: &str = "=====";

/// Spoken-word rate used to estimate narration length when the TTS
/// provider does not report a duration.
pub const WORDS_PER_SECOND: f64 = 2.5;

#[derive(Error, Debug)]
#[error("missing-narration")]
pub struct MissingNarration;

/// Context the prompt gives the model about one clip.
#[derive(Debug, Clone)]
pub struct ClipContext {
    pub podcast_title: String,
    pub episode_title: String,
}

/// Sentence budgets per script slot for a narration depth.
pub fn sentence_budget(depth: NarrationDepth, kind: NarrationKind) -> &'static str {
    match (depth, kind) {
        (NarrationDepth::Brief, NarrationKind::Intro) => "2-3 sentences",
        (NarrationDepth::Brief, NarrationKind::Transition) => "1-2 sentences",
        (NarrationDepth::Brief, NarrationKind::Outro) => "1-2 sentences",
        (NarrationDepth::Standard, NarrationKind::Intro) => "4-6 sentences",
        (NarrationDepth::Standard, NarrationKind::Transition) => "2-4 sentences",
        (NarrationDepth::Standard, NarrationKind::Outro) => "2-4 sentences",
        (NarrationDepth::Detailed, NarrationKind::Intro) => "6-8 sentences",
        (NarrationDepth::Detailed, NarrationKind::Transition) => "4-6 sentences",
        (NarrationDepth::Detailed, NarrationKind::Outro) => "4-6 sentences",
    }
}

/// Builds the single prompt that asks for all N+2 scripts at once,
/// delimiter-separated: intro, one transition per clip, outro.
pub fn build_prompt(depth: NarrationDepth, clips: &[ClipContext]) -> String {
    let mut prompt = format!(
        "Write the narrator scripts for a weekly podcast digest with {} clips.\n\
Return exactly {} scripts separated by a line containing only `{SCRIPT_DELIMITER}`, \
in this order: the intro ({}), one transition per clip ({} each), and the outro ({}).\n\
Do not number the scripts or add headings; every script is plain spoken prose.\n\n\
Clips, in airing order:\n",
        clips.len(),
        clips.len() + 2,
        sentence_budget(depth, NarrationKind::Intro),
        sentence_budget(depth, NarrationKind::Transition),
        sentence_budget(depth, NarrationKind::Outro),
    );

    for (i, clip) in clips.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. \"{}\" from {}\n",
            i + 1,
            clip.episode_title,
            clip.podcast_title
        ));
    }

    prompt
}

/// Splits the LLM response on the delimiter and validates that exactly
/// `clip_count + 2` non-empty scripts came back.
pub fn split_scripts(response: &str, clip_count: usize) -> Result<Vec<String>, MissingNarration> {
    let parts: Vec<String> = response
        .split(SCRIPT_DELIMITER)
        .map(|part| part.trim().to_string())
        .collect();

    if parts.len() != clip_count + 2 || parts.iter().any(String::is_empty) {
        return Err(MissingNarration);
    }

    Ok(parts)
}

/// Position → script slot mapping: 0 is the intro, 1..=N the transitions,
/// N+1 the outro.
pub fn kind_for_position(position: usize, clip_count: usize) -> NarrationKind {
    if position == 0 {
        NarrationKind::Intro
    } else if position <= clip_count {
        NarrationKind::Transition
    } else {
        NarrationKind::Outro
    }
}

/// Fallback duration estimate at ~2.5 words per second.
pub fn estimate_duration_sec(script: &str) -> f64 {
    let words = script.split_whitespace().count();
    words as f64 / WORDS_PER_SECOND
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn splits_exactly_n_plus_two_scripts() {
        let response = "Welcome to your digest.\n=====\nFirst up, a clip.\n=====\nNext one.\n=====\nThat's all for this week.";

        let scripts = split_scripts(response, 2).unwrap();
        assert_eq!(scripts.len(), 4);
        assert_eq!(scripts[0], "Welcome to your digest.");
        assert_eq!(scripts[3], "That's all for this week.");
    }

    #[test]
    fn wrong_count_or_empty_part_is_missing_narration() {
        assert!(split_scripts("only one script", 2).is_err());
        assert!(split_scripts("a\n=====\n\n=====\nb\n=====\nc", 2).is_err());
    }

    #[test]
    fn positions_map_to_kinds() {
        assert_eq!(kind_for_position(0, 3), types::NarrationKind::Intro);
        assert_eq!(kind_for_position(1, 3), types::NarrationKind::Transition);
        assert_eq!(kind_for_position(3, 3), types::NarrationKind::Transition);
        assert_eq!(kind_for_position(4, 3), types::NarrationKind::Outro);
    }

    #[test]
    fn duration_estimate_uses_spoken_word_rate() {
        let script = "one two three four five six seven eight nine ten";
        assert!((estimate_duration_sec(script) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn prompt_names_every_clip_and_the_budgets() {
        let clips = vec![
            ClipContext {
                podcast_title: "Deep Dives".to_string(),
                episode_title: "On Focus".to_string(),
            },
            ClipContext {
                podcast_title: "The Startup Hour".to_string(),
                episode_title: "Pricing 101".to_string(),
            },
        ];

        let prompt = build_prompt(types::NarrationDepth::Standard, &clips);

        assert!(prompt.contains("exactly 4 scripts"));
        assert!(prompt.contains("4-6 sentences"));
        assert!(prompt.contains("\"On Focus\" from Deep Dives"));
        assert!(prompt.contains("\"Pricing 101\" from The Startup Hour"));
    }
}
