use std::collections::HashMap;

use uuid::Uuid;

use types::{ClipLengthPreference, DigestStructure, ScoreDimensions};

/// Candidates scoring below this composite are discarded before selection.
pub const MIN_SCORE: f64 = 40.0;

/// Share of the target length reserved for narration.
pub const NARRATION_RESERVE: f64 = 0.15;

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub episode_id: Uuid,
    pub start_sec: f64,
    pub end_sec: f64,
    pub dimensions: ScoreDimensions,
}

impl Candidate {
    pub fn duration_sec(&self) -> f64 {
        self.end_sec - self.start_sec
    }

    pub fn score(&self) -> f64 {
        self.dimensions.weighted_score()
    }
}

/// Derived bounds for one selection run.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionLimits {
    pub available_content_sec: f64,
    pub effective_min_sec: f64,
    pub effective_max_sec: f64,
    pub max_clips_per_episode: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct SelectionParams {
    pub target_length_minutes: u32,
    pub clip_length_preference: ClipLengthPreference,
    /// 0 = many short clips across many shows, 100 = few long deep dives.
    pub breadth_depth: u32,
}

pub fn derive_limits(params: SelectionParams) -> SelectionLimits {
    let target_sec = f64::from(params.target_length_minutes) * 60.0;
    let available_content_sec = (1.0 - NARRATION_RESERVE) * target_sec;

    let (lo, hi) = params.clip_length_preference.length_range();
    let b = f64::from(params.breadth_depth.min(100)) / 100.0;

    let effective_min_sec = lo + b * (hi - lo) * 0.3;
    let effective_max_sec = hi - (1.0 - b) * (hi - lo) * 0.3;

    let max_clips_per_episode = ((1.0 + 4.0 * b).round() as usize).max(1);

    SelectionLimits {
        available_content_sec,
        effective_min_sec,
        effective_max_sec,
        max_clips_per_episode,
    }
}

fn overlaps(a: &Candidate, b: &Candidate) -> bool {
    a.episode_id == b.episode_id && a.start_sec < b.end_sec && b.start_sec < a.end_sec
}

/// Deterministic greedy selection over the thresholded candidate set.
///
/// Candidates are visited by score descending (ties broken by start
/// ascending, then episode id) and admitted while they fit the length
/// window, the remaining content budget, the per-episode cap, and do not
/// overlap an already-chosen clip of the same episode.
pub fn select(candidates: &[Candidate], params: SelectionParams) -> Vec<Candidate> {
    let limits = derive_limits(params);

    let mut ranked: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| c.score() >= MIN_SCORE)
        .collect();

    ranked.sort_by(|a, b| {
        b.score()
            .partial_cmp(&a.score())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                a.start_sec
                    .partial_cmp(&b.start_sec)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.episode_id.cmp(&b.episode_id))
    });

    let min_duration = 0.7 * limits.effective_min_sec;
    let max_duration = 1.3 * limits.effective_max_sec;

    let mut selected: Vec<Candidate> = Vec::new();
    let mut per_episode: HashMap<Uuid, usize> = HashMap::new();
    let mut total = 0.0;

    for candidate in ranked {
        if total >= limits.available_content_sec {
            break;
        }

        let duration = candidate.duration_sec();

        if duration < min_duration || duration > max_duration {
            continue;
        }

        if total + duration > limits.available_content_sec {
            continue;
        }

        let chosen_for_episode = per_episode.get(&candidate.episode_id).copied().unwrap_or(0);
        if chosen_for_episode >= limits.max_clips_per_episode {
            continue;
        }

        if selected.iter().any(|s| overlaps(s, candidate)) {
            continue;
        }

        *per_episode.entry(candidate.episode_id).or_insert(0) += 1;
        total += duration;
        selected.push(candidate.clone());
    }

    selected
}

/// Final clip ordering, persisted as DigestClip.position.
///
/// `byTopic` is pinned to `byShow` with a score-descending inner sort
/// until real topic clustering exists.
pub fn order(
    mut selected: Vec<Candidate>,
    structure: DigestStructure,
    podcast_titles: &HashMap<Uuid, String>,
) -> Vec<Candidate> {
    let title_of = |c: &Candidate| -> String {
        podcast_titles
            .get(&c.episode_id)
            .cloned()
            .unwrap_or_default()
    };

    match structure {
        DigestStructure::ByScore => {
            selected.sort_by(|a, b| {
                b.score()
                    .partial_cmp(&a.score())
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| {
                        a.start_sec
                            .partial_cmp(&b.start_sec)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .then_with(|| a.episode_id.cmp(&b.episode_id))
            });
        }
        DigestStructure::ByShow => {
            selected.sort_by(|a, b| {
                title_of(a)
                    .cmp(&title_of(b))
                    .then_with(|| a.episode_id.cmp(&b.episode_id))
                    .then_with(|| {
                        a.start_sec
                            .partial_cmp(&b.start_sec)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
            });
        }
        DigestStructure::ByTopic => {
            selected.sort_by(|a, b| {
                title_of(a)
                    .cmp(&title_of(b))
                    .then_with(|| {
                        b.score()
                            .partial_cmp(&a.score())
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .then_with(|| a.episode_id.cmp(&b.episode_id))
            });
        }
        DigestStructure::Chronological => {
            selected.sort_by(|a, b| {
                a.episode_id.cmp(&b.episode_id).then_with(|| {
                    a.start_sec
                        .partial_cmp(&b.start_sec)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
            });
        }
    }

    selected
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn dims(score: u8) -> ScoreDimensions {
        // equal values in every dimension make the composite equal the value
        ScoreDimensions::new(
            i64::from(score),
            i64::from(score),
            i64::from(score),
            i64::from(score),
            i64::from(score),
        )
    }

    fn candidate(episode_id: Uuid, start: f64, duration: f64, score: u8) -> Candidate {
        Candidate {
            episode_id,
            start_sec: start,
            end_sec: start + duration,
            dimensions: dims(score),
        }
    }

    fn episode_ids(n: usize) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = (0..n).map(|_| Uuid::new_v4()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn limits_for_depth_dominant_config() {
        // targetLength 60, long, breadthDepth 100
        let limits = derive_limits(SelectionParams {
            target_length_minutes: 60,
            clip_length_preference: ClipLengthPreference::Long,
            breadth_depth: 100,
        });

        assert_eq!(limits.max_clips_per_episode, 5);
        assert!((limits.effective_min_sec - 606.0).abs() < 1e-9);
        assert!((limits.effective_max_sec - 900.0).abs() < 1e-9);
        assert!((limits.available_content_sec - 3060.0).abs() < 1e-9);
    }

    #[test]
    fn limits_for_breadth_dominant_config() {
        let limits = derive_limits(SelectionParams {
            target_length_minutes: 60,
            clip_length_preference: ClipLengthPreference::Mixed,
            breadth_depth: 0,
        });

        assert_eq!(limits.max_clips_per_episode, 1);
        assert!((limits.effective_min_sec - 120.0).abs() < 1e-9);
        // hi - 1.0·(hi-lo)·0.3 = 900 - 234
        assert!((limits.effective_max_sec - 666.0).abs() < 1e-9);
    }

    #[test]
    fn tight_thirty_minute_digest_by_score() {
        // 30 min target, medium clips, breadth 50: availableContent = 1530.
        // Top five candidate durations [300, 420, 260, 330, 390]; the fifth
        // would overflow, the sixth (210 s) fits.
        let ids = episode_ids(6);
        let candidates = vec![
            candidate(ids[0], 10.0, 300.0, 82),
            candidate(ids[1], 20.0, 420.0, 78),
            candidate(ids[2], 30.0, 260.0, 77),
            candidate(ids[3], 40.0, 330.0, 71),
            candidate(ids[4], 50.0, 390.0, 70),
            candidate(ids[5], 60.0, 210.0, 68),
        ];

        let params = SelectionParams {
            target_length_minutes: 30,
            clip_length_preference: ClipLengthPreference::Medium,
            breadth_depth: 50,
        };

        let selected = select(&candidates, params);

        let total: f64 = selected.iter().map(Candidate::duration_sec).sum();
        assert_eq!(selected.len(), 5);
        assert!((total - 1520.0).abs() < 1e-9);
        // the 390 s candidate (score 70) was passed over
        assert!(!selected.iter().any(|c| c.duration_sec() == 390.0));
        // score order preserved in the selection walk
        assert_eq!(selected[0].score(), 82.0);
        assert_eq!(selected[4].score(), 68.0);
    }

    #[test]
    fn breadth_zero_caps_one_clip_per_episode() {
        let ids = episode_ids(4);
        let mut candidates = Vec::new();
        for (i, id) in ids.iter().enumerate() {
            // several non-overlapping candidates per episode
            for j in 0..8 {
                candidates.push(candidate(
                    *id,
                    f64::from(j) * 400.0,
                    180.0,
                    90 - (i as u8) - j as u8,
                ));
            }
        }

        let params = SelectionParams {
            target_length_minutes: 60,
            clip_length_preference: ClipLengthPreference::Mixed,
            breadth_depth: 0,
        };

        let selected = select(&candidates, params);

        assert!(selected.len() <= 4);
        let mut seen = std::collections::HashSet::new();
        for clip in &selected {
            assert!(seen.insert(clip.episode_id), "two clips from one episode");
        }
    }

    #[test]
    fn depth_hundred_rejects_out_of_window_durations() {
        // long + breadth 100: durations outside [424.2, 1170] are rejected
        let ids = episode_ids(1);
        let candidates = vec![
            candidate(ids[0], 0.0, 420.0, 95),
            candidate(ids[0], 1000.0, 1200.0, 94),
            candidate(ids[0], 3000.0, 600.0, 80),
        ];

        let params = SelectionParams {
            target_length_minutes: 60,
            clip_length_preference: ClipLengthPreference::Long,
            breadth_depth: 100,
        };

        let selected = select(&candidates, params);

        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].duration_sec(), 600.0);
    }

    #[test]
    fn sub_threshold_candidates_are_discarded() {
        let ids = episode_ids(1);
        let candidates = vec![
            candidate(ids[0], 0.0, 300.0, 39),
            candidate(ids[0], 400.0, 300.0, 40),
        ];

        let params = SelectionParams {
            target_length_minutes: 60,
            clip_length_preference: ClipLengthPreference::Medium,
            breadth_depth: 50,
        };

        let selected = select(&candidates, params);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].start_sec, 400.0);
    }

    #[test]
    fn same_episode_overlaps_are_rejected() {
        let ids = episode_ids(1);
        let candidates = vec![
            candidate(ids[0], 0.0, 300.0, 90),
            candidate(ids[0], 100.0, 300.0, 85),
            candidate(ids[0], 300.0, 300.0, 80),
        ];

        let params = SelectionParams {
            target_length_minutes: 60,
            clip_length_preference: ClipLengthPreference::Medium,
            breadth_depth: 100,
        };

        let selected = select(&candidates, params);

        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].start_sec, 0.0);
        assert_eq!(selected[1].start_sec, 300.0);
    }

    #[test]
    fn ties_break_by_start_then_episode() {
        let ids = episode_ids(2);
        let candidates = vec![
            candidate(ids[1], 50.0, 300.0, 80),
            candidate(ids[0], 400.0, 300.0, 80),
            candidate(ids[0], 50.0, 300.0, 80),
        ];

        let params = SelectionParams {
            target_length_minutes: 120,
            clip_length_preference: ClipLengthPreference::Medium,
            breadth_depth: 100,
        };

        let selected = select(&candidates, params);

        // equal scores: start ascending first, then episode id
        assert_eq!(selected.len(), 3);
        assert_eq!(selected[0].start_sec, 50.0);
        assert_eq!(selected[0].episode_id, ids[0]);
        assert_eq!(selected[1].episode_id, ids[1]);
        assert_eq!(selected[2].start_sec, 400.0);
    }

    #[test]
    fn by_topic_equals_by_show_with_score_inner_sort() {
        let ids = episode_ids(2);
        let titles: HashMap<Uuid, String> = vec![
            (ids[0], "Beta Show".to_string()),
            (ids[1], "Alpha Show".to_string()),
        ]
        .into_iter()
        .collect();

        let selected = vec![
            candidate(ids[0], 0.0, 300.0, 90),
            candidate(ids[1], 500.0, 300.0, 70),
            candidate(ids[1], 0.0, 300.0, 85),
        ];

        let by_topic = order(selected.clone(), DigestStructure::ByTopic, &titles);

        // Alpha Show first, inner ordering score-descending
        assert_eq!(by_topic[0].episode_id, ids[1]);
        assert_eq!(by_topic[0].score(), 85.0);
        assert_eq!(by_topic[1].score(), 70.0);
        assert_eq!(by_topic[2].episode_id, ids[0]);

        // byShow shares the grouping, inner ordering by start
        let by_show = order(selected, DigestStructure::ByShow, &titles);
        assert_eq!(by_show[0].start_sec, 0.0);
        assert_eq!(by_show[1].start_sec, 500.0);
    }

    #[test]
    fn chronological_orders_by_episode_then_start() {
        let ids = episode_ids(2);
        let titles = HashMap::new();

        let selected = vec![
            candidate(ids[1], 0.0, 300.0, 95),
            candidate(ids[0], 600.0, 300.0, 50),
            candidate(ids[0], 0.0, 300.0, 40),
        ];

        let ordered = order(selected, DigestStructure::Chronological, &titles);

        assert_eq!(ordered[0].episode_id, ids[0]);
        assert_eq!(ordered[0].start_sec, 0.0);
        assert_eq!(ordered[1].start_sec, 600.0);
        assert_eq!(ordered[2].episode_id, ids[1]);
    }
}
