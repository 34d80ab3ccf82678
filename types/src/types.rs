use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How strongly a user wants a subscribed podcast represented in digests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionPriority {
    Must,

    Preferred,

    Nice,
}

impl SubscriptionPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionPriority::Must => "must",
            SubscriptionPriority::Preferred => "preferred",
            SubscriptionPriority::Nice => "nice",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "must" => Some(SubscriptionPriority::Must),
            "preferred" => Some(SubscriptionPriority::Preferred),
            "nice" => Some(SubscriptionPriority::Nice),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptStatus {
    Pending,

    Processing,

    Completed,

    Failed,
}

impl TranscriptStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TranscriptStatus::Pending => "pending",
            TranscriptStatus::Processing => "processing",
            TranscriptStatus::Completed => "completed",
            TranscriptStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TranscriptStatus::Pending),
            "processing" => Some(TranscriptStatus::Processing),
            "completed" => Some(TranscriptStatus::Completed),
            "failed" => Some(TranscriptStatus::Failed),
            _ => None,
        }
    }
}

/// Lifecycle of one digest production run. Transitions follow the stage
/// order; any state may move to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestStatus {
    Pending,

    Crawling,

    Transcribing,

    Analyzing,

    Narrating,

    Assembling,

    Delivering,

    Completed,

    Failed,
}

impl DigestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DigestStatus::Pending => "pending",
            DigestStatus::Crawling => "crawling",
            DigestStatus::Transcribing => "transcribing",
            DigestStatus::Analyzing => "analyzing",
            DigestStatus::Narrating => "narrating",
            DigestStatus::Assembling => "assembling",
            DigestStatus::Delivering => "delivering",
            DigestStatus::Completed => "completed",
            DigestStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DigestStatus::Pending),
            "crawling" => Some(DigestStatus::Crawling),
            "transcribing" => Some(DigestStatus::Transcribing),
            "analyzing" => Some(DigestStatus::Analyzing),
            "narrating" => Some(DigestStatus::Narrating),
            "assembling" => Some(DigestStatus::Assembling),
            "delivering" => Some(DigestStatus::Delivering),
            "completed" => Some(DigestStatus::Completed),
            "failed" => Some(DigestStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DigestStatus::Completed | DigestStatus::Failed)
    }

    /// Index in the pending → completed progression, used to reject
    /// status regressions. `Failed` is reachable from anywhere.
    pub fn stage_index(self) -> Option<usize> {
        match self {
            DigestStatus::Pending => Some(0),
            DigestStatus::Crawling => Some(1),
            DigestStatus::Transcribing => Some(2),
            DigestStatus::Analyzing => Some(3),
            DigestStatus::Narrating => Some(4),
            DigestStatus::Assembling => Some(5),
            DigestStatus::Delivering => Some(6),
            DigestStatus::Completed => Some(7),
            DigestStatus::Failed => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipLengthPreference {
    Short,

    Medium,

    Long,

    Mixed,
}

impl ClipLengthPreference {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "short" => Some(ClipLengthPreference::Short),
            "medium" => Some(ClipLengthPreference::Medium),
            "long" => Some(ClipLengthPreference::Long),
            "mixed" => Some(ClipLengthPreference::Mixed),
            _ => None,
        }
    }

    /// [lo, hi] clip length range in seconds.
    pub fn length_range(self) -> (f64, f64) {
        match self {
            ClipLengthPreference::Short => (120.0, 240.0),
            ClipLengthPreference::Medium => (240.0, 480.0),
            ClipLengthPreference::Long => (480.0, 900.0),
            ClipLengthPreference::Mixed => (120.0, 900.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestStructure {
    ByScore,

    ByShow,

    ByTopic,

    Chronological,
}

impl DigestStructure {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "by_score" => Some(DigestStructure::ByScore),
            "by_show" => Some(DigestStructure::ByShow),
            "by_topic" => Some(DigestStructure::ByTopic),
            "chronological" => Some(DigestStructure::Chronological),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrationDepth {
    Brief,

    Standard,

    Detailed,
}

impl NarrationDepth {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "brief" => Some(NarrationDepth::Brief),
            "standard" => Some(NarrationDepth::Standard),
            "detailed" => Some(NarrationDepth::Detailed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionStyle {
    Stinger,

    SoftFade,

    Whoosh,

    Silence,
}

impl TransitionStyle {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "stinger" => Some(TransitionStyle::Stinger),
            "soft_fade" => Some(TransitionStyle::SoftFade),
            "whoosh" => Some(TransitionStyle::Whoosh),
            "silence" => Some(TransitionStyle::Silence),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    Syndication,

    Push,

    Email,

    InApp,
}

impl DeliveryMethod {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "syndication" => Some(DeliveryMethod::Syndication),
            "push" => Some(DeliveryMethod::Push),
            "email" => Some(DeliveryMethod::Email),
            "in_app" => Some(DeliveryMethod::InApp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackTag {
    Up,

    Down,
}

/// One diarized span of a transcript. Timestamps are seconds from the
/// start of the episode and are non-decreasing across the segment list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start_sec: f64,

    pub end_sec: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker_tag: Option<String>,

    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,

    pub start_sec: f64,

    pub end_sec: f64,
}

/// The five scoring dimensions of a candidate region, each clamped to
/// [0, 100] at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreDimensions {
    pub insight_density: u8,

    pub emotional_intensity: u8,

    pub actionability: u8,

    pub topical_relevance: u8,

    pub conversational_quality: u8,
}

impl ScoreDimensions {
    pub fn new(
        insight_density: i64,
        emotional_intensity: i64,
        actionability: i64,
        topical_relevance: i64,
        conversational_quality: i64,
    ) -> Self {
        let clamp = |v: i64| v.clamp(0, 100) as u8;

        Self {
            insight_density: clamp(insight_density),
            emotional_intensity: clamp(emotional_intensity),
            actionability: clamp(actionability),
            topical_relevance: clamp(topical_relevance),
            conversational_quality: clamp(conversational_quality),
        }
    }

    /// Weighted composite in [0, 100]:
    /// 0.25·insight + 0.20·emotion + 0.20·action + 0.20·relevance + 0.15·quality.
    pub fn weighted_score(&self) -> f64 {
        0.25 * f64::from(self.insight_density)
            + 0.20 * f64::from(self.emotional_intensity)
            + 0.20 * f64::from(self.actionability)
            + 0.20 * f64::from(self.topical_relevance)
            + 0.15 * f64::from(self.conversational_quality)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrationKind {
    Intro,

    Transition,

    Outro,
}

impl NarrationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NarrationKind::Intro => "intro",
            NarrationKind::Transition => "transition",
            NarrationKind::Outro => "outro",
        }
    }
}

/// A synthesized narration file, stored in the object store at
/// `digests/{digest_id}/narration/{position}-{kind}.mp3`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationAudio {
    pub position: u32,

    pub kind: NarrationKind,

    pub object_key: String,

    pub duration_sec: f64,
}

pub const QUEUE_CRAWL: &str = "crawl";
pub const QUEUE_TRANSCRIBE: &str = "transcribe";
pub const QUEUE_ANALYZE: &str = "analyze";
pub const QUEUE_NARRATE: &str = "narrate";
pub const QUEUE_ASSEMBLE: &str = "assemble";
pub const QUEUE_DELIVER: &str = "deliver";
pub const QUEUE_PIPELINE: &str = "pipeline";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlJob {
    pub digest_id: Uuid,

    pub user_id: Uuid,

    pub config_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscribeJob {
    pub digest_id: Uuid,

    pub episode_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeJob {
    pub digest_id: Uuid,

    pub episode_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrateJob {
    pub digest_id: Uuid,

    pub clip_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembleJob {
    pub digest_id: Uuid,

    pub narration_audios: Vec<NarrationAudio>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliverJob {
    pub digest_id: Uuid,
}

/// Week window covered by a digest run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeekWindow {
    pub week_start: DateTime<Utc>,

    pub week_end: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_are_clamped() {
        let dims = ScoreDimensions::new(250, -3, 50, 100, 0);
        assert_eq!(dims.insight_density, 100);
        assert_eq!(dims.emotional_intensity, 0);
        assert_eq!(dims.actionability, 50);
    }

    #[test]
    fn weighted_score_uses_spec_weights() {
        let dims = ScoreDimensions::new(80, 70, 60, 50, 40);
        let expected = 0.25 * 80.0 + 0.20 * 70.0 + 0.20 * 60.0 + 0.20 * 50.0 + 0.15 * 40.0;
        assert!((dims.weighted_score() - expected).abs() < 1e-9);
    }

    #[test]
    fn status_round_trips_and_orders() {
        for status in [
            DigestStatus::Pending,
            DigestStatus::Crawling,
            DigestStatus::Transcribing,
            DigestStatus::Analyzing,
            DigestStatus::Narrating,
            DigestStatus::Assembling,
            DigestStatus::Delivering,
            DigestStatus::Completed,
            DigestStatus::Failed,
        ] {
            assert_eq!(DigestStatus::from_str(status.as_str()), Some(status));
        }

        assert!(DigestStatus::Crawling.stage_index() < DigestStatus::Analyzing.stage_index());
        assert!(DigestStatus::Completed.is_terminal());
        assert!(DigestStatus::Failed.is_terminal());
        assert!(!DigestStatus::Delivering.is_terminal());
    }

    #[test]
    fn clip_length_ranges() {
        assert_eq!(ClipLengthPreference::Short.length_range(), (120.0, 240.0));
        assert_eq!(ClipLengthPreference::Mixed.length_range(), (120.0, 900.0));
    }
}
