use diesel::prelude::*;
use uuid::Uuid;

use types::{
    Chapter, ClipLengthPreference, DeliveryMethod, DigestStatus, DigestStructure,
    NarrationDepth, ScoreDimensions, SubscriptionPriority, TranscriptSegment,
    TranscriptStatus, TransitionStyle,
};

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::podcasts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Podcast {
    pub id: Uuid,
    pub title: String,
    pub author: Option<String>,
    pub feed_url: String,
    pub artwork_url: Option<String>,
    pub external_id: Option<String>,
    pub last_crawled_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::subscriptions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub podcast_id: Uuid,
    pub priority: String,
    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Subscription {
    pub fn priority(&self) -> Option<SubscriptionPriority> {
        SubscriptionPriority::from_str(&self.priority)
    }
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::episodes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Episode {
    pub id: Uuid,
    pub podcast_id: Uuid,
    pub title: String,
    pub audio_url: String,
    pub published_at: Option<chrono::DateTime<chrono::Utc>>,
    pub duration_sec: Option<i32>,
    pub guid: String,
    pub transcript_status: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Episode {
    pub fn transcript_status(&self) -> Option<TranscriptStatus> {
        TranscriptStatus::from_str(&self.transcript_status)
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::episodes)]
pub struct NewEpisode {
    pub podcast_id: Uuid,
    pub title: String,
    pub audio_url: String,
    pub published_at: Option<chrono::DateTime<chrono::Utc>>,
    pub duration_sec: Option<i32>,
    pub guid: String,
    pub transcript_status: String,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::transcripts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Transcript {
    pub id: Uuid,
    pub episode_id: Uuid,
    pub full_text: String,
    pub segments: serde_json::Value,
    pub language: Option<String>,
    pub status: String,
    pub error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Transcript {
    pub fn segments(&self) -> Vec<TranscriptSegment> {
        serde_json::from_value(self.segments.clone()).unwrap_or_default()
    }
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::digest_configs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DigestConfig {
    pub id: Uuid,
    pub user_id: Uuid,
    pub target_length_minutes: i32,
    pub clip_length_preference: String,
    pub structure: String,
    pub breadth_depth: i32,
    pub voice_id: String,
    pub narration_depth: String,
    pub music_style: Option<String>,
    pub transition_style: String,
    pub delivery_day: String,
    pub delivery_time: String,
    pub delivery_method: String,
    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl DigestConfig {
    pub fn clip_length_preference(&self) -> ClipLengthPreference {
        ClipLengthPreference::from_str(&self.clip_length_preference)
            .unwrap_or(ClipLengthPreference::Mixed)
    }

    pub fn structure(&self) -> DigestStructure {
        DigestStructure::from_str(&self.structure).unwrap_or(DigestStructure::ByScore)
    }

    pub fn narration_depth(&self) -> NarrationDepth {
        NarrationDepth::from_str(&self.narration_depth).unwrap_or(NarrationDepth::Standard)
    }

    pub fn transition_style(&self) -> TransitionStyle {
        TransitionStyle::from_str(&self.transition_style).unwrap_or(TransitionStyle::Silence)
    }

    pub fn delivery_method(&self) -> DeliveryMethod {
        DeliveryMethod::from_str(&self.delivery_method).unwrap_or(DeliveryMethod::Syndication)
    }

    /// `delivery_time` is `HH:MM`; scheduling compares the hour only.
    pub fn delivery_hour(&self) -> Option<u32> {
        self.delivery_time
            .split(':')
            .next()
            .and_then(|h| h.parse::<u32>().ok())
            .filter(|h| *h < 24)
    }
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::digests)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Digest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub config_id: Uuid,
    pub title: String,
    pub week_start: chrono::DateTime<chrono::Utc>,
    pub week_end: chrono::DateTime<chrono::Utc>,
    pub audio_object_key: Option<String>,
    pub total_duration_sec: Option<f64>,
    pub clip_count: i32,
    pub chapters: Option<serde_json::Value>,
    pub status: String,
    pub error: Option<String>,
    pub version: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Digest {
    pub fn status(&self) -> DigestStatus {
        DigestStatus::from_str(&self.status).unwrap_or(DigestStatus::Failed)
    }

    pub fn chapters(&self) -> Vec<Chapter> {
        self.chapters
            .clone()
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::digest_clips)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DigestClip {
    pub id: Uuid,
    pub digest_id: Uuid,
    pub episode_id: Uuid,
    pub start_sec: f64,
    pub end_sec: f64,
    pub score: f64,
    pub score_dimensions: serde_json::Value,
    pub position: i32,
    pub feedback_tag: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl DigestClip {
    pub fn duration_sec(&self) -> f64 {
        self.end_sec - self.start_sec
    }

    pub fn score_dimensions(&self) -> Option<ScoreDimensions> {
        serde_json::from_value(self.score_dimensions.clone()).ok()
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::digest_clips)]
pub struct NewDigestClip {
    pub digest_id: Uuid,
    pub episode_id: Uuid,
    pub start_sec: f64,
    pub end_sec: f64,
    pub score: f64,
    pub score_dimensions: serde_json::Value,
    pub position: i32,
}
