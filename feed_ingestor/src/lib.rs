use chrono::{DateTime, Duration, Utc};
use feed_rs::model::{Entry, Feed};
use thiserror::Error;
use uuid::Uuid;

use repository::models::Podcast;
use repository::{models::NewEpisode, Repository};
use types::TranscriptStatus;

/// Crawl fallback cap: most recent episodes across the user's active
/// subscriptions when no feed yields anything new.
const FALLBACK_EPISODE_LIMIT: i64 = 50;

/// Cutoff window used when a podcast has never been crawled.
const DEFAULT_LOOKBACK_DAYS: i64 = 7;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("no-episodes")]
    NoEpisodes,
    #[error("repository error: {0}")]
    Repository(#[from] repository::RepositoryError),
}

/// Per-feed failures never surface here; they are logged and the crawl
/// moves on to the next subscription.
#[derive(Error, Debug)]
enum FeedError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("parse failed: {0}")]
    Parse(#[from] feed_rs::parser::ParseFeedError),
    #[error("repository error: {0}")]
    Repository(#[from] repository::RepositoryError),
}

pub struct FeedIngestor {
    repo: Repository,
    http_client: reqwest::Client,
}

impl FeedIngestor {
    pub fn new(repo: Repository, http_client: reqwest::Client) -> Self {
        Self { repo, http_client }
    }

    /// Crawls every active subscription of the user, sequentially for feed
    /// politeness, and returns the episode ids a digest run should work
    /// with. Falls back to recent known episodes when nothing new appeared.
    #[tracing::instrument(skip(self))]
    pub async fn crawl_for_user(
        &self,
        user_id: Uuid,
        week_start: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, IngestError> {
        let subscriptions = self.repo.list_active_subscriptions(user_id).await?;

        let mut new_episode_ids = Vec::new();

        for (_, podcast) in &subscriptions {
            match self.crawl_feed(podcast).await {
                Ok(ids) => new_episode_ids.extend(ids),
                Err(e) => {
                    // one bad feed must not stop the crawl
                    tracing::warn!("skipping feed {}: {}", podcast.feed_url, e);
                }
            }
        }

        if !new_episode_ids.is_empty() {
            return Ok(new_episode_ids);
        }

        tracing::info!(
            "no new episodes for user {}, falling back to recent episodes",
            user_id
        );

        let fallback = self
            .repo
            .recent_episodes_since(user_id, week_start, FALLBACK_EPISODE_LIMIT)
            .await?;

        if fallback.is_empty() {
            return Err(IngestError::NoEpisodes);
        }

        Ok(fallback.into_iter().map(|e| e.id).collect())
    }

    async fn crawl_feed(&self, podcast: &Podcast) -> Result<Vec<Uuid>, FeedError> {
        let bytes = self
            .http_client
            .get(&podcast.feed_url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let feed = feed_rs::parser::parse(&bytes[..])?;

        self.refresh_podcast_meta(podcast, &feed).await?;

        let cutoff = podcast
            .last_crawled_at
            .unwrap_or_else(|| Utc::now() - Duration::days(DEFAULT_LOOKBACK_DAYS));

        let mut inserted = Vec::new();

        for entry in &feed.entries {
            let Some(new_episode) = episode_from_entry(podcast.id, entry, cutoff) else {
                continue;
            };

            if let Some(episode) = self.repo.upsert_episode(new_episode).await? {
                inserted.push(episode.id);
            }
        }

        self.repo
            .update_last_crawled(podcast.id, Utc::now())
            .await?;

        tracing::info!(
            "crawled {}: {} new episodes",
            podcast.feed_url,
            inserted.len()
        );

        Ok(inserted)
    }

    async fn refresh_podcast_meta(
        &self,
        podcast: &Podcast,
        feed: &Feed,
    ) -> Result<(), FeedError> {
        let feed_title = feed.title.as_ref().map(|t| t.content.as_str());
        let feed_author = feed.authors.first().map(|a| a.name.as_str());
        let feed_artwork = feed.logo.as_ref().map(|l| l.uri.as_str());

        let title_changed = feed_title.is_some_and(|t| t != podcast.title);
        let author_changed =
            feed_author.is_some_and(|a| podcast.author.as_deref() != Some(a));
        let artwork_changed =
            feed_artwork.is_some_and(|u| podcast.artwork_url.as_deref() != Some(u));

        if title_changed || author_changed || artwork_changed {
            self.repo
                .update_podcast_meta(
                    podcast.id,
                    title_changed.then(|| feed_title.unwrap_or_default()),
                    author_changed.then(|| feed_author.unwrap_or_default()),
                    artwork_changed.then(|| feed_artwork.unwrap_or_default()),
                )
                .await?;
        }

        Ok(())
    }
}

/// Maps a feed entry onto an insertable episode. Entries without an audio
/// enclosure or a stable guid, and entries at or before the cutoff, yield
/// `None`.
fn episode_from_entry(
    podcast_id: Uuid,
    entry: &Entry,
    cutoff: DateTime<Utc>,
) -> Option<NewEpisode> {
    let guid = entry.id.trim();
    if guid.is_empty() {
        return None;
    }

    let audio_url = pick_audio_enclosure(entry)?;

    let published_at = entry.published.or(entry.updated);
    if let Some(published) = published_at {
        if published <= cutoff {
            return None;
        }
    }

    let title = entry
        .title
        .as_ref()
        .map(|t| t.content.clone())
        .unwrap_or_else(|| "Untitled Episode".to_string());

    Some(NewEpisode {
        podcast_id,
        title,
        audio_url,
        published_at,
        duration_sec: entry_duration_sec(entry),
        guid: guid.to_string(),
        transcript_status: TranscriptStatus::Pending.as_str().to_string(),
    })
}

/// Audio enclosure of a feed entry: the media content url when it carries
/// an audio type (or an mp3 extension), otherwise an audio-typed link.
fn pick_audio_enclosure(entry: &Entry) -> Option<String> {
    let media_url = entry
        .media
        .iter()
        .flat_map(|m| m.content.iter())
        .find(|c| {
            let is_audio_type = c
                .content_type
                .as_ref()
                .is_some_and(|mime| mime.ty() == mediatype::names::AUDIO);
            let is_mp3_url = c
                .url
                .as_ref()
                .is_some_and(|u| u.path().ends_with(".mp3"));
            is_audio_type || is_mp3_url
        })
        .and_then(|c| c.url.as_ref())
        .map(|u| u.to_string());

    media_url.or_else(|| {
        entry
            .links
            .iter()
            .find(|l| {
                l.media_type
                    .as_deref()
                    .is_some_and(|t| t.starts_with("audio/"))
            })
            .map(|l| l.href.clone())
    })
}

/// Duration from the entry's media metadata, in whole seconds. The feed
/// parser already normalizes itunes duration strings; a raw text duration
/// elsewhere goes through `types::parse_duration_string`.
fn entry_duration_sec(entry: &Entry) -> Option<i32> {
    entry
        .media
        .iter()
        .find_map(|m| {
            m.duration
                .or_else(|| m.content.iter().find_map(|c| c.duration))
        })
        .map(|d| d.as_secs() as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd">
  <channel>
    <title>Example Show</title>
    <item>
      <title>Episode One</title>
      <guid isPermaLink="false">ep-1</guid>
      <pubDate>Mon, 27 Jul 2026 09:00:00 GMT</pubDate>
      <enclosure url="https://cdn.example.com/ep1.mp3" length="12345" type="audio/mpeg"/>
    </item>
    <item>
      <title>No Audio Here</title>
      <guid isPermaLink="false">ep-2</guid>
      <pubDate>Mon, 27 Jul 2026 10:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Old Episode</title>
      <guid isPermaLink="false">ep-0</guid>
      <pubDate>Mon, 01 Jun 2026 09:00:00 GMT</pubDate>
      <enclosure url="https://cdn.example.com/ep0.mp3" length="12345" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

    fn cutoff() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-07-20T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn maps_entries_with_audio_enclosures() {
        let feed = feed_rs::parser::parse(SAMPLE_FEED.as_bytes()).unwrap();
        let podcast_id = Uuid::new_v4();

        let episodes: Vec<_> = feed
            .entries
            .iter()
            .filter_map(|e| episode_from_entry(podcast_id, e, cutoff()))
            .collect();

        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].guid, "ep-1");
        assert_eq!(episodes[0].audio_url, "https://cdn.example.com/ep1.mp3");
        assert_eq!(episodes[0].title, "Episode One");
        assert_eq!(episodes[0].transcript_status, "pending");
    }

    #[test]
    fn entries_without_enclosures_are_skipped() {
        let feed = feed_rs::parser::parse(SAMPLE_FEED.as_bytes()).unwrap();
        let no_audio = feed
            .entries
            .iter()
            .find(|e| e.id == "ep-2")
            .unwrap();

        assert_eq!(pick_audio_enclosure(no_audio), None);
    }

    #[test]
    fn entries_at_or_before_cutoff_are_skipped() {
        let feed = feed_rs::parser::parse(SAMPLE_FEED.as_bytes()).unwrap();
        let old = feed.entries.iter().find(|e| e.id == "ep-0").unwrap();

        let late_cutoff = DateTime::parse_from_rfc3339("2026-07-27T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        assert!(episode_from_entry(Uuid::new_v4(), old, cutoff()).is_none());

        // exactly-at-cutoff is also skipped
        let ep1 = feed.entries.iter().find(|e| e.id == "ep-1").unwrap();
        assert!(episode_from_entry(Uuid::new_v4(), ep1, late_cutoff).is_none());
    }
}
