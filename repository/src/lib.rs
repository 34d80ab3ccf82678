pub mod models;
pub mod schema;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use thiserror::Error;
use uuid::Uuid;

use models::{
    Digest, DigestClip, DigestConfig, Episode, NewDigestClip, NewEpisode, Podcast,
    Subscription, Transcript,
};
use types::{DigestStatus, TranscriptStatus};

pub type Pool = diesel_async::pooled_connection::bb8::Pool<AsyncPgConnection>;

/// Establishes the bb8 connection pool over an async Postgres connection.
pub async fn create_pool(database_url: &str) -> Result<Pool, RepositoryError> {
    let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);

    Pool::builder()
        .test_on_check_out(true)
        .max_size(10)
        .build(config)
        .await
        .map_err(|e| RepositoryError::Pool(e.to_string()))
}

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("connection pool error: {0}")]
    Pool(String),
    #[error("query error: {0}")]
    Query(#[from] diesel::result::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

/// CRUD and domain queries over the relational store. Status writes on
/// digests are serialized with an optimistic version counter.
#[derive(Clone)]
pub struct Repository {
    pool: Pool,
}

impl Repository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn conn(
        &self,
    ) -> Result<
        diesel_async::pooled_connection::bb8::PooledConnection<'_, AsyncPgConnection>,
        RepositoryError,
    > {
        self.pool
            .get()
            .await
            .map_err(|e| RepositoryError::Pool(e.to_string()))
    }

    // ----- podcasts & subscriptions -----

    pub async fn find_podcast(&self, podcast_id: Uuid) -> Result<Podcast, RepositoryError> {
        use schema::podcasts::dsl::*;

        let mut conn = self.conn().await?;

        podcasts
            .filter(id.eq(podcast_id))
            .select(Podcast::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| RepositoryError::NotFound(format!("podcast {podcast_id}")))
    }

    pub async fn list_active_subscriptions(
        &self,
        for_user: Uuid,
    ) -> Result<Vec<(Subscription, Podcast)>, RepositoryError> {
        use schema::podcasts;
        use schema::subscriptions;

        let mut conn = self.conn().await?;

        let rows = subscriptions::table
            .inner_join(podcasts::table)
            .filter(subscriptions::user_id.eq(for_user))
            .filter(subscriptions::is_active.eq(true))
            .select((Subscription::as_select(), Podcast::as_select()))
            .load::<(Subscription, Podcast)>(&mut conn)
            .await?;

        Ok(rows)
    }

    pub async fn update_last_crawled(
        &self,
        podcast_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        use schema::podcasts::dsl::*;

        let mut conn = self.conn().await?;

        diesel::update(podcasts.filter(id.eq(podcast_id)))
            .set(last_crawled_at.eq(at))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    /// Refreshes feed-supplied metadata when it drifts from the stored row.
    pub async fn update_podcast_meta(
        &self,
        podcast_id: Uuid,
        new_title: Option<&str>,
        new_author: Option<&str>,
        new_artwork_url: Option<&str>,
    ) -> Result<(), RepositoryError> {
        use schema::podcasts::dsl::*;

        let mut conn = self.conn().await?;

        if let Some(new_title) = new_title {
            diesel::update(podcasts.filter(id.eq(podcast_id)))
                .set(title.eq(new_title))
                .execute(&mut conn)
                .await?;
        }
        if let Some(new_author) = new_author {
            diesel::update(podcasts.filter(id.eq(podcast_id)))
                .set(author.eq(new_author))
                .execute(&mut conn)
                .await?;
        }
        if let Some(new_artwork_url) = new_artwork_url {
            diesel::update(podcasts.filter(id.eq(podcast_id)))
                .set(artwork_url.eq(new_artwork_url))
                .execute(&mut conn)
                .await?;
        }

        Ok(())
    }

    // ----- episodes -----

    /// Inserts an episode keyed by (podcast_id, guid). Returns `None` when
    /// the episode already exists; the caller uses this to distinguish new
    /// discoveries from re-crawled items.
    pub async fn upsert_episode(
        &self,
        episode: NewEpisode,
    ) -> Result<Option<Episode>, RepositoryError> {
        use schema::episodes::dsl::*;

        let mut conn = self.conn().await?;

        let inserted = diesel::insert_into(episodes)
            .values(&episode)
            .on_conflict((podcast_id, guid))
            .do_nothing()
            .get_result::<Episode>(&mut conn)
            .await
            .optional()?;

        Ok(inserted)
    }

    pub async fn find_episode(&self, episode_id: Uuid) -> Result<Episode, RepositoryError> {
        use schema::episodes::dsl::*;

        let mut conn = self.conn().await?;

        episodes
            .filter(id.eq(episode_id))
            .select(Episode::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| RepositoryError::NotFound(format!("episode {episode_id}")))
    }

    pub async fn find_episodes(
        &self,
        episode_ids: &[Uuid],
    ) -> Result<Vec<Episode>, RepositoryError> {
        use schema::episodes::dsl::*;

        let mut conn = self.conn().await?;

        let rows = episodes
            .filter(id.eq_any(episode_ids))
            .select(Episode::as_select())
            .load(&mut conn)
            .await?;

        Ok(rows)
    }

    pub async fn set_transcript_status(
        &self,
        episode_id: Uuid,
        new_status: TranscriptStatus,
    ) -> Result<(), RepositoryError> {
        use schema::episodes::dsl::*;

        let mut conn = self.conn().await?;

        diesel::update(episodes.filter(id.eq(episode_id)))
            .set(transcript_status.eq(new_status.as_str()))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    /// Up-to-`limit` most recent episodes across the user's active
    /// subscriptions published after `since`, newest first. Crawl fallback.
    pub async fn recent_episodes_since(
        &self,
        for_user: Uuid,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Episode>, RepositoryError> {
        use schema::episodes;
        use schema::subscriptions;

        let mut conn = self.conn().await?;

        let rows = episodes::table
            .inner_join(
                subscriptions::table
                    .on(subscriptions::podcast_id.eq(episodes::podcast_id)),
            )
            .filter(subscriptions::user_id.eq(for_user))
            .filter(subscriptions::is_active.eq(true))
            .filter(episodes::published_at.gt(since))
            .order(episodes::published_at.desc())
            .limit(limit)
            .select(Episode::as_select())
            .load(&mut conn)
            .await?;

        Ok(rows)
    }

    // ----- transcripts -----

    pub async fn find_completed_transcript(
        &self,
        for_episode: Uuid,
    ) -> Result<Option<Transcript>, RepositoryError> {
        use schema::transcripts::dsl::*;

        let mut conn = self.conn().await?;

        let row = transcripts
            .filter(episode_id.eq(for_episode))
            .filter(status.eq(TranscriptStatus::Completed.as_str()))
            .select(Transcript::as_select())
            .first(&mut conn)
            .await
            .optional()?;

        Ok(row)
    }

    pub async fn store_transcript(
        &self,
        for_episode: Uuid,
        text: &str,
        transcript_segments: &[types::TranscriptSegment],
        lang: Option<&str>,
    ) -> Result<Transcript, RepositoryError> {
        use schema::transcripts::dsl::*;

        let mut conn = self.conn().await?;

        let row = diesel::insert_into(transcripts)
            .values((
                episode_id.eq(for_episode),
                full_text.eq(text),
                segments.eq(serde_json::json!(transcript_segments)),
                language.eq(lang),
                status.eq(TranscriptStatus::Completed.as_str()),
            ))
            .on_conflict(episode_id)
            .do_update()
            .set((
                full_text.eq(text),
                segments.eq(serde_json::json!(transcript_segments)),
                language.eq(lang),
                status.eq(TranscriptStatus::Completed.as_str()),
                error.eq::<Option<String>>(None),
            ))
            .get_result::<Transcript>(&mut conn)
            .await?;

        Ok(row)
    }

    pub async fn mark_transcript_failed(
        &self,
        for_episode: Uuid,
        reason: &str,
    ) -> Result<(), RepositoryError> {
        use schema::transcripts::dsl::*;

        let mut conn = self.conn().await?;

        diesel::insert_into(transcripts)
            .values((
                episode_id.eq(for_episode),
                full_text.eq(""),
                segments.eq(serde_json::json!([])),
                status.eq(TranscriptStatus::Failed.as_str()),
                error.eq(reason),
            ))
            .on_conflict(episode_id)
            .do_update()
            .set((
                status.eq(TranscriptStatus::Failed.as_str()),
                error.eq(reason),
            ))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    // ----- digest configs -----

    pub async fn find_config(&self, config_id: Uuid) -> Result<DigestConfig, RepositoryError> {
        use schema::digest_configs::dsl::*;

        let mut conn = self.conn().await?;

        digest_configs
            .filter(id.eq(config_id))
            .select(DigestConfig::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| RepositoryError::NotFound(format!("config {config_id}")))
    }

    pub async fn list_active_configs(&self) -> Result<Vec<DigestConfig>, RepositoryError> {
        use schema::digest_configs::dsl::*;

        let mut conn = self.conn().await?;

        let rows = digest_configs
            .filter(is_active.eq(true))
            .select(DigestConfig::as_select())
            .load(&mut conn)
            .await?;

        Ok(rows)
    }

    // ----- digests -----

    pub async fn create_digest(
        &self,
        for_user: Uuid,
        for_config: Uuid,
        digest_title: &str,
        window: types::WeekWindow,
    ) -> Result<Digest, RepositoryError> {
        use schema::digests::dsl::*;

        let mut conn = self.conn().await?;

        let row = diesel::insert_into(digests)
            .values((
                user_id.eq(for_user),
                config_id.eq(for_config),
                title.eq(digest_title),
                week_start.eq(window.week_start),
                week_end.eq(window.week_end),
                status.eq(DigestStatus::Pending.as_str()),
                clip_count.eq(0),
                version.eq(0),
            ))
            .get_result::<Digest>(&mut conn)
            .await?;

        Ok(row)
    }

    pub async fn find_digest(&self, digest_id: Uuid) -> Result<Digest, RepositoryError> {
        use schema::digests::dsl::*;

        let mut conn = self.conn().await?;

        digests
            .filter(id.eq(digest_id))
            .select(Digest::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| RepositoryError::NotFound(format!("digest {digest_id}")))
    }

    /// Advances `Digest.status`. Regressions along the stage order are
    /// rejected, and the write is guarded by the optimistic version
    /// counter so two workers cannot race each other's transitions.
    pub async fn set_digest_status(
        &self,
        digest_id: Uuid,
        new_status: DigestStatus,
        new_error: Option<&str>,
    ) -> Result<Digest, RepositoryError> {
        use schema::digests::dsl::*;

        let current = self.find_digest(digest_id).await?;
        let current_status = current.status();

        if current_status.is_terminal() && new_status != current_status {
            return Err(RepositoryError::Conflict(format!(
                "digest {digest_id} is terminal ({})",
                current.status
            )));
        }

        if let (Some(from), Some(to)) =
            (current_status.stage_index(), new_status.stage_index())
        {
            if to < from {
                return Err(RepositoryError::Conflict(format!(
                    "status regression {} -> {}",
                    current.status,
                    new_status.as_str()
                )));
            }
        }

        let mut conn = self.conn().await?;

        let updated = diesel::update(
            digests
                .filter(id.eq(digest_id))
                .filter(version.eq(current.version)),
        )
        .set((
            status.eq(new_status.as_str()),
            error.eq(new_error),
            version.eq(current.version + 1),
            updated_at.eq(chrono::Utc::now()),
        ))
        .get_result::<Digest>(&mut conn)
        .await
        .optional()?;

        updated.ok_or_else(|| {
            RepositoryError::Conflict(format!(
                "concurrent status write on digest {digest_id}"
            ))
        })
    }

    /// Resets a failed digest back to pending for an explicit retry.
    pub async fn reset_digest_for_retry(
        &self,
        digest_id: Uuid,
    ) -> Result<Digest, RepositoryError> {
        use schema::digests::dsl::*;

        let current = self.find_digest(digest_id).await?;

        if current.status() != DigestStatus::Failed {
            return Err(RepositoryError::Conflict(format!(
                "retry requires a failed digest, found {}",
                current.status
            )));
        }

        let mut conn = self.conn().await?;

        let updated = diesel::update(
            digests
                .filter(id.eq(digest_id))
                .filter(version.eq(current.version)),
        )
        .set((
            status.eq(DigestStatus::Pending.as_str()),
            error.eq::<Option<String>>(None),
            version.eq(current.version + 1),
            updated_at.eq(chrono::Utc::now()),
        ))
        .get_result::<Digest>(&mut conn)
        .await
        .optional()?;

        updated.ok_or_else(|| {
            RepositoryError::Conflict(format!(
                "concurrent status write on digest {digest_id}"
            ))
        })
    }

    pub async fn set_digest_audio(
        &self,
        digest_id: Uuid,
        object_key: &str,
        duration_sec: f64,
        digest_chapters: &[types::Chapter],
    ) -> Result<(), RepositoryError> {
        use schema::digests::dsl::*;

        let mut conn = self.conn().await?;

        diesel::update(digests.filter(id.eq(digest_id)))
            .set((
                audio_object_key.eq(object_key),
                total_duration_sec.eq(duration_sec),
                chapters.eq(serde_json::json!(digest_chapters)),
                updated_at.eq(chrono::Utc::now()),
            ))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    /// Any digest for this config that has not reached a terminal state?
    /// Used by the scheduler to enforce at-most-one active run per config.
    pub async fn has_non_terminal_digest(
        &self,
        for_config: Uuid,
    ) -> Result<bool, RepositoryError> {
        use schema::digests::dsl::*;

        let mut conn = self.conn().await?;

        let count: i64 = digests
            .filter(config_id.eq(for_config))
            .filter(status.ne_all(vec![
                DigestStatus::Completed.as_str(),
                DigestStatus::Failed.as_str(),
            ]))
            .count()
            .get_result(&mut conn)
            .await?;

        Ok(count > 0)
    }

    pub async fn list_completed_digests_for_user(
        &self,
        for_user: Uuid,
    ) -> Result<Vec<Digest>, RepositoryError> {
        use schema::digests::dsl::*;

        let mut conn = self.conn().await?;

        let rows = digests
            .filter(user_id.eq(for_user))
            .filter(status.eq(DigestStatus::Completed.as_str()))
            .order(created_at.desc())
            .select(Digest::as_select())
            .load(&mut conn)
            .await?;

        Ok(rows)
    }

    // ----- digest clips -----

    pub async fn append_clip(
        &self,
        clip: NewDigestClip,
    ) -> Result<DigestClip, RepositoryError> {
        use schema::digest_clips::dsl::*;

        let mut conn = self.conn().await?;

        let row = diesel::insert_into(digest_clips)
            .values(&clip)
            .get_result::<DigestClip>(&mut conn)
            .await?;

        Ok(row)
    }

    pub async fn set_clip_count(
        &self,
        digest_id: Uuid,
        count: i32,
    ) -> Result<(), RepositoryError> {
        use schema::digests::dsl::*;

        let mut conn = self.conn().await?;

        diesel::update(digests.filter(id.eq(digest_id)))
            .set(clip_count.eq(count))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    pub async fn find_clips(
        &self,
        for_digest: Uuid,
    ) -> Result<Vec<DigestClip>, RepositoryError> {
        use schema::digest_clips::dsl::*;

        let mut conn = self.conn().await?;

        let rows = digest_clips
            .filter(digest_id.eq(for_digest))
            .order(position.asc())
            .select(DigestClip::as_select())
            .load(&mut conn)
            .await?;

        Ok(rows)
    }

    /// Removes any clips a previous (re-delivered) run of the analyze
    /// stage persisted, so re-running the stage stays idempotent.
    pub async fn clear_clips(&self, for_digest: Uuid) -> Result<(), RepositoryError> {
        use schema::digest_clips::dsl::*;

        let mut conn = self.conn().await?;

        diesel::delete(digest_clips.filter(digest_id.eq(for_digest)))
            .execute(&mut conn)
            .await?;

        Ok(())
    }
}
