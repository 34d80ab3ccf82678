pub mod source;
pub mod timeline;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Datelike;
use thiserror::Error;
use uuid::Uuid;

use object_store::{ObjectStore, StoreError};
use pd_ffmpeg::FfmpegError;
use repository::Repository;
use source::{ClipSource, SourceError};
use timeline::{GapFiles, PlannedSegment};
use types::{Chapter, NarrationAudio, TransitionStyle};

#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("clip set is empty")]
    NoClips,
    #[error("narration set does not match the clip set")]
    MissingNarration,
    #[error("source fetch failed: {0}")]
    Source(#[from] SourceError),
    #[error("render failed: {0}")]
    Render(#[from] FfmpegError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("repository error: {0}")]
    Repository(#[from] repository::RepositoryError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AssemblyError {
    /// Short error string surfaced on the digest row when the stage fails.
    pub fn stage_error(&self) -> &'static str {
        match self {
            AssemblyError::MissingNarration => "missing-narration",
            _ => "render-failed",
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            AssemblyError::Store(e) => e.is_transient(),
            AssemblyError::Source(SourceError::Http(e)) => e.is_timeout() || e.is_connect(),
            AssemblyError::Source(SourceError::Store(e)) => e.is_transient(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssemblyOutput {
    pub audio_object_key: String,
    pub total_duration_sec: f64,
    pub chapters: Vec<Chapter>,
}

/// Renders a digest's final MP3 inside a per-digest scratch directory:
/// fetch sources, cut clips, interleave narration, concat with gaps,
/// loudness-normalize, tag, upload. The scratch directory is removed on
/// every exit path.
pub struct Assembler<S: ClipSource> {
    repo: Repository,
    store: ObjectStore,
    clip_source: S,
}

impl<S: ClipSource> Assembler<S> {
    pub fn new(repo: Repository, store: ObjectStore, clip_source: S) -> Self {
        Self {
            repo,
            store,
            clip_source,
        }
    }

    #[tracing::instrument(skip(self, narration_audios))]
    pub async fn assemble(
        &self,
        digest_id: Uuid,
        narration_audios: &[NarrationAudio],
    ) -> Result<AssemblyOutput, AssemblyError> {
        let digest = self.repo.find_digest(digest_id).await?;
        let config = self.repo.find_config(digest.config_id).await?;
        let clips = self.repo.find_clips(digest_id).await?;

        if clips.is_empty() {
            return Err(AssemblyError::NoClips);
        }
        if narration_audios.len() != clips.len() + 2 {
            return Err(AssemblyError::MissingNarration);
        }

        let mut narrations = narration_audios.to_vec();
        narrations.sort_by_key(|n| n.position);

        // scratch directory, dropped (and deleted) on every exit path
        let scratch = tempfile::tempdir()?;
        let scratch_path = scratch.path();

        // 1. source acquisition
        let episode_files = self.fetch_sources(&clips, scratch_path).await?;
        let narration_files = self.fetch_narrations(&narrations, scratch_path).await?;

        // 2. clip extraction with edge fades
        let mut clip_files = Vec::with_capacity(clips.len());
        for (i, clip) in clips.iter().enumerate() {
            let source_file = &episode_files[&clip.episode_id];
            let clip_file = scratch_path.join(format!("clip-{i}.mp3"));

            pd_ffmpeg::clip::extract(source_file, clip.start_sec, clip.end_sec, &clip_file)
                .await?;

            clip_files.push(clip_file);
        }

        // 3. segment sequencing: intro, (transition_i, clip_i)*, outro
        let chapter_titles = self.chapter_titles(&clips).await?;
        let mut segments = Vec::new();

        segments.push(self.planned_narration(&narration_files, 0).await?);
        for (i, clip_file) in clip_files.iter().enumerate() {
            segments.push(self.planned_narration(&narration_files, i + 1).await?);
            segments.push(PlannedSegment {
                path: clip_file.clone(),
                duration_sec: pd_ffmpeg::probe::duration(clip_file).await?,
                chapter_title: Some(chapter_titles[i].clone()),
            });
        }
        segments
            .push(self.planned_narration(&narration_files, clips.len() + 1).await?);

        // 4. concatenation with style-dependent gaps
        let style = config.transition_style();
        let gaps = self.prepare_gap_files(style, scratch_path).await?;
        let playlist = timeline::build_playlist(&segments, &gaps);

        let raw_file = scratch_path.join("digest-raw.mp3");
        pd_ffmpeg::concat::concat(&playlist, scratch_path, &raw_file).await?;

        // 5. two-pass loudness normalization
        let normalized_file = scratch_path.join("digest-normalized.mp3");
        pd_ffmpeg::loudness::normalize(&raw_file, &normalized_file).await?;

        // 6. chapter index: analytic timing, final end clamped to the probe
        let (mut chapters, analytic_total) =
            timeline::plan_chapters(&segments, timeline::gap_for(style));
        let probed_total = pd_ffmpeg::probe::duration(&normalized_file).await?;
        timeline::clamp_final_chapter(&mut chapters, probed_total);

        tracing::debug!(
            "digest {}: analytic total {:.1}s, probed {:.1}s",
            digest_id,
            analytic_total,
            probed_total
        );

        // 7. tagging
        let final_file = scratch_path.join("digest.mp3");
        pd_ffmpeg::tag::write_tags(
            &normalized_file,
            &pd_ffmpeg::tag::Id3Tags {
                title: digest.title.clone(),
                artist: "PodDigest".to_string(),
                album: "PodDigest".to_string(),
                genre: "Podcast".to_string(),
                year: digest.week_end.year(),
            },
            &final_file,
        )
        .await?;

        // 8. upload
        let audio_object_key = format!("digests/{digest_id}/digest.mp3");
        let metadata = HashMap::from([
            ("digestId".to_string(), digest_id.to_string()),
            ("clipCount".to_string(), clips.len().to_string()),
            (
                "totalDurationSec".to_string(),
                format!("{probed_total:.3}"),
            ),
        ]);
        self.store
            .put_file(&audio_object_key, &final_file, "audio/mpeg", metadata, None)
            .await?;

        self.repo
            .set_digest_audio(digest_id, &audio_object_key, probed_total, &chapters)
            .await?;

        tracing::info!(
            "assembled digest {}: {:.1}s, {} chapters",
            digest_id,
            probed_total,
            chapters.len()
        );

        Ok(AssemblyOutput {
            audio_object_key,
            total_duration_sec: probed_total,
            chapters,
        })
    }

    /// Downloads each distinct episode's audio into the scratch directory.
    /// Any source that cannot be fetched fails the whole assembly; the
    /// selected clip set is a contract.
    async fn fetch_sources(
        &self,
        clips: &[repository::models::DigestClip],
        scratch: &Path,
    ) -> Result<HashMap<Uuid, PathBuf>, AssemblyError> {
        let mut files = HashMap::new();

        for clip in clips {
            if files.contains_key(&clip.episode_id) {
                continue;
            }

            let episode = self.repo.find_episode(clip.episode_id).await?;
            let dest = scratch.join(format!("source-{}.mp3", episode.id));

            self.clip_source.fetch(&episode, &dest).await?;

            files.insert(clip.episode_id, dest);
        }

        Ok(files)
    }

    async fn fetch_narrations(
        &self,
        narrations: &[NarrationAudio],
        scratch: &Path,
    ) -> Result<Vec<PathBuf>, AssemblyError> {
        let mut files = Vec::with_capacity(narrations.len());

        for narration in narrations {
            let dest = scratch.join(format!(
                "narration-{}-{}.mp3",
                narration.position,
                narration.kind.as_str()
            ));
            self.store
                .download_to_file(&narration.object_key, &dest)
                .await?;
            files.push(dest);
        }

        Ok(files)
    }

    async fn planned_narration(
        &self,
        narration_files: &[PathBuf],
        position: usize,
    ) -> Result<PlannedSegment, AssemblyError> {
        let path = narration_files[position].clone();
        let duration_sec = pd_ffmpeg::probe::duration(&path).await?;

        Ok(PlannedSegment {
            path,
            duration_sec,
            chapter_title: None,
        })
    }

    async fn chapter_titles(
        &self,
        clips: &[repository::models::DigestClip],
    ) -> Result<Vec<String>, AssemblyError> {
        let mut podcast_titles: HashMap<Uuid, String> = HashMap::new();
        let mut titles = Vec::with_capacity(clips.len());

        for clip in clips {
            let episode = self.repo.find_episode(clip.episode_id).await?;
            let podcast_title = match podcast_titles.get(&episode.podcast_id) {
                Some(title) => title.clone(),
                None => {
                    let podcast = self.repo.find_podcast(episode.podcast_id).await?;
                    podcast_titles.insert(episode.podcast_id, podcast.title.clone());
                    podcast.title
                }
            };

            titles.push(timeline::chapter_title(&podcast_title, &episode.title));
        }

        Ok(titles)
    }

    /// Synthesizes the shared gap files once per assembly.
    async fn prepare_gap_files(
        &self,
        style: TransitionStyle,
        scratch: &Path,
    ) -> Result<GapFiles, AssemblyError> {
        match style {
            TransitionStyle::Silence => {
                let pad = scratch.join("pad-silence.mp3");
                pd_ffmpeg::stinger::synthesize_silence(timeline::SILENCE_GAP_SEC, &pad)
                    .await?;
                Ok(GapFiles::Silence { pad })
            }
            _ => {
                let pad = scratch.join("pad-bumper.mp3");
                let stinger = scratch.join("stinger.mp3");
                pd_ffmpeg::stinger::synthesize_silence(timeline::BUMPER_PAD_SEC, &pad)
                    .await?;
                pd_ffmpeg::stinger::synthesize_stinger(&stinger).await?;
                Ok(GapFiles::Bumper { pad, stinger })
            }
        }
    }
}
