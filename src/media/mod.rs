// ABOUTME: Media segment extractor - bounded video segment, representative frame, audio track
// ABOUTME: Shells out to ffprobe/ffmpeg; all temp files live in one request-scoped TempDir

// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Persona Insight

//! # Media Segment Extraction
//!
//! Turns an uploaded video into a bounded-duration segment, one representative
//! still frame and a detached audio track. Duration is probed once per call with
//! `ffprobe`; a probe failure substitutes a conservative default instead of
//! aborting. Every intermediate file lives inside a [`tempfile::TempDir`] so it
//! is removed on every exit path, including errors.

use bytes::Bytes;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::config::MediaLimits;
use crate::errors::{AppError, AppResult};

/// Everything extracted from one uploaded video
#[derive(Debug, Clone)]
pub struct ExtractedSegment {
    /// Re-encoded segment bounded by the configured maximum length
    pub segment: Bytes,
    /// Still frame captured at the temporal midpoint of the segment
    pub frame: Bytes,
    /// Detached audio track; `None` when the video carries no audio stream
    pub audio: Option<Bytes>,
    /// Seconds of video actually covered, after clamping to the real duration
    pub actual_duration: f64,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    duration: Option<String>,
}

/// Clamp a requested window to the probed total duration.
///
/// Fails when the window collapses to nothing, reporting the valid start range.
fn segment_bounds(start: f64, requested: f64, total: f64) -> AppResult<f64> {
    if start < 0.0 || requested <= 0.0 {
        return Err(AppError::invalid_segment(start, total));
    }
    let actual = requested.min(total - start);
    if actual <= 0.0 {
        return Err(AppError::invalid_segment(start, total));
    }
    Ok(actual)
}

/// Resolve the caller's requested window length against the configured maximum.
///
/// Absent means "as much as allowed"; present is still capped at the maximum.
fn bounded_request(requested: Option<f64>, max_segment_secs: f64) -> f64 {
    requested.unwrap_or(max_segment_secs).min(max_segment_secs)
}

/// Request-scoped video segment extractor
pub struct SegmentExtractor {
    limits: MediaLimits,
}

impl SegmentExtractor {
    #[must_use]
    pub fn new(limits: MediaLimits) -> Self {
        Self { limits }
    }

    /// Extract a bounded segment, a midpoint frame and the audio track.
    ///
    /// `requested_duration` defaults to the configured maximum segment length.
    ///
    /// # Errors
    ///
    /// `InvalidSegment` when `start` lies beyond the video, `MediaError` when
    /// ffmpeg cannot produce the segment or the frame.
    #[instrument(skip(self, video), fields(bytes = video.len(), start))]
    pub async fn extract(
        &self,
        video: &Bytes,
        start: f64,
        requested_duration: Option<f64>,
    ) -> AppResult<ExtractedSegment> {
        if video.len() > self.limits.max_upload_bytes {
            return Err(AppError::media(format!(
                "upload of {} bytes exceeds the {} byte limit",
                video.len(),
                self.limits.max_upload_bytes
            )));
        }

        let workdir = TempDir::new()
            .map_err(|e| AppError::media(format!("cannot create temp directory: {e}")))?;

        let input_path = workdir.path().join("input.mp4");
        tokio::fs::write(&input_path, video)
            .await
            .map_err(|e| AppError::media(format!("cannot stage uploaded video: {e}")))?;

        let total = self.probe_duration(&input_path).await;
        let requested = bounded_request(requested_duration, self.limits.max_segment_secs);
        let actual_duration = segment_bounds(start, requested, total)?;

        debug!(total, actual_duration, "extracting segment");

        let segment_path = workdir.path().join("segment.mp4");
        self.cut_segment(&input_path, &segment_path, start, actual_duration)
            .await?;

        // The frame belongs to the segment's midpoint, not the whole video's
        let frame_path = workdir.path().join("frame.jpg");
        let midpoint = start + actual_duration / 2.0;
        self.capture_frame(&input_path, &frame_path, midpoint).await?;

        let audio_path = workdir.path().join("audio.wav");
        let audio = match self
            .detach_audio(&input_path, &audio_path, start, actual_duration)
            .await
        {
            Ok(()) => Some(read_bytes(&audio_path).await?),
            Err(e) => {
                // No audio stream is common; transcription degrades downstream
                warn!("audio extraction failed, continuing without audio: {}", e);
                None
            }
        };

        let segment = read_bytes(&segment_path).await?;
        let frame = read_bytes(&frame_path).await?;

        Ok(ExtractedSegment {
            segment,
            frame,
            audio,
            actual_duration,
        })
    }

    /// Probe the container duration; substitute the configured fallback on failure
    async fn probe_duration(&self, input: &Path) -> f64 {
        let result = Command::new("ffprobe")
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(input)
            .output()
            .await;

        let parsed = match result {
            Ok(output) if output.status.success() => {
                serde_json::from_slice::<ProbeOutput>(&output.stdout)
                    .ok()
                    .and_then(|p| p.format)
                    .and_then(|f| f.duration)
                    .and_then(|d| d.parse::<f64>().ok())
            }
            _ => None,
        };

        match parsed {
            Some(duration) if duration > 0.0 => duration,
            _ => {
                warn!(
                    fallback = self.limits.fallback_duration_secs,
                    "duration probe failed, using fallback duration"
                );
                self.limits.fallback_duration_secs
            }
        }
    }

    async fn cut_segment(
        &self,
        input: &Path,
        output: &Path,
        start: f64,
        duration: f64,
    ) -> AppResult<()> {
        run_ffmpeg(
            Command::new("ffmpeg")
                .args(["-ss", &start.to_string()])
                .arg("-i")
                .arg(input)
                .args(["-t", &duration.to_string(), "-c", "copy", "-y"])
                .arg(output),
            "segment cut",
        )
        .await
    }

    async fn capture_frame(&self, input: &Path, output: &Path, at: f64) -> AppResult<()> {
        run_ffmpeg(
            Command::new("ffmpeg")
                .args(["-ss", &at.to_string()])
                .arg("-i")
                .arg(input)
                .args(["-vframes", "1", "-q:v", "2", "-y"])
                .arg(output),
            "frame capture",
        )
        .await
    }

    async fn detach_audio(
        &self,
        input: &Path,
        output: &Path,
        start: f64,
        duration: f64,
    ) -> AppResult<()> {
        run_ffmpeg(
            Command::new("ffmpeg")
                .args(["-ss", &start.to_string()])
                .arg("-i")
                .arg(input)
                .args([
                    "-t",
                    &duration.to_string(),
                    "-vn",
                    "-acodec",
                    "pcm_s16le",
                    "-ar",
                    "16000",
                    "-ac",
                    "1",
                    "-y",
                ])
                .arg(output),
            "audio detach",
        )
        .await
    }
}

async fn run_ffmpeg(command: &mut Command, what: &str) -> AppResult<()> {
    let output = command
        .output()
        .await
        .map_err(|e| AppError::media(format!("{what}: cannot spawn ffmpeg: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::media(format!(
            "{what} failed ({}): {}",
            output.status,
            stderr.chars().take(300).collect::<String>()
        )));
    }
    Ok(())
}

async fn read_bytes(path: &PathBuf) -> AppResult<Bytes> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| AppError::media(format!("cannot read {}: {e}", path.display())))?;
    Ok(Bytes::from(data))
}
