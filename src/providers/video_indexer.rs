// ABOUTME: Deep video-insight adapter (Azure Video Indexer-style API)
// ABOUTME: Upload then poll; timestamped tracks are parsed into second-based spans
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Persona Insight

//! # Video Indexer Adapter
//!
//! The single optional deep video-insight provider. The API is asynchronous:
//! the segment is uploaded, then the index is polled until processing finishes.
//! Track instances arrive as `HH:MM:SS.fff` timestamps and are converted to
//! seconds before leaving the adapter.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, instrument};

use super::{PollSettings, VideoInsightProvider};
use crate::config::VideoIndexerCredentials;
use crate::errors::{AppError, AppResult};
use crate::models::{InsightTrack, TimeSpan, VideoInsights};

const API_BASE_URL: &str = "https://api.videoindexer.ai";

/// Indexing is slower than transcription, so the default cadence is wider
fn default_poll() -> PollSettings {
    PollSettings {
        interval: Duration::from_secs(5),
        max_attempts: 60,
        deadline: Duration::from_secs(300),
    }
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexResponse {
    state: String,
    #[serde(default)]
    videos: Vec<IndexedVideo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexedVideo {
    #[serde(default)]
    insights: Option<ApiInsights>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiInsights {
    #[serde(default)]
    scenes: Vec<ApiTrack>,
    #[serde(default)]
    emotions: Vec<ApiTrack>,
    #[serde(default)]
    faces: Vec<ApiTrack>,
    #[serde(default)]
    topics: Vec<ApiTrack>,
    #[serde(default)]
    labels: Vec<ApiTrack>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiTrack {
    #[serde(default, alias = "type")]
    name: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    instances: Vec<ApiInstance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiInstance {
    start: String,
    end: String,
}

// ============================================================================
// Provider Implementation
// ============================================================================

/// Deep video-insight adapter
pub struct VideoIndexerProvider {
    client: Client,
    credentials: Option<VideoIndexerCredentials>,
    poll: PollSettings,
}

impl VideoIndexerProvider {
    /// Create the adapter; `None` credentials make it report `ProviderUnavailable`
    #[must_use]
    pub fn new(credentials: Option<VideoIndexerCredentials>) -> Self {
        Self {
            client: Client::new(),
            credentials,
            poll: default_poll(),
        }
    }

    /// Override poll cadence and bounds
    #[must_use]
    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    /// Parse an `HH:MM:SS[.fff]` timestamp into seconds
    fn parse_timestamp(value: &str) -> Option<f64> {
        let mut parts = value.split(':');
        let hours: f64 = parts.next()?.parse().ok()?;
        let minutes: f64 = parts.next()?.parse().ok()?;
        let seconds: f64 = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(hours * 3600.0 + minutes * 60.0 + seconds)
    }

    fn normalize_track(track: ApiTrack) -> InsightTrack {
        let instances = track
            .instances
            .into_iter()
            .filter_map(|i| {
                let start_secs = Self::parse_timestamp(&i.start)?;
                let end_secs = Self::parse_timestamp(&i.end)?;
                (end_secs >= start_secs).then_some(TimeSpan {
                    start_secs,
                    end_secs,
                })
            })
            .collect();

        InsightTrack {
            label: track.name.unwrap_or_else(|| "unlabeled".to_owned()),
            confidence: track.confidence.unwrap_or(0.0).clamp(0.0, 1.0),
            instances,
        }
    }

    fn normalize(insights: ApiInsights) -> VideoInsights {
        let convert = |tracks: Vec<ApiTrack>| tracks.into_iter().map(Self::normalize_track).collect();
        VideoInsights {
            scenes: convert(insights.scenes),
            emotions: convert(insights.emotions),
            faces: convert(insights.faces),
            topics: convert(insights.topics),
            labels: convert(insights.labels),
        }
    }

    async fn upload(&self, creds: &VideoIndexerCredentials, segment: &Bytes) -> AppResult<String> {
        let url = format!(
            "{API_BASE_URL}/{}/Accounts/{}/Videos?name=segment&accessToken={}&privacy=Private",
            creds.location, creds.account_id, creds.api_key
        );

        let part = multipart::Part::bytes(segment.to_vec()).file_name("segment.mp4");
        let form = multipart::Form::new().part("video", part);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to upload segment to video indexer: {}", e);
                AppError::provider_error("video-indexer", format!("upload failed: {e}"))
            })?;

        if !response.status().is_success() {
            return Err(AppError::provider_error(
                "video-indexer",
                format!("upload rejected with status {}", response.status()),
            ));
        }

        let upload: UploadResponse = response.json().await.map_err(|e| {
            AppError::provider_error("video-indexer", format!("bad upload response: {e}"))
        })?;
        Ok(upload.id)
    }

    async fn poll_index(
        &self,
        creds: &VideoIndexerCredentials,
        video_id: &str,
    ) -> AppResult<IndexResponse> {
        let url = format!(
            "{API_BASE_URL}/{}/Accounts/{}/Videos/{video_id}/Index?accessToken={}",
            creds.location, creds.account_id, creds.api_key
        );

        let started = Instant::now();

        for attempt in 1..=self.poll.max_attempts {
            sleep(self.poll.interval).await;

            if started.elapsed() >= self.poll.deadline {
                return Err(AppError::provider_error(
                    "video-indexer",
                    format!("video {video_id} exceeded the indexing deadline"),
                ));
            }

            let response = self.client.get(&url).send().await.map_err(|e| {
                AppError::provider_error("video-indexer", format!("poll failed: {e}"))
            })?;

            let index: IndexResponse = response.json().await.map_err(|e| {
                AppError::provider_error("video-indexer", format!("bad poll response: {e}"))
            })?;

            match index.state.as_str() {
                "Processed" => return Ok(index),
                "Failed" => {
                    return Err(AppError::provider_error(
                        "video-indexer",
                        format!("indexing failed for video {video_id}"),
                    ))
                }
                state => {
                    debug!(video_id, state, attempt, "video still indexing");
                }
            }
        }

        Err(AppError::provider_error(
            "video-indexer",
            format!(
                "video {video_id} did not finish within {} polls",
                self.poll.max_attempts
            ),
        ))
    }
}

#[async_trait]
impl VideoInsightProvider for VideoIndexerProvider {
    fn name(&self) -> &'static str {
        "video-indexer"
    }

    #[instrument(skip(self, segment), fields(bytes = segment.len()))]
    async fn analyze_video(&self, segment: &Bytes) -> AppResult<VideoInsights> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or_else(|| AppError::provider_unavailable("video-indexer"))?;

        let video_id = self.upload(creds, segment).await?;
        debug!(video_id, "segment uploaded for indexing");

        let index = self.poll_index(creds, &video_id).await?;

        let insights = index
            .videos
            .into_iter()
            .next()
            .and_then(|v| v.insights)
            .unwrap_or_default();

        Ok(Self::normalize(insights))
    }
}
