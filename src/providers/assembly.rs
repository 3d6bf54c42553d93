// ABOUTME: Asynchronous transcription adapter - upload, submit, then poll until done
// ABOUTME: Normalizes utterances, word timings, sentiment, entities and topics
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Persona Insight

//! # AssemblyAI Adapter
//!
//! First-preference transcription adapter. The API is asynchronous: audio is
//! uploaded, a transcript job is submitted, then polled with a bounded attempt
//! count and an overall wall-clock ceiling. Exceeding either bound is a
//! `ProviderError` like any other, so the fallback chain moves on.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, instrument, warn};

use super::{ProviderCapabilities, TranscriptionProvider};
use crate::config::MediaLimits;
use crate::errors::{AppError, AppResult};
use crate::models::{SpeechEntity, TranscriptionResult, Utterance, WordToken};

const API_BASE_URL: &str = "https://api.assemblyai.com/v2";

/// Poll cadence and bounds; a long recording legitimately takes minutes
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
    pub deadline: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_attempts: 60,
            deadline: Duration::from_secs(300),
        }
    }
}

impl PollSettings {
    /// Derive poll cadence and bounds from the configured media limits
    #[must_use]
    pub fn from_limits(limits: &MediaLimits) -> Self {
        Self {
            interval: limits.poll_interval,
            max_attempts: limits.max_poll_attempts,
            deadline: limits.poll_deadline,
        }
    }
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct UploadResponse {
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptResponse {
    id: String,
    status: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    audio_duration: Option<f64>,
    #[serde(default)]
    words: Vec<ApiWord>,
    #[serde(default)]
    sentiment_analysis_results: Vec<ApiSentiment>,
    #[serde(default)]
    entities: Vec<ApiEntity>,
    #[serde(default)]
    iab_categories_result: Option<ApiCategories>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiWord {
    text: String,
    /// Milliseconds from the start of the audio
    start: u64,
    end: u64,
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct ApiSentiment {
    text: String,
    start: u64,
    end: u64,
    sentiment: String,
}

#[derive(Debug, Deserialize)]
struct ApiEntity {
    entity_type: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiCategories {
    #[serde(default)]
    summary: std::collections::BTreeMap<String, f64>,
}

// ============================================================================
// Provider Implementation
// ============================================================================

/// Asynchronous transcription adapter with poll-until-done job handling
pub struct AssemblyProvider {
    client: Client,
    api_key: Option<String>,
    poll: PollSettings,
}

impl AssemblyProvider {
    /// Create the adapter; `None` key makes it report `ProviderUnavailable`
    #[must_use]
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            poll: PollSettings::default(),
        }
    }

    /// Override poll cadence and bounds
    #[must_use]
    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    async fn upload(&self, api_key: &str, audio: &Bytes) -> AppResult<String> {
        let response = self
            .client
            .post(format!("{API_BASE_URL}/upload"))
            .header("authorization", api_key)
            .body(audio.clone())
            .send()
            .await
            .map_err(|e| AppError::provider_error("assembly", format!("upload failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::provider_error(
                "assembly",
                format!("upload rejected with status {}", response.status()),
            ));
        }

        let upload: UploadResponse = response
            .json()
            .await
            .map_err(|e| AppError::provider_error("assembly", format!("bad upload response: {e}")))?;
        Ok(upload.upload_url)
    }

    async fn submit(&self, api_key: &str, audio_url: &str) -> AppResult<String> {
        let request = json!({
            "audio_url": audio_url,
            "sentiment_analysis": true,
            "entity_detection": true,
            "iab_categories": true,
        });

        let response = self
            .client
            .post(format!("{API_BASE_URL}/transcript"))
            .header("authorization", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::provider_error("assembly", format!("submit failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::provider_error(
                "assembly",
                format!("submit rejected with status {}", response.status()),
            ));
        }

        let transcript: TranscriptResponse = response
            .json()
            .await
            .map_err(|e| AppError::provider_error("assembly", format!("bad submit response: {e}")))?;
        Ok(transcript.id)
    }

    /// Poll the job until completed, a bounded number of attempts, or the
    /// wall-clock deadline - whichever comes first.
    async fn poll_until_done(&self, api_key: &str, job_id: &str) -> AppResult<TranscriptResponse> {
        let started = Instant::now();

        for attempt in 1..=self.poll.max_attempts {
            sleep(self.poll.interval).await;

            if started.elapsed() >= self.poll.deadline {
                return Err(AppError::provider_error(
                    "assembly",
                    format!("job {job_id} exceeded the {}s deadline", self.poll.deadline.as_secs()),
                ));
            }

            let response = self
                .client
                .get(format!("{API_BASE_URL}/transcript/{job_id}"))
                .header("authorization", api_key)
                .send()
                .await
                .map_err(|e| AppError::provider_error("assembly", format!("poll failed: {e}")))?;

            let transcript: TranscriptResponse = response.json().await.map_err(|e| {
                AppError::provider_error("assembly", format!("bad poll response: {e}"))
            })?;

            match transcript.status.as_str() {
                "completed" => return Ok(transcript),
                "error" => {
                    return Err(AppError::provider_error(
                        "assembly",
                        transcript
                            .error
                            .unwrap_or_else(|| "job reported an unspecified error".to_owned()),
                    ))
                }
                status => {
                    debug!(job_id, status, attempt, "transcription job still running");
                }
            }
        }

        Err(AppError::provider_error(
            "assembly",
            format!("job {job_id} did not finish within {} polls", self.poll.max_attempts),
        ))
    }

    fn normalize(transcript: TranscriptResponse) -> TranscriptionResult {
        let text = transcript.text.unwrap_or_default();
        let duration = transcript.audio_duration.unwrap_or_else(|| {
            transcript
                .words
                .last()
                .map_or(0.0, |w| w.end as f64 / 1000.0)
        });

        let words: Vec<WordToken> = transcript
            .words
            .into_iter()
            .map(|w| WordToken {
                text: w.text,
                start_secs: w.start as f64 / 1000.0,
                end_secs: w.end as f64 / 1000.0,
                confidence: w.confidence.clamp(0.0, 1.0),
            })
            .collect();

        let mut utterances: Vec<Utterance> = transcript
            .sentiment_analysis_results
            .into_iter()
            .map(|s| Utterance {
                text: s.text,
                start_secs: s.start as f64 / 1000.0,
                end_secs: s.end as f64 / 1000.0,
                sentiment: Some(s.sentiment.to_lowercase()),
            })
            .collect();

        // A result with no utterance spans still needs one entry covering the text
        if utterances.is_empty() && !text.is_empty() {
            utterances.push(Utterance {
                text: text.clone(),
                start_secs: 0.0,
                end_secs: duration,
                sentiment: None,
            });
        }

        let entities = transcript
            .entities
            .into_iter()
            .map(|e| SpeechEntity {
                kind: e.entity_type,
                text: e.text,
            })
            .collect();

        let topics = transcript
            .iab_categories_result
            .map(|c| c.summary.into_keys().collect())
            .unwrap_or_default();

        TranscriptionResult {
            text,
            provider: "assembly".to_owned(),
            confidence: transcript.confidence.unwrap_or(0.0).clamp(0.0, 1.0),
            utterances,
            words,
            emotions: Vec::new(),
            entities,
            topics,
        }
    }
}

#[async_trait]
impl TranscriptionProvider for AssemblyProvider {
    fn name(&self) -> &'static str {
        "assembly"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::WORD_TIMING
            | ProviderCapabilities::SENTIMENT
            | ProviderCapabilities::ANNOTATIONS
    }

    #[instrument(skip(self, audio), fields(bytes = audio.len()))]
    async fn transcribe(&self, audio: &Bytes) -> AppResult<TranscriptionResult> {
        let api_key = self
            .api_key
            .clone()
            .ok_or_else(|| AppError::provider_unavailable("assembly"))?;

        debug!("Uploading audio for transcription");
        let audio_url = self.upload(&api_key, audio).await?;

        let job_id = self.submit(&api_key, &audio_url).await?;
        debug!(job_id, "transcription job submitted");

        let transcript = self.poll_until_done(&api_key, &job_id).await.map_err(|e| {
            error!(job_id, "transcription job failed: {}", e);
            e
        })?;

        let result = Self::normalize(transcript);
        if result.text.is_empty() {
            warn!(job_id, "transcription completed with empty text");
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(words: Vec<ApiWord>, sentiments: Vec<ApiSentiment>) -> TranscriptResponse {
        TranscriptResponse {
            id: "t1".to_owned(),
            status: "completed".to_owned(),
            text: Some("hello world".to_owned()),
            confidence: Some(0.93),
            audio_duration: Some(4.0),
            words,
            sentiment_analysis_results: sentiments,
            entities: vec![ApiEntity {
                entity_type: "person_name".to_owned(),
                text: "Ada".to_owned(),
            }],
            iab_categories_result: None,
            error: None,
        }
    }

    #[test]
    fn test_normalize_converts_ms_to_secs() {
        let transcript = completed(
            vec![
                ApiWord {
                    text: "hello".to_owned(),
                    start: 0,
                    end: 500,
                    confidence: 0.9,
                },
                ApiWord {
                    text: "world".to_owned(),
                    start: 600,
                    end: 1200,
                    confidence: 0.95,
                },
            ],
            vec![ApiSentiment {
                text: "hello world".to_owned(),
                start: 0,
                end: 1200,
                sentiment: "POSITIVE".to_owned(),
            }],
        );

        let result = AssemblyProvider::normalize(transcript);
        assert_eq!(result.words.len(), 2);
        assert!((result.words[1].start_secs - 0.6).abs() < 1e-9);
        assert_eq!(result.utterances.len(), 1);
        assert_eq!(result.utterances[0].sentiment.as_deref(), Some("positive"));
        assert_eq!(result.entities[0].kind, "person_name");
    }

    #[test]
    fn test_missing_utterances_fall_back_to_whole_text() {
        let transcript = completed(Vec::new(), Vec::new());
        let result = AssemblyProvider::normalize(transcript);

        assert_eq!(result.utterances.len(), 1);
        assert_eq!(result.utterances[0].text, "hello world");
        assert!((result.utterances[0].end_secs - 4.0).abs() < 1e-9);
        assert!(result.words.is_empty());
    }

    #[test]
    fn test_poll_settings_follow_configured_limits() {
        let limits = MediaLimits {
            max_poll_attempts: 7,
            poll_interval: Duration::from_secs(1),
            poll_deadline: Duration::from_secs(20),
            ..MediaLimits::default()
        };

        let poll = PollSettings::from_limits(&limits);
        assert_eq!(poll.max_attempts, 7);
        assert_eq!(poll.interval, Duration::from_secs(1));
        assert_eq!(poll.deadline, Duration::from_secs(20));

        let provider = AssemblyProvider::new(Some("key".to_owned())).with_poll_settings(poll);
        assert_eq!(provider.poll.max_attempts, 7);
    }

    #[tokio::test]
    async fn test_missing_credentials_is_unavailable() {
        let provider = AssemblyProvider::new(None);
        let err = provider
            .transcribe(&Bytes::from_static(b"audio"))
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::errors::ErrorCode::ProviderUnavailable);
    }
}
