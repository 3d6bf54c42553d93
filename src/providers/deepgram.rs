// ABOUTME: Synchronous transcription fallback adapter (Deepgram-style listen endpoint)
// ABOUTME: Single POST request; word timings arrive in seconds, no sentiment support
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Persona Insight

//! # Deepgram Adapter
//!
//! Fallback transcription adapter. Unlike the asynchronous first preference this
//! one is a single request-response call, so there is no job to poll. Word
//! timings already arrive in seconds; sentiment is not supported, so every
//! utterance carries `sentiment: None`.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, instrument};

use super::{ProviderCapabilities, TranscriptionProvider};
use crate::errors::{AppError, AppResult};
use crate::models::{TranscriptionResult, Utterance, WordToken};

const API_URL: &str = "https://api.deepgram.com/v1/listen";

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ListenResponse {
    results: ListenResults,
}

#[derive(Debug, Deserialize)]
struct ListenResults {
    channels: Vec<ListenChannel>,
    #[serde(default)]
    utterances: Vec<ApiUtterance>,
}

#[derive(Debug, Deserialize)]
struct ListenChannel {
    alternatives: Vec<ListenAlternative>,
}

#[derive(Debug, Deserialize)]
struct ListenAlternative {
    transcript: String,
    confidence: f64,
    #[serde(default)]
    words: Vec<ApiWord>,
}

#[derive(Debug, Deserialize)]
struct ApiWord {
    word: String,
    /// Seconds from the start of the audio
    start: f64,
    end: f64,
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct ApiUtterance {
    transcript: String,
    start: f64,
    end: f64,
}

// ============================================================================
// Provider Implementation
// ============================================================================

/// Synchronous transcription fallback adapter
pub struct DeepgramProvider {
    client: Client,
    api_key: Option<String>,
}

impl DeepgramProvider {
    /// Create the adapter; `None` key makes it report `ProviderUnavailable`
    #[must_use]
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
        }
    }

    fn normalize(response: ListenResponse) -> AppResult<TranscriptionResult> {
        let alternative = response
            .results
            .channels
            .into_iter()
            .next()
            .and_then(|c| c.alternatives.into_iter().next())
            .ok_or_else(|| {
                AppError::provider_error("deepgram", "response carried no transcript alternative")
            })?;

        let words: Vec<WordToken> = alternative
            .words
            .into_iter()
            .map(|w| WordToken {
                text: w.word,
                start_secs: w.start,
                end_secs: w.end,
                confidence: w.confidence.clamp(0.0, 1.0),
            })
            .collect();

        let mut utterances: Vec<Utterance> = response
            .results
            .utterances
            .into_iter()
            .map(|u| Utterance {
                text: u.transcript,
                start_secs: u.start,
                end_secs: u.end,
                sentiment: None,
            })
            .collect();

        // A result with no utterance spans still needs one entry covering the text
        if utterances.is_empty() && !alternative.transcript.is_empty() {
            let end = words.last().map_or(0.0, |w| w.end_secs);
            utterances.push(Utterance {
                text: alternative.transcript.clone(),
                start_secs: 0.0,
                end_secs: end,
                sentiment: None,
            });
        }

        Ok(TranscriptionResult {
            text: alternative.transcript,
            provider: "deepgram".to_owned(),
            confidence: alternative.confidence.clamp(0.0, 1.0),
            utterances,
            words,
            emotions: Vec::new(),
            entities: Vec::new(),
            topics: Vec::new(),
        })
    }
}

#[async_trait]
impl TranscriptionProvider for DeepgramProvider {
    fn name(&self) -> &'static str {
        "deepgram"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::WORD_TIMING
    }

    #[instrument(skip(self, audio), fields(bytes = audio.len()))]
    async fn transcribe(&self, audio: &Bytes) -> AppResult<TranscriptionResult> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| AppError::provider_unavailable("deepgram"))?;

        debug!("Sending listen request to Deepgram");

        let response = self
            .client
            .post(format!("{API_URL}?punctuate=true&utterances=true"))
            .header("Authorization", format!("Token {api_key}"))
            .header("Content-Type", "application/octet-stream")
            .body(audio.clone())
            .send()
            .await
            .map_err(|e| {
                error!("Failed to send request to Deepgram API: {}", e);
                AppError::provider_error("deepgram", format!("Failed to connect: {e}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AppError::provider_error("deepgram", format!("Failed to read response: {e}"))
        })?;

        if !status.is_success() {
            return Err(AppError::provider_error(
                "deepgram",
                format!(
                    "API error ({status}): {}",
                    body.chars().take(200).collect::<String>()
                ),
            ));
        }

        let listen: ListenResponse = serde_json::from_str(&body).map_err(|e| {
            AppError::provider_error("deepgram", format!("Failed to parse response: {e}"))
        })?;

        Self::normalize(listen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(utterances: Vec<ApiUtterance>) -> ListenResponse {
        ListenResponse {
            results: ListenResults {
                channels: vec![ListenChannel {
                    alternatives: vec![ListenAlternative {
                        transcript: "good morning".to_owned(),
                        confidence: 0.88,
                        words: vec![
                            ApiWord {
                                word: "good".to_owned(),
                                start: 0.0,
                                end: 0.4,
                                confidence: 0.9,
                            },
                            ApiWord {
                                word: "morning".to_owned(),
                                start: 0.5,
                                end: 1.1,
                                confidence: 0.86,
                            },
                        ],
                    }],
                }],
                utterances,
            },
        }
    }

    #[test]
    fn test_normalize_keeps_second_timings() {
        let result = DeepgramProvider::normalize(response(vec![ApiUtterance {
            transcript: "good morning".to_owned(),
            start: 0.0,
            end: 1.1,
        }]))
        .unwrap();

        assert_eq!(result.provider, "deepgram");
        assert_eq!(result.words.len(), 2);
        assert!((result.words[1].start_secs - 0.5).abs() < 1e-9);
        assert_eq!(result.utterances.len(), 1);
        assert!(result.utterances[0].sentiment.is_none());
    }

    #[test]
    fn test_missing_utterances_fall_back_to_whole_text() {
        let result = DeepgramProvider::normalize(response(Vec::new())).unwrap();
        assert_eq!(result.utterances.len(), 1);
        assert_eq!(result.utterances[0].text, "good morning");
        assert!((result.utterances[0].end_secs - 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_empty_channels_is_provider_error() {
        let empty = ListenResponse {
            results: ListenResults {
                channels: Vec::new(),
                utterances: Vec::new(),
            },
        };
        let err = DeepgramProvider::normalize(empty).unwrap_err();
        assert_eq!(err.code, crate::errors::ErrorCode::ProviderError);
    }

    #[tokio::test]
    async fn test_missing_credentials_is_unavailable() {
        let provider = DeepgramProvider::new(None);
        let err = provider
            .transcribe(&Bytes::from_static(b"audio"))
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::errors::ErrorCode::ProviderUnavailable);
    }
}
