// ABOUTME: Explicit runtime configuration built once from environment variables at startup
// ABOUTME: Credential presence here decides ProviderUnavailable before any network call
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Persona Insight

//! # Runtime Configuration
//!
//! One `AppConfig` is constructed at process start and passed by reference into the
//! fallback chain executor and fusion engine. Business logic never does ambient
//! environment lookups, which keeps tests deterministic with fake adapters.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Key pair for the specialized face API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacePlusCredentials {
    pub api_key: String,
    pub api_secret: String,
}

/// Key + regional endpoint for the cloud-vendor face fallback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureFaceCredentials {
    pub api_key: String,
    pub endpoint: String,
}

/// Account-scoped credentials for the deep video-insight provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoIndexerCredentials {
    pub api_key: String,
    pub account_id: String,
    pub location: String,
}

/// Credentials for every external provider the pipeline can reach.
///
/// Every field is optional: a missing credential makes the corresponding adapter
/// report `ProviderUnavailable` and the fallback chain moves on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderCredentials {
    pub face_plus: Option<FacePlusCredentials>,
    pub azure_face: Option<AzureFaceCredentials>,
    pub assembly_api_key: Option<String>,
    pub deepgram_api_key: Option<String>,
    pub video_indexer: Option<VideoIndexerCredentials>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
}

/// Bounds for media extraction and provider polling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaLimits {
    /// Maximum segment length extracted from an uploaded video, seconds
    pub max_segment_secs: f64,
    /// Duration substituted when ffprobe cannot determine the real length
    pub fallback_duration_secs: f64,
    /// Maximum accepted upload size in bytes
    pub max_upload_bytes: usize,
    /// Maximum polls against an asynchronous provider job
    pub max_poll_attempts: u32,
    /// Delay between polls
    pub poll_interval: Duration,
    /// Overall wall-clock ceiling for one provider job
    pub poll_deadline: Duration,
}

impl Default for MediaLimits {
    fn default() -> Self {
        Self {
            max_segment_secs: 60.0,
            fallback_duration_secs: 5.0,
            max_upload_bytes: 100 * 1024 * 1024,
            max_poll_attempts: 60,
            poll_interval: Duration::from_secs(3),
            poll_deadline: Duration::from_secs(300),
        }
    }
}

/// Top-level application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub credentials: ProviderCredentials,
    pub limits: MediaLimits,
    /// Default cap on detected subjects when the caller does not supply one
    pub default_max_people: usize,
}

impl AppConfig {
    /// Build configuration from environment variables.
    ///
    /// Missing provider keys are not an error; they disable the adapter.
    #[must_use]
    pub fn from_env() -> Self {
        let face_plus = match (env::var("FACEPP_API_KEY"), env::var("FACEPP_API_SECRET")) {
            (Ok(api_key), Ok(api_secret)) => Some(FacePlusCredentials { api_key, api_secret }),
            _ => None,
        };

        let azure_face = match (env::var("AZURE_FACE_KEY"), env::var("AZURE_FACE_ENDPOINT")) {
            (Ok(api_key), Ok(endpoint)) => Some(AzureFaceCredentials { api_key, endpoint }),
            _ => None,
        };

        let video_indexer = match (
            env::var("VIDEO_INDEXER_KEY"),
            env::var("VIDEO_INDEXER_ACCOUNT_ID"),
        ) {
            (Ok(api_key), Ok(account_id)) => Some(VideoIndexerCredentials {
                api_key,
                account_id,
                location: env::var("VIDEO_INDEXER_LOCATION").unwrap_or_else(|_| "trial".into()),
            }),
            _ => None,
        };

        Self {
            credentials: ProviderCredentials {
                face_plus,
                azure_face,
                assembly_api_key: env::var("ASSEMBLYAI_API_KEY").ok(),
                deepgram_api_key: env::var("DEEPGRAM_API_KEY").ok(),
                video_indexer,
                openai_api_key: env::var("OPENAI_API_KEY").ok(),
                anthropic_api_key: env::var("ANTHROPIC_API_KEY").ok(),
                gemini_api_key: env::var("GEMINI_API_KEY").ok(),
            },
            limits: MediaLimits {
                max_segment_secs: parse_env("MAX_SEGMENT_SECS", 60.0),
                fallback_duration_secs: 5.0,
                max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", 100 * 1024 * 1024),
                max_poll_attempts: parse_env("PROVIDER_MAX_POLLS", 60),
                poll_interval: Duration::from_secs(parse_env("PROVIDER_POLL_INTERVAL_SECS", 3)),
                poll_deadline: Duration::from_secs(parse_env("PROVIDER_POLL_DEADLINE_SECS", 300)),
            },
            default_max_people: parse_env("DEFAULT_MAX_PEOPLE", 4),
        }
    }

    /// Whether any language model credential is configured
    #[must_use]
    pub fn any_model_configured(&self) -> bool {
        self.credentials.openai_api_key.is_some()
            || self.credentials.anthropic_api_key.is_some()
            || self.credentials.gemini_api_key.is_some()
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = MediaLimits::default();
        assert!(limits.max_segment_secs > 0.0);
        assert_eq!(limits.fallback_duration_secs, 5.0);
        assert!(limits.max_poll_attempts > 0);
    }

    #[test]
    fn test_no_models_by_default() {
        let config = AppConfig::default();
        assert!(!config.any_model_configured());
    }
}
