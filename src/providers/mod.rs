// ABOUTME: Capability adapter traits for face-analysis, transcription and deep video insight
// ABOUTME: Every adapter normalizes its wire format into the shared model shapes before returning
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Persona Insight

//! # Provider Adapter Interface
//!
//! Each external capability (face-analysis, transcription, deep video insight) is
//! wrapped behind a single call contract. Normalization — unit conversion,
//! confidence scaling to [0, 1], bounding-box normalization — happens inside the
//! adapter, never in the caller. A missing credential makes the adapter fail with
//! `ProviderUnavailable` before any network call; the fallback chain skips it.

pub mod assembly;
pub mod azure_face;
pub mod chain;
pub mod deepgram;
pub mod face_plus;
pub mod video_indexer;
pub mod vision_llm;

pub use assembly::{AssemblyProvider, PollSettings};
pub use azure_face::AzureFaceProvider;
pub use chain::{FaceChain, TranscriptionChain};
pub use deepgram::DeepgramProvider;
pub use face_plus::FacePlusProvider;
pub use video_indexer::VideoIndexerProvider;
pub use vision_llm::VisionLlmProvider;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::errors::AppResult;
use crate::models::{SubjectFace, TranscriptionResult, VideoInsights};

bitflags::bitflags! {
    /// Capability flags describing what a provider's normalized output can carry
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ProviderCapabilities: u8 {
        /// Age range estimation
        const AGE = 0b0000_0001;
        /// Gender labeling
        const GENDER = 0b0000_0010;
        /// Emotion-confidence mapping
        const EMOTIONS = 0b0000_0100;
        /// Extended attributes (smile, eyewear, pose, quality)
        const ATTRIBUTES = 0b0000_1000;
        /// Word-level timing in transcriptions
        const WORD_TIMING = 0b0001_0000;
        /// Per-utterance sentiment
        const SENTIMENT = 0b0010_0000;
        /// Entity and topic annotations
        const ANNOTATIONS = 0b0100_0000;
    }
}

/// Face-analysis capability.
///
/// Implementations return subjects ordered by detection, indexed from zero; the
/// positional index is the only subject identity for the rest of the pipeline.
#[async_trait]
pub trait FaceProvider: Send + Sync {
    /// Unique provider identifier used in logs and chain reporting
    fn name(&self) -> &'static str;

    /// What the normalized output of this provider can carry
    fn capabilities(&self) -> ProviderCapabilities;

    /// Detect faces in one encoded image.
    ///
    /// # Errors
    ///
    /// `ProviderUnavailable` when credentials are missing (no network call is
    /// made); `ProviderError` on any runtime request/parse failure.
    async fn detect_faces(&self, image: &Bytes) -> AppResult<Vec<SubjectFace>>;
}

/// Speech-transcription capability
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    /// Unique provider identifier used in logs and chain reporting
    fn name(&self) -> &'static str;

    /// What the normalized output of this provider can carry
    fn capabilities(&self) -> ProviderCapabilities;

    /// Transcribe one audio track.
    ///
    /// Implementations that cannot supply word-level timing must still return at
    /// least one utterance (the whole text spanning the known duration).
    ///
    /// # Errors
    ///
    /// `ProviderUnavailable` when credentials are missing; `ProviderError` on any
    /// runtime request/parse/timeout failure.
    async fn transcribe(&self, audio: &Bytes) -> AppResult<TranscriptionResult>;
}

/// Optional deep video-insight capability.
///
/// There is exactly one of these per deployment (no chain); when it is absent or
/// fails, the insight bundle is simply absent - never a zeroed placeholder.
#[async_trait]
pub trait VideoInsightProvider: Send + Sync {
    /// Unique provider identifier used in logs
    fn name(&self) -> &'static str;

    /// Analyze one video segment.
    ///
    /// # Errors
    ///
    /// `ProviderUnavailable` when credentials are missing; `ProviderError` on any
    /// runtime request/parse/timeout failure.
    async fn analyze_video(&self, segment: &Bytes) -> AppResult<VideoInsights>;
}
