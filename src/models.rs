// ABOUTME: Core data model for analysis records, detected subjects, transcriptions and messages
// ABOUTME: All provider outputs are normalized into these shared shapes before leaving an adapter
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Persona Insight

//! # Core Data Models
//!
//! Shared, strongly-typed shapes for everything that crosses a module boundary.
//! Provider adapters normalize their wire formats into these structs; downstream
//! code never branches on provider identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Media type declared by the caller at upload time.
///
/// This is a hint, not ground truth; the pipeline sniffs what it can and treats
/// unparseable video as a hard error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    Text,
    Document,
}

impl MediaType {
    /// String form used in logs and persisted records
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Text => "text",
            Self::Document => "document",
        }
    }

    /// Whether this media type carries frames for face detection
    #[must_use]
    pub const fn is_visual(&self) -> bool {
        matches!(self, Self::Image | Self::Video)
    }
}

/// Normalized bounding box, all coordinates in [0, 1] relative to the frame.
///
/// Adapters convert pixel coordinates before returning; no caller ever sees
/// provider-native units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// Build from pixel coordinates relative to the given frame dimensions
    #[must_use]
    pub fn from_pixels(left: f64, top: f64, width: f64, height: f64, frame_w: f64, frame_h: f64) -> Self {
        if frame_w <= 0.0 || frame_h <= 0.0 {
            return Self {
                left: 0.0,
                top: 0.0,
                width: 0.0,
                height: 0.0,
            };
        }
        Self {
            left: (left / frame_w).clamp(0.0, 1.0),
            top: (top / frame_h).clamp(0.0, 1.0),
            width: (width / frame_w).clamp(0.0, 1.0),
            height: (height / frame_h).clamp(0.0, 1.0),
        }
    }
}

/// Estimated age range for a detected face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeRange {
    pub low: u8,
    pub high: u8,
}

/// Head pose angles in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseAngles {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

/// Provider-specific attributes, normalized into typed optional fields.
///
/// `None` means the provider did not report the attribute; it is never a zeroed
/// stand-in for "absent".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceAttributes {
    /// Smile intensity in [0, 1]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smile: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eyeglasses: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sunglasses: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beard: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mustache: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pose: Option<PoseAngles>,
    /// Image quality score in [0, 1] as reported by the provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<f64>,
}

/// One detected face/person in an image or video frame.
///
/// The positional `index` is the only stable identity a subject has: it is fixed
/// for the lifetime of one analysis call and drives the per-subject fan-out order.
/// There is no face recognition across calls; every analysis re-detects and
/// re-indexes from zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectFace {
    /// Positional index within this analysis call, starting at zero
    pub index: usize,
    pub bounding_box: BoundingBox,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_range: Option<AgeRange>,
    /// Provider-dependent gender label; "unknown" when not reported
    pub gender: String,
    /// Emotion name mapped to confidence in [0, 1]
    pub emotions: BTreeMap<String, f64>,
    pub attributes: FaceAttributes,
}

impl SubjectFace {
    /// Human label used in prompts and report sections ("Person 1", "Person 2", ...)
    #[must_use]
    pub fn label(&self) -> String {
        format!("Person {}", self.index + 1)
    }

    /// Dominant emotion by confidence, if any were reported
    #[must_use]
    pub fn dominant_emotion(&self) -> Option<(&str, f64)> {
        self.emotions
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(name, conf)| (name.as_str(), *conf))
    }
}

/// One utterance within a transcription, time-ordered and non-overlapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub text: String,
    pub start_secs: f64,
    pub end_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<String>,
}

/// One word-level token with timing, when the provider supplies it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordToken {
    pub text: String,
    pub start_secs: f64,
    pub end_secs: f64,
    pub confidence: f64,
}

/// A named entity mentioned in the speech
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechEntity {
    pub kind: String,
    pub text: String,
}

/// Output of converting an audio segment to text, normalized across providers.
///
/// Invariant: `utterances` and `words` are each time-ordered and non-overlapping.
/// A provider that cannot supply word-level timing returns an empty `words` list
/// but at least one utterance (the entire text spanning the known duration). The
/// one exception is the [`TranscriptionResult::unavailable`] placeholder produced
/// when every transcription adapter failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub text: String,
    /// Identifier of the provider that served this transcription
    pub provider: String,
    /// Overall confidence in [0, 1]
    pub confidence: f64,
    pub utterances: Vec<Utterance>,
    pub words: Vec<WordToken>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emotions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<SpeechEntity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<String>,
}

impl TranscriptionResult {
    /// Placeholder returned when the whole transcription chain was exhausted.
    ///
    /// Transcription failure must not block report delivery; the pipeline carries
    /// this marker forward instead of an error.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            text: "Transcription unavailable: no provider succeeded".to_owned(),
            provider: "none".to_owned(),
            confidence: 0.0,
            utterances: Vec::new(),
            words: Vec::new(),
            emotions: Vec::new(),
            entities: Vec::new(),
            topics: Vec::new(),
        }
    }

    /// Whether this result is the no-provider placeholder rather than real speech
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        self.provider == "none"
    }
}

/// One labeled span in a deep video analysis (a scene, a tracked emotion, a topic)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightTrack {
    pub label: String,
    pub confidence: f64,
    pub instances: Vec<TimeSpan>,
}

/// A time interval within the analyzed segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSpan {
    pub start_secs: f64,
    pub end_secs: f64,
}

/// Optional deep analysis of a video segment.
///
/// Produced only when a deep video-analysis provider is configured and succeeds.
/// Its absence is meaningful: callers check `Option<VideoInsights>`, never a
/// zeroed placeholder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoInsights {
    pub scenes: Vec<InsightTrack>,
    pub emotions: Vec<InsightTrack>,
    pub faces: Vec<InsightTrack>,
    pub topics: Vec<InsightTrack>,
    pub labels: Vec<InsightTrack>,
}

/// Speech-focused section of a subject profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeechAnalysis {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observations: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_quotes: Vec<String>,
}

/// Growth section of a subject profile.
///
/// An absent section (`Option::None` upstream) and an empty list are distinct,
/// checkable states.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrowthAreas {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub strengths: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub challenges: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub development_path: Option<String>,
}

/// Structured detail behind a subject profile summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailedAnalysis {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personality_core: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cognitive_style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_analysis: Option<SpeechAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship_inferences: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub growth_areas: Option<GrowthAreas>,
}

/// One per-subject analysis profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectProfile {
    /// Positional index of the subject's face record
    pub subject_index: usize,
    /// Human label ("Person 1", ...)
    pub label: String,
    pub summary: String,
    pub detailed: DetailedAnalysis,
    /// True when the subject's model call failed and this profile is the
    /// explicit "analysis unavailable" substitute
    #[serde(default)]
    pub is_placeholder: bool,
}

impl SubjectProfile {
    /// The substitute profile for a subject whose model call failed.
    ///
    /// One bad subject must not void its siblings, so the fan-out folds failures
    /// into this marker instead of propagating them.
    #[must_use]
    pub fn placeholder(subject_index: usize) -> Self {
        Self {
            subject_index,
            label: format!("Person {}", subject_index + 1),
            summary: "Analysis unavailable for this individual".to_owned(),
            detailed: DetailedAnalysis::default(),
            is_placeholder: true,
        }
    }
}

/// The fused analysis output.
///
/// Shape is determined solely by how many faces were detected: one face (or any
/// text/document input) produces `Single`; two or more produce `Group`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum PersonalityInsights {
    /// Exactly one subject
    Single { profile: SubjectProfile },
    /// Multiple subjects, ordered by positional index, plus an optional
    /// group-dynamics narrative synthesized after the individual profiles
    Group {
        profiles: Vec<SubjectProfile>,
        #[serde(skip_serializing_if = "Option::is_none")]
        group_dynamics: Option<String>,
    },
}

impl PersonalityInsights {
    /// Number of per-subject profiles; always >= 1
    #[must_use]
    pub fn people_count(&self) -> usize {
        match self {
            Self::Single { .. } => 1,
            Self::Group { profiles, .. } => profiles.len(),
        }
    }

    /// All profiles in positional-index order
    #[must_use]
    pub fn profiles(&self) -> Vec<&SubjectProfile> {
        match self {
            Self::Single { profile } => vec![profile],
            Self::Group { profiles, .. } => profiles.iter().collect(),
        }
    }

    /// Group-dynamics narrative, when one was synthesized
    #[must_use]
    pub fn group_dynamics(&self) -> Option<&str> {
        match self {
            Self::Single { .. } => None,
            Self::Group { group_dynamics, .. } => group_dynamics.as_deref(),
        }
    }
}

/// Delivery status of one share request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareStatus {
    Pending,
    Sent,
    Error,
}

impl ShareStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Error => "error",
        }
    }
}

/// The top-level persisted unit: one analysis of one upload.
///
/// Created exactly once per analyze call. Only `title`, `downloaded` and
/// `share_status` are ever mutated afterwards; deletion happens only when the
/// owning session is cleared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: Uuid,
    pub session_id: String,
    pub title: String,
    pub media_type: MediaType,
    /// Raw detected faces, in positional-index order
    pub faces: Vec<SubjectFace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_insights: Option<VideoInsights>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription: Option<TranscriptionResult>,
    pub insights: PersonalityInsights,
    /// Always equals `insights.people_count()`
    pub people_count: usize,
    /// Language model identifier that produced the insights
    pub model_id: String,
    pub downloaded: bool,
    /// Delivery status of the most recent share request; `None` until one is made
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_status: Option<ShareStatus>,
    pub created_at: DateTime<Utc>,
}

impl AnalysisRecord {
    /// Create a record; `people_count` is derived from the payload, never passed in
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        title: impl Into<String>,
        media_type: MediaType,
        faces: Vec<SubjectFace>,
        video_insights: Option<VideoInsights>,
        transcription: Option<TranscriptionResult>,
        insights: PersonalityInsights,
        model_id: impl Into<String>,
    ) -> Self {
        let people_count = insights.people_count();
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            title: title.into(),
            media_type,
            faces,
            video_insights,
            transcription,
            insights,
            people_count,
            model_id: model_id.into(),
            downloaded: false,
            share_status: None,
            created_at: Utc::now(),
        }
    }
}

/// Role of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn in a session's conversation.
///
/// Messages are append-only and ordered by creation; a session's first assistant
/// message is always the formatted analysis report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Monotonically increasing identifier assigned by the store
    pub id: u64,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_id: Option<Uuid>,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
