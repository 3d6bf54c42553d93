// ABOUTME: Insight fusion engine - merges provider outputs and fans out per-subject model calls
// ABOUTME: One bad subject folds into a placeholder profile, never aborts its siblings
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Persona Insight

//! # Insight Fusion Engine
//!
//! Merges face-analysis, transcription and optional deep video insights into one
//! analysis request per detected subject, runs the per-subject model calls
//! concurrently, and folds the results back by positional index. Transcription
//! and video data are shared context for every subject since speech is not
//! attributable to a specific face.
//!
//! Group-dynamics synthesis runs only after the individual profiles, and only
//! when at least two of them succeeded.

pub mod prompts;

use futures_util::future::join_all;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::errors::{AppError, AppResult};
use crate::llm::{ChatMessage, ModelRegistry};
use crate::models::{
    DetailedAnalysis, GrowthAreas, PersonalityInsights, SpeechAnalysis, SubjectFace,
    SubjectProfile, TranscriptionResult, VideoInsights,
};

/// Substituted when the group-synthesis model call fails
const GROUP_DYNAMICS_UNAVAILABLE: &str = "Group dynamics analysis unavailable";

// ============================================================================
// Model Output Shape
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct ProfilePayload {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    personality_core: Option<String>,
    #[serde(default)]
    cognitive_style: Option<String>,
    #[serde(default)]
    speech_analysis: Option<SpeechPayload>,
    #[serde(default)]
    relationship_inferences: Option<String>,
    #[serde(default)]
    growth_areas: Option<GrowthPayload>,
}

#[derive(Debug, Default, Deserialize)]
struct SpeechPayload {
    #[serde(default)]
    observations: Option<String>,
    #[serde(default)]
    key_quotes: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GrowthPayload {
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    challenges: Vec<String>,
    #[serde(default)]
    development_path: Option<String>,
}

// ============================================================================
// Engine
// ============================================================================

/// Fuses normalized provider outputs into per-subject personality profiles
pub struct FusionEngine {
    registry: Arc<ModelRegistry>,
}

impl FusionEngine {
    #[must_use]
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    /// Analyze every detected subject and fuse the results.
    ///
    /// Per-subject model calls run concurrently; results are written back into
    /// their positional-index slot, so output order always matches face order.
    /// A failed subject yields a placeholder profile instead of an error.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when `faces` is empty; `AllModelsUnavailable` when zero
    /// models are configured.
    #[instrument(skip_all, fields(subjects = faces.len()))]
    pub async fn analyze_subjects(
        &self,
        requested_model: Option<&str>,
        faces: &[SubjectFace],
        transcription: Option<&TranscriptionResult>,
        video_insights: Option<&VideoInsights>,
    ) -> AppResult<PersonalityInsights> {
        if faces.is_empty() {
            return Err(AppError::invalid_input(
                "cannot fuse insights without at least one detected subject",
            ));
        }
        self.registry.ensure_available()?;

        let total = faces.len();
        let calls = faces.iter().map(|face| {
            let prompt = prompts::subject_prompt(face, total, transcription, video_insights);
            let index = face.index;
            async move {
                let outcome = self
                    .registry
                    .generate(
                        requested_model,
                        prompts::ANALYSIS_SYSTEM_INSTRUCTION,
                        vec![ChatMessage::user(prompt)],
                    )
                    .await;
                (index, outcome)
            }
        });

        let mut slots: Vec<Option<SubjectProfile>> = vec![None; total];
        for (index, outcome) in join_all(calls).await {
            let profile = match outcome {
                Ok(content) => parse_profile(&content, index),
                Err(e) => {
                    // One bad subject must not void its siblings
                    warn!(subject = index, "subject analysis failed: {}", e);
                    SubjectProfile::placeholder(index)
                }
            };
            if let Some(slot) = slots.get_mut(index) {
                *slot = Some(profile);
            }
        }

        let profiles: Vec<SubjectProfile> = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| slot.unwrap_or_else(|| SubjectProfile::placeholder(index)))
            .collect();

        if total == 1 {
            let profile = profiles
                .into_iter()
                .next()
                .ok_or_else(|| AppError::internal("subject slot vanished during fan-out"))?;
            return Ok(PersonalityInsights::Single { profile });
        }

        let succeeded = profiles.iter().filter(|p| !p.is_placeholder).count();
        let group_dynamics = if succeeded >= 2 {
            Some(self.synthesize_group(requested_model, &profiles).await)
        } else {
            debug!(succeeded, "skipping group synthesis, too few successful profiles");
            None
        };

        Ok(PersonalityInsights::Group {
            profiles,
            group_dynamics,
        })
    }

    /// Analyze raw text or extracted document text as one synthetic subject
    #[instrument(skip_all, fields(chars = text.len()))]
    pub async fn analyze_text(
        &self,
        requested_model: Option<&str>,
        text: &str,
    ) -> AppResult<PersonalityInsights> {
        if text.trim().is_empty() {
            return Err(AppError::invalid_input("cannot analyze empty text"));
        }
        self.registry.ensure_available()?;

        let content = self
            .registry
            .generate(
                requested_model,
                prompts::ANALYSIS_SYSTEM_INSTRUCTION,
                vec![ChatMessage::user(prompts::text_prompt(text))],
            )
            .await?;

        Ok(PersonalityInsights::Single {
            profile: parse_profile(&content, 0),
        })
    }

    /// Group synthesis degrades to a placeholder string on failure
    async fn synthesize_group(
        &self,
        requested_model: Option<&str>,
        profiles: &[SubjectProfile],
    ) -> String {
        let outcome = self
            .registry
            .generate(
                requested_model,
                prompts::GROUP_SYSTEM_INSTRUCTION,
                vec![ChatMessage::user(prompts::group_prompt(profiles))],
            )
            .await;

        match outcome {
            Ok(narrative) => narrative,
            Err(e) => {
                warn!("group synthesis failed: {}", e);
                GROUP_DYNAMICS_UNAVAILABLE.to_owned()
            }
        }
    }
}

/// Parse the model's JSON profile, tolerating markdown fences.
///
/// Unparseable output degrades to a profile whose summary is the raw text;
/// losing structure is better than losing the subject.
fn parse_profile(content: &str, subject_index: usize) -> SubjectProfile {
    let trimmed = content.trim();
    let inner = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map_or(trimmed, |rest| rest.trim_end_matches("```").trim());

    let payload: ProfilePayload = match serde_json::from_str(inner) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(subject = subject_index, "profile output is not JSON, keeping raw text: {}", e);
            return SubjectProfile {
                subject_index,
                label: format!("Person {}", subject_index + 1),
                summary: trimmed.to_owned(),
                detailed: DetailedAnalysis::default(),
                is_placeholder: false,
            };
        }
    };

    let detailed = DetailedAnalysis {
        personality_core: payload.personality_core,
        cognitive_style: payload.cognitive_style,
        speech_analysis: payload.speech_analysis.map(|s| SpeechAnalysis {
            observations: s.observations,
            key_quotes: s.key_quotes,
        }),
        relationship_inferences: payload.relationship_inferences,
        growth_areas: payload.growth_areas.map(|g| GrowthAreas {
            strengths: g.strengths,
            challenges: g.challenges,
            development_path: g.development_path,
        }),
    };

    SubjectProfile {
        subject_index,
        label: format!("Person {}", subject_index + 1),
        summary: payload
            .summary
            .unwrap_or_else(|| "No summary provided".to_owned()),
        detailed,
        is_placeholder: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_profile_structured() {
        let content = r#"{"summary":"Direct and curious","personality_core":"Explorer",
            "growth_areas":{"strengths":["focus"],"challenges":[],"development_path":null}}"#;
        let profile = parse_profile(content, 2);

        assert_eq!(profile.label, "Person 3");
        assert_eq!(profile.summary, "Direct and curious");
        assert!(!profile.is_placeholder);
        let growth = profile.detailed.growth_areas.unwrap();
        assert_eq!(growth.strengths, vec!["focus".to_owned()]);
    }

    #[test]
    fn test_parse_profile_with_fences() {
        let content = "```json\n{\"summary\":\"Reserved\"}\n```";
        let profile = parse_profile(content, 0);
        assert_eq!(profile.summary, "Reserved");
    }

    #[test]
    fn test_unparseable_profile_keeps_raw_text() {
        let profile = parse_profile("They seem thoughtful and warm.", 1);
        assert_eq!(profile.summary, "They seem thoughtful and warm.");
        assert!(!profile.is_placeholder);
        assert!(profile.detailed.personality_core.is_none());
    }
}
