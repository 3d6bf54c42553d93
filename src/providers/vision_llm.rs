// ABOUTME: Generalist vision-LLM face adapter - second preference in the face chain
// ABOUTME: Asks a multimodal chat model for JSON face descriptions and normalizes them
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Persona Insight

//! # Vision-LLM Adapter
//!
//! Face analysis through a generalist multimodal chat model. Less precise than the
//! specialized face API but available wherever an OpenAI-style key is configured.
//! The model is instructed to emit one JSON object; the adapter tolerates markdown
//! code fences around it.

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, error, instrument};

use super::{FaceProvider, ProviderCapabilities};
use crate::errors::{AppError, AppResult};
use crate::models::{AgeRange, BoundingBox, FaceAttributes, SubjectFace};

const API_URL: &str = "https://api.openai.com/v1/chat/completions";

const VISION_MODEL: &str = "gpt-4o";

const DETECTION_PROMPT: &str = "Identify every distinct human face in this image, left to right. \
Respond with only a JSON object of the form \
{\"faces\":[{\"left\":0.0,\"top\":0.0,\"width\":0.0,\"height\":0.0,\
\"age_low\":0,\"age_high\":0,\"gender\":\"...\",\"emotions\":{\"name\":0.0}}]} \
where box coordinates are fractions of the image dimensions in [0,1] and emotion \
confidences are in [0,1]. Use \"unknown\" for gender when unclear.";

// ============================================================================
// Model Output Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct DescribedFaces {
    #[serde(default)]
    faces: Vec<DescribedFace>,
}

#[derive(Debug, Deserialize)]
struct DescribedFace {
    left: f64,
    top: f64,
    width: f64,
    height: f64,
    #[serde(default)]
    age_low: Option<u8>,
    #[serde(default)]
    age_high: Option<u8>,
    #[serde(default)]
    gender: Option<String>,
    #[serde(default)]
    emotions: BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

// ============================================================================
// Provider Implementation
// ============================================================================

/// Generalist vision-LLM face adapter
pub struct VisionLlmProvider {
    client: Client,
    api_key: Option<String>,
}

impl VisionLlmProvider {
    /// Create the adapter; `None` key makes it report `ProviderUnavailable`
    #[must_use]
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
        }
    }

    /// Strip optional markdown fences and parse the model's JSON payload
    fn parse_model_output(content: &str) -> AppResult<Vec<DescribedFace>> {
        let trimmed = content.trim();
        let inner = trimmed
            .strip_prefix("```json")
            .or_else(|| trimmed.strip_prefix("```"))
            .map_or(trimmed, |rest| rest.trim_end_matches("```").trim());

        let described: DescribedFaces = serde_json::from_str(inner).map_err(|e| {
            AppError::provider_error("vision-llm", format!("model output is not valid JSON: {e}"))
        })?;
        Ok(described.faces)
    }

    fn normalize_face(described: DescribedFace, index: usize) -> SubjectFace {
        let age_range = match (described.age_low, described.age_high) {
            (Some(low), Some(high)) if low <= high => Some(AgeRange { low, high }),
            _ => None,
        };

        SubjectFace {
            index,
            bounding_box: BoundingBox {
                left: described.left.clamp(0.0, 1.0),
                top: described.top.clamp(0.0, 1.0),
                width: described.width.clamp(0.0, 1.0),
                height: described.height.clamp(0.0, 1.0),
            },
            age_range,
            gender: described
                .gender
                .map_or_else(|| "unknown".to_owned(), |g| g.to_lowercase()),
            emotions: described
                .emotions
                .into_iter()
                .map(|(name, conf)| (name, conf.clamp(0.0, 1.0)))
                .collect(),
            attributes: FaceAttributes::default(),
        }
    }
}

#[async_trait]
impl FaceProvider for VisionLlmProvider {
    fn name(&self) -> &'static str {
        "vision-llm"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::AGE | ProviderCapabilities::GENDER | ProviderCapabilities::EMOTIONS
    }

    #[instrument(skip(self, image), fields(bytes = image.len()))]
    async fn detect_faces(&self, image: &Bytes) -> AppResult<Vec<SubjectFace>> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| AppError::provider_unavailable("vision-llm"))?;

        debug!("Sending vision detection request");

        let data_url = format!(
            "data:image/jpeg;base64,{}",
            general_purpose::STANDARD.encode(image)
        );

        let request = json!({
            "model": VISION_MODEL,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": DETECTION_PROMPT },
                    { "type": "image_url", "image_url": { "url": data_url } }
                ]
            }],
            "response_format": { "type": "json_object" },
            "temperature": 0.0,
        });

        let response = self
            .client
            .post(API_URL)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to send vision request: {}", e);
                AppError::provider_error("vision-llm", format!("Failed to connect: {e}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AppError::provider_error("vision-llm", format!("Failed to read response: {e}"))
        })?;

        if !status.is_success() {
            return Err(AppError::provider_error(
                "vision-llm",
                format!(
                    "API error ({status}): {}",
                    body.chars().take(200).collect::<String>()
                ),
            ));
        }

        let completion: ChatCompletion = serde_json::from_str(&body).map_err(|e| {
            AppError::provider_error("vision-llm", format!("Failed to parse response: {e}"))
        })?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::provider_error("vision-llm", "API returned no content"))?;

        let faces = Self::parse_model_output(&content)?;
        debug!("Vision model described {} faces", faces.len());

        Ok(faces
            .into_iter()
            .enumerate()
            .map(|(index, face)| Self::normalize_face(face, index))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model_output_with_fences() {
        let content = "```json\n{\"faces\":[{\"left\":0.1,\"top\":0.2,\"width\":0.3,\"height\":0.4,\"gender\":\"Male\",\"emotions\":{\"joy\":0.9}}]}\n```";
        let faces = VisionLlmProvider::parse_model_output(content).unwrap();
        assert_eq!(faces.len(), 1);

        let face = VisionLlmProvider::normalize_face(faces.into_iter().next().unwrap(), 0);
        assert_eq!(face.gender, "male");
        assert!((face.emotions["joy"] - 0.9).abs() < 1e-9);
        assert!(face.age_range.is_none());
    }

    #[test]
    fn test_parse_model_output_rejects_prose() {
        let err = VisionLlmProvider::parse_model_output("I see two people.").unwrap_err();
        assert_eq!(err.code, crate::errors::ErrorCode::ProviderError);
    }

    #[test]
    fn test_inverted_age_range_dropped() {
        let described = DescribedFace {
            left: 0.0,
            top: 0.0,
            width: 0.5,
            height: 0.5,
            age_low: Some(40),
            age_high: Some(20),
            gender: None,
            emotions: BTreeMap::new(),
        };
        let face = VisionLlmProvider::normalize_face(described, 2);
        assert!(face.age_range.is_none());
        assert_eq!(face.index, 2);
        assert_eq!(face.gender, "unknown");
    }
}
