// ABOUTME: Specialized face-API adapter (Face++-style detect endpoint)
// ABOUTME: Converts pixel rectangles and percent confidences into normalized shared shapes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Persona Insight

//! # Face++ Adapter
//!
//! First-preference face-analysis adapter: a specialized face API with the richest
//! attribute set (age, gender, emotions, smile, head pose, quality). The API
//! reports rectangles in pixels and confidences in [0, 100]; both are normalized
//! here before anything leaves the adapter.

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, error, instrument};

use super::{FaceProvider, ProviderCapabilities};
use crate::config::FacePlusCredentials;
use crate::errors::{AppError, AppResult};
use crate::models::{AgeRange, BoundingBox, FaceAttributes, PoseAngles, SubjectFace};

const API_URL: &str = "https://api-us.faceplusplus.com/facepp/v3/detect";

const RETURN_ATTRIBUTES: &str = "age,gender,emotion,smiling,headpose,facequality";

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    faces: Vec<ApiFace>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiFace {
    face_rectangle: ApiRectangle,
    #[serde(default)]
    attributes: Option<ApiAttributes>,
}

#[derive(Debug, Deserialize)]
struct ApiRectangle {
    top: f64,
    left: f64,
    width: f64,
    height: f64,
}

#[derive(Debug, Deserialize)]
struct ApiAttributes {
    #[serde(default)]
    age: Option<ApiValue>,
    #[serde(default)]
    gender: Option<ApiStringValue>,
    #[serde(default)]
    emotion: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    smile: Option<ApiValue>,
    #[serde(default)]
    headpose: Option<ApiHeadPose>,
    #[serde(default)]
    facequality: Option<ApiValue>,
}

#[derive(Debug, Deserialize)]
struct ApiValue {
    value: f64,
}

#[derive(Debug, Deserialize)]
struct ApiStringValue {
    value: String,
}

#[derive(Debug, Deserialize)]
struct ApiHeadPose {
    yaw_angle: f64,
    pitch_angle: f64,
    roll_angle: f64,
}

// ============================================================================
// Provider Implementation
// ============================================================================

/// Specialized face-API adapter
pub struct FacePlusProvider {
    client: Client,
    credentials: Option<FacePlusCredentials>,
}

impl FacePlusProvider {
    /// Create the adapter; `None` credentials make it report `ProviderUnavailable`
    #[must_use]
    pub fn new(credentials: Option<FacePlusCredentials>) -> Self {
        Self {
            client: Client::new(),
            credentials,
        }
    }

    /// Decode just enough of the image to learn its pixel dimensions.
    ///
    /// A local decode failure is this adapter's failure, not the media's: a
    /// format outside the decoder's support may still be served by the next
    /// adapter in the chain.
    fn frame_dimensions(image: &Bytes) -> AppResult<(f64, f64)> {
        let decoded = image::load_from_memory(image)
            .map_err(|e| AppError::provider_error("faceplus", format!("cannot decode image: {e}")))?;
        Ok((f64::from(decoded.width()), f64::from(decoded.height())))
    }

    fn normalize_face(api_face: ApiFace, index: usize, frame_w: f64, frame_h: f64) -> SubjectFace {
        let rect = api_face.face_rectangle;
        let bounding_box =
            BoundingBox::from_pixels(rect.left, rect.top, rect.width, rect.height, frame_w, frame_h);

        let attrs = api_face.attributes;

        let age_range = attrs.as_ref().and_then(|a| a.age.as_ref()).map(|age| {
            // The API reports a point estimate; widen it to a +/-5 year band
            let center = age.value.clamp(0.0, 115.0);
            AgeRange {
                low: (center - 5.0).max(0.0) as u8,
                high: (center + 5.0).min(120.0) as u8,
            }
        });

        let gender = attrs
            .as_ref()
            .and_then(|a| a.gender.as_ref())
            .map_or_else(|| "unknown".to_owned(), |g| g.value.to_lowercase());

        // Emotion confidences arrive in [0, 100]
        let emotions = attrs
            .as_ref()
            .and_then(|a| a.emotion.as_ref())
            .map(|emotion| {
                emotion
                    .iter()
                    .map(|(name, value)| (name.clone(), (value / 100.0).clamp(0.0, 1.0)))
                    .collect()
            })
            .unwrap_or_default();

        let attributes = FaceAttributes {
            smile: attrs
                .as_ref()
                .and_then(|a| a.smile.as_ref())
                .map(|s| (s.value / 100.0).clamp(0.0, 1.0)),
            pose: attrs.as_ref().and_then(|a| a.headpose.as_ref()).map(|p| PoseAngles {
                yaw: p.yaw_angle,
                pitch: p.pitch_angle,
                roll: p.roll_angle,
            }),
            quality: attrs
                .as_ref()
                .and_then(|a| a.facequality.as_ref())
                .map(|q| (q.value / 100.0).clamp(0.0, 1.0)),
            ..FaceAttributes::default()
        };

        SubjectFace {
            index,
            bounding_box,
            age_range,
            gender,
            emotions,
            attributes,
        }
    }
}

#[async_trait]
impl FaceProvider for FacePlusProvider {
    fn name(&self) -> &'static str {
        "faceplus"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::AGE
            | ProviderCapabilities::GENDER
            | ProviderCapabilities::EMOTIONS
            | ProviderCapabilities::ATTRIBUTES
    }

    #[instrument(skip(self, image), fields(bytes = image.len()))]
    async fn detect_faces(&self, image: &Bytes) -> AppResult<Vec<SubjectFace>> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or_else(|| AppError::provider_unavailable("faceplus"))?;

        let (frame_w, frame_h) = Self::frame_dimensions(image)?;

        debug!("Sending detect request to Face++");

        let form = [
            ("api_key", credentials.api_key.clone()),
            ("api_secret", credentials.api_secret.clone()),
            ("image_base64", general_purpose::STANDARD.encode(image)),
            ("return_attributes", RETURN_ATTRIBUTES.to_owned()),
        ];

        let response = self
            .client
            .post(API_URL)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to send request to Face++ API: {}", e);
                AppError::provider_error("faceplus", format!("Failed to connect: {e}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AppError::provider_error("faceplus", format!("Failed to read response: {e}"))
        })?;

        if !status.is_success() {
            return Err(AppError::provider_error(
                "faceplus",
                format!(
                    "API error ({status}): {}",
                    body.chars().take(200).collect::<String>()
                ),
            ));
        }

        let detect: DetectResponse = serde_json::from_str(&body).map_err(|e| {
            AppError::provider_error("faceplus", format!("Failed to parse response: {e}"))
        })?;

        if let Some(message) = detect.error_message {
            return Err(AppError::provider_error("faceplus", message));
        }

        debug!("Face++ detected {} faces", detect.faces.len());

        Ok(detect
            .faces
            .into_iter()
            .enumerate()
            .map(|(index, face)| Self::normalize_face(face, index, frame_w, frame_h))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization_of_pixel_box_and_percent_confidences() {
        let api_face = ApiFace {
            face_rectangle: ApiRectangle {
                top: 100.0,
                left: 200.0,
                width: 400.0,
                height: 500.0,
            },
            attributes: Some(ApiAttributes {
                age: Some(ApiValue { value: 30.0 }),
                gender: Some(ApiStringValue {
                    value: "Female".to_owned(),
                }),
                emotion: Some(BTreeMap::from([
                    ("happiness".to_owned(), 87.5),
                    ("neutral".to_owned(), 12.5),
                ])),
                smile: Some(ApiValue { value: 60.0 }),
                headpose: None,
                facequality: Some(ApiValue { value: 90.0 }),
            }),
        };

        let face = FacePlusProvider::normalize_face(api_face, 0, 2000.0, 1000.0);

        assert!((face.bounding_box.left - 0.1).abs() < 1e-9);
        assert!((face.bounding_box.top - 0.1).abs() < 1e-9);
        assert!((face.bounding_box.width - 0.2).abs() < 1e-9);
        assert!((face.bounding_box.height - 0.5).abs() < 1e-9);
        assert_eq!(face.gender, "female");
        assert_eq!(face.age_range, Some(AgeRange { low: 25, high: 35 }));
        assert!((face.emotions["happiness"] - 0.875).abs() < 1e-9);
        assert!((face.attributes.smile.unwrap() - 0.6).abs() < 1e-9);
        assert!((face.attributes.quality.unwrap() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_undecodable_image_is_a_recoverable_provider_error() {
        let err = FacePlusProvider::frame_dimensions(&Bytes::from_static(b"not-an-image"))
            .unwrap_err();
        // Recoverable, so the chain falls through to the next adapter
        assert_eq!(err.code, crate::errors::ErrorCode::ProviderError);
    }

    #[tokio::test]
    async fn test_missing_credentials_is_unavailable_without_network() {
        let provider = FacePlusProvider::new(None);
        let err = provider
            .detect_faces(&Bytes::from_static(b"not-an-image"))
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::errors::ErrorCode::ProviderUnavailable);
    }
}
