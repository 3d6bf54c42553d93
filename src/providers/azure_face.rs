// ABOUTME: Cloud-vendor face-detection fallback adapter (Azure Face-style REST API)
// ABOUTME: Last preference in the face chain; key plus regional endpoint configuration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Persona Insight

//! # Azure Face Adapter
//!
//! Cloud-vendor fallback for face detection. Rectangles arrive in pixels and most
//! confidences already in [0, 1]; facial-hair intensities are thresholded into the
//! shared boolean flags.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, error, instrument};

use super::{FaceProvider, ProviderCapabilities};
use crate::config::AzureFaceCredentials;
use crate::errors::{AppError, AppResult};
use crate::models::{AgeRange, BoundingBox, FaceAttributes, PoseAngles, SubjectFace};

const RETURN_ATTRIBUTES: &str = "age,gender,smile,glasses,emotion,facialHair,headPose";

/// Facial-hair intensity above this counts as present
const FACIAL_HAIR_THRESHOLD: f64 = 0.5;

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiFace {
    face_rectangle: ApiRectangle,
    #[serde(default)]
    face_attributes: Option<ApiAttributes>,
}

#[derive(Debug, Deserialize)]
struct ApiRectangle {
    top: f64,
    left: f64,
    width: f64,
    height: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiAttributes {
    #[serde(default)]
    age: Option<f64>,
    #[serde(default)]
    gender: Option<String>,
    #[serde(default)]
    smile: Option<f64>,
    #[serde(default)]
    glasses: Option<String>,
    #[serde(default)]
    emotion: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    facial_hair: Option<ApiFacialHair>,
    #[serde(default)]
    head_pose: Option<ApiHeadPose>,
}

#[derive(Debug, Deserialize)]
struct ApiFacialHair {
    #[serde(default)]
    beard: f64,
    #[serde(default)]
    moustache: f64,
}

#[derive(Debug, Deserialize)]
struct ApiHeadPose {
    yaw: f64,
    pitch: f64,
    roll: f64,
}

// ============================================================================
// Provider Implementation
// ============================================================================

/// Cloud-vendor fallback face adapter
pub struct AzureFaceProvider {
    client: Client,
    credentials: Option<AzureFaceCredentials>,
}

impl AzureFaceProvider {
    /// Create the adapter; `None` credentials make it report `ProviderUnavailable`
    #[must_use]
    pub fn new(credentials: Option<AzureFaceCredentials>) -> Self {
        Self {
            client: Client::new(),
            credentials,
        }
    }

    /// Decode failures are reported as this adapter's error so the chain can
    /// fall through to an adapter that does not decode locally
    fn frame_dimensions(image: &Bytes) -> AppResult<(f64, f64)> {
        let decoded = image::load_from_memory(image).map_err(|e| {
            AppError::provider_error("azure-face", format!("cannot decode image: {e}"))
        })?;
        Ok((f64::from(decoded.width()), f64::from(decoded.height())))
    }

    fn normalize_face(api_face: ApiFace, index: usize, frame_w: f64, frame_h: f64) -> SubjectFace {
        let rect = api_face.face_rectangle;
        let bounding_box =
            BoundingBox::from_pixels(rect.left, rect.top, rect.width, rect.height, frame_w, frame_h);

        let attrs = api_face.face_attributes;

        let age_range = attrs.as_ref().and_then(|a| a.age).map(|age| {
            let center = age.clamp(0.0, 115.0);
            AgeRange {
                low: (center - 5.0).max(0.0) as u8,
                high: (center + 5.0).min(120.0) as u8,
            }
        });

        let gender = attrs
            .as_ref()
            .and_then(|a| a.gender.clone())
            .map_or_else(|| "unknown".to_owned(), |g| g.to_lowercase());

        // Emotion confidences are already in [0, 1]
        let emotions = attrs
            .as_ref()
            .and_then(|a| a.emotion.clone())
            .map(|emotion| {
                emotion
                    .into_iter()
                    .map(|(name, value)| (name, value.clamp(0.0, 1.0)))
                    .collect()
            })
            .unwrap_or_default();

        let glasses = attrs.as_ref().and_then(|a| a.glasses.as_deref());
        let facial_hair = attrs.as_ref().and_then(|a| a.facial_hair.as_ref());

        let attributes = FaceAttributes {
            smile: attrs.as_ref().and_then(|a| a.smile).map(|s| s.clamp(0.0, 1.0)),
            // Any value other than the explicit negative means glasses are worn
            eyeglasses: glasses.map(|g| !g.eq_ignore_ascii_case("noGlasses")),
            sunglasses: glasses.map(|g| g.eq_ignore_ascii_case("sunglasses")),
            beard: facial_hair.map(|fh| fh.beard > FACIAL_HAIR_THRESHOLD),
            mustache: facial_hair.map(|fh| fh.moustache > FACIAL_HAIR_THRESHOLD),
            pose: attrs.as_ref().and_then(|a| a.head_pose.as_ref()).map(|p| PoseAngles {
                yaw: p.yaw,
                pitch: p.pitch,
                roll: p.roll,
            }),
            quality: None,
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
impl FaceProvider for AzureFaceProvider {
    fn name(&self) -> &'static str {
        "azure-face"
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
            .ok_or_else(|| AppError::provider_unavailable("azure-face"))?;

        let (frame_w, frame_h) = Self::frame_dimensions(image)?;

        debug!("Sending detect request to Azure Face");

        let url = format!(
            "{}/face/v1.0/detect?returnFaceAttributes={RETURN_ATTRIBUTES}",
            credentials.endpoint.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .header("Ocp-Apim-Subscription-Key", &credentials.api_key)
            .header("Content-Type", "application/octet-stream")
            .body(image.clone())
            .send()
            .await
            .map_err(|e| {
                error!("Failed to send request to Azure Face API: {}", e);
                AppError::provider_error("azure-face", format!("Failed to connect: {e}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AppError::provider_error("azure-face", format!("Failed to read response: {e}"))
        })?;

        if !status.is_success() {
            return Err(AppError::provider_error(
                "azure-face",
                format!(
                    "API error ({status}): {}",
                    body.chars().take(200).collect::<String>()
                ),
            ));
        }

        let faces: Vec<ApiFace> = serde_json::from_str(&body).map_err(|e| {
            AppError::provider_error("azure-face", format!("Failed to parse response: {e}"))
        })?;

        debug!("Azure Face detected {} faces", faces.len());

        Ok(faces
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
    fn test_facial_hair_thresholding() {
        let api_face = ApiFace {
            face_rectangle: ApiRectangle {
                top: 0.0,
                left: 0.0,
                width: 100.0,
                height: 100.0,
            },
            face_attributes: Some(ApiAttributes {
                age: Some(42.0),
                gender: None,
                smile: Some(0.3),
                glasses: Some("sunglasses".to_owned()),
                emotion: Some(BTreeMap::from([("neutral".to_owned(), 0.95)])),
                facial_hair: Some(ApiFacialHair {
                    beard: 0.8,
                    moustache: 0.1,
                }),
                head_pose: None,
            }),
        };

        let face = AzureFaceProvider::normalize_face(api_face, 1, 1000.0, 1000.0);
        assert_eq!(face.attributes.beard, Some(true));
        assert_eq!(face.attributes.mustache, Some(false));
        assert_eq!(face.attributes.sunglasses, Some(true));
        assert_eq!(face.gender, "unknown");
        assert_eq!(face.age_range, Some(AgeRange { low: 37, high: 47 }));
    }

    #[test]
    fn test_plain_glasses_value_counts_as_eyeglasses() {
        let api_face = ApiFace {
            face_rectangle: ApiRectangle {
                top: 0.0,
                left: 0.0,
                width: 100.0,
                height: 100.0,
            },
            face_attributes: Some(ApiAttributes {
                age: None,
                gender: None,
                smile: None,
                glasses: Some("glasses".to_owned()),
                emotion: None,
                facial_hair: None,
                head_pose: None,
            }),
        };

        let face = AzureFaceProvider::normalize_face(api_face, 0, 1000.0, 1000.0);
        assert_eq!(face.attributes.eyeglasses, Some(true));
        assert_eq!(face.attributes.sunglasses, Some(false));
    }

    #[test]
    fn test_no_glasses_value_maps_to_false() {
        let api_face = ApiFace {
            face_rectangle: ApiRectangle {
                top: 0.0,
                left: 0.0,
                width: 100.0,
                height: 100.0,
            },
            face_attributes: Some(ApiAttributes {
                age: None,
                gender: None,
                smile: None,
                glasses: Some("noGlasses".to_owned()),
                emotion: None,
                facial_hair: None,
                head_pose: None,
            }),
        };

        let face = AzureFaceProvider::normalize_face(api_face, 0, 1000.0, 1000.0);
        assert_eq!(face.attributes.eyeglasses, Some(false));
    }

    #[test]
    fn test_undecodable_image_is_a_recoverable_provider_error() {
        let err =
            AzureFaceProvider::frame_dimensions(&Bytes::from_static(b"not-an-image")).unwrap_err();
        assert_eq!(err.code, crate::errors::ErrorCode::ProviderError);
    }

    #[tokio::test]
    async fn test_missing_credentials_is_unavailable() {
        let provider = AzureFaceProvider::new(None);
        let err = provider
            .detect_faces(&Bytes::from_static(b"img"))
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::errors::ErrorCode::ProviderUnavailable);
    }
}
