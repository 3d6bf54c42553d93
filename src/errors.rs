// ABOUTME: Unified error handling system with typed error codes for the analysis pipeline
// ABOUTME: Distinguishes recoverable provider failures from fatal pipeline failures
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Persona Insight

//! # Unified Error Handling System
//!
//! Centralized error types for the analysis orchestration core. The taxonomy encodes
//! the recovery policy directly: provider-level codes are recoverable within a
//! fallback chain, subject-level codes degrade to placeholders, and pipeline-level
//! codes propagate to the caller as user-visible errors.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Standard error codes used throughout the analysis core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Provider failures (1000-1999) - recoverable inside a fallback chain
    /// Credentials/configuration for a provider are absent; skip to the next adapter
    #[serde(rename = "PROVIDER_UNAVAILABLE")]
    ProviderUnavailable = 1000,
    /// A configured provider was called but failed (network, quota, parse)
    #[serde(rename = "PROVIDER_ERROR")]
    ProviderError = 1001,
    /// Every adapter in a fallback chain was unavailable or failed
    #[serde(rename = "NO_PROVIDER_AVAILABLE")]
    NoProviderAvailable = 1002,

    // Media handling (2000-2999)
    /// Requested video segment bounds are impossible given the actual duration
    #[serde(rename = "INVALID_SEGMENT")]
    InvalidSegment = 2000,
    /// Media bytes could not be decoded/processed at all
    #[serde(rename = "MEDIA_ERROR")]
    MediaError = 2001,

    // Language models (3000-3999)
    /// Zero language-model collaborators are configured; fatal before any media work
    #[serde(rename = "ALL_MODELS_UNAVAILABLE")]
    AllModelsUnavailable = 3000,
    /// One subject's per-profile model call failed during fan-out
    #[serde(rename = "SUBJECT_ANALYSIS_FAILURE")]
    SubjectAnalysisFailure = 3001,

    // Validation (4000-4999)
    #[serde(rename = "INVALID_INPUT")]
    InvalidInput = 4000,
    #[serde(rename = "RESOURCE_NOT_FOUND")]
    ResourceNotFound = 4001,

    // Configuration (6000-6999)
    #[serde(rename = "CONFIG_ERROR")]
    ConfigError = 6000,

    // Internal (9000-9999)
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError = 9000,
    #[serde(rename = "STORAGE_ERROR")]
    StorageError = 9001,
    #[serde(rename = "SERIALIZATION_ERROR")]
    SerializationError = 9002,
}

impl ErrorCode {
    /// Whether a fallback chain may recover from this error by moving to the
    /// next adapter. Pipeline-level codes always return `false`.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::ProviderUnavailable | Self::ProviderError)
    }

    /// Get a user-friendly description of this error
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::ProviderUnavailable => "Provider is not configured",
            Self::ProviderError => "An external provider encountered an error",
            Self::NoProviderAvailable => "No provider could serve the request",
            Self::InvalidSegment => "The requested video segment is out of range",
            Self::MediaError => "The uploaded media could not be processed",
            Self::AllModelsUnavailable => "No language model is configured",
            Self::SubjectAnalysisFailure => "Analysis failed for one detected subject",
            Self::InvalidInput => "The provided input is invalid",
            Self::ResourceNotFound => "The requested resource was not found",
            Self::ConfigError => "Configuration error encountered",
            Self::InternalError => "An internal error occurred",
            Self::StorageError => "Storage operation failed",
            Self::SerializationError => "Data serialization/deserialization failed",
        }
    }
}

/// Additional context that can be attached to errors
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Provider name, when the error came out of an adapter
    pub provider: Option<String>,
    /// Session identifier if available
    pub session_id: Option<String>,
    /// Analysis identifier if applicable
    pub analysis_id: Option<String>,
    /// Additional key-value context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Unified error type for the analysis core
#[derive(Debug, Error)]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Additional context
    pub context: ErrorContext,
    /// Source error for error chaining
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new `AppError` with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Attach the provider name that produced this error
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.context.provider = Some(provider.into());
        self
    }

    /// Attach a session identifier
    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.context.session_id = Some(session_id.into());
        self
    }

    /// Attach an analysis identifier
    #[must_use]
    pub fn with_analysis_id(mut self, analysis_id: impl Into<String>) -> Self {
        self.context.analysis_id = Some(analysis_id.into());
        self
    }

    /// Attach structured details
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.context.details = Some(details);
        self
    }

    /// Add a source error for error chaining
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Whether a fallback chain may recover from this error
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        self.code.is_recoverable()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context.provider {
            Some(provider) => write!(
                f,
                "{} [{provider}]: {}",
                self.code.description(),
                self.message
            ),
            None => write!(f, "{}: {}", self.code.description(), self.message),
        }
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// Serializable error shape handed to outer layers (HTTP, export, mail)
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        Self {
            code: error.code,
            message: error.message,
            provider: error.context.provider,
            details: error.context.details,
        }
    }
}

/// Convenience constructors for the common cases
impl AppError {
    /// Provider credentials/configuration missing. Expected and common; callers
    /// log this at debug, never as an error.
    pub fn provider_unavailable(provider: impl Into<String>) -> Self {
        let provider = provider.into();
        Self::new(
            ErrorCode::ProviderUnavailable,
            format!("{provider} credentials are not configured"),
        )
        .with_provider(provider)
    }

    /// A configured provider was called but failed at runtime
    pub fn provider_error(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ProviderError, message).with_provider(provider)
    }

    /// Every adapter in a chain was skipped or failed
    pub fn no_provider_available(capability: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::NoProviderAvailable,
            format!("no {} provider could serve the request", capability.into()),
        )
    }

    /// Requested segment bounds are impossible; carries the valid range
    pub fn invalid_segment(requested_start: f64, total_duration: f64) -> Self {
        Self::new(
            ErrorCode::InvalidSegment,
            format!(
                "segment start {requested_start:.1}s is beyond the video length; valid range is 0.0-{total_duration:.1}s"
            ),
        )
        .with_details(serde_json::json!({
            "requested_start": requested_start,
            "total_duration": total_duration,
        }))
    }

    /// Media decode/processing failure
    pub fn media(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MediaError, message)
    }

    /// Zero language models configured
    pub fn all_models_unavailable() -> Self {
        Self::new(
            ErrorCode::AllModelsUnavailable,
            "no language model is configured; set at least one model API key",
        )
    }

    /// One subject's model call failed during fan-out
    pub fn subject_analysis(subject_index: usize, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SubjectAnalysisFailure, message).with_details(serde_json::json!({
            "subject_index": subject_index,
        }))
    }

    /// Invalid input
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Resource not found
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ResourceNotFound,
            format!("{} not found", resource.into()),
        )
    }

    /// Configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StorageError, message)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::new(ErrorCode::SerializationError, error.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        match error.source() {
            Some(source) => Self::new(ErrorCode::InternalError, error.to_string()).with_details(
                serde_json::json!({
                    "source": source.to_string()
                }),
            ),
            None => Self::new(ErrorCode::InternalError, error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverability_split() {
        assert!(ErrorCode::ProviderUnavailable.is_recoverable());
        assert!(ErrorCode::ProviderError.is_recoverable());
        assert!(!ErrorCode::NoProviderAvailable.is_recoverable());
        assert!(!ErrorCode::InvalidSegment.is_recoverable());
        assert!(!ErrorCode::AllModelsUnavailable.is_recoverable());
    }

    #[test]
    fn test_app_error_creation() {
        let error = AppError::provider_error("assembly", "timed out")
            .with_session_id("sess-1")
            .with_analysis_id("an-9");

        assert_eq!(error.code, ErrorCode::ProviderError);
        assert_eq!(error.context.provider.as_deref(), Some("assembly"));
        assert!(error.context.session_id.is_some());
        assert!(error.context.analysis_id.is_some());
    }

    #[test]
    fn test_invalid_segment_carries_valid_range() {
        let error = AppError::invalid_segment(42.0, 30.0);
        let details = error.context.details.expect("details attached");
        assert_eq!(details["total_duration"], 30.0);
        assert!(error.message.contains("0.0-30.0"));
    }

    #[test]
    fn test_error_response_serialization() {
        let error = AppError::no_provider_available("face-analysis");
        let response = ErrorResponse::from(error);

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("NO_PROVIDER_AVAILABLE"));
        assert!(json.contains("face-analysis"));
    }
}
