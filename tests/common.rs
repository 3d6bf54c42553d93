// ABOUTME: Shared test doubles - scripted language model, face and transcription adapters
// ABOUTME: Used by the pipeline and protocol integration tests
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Persona Insight

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs, dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use persona_insight::errors::{AppError, AppResult};
use persona_insight::llm::{ChatRequest, ChatResponse, LlmProvider};
use persona_insight::models::{BoundingBox, FaceAttributes, SubjectFace, TranscriptionResult};
use persona_insight::providers::{FaceProvider, ProviderCapabilities, TranscriptionProvider};

// =============================================================================
// Scripted Language Model
// =============================================================================

/// What the scripted model does on each completion call
pub enum LlmScript {
    /// Always return the same content
    Always(String),
    /// Fail when any message contains the needle, otherwise succeed
    FailWhenContains { needle: String, otherwise: String },
    /// Pop responses in order; `Err` entries become provider errors
    Sequence(Mutex<VecDeque<Result<String, String>>>),
}

pub struct ScriptedLlm {
    script: LlmScript,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn always(content: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            script: LlmScript::Always(content.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn fail_when_contains(
        needle: impl Into<String>,
        otherwise: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: LlmScript::FailWhenContains {
                needle: needle.into(),
                otherwise: otherwise.into(),
            },
            calls: AtomicUsize::new(0),
        })
    }

    pub fn sequence(responses: Vec<Result<&str, &str>>) -> Arc<Self> {
        Arc::new(Self {
            script: LlmScript::Sequence(Mutex::new(
                responses
                    .into_iter()
                    .map(|r| r.map(str::to_owned).map_err(str::to_owned))
                    .collect(),
            )),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn display_name(&self) -> &'static str {
        "Scripted"
    }

    fn default_model(&self) -> &str {
        "scripted-model"
    }

    fn available_models(&self) -> &'static [&'static str] {
        &["scripted-model"]
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let content = match &self.script {
            LlmScript::Always(content) => content.clone(),
            LlmScript::FailWhenContains { needle, otherwise } => {
                if request.messages.iter().any(|m| m.content.contains(needle)) {
                    return Err(AppError::provider_error("scripted", "scripted failure"));
                }
                otherwise.clone()
            }
            LlmScript::Sequence(responses) => {
                let next = responses.lock().unwrap().pop_front();
                match next {
                    Some(Ok(content)) => content,
                    Some(Err(message)) => {
                        return Err(AppError::provider_error("scripted", message))
                    }
                    None => return Err(AppError::provider_error("scripted", "script exhausted")),
                }
            }
        };

        Ok(ChatResponse {
            content,
            model: "scripted-model".to_owned(),
            usage: None,
            finish_reason: Some("stop".to_owned()),
        })
    }
}

// =============================================================================
// Scripted Capability Adapters
// =============================================================================

pub fn face(index: usize) -> SubjectFace {
    SubjectFace {
        index,
        bounding_box: BoundingBox {
            left: 0.1,
            top: 0.1,
            width: 0.2,
            height: 0.2,
        },
        age_range: None,
        gender: "unknown".to_owned(),
        emotions: BTreeMap::from([("calm".to_owned(), 0.8)]),
        attributes: FaceAttributes::default(),
    }
}

pub struct ScriptedFaces {
    detected: Option<usize>,
    calls: AtomicUsize,
}

impl ScriptedFaces {
    /// Detects the given number of faces on every call
    pub fn detecting(count: usize) -> Arc<Self> {
        Arc::new(Self {
            detected: Some(count),
            calls: AtomicUsize::new(0),
        })
    }

    /// Fails with a provider error on every call
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            detected: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FaceProvider for ScriptedFaces {
    fn name(&self) -> &'static str {
        "scripted-faces"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::EMOTIONS
    }

    async fn detect_faces(&self, _image: &Bytes) -> AppResult<Vec<SubjectFace>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.detected {
            Some(count) => Ok((0..count).map(face).collect()),
            None => Err(AppError::provider_error("scripted-faces", "scripted failure")),
        }
    }
}

pub struct ScriptedTranscriber {
    succeeds: bool,
}

impl ScriptedTranscriber {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self { succeeds: true })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self { succeeds: false })
    }
}

#[async_trait]
impl TranscriptionProvider for ScriptedTranscriber {
    fn name(&self) -> &'static str {
        "scripted-transcriber"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::empty()
    }

    async fn transcribe(&self, _audio: &Bytes) -> AppResult<TranscriptionResult> {
        if !self.succeeds {
            return Err(AppError::provider_error(
                "scripted-transcriber",
                "scripted failure",
            ));
        }
        Ok(TranscriptionResult {
            text: "scripted speech".to_owned(),
            provider: "scripted-transcriber".to_owned(),
            confidence: 0.9,
            utterances: Vec::new(),
            words: Vec::new(),
            emotions: Vec::new(),
            entities: Vec::new(),
            topics: Vec::new(),
        })
    }
}

/// A valid structured profile response for the fusion engine's parser
pub fn profile_json(summary: &str) -> String {
    format!(
        "{{\"summary\":\"{summary}\",\"personality_core\":\"Steady\",\
         \"growth_areas\":{{\"strengths\":[\"focus\"],\"challenges\":[],\
         \"development_path\":\"practice\"}}}}"
    )
}
