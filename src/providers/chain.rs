// ABOUTME: Fallback chain executor - tries adapters strictly in order, first success wins
// ABOUTME: Never merges partial results from two providers for the same capability call
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Persona Insight

//! # Fallback Chain Executor
//!
//! Runs an ordered list of adapters for one capability. Adapters are tried
//! strictly sequentially - no speculative racing, since most target APIs bill per
//! call. `ProviderUnavailable` (missing credential) skips silently;
//! `ProviderError` is logged with the provider name and the chain moves on. The
//! first success is returned immediately, truncated to the caller's bound; two
//! providers' data is never combined for one capability call.

use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{FaceProvider, TranscriptionProvider};
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::models::{SubjectFace, TranscriptionResult};

/// Outcome of a chain run: the normalized result plus which provider served it
#[derive(Debug, Clone)]
pub struct ChainOutcome<T> {
    pub result: T,
    /// Name of the adapter that ultimately served the request
    pub provider: &'static str,
}

/// Ordered fallback chain over face-analysis adapters.
///
/// Preference order is fixed by the integrator at construction (quality/cost
/// ranked, e.g. specialized face API before generalist vision before cloud
/// vendor).
pub struct FaceChain {
    adapters: Vec<Arc<dyn FaceProvider>>,
}

impl FaceChain {
    /// Build a chain from adapters in preference order
    #[must_use]
    pub fn new(adapters: Vec<Arc<dyn FaceProvider>>) -> Self {
        Self { adapters }
    }

    /// Number of adapters in the chain
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether the chain has no adapters at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Run the chain. The first adapter to succeed wins; its result is truncated
    /// to `max_results` subjects (prefix order, so positional indexes stay
    /// contiguous from zero).
    ///
    /// # Errors
    ///
    /// `NoProviderAvailable` when every adapter was skipped or failed. This is
    /// fatal for an analysis: a report with zero subjects is useless.
    pub async fn detect(
        &self,
        image: &Bytes,
        max_results: usize,
    ) -> AppResult<ChainOutcome<Vec<SubjectFace>>> {
        for adapter in &self.adapters {
            match adapter.detect_faces(image).await {
                Ok(mut faces) => {
                    faces.truncate(max_results);
                    info!(
                        provider = adapter.name(),
                        subjects = faces.len(),
                        "face detection served"
                    );
                    return Ok(ChainOutcome {
                        result: faces,
                        provider: adapter.name(),
                    });
                }
                Err(e) if e.code == ErrorCode::ProviderUnavailable => {
                    // Expected and common; not an error condition
                    debug!(provider = adapter.name(), "skipping unconfigured adapter");
                }
                Err(e) if e.is_recoverable() => {
                    warn!(provider = adapter.name(), error = %e, "face adapter failed, trying next");
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::no_provider_available("face-analysis"))
    }
}

/// Ordered fallback chain over transcription adapters
pub struct TranscriptionChain {
    adapters: Vec<Arc<dyn TranscriptionProvider>>,
}

impl TranscriptionChain {
    /// Build a chain from adapters in preference order
    #[must_use]
    pub fn new(adapters: Vec<Arc<dyn TranscriptionProvider>>) -> Self {
        Self { adapters }
    }

    /// Number of adapters in the chain
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether the chain has no adapters at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Run the chain, first success wins.
    ///
    /// # Errors
    ///
    /// `NoProviderAvailable` when every adapter was skipped or failed. Callers on
    /// the analysis path convert this to [`TranscriptionResult::unavailable`]
    /// via [`Self::transcribe_or_placeholder`]; speech loss reduces a report's
    /// richness but never blocks its delivery.
    pub async fn transcribe(
        &self,
        audio: &Bytes,
    ) -> AppResult<ChainOutcome<TranscriptionResult>> {
        for adapter in &self.adapters {
            match adapter.transcribe(audio).await {
                Ok(result) => {
                    info!(
                        provider = adapter.name(),
                        utterances = result.utterances.len(),
                        "transcription served"
                    );
                    return Ok(ChainOutcome {
                        result,
                        provider: adapter.name(),
                    });
                }
                Err(e) if e.code == ErrorCode::ProviderUnavailable => {
                    debug!(provider = adapter.name(), "skipping unconfigured adapter");
                }
                Err(e) if e.is_recoverable() => {
                    warn!(provider = adapter.name(), error = %e, "transcription adapter failed, trying next");
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::no_provider_available("transcription"))
    }

    /// Run the chain, degrading to the documented placeholder when exhausted.
    ///
    /// This is the soft half of the fatal-vs-soft asymmetry: a report is still
    /// useful with partial speech data.
    pub async fn transcribe_or_placeholder(&self, audio: &Bytes) -> TranscriptionResult {
        match self.transcribe(audio).await {
            Ok(outcome) => outcome.result,
            Err(e) => {
                warn!(error = %e, "all transcription adapters exhausted; using placeholder");
                TranscriptionResult::unavailable()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BoundingBox, FaceAttributes};
    use crate::providers::ProviderCapabilities;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Face adapter scripted to be unavailable, fail, or return N subjects
    struct ScriptedFace {
        name: &'static str,
        outcome: FaceScript,
        calls: AtomicUsize,
    }

    enum FaceScript {
        Unavailable,
        Fails,
        Returns(usize),
    }

    impl ScriptedFace {
        fn new(name: &'static str, outcome: FaceScript) -> Arc<Self> {
            Arc::new(Self {
                name,
                outcome,
                calls: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FaceProvider for ScriptedFace {
        fn name(&self) -> &'static str {
            self.name
        }

        fn capabilities(&self) -> ProviderCapabilities {
            ProviderCapabilities::empty()
        }

        async fn detect_faces(&self, _image: &Bytes) -> AppResult<Vec<SubjectFace>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.outcome {
                FaceScript::Unavailable => Err(AppError::provider_unavailable(self.name)),
                FaceScript::Fails => Err(AppError::provider_error(self.name, "scripted failure")),
                FaceScript::Returns(n) => Ok((0..n)
                    .map(|index| SubjectFace {
                        index,
                        bounding_box: BoundingBox {
                            left: 0.0,
                            top: 0.0,
                            width: 0.1,
                            height: 0.1,
                        },
                        age_range: None,
                        gender: "unknown".to_owned(),
                        emotions: BTreeMap::new(),
                        attributes: FaceAttributes::default(),
                    })
                    .collect()),
            }
        }
    }

    #[tokio::test]
    async fn test_first_success_wins_and_later_adapters_never_run() {
        let skipped = ScriptedFace::new("skipped", FaceScript::Unavailable);
        let failing = ScriptedFace::new("failing", FaceScript::Fails);
        let serving = ScriptedFace::new("serving", FaceScript::Returns(1));
        let never = ScriptedFace::new("never", FaceScript::Returns(5));

        let chain = FaceChain::new(vec![
            skipped.clone(),
            failing.clone(),
            serving.clone(),
            never.clone(),
        ]);

        let outcome = chain.detect(&Bytes::from_static(b"img"), 4).await.unwrap();
        assert_eq!(outcome.provider, "serving");
        assert_eq!(outcome.result.len(), 1);
        assert_eq!(never.call_count(), 0);
        assert_eq!(failing.call_count(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_chain_is_no_provider_available() {
        let a = ScriptedFace::new("a", FaceScript::Unavailable);
        let b = ScriptedFace::new("b", FaceScript::Fails);
        let chain = FaceChain::new(vec![a, b]);

        let err = chain
            .detect(&Bytes::from_static(b"img"), 4)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NoProviderAvailable);
    }

    #[tokio::test]
    async fn test_max_results_truncates_prefix() {
        let serving = ScriptedFace::new("serving", FaceScript::Returns(3));
        let chain = FaceChain::new(vec![serving]);

        let outcome = chain.detect(&Bytes::from_static(b"img"), 2).await.unwrap();
        assert_eq!(outcome.result.len(), 2);
        assert_eq!(outcome.result[0].index, 0);
        assert_eq!(outcome.result[1].index, 1);
    }

    struct ScriptedTranscriber {
        name: &'static str,
        fails: bool,
    }

    #[async_trait]
    impl TranscriptionProvider for ScriptedTranscriber {
        fn name(&self) -> &'static str {
            self.name
        }

        fn capabilities(&self) -> ProviderCapabilities {
            ProviderCapabilities::empty()
        }

        async fn transcribe(&self, _audio: &Bytes) -> AppResult<TranscriptionResult> {
            if self.fails {
                Err(AppError::provider_error(self.name, "scripted failure"))
            } else {
                Ok(TranscriptionResult {
                    text: "hello".to_owned(),
                    provider: self.name.to_owned(),
                    confidence: 0.9,
                    utterances: vec![],
                    words: vec![],
                    emotions: vec![],
                    entities: vec![],
                    topics: vec![],
                })
            }
        }
    }

    #[tokio::test]
    async fn test_transcription_degrades_to_placeholder() {
        let chain = TranscriptionChain::new(vec![
            Arc::new(ScriptedTranscriber {
                name: "x",
                fails: true,
            }),
            Arc::new(ScriptedTranscriber {
                name: "y",
                fails: true,
            }),
        ]);

        let result = chain
            .transcribe_or_placeholder(&Bytes::from_static(b"audio"))
            .await;
        assert!(result.is_unavailable());
        assert!(result.utterances.is_empty());
        assert!(result.words.is_empty());
    }

    #[tokio::test]
    async fn test_transcription_fallback_reports_serving_provider() {
        let chain = TranscriptionChain::new(vec![
            Arc::new(ScriptedTranscriber {
                name: "primary",
                fails: true,
            }),
            Arc::new(ScriptedTranscriber {
                name: "secondary",
                fails: false,
            }),
        ]);

        let outcome = chain
            .transcribe(&Bytes::from_static(b"audio"))
            .await
            .unwrap();
        assert_eq!(outcome.provider, "secondary");
        assert_eq!(outcome.result.provider, "secondary");
    }
}
