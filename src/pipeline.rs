// ABOUTME: Analysis pipeline orchestrator - upload to stored report, chat, export, share
// ABOUTME: Model availability is checked before any media work to avoid wasted provider calls
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Persona Insight

//! # Analysis Pipeline
//!
//! The top-level orchestration of one analyze call: media extraction, the
//! face/transcription fallback chains, optional deep video insight, insight
//! fusion, report formatting and conversation bookkeeping.
//!
//! Failure asymmetry: face detection is fatal (a report with zero subjects is
//! useless), transcription degrades to an explicit placeholder (a report with
//! partial speech data is still useful). Zero configured language models is
//! fatal and surfaced before any media or provider work starts.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::fusion::FusionEngine;
use crate::llm::{ChatMessage, ModelRegistry};
use crate::media::SegmentExtractor;
use crate::models::{
    AnalysisRecord, MediaType, Message, PersonalityInsights, Role, SubjectFace,
    TranscriptionResult, VideoInsights,
};

pub use crate::models::ShareStatus;
use crate::providers::{
    AssemblyProvider, AzureFaceProvider, DeepgramProvider, FaceChain, FacePlusProvider,
    PollSettings, TranscriptionChain, VideoIndexerProvider, VideoInsightProvider,
    VisionLlmProvider,
};
use crate::session::SessionStore;

/// System instruction for follow-up chat turns
const CHAT_SYSTEM_INSTRUCTION: &str = "You are a personality analyst continuing a conversation \
about an analysis you produced earlier. Answer follow-up questions grounded in that analysis; \
say so plainly when a question goes beyond what the observations support.";

/// One analyze call's input
#[derive(Debug, Clone)]
pub struct AnalyzeRequest {
    pub session_id: String,
    pub media: Bytes,
    /// Caller-declared type; a hint, not ground truth
    pub media_type: MediaType,
    /// Defaults to a type-derived title when empty
    pub title: Option<String>,
    /// Preferred model identifier; substituted when not configured
    pub model: Option<String>,
    /// Cap on analyzed subjects; the configured default when absent
    pub max_people: Option<usize>,
    /// Segment start offset for video input, seconds
    pub segment_start: f64,
    /// Segment length for video input; the configured maximum when absent
    pub segment_duration: Option<f64>,
}

impl AnalyzeRequest {
    /// Minimal request with defaults for the optional knobs
    #[must_use]
    pub fn new(session_id: impl Into<String>, media: Bytes, media_type: MediaType) -> Self {
        Self {
            session_id: session_id.into(),
            media,
            media_type,
            title: None,
            model: None,
            max_people: None,
            segment_start: 0.0,
            segment_duration: None,
        }
    }
}

/// Text pulled out of an uploaded document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentText {
    pub text: String,
    /// Character count of the extracted text
    pub length: usize,
    /// Extraction method used ("utf8" or "lossy")
    pub method: &'static str,
}

/// Document-export collaborator; formatting concerns live entirely behind it
#[async_trait]
pub trait ExportSink: Send + Sync {
    /// Serialize a completed analysis record into a document
    async fn export(&self, record: &AnalysisRecord) -> AppResult<Bytes>;
}

/// Share-delivery collaborator (e.g. e-mail)
#[async_trait]
pub trait ShareNotifier: Send + Sync {
    /// Deliver one completed analysis to the recipient
    async fn deliver(&self, sender: &str, recipient: &str, record: &AnalysisRecord)
        -> AppResult<()>;
}

/// Top-level orchestrator owning the chains, the registry and the store
pub struct AnalysisPipeline {
    store: Arc<dyn SessionStore>,
    registry: Arc<ModelRegistry>,
    faces: FaceChain,
    transcription: TranscriptionChain,
    video_insights: Option<Arc<dyn VideoInsightProvider>>,
    extractor: SegmentExtractor,
    fusion: FusionEngine,
    default_max_people: usize,
}

impl AnalysisPipeline {
    /// Assemble a pipeline from explicit parts (used directly by tests)
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        registry: Arc<ModelRegistry>,
        faces: FaceChain,
        transcription: TranscriptionChain,
        video_insights: Option<Arc<dyn VideoInsightProvider>>,
        extractor: SegmentExtractor,
        default_max_people: usize,
    ) -> Self {
        let fusion = FusionEngine::new(Arc::clone(&registry));
        Self {
            store,
            registry,
            faces,
            transcription,
            video_insights,
            extractor,
            fusion,
            default_max_people,
        }
    }

    /// Wire the production adapters in their fixed preference order.
    ///
    /// Faces: specialized face API, then generalist vision model, then the
    /// cloud-vendor fallback. Transcription: asynchronous rich provider first,
    /// then the synchronous fallback.
    #[must_use]
    pub fn from_config(config: &AppConfig, store: Arc<dyn SessionStore>) -> Self {
        let credentials = &config.credentials;
        let poll = PollSettings::from_limits(&config.limits);

        let faces = FaceChain::new(vec![
            Arc::new(FacePlusProvider::new(credentials.face_plus.clone())),
            Arc::new(VisionLlmProvider::new(credentials.openai_api_key.clone())),
            Arc::new(AzureFaceProvider::new(credentials.azure_face.clone())),
        ]);

        let transcription = TranscriptionChain::new(vec![
            Arc::new(
                AssemblyProvider::new(credentials.assembly_api_key.clone())
                    .with_poll_settings(poll.clone()),
            ),
            Arc::new(DeepgramProvider::new(credentials.deepgram_api_key.clone())),
        ]);

        let video_insights: Option<Arc<dyn VideoInsightProvider>> = credentials
            .video_indexer
            .clone()
            .map(|creds| {
                Arc::new(VideoIndexerProvider::new(Some(creds)).with_poll_settings(poll.clone()))
                    as Arc<dyn VideoInsightProvider>
            });

        let registry = Arc::new(ModelRegistry::from_config(config));
        let extractor = SegmentExtractor::new(config.limits.clone());

        Self::new(
            store,
            registry,
            faces,
            transcription,
            video_insights,
            extractor,
            config.default_max_people,
        )
    }

    /// The model registry backing this pipeline
    #[must_use]
    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Run one full analysis: extract, detect, transcribe, fuse, store, report.
    ///
    /// # Errors
    ///
    /// `AllModelsUnavailable` before any media work with zero configured models;
    /// `NoProviderAvailable` when face detection is exhausted on visual media;
    /// `InvalidSegment`/`MediaError` from extraction; `InvalidInput` for
    /// undecodable text.
    #[instrument(skip(self, request), fields(session_id = %request.session_id, media_type = request.media_type.as_str()))]
    pub async fn analyze(&self, request: AnalyzeRequest) -> AppResult<AnalysisRecord> {
        // Fail fast: no media or provider work when zero models are configured
        self.registry.ensure_available()?;

        let max_people = request.max_people.unwrap_or(self.default_max_people);
        let model_id = self.registry.select(request.model.as_deref())?.model_id;

        let (faces, transcription, video_insights, insights) = match request.media_type {
            MediaType::Image => self.analyze_image(&request, max_people).await?,
            MediaType::Video => self.analyze_video(&request, max_people).await?,
            MediaType::Text => {
                let text = decode_text(&request.media)?;
                let insights = self
                    .fusion
                    .analyze_text(request.model.as_deref(), &text)
                    .await?;
                (Vec::new(), None, None, insights)
            }
            MediaType::Document => {
                let document = extract_document_text(&request.media)?;
                debug!(
                    length = document.length,
                    method = document.method,
                    "document text extracted"
                );
                let insights = self
                    .fusion
                    .analyze_text(request.model.as_deref(), &document.text)
                    .await?;
                (Vec::new(), None, None, insights)
            }
        };

        let title = request
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| format!("{} analysis", capitalize(request.media_type.as_str())));

        let record = AnalysisRecord::new(
            request.session_id.clone(),
            title,
            request.media_type,
            faces,
            video_insights,
            transcription,
            insights,
            model_id,
        );

        let report = format_report(&record);
        self.store.create_analysis(record.clone()).await?;
        self.store
            .append_message(&request.session_id, Some(record.id), Role::Assistant, report)
            .await?;

        info!(analysis_id = %record.id, people = record.people_count, "analysis completed");
        Ok(record)
    }

    async fn analyze_image(
        &self,
        request: &AnalyzeRequest,
        max_people: usize,
    ) -> AppResult<(
        Vec<SubjectFace>,
        Option<TranscriptionResult>,
        Option<VideoInsights>,
        PersonalityInsights,
    )> {
        let outcome = self.faces.detect(&request.media, max_people).await?;
        let insights = self
            .fusion
            .analyze_subjects(request.model.as_deref(), &outcome.result, None, None)
            .await?;
        Ok((outcome.result, None, None, insights))
    }

    async fn analyze_video(
        &self,
        request: &AnalyzeRequest,
        max_people: usize,
    ) -> AppResult<(
        Vec<SubjectFace>,
        Option<TranscriptionResult>,
        Option<VideoInsights>,
        PersonalityInsights,
    )> {
        let extracted = self
            .extractor
            .extract(
                &request.media,
                request.segment_start,
                request.segment_duration,
            )
            .await?;

        // Face detection on the representative frame is the fatal half
        let faces = self.faces.detect(&extracted.frame, max_people).await?;

        let transcription = match &extracted.audio {
            Some(audio) => Some(self.transcription.transcribe_or_placeholder(audio).await),
            None => {
                debug!("video carries no audio track, skipping transcription");
                None
            }
        };

        let video_insights = match &self.video_insights {
            Some(provider) => match provider.analyze_video(&extracted.segment).await {
                Ok(insights) => Some(insights),
                Err(e) => {
                    // Absence of the bundle is meaningful and checked downstream
                    warn!(provider = provider.name(), "deep video insight failed: {}", e);
                    None
                }
            },
            None => None,
        };

        let insights = self
            .fusion
            .analyze_subjects(
                request.model.as_deref(),
                &faces.result,
                transcription.as_ref(),
                video_insights.as_ref(),
            )
            .await?;

        Ok((faces.result, transcription, video_insights, insights))
    }

    /// One follow-up chat turn: append the user message, replay the session's
    /// full history to the model, append and return the assistant message.
    #[instrument(skip(self, user_text))]
    pub async fn chat(
        &self,
        session_id: &str,
        analysis_id: Option<Uuid>,
        model: Option<&str>,
        user_text: String,
    ) -> AppResult<Message> {
        self.registry.ensure_available()?;

        self.store
            .append_message(session_id, analysis_id, Role::User, user_text)
            .await?;

        // The model is stateless between calls; resend the full history
        let turns: Vec<ChatMessage> = self
            .store
            .history(session_id)
            .await?
            .into_iter()
            .map(|m| match m.role {
                Role::User => ChatMessage::user(m.content),
                Role::Assistant => ChatMessage::assistant(m.content),
            })
            .collect();

        let content = self
            .registry
            .generate(model, CHAT_SYSTEM_INSTRUCTION, turns)
            .await?;

        self.store
            .append_message(session_id, analysis_id, Role::Assistant, content)
            .await
    }

    /// Export an analysis through the sink and mark it downloaded
    pub async fn export(&self, analysis_id: Uuid, sink: &dyn ExportSink) -> AppResult<Bytes> {
        let record = self.store.get_analysis(analysis_id).await?;
        let document = sink.export(&record).await?;
        self.store.mark_downloaded(analysis_id).await?;
        Ok(document)
    }

    /// Share an analysis through the notifier, recording the delivery status
    /// on the record as it transitions pending -> sent or error.
    ///
    /// Delivery failure is reported as a status, not an error: the analysis
    /// itself is intact and the caller decides whether to retry.
    ///
    /// # Errors
    ///
    /// Only when the analysis record does not exist.
    pub async fn share(
        &self,
        analysis_id: Uuid,
        sender: &str,
        recipient: &str,
        notifier: &dyn ShareNotifier,
    ) -> AppResult<ShareStatus> {
        let record = self.store.get_analysis(analysis_id).await?;
        self.store
            .set_share_status(analysis_id, ShareStatus::Pending)
            .await?;

        debug!(analysis_id = %analysis_id, status = ShareStatus::Pending.as_str(), "share started");
        let status = match notifier.deliver(sender, recipient, &record).await {
            Ok(()) => {
                info!(analysis_id = %analysis_id, "share delivered");
                ShareStatus::Sent
            }
            Err(e) => {
                warn!(analysis_id = %analysis_id, "share delivery failed: {}", e);
                ShareStatus::Error
            }
        };
        self.store.set_share_status(analysis_id, status).await?;
        Ok(status)
    }

    /// Rename a stored analysis
    pub async fn rename(&self, analysis_id: Uuid, title: String) -> AppResult<()> {
        if title.trim().is_empty() {
            return Err(AppError::invalid_input("title cannot be empty"));
        }
        self.store.set_title(analysis_id, title).await
    }
}

// ============================================================================
// Pure Helpers
// ============================================================================

fn decode_text(media: &Bytes) -> AppResult<String> {
    let text = std::str::from_utf8(media)
        .map_err(|_| AppError::invalid_input("text upload is not valid UTF-8"))?;
    if text.trim().is_empty() {
        return Err(AppError::invalid_input("text upload is empty"));
    }
    Ok(text.to_owned())
}

/// Best-effort text extraction from an uploaded document.
///
/// Valid UTF-8 is taken verbatim; anything else is decoded lossily so a report
/// can still be produced from partially readable content.
pub fn extract_document_text(media: &Bytes) -> AppResult<DocumentText> {
    let (text, method) = match std::str::from_utf8(media) {
        Ok(text) => (text.to_owned(), "utf8"),
        Err(_) => (String::from_utf8_lossy(media).into_owned(), "lossy"),
    };

    let cleaned: String = text.chars().filter(|c| !c.is_control() || c.is_whitespace()).collect();
    if cleaned.trim().is_empty() {
        return Err(AppError::invalid_input(
            "document contains no extractable text",
        ));
    }

    Ok(DocumentText {
        length: cleaned.chars().count(),
        text: cleaned,
        method,
    })
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Render the stored record into the report text that becomes the session's
/// first assistant message.
#[must_use]
pub fn format_report(record: &AnalysisRecord) -> String {
    let mut out = format!("# {}\n\n", record.title);
    out.push_str(&format!(
        "{} detected in this {}.\n\n",
        match record.people_count {
            1 => "1 person".to_owned(),
            n => format!("{n} people"),
        },
        record.media_type.as_str()
    ));

    for profile in record.insights.profiles() {
        out.push_str(&format!("## {}\n\n{}\n\n", profile.label, profile.summary));

        if let Some(core) = &profile.detailed.personality_core {
            out.push_str(&format!("**Personality core:** {core}\n\n"));
        }
        if let Some(style) = &profile.detailed.cognitive_style {
            out.push_str(&format!("**Cognitive style:** {style}\n\n"));
        }
        if let Some(speech) = &profile.detailed.speech_analysis {
            if let Some(observations) = &speech.observations {
                out.push_str(&format!("**Speech:** {observations}\n\n"));
            }
            for quote in &speech.key_quotes {
                out.push_str(&format!("> {quote}\n"));
            }
            if !speech.key_quotes.is_empty() {
                out.push('\n');
            }
        }
        if let Some(growth) = &profile.detailed.growth_areas {
            if !growth.strengths.is_empty() {
                out.push_str(&format!("**Strengths:** {}\n\n", growth.strengths.join(", ")));
            }
            if !growth.challenges.is_empty() {
                out.push_str(&format!("**Challenges:** {}\n\n", growth.challenges.join(", ")));
            }
            if let Some(path) = &growth.development_path {
                out.push_str(&format!("**Development path:** {path}\n\n"));
            }
        }
    }

    if let Some(dynamics) = record.insights.group_dynamics() {
        out.push_str(&format!("## Group Dynamics\n\n{dynamics}\n\n"));
    }

    if let Some(transcription) = &record.transcription {
        if !transcription.is_unavailable() {
            out.push_str(&format!(
                "## Transcript\n\n{}\n\n",
                transcription.text
            ));
        }
    }

    out.trim_end().to_owned()
}
