// ABOUTME: Four-phase scored evaluation protocol - elicit, pushback, justify, recalibrate
// ABOUTME: Phases run strictly in order; each phase's prompt depends on the prior parsed scores
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Persona Insight

//! # Scored Evaluation Protocol
//!
//! A multi-round interaction with a language model that elicits numeric
//! per-question scores, challenges low scores, demands justifying evidence, and
//! forces a final bias-check before accepting a score set.
//!
//! Normal mode stops after the elicitation phase. Comprehensive mode always
//! runs all four phases, in order, never parallelized:
//!
//! 1. **Elicit** - full question set plus anti-bias instructions; one score per
//!    question is parsed from the free-text response.
//! 2. **Pushback** - every question scored below 95 is re-posed as a percentile
//!    claim; scores are re-parsed, overwriting only entries present in the new
//!    response. With nothing below 95 this phase is a recorded no-op.
//! 3. **Justify** - up to the first three questions get a demand for concrete
//!    named examples; the response is stored verbatim and never alters scores.
//! 4. **Recalibrate** - a final bias check; scores are overwritten as in
//!    phase 2.
//!
//! The final score is the rounded arithmetic mean of the per-question map after
//! the last phase that ran.

pub mod score;

pub use score::{parse_scores, Score, DEFAULT_SCORE};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::errors::{AppError, AppResult};
use crate::llm::{ChatMessage, ModelRegistry};

/// Questions scored at or above this skip the pushback challenge
const PUSHBACK_THRESHOLD: u8 = 95;

/// Maximum questions challenged for named evidence in the justify phase
const JUSTIFY_LIMIT: usize = 3;

/// Recorded when no question scored below the pushback threshold
const PUSHBACK_NOT_REQUIRED: &str = "Pushback not required: no score fell below the threshold.";

/// Clinical/evaluative labels scanned for in the final phase's raw text.
///
/// First label found wins; this is a best-effort tag, not a diagnostic claim.
const CATEGORY_VOCABULARY: &[&str] = &[
    "narcissistic",
    "borderline",
    "psychopathic",
    "obsessive",
    "histrionic",
    "schizoid",
    "paranoid",
    "avoidant",
    "genius",
    "gifted",
    "resilient",
    "creative",
    "conventional",
    "average",
];

/// Which construct a protocol run evaluates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    Cognitive,
    Psychological,
    Psychopathological,
}

impl ProtocolKind {
    /// Identifier used in logs and results
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cognitive => "cognitive",
            Self::Psychological => "psychological",
            Self::Psychopathological => "psychopathological",
        }
    }

    /// The construct the model is told it is actually measuring
    const fn target_construct(&self) -> &'static str {
        match self {
            Self::Cognitive => "raw cognitive capability",
            Self::Psychological => "psychological disposition and emotional patterning",
            Self::Psychopathological => "clinically relevant trait expression",
        }
    }

    /// Domain-specific anti-bias instructions prepended to the elicitation
    fn anti_bias_instructions(&self) -> String {
        format!(
            "You are scoring {construct} on a 0-100 scale where the score means \
             the percentage of the general population the subject outperforms on \
             that axis. Do not reward jargon, conventionality, or diplomatic \
             hedging; unusual or blunt expression is not evidence against \
             {construct}. Answer each question on its own numbered line in the \
             form 'N. score/100' followed by a one-sentence rationale.",
            construct = self.target_construct()
        )
    }
}

/// How many phases a run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolMode {
    /// Phase 1 only
    Normal,
    /// All four phases, strictly in order
    Comprehensive,
}

/// Output of one protocol run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolResult {
    pub protocol: ProtocolKind,
    pub mode: ProtocolMode,
    pub questions: Vec<String>,
    /// One raw model response per phase that ran
    pub raw_responses: Vec<String>,
    /// Exactly one entry per input question
    pub scores: BTreeMap<String, Score>,
    /// Rounded mean of the final score map
    pub final_score: u32,
    pub summary: String,
    /// First vocabulary label found in the final phase's text, or "unspecified"
    pub category: String,
}

/// Aggregate over several independently run protocols
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolBatch {
    /// Only the protocols that produced a result
    pub results: Vec<ProtocolResult>,
    /// Protocols that failed and were skipped
    pub skipped: Vec<String>,
}

/// Runs scored evaluation protocols against the configured model registry
pub struct ProtocolRunner {
    registry: Arc<ModelRegistry>,
}

impl ProtocolRunner {
    #[must_use]
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    /// Run one protocol against the input text.
    ///
    /// # Errors
    ///
    /// `InvalidInput` on an empty question set, `AllModelsUnavailable` with zero
    /// configured models, or the provider's error from a phase call.
    #[instrument(skip(self, input_text, questions), fields(protocol = kind.as_str(), questions = questions.len()))]
    pub async fn run(
        &self,
        requested_model: Option<&str>,
        kind: ProtocolKind,
        mode: ProtocolMode,
        input_text: &str,
        questions: &[String],
    ) -> AppResult<ProtocolResult> {
        if questions.is_empty() {
            return Err(AppError::invalid_input("protocol requires at least one question"));
        }
        self.registry.ensure_available()?;

        let mut turns: Vec<ChatMessage> = Vec::new();
        let mut raw_responses: Vec<String> = Vec::new();

        // Phase 1: elicit
        let elicit = build_elicit_prompt(kind, input_text, questions);
        let response = self.phase_call(requested_model, &mut turns, elicit).await?;

        let mut scores: Vec<Score> = parse_scores(&response, questions.len())
            .into_iter()
            .map(|parsed| parsed.map_or_else(Score::defaulted, Score::Parsed))
            .collect();
        raw_responses.push(response);

        if mode == ProtocolMode::Comprehensive {
            // Phase 2: pushback
            let challenged: Vec<(usize, u8)> = scores
                .iter()
                .enumerate()
                .filter(|(_, s)| s.value() < PUSHBACK_THRESHOLD)
                .map(|(i, s)| (i, s.value()))
                .collect();

            if challenged.is_empty() {
                debug!("no score below threshold, pushback is a no-op");
                raw_responses.push(PUSHBACK_NOT_REQUIRED.to_owned());
            } else {
                let pushback = build_pushback_prompt(&challenged, questions);
                let response = self.phase_call(requested_model, &mut turns, pushback).await?;
                overwrite_scores(&mut scores, &parse_scores(&response, questions.len()));
                raw_responses.push(response);
            }

            // Phase 3: justify - evidentiary pressure, never a new elicitation
            let justify = build_justify_prompt(&scores, questions);
            let response = self.phase_call(requested_model, &mut turns, justify).await?;
            raw_responses.push(response);

            // Phase 4: recalibrate
            let recalibrate = build_recalibrate_prompt(kind);
            let response = self.phase_call(requested_model, &mut turns, recalibrate).await?;
            overwrite_scores(&mut scores, &parse_scores(&response, questions.len()));
            raw_responses.push(response);
        }

        let final_score = aggregate_score(&scores);
        let last_response = raw_responses
            .last()
            .map(String::as_str)
            .unwrap_or_default();
        let category = extract_category(last_response);
        let summary = format!(
            "{} evaluation scored {final_score}/100 across {} questions (category: {category})",
            kind.as_str(),
            questions.len()
        );

        Ok(ProtocolResult {
            protocol: kind,
            mode,
            questions: questions.to_vec(),
            raw_responses,
            scores: questions
                .iter()
                .cloned()
                .zip(scores.iter().copied())
                .collect(),
            final_score,
            summary,
            category,
        })
    }

    /// Run several protocols independently over the same input.
    ///
    /// One protocol's failure never aborts the others; failed protocols are
    /// listed in `skipped` and excluded from the results.
    #[instrument(skip(self, input_text, questions))]
    pub async fn run_all(
        &self,
        requested_model: Option<&str>,
        kinds: &[ProtocolKind],
        mode: ProtocolMode,
        input_text: &str,
        questions: &[String],
    ) -> AppResult<ProtocolBatch> {
        self.registry.ensure_available()?;

        let mut results = Vec::new();
        let mut skipped = Vec::new();

        for kind in kinds {
            match self
                .run(requested_model, *kind, mode, input_text, questions)
                .await
            {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(protocol = kind.as_str(), "protocol failed, skipping: {}", e);
                    skipped.push(kind.as_str().to_owned());
                }
            }
        }

        Ok(ProtocolBatch { results, skipped })
    }

    /// One phase round-trip: send the full history plus the new prompt, record
    /// both sides into the running conversation.
    async fn phase_call(
        &self,
        requested_model: Option<&str>,
        turns: &mut Vec<ChatMessage>,
        prompt: String,
    ) -> AppResult<String> {
        turns.push(ChatMessage::user(prompt));
        let response = self
            .registry
            .generate(requested_model, "You are a rigorous evaluator.", turns.clone())
            .await?;
        turns.push(ChatMessage::assistant(response.clone()));
        Ok(response)
    }
}

// ============================================================================
// Phase Prompts and Pure Helpers
// ============================================================================

fn build_elicit_prompt(kind: ProtocolKind, input_text: &str, questions: &[String]) -> String {
    let mut out = kind.anti_bias_instructions();
    out.push_str("\n\nSubject material:\n");
    out.push_str(input_text);
    out.push_str("\n\nQuestions:\n");
    for (i, question) in questions.iter().enumerate() {
        out.push_str(&format!("{}. {question}\n", i + 1));
    }
    out
}

fn build_pushback_prompt(challenged: &[(usize, u8)], questions: &[String]) -> String {
    let mut out = String::from("Reconsider your scores.\n");
    for (index, value) in challenged {
        if let Some(question) = questions.get(*index) {
            out.push_str(&format!(
                "On question {} (\"{question}\") you claim {}% of people outperform \
                 the subject on this axis - are you certain?\n",
                index + 1,
                100 - u32::from(*value)
            ));
        }
    }
    out.push_str(
        "\nAnswer the original questions again from scratch, one per numbered \
         line in the form 'N. score/100'.",
    );
    out
}

fn build_justify_prompt(scores: &[Score], questions: &[String]) -> String {
    let mut out = String::from(
        "For each of the following scores, name concrete examples of the kinds \
         of people you claim outperform the subject:\n",
    );
    for (index, question) in questions.iter().take(JUSTIFY_LIMIT).enumerate() {
        let value = scores.get(index).map_or(DEFAULT_SCORE, Score::value);
        out.push_str(&format!("{}. \"{question}\" scored {value}/100\n", index + 1));
    }
    out
}

fn build_recalibrate_prompt(kind: ProtocolKind) -> String {
    format!(
        "Final check: confirm you did not penalize unconventionality, boldness \
         or eccentricity instead of measuring {}. Then finalize every score, one \
         per numbered line in the form 'N. score/100'.",
        kind.target_construct()
    )
}

/// Overwrite only the slots the new response actually parsed; a missing parse
/// retains the prior phase's value rather than resetting to the default.
fn overwrite_scores(scores: &mut [Score], reparsed: &[Option<u8>]) {
    for (slot, parsed) in scores.iter_mut().zip(reparsed) {
        if let Some(value) = parsed {
            *slot = Score::Parsed(*value);
        }
    }
}

/// Rounded arithmetic mean of the score map; pure over the final values
fn aggregate_score(scores: &[Score]) -> u32 {
    if scores.is_empty() {
        return 0;
    }
    let sum: f64 = scores.iter().map(|s| f64::from(s.value())).sum();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        (sum / scores.len() as f64).round() as u32
    }
}

/// Scan for the first known vocabulary label in the text
fn extract_category(text: &str) -> String {
    let lowered = text.to_lowercase();
    CATEGORY_VOCABULARY
        .iter()
        .find(|label| lowered.contains(**label))
        .map_or_else(|| "unspecified".to_owned(), |label| (*label).to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overwrite_retains_unparsed_slots() {
        let mut scores = vec![Score::Parsed(80), Score::defaulted(), Score::Parsed(60)];
        overwrite_scores(&mut scores, &[Some(90), None, Some(65)]);
        assert_eq!(scores[0], Score::Parsed(90));
        assert_eq!(scores[1], Score::defaulted());
        assert_eq!(scores[2], Score::Parsed(65));
    }

    #[test]
    fn test_aggregate_is_rounded_mean() {
        let scores = vec![Score::Parsed(80), Score::Parsed(85), Score::Parsed(90)];
        assert_eq!(aggregate_score(&scores), 85);

        // 70 + 75 + 81 = 226 / 3 = 75.33 -> 75
        let scores = vec![Score::Parsed(70), Score::defaulted(), Score::Parsed(81)];
        assert_eq!(aggregate_score(&scores), 75);
    }

    #[test]
    fn test_category_first_vocabulary_match_wins() {
        // Both labels appear; vocabulary order decides
        assert_eq!(
            extract_category("The subject shows resilient and creative tendencies."),
            "resilient"
        );
        assert_eq!(extract_category("Nothing clinical here."), "unspecified");
    }

    #[test]
    fn test_pushback_prompt_inverts_score_into_percentile() {
        let prompt = build_pushback_prompt(&[(0, 80)], &["How sharp is the subject?".to_owned()]);
        assert!(prompt.contains("20% of people outperform"));
        assert!(prompt.contains("question 1"));
    }

    #[test]
    fn test_justify_prompt_caps_at_three_questions() {
        let questions: Vec<String> = (1..=5).map(|i| format!("Q{i}")).collect();
        let scores = vec![Score::Parsed(50); 5];
        let prompt = build_justify_prompt(&scores, &questions);
        assert!(prompt.contains("Q3"));
        assert!(!prompt.contains("Q4"));
    }
}
