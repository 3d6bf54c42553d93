// ABOUTME: Integration tests for the scored evaluation protocol's four-phase flow
// ABOUTME: Scores, pushback no-op, defaults and independent multi-protocol runs
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Persona Insight

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use std::sync::Arc;

use persona_insight::errors::ErrorCode;
use persona_insight::llm::ModelRegistry;
use persona_insight::protocol::{
    ProtocolKind, ProtocolMode, ProtocolRunner, Score, DEFAULT_SCORE,
};

use common::ScriptedLlm;

fn runner_with(llm: Arc<ScriptedLlm>) -> ProtocolRunner {
    let mut registry = ModelRegistry::new();
    registry.register(llm);
    ProtocolRunner::new(Arc::new(registry))
}

fn questions(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("Axis {i}?")).collect()
}

// =============================================================================
// Normal Mode
// =============================================================================

#[tokio::test]
async fn test_normal_mode_runs_only_the_elicitation_phase() {
    let llm = ScriptedLlm::sequence(vec![Ok("1. 80/100\n2. 60/100")]);
    let runner = runner_with(Arc::clone(&llm));

    let result = runner
        .run(
            None,
            ProtocolKind::Cognitive,
            ProtocolMode::Normal,
            "subject text",
            &questions(2),
        )
        .await
        .unwrap();

    assert_eq!(llm.call_count(), 1);
    assert_eq!(result.raw_responses.len(), 1);
    assert_eq!(result.final_score, 70);
    assert_eq!(result.scores["Axis 1?"], Score::Parsed(80));
    assert_eq!(result.scores["Axis 2?"], Score::Parsed(60));
}

#[tokio::test]
async fn test_unparsable_elicitation_defaults_every_question_distinguishably() {
    let llm = ScriptedLlm::sequence(vec![Ok("A nuanced individual, hard to quantify.")]);
    let runner = runner_with(llm);

    let result = runner
        .run(
            None,
            ProtocolKind::Psychological,
            ProtocolMode::Normal,
            "subject text",
            &questions(2),
        )
        .await
        .unwrap();

    assert_eq!(result.final_score, u32::from(DEFAULT_SCORE));
    for score in result.scores.values() {
        assert!(score.is_defaulted());
        assert_eq!(score.value(), DEFAULT_SCORE);
        // The default is a flagged placeholder, not a parsed 75
        assert_ne!(*score, Score::Parsed(DEFAULT_SCORE));
    }
}

// =============================================================================
// Comprehensive Mode
// =============================================================================

#[tokio::test]
async fn test_comprehensive_mode_runs_four_phases_and_takes_final_scores() {
    let llm = ScriptedLlm::sequence(vec![
        // Phase 1: one score below the pushback threshold
        Ok("1. 80/100\n2. 97/100"),
        // Phase 2: re-answers only question 1; question 2 keeps its value
        Ok("1. 90/100"),
        // Phase 3: evidence only, numbers here must not change scores
        Ok("For axis 1: published logicians, chess masters rated 2600."),
        // Phase 4: final recalibration overwrites both
        Ok("1. 92/100\n2. 96/100\nOverall a resilient profile."),
    ]);
    let runner = runner_with(Arc::clone(&llm));

    let result = runner
        .run(
            None,
            ProtocolKind::Cognitive,
            ProtocolMode::Comprehensive,
            "subject text",
            &questions(2),
        )
        .await
        .unwrap();

    assert_eq!(llm.call_count(), 4);
    assert_eq!(result.raw_responses.len(), 4);
    assert_eq!(result.scores["Axis 1?"], Score::Parsed(92));
    assert_eq!(result.scores["Axis 2?"], Score::Parsed(96));
    // Mean of 92 and 96
    assert_eq!(result.final_score, 94);
    // Category comes from the final phase's text
    assert_eq!(result.category, "resilient");
}

#[tokio::test]
async fn test_pushback_is_a_recorded_no_op_when_all_scores_are_high() {
    let llm = ScriptedLlm::sequence(vec![
        Ok("1. 96/100\n2. 98/100"),
        // No pushback call happens; next responses serve phases 3 and 4
        Ok("Evidence as requested."),
        Ok("1. 96/100\n2. 98/100"),
    ]);
    let runner = runner_with(Arc::clone(&llm));

    let result = runner
        .run(
            None,
            ProtocolKind::Psychological,
            ProtocolMode::Comprehensive,
            "subject text",
            &questions(2),
        )
        .await
        .unwrap();

    // Only three model calls, but four recorded phase responses
    assert_eq!(llm.call_count(), 3);
    assert_eq!(result.raw_responses.len(), 4);
    assert!(result.raw_responses[1].contains("Pushback not required"));
    assert_eq!(result.final_score, 97);
}

#[tokio::test]
async fn test_missing_reparse_retains_prior_phase_value() {
    let llm = ScriptedLlm::sequence(vec![
        Ok("1. 70/100\n2. 85/100"),
        // Pushback response only re-answers question 2
        Ok("2. 88/100"),
        Ok("Evidence."),
        // Recalibration parses nothing; both retain their prior values
        Ok("I confirm the scores stand as given."),
    ]);
    let runner = runner_with(llm);

    let result = runner
        .run(
            None,
            ProtocolKind::Cognitive,
            ProtocolMode::Comprehensive,
            "subject text",
            &questions(2),
        )
        .await
        .unwrap();

    assert_eq!(result.scores["Axis 1?"], Score::Parsed(70));
    assert_eq!(result.scores["Axis 2?"], Score::Parsed(88));
    assert_eq!(result.final_score, 79);
}

// =============================================================================
// Multi-Protocol Runs
// =============================================================================

#[tokio::test]
async fn test_one_failed_protocol_does_not_abort_the_others() {
    let llm = ScriptedLlm::sequence(vec![
        Err("quota exceeded"),
        Ok("1. 82/100"),
        Ok("1. 64/100"),
    ]);
    let runner = runner_with(llm);

    let batch = runner
        .run_all(
            None,
            &[
                ProtocolKind::Cognitive,
                ProtocolKind::Psychological,
                ProtocolKind::Psychopathological,
            ],
            ProtocolMode::Normal,
            "subject text",
            &questions(1),
        )
        .await
        .unwrap();

    assert_eq!(batch.results.len(), 2);
    assert_eq!(batch.skipped, vec!["cognitive".to_owned()]);
    assert_eq!(batch.results[0].protocol, ProtocolKind::Psychological);
    assert_eq!(batch.results[0].final_score, 82);
    assert_eq!(batch.results[1].final_score, 64);
}

#[tokio::test]
async fn test_empty_question_set_is_invalid() {
    let runner = runner_with(ScriptedLlm::always("1. 80/100"));
    let err = runner
        .run(
            None,
            ProtocolKind::Cognitive,
            ProtocolMode::Normal,
            "subject text",
            &[],
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidInput);
}

#[tokio::test]
async fn test_no_models_is_fatal_before_any_call() {
    let runner = ProtocolRunner::new(Arc::new(ModelRegistry::new()));
    let err = runner
        .run(
            None,
            ProtocolKind::Cognitive,
            ProtocolMode::Normal,
            "subject text",
            &questions(1),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AllModelsUnavailable);
}
