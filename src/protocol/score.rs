// ABOUTME: Pure score parsing for the evaluation protocol's free-text model responses
// ABOUTME: Distinguishes genuinely parsed scores from the parser-failure default
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Persona Insight

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Substituted when no score can be parsed from a phase response.
///
/// This is a flagged placeholder, not a neutral judgment; [`Score::Defaulted`]
/// keeps it distinguishable from a model that genuinely answered 75.
pub const DEFAULT_SCORE: u8 = 75;

/// One question's score, tagged by how it was obtained.
///
/// `Parsed(75)` and `Defaulted(75)` carry the same numeric value but are
/// distinct states: the first is a real model judgment, the second a parser
/// fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "origin", content = "value", rename_all = "lowercase")]
pub enum Score {
    /// A numeric score actually present in the model's response
    Parsed(u8),
    /// The fallback substituted when parsing failed
    Defaulted(u8),
}

impl Score {
    /// The numeric value regardless of origin
    #[must_use]
    pub const fn value(&self) -> u8 {
        match self {
            Self::Parsed(v) | Self::Defaulted(v) => *v,
        }
    }

    /// Whether this score is the parser-failure fallback
    #[must_use]
    pub const fn is_defaulted(&self) -> bool {
        matches!(self, Self::Defaulted(_))
    }

    /// The standard fallback score
    #[must_use]
    pub const fn defaulted() -> Self {
        Self::Defaulted(DEFAULT_SCORE)
    }
}

/// Stored as Option to handle compilation failures gracefully (should never fail for static patterns)
static NUMBERED_LINE_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    // Matches: "3. ... 85/100", "3) Score: 85" - question number anchored at line start
    Regex::new(r"(?m)^\s*(\d{1,2})[\.\):]\D*?(\d{1,3})\s*(?:/\s*100)?\s*(?:$|\D)").ok()
});

static FRACTION_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    // Matches: 85/100, 85 / 100
    Regex::new(r"(\d{1,3})\s*/\s*100").ok()
});

/// Extract per-question scores from one phase's free-text response.
///
/// Returns one slot per question; `None` means no recognizable score was found
/// for that question. Two formats are recognized, in priority order:
///
/// 1. Numbered lines (`"2. 85/100 because ..."`) matched to their question by
///    the leading number.
/// 2. Bare `N/100` fractions taken in order of appearance when fewer than half
///    the questions matched the numbered form.
#[must_use]
pub fn parse_scores(response: &str, question_count: usize) -> Vec<Option<u8>> {
    let mut slots: Vec<Option<u8>> = vec![None; question_count];

    if let Some(pattern) = NUMBERED_LINE_PATTERN.as_ref() {
        for captures in pattern.captures_iter(response) {
            let question: usize = match captures[1].parse() {
                Ok(n) => n,
                Err(_) => continue,
            };
            let score: u16 = match captures[2].parse() {
                Ok(v) => v,
                Err(_) => continue,
            };
            if question == 0 || question > question_count || score > 100 {
                continue;
            }
            let slot = question - 1;
            if slots[slot].is_none() {
                slots[slot] = Some(score as u8);
            }
        }
    }

    let matched = slots.iter().filter(|s| s.is_some()).count();
    if matched * 2 >= question_count.max(1) {
        return slots;
    }

    // Numbered form mostly absent; fall back to fractions in order of appearance
    if let Some(pattern) = FRACTION_PATTERN.as_ref() {
        let mut fractions = pattern
            .captures_iter(response)
            .filter_map(|c| c[1].parse::<u16>().ok())
            .filter(|v| *v <= 100)
            .map(|v| v as u8);

        for slot in &mut slots {
            if slot.is_none() {
                match fractions.next() {
                    Some(score) => *slot = Some(score),
                    None => break,
                }
            }
        }
    }

    slots
}
