// ABOUTME: Main library entry point for the persona insight analysis pipeline
// ABOUTME: Provides provider fallback chains, insight fusion and the scored evaluation protocol
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Persona Insight

// Crate-level attributes:
// - deny(unsafe_code): Zero-tolerance unsafe policy; nothing in this crate
//   needs raw pointers or FFI
#![deny(unsafe_code)]

//! # Persona Insight
//!
//! Multi-provider media analysis orchestration: face detection, speech
//! transcription and deep video insight are fetched through ordered fallback
//! chains, fused into per-subject personality profiles by a language model,
//! and exposed as an append-only conversation per session.
//!
//! ## Features
//!
//! - **Provider fallback chains**: ordered adapters per capability; first
//!   success wins, missing credentials skip silently
//! - **Media extraction**: bounded video segments, representative frames and
//!   detached audio via ffmpeg
//! - **Insight fusion**: concurrent per-subject model calls folded back by
//!   positional index, with group-dynamics synthesis
//! - **Scored evaluation protocol**: a four-phase elicit/pushback/justify/
//!   recalibrate interaction producing per-question scores
//! - **Session state**: append-only message log replayed to the model on
//!   every chat turn
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use persona_insight::config::AppConfig;
//! use persona_insight::errors::AppResult;
//! use persona_insight::pipeline::AnalysisPipeline;
//! use persona_insight::session::InMemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> AppResult<()> {
//!     persona_insight::logging::init_from_env();
//!     let config = AppConfig::from_env();
//!     let store = Arc::new(InMemoryStore::new());
//!     let _pipeline = AnalysisPipeline::from_config(&config, store);
//!     Ok(())
//! }
//! ```

/// Runtime configuration built from environment variables
pub mod config;

/// Error taxonomy shared across the pipeline
pub mod errors;

/// Insight fusion engine and its prompt builders
pub mod fusion;

/// Language-model providers and the selection registry
pub mod llm;

/// Structured logging initialization
pub mod logging;

/// Video segment, frame and audio extraction
pub mod media;

/// Core data models crossing module boundaries
pub mod models;

/// Top-level analysis pipeline orchestration
pub mod pipeline;

/// Scored evaluation protocol state machine
pub mod protocol;

/// External capability adapters and fallback chains
pub mod providers;

/// Analysis record and conversation persistence
pub mod session;
