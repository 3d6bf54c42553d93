// ABOUTME: Integration tests for environment-driven configuration
// ABOUTME: Serialized because they mutate process environment variables
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Persona Insight

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use serial_test::serial;
use std::env;

use persona_insight::config::AppConfig;

fn clear_provider_env() {
    for key in [
        "FACEPP_API_KEY",
        "FACEPP_API_SECRET",
        "AZURE_FACE_KEY",
        "AZURE_FACE_ENDPOINT",
        "VIDEO_INDEXER_KEY",
        "VIDEO_INDEXER_ACCOUNT_ID",
        "VIDEO_INDEXER_LOCATION",
        "ASSEMBLYAI_API_KEY",
        "DEEPGRAM_API_KEY",
        "OPENAI_API_KEY",
        "ANTHROPIC_API_KEY",
        "GEMINI_API_KEY",
        "MAX_SEGMENT_SECS",
        "DEFAULT_MAX_PEOPLE",
    ] {
        env::remove_var(key);
    }
}

#[test]
#[serial]
fn test_missing_credentials_disable_adapters_without_error() {
    clear_provider_env();

    let config = AppConfig::from_env();
    assert!(config.credentials.face_plus.is_none());
    assert!(config.credentials.assembly_api_key.is_none());
    assert!(config.credentials.video_indexer.is_none());
    assert!(!config.any_model_configured());
}

#[test]
#[serial]
fn test_paired_credentials_require_both_halves() {
    clear_provider_env();
    // Key without its secret must not produce half-configured credentials
    env::set_var("FACEPP_API_KEY", "key-only");

    let config = AppConfig::from_env();
    assert!(config.credentials.face_plus.is_none());

    env::set_var("FACEPP_API_SECRET", "secret");
    let config = AppConfig::from_env();
    let creds = config.credentials.face_plus.unwrap();
    assert_eq!(creds.api_key, "key-only");
    assert_eq!(creds.api_secret, "secret");

    clear_provider_env();
}

#[test]
#[serial]
fn test_model_keys_flip_any_model_configured() {
    clear_provider_env();
    env::set_var("ANTHROPIC_API_KEY", "sk-test");

    let config = AppConfig::from_env();
    assert!(config.any_model_configured());
    assert!(config.credentials.openai_api_key.is_none());

    clear_provider_env();
}

#[test]
#[serial]
fn test_limit_overrides_parse_from_env() {
    clear_provider_env();
    env::set_var("MAX_SEGMENT_SECS", "30");
    env::set_var("DEFAULT_MAX_PEOPLE", "8");

    let config = AppConfig::from_env();
    assert_eq!(config.limits.max_segment_secs, 30.0);
    assert_eq!(config.default_max_people, 8);

    clear_provider_env();
}

#[test]
#[serial]
fn test_unparseable_limit_falls_back_to_default() {
    clear_provider_env();
    env::set_var("DEFAULT_MAX_PEOPLE", "many");

    let config = AppConfig::from_env();
    assert_eq!(config.default_max_people, 4);

    clear_provider_env();
}
