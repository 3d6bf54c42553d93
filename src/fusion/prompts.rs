// ABOUTME: Prompt construction for per-subject analysis, text analysis and group synthesis
// ABOUTME: Pure string builders - no I/O, fully unit-testable
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Persona Insight

use crate::models::{SubjectFace, SubjectProfile, TranscriptionResult, VideoInsights};

/// System instruction shared by every per-subject analysis call
pub const ANALYSIS_SYSTEM_INSTRUCTION: &str = "You are an observational personality analyst. \
You receive structured observations about one individual (facial attributes, detected emotions, \
speech content when available) and write a grounded personality assessment. Base every claim on \
the supplied observations; never invent biographical facts. Respond with only a JSON object of \
the form {\"summary\":\"...\",\"personality_core\":\"...\",\"cognitive_style\":\"...\",\
\"speech_analysis\":{\"observations\":\"...\",\"key_quotes\":[\"...\"]},\
\"relationship_inferences\":\"...\",\"growth_areas\":{\"strengths\":[\"...\"],\
\"challenges\":[\"...\"],\"development_path\":\"...\"}}. Omit speech_analysis when no speech \
data was supplied.";

/// System instruction for the group-dynamics synthesis call
pub const GROUP_SYSTEM_INSTRUCTION: &str = "You are an observational personality analyst. \
You receive individual personality profiles for several people who appear together. Write one \
cohesive narrative about their likely group dynamic: interaction patterns, complementary traits \
and potential friction. Respond with plain prose, no JSON.";

fn push_face_observations(out: &mut String, face: &SubjectFace) {
    out.push_str(&format!("## Subject: {}\n", face.label()));
    out.push_str(&format!("- Gender label: {}\n", face.gender));

    if let Some(age) = &face.age_range {
        out.push_str(&format!("- Estimated age: {} to {}\n", age.low, age.high));
    }
    if let Some((emotion, confidence)) = face.dominant_emotion() {
        out.push_str(&format!(
            "- Dominant expression: {emotion} (confidence {confidence:.2})\n"
        ));
    }
    for (name, confidence) in &face.emotions {
        out.push_str(&format!("- Emotion {name}: {confidence:.2}\n"));
    }
    if let Some(smile) = face.attributes.smile {
        out.push_str(&format!("- Smile intensity: {smile:.2}\n"));
    }
    if let Some(pose) = &face.attributes.pose {
        out.push_str(&format!(
            "- Head pose: yaw {:.1}, pitch {:.1}, roll {:.1}\n",
            pose.yaw, pose.pitch, pose.roll
        ));
    }
}

fn push_transcription(out: &mut String, transcription: &TranscriptionResult) {
    if transcription.is_unavailable() {
        return;
    }
    out.push_str("\n## Speech (shared context, not attributed to one face)\n");
    out.push_str(&format!("Transcript: {}\n", transcription.text));

    for utterance in &transcription.utterances {
        if let Some(sentiment) = &utterance.sentiment {
            out.push_str(&format!(
                "- [{:.1}s-{:.1}s] ({sentiment}) {}\n",
                utterance.start_secs, utterance.end_secs, utterance.text
            ));
        }
    }
    if !transcription.topics.is_empty() {
        out.push_str(&format!("Topics: {}\n", transcription.topics.join(", ")));
    }
}

fn push_video_insights(out: &mut String, insights: &VideoInsights) {
    let emotions: Vec<&str> = insights
        .emotions
        .iter()
        .map(|t| t.label.as_str())
        .collect();
    let scenes: Vec<&str> = insights.scenes.iter().map(|t| t.label.as_str()).collect();

    if !emotions.is_empty() || !scenes.is_empty() {
        out.push_str("\n## Video observations\n");
    }
    if !emotions.is_empty() {
        out.push_str(&format!("Tracked emotions: {}\n", emotions.join(", ")));
    }
    if !scenes.is_empty() {
        out.push_str(&format!("Scenes: {}\n", scenes.join(", ")));
    }
}

/// Build one per-subject analysis prompt.
///
/// The transcription and video insights are shared context for every subject;
/// speech is not attributable to a specific face.
#[must_use]
pub fn subject_prompt(
    face: &SubjectFace,
    total_subjects: usize,
    transcription: Option<&TranscriptionResult>,
    video_insights: Option<&VideoInsights>,
) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Analyze the personality of {} based on these observations. \
         {total_subjects} people were detected in total.\n\n",
        face.label()
    ));

    push_face_observations(&mut out, face);

    if let Some(transcription) = transcription {
        push_transcription(&mut out, transcription);
    }
    if let Some(insights) = video_insights {
        push_video_insights(&mut out, insights);
    }

    out
}

/// Build the analysis prompt for text/document input (one synthetic subject)
#[must_use]
pub fn text_prompt(text: &str) -> String {
    format!(
        "Analyze the personality of the author of the following text. \
         Base the assessment on word choice, themes and expressed attitudes.\n\n{text}"
    )
}

/// Build the group-dynamics synthesis prompt from the successful profiles
#[must_use]
pub fn group_prompt(profiles: &[SubjectProfile]) -> String {
    let mut out = String::from(
        "Synthesize the group dynamic of the following individuals, \
         who appear together in one piece of media.\n",
    );
    for profile in profiles {
        if profile.is_placeholder {
            continue;
        }
        out.push_str(&format!("\n## {}\n{}\n", profile.label, profile.summary));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgeRange, BoundingBox, FaceAttributes, SubjectFace};
    use std::collections::BTreeMap;

    fn face() -> SubjectFace {
        SubjectFace {
            index: 1,
            bounding_box: BoundingBox {
                left: 0.0,
                top: 0.0,
                width: 0.5,
                height: 0.5,
            },
            age_range: Some(AgeRange { low: 20, high: 30 }),
            gender: "female".to_owned(),
            emotions: BTreeMap::from([("happiness".to_owned(), 0.9)]),
            attributes: FaceAttributes::default(),
        }
    }

    #[test]
    fn test_subject_prompt_names_the_subject() {
        let prompt = subject_prompt(&face(), 3, None, None);
        assert!(prompt.contains("Person 2"));
        assert!(prompt.contains("3 people were detected"));
        assert!(prompt.contains("Estimated age: 20 to 30"));
    }

    #[test]
    fn test_unavailable_transcription_is_omitted() {
        let placeholder = crate::models::TranscriptionResult::unavailable();
        let prompt = subject_prompt(&face(), 1, Some(&placeholder), None);
        assert!(!prompt.contains("Transcript:"));
    }

    #[test]
    fn test_group_prompt_skips_placeholders() {
        let profiles = vec![
            crate::models::SubjectProfile {
                subject_index: 0,
                label: "Person 1".to_owned(),
                summary: "Outgoing and direct".to_owned(),
                detailed: Default::default(),
                is_placeholder: false,
            },
            crate::models::SubjectProfile::placeholder(1),
        ];
        let prompt = group_prompt(&profiles);
        assert!(prompt.contains("Outgoing and direct"));
        assert!(!prompt.contains("Person 2"));
    }
}
