use crate::exercise::ExerciseKind;
use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Deserializer, Serialize};

/// What the tutor hands out before a timed exercise starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExerciseSetup {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<String>,
}

/// The tutor's verdict on a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    #[serde(deserialize_with = "deserialize_score")]
    pub score: u8,
    pub feedback: String,
    #[serde(default)]
    pub valid_words: Vec<String>,
    #[serde(default)]
    pub invalid_words: Vec<String>,
}

/// One turn of a guided dialogue, as decided by the tutor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorReply {
    pub text: String,
    /// Opaque phase token. Only the tutor knows what it means.
    pub next_phase: String,
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default)]
    pub feedback: String,
}

// Models return scores as JSON numbers, sometimes fractional or out of range.
fn deserialize_score<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    Ok(clamp_score(raw))
}

pub fn clamp_score(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}

/// The remote intelligence behind every exercise.
///
/// Sessions only ever talk to this trait, so the whole state machine can be
/// driven by `MockTutor` in tests. All judgment (setup generation, scoring,
/// pacing of the dialogue) lives behind it.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Tutor: Send + Sync {
    /// Generates the prompt (and optional constraints) for a timed exercise.
    async fn get_exercise_setup(&self, kind: ExerciseKind) -> Result<ExerciseSetup>;

    /// Scores a transcript against the setup it answered. An empty
    /// transcript is still sent.
    async fn evaluate_exercise(
        &self,
        kind: ExerciseKind,
        setup: &ExerciseSetup,
        transcript: &str,
    ) -> Result<Evaluation>;

    async fn get_tutor_response(
        &self,
        kind: ExerciseKind,
        phase: &str,
        utterance: &str,
        history: &[String],
    ) -> Result<TutorReply>;

    async fn get_theory_explanation(&self, theory: &str) -> Result<String>;

    /// Base64 PCM16 mono audio at 24kHz, or `None` when no audio came back.
    async fn get_speech_data(&self, text: &str) -> Result<Option<String>>;
}
