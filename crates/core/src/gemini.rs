use crate::exercise::ExerciseKind;
use crate::prompts::{self, PromptBook};
use crate::tutor::{Evaluation, ExerciseSetup, Tutor, TutorReply};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";
pub const DEFAULT_VOICE: &str = "Kore";

#[derive(Debug, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    pub content: Option<Content>,
}

#[derive(Debug, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub text: Option<String>,
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: Option<String>,
    pub data: String,
}

impl GenerateContentResponse {
    fn first_parts(&self) -> &[Part] {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.as_slice())
            .unwrap_or_default()
    }

    /// All text parts of the first candidate, concatenated.
    pub fn text(&self) -> Option<String> {
        let text: String = self
            .first_parts()
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.is_empty() { None } else { Some(text) }
    }

    pub fn audio(&self) -> Option<&InlineData> {
        self.first_parts().iter().find_map(|p| p.inline_data.as_ref())
    }
}

/// `Tutor` backed by the Gemini `generateContent` REST endpoint.
pub struct GeminiTutor {
    client: Client,
    api_key: SecretString,
    base_url: String,
    chat_model: String,
    tts_model: String,
    voice: String,
    prompts: PromptBook,
}

impl GeminiTutor {
    pub fn new(api_key: SecretString, prompts: PromptBook) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            tts_model: DEFAULT_TTS_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            prompts,
        }
    }

    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    pub fn with_tts_model(mut self, model: impl Into<String>) -> Self {
        self.tts_model = model.into();
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn generate(&self, model: &str, body: Value) -> Result<GenerateContentResponse> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        tracing::debug!("POST {}", url);

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Request to {model} failed"))?
            .error_for_status()
            .with_context(|| format!("{model} rejected the request"))?
            .json::<GenerateContentResponse>()
            .await
            .with_context(|| format!("Unexpected response body from {model}"))?;

        Ok(resp)
    }

    /// Runs a text prompt that must come back as JSON matching `schema`.
    async fn generate_json<T: DeserializeOwned>(
        &self,
        prompt: String,
        system: Option<String>,
        schema: Value,
    ) -> Result<T> {
        let mut body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": schema
            }
        });
        if let Some(system) = system {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }

        let resp = self.generate(&self.chat_model, body).await?;
        let answer = resp
            .text()
            .ok_or_else(|| anyhow::anyhow!("No response from {}", self.chat_model))?;

        serde_json::from_str(&answer)
            .map_err(|e| anyhow::anyhow!("Failed to parse model response: {e}: {answer}"))
    }
}

fn setup_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "prompt": { "type": "STRING" },
            "constraints": { "type": "STRING" }
        },
        "required": ["prompt"]
    })
}

fn evaluation_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "score": { "type": "NUMBER" },
            "feedback": { "type": "STRING" },
            "validWords": { "type": "ARRAY", "items": { "type": "STRING" } },
            "invalidWords": { "type": "ARRAY", "items": { "type": "STRING" } }
        },
        "required": ["score", "feedback", "validWords", "invalidWords"]
    })
}

fn tutor_reply_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "text": { "type": "STRING" },
            "nextPhase": { "type": "STRING" },
            "isComplete": { "type": "BOOLEAN" },
            "feedback": { "type": "STRING" }
        },
        "required": ["text", "nextPhase", "isComplete", "feedback"]
    })
}

#[async_trait]
impl Tutor for GeminiTutor {
    async fn get_exercise_setup(&self, kind: ExerciseKind) -> Result<ExerciseSetup> {
        let prompt = self
            .prompts
            .render(prompts::EXERCISE_SETUP, &[("kind", kind.as_str())]);
        let setup: ExerciseSetup = self.generate_json(prompt, None, setup_schema()).await?;
        // An empty string means "no constraints".
        Ok(ExerciseSetup {
            constraints: setup.constraints.filter(|c| !c.trim().is_empty()),
            ..setup
        })
    }

    async fn evaluate_exercise(
        &self,
        kind: ExerciseKind,
        setup: &ExerciseSetup,
        transcript: &str,
    ) -> Result<Evaluation> {
        let constraints = setup
            .constraints
            .as_deref()
            .map(|c| format!("Vincoli: {c}."))
            .unwrap_or_default();
        let prompt = self.prompts.render(
            prompts::EVALUATE_EXERCISE,
            &[
                ("kind", kind.as_str()),
                ("prompt", &setup.prompt),
                ("constraints", &constraints),
                ("transcript", transcript),
            ],
        );
        self.generate_json(prompt, None, evaluation_schema()).await
    }

    async fn get_tutor_response(
        &self,
        kind: ExerciseKind,
        phase: &str,
        utterance: &str,
        history: &[String],
    ) -> Result<TutorReply> {
        let history = history.join("|");
        let prompt = self.prompts.render(
            prompts::TUTOR_TURN,
            &[
                ("kind", kind.as_str()),
                ("phase", phase),
                ("utterance", utterance),
                ("history", &history),
            ],
        );
        let system = self.prompts.template(prompts::TUTOR_SYSTEM).to_string();
        self.generate_json(prompt, Some(system), tutor_reply_schema())
            .await
    }

    async fn get_theory_explanation(&self, theory: &str) -> Result<String> {
        let prompt = self
            .prompts
            .render(prompts::THEORY_EXPLANATION, &[("theory", theory)]);
        let body = json!({
            "systemInstruction": {
                "parts": [{ "text": self.prompts.template(prompts::COACH_SYSTEM) }]
            },
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
        });

        let resp = self.generate(&self.chat_model, body).await?;
        resp.text()
            .ok_or_else(|| anyhow::anyhow!("No explanation from {}", self.chat_model))
    }

    async fn get_speech_data(&self, text: &str) -> Result<Option<String>> {
        let body = json!({
            "contents": [{ "parts": [{ "text": text }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": self.voice } }
                }
            }
        });

        let resp = self.generate(&self.tts_model, body).await?;
        let audio = resp.audio();
        if let Some(inline) = audio {
            tracing::debug!(
                "Received {} bytes of base64 audio ({:?})",
                inline.data.len(),
                inline.mime_type
            );
        }
        Ok(audio.map(|inline| inline.data.clone()))
    }
}
