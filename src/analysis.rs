//src/analysis.rs
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{AnalysisConfig, Units};
use crate::model::Workout;

const FALLBACK_SUMMARY: &str = "Great job completing your workout!";
const FALLBACK_TIPS: [&str; 3] = [
    "Stay hydrated.",
    "Ensure you get enough protein.",
    "Rest well for your next session.",
];
const FALLBACK_FOCUS: &str = "Full Body";

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("API key is missing. Set analysis.api_key in the config or the LIFTLOG_API_KEY variable.")]
    MissingCredential,
    #[error("Request to the analysis service failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Analysis service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("No response text from the analysis service")]
    EmptyResponse,
    #[error("Malformed analysis response: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub summary: String,
    pub tips: Vec<String>,
    pub muscle_group_focus: String,
}

impl AnalysisResult {
    /// Result shown whenever the service cannot produce one.
    pub fn fallback() -> Self {
        Self {
            summary: FALLBACK_SUMMARY.to_string(),
            tips: FALLBACK_TIPS.iter().map(ToString::to_string).collect(),
            muscle_group_focus: FALLBACK_FOCUS.to_string(),
        }
    }
}

/// A prompt bound to the workout it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub workout_id: String,
    pub prompt: String,
}

/// A result tagged with the workout it was requested for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedAnalysis {
    pub workout_id: String,
    pub result: AnalysisResult,
}

/// One line per exercise; only sets with both weight and reps are listed.
pub fn format_workout(workout: &Workout, units: Units) -> String {
    let unit = units.weight_label();
    workout
        .exercises
        .iter()
        .map(|ex| {
            let sets = ex
                .sets
                .iter()
                .filter_map(|s| Some(format!("{}{unit} x {}", s.weight?, s.reps?)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{}: [{sets}]", ex.name)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_prompt(workout: &Workout, units: Units) -> String {
    format!(
        "Analyze the following workout session data and provide a brief summary, \
         3 actionable tips for improvement or recovery, and identify the primary muscle group focus.\n\n\
         Workout Data:\n{}\n",
        format_workout(workout, units)
    )
}

/// Parses the service's JSON text; all three fields are required.
pub fn parse_result(text: &str) -> Result<AnalysisResult, AnalysisError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AnalysisError::EmptyResponse);
    }
    // Tolerate a fenced ```json block around the payload.
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    Ok(serde_json::from_str(body.trim())?)
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns the raw text produced for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, AnalysisError>;
}

#[derive(Deserialize, Debug, Default)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize, Debug)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize, Debug)]
struct Part {
    text: Option<String>,
}

/// Client for the Gemini `generateContent` REST endpoint.
pub struct GeminiClient {
    http_client: Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(settings: &AnalysisConfig, api_key: String) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .unwrap_or_else(|err| {
                warn!(error = %err, "Failed to build analysis HTTP client; using defaults");
                Client::new()
            });
        Self {
            http_client,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key,
        }
    }

    fn request_body(prompt: &str) -> serde_json::Value {
        json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "OBJECT",
                    "properties": {
                        "summary": {
                            "type": "STRING",
                            "description": "A motivating 1-2 sentence summary of the session."
                        },
                        "tips": {
                            "type": "ARRAY",
                            "items": { "type": "STRING" },
                            "description": "3 actionable tips for post-workout recovery or next session improvement."
                        },
                        "muscleGroupFocus": {
                            "type": "STRING",
                            "description": "The primary muscle groups worked (e.g., Chest & Triceps)."
                        }
                    },
                    "required": ["summary", "tips", "muscleGroupFocus"]
                }
            }
        })
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, AnalysisError> {
        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
        debug!(url = %url, "Sending analysis request");

        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::request_body(prompt))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error body".to_string());
            return Err(AnalysisError::Status { status, body });
        }

        let parsed: GenerateResponse = response.json().await?;
        parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.text)
            .ok_or(AnalysisError::EmptyResponse)
    }
}

/// Turns a workout into an analysis, never failing: any problem yields
/// [`AnalysisResult::fallback`].
pub struct AnalysisGateway {
    generator: Option<Box<dyn TextGenerator>>,
    units: Units,
}

impl AnalysisGateway {
    pub fn new(generator: Option<Box<dyn TextGenerator>>, units: Units) -> Self {
        Self { generator, units }
    }

    /// Builds a gateway backed by Gemini when a credential is configured.
    pub fn from_config(settings: &AnalysisConfig, units: Units) -> Self {
        let generator = settings.resolve_api_key().map(|key| {
            Box::new(GeminiClient::new(settings, key)) as Box<dyn TextGenerator>
        });
        Self::new(generator, units)
    }

    pub fn has_credential(&self) -> bool {
        self.generator.is_some()
    }

    pub fn prepare(&self, workout: &Workout) -> AnalysisRequest {
        AnalysisRequest {
            workout_id: workout.id.clone(),
            prompt: build_prompt(workout, self.units),
        }
    }

    async fn try_analyze(&self, prompt: &str) -> Result<AnalysisResult, AnalysisError> {
        let generator = self
            .generator
            .as_ref()
            .ok_or(AnalysisError::MissingCredential)?;
        let text = generator.generate(prompt).await?;
        parse_result(&text)
    }

    pub async fn analyze(&self, request: AnalysisRequest) -> TaggedAnalysis {
        let result = match self.try_analyze(&request.prompt).await {
            Ok(result) => {
                info!(workout_id = %request.workout_id, "Received workout analysis");
                result
            }
            Err(AnalysisError::MissingCredential) => {
                warn!("No analysis credential configured; using fallback analysis");
                AnalysisResult::fallback()
            }
            Err(e) => {
                error!(workout_id = %request.workout_id, error = %e, "Workout analysis failed");
                AnalysisResult::fallback()
            }
        };
        TaggedAnalysis {
            workout_id: request.workout_id,
            result,
        }
    }

    pub async fn request(&self, workout: &Workout) -> TaggedAnalysis {
        self.analyze(self.prepare(workout)).await
    }
}
