//! OpenAI-compatible chat-completions client for meal analysis.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use secrecy::ExposeSecret;
use serde_json::Value;
use tracing::{debug, info};

use super::{VisionAnalysis, VisionAnalyzer, sniff_image_mime, strip_code_fence};
use crate::catalog::SUPPORTED_LANGUAGES;
use crate::config::VisionConfig;
use crate::error::VisionError;
use crate::nutrition::{Normalized, normalize, render};

const PROVIDER: &str = "openai";

const SYSTEM_PROMPT: &str = r#"You are a nutritionist analyzing a photo of a meal.
Reply with a single JSON object and nothing else.
If the photo does not show food, reply {"is_food": false, "image_description": "...", "message": "..."}.
Otherwise reply with "is_food": true, "language", and these objects:
"dish_identification" {dish_name, cuisine_type, confidence_level, alternative_names[]},
"serving_info" {serving_size, estimated_weight_grams, portion_description},
"nutrition_facts" {calories, protein_g, carbohydrates_g, fat_g, fiber_g, sugar_g, sodium_mg, vitamins[], minerals[]},
"health_analysis" {health_score (1-10), health_grade, nutrition_balance, health_benefits[], health_concerns[], overall_assessment},
"dietary_info" {is_vegetarian, is_vegan, is_gluten_free, is_dairy_free, is_keto_friendly, is_diabetic_friendly, allergens[]},
"improvement_suggestions" {healthier_alternatives[], portion_recommendations, cooking_tips[], nutritional_additions[]},
"ingredient_breakdown" {main_ingredients[], spices_and_seasonings[], cooking_method}."#;

/// Vision analyzer speaking the OpenAI chat-completions protocol.
pub struct OpenAiVisionAnalyzer {
    config: VisionConfig,
    client: reqwest::Client,
}

impl OpenAiVisionAnalyzer {
    pub fn new(config: VisionConfig) -> Result<Self, VisionError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| VisionError::RequestFailed {
                provider: PROVIDER.into(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;
        info!("Using vision model {} at {}", config.model, config.api_base);
        Ok(Self { config, client })
    }

    fn request_body(&self, image: &[u8], locale: &str) -> Value {
        let data_uri = format!(
            "data:{};base64,{}",
            sniff_image_mime(image),
            BASE64.encode(image)
        );
        serde_json::json!({
            "model": self.config.model,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": user_prompt(locale) },
                        { "type": "image_url", "image_url": { "url": data_uri } }
                    ]
                }
            ]
        })
    }
}

fn user_prompt(locale: &str) -> String {
    let language = SUPPORTED_LANGUAGES
        .iter()
        .find(|l| l.code == locale)
        .map(|l| l.name)
        .unwrap_or("English");
    format!(
        "Analyze this meal. Write every text value in {language} and set \"language\" to \"{locale}\"."
    )
}

/// Pull the assistant message out of a chat-completions response and
/// parse it as a JSON object.
fn parse_completion(body: &Value) -> Result<(Value, String), VisionError> {
    let content = body
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| VisionError::InvalidResponse {
            provider: PROVIDER.into(),
            reason: "response has no message content".into(),
        })?;

    let raw_text = strip_code_fence(content).to_string();
    let raw: Value = serde_json::from_str(&raw_text)?;
    if !raw.is_object() {
        return Err(VisionError::InvalidResponse {
            provider: PROVIDER.into(),
            reason: "model output is not a JSON object".into(),
        });
    }
    Ok((raw, raw_text))
}

fn display_text(raw: &Value) -> String {
    match normalize(raw) {
        Normalized::Food(analysis) => render::analysis_message(&analysis),
        Normalized::NotFood(not_food) => not_food.description.unwrap_or_default(),
    }
}

#[async_trait]
impl VisionAnalyzer for OpenAiVisionAnalyzer {
    async fn analyze(&self, image: &[u8], locale: &str) -> Result<VisionAnalysis, VisionError> {
        let url = format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'));
        debug!(bytes = image.len(), locale, "Requesting meal analysis");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&self.request_body(image, locale))
            .send()
            .await
            .map_err(|e| VisionError::RequestFailed {
                provider: PROVIDER.into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            return Err(VisionError::RequestFailed {
                provider: PROVIDER.into(),
                reason: format!("{status}: {detail}"),
            });
        }

        let body: Value = resp.json().await.map_err(|e| VisionError::InvalidResponse {
            provider: PROVIDER.into(),
            reason: e.to_string(),
        })?;
        let (raw, raw_text) = parse_completion(&body)?;

        Ok(VisionAnalysis {
            display_text: display_text(&raw),
            raw,
            raw_text,
        })
    }
}
