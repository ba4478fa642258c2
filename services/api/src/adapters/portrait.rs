//! services/api/src/adapters/portrait.rs
//!
//! This module contains the adapter for the image-generation model that turns a pet
//! photo into an illustrated portrait. It implements the `PortraitService` port.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use pet_tales_core::{
    domain::{ImagePayload, PortraitOptions},
    ports::{PortError, PortResult, PortraitService},
    prompts::portrait_prompt,
};
use tracing::{error, warn};

/// Shown to the writer whenever a portrait could not be produced.
pub const PORTRAIT_FAILED_MESSAGE: &str = "Could not generate the image. The model may be unavailable or the request was blocked. Please try again later.";

/// An adapter that implements `PortraitService` against the Gemini `generateContent` API.
#[derive(Clone)]
pub struct GeminiPortraitAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiPortraitAdapter {
    pub fn new(client: reqwest::Client, api_key: String, base_url: String, model: String) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }
}

/// Finds the first inline image among the parts of the first candidate.
fn extract_image(json: &serde_json::Value) -> Option<ImagePayload> {
    let parts = json["candidates"]
        .as_array()
        .and_then(|arr| arr.first())
        .and_then(|c| c["content"]["parts"].as_array())?;

    parts.iter().find_map(|part| {
        let inline = part.get("inlineData").or_else(|| part.get("inline_data"))?;
        let data = STANDARD.decode(inline["data"].as_str()?).ok()?;
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(|m| m.as_str())
            .unwrap_or("image/png")
            .to_string();
        Some(ImagePayload { mime_type, data })
    })
}

#[async_trait]
impl PortraitService for GeminiPortraitAdapter {
    async fn generate_portrait(
        &self,
        photo: &ImagePayload,
        options: &PortraitOptions,
    ) -> PortResult<ImagePayload> {
        let body = serde_json::json!({
            "contents": [{
                "parts": [
                    {
                        "inlineData": {
                            "mimeType": photo.mime_type,
                            "data": STANDARD.encode(&photo.data),
                        }
                    },
                    { "text": portrait_prompt(options) }
                ]
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE", "TEXT"]
            }
        });

        let resp = self
            .client
            .post(self.endpoint())
            .header("content-type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Portrait request failed: {}", e);
                PortError::Unexpected(PORTRAIT_FAILED_MESSAGE.to_string())
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %text, "Portrait model returned an error");
            return Err(PortError::Unexpected(PORTRAIT_FAILED_MESSAGE.to_string()));
        }

        let json: serde_json::Value = resp.json().await.map_err(|e| {
            error!("Portrait response was not JSON: {}", e);
            PortError::Unexpected(PORTRAIT_FAILED_MESSAGE.to_string())
        })?;

        extract_image(&json).ok_or_else(|| {
            warn!("Portrait response carried no image part");
            PortError::Unexpected(PORTRAIT_FAILED_MESSAGE.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_the_image_after_a_text_part() {
        let json = serde_json::json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "Here you go" },
                        { "inlineData": { "mimeType": "image/jpeg", "data": STANDARD.encode([1u8, 2, 3]) } }
                    ]
                }
            }]
        });
        let image = extract_image(&json).unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(image.data, vec![1, 2, 3]);
    }

    #[test]
    fn text_only_answers_have_no_image() {
        let json = serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "I can't draw that" }] } }]
        });
        assert!(extract_image(&json).is_none());
        assert!(extract_image(&serde_json::json!({})).is_none());
    }
}
