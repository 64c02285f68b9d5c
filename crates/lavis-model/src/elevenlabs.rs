// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! ElevenLabs TTS-only driver.  Does not implement `complete` — this alias
//! is only ever resolved for `ModelKind::Tts` calls.

use async_trait::async_trait;

use crate::{provider::ResponseStream, CompletionRequest, ModelError};

pub struct ElevenLabsProvider {
    model: String,
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl ElevenLabsProvider {
    pub fn new(model: String, api_key: Option<String>, base_url: Option<String>) -> Self {
        Self {
            model,
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.elevenlabs.io/v1".to_string()),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl crate::ModelProvider for ElevenLabsProvider {
    fn name(&self) -> &str {
        "elevenlabs"
    }
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, _req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        anyhow::bail!("elevenlabs does not support chat completion")
    }

    async fn tts(
        &self,
        text: &str,
        voice: Option<&str>,
        format: Option<&str>,
    ) -> Result<Vec<u8>, ModelError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ModelError::Auth("ELEVENLABS_API_KEY not set".into()))?;
        let voice_id = voice.unwrap_or("21m00Tcm4TlvDq8ikWAM");
        let output_format = format.unwrap_or("mp3_44100_128");
        let url = format!(
            "{}/text-to-speech/{voice_id}?output_format={output_format}",
            self.base_url
        );
        let body = serde_json::json!({
            "text": text,
            "model_id": self.model,
        });
        let resp = self
            .client
            .post(url)
            .header("xi-api-key", key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let err_body = resp.text().await.unwrap_or_default();
            return Err(ModelError::from_status(status.as_u16(), err_body));
        }
        resp.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| ModelError::Network(e.to_string()))
    }
}
