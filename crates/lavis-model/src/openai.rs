// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! OpenAI driver — thin wrapper around the shared [`OpenAICompatProvider`].
//!
//! Kept as a named type so that the public `lavis_model::OpenAiProvider` export
//! remains stable.

use async_trait::async_trait;

use crate::{
    catalog::ModelCatalogEntry,
    openai_compat::{AuthStyle, OpenAICompatProvider},
    provider::ResponseStream,
    CompletionRequest, ModelError,
};

/// OpenAI chat-completions driver.  Also doubles as the `stt` provider for
/// the `whisper-1`/`gpt-4o-transcribe` family via `/audio/transcriptions`.
pub struct OpenAiProvider {
    inner: OpenAICompatProvider,
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(
        model: String,
        api_key: Option<String>,
        base_url: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
        driver_options: serde_json::Value,
    ) -> Self {
        let base_url = base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        Self {
            inner: OpenAICompatProvider::new(
                "openai",
                model,
                api_key.clone(),
                &base_url,
                max_tokens,
                temperature,
                vec![],
                AuthStyle::Bearer,
                driver_options,
            ),
            api_key,
            base_url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl crate::ModelProvider for OpenAiProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn list_models(&self) -> anyhow::Result<Vec<ModelCatalogEntry>> {
        self.inner.list_models().await
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        self.inner.complete(req).await
    }

    async fn stt(&self, audio: Vec<u8>, mime_type: &str) -> Result<String, ModelError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ModelError::Auth("OPENAI_API_KEY not set".into()))?;
        let ext = mime_type.split('/').next_back().unwrap_or("wav");
        let part = reqwest::multipart::Part::bytes(audio)
            .file_name(format!("audio.{ext}"))
            .mime_str(mime_type)
            .map_err(|e| ModelError::Unknown(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model_name().to_string());
        let resp = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ModelError::from_status(status.as_u16(), body));
        }
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ModelError::Unknown(e.to_string()))?;
        body.get("text")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| ModelError::Unknown("missing `text` field in transcription response".into()))
    }
}
