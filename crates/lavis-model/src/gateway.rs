// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! `ModelGateway`: a uniform facade over chat/vision, STT, and TTS models
//! configured by alias, with retry/backoff and an alias-keyed provider cache.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use lavis_config::{ModelAliasConfig, ModelKind, ModelsConfig};

use crate::{provider::ResponseStream, CompletionRequest, ModelError, ModelProvider};

/// Thrown when an alias or kind name does not resolve to a configured model.
#[derive(Debug, thiserror::Error)]
#[error("no model configured for alias or kind {0:?}")]
pub struct UnresolvedAliasError(pub String);

/// Uniform facade over chat-vision, STT, and TTS models configured by alias.
///
/// Instances are cached keyed by `(alias, effective_api_key)` so that a
/// dynamic API key override invalidates exactly the aliases it affects
/// without tearing down every other provider.
pub struct ModelGateway {
    config: RwLock<ModelsConfig>,
    cache: RwLock<HashMap<(String, String), Arc<dyn ModelProvider>>>,
    /// Process-wide override that takes precedence over every alias's
    /// configured `api_key`/`api_key_env`. Set by the dynamic-key admin API.
    dynamic_api_key: RwLock<Option<String>>,
}

impl ModelGateway {
    pub fn new(config: ModelsConfig) -> Self {
        Self {
            config: RwLock::new(config),
            cache: RwLock::new(HashMap::new()),
            dynamic_api_key: RwLock::new(None),
        }
    }

    /// Install a process-wide API key override, invalidating the whole cache
    /// so the next resolution picks it up.
    pub fn set_dynamic_api_key(&self, key: Option<String>) {
        *self.dynamic_api_key.write().unwrap() = key;
        self.cache.write().unwrap().clear();
    }

    /// Replace the alias table wholesale (e.g. after a config reload),
    /// invalidating the cache.
    pub fn reload(&self, config: ModelsConfig) {
        *self.config.write().unwrap() = config;
        self.cache.write().unwrap().clear();
    }

    /// Resolve `alias_or_kind` to its [`ModelAliasConfig`].  `alias_or_kind`
    /// is first looked up as a literal alias name; if absent, it is parsed as
    /// a `ModelKind` (`CHAT`/`STT`/`TTS`, case-insensitive) and the kind's
    /// configured default alias is used instead.
    fn resolve(&self, alias_or_kind: &str) -> Result<(String, ModelAliasConfig), UnresolvedAliasError> {
        let cfg = self.config.read().unwrap();
        if let Some(alias) = cfg.aliases.get(alias_or_kind) {
            return Ok((alias_or_kind.to_string(), alias.clone()));
        }
        let kind = match alias_or_kind.to_ascii_uppercase().as_str() {
            "CHAT" => ModelKind::Chat,
            "STT" => ModelKind::Stt,
            "TTS" => ModelKind::Tts,
            _ => return Err(UnresolvedAliasError(alias_or_kind.to_string())),
        };
        let default_alias = cfg
            .defaults
            .get(&kind)
            .ok_or_else(|| UnresolvedAliasError(alias_or_kind.to_string()))?;
        let alias_cfg = cfg
            .aliases
            .get(default_alias)
            .ok_or_else(|| UnresolvedAliasError(alias_or_kind.to_string()))?;
        Ok((default_alias.clone(), alias_cfg.clone()))
    }

    /// Resolve `alias_or_kind` to a (possibly cached) provider instance.
    fn provider_for(&self, alias_or_kind: &str) -> anyhow::Result<(Arc<dyn ModelProvider>, ModelAliasConfig)> {
        let (alias, mut alias_cfg) = self.resolve(alias_or_kind)?;
        let dynamic_key = self.dynamic_api_key.read().unwrap().clone();
        if let Some(k) = &dynamic_key {
            alias_cfg.api_key = Some(k.clone());
        }
        let cache_key = (alias, alias_cfg.api_key.clone().unwrap_or_default());
        if let Some(p) = self.cache.read().unwrap().get(&cache_key) {
            return Ok((p.clone(), alias_cfg));
        }
        let provider: Arc<dyn ModelProvider> = Arc::from(crate::from_config(&alias_cfg)?);
        self.cache.write().unwrap().insert(cache_key, provider.clone());
        Ok((provider, alias_cfg))
    }

    /// Non-streaming chat: collects a [`ResponseStream`] into plain text.
    /// `alias_or_kind` is usually `"CHAT"` or a named alias (e.g. `"vision"`).
    pub async fn chat(&self, alias_or_kind: &str, req: CompletionRequest) -> Result<String, ModelError> {
        let stream = self.complete_with_retry(alias_or_kind, req).await?;
        collect_text(stream).await
    }

    /// Streaming chat that may also surface tool calls; returns the raw
    /// event stream for the caller (`MicroExecutor`) to drive.
    pub async fn chat_with_tools(
        &self,
        alias_or_kind: &str,
        req: CompletionRequest,
    ) -> Result<ResponseStream, ModelError> {
        self.complete_with_retry(alias_or_kind, req).await
    }

    async fn complete_with_retry(
        &self,
        alias_or_kind: &str,
        req: CompletionRequest,
    ) -> Result<ResponseStream, ModelError> {
        let (provider, alias_cfg) = self
            .provider_for(alias_or_kind)
            .map_err(|e| ModelError::Unknown(e.to_string()))?;
        let mut attempt = 0u32;
        let mut delay = Duration::from_millis(250);
        loop {
            let call = tokio::time::timeout(
                Duration::from_secs(alias_cfg.timeout_sec),
                provider.complete(req.clone()),
            )
            .await;
            match call {
                Ok(Ok(stream)) => return Ok(stream),
                Ok(Err(e)) => {
                    let err = ModelError::Unknown(e.to_string());
                    if attempt >= alias_cfg.max_retries || !err.is_retryable() {
                        return Err(err);
                    }
                }
                Err(_) => {
                    if attempt >= alias_cfg.max_retries {
                        return Err(ModelError::Timeout(format!(
                            "{} timed out after {}s",
                            alias_cfg.provider, alias_cfg.timeout_sec
                        )));
                    }
                }
            }
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(Duration::from_secs(4));
            attempt += 1;
        }
    }

    /// Transcribe audio to text via the `STT`-kind alias (or a named alias).
    pub async fn stt(&self, alias_or_kind: &str, audio: Vec<u8>, mime_type: &str) -> Result<String, ModelError> {
        let (provider, _) = self
            .provider_for(alias_or_kind)
            .map_err(|e| ModelError::Unknown(e.to_string()))?;
        provider.stt(audio, mime_type).await
    }

    /// Synthesize speech via the `TTS`-kind alias (or a named alias).
    pub async fn tts(
        &self,
        alias_or_kind: &str,
        text: &str,
        voice: Option<&str>,
        format: Option<&str>,
    ) -> Result<Vec<u8>, ModelError> {
        let (provider, alias_cfg) = self
            .provider_for(alias_or_kind)
            .map_err(|e| ModelError::Unknown(e.to_string()))?;
        let voice = voice.or(alias_cfg.voice.as_deref());
        let format = format.or(alias_cfg.format.as_deref());
        provider.tts(text, voice, format).await
    }
}

async fn collect_text(mut stream: ResponseStream) -> Result<String, ModelError> {
    use futures::StreamExt;
    let mut out = String::new();
    while let Some(event) = stream.next().await {
        match event.map_err(|e| ModelError::Unknown(e.to_string()))? {
            crate::ResponseEvent::TextDelta(s) => out.push_str(&s),
            crate::ResponseEvent::Done => break,
            crate::ResponseEvent::Error(msg) => return Err(ModelError::Unknown(msg)),
            _ => {}
        }
    }
    Ok(out)
}
