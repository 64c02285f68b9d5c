// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub actuator: ActuatorConfig,
    #[serde(default)]
    pub skills: SkillsConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Which kind of call a model alias is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModelKind {
    Chat,
    Stt,
    Tts,
}

/// The whole `models:` section: a named map of aliases plus a default alias
/// per kind.  `ModelGateway` resolves `(alias)` or `(kind)` to a concrete
/// [`ModelAliasConfig`] through this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// alias name → configuration.
    #[serde(default = "default_aliases")]
    pub aliases: HashMap<String, ModelAliasConfig>,
    /// Default alias used when a caller does not name one, per kind.
    #[serde(default = "default_default_aliases")]
    pub defaults: HashMap<ModelKindKey, String>,
}

/// `HashMap` keys must implement `Eq + Hash` and (de)serialize as map keys;
/// `ModelKind` itself derives those via this thin wrapper so the `defaults`
/// map round-trips through YAML as `{CHAT: ..., STT: ..., TTS: ...}`.
pub type ModelKindKey = ModelKind;

impl std::hash::Hash for ModelKind {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (*self as u8).hash(state);
    }
}

fn default_aliases() -> HashMap<String, ModelAliasConfig> {
    let mut m = HashMap::new();
    m.insert("default-chat".to_string(), ModelAliasConfig {
        kind: ModelKind::Chat,
        ..ModelAliasConfig::default()
    });
    m
}

fn default_default_aliases() -> HashMap<ModelKind, String> {
    let mut m = HashMap::new();
    m.insert(ModelKind::Chat, "default-chat".to_string());
    m
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            aliases: default_aliases(),
            defaults: default_default_aliases(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelAliasConfig {
    /// CHAT | STT | TTS — which `ModelGateway` operation this alias serves.
    #[serde(default = "default_model_kind")]
    pub kind: ModelKind,
    /// Provider identifier: "openai" | "anthropic" | "google" | "azure" |
    /// "aws" | "groq" | "openrouter" | "ollama" | "mistral" | "deepseek" |
    /// "elevenlabs" | "mock".
    pub provider: String,
    /// Model name forwarded to the provider API.
    #[serde(rename = "model_name", alias = "name")]
    pub name: String,
    /// Environment variable that holds the API key (read at startup).
    pub api_key_env: Option<String>,
    /// Explicit API key; prefer api_key_env to keep secrets out of files on disk.
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    /// Maximum tokens to request in a single completion.
    pub max_tokens: Option<u32>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_sec")]
    pub timeout_sec: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// TTS voice identifier (ignored for CHAT/STT aliases).
    pub voice: Option<String>,
    /// Audio format for TTS output, e.g. "mp3" | "wav" (ignored otherwise).
    pub format: Option<String>,

    // ── Azure OpenAI ──────────────────────────────────────────────────────────
    pub azure_resource: Option<String>,
    pub azure_deployment: Option<String>,
    pub azure_api_version: Option<String>,

    // ── AWS Bedrock ───────────────────────────────────────────────────────────
    pub aws_region: Option<String>,

    // ── Prompt caching (Anthropic-style explicit cache_control) ─────────────
    #[serde(default = "default_true")]
    pub cache_system_prompt: bool,
    #[serde(default)]
    pub extended_cache_time: bool,
    #[serde(default = "default_true")]
    pub cache_tools: bool,
    #[serde(default = "default_true")]
    pub cache_conversation: bool,
    #[serde(default = "default_true")]
    pub cache_images: bool,
    #[serde(default = "default_true")]
    pub cache_tool_results: bool,

    /// Provider-specific extras not covered by the standard fields above
    /// (custom headers, vendor parameters).
    #[serde(default)]
    pub driver_options: serde_json::Value,

    /// Path to a YAML mock-responses file (provider = "mock" only).
    pub mock_responses_file: Option<String>,
}

fn default_model_kind() -> ModelKind {
    ModelKind::Chat
}
fn default_temperature() -> f32 {
    0.2
}
fn default_timeout_sec() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    3
}

impl Default for ModelAliasConfig {
    fn default() -> Self {
        Self {
            kind: ModelKind::Chat,
            provider: "openai".into(),
            name: "gpt-4o".into(),
            api_key_env: None,
            api_key: None,
            base_url: None,
            max_tokens: None,
            temperature: default_temperature(),
            timeout_sec: default_timeout_sec(),
            max_retries: default_max_retries(),
            voice: None,
            format: None,
            azure_resource: None,
            azure_deployment: None,
            azure_api_version: None,
            aws_region: None,
            cache_system_prompt: true,
            extended_cache_time: false,
            cache_tools: true,
            cache_conversation: true,
            cache_images: true,
            cache_tool_results: true,
            driver_options: serde_json::Value::Null,
            mock_responses_file: None,
        }
    }
}

fn default_max_milestones() -> usize {
    20
}
fn default_cycle_cap() -> u32 {
    8
}
fn default_milestone_timeout_secs() -> u64 {
    120
}
fn default_milestone_max_retries() -> u32 {
    2
}
fn default_stt_timeout_secs() -> u64 {
    300
}
fn default_turn_memory_max_entries() -> usize {
    200
}
fn default_legacy_image_window() -> usize {
    4
}
fn default_recent_actions_cap() -> usize {
    10
}

/// Orchestration-level tuning: plan size caps, per-milestone timeouts,
/// retry policy, and `TurnMemory`/`GlobalContext` bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_milestones")]
    pub max_milestones: usize,
    #[serde(default = "default_cycle_cap")]
    pub cycle_cap: u32,
    #[serde(default = "default_milestone_timeout_secs")]
    pub milestone_timeout_secs: u64,
    #[serde(default = "default_milestone_max_retries")]
    pub milestone_max_retries: u32,
    #[serde(default = "default_stt_timeout_secs")]
    pub stt_timeout_secs: u64,
    #[serde(default = "default_turn_memory_max_entries")]
    pub turn_memory_max_entries: usize,
    #[serde(default = "default_legacy_image_window")]
    pub legacy_image_window: usize,
    #[serde(default = "default_recent_actions_cap")]
    pub recent_actions_cap: usize,
    /// System prompt override for the MicroExecutor's decision call; leave
    /// `None` to use the built-in prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_milestones: default_max_milestones(),
            cycle_cap: default_cycle_cap(),
            milestone_timeout_secs: default_milestone_timeout_secs(),
            milestone_max_retries: default_milestone_max_retries(),
            stt_timeout_secs: default_stt_timeout_secs(),
            turn_memory_max_entries: default_turn_memory_max_entries(),
            legacy_image_window: default_legacy_image_window(),
            recent_actions_cap: default_recent_actions_cap(),
            system_prompt: None,
        }
    }
}

fn default_safe_margin() -> u32 {
    40
}
fn default_deviation_threshold() -> f64 {
    3.0
}
fn default_shell_timeout_secs() -> u64 {
    30
}
fn default_drag_min_steps() -> u32 {
    30
}

/// `SystemActuator` coordinate-safety and timing policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorConfig {
    #[serde(default = "default_safe_margin")]
    pub safe_margin_top: u32,
    #[serde(default = "default_safe_margin")]
    pub safe_margin_left: u32,
    #[serde(default = "default_safe_margin")]
    pub safe_margin_right: u32,
    #[serde(default = "default_safe_margin")]
    pub safe_margin_bottom: u32,
    /// Maximum allowed deviation (logical px) between requested and actual
    /// pointer position before a primitive is reported as failed.
    #[serde(default = "default_deviation_threshold")]
    pub deviation_threshold: f64,
    /// "human-like" Bézier-path pointer motion vs. a straight mechanical path.
    #[serde(default = "default_true")]
    pub human_like_motion: bool,
    #[serde(default = "default_shell_timeout_secs")]
    pub shell_timeout_secs: u64,
    #[serde(default = "default_drag_min_steps")]
    pub drag_min_steps: u32,
    /// Glob patterns matched against the literal `shellExec`/`osScript` command
    /// string; a match auto-approves the call without asking.
    #[serde(default = "default_auto_approve_patterns")]
    pub auto_approve_patterns: Vec<String>,
    /// Glob patterns that deny a `shellExec`/`osScript` call outright, even if
    /// it also matches an auto-approve pattern.
    #[serde(default)]
    pub deny_patterns: Vec<String>,
}

fn default_auto_approve_patterns() -> Vec<String> {
    vec!["cat *".to_string(), "ls*".to_string(), "pwd".to_string()]
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            safe_margin_top: default_safe_margin(),
            safe_margin_left: default_safe_margin(),
            safe_margin_right: default_safe_margin(),
            safe_margin_bottom: default_safe_margin(),
            deviation_threshold: default_deviation_threshold(),
            human_like_motion: true,
            shell_timeout_secs: default_shell_timeout_secs(),
            drag_min_steps: default_drag_min_steps(),
            auto_approve_patterns: default_auto_approve_patterns(),
            deny_patterns: Vec::new(),
        }
    }
}

fn default_skills_root() -> String {
    "~/.lavis/skills".into()
}
fn default_watch_debounce_ms() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillsConfig {
    #[serde(default = "default_skills_root")]
    pub root: String,
    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            root: default_skills_root(),
            watch_debounce_ms: default_watch_debounce_ms(),
        }
    }
}

fn default_backup_retention_days() -> u32 {
    30
}
fn default_backup_hour_local() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_backup_hour_local")]
    pub daily_backup_hour_local: u32,
    #[serde(default = "default_backup_retention_days")]
    pub backup_retention_days: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            daily_backup_hour_local: default_backup_hour_local(),
            backup_retention_days: default_backup_retention_days(),
        }
    }
}

fn default_tts_worker_pool_size() -> usize {
    2
}
fn default_tts_segment_bytes() -> usize {
    64 * 1024
}
fn default_push_queue_capacity() -> usize {
    256
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    #[serde(default = "default_push_queue_capacity")]
    pub connection_queue_capacity: usize,
    #[serde(default = "default_tts_worker_pool_size")]
    pub tts_worker_pool_size: usize,
    #[serde(default = "default_tts_segment_bytes")]
    pub tts_segment_bytes: usize,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            connection_queue_capacity: default_push_queue_capacity(),
            tts_worker_pool_size: default_tts_worker_pool_size(),
            tts_segment_bytes: default_tts_segment_bytes(),
        }
    }
}

fn default_store_dir() -> String {
    "~/.lavis/data".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_dir")]
    pub dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { dir: default_store_dir() }
    }
}

fn default_http_port() -> u16 {
    8080
}
fn default_config_port() -> u16 {
    18765
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default = "default_config_port")]
    pub config_port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
            config_port: default_config_port(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_http_port_is_8080() {
        assert_eq!(Config::default().http.port, 8080);
    }

    #[test]
    fn config_default_config_port_is_18765() {
        assert_eq!(Config::default().http.config_port, 18765);
    }

    #[test]
    fn config_default_skills_root() {
        assert_eq!(Config::default().skills.root, "~/.lavis/skills");
    }

    #[test]
    fn config_default_store_dir() {
        assert_eq!(Config::default().store.dir, "~/.lavis/data");
    }

    #[test]
    fn config_default_has_default_chat_alias() {
        let c = Config::default();
        assert!(c.models.aliases.contains_key("default-chat"));
        assert_eq!(
            c.models.defaults.get(&ModelKind::Chat).map(String::as_str),
            Some("default-chat")
        );
    }

    #[test]
    fn config_default_agent_cycle_cap_is_eight() {
        assert_eq!(Config::default().agent.cycle_cap, 8);
    }

    #[test]
    fn config_default_max_milestones_is_twenty() {
        assert_eq!(Config::default().agent.max_milestones, 20);
    }

    #[test]
    fn config_default_actuator_margins_positive() {
        let a = ActuatorConfig::default();
        assert!(a.safe_margin_top > 0);
        assert!(a.safe_margin_left > 0);
        assert!(a.safe_margin_right > 0);
        assert!(a.safe_margin_bottom > 0);
    }

    #[test]
    fn config_default_human_like_motion_enabled() {
        assert!(ActuatorConfig::default().human_like_motion);
    }

    #[test]
    fn config_default_scheduler_enabled() {
        assert!(SchedulerConfig::default().enabled);
    }

    #[test]
    fn config_default_backup_retention_is_30_days() {
        assert_eq!(SchedulerConfig::default().backup_retention_days, 30);
    }

    #[test]
    fn config_serialises_to_valid_yaml() {
        let c = Config::default();
        let yaml_str = serde_yaml::to_string(&c).unwrap();
        assert!(yaml_str.contains("aliases"));
        assert!(yaml_str.contains("default-chat"));
    }

    #[test]
    fn config_deserialises_partial_yaml_fills_defaults() {
        let yaml_str = "http:\n  port: 9090\n";
        let c: Config = serde_yaml::from_str(yaml_str).unwrap();
        assert_eq!(c.http.port, 9090);
        assert_eq!(c.http.config_port, 18765);
        assert_eq!(c.agent.cycle_cap, 8);
    }

    #[test]
    fn model_alias_yaml_round_trip() {
        let yaml = r#"
models:
  aliases:
    vision:
      kind: CHAT
      provider: anthropic
      model_name: claude-opus-4-5
      api_key_env: ANTHROPIC_API_KEY
    whisper:
      kind: STT
      provider: openai
      model_name: whisper-1
  defaults:
    CHAT: vision
    STT: whisper
"#;
        let c: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(c.models.aliases.len(), 2);
        let vision = c.models.aliases.get("vision").unwrap();
        assert_eq!(vision.provider, "anthropic");
        assert_eq!(vision.kind, ModelKind::Chat);
        assert_eq!(
            c.models.defaults.get(&ModelKind::Stt).map(String::as_str),
            Some("whisper")
        );
        let back = serde_yaml::to_string(&c).unwrap();
        let reparsed: Config = serde_yaml::from_str(&back).unwrap();
        assert_eq!(reparsed.models.aliases.len(), 2);
    }

    #[test]
    fn actuator_config_round_trip_yaml() {
        let yaml = "actuator:\n  safe_margin_top: 60\n  human_like_motion: false\n";
        let c: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(c.actuator.safe_margin_top, 60);
        assert!(!c.actuator.human_like_motion);
        assert_eq!(c.actuator.safe_margin_left, default_safe_margin());
    }
}
