//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory (or
//! the path given with `-f`). Secrets are never read from TOML: API keys and
//! WhatsApp credentials come from the environment (`.env` is loaded first).

use std::{
    env,
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::AppError;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// PTY (console) channel configuration.
#[derive(Debug, Clone)]
pub struct PtyConfig {
    /// Whether the console channel is enabled.
    pub enabled: bool,
}

/// WhatsApp Cloud API channel configuration.
#[derive(Debug, Clone)]
pub struct WhatsappConfig {
    /// Whether the webhook channel is enabled.
    pub enabled: bool,
    /// Socket address the webhook listener binds to.
    pub bind: String,
    /// Graph API root, e.g. `https://graph.facebook.com/v20.0`.
    pub api_base_url: String,
    /// Business phone number id that sends replies.
    pub phone_number_id: String,
    /// Per-request HTTP timeout in seconds for Graph API calls.
    pub timeout_seconds: u64,
}

/// Comms subsystem configuration.
#[derive(Debug, Clone)]
pub struct CommsConfig {
    pub pty: PtyConfig,
    pub whatsapp: WhatsappConfig,
}

/// OpenAI / OpenAI-compatible provider configuration.
/// Populated from `[llm.openai]` in the TOML.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Full chat completions endpoint URL.
    pub api_base_url: String,
    /// Model name passed in the request body.
    pub model: String,
    /// Sampling temperature (ignored for models that forbid it).
    pub temperature: f32,
    /// Upper bound on generated tokens per round.
    pub max_tokens: u32,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
}

/// LLM subsystem configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Which provider is active (`"dummy"`, `"openai"`).
    /// Maps to `default` in `[llm]` TOML.
    pub provider: String,
    pub openai: OpenAiConfig,
}

/// Conversation orchestrator configuration (`[agents.concierge]`).
#[derive(Debug, Clone)]
pub struct ConciergeConfig {
    /// Directory holding the prompt layers and the knowledge base.
    pub prompts_dir: PathBuf,
    /// Remembered user/assistant exchange pairs per guest.
    pub max_history_pairs: usize,
    /// Tool-call rounds allowed before the loop is cut short.
    pub max_tool_rounds: usize,
}

/// Web search tool configuration (`[tools.web_search]`).
#[derive(Debug, Clone)]
pub struct WebSearchConfig {
    pub enabled: bool,
    /// `"serper"` or `"dummy"`.
    pub provider: String,
    pub api_url: String,
    pub result_count: u32,
    /// Country code sent as `gl`.
    pub locale: String,
    /// Language code sent as `hl`.
    pub language: String,
    pub timeout_seconds: u64,
}

/// Tools subsystem configuration.
#[derive(Debug, Clone)]
pub struct ToolsConfig {
    pub web_search: WebSearchConfig,
}

/// Voice-note pipeline configuration (`[voice]`).
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// `"openai"` (transcription API + Google TTS + ffmpeg) or `"dummy"`.
    pub provider: String,
    pub transcription_url: String,
    pub transcription_model: String,
    pub tts_url: String,
    /// ffmpeg executable, looked up on `PATH` when not absolute.
    pub ffmpeg_path: String,
    pub timeout_seconds: u64,
}

/// Credentials sourced from the environment only.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    /// `LLM_API_KEY`, falling back to `OPENAI_API_KEY`.
    pub llm_api_key: Option<String>,
    /// `SERPER_API_KEY`.
    pub serper_api_key: Option<String>,
    /// `WHATSAPP_ACCESS_TOKEN`: Graph API bearer token.
    pub whatsapp_access_token: Option<String>,
    /// `WHATSAPP_VERIFY_TOKEN`: shared secret for the webhook handshake.
    pub whatsapp_verify_token: Option<String>,
}

impl Secrets {
    /// Read every secret from the process environment.
    ///
    /// Empty values and template placeholders (`your_..._here`) count as unset.
    pub fn from_env() -> Self {
        Self {
            llm_api_key: env_secret(&["LLM_API_KEY", "OPENAI_API_KEY"]),
            serper_api_key: env_secret(&["SERPER_API_KEY"]),
            whatsapp_access_token: env_secret(&["WHATSAPP_ACCESS_TOKEN"]),
            whatsapp_verify_token: env_secret(&["WHATSAPP_VERIFY_TOKEN"]),
        }
    }
}

fn env_secret(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| env::var(name).ok())
        .find(|value| !is_placeholder(value))
}

/// `true` for values that are empty or still the `.env.example` template text.
pub fn is_placeholder(value: &str) -> bool {
    let v = value.trim();
    v.is_empty() || (v.starts_with("your_") && v.ends_with("_here"))
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_name: String,
    pub log_level: String,
    pub comms: CommsConfig,
    pub llm: LlmConfig,
    pub concierge: ConciergeConfig,
    pub tools: ToolsConfig,
    pub voice: VoiceConfig,
    pub secrets: Secrets,
}

impl Config {
    /// Returns `true` if the console channel should be loaded.
    pub fn comms_pty_should_load(&self) -> bool {
        self.comms.pty.enabled
    }

    /// Returns `true` if the WhatsApp webhook channel should be loaded.
    pub fn comms_whatsapp_should_load(&self) -> bool {
        self.comms.whatsapp.enabled
    }

    /// Web search is offered to the model only when enabled and usable.
    /// A missing Serper key silently disables it.
    pub fn search_enabled(&self) -> bool {
        let ws = &self.tools.web_search;
        ws.enabled && (ws.provider == "dummy" || self.secrets.serper_api_key.is_some())
    }

    /// Reject configurations the bot cannot run with.
    ///
    /// Called once at startup; any error is fatal.
    pub fn validate(&self) -> Result<(), AppError> {
        let remote_llm = matches!(self.llm.provider.as_str(), "openai" | "openai-compatible");
        if remote_llm
            && self.llm.openai.api_base_url.contains("api.openai.com")
            && self.secrets.llm_api_key.is_none()
        {
            return Err(AppError::Config(
                "LLM_API_KEY (or OPENAI_API_KEY) is not set, add your key to .env".into(),
            ));
        }

        if self.voice.provider == "openai" && self.secrets.llm_api_key.is_none() {
            return Err(AppError::Config(
                "voice provider 'openai' needs LLM_API_KEY (or OPENAI_API_KEY) for transcription".into(),
            ));
        }

        if self.comms_whatsapp_should_load() {
            if self.secrets.whatsapp_access_token.is_none() {
                return Err(AppError::Config("WHATSAPP_ACCESS_TOKEN is not set".into()));
            }
            if self.secrets.whatsapp_verify_token.is_none() {
                return Err(AppError::Config("WHATSAPP_VERIFY_TOKEN is not set".into()));
            }
            if self.comms.whatsapp.phone_number_id.trim().is_empty() {
                return Err(AppError::Config(
                    "comms.whatsapp.phone_number_id must be set when the whatsapp channel is enabled".into(),
                ));
            }
        }

        if self.concierge.max_tool_rounds == 0 {
            return Err(AppError::Config("agents.concierge.max_tool_rounds must be at least 1".into()));
        }

        Ok(())
    }
}

/// Raw TOML shape: `serde` target before resolution.
#[derive(Deserialize)]
struct RawConfig {
    bot: RawBot,
    #[serde(default)]
    comms: RawComms,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    agents: RawAgents,
    #[serde(default)]
    tools: RawTools,
    #[serde(default)]
    voice: RawVoice,
}

#[derive(Deserialize)]
struct RawBot {
    #[serde(default = "default_bot_name")]
    bot_name: String,
    #[serde(default = "default_log_level")]
    log_level: String,
}

#[derive(Deserialize, Default)]
struct RawComms {
    #[serde(default)]
    pty: RawPty,
    #[serde(default)]
    whatsapp: RawWhatsapp,
}

#[derive(Deserialize, Default)]
struct RawPty {
    /// Defaults to `false`: the console is turned on with `-i`.
    #[serde(default)]
    enabled: bool,
}

#[derive(Deserialize)]
struct RawWhatsapp {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_whatsapp_bind")]
    bind: String,
    #[serde(default = "default_graph_api_base_url")]
    api_base_url: String,
    #[serde(default)]
    phone_number_id: String,
    #[serde(default = "default_whatsapp_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawWhatsapp {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_whatsapp_bind(),
            api_base_url: default_graph_api_base_url(),
            phone_number_id: String::new(),
            timeout_seconds: default_whatsapp_timeout_seconds(),
        }
    }
}

#[derive(Deserialize)]
struct RawLlm {
    /// Maps to `default = "..."` in `[llm]`.
    #[serde(rename = "default", default = "default_llm_provider")]
    provider: String,
    #[serde(default)]
    openai: RawOpenAiConfig,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self { provider: default_llm_provider(), openai: RawOpenAiConfig::default() }
    }
}

#[derive(Deserialize)]
struct RawOpenAiConfig {
    #[serde(default = "default_openai_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_openai_model")]
    model: String,
    #[serde(default = "default_openai_temperature")]
    temperature: f32,
    #[serde(default = "default_openai_max_tokens")]
    max_tokens: u32,
    #[serde(default = "default_openai_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawOpenAiConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_openai_api_base_url(),
            model: default_openai_model(),
            temperature: default_openai_temperature(),
            max_tokens: default_openai_max_tokens(),
            timeout_seconds: default_openai_timeout_seconds(),
        }
    }
}

#[derive(Deserialize, Default)]
struct RawAgents {
    #[serde(default)]
    concierge: RawConcierge,
}

#[derive(Deserialize)]
struct RawConcierge {
    #[serde(default = "default_prompts_dir")]
    prompts_dir: String,
    #[serde(default = "default_max_history_pairs")]
    max_history_pairs: usize,
    #[serde(default = "default_max_tool_rounds")]
    max_tool_rounds: usize,
}

impl Default for RawConcierge {
    fn default() -> Self {
        Self {
            prompts_dir: default_prompts_dir(),
            max_history_pairs: default_max_history_pairs(),
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

#[derive(Deserialize, Default)]
struct RawTools {
    #[serde(default)]
    web_search: RawWebSearch,
}

#[derive(Deserialize)]
struct RawWebSearch {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_search_provider")]
    provider: String,
    #[serde(default = "default_search_api_url")]
    api_url: String,
    #[serde(default = "default_search_result_count")]
    result_count: u32,
    #[serde(default = "default_search_locale")]
    locale: String,
    #[serde(default = "default_search_language")]
    language: String,
    #[serde(default = "default_search_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawWebSearch {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: default_search_provider(),
            api_url: default_search_api_url(),
            result_count: default_search_result_count(),
            locale: default_search_locale(),
            language: default_search_language(),
            timeout_seconds: default_search_timeout_seconds(),
        }
    }
}

#[derive(Deserialize)]
struct RawVoice {
    #[serde(default = "default_voice_provider")]
    provider: String,
    #[serde(default = "default_transcription_url")]
    transcription_url: String,
    #[serde(default = "default_transcription_model")]
    transcription_model: String,
    #[serde(default = "default_tts_url")]
    tts_url: String,
    #[serde(default = "default_ffmpeg_path")]
    ffmpeg_path: String,
    #[serde(default = "default_voice_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawVoice {
    fn default() -> Self {
        Self {
            provider: default_voice_provider(),
            transcription_url: default_transcription_url(),
            transcription_model: default_transcription_model(),
            tts_url: default_tts_url(),
            ffmpeg_path: default_ffmpeg_path(),
            timeout_seconds: default_voice_timeout_seconds(),
        }
    }
}

fn default_bot_name() -> String { "wedding-bot".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_whatsapp_bind() -> String { "0.0.0.0:8080".to_string() }
fn default_graph_api_base_url() -> String { "https://graph.facebook.com/v20.0".to_string() }
fn default_whatsapp_timeout_seconds() -> u64 { 30 }
fn default_llm_provider() -> String { "openai".to_string() }
fn default_openai_api_base_url() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_openai_model() -> String { "gpt-4o-mini".to_string() }
fn default_openai_temperature() -> f32 { 0.5 }
fn default_openai_max_tokens() -> u32 { 700 }
fn default_openai_timeout_seconds() -> u64 { 60 }
fn default_prompts_dir() -> String { "config/prompts".to_string() }
fn default_max_history_pairs() -> usize { 8 }
fn default_max_tool_rounds() -> usize { 4 }
fn default_search_provider() -> String { "serper".to_string() }
fn default_search_api_url() -> String { "https://google.serper.dev/search".to_string() }
fn default_search_result_count() -> u32 { 5 }
fn default_search_locale() -> String { "in".to_string() }
fn default_search_language() -> String { "en".to_string() }
fn default_search_timeout_seconds() -> u64 { 15 }
fn default_voice_provider() -> String { "openai".to_string() }
fn default_transcription_url() -> String { "https://api.openai.com/v1/audio/transcriptions".to_string() }
fn default_transcription_model() -> String { "whisper-1".to_string() }
fn default_tts_url() -> String { "https://translate.google.com/translate_tts".to_string() }
fn default_ffmpeg_path() -> String { "ffmpeg".to_string() }
fn default_voice_timeout_seconds() -> u64 { 60 }

fn default_true() -> bool {
    true
}

/// Load config from `path` (default `config/default.toml`), taking secrets
/// from the environment.
pub fn load(path: Option<&str>) -> Result<Config, AppError> {
    let path = Path::new(path.unwrap_or(DEFAULT_CONFIG_PATH));
    load_from(path, Secrets::from_env())
}

/// Internal loader: accepts an explicit path and secrets.
/// Tests pass secrets directly instead of mutating env vars.
pub fn load_from(path: &Path, secrets: Secrets) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    let s = parsed.bot;
    let wa = parsed.comms.whatsapp;
    let oai = parsed.llm.openai;
    let concierge = parsed.agents.concierge;
    let ws = parsed.tools.web_search;
    let voice = parsed.voice;

    Ok(Config {
        bot_name: s.bot_name,
        log_level: s.log_level,
        comms: CommsConfig {
            pty: PtyConfig { enabled: parsed.comms.pty.enabled },
            whatsapp: WhatsappConfig {
                enabled: wa.enabled,
                bind: wa.bind,
                api_base_url: wa.api_base_url.trim_end_matches('/').to_string(),
                phone_number_id: wa.phone_number_id,
                timeout_seconds: wa.timeout_seconds,
            },
        },
        llm: LlmConfig {
            provider: parsed.llm.provider,
            openai: OpenAiConfig {
                api_base_url: oai.api_base_url,
                model: oai.model,
                temperature: oai.temperature,
                max_tokens: oai.max_tokens,
                timeout_seconds: oai.timeout_seconds,
            },
        },
        concierge: ConciergeConfig {
            prompts_dir: PathBuf::from(concierge.prompts_dir),
            max_history_pairs: concierge.max_history_pairs,
            max_tool_rounds: concierge.max_tool_rounds,
        },
        tools: ToolsConfig {
            web_search: WebSearchConfig {
                enabled: ws.enabled,
                provider: ws.provider,
                api_url: ws.api_url,
                result_count: ws.result_count,
                locale: ws.locale,
                language: ws.language,
                timeout_seconds: ws.timeout_seconds,
            },
        },
        voice: VoiceConfig {
            provider: voice.provider,
            transcription_url: voice.transcription_url,
            transcription_model: voice.transcription_model,
            tts_url: voice.tts_url,
            ffmpeg_path: voice.ffmpeg_path,
            timeout_seconds: voice.timeout_seconds,
        },
        secrets,
    })
}

// ── test helpers ──────────────────────────────────────────────────────────────

#[cfg(test)]
impl Config {
    /// Safe `Config` for unit tests: dummy LLM, dummy voice, console only,
    /// no API keys, no external calls.
    pub fn test_default() -> Self {
        Self {
            bot_name: "test".into(),
            log_level: "info".into(),
            comms: CommsConfig {
                pty: PtyConfig { enabled: true },
                whatsapp: WhatsappConfig {
                    enabled: false,
                    bind: "127.0.0.1:0".into(),
                    api_base_url: "http://localhost:0".into(),
                    phone_number_id: String::new(),
                    timeout_seconds: 1,
                },
            },
            llm: LlmConfig {
                provider: "dummy".into(),
                openai: OpenAiConfig {
                    api_base_url: "http://localhost:0/v1/chat/completions".into(),
                    model: "test-model".into(),
                    temperature: 0.5,
                    max_tokens: 700,
                    timeout_seconds: 1,
                },
            },
            concierge: ConciergeConfig {
                prompts_dir: PathBuf::from("config/prompts"),
                max_history_pairs: 8,
                max_tool_rounds: 4,
            },
            tools: ToolsConfig {
                web_search: WebSearchConfig {
                    enabled: false,
                    provider: "dummy".into(),
                    api_url: "http://localhost:0/search".into(),
                    result_count: 5,
                    locale: "in".into(),
                    language: "en".into(),
                    timeout_seconds: 1,
                },
            },
            voice: VoiceConfig {
                provider: "dummy".into(),
                transcription_url: "http://localhost:0/v1/audio/transcriptions".into(),
                transcription_model: "whisper-1".into(),
                tts_url: "http://localhost:0/translate_tts".into(),
                ffmpeg_path: "ffmpeg".into(),
                timeout_seconds: 1,
            },
            secrets: Secrets::default(),
        }
    }
}
