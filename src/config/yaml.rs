use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// This structure represents the full configuration that can be loaded from a YAML file.
/// All fields are optional to allow partial configuration. Values present here
/// override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 8080
///   keepalive_interval_seconds: 25
///
/// providers:
///   openai_api_key: "sk-..."
///   openai_base_url: "https://api.openai.com/v1"
///   openai_model: "gpt-4o-mini"
///   generation_timeout_seconds: 10
///   elevenlabs_api_key: "your-elevenlabs-key"
///
/// voice:
///   provider: "elevenlabs"
///   voice_id: "FGY2WhTYpPnrIDTdsKH5"
///   stability: 0.35
///   similarity: 0.75
///   style: 0.4
///   speed: 0.95
///   audio_format: "ulaw_8000"
///
/// agent:
///   greeting: "Olá! Como posso ajudar?"
///   system_prompt: "Você é uma assistente telefônica..."
///   history_window: 6
///   min_transcript_chars: 2
///   media_sample_rate: 0.02
///
/// security:
///   cors_allowed_origins: "*"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub providers: Option<ProvidersYaml>,
    pub voice: Option<VoiceYaml>,
    pub agent: Option<AgentYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Interval between transport pings on each call connection
    pub keepalive_interval_seconds: Option<u64>,
}

/// Upstream provider settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersYaml {
    /// OpenAI (or compatible) API key for reply generation
    pub openai_api_key: Option<String>,
    /// Base URL of the chat-completions API
    pub openai_base_url: Option<String>,
    /// Chat model used for replies
    pub openai_model: Option<String>,
    /// Request timeout for reply generation
    pub generation_timeout_seconds: Option<u64>,
    /// ElevenLabs credential; its presence switches on the voice block of speak events
    pub elevenlabs_api_key: Option<String>,
}

/// Voice tuning sent with speak events when the voice credential is configured
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct VoiceYaml {
    pub provider: Option<String>,
    pub voice_id: Option<String>,
    pub stability: Option<f32>,
    pub similarity: Option<f32>,
    pub style: Option<f32>,
    pub speed: Option<f32>,
    pub audio_format: Option<String>,
}

/// Conversational agent settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AgentYaml {
    pub greeting: Option<String>,
    pub system_prompt: Option<String>,
    pub fallback_reply: Option<String>,
    pub degraded_reply: Option<String>,
    pub history_window: Option<usize>,
    pub min_transcript_chars: Option<usize>,
    pub media_sample_rate: Option<f64>,
}

/// Security configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    /// CORS allowed origins (comma-separated list or "*" for all)
    pub cors_allowed_origins: Option<String>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Arguments
    /// * `path` - Path to the YAML configuration file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Required fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
