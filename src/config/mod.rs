//! Configuration module for the call relay gateway
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//!
//! # Example
//! ```rust,no_run
//! use callrelay_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

mod env;
mod merge;
mod yaml;

pub use yaml::YamlConfig;

/// Default chat-completions endpoint base
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default chat model for reply generation
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Default interval between keep-alive pings (seconds)
pub const DEFAULT_KEEPALIVE_INTERVAL_SECONDS: u64 = 25;

/// Default timeout for one reply generation request (seconds)
pub const DEFAULT_GENERATION_TIMEOUT_SECONDS: u64 = 10;

/// Upper bound on the conversation window sent with a generation request
pub const MAX_HISTORY_WINDOW: usize = 6;

/// Voice tuning attached to speak events when the voice credential is configured.
///
/// The values only travel to the peer; synthesis itself happens on the peer side.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSettings {
    /// Synthesis provider name announced to the peer
    pub provider: String,
    /// Provider voice identifier
    pub voice_id: String,
    pub stability: f32,
    pub similarity: f32,
    pub style: f32,
    pub speed: f32,
    /// Audio sample-format tag (e.g. "ulaw_8000" for 8kHz mu-law telephony)
    pub audio_format: String,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            provider: "elevenlabs".to_string(),
            voice_id: "FGY2WhTYpPnrIDTdsKH5".to_string(),
            stability: 0.35,
            similarity: 0.75,
            style: 0.4,
            speed: 0.95,
            audio_format: "ulaw_8000".to_string(),
        }
    }
}

/// Conversational behaviour of the phone agent
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    /// Welcome message spoken once at call start
    pub greeting: String,
    /// System instructions sent with every generation request
    pub system_prompt: String,
    /// Reply spoken when generation fails or returns nothing
    pub fallback_reply: String,
    /// Reply used when no generation credential is configured
    pub degraded_reply: String,
    /// Number of trailing turns sent upstream (1 to [`MAX_HISTORY_WINDOW`])
    pub history_window: usize,
    /// Transcripts at or below this many characters are treated as noise
    pub min_transcript_chars: usize,
    /// Probability of logging a diagnostic record for a media packet
    pub media_sample_rate: f64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            greeting: "Olá! Aqui é a Laura da Voxemy. Como posso ajudar você hoje?".to_string(),
            system_prompt: "Você é Laura, assistente virtual da Voxemy em uma ligação telefônica \
                            ao vivo. Responda em português brasileiro coloquial, de forma natural, \
                            amigável e concisa (no máximo duas frases). Se não entender o cliente, \
                            peça educadamente para repetir."
                .to_string(),
            fallback_reply: "Desculpe, não entendi bem. Pode repetir?".to_string(),
            degraded_reply: "Desculpe, estou com problemas técnicos no momento.".to_string(),
            history_window: 6,
            min_transcript_chars: 2,
            media_sample_rate: 0.02,
        }
    }
}

/// Server configuration
///
/// Contains all configuration needed to run the relay gateway:
/// - Server settings (host, port, keep-alive interval)
/// - Reply generation settings (OpenAI-compatible endpoint, model, timeout)
/// - Voice credential and tuning for speak events
/// - Agent behaviour (greeting, prompt, fallback texts, thresholds)
/// - Security settings (CORS)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,
    pub keepalive_interval_seconds: u64,

    // Reply generation
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub generation_timeout_seconds: u64,

    // Voice
    /// ElevenLabs credential. Only its presence matters to the relay.
    pub elevenlabs_api_key: Option<String>,
    pub voice: VoiceSettings,

    pub agent: AgentSettings,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (same-origin only)
    pub cors_allowed_origins: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            keepalive_interval_seconds: DEFAULT_KEEPALIVE_INTERVAL_SECONDS,
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            generation_timeout_seconds: DEFAULT_GENERATION_TIMEOUT_SECONDS,
            elevenlabs_api_key: None,
            voice: VoiceSettings::default(),
            agent: AgentSettings::default(),
            cors_allowed_origins: None,
        }
    }
}

/// Zeroize secret fields when the configuration is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
        if let Some(ref mut key) = self.elevenlabs_api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables (and defaults)
    ///
    /// The .env file is loaded by `main` before this is called, so its values are
    /// visible here as ordinary environment variables.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// After loading and merging, performs validation on the final configuration.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        config.validate()?;
        Ok(config)
    }

    /// Get the server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether a reply-generation credential is configured
    pub fn has_openai_key(&self) -> bool {
        self.openai_api_key.is_some()
    }

    /// Whether the premium voice credential is configured.
    ///
    /// This single switch controls the whole voice block of speak events.
    pub fn has_voice_credential(&self) -> bool {
        self.elevenlabs_api_key.is_some()
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_seconds)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_seconds)
    }

    /// Validate the merged configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("PORT must be greater than 0".to_string());
        }
        if self.keepalive_interval_seconds == 0 {
            return Err("KEEPALIVE_INTERVAL_SECONDS must be greater than 0".to_string());
        }
        if self.generation_timeout_seconds == 0 {
            return Err("GENERATION_TIMEOUT_SECONDS must be greater than 0".to_string());
        }
        if self.openai_base_url.trim().is_empty() {
            return Err("OPENAI_BASE_URL must not be empty".to_string());
        }
        if !(1..=MAX_HISTORY_WINDOW).contains(&self.agent.history_window) {
            return Err(format!(
                "agent.history_window must be between 1 and {MAX_HISTORY_WINDOW}, got {}",
                self.agent.history_window
            ));
        }
        if !(0.0..=1.0).contains(&self.agent.media_sample_rate) {
            return Err(format!(
                "agent.media_sample_rate must be between 0.0 and 1.0, got {}",
                self.agent.media_sample_rate
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    const ENV_KEYS: &[&str] = &[
        "HOST",
        "PORT",
        "KEEPALIVE_INTERVAL_SECONDS",
        "OPENAI_API_KEY",
        "OPENAI_BASE_URL",
        "OPENAI_MODEL",
        "GENERATION_TIMEOUT_SECONDS",
        "ELEVENLABS_API_KEY",
        "ELEVENLABS_VOICE_ID",
        "CORS_ALLOWED_ORIGINS",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            // SAFETY: tests touching the environment are serialized with #[serial]
            unsafe { std::env::remove_var(key) };
        }
    }

    fn set_env(key: &str, value: &str) {
        // SAFETY: tests touching the environment are serialized with #[serial]
        unsafe { std::env::set_var(key, value) };
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();

        assert_eq!(config.address(), "0.0.0.0:8080");
        assert_eq!(config.keepalive_interval(), Duration::from_secs(25));
        assert_eq!(config.generation_timeout(), Duration::from_secs(10));
        assert_eq!(config.openai_model, "gpt-4o-mini");
        assert_eq!(config.agent.history_window, 6);
        assert_eq!(config.agent.min_transcript_chars, 2);
        assert!(!config.has_openai_key());
        assert!(!config.has_voice_credential());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_voice_defaults() {
        let voice = VoiceSettings::default();

        assert_eq!(voice.provider, "elevenlabs");
        assert_eq!(voice.voice_id, "FGY2WhTYpPnrIDTdsKH5");
        assert_eq!(voice.stability, 0.35);
        assert_eq!(voice.similarity, 0.75);
        assert_eq!(voice.style, 0.4);
        assert_eq!(voice.speed, 0.95);
        assert_eq!(voice.audio_format, "ulaw_8000");
    }

    #[test]
    fn test_validation_rejects_zero_keepalive() {
        let mut config = ServerConfig::default();
        config.keepalive_interval_seconds = 0;

        let err = config.validate().unwrap_err();
        assert!(err.contains("KEEPALIVE_INTERVAL_SECONDS"));
    }

    #[test]
    fn test_validation_rejects_bad_sample_rate() {
        let mut config = ServerConfig::default();
        config.agent.media_sample_rate = 1.5;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_empty_window() {
        let mut config = ServerConfig::default();
        config.agent.history_window = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_caps_window() {
        let mut config = ServerConfig::default();
        config.agent.history_window = MAX_HISTORY_WINDOW;
        assert!(config.validate().is_ok());

        config.agent.history_window = 10;
        let err = config.validate().unwrap_err();
        assert!(err.contains("history_window"), "{err}");
    }

    #[test]
    #[serial]
    fn test_from_env_reads_variables() {
        clear_env();
        set_env("PORT", "9100");
        set_env("OPENAI_API_KEY", "sk-env");
        set_env("ELEVENLABS_API_KEY", "el-env");
        set_env("KEEPALIVE_INTERVAL_SECONDS", "30");

        let config = ServerConfig::from_env().unwrap();

        assert_eq!(config.port, 9100);
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-env"));
        assert!(config.has_voice_credential());
        assert_eq!(config.keepalive_interval_seconds, 30);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_invalid_port() {
        clear_env();
        set_env("PORT", "not-a-port");

        let result = ServerConfig::from_env();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("PORT"));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_ignores_empty_keys() {
        clear_env();
        set_env("ELEVENLABS_API_KEY", "   ");

        let config = ServerConfig::from_env().unwrap();
        assert!(!config.has_voice_credential());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_overrides_env() {
        clear_env();
        set_env("PORT", "9100");
        set_env("OPENAI_MODEL", "env-model");

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(
            &config_path,
            r#"
server:
  port: 9200
voice:
  speed: 1.1
agent:
  greeting: "Bem-vindo!"
"#,
        )
        .unwrap();

        let config = ServerConfig::from_file(&config_path).unwrap();

        assert_eq!(config.port, 9200);
        assert_eq!(config.openai_model, "env-model");
        assert_eq!(config.voice.speed, 1.1);
        assert_eq!(config.voice.voice_id, "FGY2WhTYpPnrIDTdsKH5");
        assert_eq!(config.agent.greeting, "Bem-vindo!");
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_file_runs_validation() {
        clear_env();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(
            &config_path,
            r#"
agent:
  media_sample_rate: 3.0
"#,
        )
        .unwrap();

        assert!(ServerConfig::from_file(&config_path).is_err());
    }
}
