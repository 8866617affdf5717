use std::env;
use std::str::FromStr;

use super::{
    AgentSettings, DEFAULT_GENERATION_TIMEOUT_SECONDS, DEFAULT_KEEPALIVE_INTERVAL_SECONDS,
    DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL, ServerConfig, VoiceSettings,
};

/// Read an optional string variable. Blank values count as unset.
pub(super) fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read and parse an optional variable
pub(super) fn env_parse<T>(key: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid value for {key}: '{raw}' ({e})")),
        None => Ok(None),
    }
}

/// Build a configuration from environment variables, falling back to defaults.
pub(super) fn load_from_env() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut voice = VoiceSettings::default();
    if let Some(voice_id) = env_string("ELEVENLABS_VOICE_ID") {
        voice.voice_id = voice_id;
    }

    Ok(ServerConfig {
        host: env_string("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
        port: env_parse("PORT")?.unwrap_or(8080),
        keepalive_interval_seconds: env_parse("KEEPALIVE_INTERVAL_SECONDS")?
            .unwrap_or(DEFAULT_KEEPALIVE_INTERVAL_SECONDS),
        openai_api_key: env_string("OPENAI_API_KEY"),
        openai_base_url: env_string("OPENAI_BASE_URL")
            .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
        openai_model: env_string("OPENAI_MODEL")
            .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
        generation_timeout_seconds: env_parse("GENERATION_TIMEOUT_SECONDS")?
            .unwrap_or(DEFAULT_GENERATION_TIMEOUT_SECONDS),
        elevenlabs_api_key: env_string("ELEVENLABS_API_KEY"),
        voice,
        agent: AgentSettings::default(),
        cors_allowed_origins: env_string("CORS_ALLOWED_ORIGINS"),
    })
}
