use super::ServerConfig;
use super::env::load_from_env;
use super::yaml::YamlConfig;

/// Merge environment configuration (base) with optional YAML overrides.
///
/// Every value present in the YAML file replaces the environment value;
/// absent YAML values leave the environment/default value untouched.
pub(super) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = load_from_env()?;

    let Some(yaml) = yaml else {
        return Ok(config);
    };

    if let Some(server) = yaml.server {
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
        if let Some(interval) = server.keepalive_interval_seconds {
            config.keepalive_interval_seconds = interval;
        }
    }

    if let Some(providers) = yaml.providers {
        if let Some(key) = non_blank(providers.openai_api_key) {
            config.openai_api_key = Some(key);
        }
        if let Some(url) = providers.openai_base_url {
            config.openai_base_url = url;
        }
        if let Some(model) = providers.openai_model {
            config.openai_model = model;
        }
        if let Some(timeout) = providers.generation_timeout_seconds {
            config.generation_timeout_seconds = timeout;
        }
        if let Some(key) = non_blank(providers.elevenlabs_api_key) {
            config.elevenlabs_api_key = Some(key);
        }
    }

    if let Some(voice) = yaml.voice {
        let target = &mut config.voice;
        if let Some(provider) = voice.provider {
            target.provider = provider;
        }
        if let Some(voice_id) = voice.voice_id {
            target.voice_id = voice_id;
        }
        if let Some(stability) = voice.stability {
            target.stability = stability;
        }
        if let Some(similarity) = voice.similarity {
            target.similarity = similarity;
        }
        if let Some(style) = voice.style {
            target.style = style;
        }
        if let Some(speed) = voice.speed {
            target.speed = speed;
        }
        if let Some(format) = voice.audio_format {
            target.audio_format = format;
        }
    }

    if let Some(agent) = yaml.agent {
        let target = &mut config.agent;
        if let Some(greeting) = agent.greeting {
            target.greeting = greeting;
        }
        if let Some(prompt) = agent.system_prompt {
            target.system_prompt = prompt;
        }
        if let Some(fallback) = agent.fallback_reply {
            target.fallback_reply = fallback;
        }
        if let Some(degraded) = agent.degraded_reply {
            target.degraded_reply = degraded;
        }
        if let Some(window) = agent.history_window {
            target.history_window = window;
        }
        if let Some(min_chars) = agent.min_transcript_chars {
            target.min_transcript_chars = min_chars;
        }
        if let Some(rate) = agent.media_sample_rate {
            target.media_sample_rate = rate;
        }
    }

    if let Some(security) = yaml.security
        && let Some(origins) = security.cors_allowed_origins
    {
        config.cors_allowed_origins = Some(origins);
    }

    Ok(config)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
