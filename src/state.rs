use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::config::ServerConfig;
use crate::core::llm::{ChatCompletionsClient, ResponseGenerator};
use crate::core::protocol::InstructionBuilder;
use crate::core::session::{SessionRegistry, SessionServices, SessionSettings};

/// Application state shared by every route
pub struct AppState {
    pub config: ServerConfig,
    pub registry: Arc<SessionRegistry>,
    services: SessionServices,
    started_at: Instant,
}

impl AppState {
    /// Build state with the chat completions client as reply generator
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let generator: Arc<dyn ResponseGenerator> =
            Arc::new(ChatCompletionsClient::from_config(&config));
        Self::with_generator(config, generator)
    }

    /// Build state around a caller-supplied reply generator
    pub fn with_generator(config: ServerConfig, generator: Arc<dyn ResponseGenerator>) -> Arc<Self> {
        let instructions = InstructionBuilder::from_config(&config);
        info!(
            generation = generator.is_configured(),
            voice_config = instructions.has_voice_config(),
            model = %config.openai_model,
            "Relay state initialised"
        );

        let services = SessionServices {
            instructions: Arc::new(instructions),
            generator,
            settings: Arc::new(SessionSettings::from_config(&config)),
        };

        Arc::new(Self {
            config,
            registry: Arc::new(SessionRegistry::new()),
            services,
            started_at: Instant::now(),
        })
    }

    /// Collaborators for a new call session
    pub fn session_services(&self) -> SessionServices {
        self.services.clone()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
