//! Runtime settings, resolved from defaults and the environment

use serde::{Deserialize, Serialize};

use crate::llm::ModelOptions;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Base URL of the Ollama server.
    pub base_url: String,
    /// Base URL of the approval service.
    pub approval_base_url: String,
    /// Model name passed to the backend.
    pub model: String,
    /// Persona preset name, see [`crate::prompts::preset`].
    pub system_preset: String,
    pub options: ModelOptions,
    /// Minimum interval between partial segment flushes.
    pub flush_interval_ms: u64,
    /// Interval for polling the server-side pending action count.
    pub poll_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            approval_base_url: "http://localhost:5000".to_string(),
            model: "llama3.2".to_string(),
            system_preset: "default".to_string(),
            options: ModelOptions::default(),
            flush_interval_ms: 100,
            poll_interval_secs: 5,
        }
    }
}

impl Settings {
    /// Layer environment variables over the defaults.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(value) = std::env::var("OLLAMA_BASE_URL") {
            settings.base_url = value;
        }
        if let Ok(value) = std::env::var("APPROVAL_BASE_URL") {
            settings.approval_base_url = value;
        }
        if let Ok(value) = std::env::var("OLLAMA_MODEL") {
            settings.model = value;
        }
        if let Ok(value) = std::env::var("SYSTEM_PRESET") {
            settings.system_preset = value;
        }
        settings
    }
}
