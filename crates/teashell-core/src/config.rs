//! Configuration types for teashell.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{ColorProfile, Error, WindowSize};

/// Server configuration loaded from YAML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default, JsonSchema)]
#[serde(default)]
pub struct ServerConfig {
    /// Server settings
    pub server: ServerSettings,
    /// Program supervisor settings
    pub supervisor: SupervisorSettings,
    /// Terminal settings
    pub terminal: TerminalSettings,
}

impl ServerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string.
    pub fn from_yaml(yaml: &str) -> crate::Result<Self> {
        let config: ServerConfig =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> crate::Result<()> {
        if self.supervisor.message_buffer == 0 {
            return Err(Error::Config(
                "supervisor.message_buffer must be > 0".to_string(),
            ));
        }

        if self.terminal.default_width == 0 || self.terminal.default_height == 0 {
            return Err(Error::Config("terminal dimensions must be > 0".to_string()));
        }

        if self.terminal.term.trim().is_empty() {
            return Err(Error::Config("terminal.term cannot be empty".to_string()));
        }

        Ok(())
    }

    /// JSON schema describing the configuration file.
    pub fn json_schema() -> crate::Result<serde_json::Value> {
        let schema = schemars::schema_for!(ServerConfig);
        Ok(serde_json::to_value(schema)?)
    }
}

/// Server settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ServerSettings {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Maximum number of concurrently supervised sessions (0 = unlimited)
    pub max_sessions: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            max_sessions: 0,
        }
    }
}

/// Program supervisor settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SupervisorSettings {
    /// Highest color profile the application renders with
    pub color_profile: ColorProfile,
    /// Capacity of each program's inbound message channel
    pub message_buffer: usize,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            color_profile: ColorProfile::TrueColor,
            message_buffer: 32,
        }
    }
}

/// Terminal settings, used when the local terminal cannot report its own.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TerminalSettings {
    /// Fallback terminal width
    pub default_width: u16,
    /// Fallback terminal height
    pub default_height: u16,
    /// Fallback TERM value
    pub term: String,
}

impl TerminalSettings {
    /// Fallback window size.
    pub fn default_size(&self) -> WindowSize {
        WindowSize::new(self.default_width, self.default_height)
    }
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            default_width: 80,
            default_height: 24,
            term: "xterm-256color".to_string(),
        }
    }
}
