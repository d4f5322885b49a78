//! Configuration management for peercall
//!
//! Provides configuration loading, saving, and validation for signaling,
//! ICE servers, and recording output options.

use crate::errors::CallError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallConfig {
    pub signaling: SignalingConfig,
    pub ice: IceConfig,
    pub recording: RecordingSettings,
}

/// Signaling transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalingConfig {
    /// Name of the shared signaling bus all participants attach to
    pub bus_name: String,
    /// Capacity of the in-process bus before slow subscribers start lagging
    pub bus_capacity: usize,
}

/// ICE server configuration handed to the session engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceConfig {
    pub servers: Vec<IceServer>,
}

/// A single STUN/TURN server entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

/// Recording output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSettings {
    /// MIME type of the finalized artifact
    pub mime_type: String,
    /// File extension used in the artifact name
    pub file_extension: String,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            signaling: SignalingConfig {
                bus_name: "peercall-signal".to_string(),
                bus_capacity: 64,
            },
            ice: IceConfig {
                servers: vec![IceServer {
                    urls: vec!["stun:stun.l.google.com:19302".to_string()],
                    username: None,
                    credential: None,
                }],
            },
            recording: RecordingSettings {
                mime_type: "video/webm".to_string(),
                file_extension: "webm".to_string(),
            },
        }
    }
}

impl CallConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CallError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            CallError::Engine(format!("Failed to read config file: {}", e))
        })?;

        let config: CallConfig = toml::from_str(&contents).map_err(|e| {
            CallError::Engine(format!("Failed to parse config file: {}", e))
        })?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CallError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CallError::Engine(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(|e| {
            CallError::Engine(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, toml_string).map_err(|e| {
            CallError::Engine(format!("Failed to write config file: {}", e))
        })?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("peercall.toml")
    }

    /// Load from default location or create with defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.signaling.bus_name.is_empty() {
            return Err("Signaling bus name must not be empty".to_string());
        }
        if self.signaling.bus_capacity == 0 {
            return Err("Signaling bus capacity must be at least 1".to_string());
        }

        if self.ice.servers.is_empty() {
            return Err("At least one ICE server is required".to_string());
        }
        for server in &self.ice.servers {
            if server.urls.is_empty() {
                return Err("ICE server entry has no URLs".to_string());
            }
            for url in &server.urls {
                if !url.starts_with("stun:") && !url.starts_with("turn:") && !url.starts_with("turns:") {
                    return Err(format!("Unsupported ICE server URL scheme: {}", url));
                }
            }
        }

        if self.recording.file_extension.is_empty() || self.recording.file_extension.contains('.') {
            return Err("Recording file extension must be a bare extension".to_string());
        }
        if !self.recording.mime_type.contains('/') {
            return Err("Recording MIME type must be a full type/subtype".to_string());
        }

        Ok(())
    }
}
