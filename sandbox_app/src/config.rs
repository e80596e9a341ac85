//! Sandbox settings, read from `sandbox.toml` when it exists

use std::path::Path;

use render_device::{Config, ConfigError, DeviceConfig};
use serde::{Deserialize, Serialize};

/// Default settings file next to the working directory
pub const CONFIG_PATH: &str = "sandbox.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "PBR Sandbox".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub window: WindowConfig,
    /// Directory holding the compiled `.spv` files
    pub shader_dir: String,
    /// Albedo texture for the cube; a checkerboard is used when unset
    pub texture_path: Option<String>,
    /// Tonemapping exposure
    pub exposure: f32,
    pub device: DeviceConfig,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            shader_dir: "target/shaders".to_string(),
            texture_path: None,
            exposure: 1.0,
            device: DeviceConfig::new("PBR Sandbox"),
        }
    }
}

impl Config for SandboxConfig {}

impl SandboxConfig {
    /// Load `path`, falling back to defaults when it does not exist
    pub fn load_or_default(path: &str) -> Result<Self, ConfigError> {
        if Path::new(path).exists() {
            log::info!("Loading settings from {}", path);
            Self::load_from_file(path)
        } else {
            log::info!("No {} found, using default settings", path);
            Ok(Self::default())
        }
    }
}
