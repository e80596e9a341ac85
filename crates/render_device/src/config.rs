//! Device configuration
//!
//! Configuration is plain serde data that can be loaded from TOML or RON.
//! Values are fixed for the lifetime of a [`crate::Device`]; swap-chain
//! preferences are re-read only at `create_swap_chain`/`reinit` boundaries.

use serde::{Deserialize, Serialize};

use crate::types::{Format, SampleCount};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::parse(path, &contents)
    }

    /// Parse configuration text, picking the format from the path extension
    fn parse(path: &str, contents: &str) -> Result<Self, ConfigError> {
        if path.ends_with(".toml") {
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Presentation pacing preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresentMode {
    /// Wait for vertical blank (always available)
    Fifo,
    /// Triple-buffered low latency, falls back to `Fifo`
    Mailbox,
    /// No vsync, falls back to `Fifo`
    Immediate,
}

/// Swap-chain preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapChainConfig {
    /// Preferred presentation mode
    pub present_mode: PresentMode,
    /// Prefer an sRGB surface format when the surface offers one
    pub prefer_srgb: bool,
    /// Depth scratch attachment format, `None` for color-only swap chains
    pub depth_format: Option<Format>,
    /// Sample count of the color/depth scratch attachments
    pub samples: SampleCount,
}

impl Default for SwapChainConfig {
    fn default() -> Self {
        Self {
            present_mode: PresentMode::Mailbox,
            prefer_srgb: true,
            depth_format: Some(Format::D32Float),
            samples: SampleCount::X1,
        }
    }
}

/// Descriptor pool sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorPoolConfig {
    /// Maximum number of live bind sets
    pub max_sets: u32,
    /// Uniform-buffer descriptors across all sets
    pub uniform_buffers: u32,
    /// Sampled-texture descriptors across all sets
    pub sampled_textures: u32,
    /// Storage-image descriptors across all sets
    pub storage_images: u32,
    /// Acceleration-structure descriptors (only with ray tracing enabled)
    pub acceleration_structures: u32,
}

impl Default for DescriptorPoolConfig {
    fn default() -> Self {
        Self {
            max_sets: 1024,
            uniform_buffers: 4096,
            sampled_textures: 8192,
            storage_images: 1024,
            acceleration_structures: 64,
        }
    }
}

/// Top-level device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Whether to enable Vulkan validation layers, `None` follows the build type
    pub enable_validation: Option<bool>,
    /// Request the acceleration-structure extensions at device creation
    pub enable_ray_tracing: bool,
    /// Descriptor pool sizing
    pub descriptor_pool: DescriptorPoolConfig,
    /// Swap-chain preferences
    pub swap_chain: SwapChainConfig,
    /// Upper bound for blocking fence waits, in nanoseconds
    pub fence_timeout_ns: u64,
}

impl DeviceConfig {
    /// Create a new configuration with defaults
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            application_version: (1, 0, 0),
            enable_validation: None,
            enable_ray_tracing: false,
            descriptor_pool: DescriptorPoolConfig::default(),
            swap_chain: SwapChainConfig::default(),
            fence_timeout_ns: u64::MAX,
        }
    }

    /// Enable or disable validation layers
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Set swap-chain preferences
    pub fn with_swap_chain(mut self, swap_chain: SwapChainConfig) -> Self {
        self.swap_chain = swap_chain;
        self
    }

    /// Request ray-tracing capable devices
    pub fn with_ray_tracing(mut self, enabled: bool) -> Self {
        self.enable_ray_tracing = enabled;
        self
    }

    /// Effective validation setting
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.application_name.is_empty() {
            return Err("Application name cannot be empty".to_string());
        }

        if self.descriptor_pool.max_sets == 0 {
            return Err("Descriptor pool must allow at least one set".to_string());
        }

        if let Some(depth) = self.swap_chain.depth_format {
            if !depth.is_depth() {
                return Err(format!("Swap-chain depth format {depth:?} is not a depth format"));
            }
        }

        if self.fence_timeout_ns == 0 {
            return Err("Fence timeout must be non-zero".to_string());
        }

        Ok(())
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::new("PBR Sandbox")
    }
}

impl Config for DeviceConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml_overrides_defaults() {
        let text = r#"
            application_name = "gbuffer-test"
            enable_validation = false

            [swap_chain]
            present_mode = "Fifo"
            samples = "X4"
        "#;

        let config = DeviceConfig::parse("device.toml", text).unwrap();
        assert_eq!(config.application_name, "gbuffer-test");
        assert!(!config.validation_enabled());
        assert_eq!(config.swap_chain.present_mode, PresentMode::Fifo);
        assert_eq!(config.swap_chain.samples, SampleCount::X4);
        // untouched sections keep their defaults
        assert_eq!(config.descriptor_pool.max_sets, 1024);
        assert_eq!(config.swap_chain.depth_format, Some(Format::D32Float));
    }

    #[test]
    fn test_parse_ron() {
        let text = r#"(application_name: "ron-app", enable_ray_tracing: true)"#;
        let config = DeviceConfig::parse("device.ron", text).unwrap();
        assert_eq!(config.application_name, "ron-app");
        assert!(config.enable_ray_tracing);
    }

    #[test]
    fn test_unsupported_extension() {
        let result = DeviceConfig::parse("device.json", "{}");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_validate_rejects_color_depth_format() {
        let mut config = DeviceConfig::default();
        assert!(config.validate().is_ok());

        config.swap_chain.depth_format = Some(Format::Rgba8Unorm);
        assert!(config.validate().is_err());

        config.swap_chain.depth_format = None;
        config.descriptor_pool.max_sets = 0;
        assert!(config.validate().is_err());
    }
}
