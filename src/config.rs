// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::BackendType;
use crate::constants::APP_NAME;
use crate::errors::ConfigError;
use crate::gpu::wgpu;
use crate::pipelines::effect::ReadbackPolicy;
use crate::shaders::Effect;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// GPU adapter selection hint
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum PowerPreference {
    /// Prefer a discrete GPU
    #[default]
    HighPerformance,
    /// Prefer an integrated GPU
    LowPower,
}

impl From<PowerPreference> for wgpu::PowerPreference {
    fn from(preference: PowerPreference) -> Self {
        match preference {
            PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
            PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
        }
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Per-pixel effect (Grayscale, Identity)
    pub effect: Effect,
    /// When a frame's pixels are read back (Synchronous, Pipelined)
    pub readback_policy: ReadbackPolicy,
    /// Render backend (Auto, Gpu, Software)
    pub backend: BackendType,
    /// Adapter preference for the GPU backend
    pub power_preference: PowerPreference,
}

impl Config {
    /// Default location: `<config dir>/nv12-effect/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_NAME).join("config.json"))
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                debug!(path = %path.display(), "Loading configuration");
                Ok(serde_json::from_str(&contents)?)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No configuration file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Load from [`Config::default_path`], or the defaults when there is no
    /// config directory
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Write as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.effect, Effect::Grayscale);
        assert_eq!(config.readback_policy, ReadbackPolicy::Pipelined);
        assert_eq!(config.backend, BackendType::Auto);
        assert_eq!(config.power_preference, PowerPreference::HighPerformance);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "effect": "identity", "backend": "software" }"#).unwrap();
        assert_eq!(config.effect, Effect::Identity);
        assert_eq!(config.backend, BackendType::Software);
        assert_eq!(config.readback_policy, ReadbackPolicy::Pipelined);
    }

    #[test]
    fn test_power_preference_names() {
        let config: Config = serde_json::from_str(r#"{ "power_preference": "low_power" }"#).unwrap();
        assert_eq!(config.power_preference, PowerPreference::LowPower);
        assert_eq!(
            wgpu::PowerPreference::from(config.power_preference),
            wgpu::PowerPreference::LowPower
        );
    }
}
