use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_FILE: &str = "penumbra.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShadowTechnique {
    #[default]
    Volumes,
    Maps,
}

impl ShadowTechnique {
    pub fn toggled(self) -> Self {
        match self {
            ShadowTechnique::Volumes => ShadowTechnique::Maps,
            ShadowTechnique::Maps => ShadowTechnique::Volumes,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub window_width: u32,
    pub window_height: u32,
    pub num_cubes: usize,
    pub num_point_lights: usize,
    pub num_spot_lights: usize,
    pub shadow_map_size: u32,
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub msaa: u32,
    pub vsync: bool,
    pub tonemapping: bool,
    pub animate: bool,
    pub carmack_reverse: bool,
    pub technique: ShadowTechnique,
    pub spot_direct_light: bool,
    pub base_ambient: f32,
    pub seed: u64,
    pub texture_dir: PathBuf,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            window_width: 800,
            window_height: 600,
            num_cubes: 10,
            num_point_lights: 2,
            num_spot_lights: 1,
            shadow_map_size: 1024,
            fov: 45.0,
            near: 0.1,
            far: 1000.1,
            msaa: 1,
            vsync: true,
            tonemapping: true,
            animate: false,
            carmack_reverse: true,
            technique: ShadowTechnique::Volumes,
            spot_direct_light: false,
            base_ambient: 1e-3,
            seed: 0x5eed,
            texture_dir: PathBuf::from("data"),
        }
    }
}

impl DemoConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Loads `path` if it exists. A missing file is silent, a broken one is a warning.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => {
                info!("Loaded configuration from {}", path.display());
                config
            }
            Err(err) => {
                warn!("{err}; using defaults");
                Self::default()
            }
        }
    }

    /// Clamps counts and sizes into what the renderer can hold.
    pub fn sanitized(mut self, max_instances: usize) -> Self {
        if self.num_cubes > max_instances {
            warn!("num_cubes {} exceeds {max_instances}, clamping", self.num_cubes);
            self.num_cubes = max_instances;
        }
        if self.num_point_lights == 0 {
            warn!("at least one point light is required");
            self.num_point_lights = 1;
        }
        self.shadow_map_size = self.shadow_map_size.clamp(16, 8192);
        self.fov = self.fov.clamp(5.0, 179.0);
        self.msaa = if self.msaa >= 4 { 4 } else { 1 };
        self
    }

    pub fn render_mode(&self) -> RenderMode {
        RenderMode {
            vsync: self.vsync,
            wireframe: false,
            tonemapping: self.tonemapping,
            msaa_level: self.msaa,
        }
    }
}

/// Process-wide output toggles flipped by key bindings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderMode {
    pub vsync: bool,
    pub wireframe: bool,
    pub tonemapping: bool,
    pub msaa_level: u32,
}

impl Default for RenderMode {
    fn default() -> Self {
        Self {
            vsync: true,
            wireframe: false,
            tonemapping: true,
            msaa_level: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config = DemoConfig::from_json("{}").unwrap();
        assert_eq!(config, DemoConfig::default());
        assert_eq!(config.num_cubes, 10);
        assert_eq!(config.shadow_map_size, 1024);
        assert!(config.carmack_reverse);
        assert_eq!(config.technique, ShadowTechnique::Volumes);
    }

    #[test]
    fn partial_override() {
        let config = DemoConfig::from_json(r#"{ "num_cubes": 50, "technique": "maps", "vsync": false }"#).unwrap();
        assert_eq!(config.num_cubes, 50);
        assert_eq!(config.technique, ShadowTechnique::Maps);
        assert!(!config.vsync);
        assert_eq!(config.num_point_lights, 2);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(DemoConfig::from_json("{ num_cubes: }").is_err());
    }

    #[test]
    fn missing_file_falls_back() {
        let config = DemoConfig::load_or_default("definitely/not/here.json");
        assert_eq!(config, DemoConfig::default());
    }

    #[test]
    fn sanitize_clamps_counts() {
        let config = DemoConfig {
            num_cubes: 5000,
            num_point_lights: 0,
            msaa: 8,
            fov: 300.0,
            ..Default::default()
        }
        .sanitized(1024);

        assert_eq!(config.num_cubes, 1024);
        assert_eq!(config.num_point_lights, 1);
        assert_eq!(config.msaa, 4);
        assert_eq!(config.fov, 179.0);
    }

    #[test]
    fn render_mode_from_defaults() {
        let mode = DemoConfig::default().render_mode();
        assert_eq!(mode, RenderMode::default());
    }

    #[test]
    fn technique_toggles() {
        assert_eq!(ShadowTechnique::Volumes.toggled(), ShadowTechnique::Maps);
        assert_eq!(ShadowTechnique::Maps.toggled(), ShadowTechnique::Volumes);
    }
}
