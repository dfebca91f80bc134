use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RenderGraphError, Result};

/// Persisted renderer-wide tuning knobs (spec.md 6). Not touched by the
/// frame loop itself; read once at startup and whenever a caller explicitly
/// reloads it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfiguration {
    pub frames_in_flight: u32,
    pub compute_environment_maps: bool,
    pub environment_map_resolution: u32,
    pub irradiance_samples: u32,
    pub max_point_lights: u32,
    pub max_spot_lights: u32,
}

impl Default for RendererConfiguration {
    fn default() -> Self {
        Self {
            frames_in_flight: 3,
            compute_environment_maps: true,
            environment_map_resolution: 512,
            irradiance_samples: 512,
            max_point_lights: 1024,
            max_spot_lights: 1024,
        }
    }
}

impl RendererConfiguration {
    /// `frames_in_flight` is clamped into the supported `2..=3` range rather
    /// than rejected outright — the field is stored in a plain config file
    /// editors can hand-edit, and the editor's settings panel is outside
    /// this crate's scope, so the core has to be defensive here.
    pub fn sanitized(mut self) -> Self {
        self.frames_in_flight = self.frames_in_flight.clamp(2, 3);
        self
    }

    /// Loads from `path`, falling back to defaults (and logging) on any I/O
    /// or parse failure per the "non-fatal, continue with defaults" policy
    /// of spec.md 7.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path.as_ref()) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!(
                    "failed to load renderer configuration from {}: {err}; using defaults",
                    path.as_ref().display()
                );
                Self::default()
            }
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .map_err(|e| RenderGraphError::Config(e.to_string()))?;

        let cfg: RendererConfiguration = source
            .try_deserialize()
            .map_err(|e| RenderGraphError::Config(e.to_string()))?;

        Ok(cfg.sanitized())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text =
            toml_like::to_string(self).map_err(|e| RenderGraphError::Config(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

/// Minimal TOML writer so `save` doesn't need a second serializer
/// dependency beyond what `config` already pulls in transitively; the
/// field set is small and flat, which is all this needs to cover.
mod toml_like {
    use super::RendererConfiguration;

    pub fn to_string(cfg: &RendererConfiguration) -> Result<String, std::fmt::Error> {
        use std::fmt::Write;
        let mut out = String::new();
        writeln!(out, "frames_in_flight = {}", cfg.frames_in_flight)?;
        writeln!(
            out,
            "compute_environment_maps = {}",
            cfg.compute_environment_maps
        )?;
        writeln!(
            out,
            "environment_map_resolution = {}",
            cfg.environment_map_resolution
        )?;
        writeln!(out, "irradiance_samples = {}", cfg.irradiance_samples)?;
        writeln!(out, "max_point_lights = {}", cfg.max_point_lights)?;
        writeln!(out, "max_spot_lights = {}", cfg.max_spot_lights)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_in_supported_range() {
        let cfg = RendererConfiguration::default();
        assert!((2..=3).contains(&cfg.frames_in_flight));
    }

    #[test]
    fn sanitize_clamps_frames_in_flight() {
        let cfg = RendererConfiguration {
            frames_in_flight: 8,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(cfg.frames_in_flight, 3);

        let cfg = RendererConfiguration {
            frames_in_flight: 0,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(cfg.frames_in_flight, 2);
    }

    #[test]
    fn round_trips_through_save_and_load() {
        let path = std::env::temp_dir().join(format!(
            "render_graph_renderer_config_test_{}.toml",
            std::process::id()
        ));

        let cfg = RendererConfiguration {
            frames_in_flight: 2,
            compute_environment_maps: false,
            environment_map_resolution: 256,
            irradiance_samples: 64,
            max_point_lights: 16,
            max_spot_lights: 8,
        };
        cfg.save(&path).unwrap();
        let loaded = RendererConfiguration::load(&path).unwrap();
        assert_eq!(loaded, cfg);

        let _ = std::fs::remove_file(&path);
    }
}
