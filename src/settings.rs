use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    /// Quads per batch before a handler flushes.
    #[serde(default = "RenderSettings::default_batch_size")]
    pub batch_size: usize,
    /// Texture units one draw may bind.
    #[serde(default = "RenderSettings::default_max_textures")]
    pub max_textures: usize,
    #[serde(default = "RenderSettings::default_max_lights")]
    pub max_lights: usize,
    #[serde(default)]
    pub round_pixels: bool,
    /// Records the render node call tree each frame.
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub resolution: Resolution,
    /// Frames an unused pooled target survives before it is destroyed.
    #[serde(default = "RenderSettings::default_context_pool_max_age")]
    pub context_pool_max_age: u64,
    #[serde(default = "RenderSettings::default_clear_color")]
    pub clear_color: [f32; 4],
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            batch_size: Self::default_batch_size(),
            max_textures: Self::default_max_textures(),
            max_lights: Self::default_max_lights(),
            round_pixels: false,
            debug: false,
            resolution: Resolution::default(),
            context_pool_max_age: Self::default_context_pool_max_age(),
            clear_color: Self::default_clear_color(),
        }
    }
}

impl RenderSettings {
    /// Largest batch whose vertices still fit 16-bit indices.
    pub const MAX_BATCH_SIZE: usize = 65536 / 4;

    pub fn load() -> Self {
        Self::load_from_path("settings.json")
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|err| {
                warn!(
                    "Failed to parse {:?} ({}). Falling back to default render settings.",
                    path, err
                );
                RenderSettings::default()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Render settings file {:?} not found. Using default settings.",
                    path
                );
                RenderSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default render settings.",
                    path, err
                );
                RenderSettings::default()
            }
        }
    }

    /// Parses and validates settings from a JSON document.
    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        let settings = serde_json::from_str::<RenderSettings>(contents)?;
        info!("Loaded render settings");
        Ok(settings.validate())
    }

    fn validate(mut self) -> Self {
        if self.batch_size == 0 || self.batch_size > Self::MAX_BATCH_SIZE {
            let clamped = self.batch_size.clamp(1, Self::MAX_BATCH_SIZE);
            warn!(
                "Batch size {} is out of range. Using {} instead.",
                self.batch_size, clamped
            );
            self.batch_size = clamped;
        }

        if self.max_textures == 0 {
            warn!("Max textures must be greater than zero. Using 1 instead.");
            self.max_textures = 1;
        }

        if self.max_lights == 0 {
            warn!("Max lights must be greater than zero. Using 1 instead.");
            self.max_lights = 1;
        }

        if self.resolution.width == 0 || self.resolution.height == 0 {
            warn!("Resolution must be greater than zero. Using default resolution.");
            self.resolution = Resolution::default();
        }

        if self.context_pool_max_age == 0 {
            warn!("Context pool max age must be at least one frame. Using 1 instead.");
            self.context_pool_max_age = 1;
        }

        self
    }

    const fn default_batch_size() -> usize {
        4096
    }

    const fn default_max_textures() -> usize {
        16
    }

    const fn default_max_lights() -> usize {
        10
    }

    const fn default_context_pool_max_age() -> u64 {
        60
    }

    const fn default_clear_color() -> [f32; 4] {
        [0.0, 0.0, 0.0, 1.0]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid_settings() -> RenderSettings {
        RenderSettings {
            batch_size: 0,
            max_textures: 0,
            max_lights: 0,
            resolution: Resolution {
                width: 0,
                height: 0,
            },
            context_pool_max_age: 0,
            ..RenderSettings::default()
        }
    }

    #[test]
    fn validate_replaces_invalid_values() {
        let validated = invalid_settings().validate();

        assert_eq!(validated.batch_size, 1);
        assert_eq!(validated.max_textures, 1);
        assert_eq!(validated.max_lights, 1);
        assert_eq!(validated.context_pool_max_age, 1);
        assert_eq!(validated.resolution, Resolution::default());
    }

    #[test]
    fn oversized_batches_are_clamped_to_index_range() {
        let settings = RenderSettings {
            batch_size: 100_000,
            ..RenderSettings::default()
        }
        .validate();
        assert_eq!(settings.batch_size, RenderSettings::MAX_BATCH_SIZE);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let settings = RenderSettings::from_json(r#"{ "max_textures": 8, "debug": true }"#)
            .expect("valid json");
        assert_eq!(settings.max_textures, 8);
        assert!(settings.debug);
        assert_eq!(settings.batch_size, RenderSettings::default().batch_size);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = RenderSettings::load_from_path("does/not/exist.json");
        assert_eq!(settings, RenderSettings::default());
    }
}
