use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const MARGIN: f32 = 20.0;
const MIN_PARTICIPANT_WIDTH: f32 = 80.0;
const PARTICIPANT_PADDING: f32 = 20.0;
const OCCURRENCE_WIDTH: f32 = 15.0;
const LAYER_OFFSET: f32 = 7.0;
const ARROW_HEAD_WIDTH: f32 = 10.0;
const SELF_CALL_WIDTH: f32 = 30.0;
const FRAGMENT_MIN_WIDTH: f32 = 100.0;
const FRAGMENT_PADDING_X: f32 = 10.0;
const MEASURE_CACHE_CAPACITY: usize = 1024;

const BUILTIN_PRESETS: &[(&str, &str)] = &[
    ("default", ""),
    (
        "compact",
        "margin = 10.0\nmin_participant_width = 60.0\nparticipant_padding = 12.0\nfragment_min_width = 80.0\n",
    ),
    (
        "spacious",
        "margin = 40.0\nmin_participant_width = 100.0\nparticipant_padding = 28.0\nfragment_padding_x = 16.0\n",
    ),
];

/// Spacing constants used by the coordinate engine and the geometry stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Minimum gap between the boxes of neighbouring participants.
    #[serde(default = "default_margin")]
    pub margin: f32,
    #[serde(default = "default_min_participant_width")]
    pub min_participant_width: f32,
    /// Added to the measured label width of a participant.
    #[serde(default = "default_participant_padding")]
    pub participant_padding: f32,

    #[serde(default = "default_occurrence_width")]
    pub occurrence_width: f32,
    /// Outward shift of every nested occurrence bar.
    #[serde(default = "default_layer_offset")]
    pub layer_offset: f32,
    #[serde(default = "default_arrow_head_width")]
    pub arrow_head_width: f32,
    #[serde(default = "default_self_call_width")]
    pub self_call_width: f32,

    #[serde(default = "default_fragment_min_width")]
    pub fragment_min_width: f32,
    #[serde(default = "default_fragment_padding_x")]
    pub fragment_padding_x: f32,

    #[serde(default = "default_measure_cache_capacity")]
    pub measure_cache_capacity: usize,
}

fn default_margin() -> f32 {
    MARGIN
}
fn default_min_participant_width() -> f32 {
    MIN_PARTICIPANT_WIDTH
}
fn default_participant_padding() -> f32 {
    PARTICIPANT_PADDING
}
fn default_occurrence_width() -> f32 {
    OCCURRENCE_WIDTH
}
fn default_layer_offset() -> f32 {
    LAYER_OFFSET
}
fn default_arrow_head_width() -> f32 {
    ARROW_HEAD_WIDTH
}
fn default_self_call_width() -> f32 {
    SELF_CALL_WIDTH
}
fn default_fragment_min_width() -> f32 {
    FRAGMENT_MIN_WIDTH
}
fn default_fragment_padding_x() -> f32 {
    FRAGMENT_PADDING_X
}
fn default_measure_cache_capacity() -> usize {
    MEASURE_CACHE_CAPACITY
}

impl Default for LayoutConfig {
    fn default() -> Self {
        LayoutConfig {
            margin: MARGIN,
            min_participant_width: MIN_PARTICIPANT_WIDTH,
            participant_padding: PARTICIPANT_PADDING,
            occurrence_width: OCCURRENCE_WIDTH,
            layer_offset: LAYER_OFFSET,
            arrow_head_width: ARROW_HEAD_WIDTH,
            self_call_width: SELF_CALL_WIDTH,
            fragment_min_width: FRAGMENT_MIN_WIDTH,
            fragment_padding_x: FRAGMENT_PADDING_X,
            measure_cache_capacity: MEASURE_CACHE_CAPACITY,
        }
    }
}

impl LayoutConfig {
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        let normalized = name.trim().to_ascii_lowercase().replace('-', "_");
        let content = BUILTIN_PRESETS
            .iter()
            .find(|(n, _)| *n == normalized)
            .map(|(_, c)| *c)
            .ok_or_else(|| ConfigError::Invalid {
                field: "preset",
                message: format!(
                    "unknown preset '{}'. Available: {}",
                    name,
                    Self::list_presets().join(", ")
                ),
            })?;
        Self::from_toml(content)
    }

    pub fn list_presets() -> Vec<&'static str> {
        BUILTIN_PRESETS.iter().map(|(n, _)| *n).collect()
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: LayoutConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
            toml: e.to_string(),
            yaml: String::new(),
        })?;
        config.validated()
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: LayoutConfig = serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
            toml: String::new(),
            yaml: e.to_string(),
        })?;
        config.validated()
    }

    /// Reads a config file, trying TOML first and then YAML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::NotFound(path.display().to_string()))?;

        let toml_err = match toml::from_str::<LayoutConfig>(&content) {
            Ok(config) => return config.validated(),
            Err(e) => e.to_string(),
        };
        match serde_yaml::from_str::<LayoutConfig>(&content) {
            Ok(config) => config.validated(),
            Err(e) => Err(ConfigError::Parse {
                toml: toml_err,
                yaml: e.to_string(),
            }),
        }
    }

    fn validated(self) -> Result<Self, ConfigError> {
        let non_negative = [
            ("margin", self.margin),
            ("min_participant_width", self.min_participant_width),
            ("participant_padding", self.participant_padding),
            ("occurrence_width", self.occurrence_width),
            ("layer_offset", self.layer_offset),
            ("arrow_head_width", self.arrow_head_width),
            ("self_call_width", self.self_call_width),
            ("fragment_min_width", self.fragment_min_width),
            ("fragment_padding_x", self.fragment_padding_x),
        ];
        for (field, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid {
                    field,
                    message: format!("expected a finite non-negative number, got {}", value),
                });
            }
        }
        // Neighbouring centers must strictly increase.
        if self.margin <= 0.0 && self.min_participant_width <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "margin",
                message: "margin and min_participant_width cannot both be zero".to_string(),
            });
        }
        if self.measure_cache_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "measure_cache_capacity",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(self)
    }
}
