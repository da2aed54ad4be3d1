//! Engine configuration.
//!
//! Every field has a default, so a host can load a partial JSON document and
//! only override what it cares about.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default minimum zoom scale.
pub const MIN_SCALE: f64 = 0.1;
/// Default maximum zoom scale.
pub const MAX_SCALE: f64 = 10.0;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Tunables for the canvas engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Lower zoom bound.
    pub min_scale: f64,
    /// Upper zoom bound.
    pub max_scale: f64,
    /// Wheel delta to zoom factor: `exp(-delta_y * sensitivity)`.
    pub wheel_zoom_sensitivity: f64,
    /// Quiet period after the last wheel event before zooming is considered over.
    pub zoom_quiet_ms: u64,
    /// Interactive throttle cadence (one animation frame).
    pub frame_interval_ms: u64,
    /// Minimum interval between cursor broadcasts.
    pub cursor_interval_ms: u64,
    /// Delay before a drag position is written to the backing store.
    pub drag_write_debounce_ms: u64,
    /// Screen padding around the viewport for culling.
    pub cull_padding_px: f64,
    /// Below this scale objects render as flat rectangles.
    pub lod_scale_threshold: f64,
    /// Eraser radius in screen pixels.
    pub eraser_radius_px: f64,
    /// Hit slop for objects in screen pixels.
    pub hit_tolerance_px: f64,
    /// Hit slop for resize handles in screen pixels.
    pub handle_tolerance_px: f64,
    /// Minimum drag distance (screen pixels) before a free arrow is committed.
    pub min_connector_drag_px: f64,
    /// Bound of each undo/redo stack.
    pub history_limit: usize,
    /// World offset applied to pasted and duplicated objects.
    pub paste_offset: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_scale: MIN_SCALE,
            max_scale: MAX_SCALE,
            wheel_zoom_sensitivity: 0.0015,
            zoom_quiet_ms: 200,
            frame_interval_ms: 16,
            cursor_interval_ms: 100,
            drag_write_debounce_ms: 75,
            cull_padding_px: 200.0,
            lod_scale_threshold: 0.35,
            eraser_radius_px: 10.0,
            hit_tolerance_px: 6.0,
            handle_tolerance_px: 10.0,
            min_connector_drag_px: 8.0,
            history_limit: 100,
            paste_offset: 20.0,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is internally consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_scale > 0.0 && self.min_scale.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "min_scale must be positive, got {}",
                self.min_scale
            )));
        }
        if !(self.max_scale > self.min_scale && self.max_scale.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "max_scale ({}) must be greater than min_scale ({})",
                self.max_scale, self.min_scale
            )));
        }
        if self.frame_interval_ms == 0 || self.cursor_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "throttle intervals must be non-zero".to_string(),
            ));
        }
        if self.history_limit == 0 {
            return Err(ConfigError::Invalid("history_limit must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn zoom_quiet(&self) -> Duration {
        Duration::from_millis(self.zoom_quiet_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn cursor_interval(&self) -> Duration {
        Duration::from_millis(self.cursor_interval_ms)
    }

    pub fn drag_write_debounce(&self) -> Duration {
        Duration::from_millis(self.drag_write_debounce_ms)
    }
}
