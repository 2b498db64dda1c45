//! Tunable engine parameters.
//!
//! Thresholds that were historically hard-coded for a single reference
//! display live here so deployments can retune them. Every field has a
//! default, so a partial JSON file is a valid configuration.

use std::time::Duration;

use regionmark_geometry::ViewportConfig;
use serde::{Deserialize, Serialize};

use crate::wire::UpgradeOptions;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("malformed config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{field} {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

fn invalid(field: &'static str, reason: &'static str) -> ConfigError {
    ConfigError::Invalid { field, reason }
}

/// Gesture acceptance thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrokeConfig {
    /// Max start/end gap, in image pixels, for a path to count as closed
    pub closure_threshold_px: f64,
    /// Minimum enclosed area in normalized units (fraction of the image)
    pub min_area: f64,
    /// Pointer samples closer than this to the previous point are dropped
    pub min_point_spacing_px: f64,
    pub default_color: String,
}

impl Default for StrokeConfig {
    fn default() -> Self {
        Self {
            closure_threshold_px: 32.0,
            min_area: 0.0005,
            min_point_spacing_px: 2.0,
            default_color: "#ff3b30".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Oldest undo entries are discarded beyond this many
    pub max_entries: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_entries: 100 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub autosave_interval_ms: u64,
    /// Vertex count used when resampling legacy circles
    pub legacy_circle_segments: usize,
    /// Page size for image catalog listing
    pub page_size: usize,
}

impl SessionConfig {
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_millis(self.autosave_interval_ms.max(1))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            autosave_interval_ms: 5_000,
            legacy_circle_segments: 32,
            page_size: 50,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub stroke: StrokeConfig,
    pub viewport: ViewportConfig,
    pub history: HistoryConfig,
    pub session: SessionConfig,
}

impl EngineConfig {
    /// Parse and validate a (possibly partial) JSON configuration
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let stroke = &self.stroke;
        if !(stroke.closure_threshold_px.is_finite() && stroke.closure_threshold_px > 0.0) {
            return Err(invalid("stroke.closure_threshold_px", "must be a positive number"));
        }
        if !(stroke.min_area.is_finite() && stroke.min_area >= 0.0) {
            return Err(invalid("stroke.min_area", "must be a non-negative number"));
        }
        if !(stroke.min_point_spacing_px.is_finite() && stroke.min_point_spacing_px >= 0.0) {
            return Err(invalid("stroke.min_point_spacing_px", "must be a non-negative number"));
        }

        let viewport = &self.viewport;
        if !(viewport.min_scale.is_finite() && viewport.min_scale > 0.0) {
            return Err(invalid("viewport.min_scale", "must be a positive number"));
        }
        if !(viewport.max_scale.is_finite() && viewport.max_scale >= viewport.min_scale) {
            return Err(invalid("viewport.max_scale", "must be a number no smaller than min_scale"));
        }
        if !(viewport.wheel_step.is_finite() && viewport.wheel_step > 1.0) {
            return Err(invalid("viewport.wheel_step", "must be a number greater than 1"));
        }

        if self.history.max_entries == 0 {
            return Err(invalid("history.max_entries", "must be at least 1"));
        }
        if self.session.legacy_circle_segments < 3 {
            return Err(invalid("session.legacy_circle_segments", "must be at least 3"));
        }
        if self.session.page_size == 0 {
            return Err(invalid("session.page_size", "must be at least 1"));
        }
        Ok(())
    }

    /// Options for upgrading persisted documents under this configuration
    pub fn upgrade_options(&self) -> UpgradeOptions {
        UpgradeOptions {
            circle_segments: self.session.legacy_circle_segments,
            min_area: self.stroke.min_area,
            default_color: self.stroke.default_color.clone(),
        }
    }
}
