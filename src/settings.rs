use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::defaults::*;
use crate::error::OptimizerError;
use crate::rendering::surface::BlendMode;

/// Engine settings.
///
/// Every field has a serde default, so partial settings files are fine and
/// new knobs never break old configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub regions: RegionSettings,
    #[serde(default)]
    pub culling: CullingSettings,
    #[serde(default)]
    pub compositor: CompositorSettings,
}

/// Dirty region tracker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Floor applied to each dimension of a stored region.
    #[serde(default = "default_min_region_size")]
    pub min_region_size: f32,

    /// Hard cap on the merged region list per frame.
    #[serde(default = "default_max_region_count")]
    pub max_region_count: usize,

    /// Overlap ratio (overlap area / union area) above which two regions merge.
    #[serde(default = "default_merge_threshold")]
    pub merge_threshold: f32,

    /// Centered growth factor absorbing anti-aliasing edge artifacts.
    #[serde(default = "default_expansion_factor")]
    pub expansion_factor: f32,

    /// Frames of cleared-region history kept for hotspot analysis.
    #[serde(default = "default_region_history_size")]
    pub history_size: usize,
}

/// Viewport culler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CullingSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Margin added to the viewport on all sides to form the frustum.
    #[serde(default = "default_culling_margin")]
    pub culling_margin: f32,

    /// Spatial grid cell size.
    #[serde(default = "default_grid_size")]
    pub grid_size: f32,

    /// Frames of per-frame culling time/efficiency history.
    #[serde(default = "default_culling_history_size")]
    pub history_size: usize,
}

/// Layer compositor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositorSettings {
    #[serde(default = "default_max_layers")]
    pub max_layers: usize,

    /// Minimum measured render time (ms) before a layer is worth caching.
    #[serde(default = "default_cache_threshold_ms")]
    pub cache_threshold_ms: f64,

    /// Cache invalidations after which a layer's private surface is dropped.
    #[serde(default = "default_invalidation_threshold")]
    pub invalidation_threshold: u32,

    #[serde(default = "default_enable_blending")]
    pub enable_blending: bool,

    #[serde(default = "default_caching_enabled")]
    pub caching_enabled: bool,

    #[serde(default = "default_global_alpha")]
    pub global_alpha: f32,

    /// Composite operation applied when a layer does not override it.
    #[serde(default = "default_blend_mode")]
    pub global_composite_operation: BlendMode,
}

impl Default for RegionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_region_size: default_min_region_size(),
            max_region_count: default_max_region_count(),
            merge_threshold: default_merge_threshold(),
            expansion_factor: default_expansion_factor(),
            history_size: default_region_history_size(),
        }
    }
}

impl Default for CullingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            culling_margin: default_culling_margin(),
            grid_size: default_grid_size(),
            history_size: default_culling_history_size(),
        }
    }
}

impl Default for CompositorSettings {
    fn default() -> Self {
        Self {
            max_layers: default_max_layers(),
            cache_threshold_ms: default_cache_threshold_ms(),
            invalidation_threshold: default_invalidation_threshold(),
            enable_blending: default_enable_blending(),
            caching_enabled: default_caching_enabled(),
            global_alpha: default_global_alpha(),
            global_composite_operation: default_blend_mode(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file.
    ///
    /// Falls back to defaults if loading fails.
    pub fn load_from(path: &Path) -> Self {
        if let Ok(content) = fs::read_to_string(path)
            && let Ok(settings) = serde_json::from_str::<Settings>(&content)
        {
            return settings;
        }

        log::warn!(
            "failed to load engine settings from {}, using defaults",
            path.display()
        );
        Self::default()
    }

    /// Load settings, surfacing IO and parse failures instead of falling
    /// back. For hosts that treat a broken config as fatal.
    pub fn try_load_from(path: &Path) -> Result<Self, OptimizerError> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| OptimizerError::Settings(e.to_string()))
    }

    /// Save settings to a JSON file.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_engine_contract() {
        let s = Settings::default();
        assert_eq!(s.regions.min_region_size, 32.0);
        assert_eq!(s.regions.max_region_count, 8);
        assert_eq!(s.regions.merge_threshold, 0.3);
        assert_eq!(s.regions.history_size, 30);
        assert_eq!(s.culling.culling_margin, 50.0);
        assert_eq!(s.culling.history_size, 60);
        assert_eq!(s.compositor.max_layers, 16);
        assert_eq!(s.compositor.cache_threshold_ms, 100.0);
        assert_eq!(s.compositor.global_alpha, 1.0);
        assert_eq!(
            s.compositor.global_composite_operation,
            BlendMode::SourceOver
        );
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let s: Settings =
            serde_json::from_str(r#"{"regions": {"min_region_size": 16.0}}"#).unwrap();
        assert_eq!(s.regions.min_region_size, 16.0);
        assert_eq!(s.regions.max_region_count, 8);
        assert!(s.compositor.caching_enabled);
    }

    #[test]
    fn strict_load_surfaces_errors() {
        let missing = std::env::temp_dir().join("render_opt_no_such_settings.json");
        assert!(matches!(
            Settings::try_load_from(&missing),
            Err(OptimizerError::Io(_))
        ));

        let bad = std::env::temp_dir().join("render_opt_bad_settings.json");
        fs::write(&bad, "{ not json").unwrap();
        assert!(matches!(
            Settings::try_load_from(&bad),
            Err(OptimizerError::Settings(_))
        ));
        fs::remove_file(&bad).ok();
    }

    #[test]
    fn settings_round_trip() {
        let mut s = Settings::default();
        s.compositor.global_composite_operation = BlendMode::Lighter;
        s.culling.grid_size = 128.0;

        let json = serde_json::to_string(&s).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.compositor.global_composite_operation, BlendMode::Lighter);
        assert_eq!(back.culling.grid_size, 128.0);
    }
}
