use crate::rendering::surface::BlendMode;

// Dirty region defaults

pub fn default_min_region_size() -> f32 {
    32.0
}

pub fn default_max_region_count() -> usize {
    8
}

pub fn default_merge_threshold() -> f32 {
    0.3
}

pub fn default_expansion_factor() -> f32 {
    1.1
}

pub fn default_region_history_size() -> usize {
    30
}

// Culling defaults

pub fn default_culling_margin() -> f32 {
    50.0
}

pub fn default_grid_size() -> f32 {
    100.0
}

pub fn default_culling_history_size() -> usize {
    60
}

// Compositor defaults

pub fn default_max_layers() -> usize {
    16
}

/// Layers whose measured render time exceeds this (ms) are worth caching.
pub fn default_cache_threshold_ms() -> f64 {
    100.0
}

pub fn default_invalidation_threshold() -> u32 {
    3
}

pub fn default_enable_blending() -> bool {
    true
}

pub fn default_caching_enabled() -> bool {
    true
}

pub fn default_global_alpha() -> f32 {
    1.0
}

pub fn default_blend_mode() -> BlendMode {
    BlendMode::SourceOver
}

// Shared

pub fn default_enabled() -> bool {
    true
}
