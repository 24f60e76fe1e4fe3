//! Read-only statistics snapshots.
//!
//! Stats never influence correctness; they feed diagnostics overlays and the
//! host's adaptive-quality controller.

use serde::Serialize;

/// Dirty region tracker counters.
///
/// `skipped_redraws`, `pixels_saved` and `performance_gain` are populated by
/// the caller (or the [`RenderOptimizer`](crate::RenderOptimizer) facade);
/// the tracker itself only maintains the region counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RegionStats {
    pub total_regions: u64,
    pub merged_regions: u64,
    pub skipped_redraws: u64,
    pub pixels_saved: f64,
    pub performance_gain: f64,
}

/// Per-frame culling outcome.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CullingStats {
    pub total_objects: usize,
    pub visible_objects: usize,
    pub culled_objects: usize,
    /// `culled_objects / total_objects`; 0.0 with no registered objects.
    pub culling_efficiency: f64,
    pub culling_time_ms: f64,
}

/// Compositing pass outcome.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CompositorStats {
    pub active_layers: usize,
    /// Layers holding a live cache entry.
    pub cached_layers: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// `cache_hits / (cache_hits + cache_misses)`; 0.0 before any render.
    pub cache_hit_ratio: f64,
    /// Wall-clock time of the last whole `render_layers` pass.
    pub render_time_ms: f64,
    pub render_errors: u64,
}

/// Aggregated snapshot across all three components.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct EngineStats {
    pub frame: u64,
    pub regions: RegionStats,
    pub culling: CullingStats,
    pub compositor: CompositorStats,
}

pub(crate) fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_handles_empty_denominator() {
        assert_eq!(ratio(0, 0), 0.0);
        assert_eq!(ratio(3, 4), 0.75);
    }
}
