//! Engine facade: one instance per render target/scene.

use std::path::Path;

use tiny_skia::Pixmap;

use crate::rendering::compositor::{LayerCompositor, LayerPainter, RenderPassReport};
use crate::rendering::culling::ViewportCuller;
use crate::rendering::dirty_region::DirtyRegionTracker;
use crate::settings::Settings;
use crate::stats::EngineStats;
use crate::types::Rectangle;

/// The three cooperating components behind a single frame-pass entry point.
///
/// The components stay public: hosts that need finer control (custom frame
/// scheduling, partial passes) drive them directly and only use the facade
/// for construction and stats aggregation.
pub struct RenderOptimizer {
    pub regions: DirtyRegionTracker,
    pub culler: ViewportCuller,
    pub compositor: LayerCompositor,
    frame: u64,
}

/// What one `render_frame` call did.
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub frame: u64,
    /// Draw candidates surviving the cull, in id order.
    pub visible_objects: Vec<String>,
    /// Merged dirty region count handed to the compositor as a hint.
    pub merged_regions: usize,
    pub pass: RenderPassReport,
}

impl Default for RenderOptimizer {
    fn default() -> Self {
        Self::with_settings(Settings::default())
    }
}

impl RenderOptimizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            regions: DirtyRegionTracker::new(settings.regions),
            culler: ViewportCuller::new(settings.culling),
            compositor: LayerCompositor::new(settings.compositor),
            frame: 0,
        }
    }

    /// Construct from a settings file, falling back to defaults.
    pub fn from_settings_file(path: &Path) -> Self {
        Self::with_settings(Settings::load_from(path))
    }

    /// Run one frame.
    ///
    /// Merges the dirty regions accumulated since the last frame, culls
    /// against the current viewport, composites all layers (with the merged
    /// regions as a redraw-skipping hint), feeds the skip results back into
    /// the tracker's caller-populated counters, then retires the regions.
    pub fn render_frame(&mut self, target: &mut Pixmap, painter: &mut dyn LayerPainter) -> FrameReport {
        let merged = self.regions.merge_regions();
        let visible_objects = self.culler.cull_objects();

        let viewport: Rectangle = self.culler.viewport();
        let viewport = (viewport.width > 0.0 && viewport.height > 0.0).then_some(viewport);

        let pass = self.compositor.render_layers_with_regions(
            target,
            viewport.as_ref(),
            Some(&merged),
            painter,
        );

        for _ in &pass.region_skips {
            self.regions.record_skipped_redraw();
        }
        if pass.pixels_saved > 0.0 {
            self.regions.add_pixels_saved(pass.pixels_saved);
        }

        self.regions.clear_regions();
        self.frame += 1;

        FrameReport {
            frame: self.frame,
            visible_objects,
            merged_regions: merged.len(),
            pass,
        }
    }

    /// Aggregated snapshot across all three components.
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            frame: self.frame,
            regions: self.regions.stats(),
            culling: self.culler.stats(),
            compositor: self.compositor.stats(),
        }
    }

    pub fn reset_stats(&mut self) {
        self.regions.reset_stats();
        self.compositor.reset_stats();
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::compositor::{Layer, LayerProperties};
    use crate::rendering::surface::new_surface;

    #[test]
    fn render_frame_retires_regions_and_advances_the_counter() {
        let mut engine = RenderOptimizer::new();
        engine.culler.set_viewport(0.0, 0.0, 640.0, 480.0);
        engine
            .compositor
            .create_layer("world", 0, LayerProperties::default())
            .unwrap();
        engine.regions.add_dirty_region(10.0, 10.0, 64.0, 64.0);

        let mut target = new_surface(64, 48).unwrap();
        let mut painter =
            |_: &Layer, _: &mut Pixmap, _: Option<&Rectangle>| -> anyhow::Result<()> { Ok(()) };

        let report = engine.render_frame(&mut target, &mut painter);
        assert_eq!(report.frame, 1);
        assert_eq!(report.merged_regions, 1);
        assert!(engine.regions.regions().is_empty());

        let stats = engine.stats();
        assert_eq!(stats.frame, 1);
        assert_eq!(stats.regions.total_regions, 1);
    }
}
