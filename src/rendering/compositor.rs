//! Ordered layer compositing with per-layer raster caching.
//!
//! Layers render back-to-front onto a target surface. Static layers that are
//! expensive enough to justify the bookkeeping keep their content in a
//! private off-screen surface and composite from it instead of re-rendering.
//! Per-layer alpha and blend mode are applied at composite time through a
//! fresh paint value each draw, so no layer's state can leak into the next
//! one.

use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

use tiny_skia::{Pixmap, Transform};

use crate::error::CompositorError;
use crate::rendering::dirty_region::DirtyRegion;
use crate::rendering::surface::{self, BlendMode};
use crate::settings::CompositorSettings;
use crate::stats::{self, CompositorStats};
use crate::types::Rectangle;

/// Paints a layer's content onto a surface.
///
/// Implemented by the host's draw dispatch. The compositor decides when the
/// painter runs and which surface the content lands on (the layer's private
/// surface or a shared scratch surface); the painter only draws. Content is
/// painted at full opacity — the layer's alpha and blend mode are applied
/// when the surface is composited onto the target.
pub trait LayerPainter {
    fn paint_layer(
        &mut self,
        layer: &Layer,
        surface: &mut Pixmap,
        viewport: Option<&Rectangle>,
    ) -> anyhow::Result<()>;
}

impl<F> LayerPainter for F
where
    F: FnMut(&Layer, &mut Pixmap, Option<&Rectangle>) -> anyhow::Result<()>,
{
    fn paint_layer(
        &mut self,
        layer: &Layer,
        surface: &mut Pixmap,
        viewport: Option<&Rectangle>,
    ) -> anyhow::Result<()> {
        self(layer, surface, viewport)
    }
}

/// Construction-time layer properties.
#[derive(Debug, Clone)]
pub struct LayerProperties {
    pub enabled: bool,
    pub visible: bool,
    pub opacity: f32,
    /// `None` falls back to the compositor's global composite operation.
    pub blend_mode: Option<BlendMode>,
    pub cacheable: bool,
}

impl Default for LayerProperties {
    fn default() -> Self {
        Self {
            enabled: true,
            visible: true,
            opacity: 1.0,
            blend_mode: None,
            cacheable: false,
        }
    }
}

/// Cache bookkeeping recorded when a layer's render proved slow enough.
#[derive(Debug, Clone, Copy)]
pub struct CacheEntry {
    /// Compositor frame counter at the time the cache was populated.
    pub cached_at_frame: u64,
    /// Measured cost of the render that populated it (ms).
    pub render_time_ms: f64,
}

/// An independently composited draw surface.
pub struct Layer {
    pub name: String,
    pub order: i32,
    pub enabled: bool,
    pub visible: bool,
    opacity: f32,
    pub blend_mode: BlendMode,
    pub cacheable: bool,
    dirty: bool,
    bounding_box: Option<Rectangle>,
    /// Drawables associated for bounding-box bookkeeping; draw dispatch is
    /// the painter's business.
    objects: HashMap<String, Option<Rectangle>>,
    surface: Option<Pixmap>,
    /// True once `surface` holds a completed render.
    has_content: bool,
    cache: Option<CacheEntry>,
    last_render_ms: f64,
    /// Cache invalidations since the last cache hit.
    invalidations: u32,
}

impl Layer {
    fn new(name: String, order: i32, properties: LayerProperties, default_blend: BlendMode) -> Self {
        Self {
            name,
            order,
            enabled: properties.enabled,
            visible: properties.visible,
            opacity: properties.opacity.clamp(0.0, 1.0),
            blend_mode: properties.blend_mode.unwrap_or(default_blend),
            cacheable: properties.cacheable,
            dirty: true,
            bounding_box: None,
            objects: HashMap::new(),
            surface: None,
            has_content: false,
            cache: None,
            last_render_ms: 0.0,
            invalidations: 0,
        }
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Union of all member object bounds, if any are known.
    pub fn bounding_box(&self) -> Option<Rectangle> {
        self.bounding_box
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn cache_entry(&self) -> Option<CacheEntry> {
        self.cache
    }

    pub fn last_render_ms(&self) -> f64 {
        self.last_render_ms
    }

    fn recompute_bounding_box(&mut self) {
        self.bounding_box = self
            .objects
            .values()
            .flatten()
            .copied()
            .reduce(|acc, b| acc.union(&b));
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("name", &self.name)
            .field("order", &self.order)
            .field("enabled", &self.enabled)
            .field("visible", &self.visible)
            .field("opacity", &self.opacity)
            .field("blend_mode", &self.blend_mode)
            .field("cacheable", &self.cacheable)
            .field("dirty", &self.dirty)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

/// Outcome of one compositing pass.
#[derive(Debug, Clone, Default)]
pub struct RenderPassReport {
    /// Layers that contributed pixels to the target this pass.
    pub composited_layers: usize,
    pub cache_hits: usize,
    /// Layers re-used from their surface because no dirty region touched them.
    pub region_skips: Vec<String>,
    /// Content area (px) that did not need re-painting thanks to region skips.
    pub pixels_saved: f64,
}

/// Ordered stack of named layers composited onto a target surface.
pub struct LayerCompositor {
    settings: CompositorSettings,
    layers: HashMap<String, Layer>,
    /// Always sorted ascending by `order`; exactly one entry per live layer.
    layer_order: Vec<String>,
    /// Shared scratch surface for non-cacheable layers.
    scratch: Option<Pixmap>,
    frame_counter: u64,
    cache_hits: u64,
    cache_misses: u64,
    render_errors: u64,
    last_pass_ms: f64,
}

impl Default for LayerCompositor {
    fn default() -> Self {
        Self::new(CompositorSettings::default())
    }
}

impl LayerCompositor {
    pub fn new(settings: CompositorSettings) -> Self {
        Self {
            settings,
            layers: HashMap::new(),
            layer_order: Vec::new(),
            scratch: None,
            frame_counter: 0,
            cache_hits: 0,
            cache_misses: 0,
            render_errors: 0,
            last_pass_ms: 0.0,
        }
    }

    /// Create a layer at the given render priority (ascending draw order).
    ///
    /// Fails without touching existing state when the name is taken or the
    /// layer limit is reached. Equal orders keep creation order (stable
    /// insertion after existing entries).
    pub fn create_layer(
        &mut self,
        name: impl Into<String>,
        order: i32,
        properties: LayerProperties,
    ) -> Result<(), CompositorError> {
        let name = name.into();
        if self.layers.contains_key(&name) {
            return Err(CompositorError::DuplicateLayer(name));
        }
        if self.layers.len() >= self.settings.max_layers {
            return Err(CompositorError::LayerLimitReached(self.settings.max_layers));
        }

        let layer = Layer::new(
            name.clone(),
            order,
            properties,
            self.settings.global_composite_operation,
        );
        let pos = self
            .layer_order
            .partition_point(|existing| self.layers[existing].order <= order);
        self.layer_order.insert(pos, name.clone());
        self.layers.insert(name, layer);
        Ok(())
    }

    /// Remove a layer and release its private surface.
    pub fn remove_layer(&mut self, name: &str) -> bool {
        if self.layers.remove(name).is_none() {
            return false;
        }
        self.layer_order.retain(|n| n != name);
        true
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.get(name)
    }

    /// Layer names in render order.
    pub fn layer_order(&self) -> &[String] {
        &self.layer_order
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn set_layer_visibility(&mut self, name: &str, visible: bool) -> bool {
        self.mutate_layer(name, |layer| layer.visible = visible)
    }

    pub fn set_layer_enabled(&mut self, name: &str, enabled: bool) -> bool {
        self.mutate_layer(name, |layer| layer.enabled = enabled)
    }

    pub fn set_layer_opacity(&mut self, name: &str, opacity: f32) -> bool {
        self.mutate_layer(name, |layer| layer.opacity = opacity.clamp(0.0, 1.0))
    }

    pub fn set_layer_blend_mode(&mut self, name: &str, blend_mode: BlendMode) -> bool {
        self.mutate_layer(name, |layer| layer.blend_mode = blend_mode)
    }

    /// Force a layer back to the dirty state, invalidating its cache entry.
    pub fn mark_layer_dirty(&mut self, name: &str) -> bool {
        self.mutate_layer(name, |_| {})
    }

    /// Associate a drawable with a layer for bounding-box bookkeeping.
    pub fn add_object_to_layer(
        &mut self,
        layer_name: &str,
        object_id: impl Into<String>,
        bounds: Option<Rectangle>,
    ) -> bool {
        let id = object_id.into();
        self.mutate_layer(layer_name, |layer| {
            layer.objects.insert(id, bounds);
            layer.recompute_bounding_box();
        })
    }

    pub fn remove_object_from_layer(&mut self, layer_name: &str, object_id: &str) -> bool {
        let mut found = false;
        let mutated = self.mutate_layer(layer_name, |layer| {
            found = layer.objects.remove(object_id).is_some();
            layer.recompute_bounding_box();
        });
        mutated && found
    }

    /// Apply a mutation, mark the layer dirty and drop its cache entry.
    ///
    /// Once a layer accumulates `invalidation_threshold` invalidations
    /// without a single cache hit in between, its private surface is released
    /// as well: content that churns every few frames should not pin a
    /// full-size raster. The counter resets when a cache hit proves the
    /// layer cache-worthy again.
    fn mutate_layer(&mut self, name: &str, mutate: impl FnOnce(&mut Layer)) -> bool {
        let threshold = self.settings.invalidation_threshold;
        let Some(layer) = self.layers.get_mut(name) else {
            return false;
        };
        mutate(layer);
        layer.dirty = true;
        if layer.cache.take().is_some() {
            layer.invalidations += 1;
            if layer.invalidations >= threshold {
                layer.surface = None;
                layer.has_content = false;
            }
        }
        true
    }

    fn should_use_cache(&self, layer: &Layer) -> bool {
        self.settings.caching_enabled
            && layer.cacheable
            && !layer.dirty
            && layer.cache.is_some()
            && layer.surface.is_some()
            && layer.last_render_ms > self.settings.cache_threshold_ms
    }

    /// Whether the dirty-region hint lets this layer reuse its surface.
    ///
    /// Requires a completed private render and a known bounding box that no
    /// merged region touches. This trusts the region tracker over the
    /// conservative dirty flag: valid only when the host reports every
    /// content change through `add_dirty_region`.
    fn region_hint_allows_reuse(&self, layer: &Layer, regions: &[DirtyRegion]) -> bool {
        if !self.settings.caching_enabled || !layer.cacheable || !layer.has_content {
            return false;
        }
        if layer.surface.is_none() {
            return false;
        }
        let Some(bbox) = layer.bounding_box else {
            return false;
        };
        regions.iter().all(|r| !r.rect.intersects(&bbox))
    }

    /// Composite all layers onto `target` in ascending order.
    pub fn render_layers(
        &mut self,
        target: &mut Pixmap,
        viewport: Option<&Rectangle>,
        painter: &mut dyn LayerPainter,
    ) -> RenderPassReport {
        self.render_layers_with_regions(target, viewport, None, painter)
    }

    /// Composite all layers, optionally consulting merged dirty regions to
    /// skip re-painting layers whose content provably did not change.
    pub fn render_layers_with_regions(
        &mut self,
        target: &mut Pixmap,
        viewport: Option<&Rectangle>,
        dirty_hint: Option<&[DirtyRegion]>,
        painter: &mut dyn LayerPainter,
    ) -> RenderPassReport {
        let pass_start = Instant::now();
        self.frame_counter += 1;
        let mut report = RenderPassReport::default();

        let order = self.layer_order.clone();
        for name in order {
            self.render_one_layer(&name, target, viewport, dirty_hint, painter, &mut report);
        }

        self.last_pass_ms = pass_start.elapsed().as_secs_f64() * 1000.0;
        report
    }

    fn render_one_layer(
        &mut self,
        name: &str,
        target: &mut Pixmap,
        viewport: Option<&Rectangle>,
        dirty_hint: Option<&[DirtyRegion]>,
        painter: &mut dyn LayerPainter,
        report: &mut RenderPassReport,
    ) {
        let Some(layer) = self.layers.get(name) else {
            return;
        };
        if !layer.enabled || !layer.visible {
            return;
        }
        let alpha = self.settings.global_alpha * layer.opacity;
        if alpha <= 0.0 {
            return;
        }

        // Cached composite path: either the regular cache contract holds, or
        // the dirty-region hint proves the content untouched this frame.
        let cache_hit = self.should_use_cache(layer);
        let region_skip = !cache_hit
            && dirty_hint.is_some_and(|regions| self.region_hint_allows_reuse(layer, regions));
        if cache_hit || region_skip {
            let bbox = layer.bounding_box;
            let paint =
                surface::composite_paint(alpha, layer.blend_mode, self.settings.enable_blending);
            if let Some(surface) = &layer.surface {
                target.draw_pixmap(0, 0, surface.as_ref(), &paint, Transform::identity(), None);

                report.composited_layers += 1;
                report.cache_hits += 1;
                self.cache_hits += 1;
                if region_skip {
                    report.region_skips.push(name.to_owned());
                    if let Some(bbox) = bbox {
                        report.pixels_saved += f64::from(bbox.area());
                    }
                }
                // A hit proves the layer cache-worthy again.
                if let Some(layer) = self.layers.get_mut(name) {
                    layer.invalidations = 0;
                }
                return;
            }
        }

        // Direct render: cacheable layers paint into their private surface,
        // everything else shares the scratch surface.
        let use_private = layer.cacheable && self.settings.caching_enabled;
        let blend_mode = layer.blend_mode;
        let (width, height) = (target.width(), target.height());

        let render_start = Instant::now();
        let mut surface = match self.take_render_surface(name, use_private, width, height) {
            Ok(surface) => surface,
            Err(err) => {
                log::warn!("layer '{name}': {err}, skipping");
                self.render_errors += 1;
                return;
            }
        };
        surface::clear_surface(&mut surface);

        let layer = &self.layers[name];
        match painter.paint_layer(layer, &mut surface, viewport) {
            Ok(()) => {
                let paint = surface::composite_paint(alpha, blend_mode, self.settings.enable_blending);
                target.draw_pixmap(0, 0, surface.as_ref(), &paint, Transform::identity(), None);
                report.composited_layers += 1;
                let elapsed_ms = render_start.elapsed().as_secs_f64() * 1000.0;

                let frame = self.frame_counter;
                let cache_threshold = self.settings.cache_threshold_ms;
                if use_private {
                    self.cache_misses += 1;
                }
                if let Some(layer) = self.layers.get_mut(name) {
                    layer.last_render_ms = elapsed_ms;
                    if use_private {
                        layer.surface = Some(surface);
                        layer.has_content = true;
                        // Only renders still slow enough to amortize the cache
                        // bookkeeping get a cache entry.
                        if elapsed_ms > cache_threshold {
                            layer.dirty = false;
                            layer.cache = Some(CacheEntry {
                                cached_at_frame: frame,
                                render_time_ms: elapsed_ms,
                            });
                        }
                    } else {
                        self.scratch = Some(surface);
                    }
                }
            }
            Err(err) => {
                // Fail open: a broken painter loses one layer for one frame,
                // never the whole pass.
                log::warn!("layer '{name}': painter failed: {err:#}");
                self.render_errors += 1;
                if use_private {
                    if let Some(layer) = self.layers.get_mut(name) {
                        layer.surface = Some(surface);
                        layer.has_content = false;
                    }
                } else {
                    self.scratch = Some(surface);
                }
            }
        }
    }

    /// Obtain the surface to render into, re-allocating on size changes.
    fn take_render_surface(
        &mut self,
        name: &str,
        use_private: bool,
        width: u32,
        height: u32,
    ) -> Result<Pixmap, CompositorError> {
        if use_private {
            let layer = self
                .layers
                .get_mut(name)
                .ok_or_else(|| CompositorError::UnknownLayer(name.to_owned()))?;
            match layer.surface.take() {
                Some(surface) if surface.width() == width && surface.height() == height => {
                    Ok(surface)
                }
                _ => {
                    // Stale size: whatever the cache held no longer matches
                    // the target.
                    layer.cache = None;
                    layer.has_content = false;
                    surface::new_surface(width, height)
                }
            }
        } else {
            match self.scratch.take() {
                Some(surface) if surface.width() == width && surface.height() == height => {
                    Ok(surface)
                }
                _ => surface::new_surface(width, height),
            }
        }
    }

    /// Drop every private surface and all cache bookkeeping. Call on target
    /// resize or theme change; every layer starts over dirty.
    pub fn clear_caches(&mut self) {
        for layer in self.layers.values_mut() {
            layer.surface = None;
            layer.has_content = false;
            layer.cache = None;
            layer.dirty = true;
            layer.invalidations = 0;
        }
        self.scratch = None;
    }

    pub fn stats(&self) -> CompositorStats {
        CompositorStats {
            active_layers: self
                .layers
                .values()
                .filter(|l| l.enabled && l.visible)
                .count(),
            cached_layers: self.layers.values().filter(|l| l.cache.is_some()).count(),
            cache_hits: self.cache_hits,
            cache_misses: self.cache_misses,
            cache_hit_ratio: stats::ratio(self.cache_hits, self.cache_hits + self.cache_misses),
            render_time_ms: self.last_pass_ms,
            render_errors: self.render_errors,
        }
    }

    pub fn reset_stats(&mut self) {
        self.cache_hits = 0;
        self.cache_misses = 0;
        self.render_errors = 0;
        self.last_pass_ms = 0.0;
    }
}

impl fmt::Debug for LayerCompositor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerCompositor")
            .field("layers", &self.layer_order)
            .field("frame_counter", &self.frame_counter)
            .field("cache_hits", &self.cache_hits)
            .field("cache_misses", &self.cache_misses)
            .finish()
    }
}
