//! Rendering optimization modules.
//!
//! Per-frame pipeline, in call order:
//! - dirty region tracking: accumulate and merge changed areas
//! - viewport culling: narrow the draw-candidate set via a spatial grid
//! - layer compositing: composite ordered layers, caching static ones

pub mod compositor;
pub mod culling;
pub mod dirty_region;
pub mod surface;

// 重新导出常用类型
pub use compositor::{
    CacheEntry, Layer, LayerCompositor, LayerPainter, LayerProperties, RenderPassReport,
};
pub use culling::{CullingFrame, RenderableObject, ViewportCuller};
pub use dirty_region::{DirtyRegion, DirtyRegionTracker, FrameHistoryEntry, Hotspot};
pub use surface::BlendMode;
