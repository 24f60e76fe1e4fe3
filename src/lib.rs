//! Adaptive rendering optimization engine.
//!
//! Decides, every frame, what must be redrawn and how to composite it
//! cheaply: a dirty region tracker bounds the redraw area, a spatial-grid
//! viewport culler narrows the draw-candidate set, and a layer compositor
//! caches static layers in off-screen surfaces. All three expose statistics
//! for an external adaptive-quality controller.
//!
//! Single-threaded and frame-driven by design: everything runs synchronously
//! inside the host's render callback, and each component exclusively owns
//! its mutable state. Construct one [`RenderOptimizer`] per render target.

pub mod constants;
pub mod defaults;
pub mod error;
pub mod optimizer;
pub mod rendering;
pub mod settings;
pub mod stats;
pub mod types;

// 重新导出主要类型
pub use error::{CompositorError, OptimizerError};
pub use optimizer::{FrameReport, RenderOptimizer};
pub use rendering::{
    BlendMode, DirtyRegion, DirtyRegionTracker, Hotspot, Layer, LayerCompositor, LayerPainter,
    LayerProperties, RenderPassReport, RenderableObject, ViewportCuller,
};
pub use settings::{CompositorSettings, CullingSettings, RegionSettings, Settings};
pub use stats::{CompositorStats, CullingStats, EngineStats, RegionStats};
pub use types::Rectangle;
