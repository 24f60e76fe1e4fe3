//! Raster surface helpers shared by the compositor.
//!
//! Layers composite through [`tiny_skia`] pixmaps: the target surface, the
//! per-layer private cache surfaces and the shared scratch surface are all
//! `Pixmap`s, and per-layer alpha/blend state travels in a fresh
//! [`PixmapPaint`] per draw so nothing leaks between layers.

use std::hash::{DefaultHasher, Hash, Hasher};

use serde::{Deserialize, Serialize};
use tiny_skia::{FilterQuality, Pixmap, PixmapPaint};

use crate::error::CompositorError;

/// Closed set of supported layer blend modes.
///
/// Serialized under HTML-canvas style names (`source-over`, `lighter`,
/// `destination-out`, ...) so settings files match what designer-facing
/// tooling emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    #[default]
    SourceOver,
    Lighter,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    DestinationOut,
    Xor,
}

impl BlendMode {
    /// Map onto the tiny-skia compositing mode.
    pub fn to_skia(self) -> tiny_skia::BlendMode {
        match self {
            BlendMode::SourceOver => tiny_skia::BlendMode::SourceOver,
            BlendMode::Lighter => tiny_skia::BlendMode::Plus,
            BlendMode::Multiply => tiny_skia::BlendMode::Multiply,
            BlendMode::Screen => tiny_skia::BlendMode::Screen,
            BlendMode::Overlay => tiny_skia::BlendMode::Overlay,
            BlendMode::Darken => tiny_skia::BlendMode::Darken,
            BlendMode::Lighten => tiny_skia::BlendMode::Lighten,
            BlendMode::DestinationOut => tiny_skia::BlendMode::DestinationOut,
            BlendMode::Xor => tiny_skia::BlendMode::Xor,
        }
    }
}

/// Allocate a transparent off-screen surface.
pub fn new_surface(width: u32, height: u32) -> Result<Pixmap, CompositorError> {
    Pixmap::new(width, height).ok_or(CompositorError::SurfaceAllocation { width, height })
}

/// Reset a surface to fully transparent.
pub fn clear_surface(surface: &mut Pixmap) {
    surface.fill(tiny_skia::Color::TRANSPARENT);
}

/// Build the per-layer composite paint. A new value is constructed for every
/// layer draw; when blending is disabled the mode is pinned to source-over.
pub fn composite_paint(opacity: f32, blend_mode: BlendMode, blending_enabled: bool) -> PixmapPaint {
    PixmapPaint {
        opacity: opacity.clamp(0.0, 1.0),
        blend_mode: if blending_enabled {
            blend_mode.to_skia()
        } else {
            tiny_skia::BlendMode::SourceOver
        },
        quality: FilterQuality::Nearest,
    }
}

/// Hash of a surface's pixel contents. Diagnostics and tests use this to
/// check that a cached composite is pixel-identical to a direct re-render.
pub fn surface_hash(surface: &Pixmap) -> u64 {
    let mut hasher = DefaultHasher::new();
    surface.data().hash(&mut hasher);
    hasher.finish()
}
