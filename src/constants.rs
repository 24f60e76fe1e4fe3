/// Cell size of the fixed hotspot diagnostics grid, in pixels.
pub const HOTSPOT_GRID_SIZE: f32 = 64.0;

/// Approximate frame interval of a 60 fps loop, in milliseconds. Frame ids
/// are derived as `elapsed_ms / FRAME_INTERVAL_MS`.
pub const FRAME_INTERVAL_MS: f64 = 16.67;
