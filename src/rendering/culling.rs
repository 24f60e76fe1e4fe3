//! Viewport culling over a uniform spatial grid.
//!
//! Broad phase: bucket every drawable into the grid cells its AABB overlaps
//! and collect the cells touched by the margin-expanded viewport (the 2D
//! frustum). Narrow phase: precise AABB-vs-frustum test per candidate. Cost
//! scales with grid occupancy near the viewport, not with the total object
//! count.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;

use crate::settings::CullingSettings;
use crate::stats::CullingStats;
use crate::types::Rectangle;

/// A drawable registered with the culler.
///
/// The caller owns the meaning of `bounds` and `metadata`; the culler owns
/// the cull state (`visible`, grid membership).
#[derive(Debug)]
pub struct RenderableObject {
    pub id: String,
    pub bounds: Rectangle,
    pub metadata: Option<serde_json::Value>,
    /// Outcome of the last narrow-phase test this object participated in.
    pub visible: bool,
    grid_cells: HashSet<(i32, i32)>,
}

impl RenderableObject {
    /// Grid cells this object is currently bucketed into.
    pub fn grid_cells(&self) -> &HashSet<(i32, i32)> {
        &self.grid_cells
    }
}

/// One frame of culling history for adaptive tuning by the host.
#[derive(Debug, Clone, Copy)]
pub struct CullingFrame {
    pub culling_time_ms: f64,
    pub efficiency: f64,
}

/// Spatial-grid viewport culler.
#[derive(Debug, Default)]
pub struct ViewportCuller {
    settings: CullingSettings,
    viewport: Rectangle,
    /// Viewport expanded by the culling margin on all sides.
    frustum: Rectangle,
    objects: HashMap<String, RenderableObject>,
    grid: HashMap<(i32, i32), HashSet<String>>,
    /// Valid until the viewport or any object changes.
    visible_cache: Option<Vec<String>>,
    performance_history: VecDeque<CullingFrame>,
    stats: CullingStats,
}

impl ViewportCuller {
    pub fn new(settings: CullingSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.settings.enabled = enabled;
        self.visible_cache = None;
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Store the viewport and derive the frustum.
    ///
    /// Any viewport change may change any object's visibility, so the whole
    /// visible cache is dropped.
    pub fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.viewport = Rectangle::new(x, y, width, height);
        self.frustum = self.viewport.expand(self.settings.culling_margin);
        self.visible_cache = None;
    }

    pub fn viewport(&self) -> Rectangle {
        self.viewport
    }

    pub fn frustum(&self) -> Rectangle {
        self.frustum
    }

    /// Register a drawable and bucket it into every grid cell its AABB
    /// overlaps. Re-registering an existing id re-buckets it with the new
    /// bounds. No-op when disabled.
    pub fn add_object(
        &mut self,
        id: impl Into<String>,
        bounds: Rectangle,
        metadata: Option<serde_json::Value>,
    ) {
        if !self.settings.enabled {
            return;
        }
        let id = id.into();
        self.unassign_from_grid(&id);

        let grid_cells = self.assign_to_grid(&id, &bounds);
        self.objects.insert(
            id.clone(),
            RenderableObject {
                id,
                bounds,
                metadata,
                visible: true,
                grid_cells,
            },
        );
        self.visible_cache = None;
    }

    /// Remove a drawable and de-index it from every grid cell it occupies.
    ///
    /// This is the correctness-critical inverse of `add_object`: a dangling
    /// grid reference would keep dead ids in the candidate set forever.
    pub fn remove_object(&mut self, id: &str) -> bool {
        self.unassign_from_grid(id);
        let removed = self.objects.remove(id).is_some();
        if removed {
            self.visible_cache = None;
        }
        removed
    }

    /// Move a drawable: de-index, store the new bounds, re-bucket.
    pub fn update_object(&mut self, id: &str, bounds: Rectangle) -> bool {
        if !self.objects.contains_key(id) {
            return false;
        }
        self.unassign_from_grid(id);
        let grid_cells = self.assign_to_grid(id, &bounds);
        if let Some(object) = self.objects.get_mut(id) {
            object.bounds = bounds;
            object.grid_cells = grid_cells;
        }
        self.visible_cache = None;
        true
    }

    pub fn object(&self, id: &str) -> Option<&RenderableObject> {
        self.objects.get(id)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Compute the visible set for the current frustum.
    ///
    /// Broad phase unions the ids bucketed in frustum-overlapping cells;
    /// narrow phase runs the strict AABB test per candidate and updates its
    /// `visible` flag. Objects the broad phase never touches are implicitly
    /// culled. When the culler is disabled, every registered id is returned
    /// (fail open: prefer drawing too much).
    pub fn cull_objects(&mut self) -> Vec<String> {
        if !self.settings.enabled {
            let mut all: Vec<String> = self.objects.keys().cloned().collect();
            all.sort_unstable();
            return all;
        }
        if let Some(cached) = &self.visible_cache {
            return cached.clone();
        }

        let start = Instant::now();

        let (min_gx, min_gy, max_gx, max_gy) = self.cell_range(&self.frustum);
        let mut candidates: HashSet<String> = HashSet::new();
        for gx in min_gx..=max_gx {
            for gy in min_gy..=max_gy {
                if let Some(ids) = self.grid.get(&(gx, gy)) {
                    candidates.extend(ids.iter().cloned());
                }
            }
        }

        let mut visible: Vec<String> = Vec::with_capacity(candidates.len());
        for id in candidates {
            if let Some(object) = self.objects.get_mut(&id) {
                object.visible = object.bounds.intersects(&self.frustum);
                if object.visible {
                    visible.push(id);
                }
            }
        }
        visible.sort_unstable();

        self.record_frame(start.elapsed().as_secs_f64() * 1000.0, visible.len());
        self.visible_cache = Some(visible.clone());
        visible
    }

    fn record_frame(&mut self, culling_time_ms: f64, visible_count: usize) {
        let total = self.objects.len();
        let culled = total.saturating_sub(visible_count);
        let efficiency = if total == 0 {
            0.0
        } else {
            culled as f64 / total as f64
        };

        self.stats = CullingStats {
            total_objects: total,
            visible_objects: visible_count,
            culled_objects: culled,
            culling_efficiency: efficiency,
            culling_time_ms,
        };

        if self.settings.history_size > 0 {
            while self.performance_history.len() >= self.settings.history_size {
                self.performance_history.pop_front();
            }
            self.performance_history.push_back(CullingFrame {
                culling_time_ms,
                efficiency,
            });
        }
    }

    pub fn stats(&self) -> CullingStats {
        self.stats
    }

    pub fn performance_history(&self) -> impl Iterator<Item = &CullingFrame> {
        self.performance_history.iter()
    }

    /// Cell index range `[min..=max]` per axis covered by `rect`.
    fn cell_range(&self, rect: &Rectangle) -> (i32, i32, i32, i32) {
        let gs = self.settings.grid_size;
        (
            (rect.x / gs).floor() as i32,
            (rect.y / gs).floor() as i32,
            (rect.right() / gs).floor() as i32,
            (rect.bottom() / gs).floor() as i32,
        )
    }

    fn assign_to_grid(&mut self, id: &str, bounds: &Rectangle) -> HashSet<(i32, i32)> {
        let (min_gx, min_gy, max_gx, max_gy) = self.cell_range(bounds);
        let mut cells = HashSet::new();
        for gx in min_gx..=max_gx {
            for gy in min_gy..=max_gy {
                self.grid.entry((gx, gy)).or_default().insert(id.to_owned());
                cells.insert((gx, gy));
            }
        }
        cells
    }

    fn unassign_from_grid(&mut self, id: &str) {
        let Some(object) = self.objects.get(id) else {
            return;
        };
        let cells: Vec<(i32, i32)> = object.grid_cells.iter().copied().collect();
        for cell in cells {
            if let Some(ids) = self.grid.get_mut(&cell) {
                ids.remove(id);
                if ids.is_empty() {
                    self.grid.remove(&cell);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn culler() -> ViewportCuller {
        let mut c = ViewportCuller::new(CullingSettings::default());
        c.set_viewport(0.0, 0.0, 800.0, 600.0);
        c
    }

    #[test]
    fn frustum_is_viewport_plus_margin() {
        let c = culler();
        let f = c.frustum();
        assert_eq!(f.x, -50.0);
        assert_eq!(f.y, -50.0);
        assert_eq!(f.width, 900.0);
        assert_eq!(f.height, 700.0);
    }

    #[test]
    fn object_inside_viewport_is_visible() {
        let mut c = culler();
        c.add_object("A", Rectangle::new(100.0, 100.0, 50.0, 50.0), None);
        assert_eq!(c.cull_objects(), vec!["A".to_owned()]);
        assert!(c.object("A").unwrap().visible);
    }

    #[test]
    fn distant_object_is_culled() {
        let mut c = culler();
        c.add_object("far", Rectangle::new(5000.0, 5000.0, 50.0, 50.0), None);
        assert!(c.cull_objects().is_empty());
    }

    #[test]
    fn object_within_margin_is_visible() {
        let mut c = culler();
        // Right of the viewport but inside the 50 px margin.
        c.add_object("edge", Rectangle::new(820.0, 100.0, 20.0, 20.0), None);
        assert_eq!(c.cull_objects(), vec!["edge".to_owned()]);
    }

    #[test]
    fn touching_the_frustum_edge_is_culled() {
        let mut c = culler();
        // Frustum right edge is at 850; this object starts exactly there.
        c.add_object("touch", Rectangle::new(850.0, 0.0, 30.0, 30.0), None);
        assert!(c.cull_objects().is_empty());
        // One pixel in and it shows up.
        c.update_object("touch", Rectangle::new(849.0, 0.0, 30.0, 30.0));
        assert_eq!(c.cull_objects(), vec!["touch".to_owned()]);
    }

    #[test]
    fn viewport_move_changes_visible_set() {
        let mut c = culler();
        c.add_object("A", Rectangle::new(100.0, 100.0, 50.0, 50.0), None);
        assert_eq!(c.cull_objects().len(), 1);

        c.set_viewport(2000.0, 2000.0, 800.0, 600.0);
        assert!(c.cull_objects().is_empty());
        assert!(!c.object("A").unwrap().visible);
    }

    #[test]
    fn remove_object_leaves_no_grid_residue() {
        let mut c = culler();
        // Spans several cells.
        c.add_object("big", Rectangle::new(0.0, 0.0, 450.0, 350.0), None);
        assert!(!c.grid.is_empty());

        assert!(c.remove_object("big"));
        assert!(c.grid.is_empty());
        assert!(c.cull_objects().is_empty());
        assert!(!c.remove_object("big"));
    }

    #[test]
    fn update_rebuckets_without_duplicates() {
        let mut c = culler();
        c.add_object("m", Rectangle::new(0.0, 0.0, 50.0, 50.0), None);
        assert!(c.update_object("m", Rectangle::new(250.0, 250.0, 50.0, 50.0)));

        // Old cell dropped, object present in exactly its new cells.
        for (cell, ids) in &c.grid {
            assert!(c.object("m").unwrap().grid_cells().contains(cell));
            assert_eq!(ids.len(), 1);
        }
        let total_memberships: usize = c.grid.values().map(|ids| ids.len()).sum();
        assert_eq!(total_memberships, c.object("m").unwrap().grid_cells().len());
    }

    #[test]
    fn update_unknown_object_is_rejected() {
        let mut c = culler();
        assert!(!c.update_object("ghost", Rectangle::new(0.0, 0.0, 10.0, 10.0)));
    }

    #[test]
    fn disabled_culler_returns_everything() {
        let mut c = culler();
        c.add_object("A", Rectangle::new(100.0, 100.0, 50.0, 50.0), None);
        c.add_object("far", Rectangle::new(9000.0, 9000.0, 50.0, 50.0), None);
        c.set_enabled(false);

        let visible = c.cull_objects();
        assert_eq!(visible, vec!["A".to_owned(), "far".to_owned()]);
    }

    #[test]
    fn stats_report_culling_efficiency() {
        let mut c = culler();
        c.add_object("A", Rectangle::new(100.0, 100.0, 50.0, 50.0), None);
        c.add_object("B", Rectangle::new(5000.0, 100.0, 50.0, 50.0), None);
        c.add_object("C", Rectangle::new(100.0, 5000.0, 50.0, 50.0), None);
        c.add_object("D", Rectangle::new(5000.0, 5000.0, 50.0, 50.0), None);
        c.cull_objects();

        let stats = c.stats();
        assert_eq!(stats.total_objects, 4);
        assert_eq!(stats.visible_objects, 1);
        assert_eq!(stats.culled_objects, 3);
        assert_eq!(stats.culling_efficiency, 0.75);
    }

    #[test]
    fn performance_history_is_bounded() {
        let mut c = ViewportCuller::new(CullingSettings {
            history_size: 4,
            ..CullingSettings::default()
        });
        c.set_viewport(0.0, 0.0, 800.0, 600.0);
        c.add_object("A", Rectangle::new(0.0, 0.0, 10.0, 10.0), None);
        for i in 0..10 {
            // Each viewport change invalidates the cache and forces a real pass.
            c.set_viewport(i as f32, 0.0, 800.0, 600.0);
            c.cull_objects();
        }
        assert_eq!(c.performance_history().count(), 4);
    }

    #[test]
    fn repeated_culls_reuse_the_cached_set() {
        let mut c = culler();
        c.add_object("A", Rectangle::new(100.0, 100.0, 50.0, 50.0), None);
        let first = c.cull_objects();
        let second = c.cull_objects();
        assert_eq!(first, second);
        // History grows once per real pass, not per call.
        assert_eq!(c.performance_history().count(), 1);
    }

    #[test]
    fn metadata_rides_along() {
        let mut c = culler();
        c.add_object(
            "hud",
            Rectangle::new(10.0, 10.0, 32.0, 32.0),
            Some(serde_json::json!({ "kind": "sprite", "tier": 2 })),
        );
        let meta = c.object("hud").unwrap().metadata.as_ref().unwrap();
        assert_eq!(meta["kind"], "sprite");
    }
}
