//! Dirty region tracking.
//!
//! Accumulates changed screen rectangles per frame and merges overlapping
//! ones so the compositor pays for a bounded number of redraw areas instead
//! of one per mutation. Retired regions go into a short ring history that
//! feeds the hotspot diagnostics.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use crate::constants::{FRAME_INTERVAL_MS, HOTSPOT_GRID_SIZE};
use crate::settings::RegionSettings;
use crate::stats::RegionStats;
use crate::types::Rectangle;

/// A rectangle known to have changed and requiring redraw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirtyRegion {
    pub rect: Rectangle,
    /// Milliseconds since the tracker was created.
    pub timestamp_ms: u64,
    /// Approximate 60 fps frame counter at insertion time.
    pub frame_id: u64,
}

/// Visit counter for one cell of the fixed hotspot grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hotspot {
    pub grid_x: i32,
    pub grid_y: i32,
    pub count: u32,
}

/// One frame's worth of retired regions.
#[derive(Debug, Clone)]
pub struct FrameHistoryEntry {
    pub frame_id: u64,
    pub timestamp_ms: u64,
    pub regions: Vec<DirtyRegion>,
}

/// Per-frame dirty region accumulator with merge heuristics.
#[derive(Debug)]
pub struct DirtyRegionTracker {
    settings: RegionSettings,
    /// Live set, owned exclusively until `clear_regions` retires it.
    regions: Vec<DirtyRegion>,
    /// Result of the last `merge_regions` call.
    merged: Vec<DirtyRegion>,
    history: VecDeque<FrameHistoryEntry>,
    hotspots: HashMap<(i32, i32), u32>,
    stats: RegionStats,
    epoch: Instant,
}

impl Default for DirtyRegionTracker {
    fn default() -> Self {
        Self::new(RegionSettings::default())
    }
}

impl DirtyRegionTracker {
    pub fn new(settings: RegionSettings) -> Self {
        Self {
            settings,
            regions: Vec::new(),
            merged: Vec::new(),
            history: VecDeque::new(),
            hotspots: HashMap::new(),
            stats: RegionStats::default(),
            epoch: Instant::now(),
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.settings.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Approximate 60 fps frame counter.
    pub fn current_frame_id(&self) -> u64 {
        (self.now_ms() as f64 / FRAME_INTERVAL_MS) as u64
    }

    /// Record a changed rectangle.
    ///
    /// The rectangle is grown by `expansion_factor` (centered) to absorb
    /// anti-aliasing edge artifacts, then floored to `min_region_size` per
    /// dimension. No-op when the tracker is disabled.
    pub fn add_dirty_region(&mut self, x: f32, y: f32, width: f32, height: f32) {
        if !self.settings.enabled {
            return;
        }

        let expanded_w = width * self.settings.expansion_factor;
        let expanded_h = height * self.settings.expansion_factor;
        let x = x - (expanded_w - width) / 2.0;
        let y = y - (expanded_h - height) / 2.0;

        let rect = Rectangle::new(
            x,
            y,
            expanded_w.max(self.settings.min_region_size),
            expanded_h.max(self.settings.min_region_size),
        );

        let cell = (
            (rect.x / HOTSPOT_GRID_SIZE).floor() as i32,
            (rect.y / HOTSPOT_GRID_SIZE).floor() as i32,
        );
        *self.hotspots.entry(cell).or_insert(0) += 1;

        self.regions.push(DirtyRegion {
            rect,
            timestamp_ms: self.now_ms(),
            frame_id: self.current_frame_id(),
        });
        self.stats.total_regions += 1;
    }

    /// Merge regions whose overlap ratio exceeds the merge threshold.
    ///
    /// Single pass in insertion order: the first region of a cluster absorbs
    /// every later region it sufficiently overlaps, including ones it only
    /// reaches after growing. The result is capped at `max_region_count`;
    /// once the cap is hit, remaining live regions are left out of this
    /// call's result rather than blowing up the compositor's work list.
    pub fn merge_regions(&mut self) -> Vec<DirtyRegion> {
        let mut absorbed = vec![false; self.regions.len()];
        let mut merged: Vec<DirtyRegion> = Vec::new();

        for i in 0..self.regions.len() {
            if absorbed[i] {
                continue;
            }
            if merged.len() >= self.settings.max_region_count {
                break;
            }

            let mut region = self.regions[i];
            for j in (i + 1)..self.regions.len() {
                if absorbed[j] {
                    continue;
                }
                let other = self.regions[j];
                if overlap_ratio(&region.rect, &other.rect) > self.settings.merge_threshold {
                    // Bounding rectangle, not the union polygon: may over-redraw
                    // slightly, keeps the merge O(1).
                    region.rect = region.rect.union(&other.rect);
                    absorbed[j] = true;
                    self.stats.merged_regions += 1;
                }
            }
            merged.push(region);
        }

        self.merged = merged.clone();
        merged
    }

    /// The result of the last `merge_regions` call.
    pub fn merged_regions(&self) -> &[DirtyRegion] {
        &self.merged
    }

    /// Live (uncleared) regions.
    pub fn regions(&self) -> &[DirtyRegion] {
        &self.regions
    }

    /// Retire the live set into the bounded ring history and empty it.
    pub fn clear_regions(&mut self) {
        if !self.regions.is_empty() && self.settings.history_size > 0 {
            while self.history.len() >= self.settings.history_size {
                self.history.pop_front();
            }
            self.history.push_back(FrameHistoryEntry {
                frame_id: self.current_frame_id(),
                timestamp_ms: self.now_ms(),
                regions: std::mem::take(&mut self.regions),
            });
        }
        self.regions.clear();
        self.merged.clear();
    }

    /// Linear scan of the live set.
    pub fn is_point_dirty(&self, x: f32, y: f32) -> bool {
        self.regions.iter().any(|r| r.rect.contains(x, y))
    }

    pub fn history(&self) -> impl Iterator<Item = &FrameHistoryEntry> {
        self.history.iter()
    }

    /// Decoded hotspot counters. No ordering guarantee.
    pub fn hotspots(&self) -> Vec<Hotspot> {
        self.hotspots
            .iter()
            .map(|(&(grid_x, grid_y), &count)| Hotspot {
                grid_x,
                grid_y,
                count,
            })
            .collect()
    }

    /// Hotspot counters grow unbounded otherwise; diagnostics-only data.
    pub fn reset_hotspots(&mut self) {
        self.hotspots.clear();
    }

    pub fn stats(&self) -> RegionStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = RegionStats::default();
    }

    /// Caller-populated counter: a redraw was skipped thanks to caching.
    pub fn record_skipped_redraw(&mut self) {
        self.stats.skipped_redraws += 1;
    }

    /// Caller-populated counter: pixels that did not need re-rendering.
    pub fn add_pixels_saved(&mut self, pixels: f64) {
        self.stats.pixels_saved += pixels;
    }

    /// Caller-populated figure, e.g. frame-time delta measured by the host.
    pub fn set_performance_gain(&mut self, gain: f64) {
        self.stats.performance_gain = gain;
    }
}

/// Overlap area divided by union area, in [0, 1].
fn overlap_ratio(a: &Rectangle, b: &Rectangle) -> f32 {
    let overlap = a.intersection_area(b);
    if overlap <= 0.0 {
        return 0.0;
    }
    let union = a.area() + b.area() - overlap;
    if union <= 0.0 { 0.0 } else { overlap / union }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> DirtyRegionTracker {
        DirtyRegionTracker::default()
    }

    #[test]
    fn small_regions_are_floored_to_min_size() {
        let mut t = tracker();
        t.add_dirty_region(0.0, 0.0, 10.0, 10.0);

        let region = t.regions()[0];
        assert_eq!(region.rect.width, 32.0);
        assert_eq!(region.rect.height, 32.0);
    }

    #[test]
    fn expansion_is_centered() {
        let mut t = tracker();
        t.add_dirty_region(100.0, 100.0, 100.0, 100.0);

        let rect = t.regions()[0].rect;
        // 100 * 1.1 = 110, centered: origin shifts by half the growth.
        assert!((rect.width - 110.0).abs() < 1e-3);
        assert!((rect.x - 95.0).abs() < 1e-3);
        assert!((rect.y - 95.0).abs() < 1e-3);
    }

    #[test]
    fn every_stored_region_respects_floor() {
        let mut t = tracker();
        for (w, h) in [(0.0, 0.0), (1.0, 500.0), (31.0, 31.0), (64.0, 2.0)] {
            t.add_dirty_region(10.0, 10.0, w, h);
        }
        for r in t.regions() {
            assert!(r.rect.width >= 32.0);
            assert!(r.rect.height >= 32.0);
        }
    }

    #[test]
    fn overlapping_regions_merge() {
        let mut t = tracker();
        t.add_dirty_region(0.0, 0.0, 100.0, 100.0);
        t.add_dirty_region(20.0, 20.0, 100.0, 100.0);

        let merged = t.merge_regions();
        assert_eq!(merged.len(), 1);
        assert_eq!(t.stats().merged_regions, 1);
    }

    #[test]
    fn distant_regions_stay_separate() {
        let mut t = tracker();
        t.add_dirty_region(0.0, 0.0, 50.0, 50.0);
        t.add_dirty_region(500.0, 500.0, 50.0, 50.0);

        assert_eq!(t.merge_regions().len(), 2);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut t = tracker();
        t.add_dirty_region(0.0, 0.0, 100.0, 100.0);
        t.add_dirty_region(30.0, 30.0, 100.0, 100.0);
        t.add_dirty_region(60.0, 0.0, 100.0, 100.0);

        let first: Vec<Rectangle> = t.merge_regions().iter().map(|r| r.rect).collect();

        // Re-feed the merged output through a fresh tracker: nothing left to
        // shrink or grow.
        let mut again = tracker();
        again.settings.expansion_factor = 1.0;
        for rect in &first {
            again.add_dirty_region(rect.x, rect.y, rect.width, rect.height);
        }
        let second: Vec<Rectangle> = again.merge_regions().iter().map(|r| r.rect).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn merge_caps_at_max_region_count() {
        let mut t = DirtyRegionTracker::new(RegionSettings {
            max_region_count: 3,
            ..RegionSettings::default()
        });
        for i in 0..10 {
            t.add_dirty_region(i as f32 * 1000.0, 0.0, 50.0, 50.0);
        }

        assert_eq!(t.merge_regions().len(), 3);
    }

    #[test]
    fn clear_moves_live_set_into_history() {
        let mut t = tracker();
        t.add_dirty_region(0.0, 0.0, 50.0, 50.0);
        t.merge_regions();
        t.clear_regions();

        assert!(t.regions().is_empty());
        assert!(t.merged_regions().is_empty());
        assert_eq!(t.history().count(), 1);
    }

    #[test]
    fn history_ring_is_bounded() {
        let mut t = DirtyRegionTracker::new(RegionSettings {
            history_size: 5,
            ..RegionSettings::default()
        });
        for _ in 0..20 {
            t.add_dirty_region(0.0, 0.0, 50.0, 50.0);
            t.clear_regions();
        }
        assert_eq!(t.history().count(), 5);
    }

    #[test]
    fn point_queries_hit_live_regions_only() {
        let mut t = tracker();
        t.add_dirty_region(100.0, 100.0, 50.0, 50.0);
        assert!(t.is_point_dirty(120.0, 120.0));
        assert!(!t.is_point_dirty(500.0, 500.0));

        t.clear_regions();
        assert!(!t.is_point_dirty(120.0, 120.0));
    }

    #[test]
    fn hotspots_count_repeated_cells() {
        let mut t = tracker();
        for _ in 0..3 {
            t.add_dirty_region(130.0, 130.0, 40.0, 40.0);
        }
        t.add_dirty_region(1000.0, 1000.0, 40.0, 40.0);

        let hotspots = t.hotspots();
        assert_eq!(hotspots.len(), 2);
        let hottest = hotspots.iter().max_by_key(|h| h.count).unwrap();
        assert_eq!(hottest.count, 3);

        t.reset_hotspots();
        assert!(t.hotspots().is_empty());
    }

    #[test]
    fn disabled_tracker_ignores_regions() {
        let mut t = tracker();
        t.set_enabled(false);
        t.add_dirty_region(0.0, 0.0, 100.0, 100.0);
        assert!(t.regions().is_empty());
        assert_eq!(t.stats().total_regions, 0);
    }

    #[test]
    fn caller_populated_stats_accumulate() {
        let mut t = tracker();
        t.record_skipped_redraw();
        t.record_skipped_redraw();
        t.add_pixels_saved(640.0 * 480.0);
        t.set_performance_gain(0.4);

        let stats = t.stats();
        assert_eq!(stats.skipped_redraws, 2);
        assert_eq!(stats.pixels_saved, 640.0 * 480.0);
        assert_eq!(stats.performance_gain, 0.4);

        t.reset_stats();
        assert_eq!(t.stats().skipped_redraws, 0);
    }
}
