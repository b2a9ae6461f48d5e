//! Suppresses repeated emissions of one ongoing violation across frames.
//!
//! A fingerprint is the rider's person-box center plus when (and in which frame)
//! it was admitted. Eviction is lazy, on each `admit` call; there is no timer.
//! State is stream-local and must never be shared between streams.

use std::collections::VecDeque;
use std::time::{Duration, SystemTime};

use crate::correlate::Violation;
use crate::geometry::Point;

pub const DEFAULT_DEDUP_DISTANCE_PX: f32 = 40.0;
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(5);
pub const DEFAULT_DEDUP_MAX_ENTRIES: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DedupWindow {
    /// Wall-clock gap between `detected_at` timestamps.
    Time(Duration),
    /// Gap in frame sequence numbers.
    Frames(u64),
}

#[derive(Clone, Debug, PartialEq)]
pub struct DedupConfig {
    /// Max distance between person-box centers for two violations to match.
    pub distance_px: f32,
    pub window: DedupWindow,
    /// Hard cap on remembered fingerprints; oldest go first.
    pub max_entries: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            distance_px: DEFAULT_DEDUP_DISTANCE_PX,
            window: DedupWindow::Time(DEFAULT_DEDUP_WINDOW),
            max_entries: DEFAULT_DEDUP_MAX_ENTRIES,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Fingerprint {
    center: Point,
    created_at: SystemTime,
    frame_seq: u64,
}

#[derive(Debug)]
pub struct Deduplicator {
    config: DedupConfig,
    recent: VecDeque<Fingerprint>,
}

impl Deduplicator {
    pub fn new(config: DedupConfig) -> Self {
        Self {
            config,
            recent: VecDeque::new(),
        }
    }

    /// Returns true and remembers the violation if no recent fingerprint matches.
    ///
    /// A suppressed violation does not refresh the matching fingerprint, so an
    /// event still visible after the window closes is admitted again.
    pub fn admit(&mut self, violation: &Violation) -> bool {
        self.evict(violation);

        let center = violation.person_box.center();
        let duplicate = self.recent.iter().any(|fp| {
            fp.center.distance(center) <= self.config.distance_px && self.within_window(fp, violation)
        });
        if duplicate {
            return false;
        }

        while self.recent.len() >= self.config.max_entries.max(1) {
            self.recent.pop_front();
        }
        self.recent.push_back(Fingerprint {
            center,
            created_at: violation.detected_at,
            frame_seq: violation.frame_seq,
        });
        true
    }

    pub fn len(&self) -> usize {
        self.recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }

    fn within_window(&self, fp: &Fingerprint, v: &Violation) -> bool {
        match self.config.window {
            DedupWindow::Time(window) => gap(fp.created_at, v.detected_at) <= window,
            DedupWindow::Frames(frames) => fp.frame_seq.abs_diff(v.frame_seq) <= frames,
        }
    }

    /// Drops fingerprints older than the window relative to `v`. Entries from
    /// the future (clock stepped back) are kept until the clock catches up.
    fn evict(&mut self, v: &Violation) {
        let window = self.config.window;
        self.recent.retain(|fp| match window {
            DedupWindow::Time(window) => match v.detected_at.duration_since(fp.created_at) {
                Ok(age) => age <= window,
                Err(_) => true,
            },
            DedupWindow::Frames(frames) => v.frame_seq.saturating_sub(fp.frame_seq) <= frames,
        });
    }
}

fn gap(a: SystemTime, b: SystemTime) -> Duration {
    match b.duration_since(a) {
        Ok(d) => d,
        Err(e) => e.duration(),
    }
}
