use std::collections::BTreeMap;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::{
    config::{DEFAULT_END_FRAME, DEFAULT_START_FRAME},
    utils::allocator::ObjectId,
};

/// Simulated transform of one active body at a cached frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedTransform {
    pub object: ObjectId,
    pub pos: Vec3,
    pub orn: Quat,
}

/// Per-frame record of simulation results.
///
/// The frame range doubles as the simulated range of the world: nothing is
/// stepped at or before `start_frame`, and evaluation clamps to `end_frame`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PointCache {
    pub start_frame: i32,
    pub end_frame: i32,
    /// Set whenever stored frames no longer match the scene setup.
    pub outdated: bool,
    #[serde(skip)]
    frames: BTreeMap<i32, Vec<CachedTransform>>,
}

impl Default for PointCache {
    fn default() -> Self {
        Self::new(DEFAULT_START_FRAME, DEFAULT_END_FRAME)
    }
}

impl PointCache {
    pub fn new(start_frame: i32, end_frame: i32) -> Self {
        Self {
            start_frame,
            end_frame: end_frame.max(start_frame),
            outdated: true,
            frames: BTreeMap::new(),
        }
    }

    pub fn mark_outdated(&mut self) {
        self.outdated = true;
    }

    /// Drops every stored frame and clears the outdated mark.
    pub fn reset(&mut self) {
        self.frames.clear();
        self.outdated = false;
    }

    /// Stores a frame. Frames outside the cache range are ignored.
    pub fn write(&mut self, frame: i32, transforms: Vec<CachedTransform>) -> bool {
        if frame < self.start_frame || frame > self.end_frame {
            return false;
        }
        self.frames.insert(frame, transforms);
        true
    }

    /// Stored transforms for `frame`, unless the cache is outdated.
    pub fn read(&self, frame: i32) -> Option<&[CachedTransform]> {
        if self.outdated {
            return None;
        }
        self.frames.get(&frame).map(Vec::as_slice)
    }

    pub fn contains_frame(&self, frame: i32) -> bool {
        self.frames.contains_key(&frame)
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::allocator::{GenerationalId, ObjectId};

    fn sample(z: f32) -> Vec<CachedTransform> {
        vec![CachedTransform {
            object: ObjectId(GenerationalId::new(0, 0)),
            pos: Vec3::new(0.0, 0.0, z),
            orn: Quat::IDENTITY,
        }]
    }

    #[test]
    fn outdated_cache_hides_frames() {
        let mut cache = PointCache::new(1, 10);
        cache.reset();
        assert!(cache.write(2, sample(1.0)));
        assert!(cache.read(2).is_some());

        cache.mark_outdated();
        assert!(cache.read(2).is_none());
        assert!(cache.contains_frame(2));

        cache.reset();
        assert_eq!(cache.frame_count(), 0);
    }

    #[test]
    fn frames_outside_range_are_rejected() {
        let mut cache = PointCache::new(1, 10);
        assert!(!cache.write(0, sample(0.0)));
        assert!(!cache.write(11, sample(0.0)));
        assert!(cache.write(10, sample(0.0)));
    }
}
