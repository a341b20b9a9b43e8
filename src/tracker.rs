use crate::Detection;

pub const DEFAULT_MAX_DISTANCE: f32 = 50.0;
pub const DEFAULT_MAX_DISAPPEARED: u32 = 10;

/// A detection that has been assigned a persistent identity.
///
/// Lives in the tracker's table for its whole lifetime; the renderer only
/// ever sees it as a shared reference for a single frame.
#[derive(Debug, Clone, Copy)]
pub struct TrackedObject {
    pub id: u32,
    pub detection: Detection,
    disappeared: u32,
}

impl TrackedObject {
    fn new(id: u32, detection: Detection) -> Self {
        Self {
            id,
            detection,
            disappeared: 0,
        }
    }

    /// Consecutive frames this object has gone unmatched.
    #[inline]
    pub fn disappeared(&self) -> u32 {
        self.disappeared
    }
}

/// Greedy nearest-neighbor centroid tracker.
///
/// Objects are matched to detections in table insertion order, each taking
/// the closest unused detection within `max_distance`. When two objects tie
/// for the same detection the earlier-registered one wins; this is known,
/// documented behavior rather than globally optimal assignment. Ids are
/// issued monotonically starting at 0 and never reused.
///
/// Not thread-safe: one instance services exactly one job sequentially.
pub struct CentroidTracker {
    objects: Vec<TrackedObject>,
    next_id: u32,
    max_distance: f32,
    max_disappeared: u32,
}

impl CentroidTracker {
    pub fn new() -> Self {
        Self::with_params(DEFAULT_MAX_DISTANCE, DEFAULT_MAX_DISAPPEARED)
    }

    pub fn with_params(max_distance: f32, max_disappeared: u32) -> Self {
        Self {
            objects: Vec::new(),
            next_id: 0,
            max_distance,
            max_disappeared,
        }
    }

    #[inline]
    pub fn objects(&self) -> &[TrackedObject] {
        &self.objects
    }

    /// Folds one frame's detections into the identity table and returns the
    /// live set, stale entries included.
    pub fn update(&mut self, detections: &[Detection]) -> &[TrackedObject] {
        if detections.is_empty() {
            for obj in self.objects.iter_mut() {
                obj.disappeared += 1;
            }
            self.expire();
            return &self.objects;
        }

        if self.objects.is_empty() {
            for det in detections {
                self.register(*det);
            }
            return &self.objects;
        }

        let mut used = vec![false; detections.len()];

        for obj in self.objects.iter_mut() {
            let mut min_distance = f32::INFINITY;
            let mut best_idx = None;

            for (idx, det) in detections.iter().enumerate() {
                if used[idx] {
                    continue;
                }

                let distance = obj.detection.distance_to(det);
                if distance < min_distance && distance < self.max_distance {
                    min_distance = distance;
                    best_idx = Some(idx);
                }
            }

            match best_idx {
                Some(idx) => {
                    obj.detection = detections[idx];
                    obj.disappeared = 0;
                    used[idx] = true;
                }
                None => obj.disappeared += 1,
            }
        }

        // Removal is deferred until the assignment scan is complete.
        self.expire();

        for (idx, det) in detections.iter().enumerate() {
            if !used[idx] {
                self.register(*det);
            }
        }

        &self.objects
    }

    fn register(&mut self, detection: Detection) {
        self.objects.push(TrackedObject::new(self.next_id, detection));
        self.next_id += 1;
    }

    fn expire(&mut self) {
        let max_disappeared = self.max_disappeared;
        self.objects.retain(|obj| obj.disappeared <= max_disappeared);
    }
}

impl Default for CentroidTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32, y: f32) -> Detection {
        Detection::new(x, y, 20.0, 20.0, 1.0)
    }

    #[test]
    fn registers_in_detection_order() {
        let mut tracker = CentroidTracker::new();
        let objects = tracker.update(&[det(10.0, 10.0), det(500.0, 500.0)]);

        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].id, 0);
        assert_eq!(objects[1].id, 1);
        assert_eq!(objects[0].detection.x, 10.0);
        assert_eq!(objects[1].detection.x, 500.0);
    }

    #[test]
    fn stationary_object_keeps_its_id() {
        let mut tracker = CentroidTracker::new();
        tracker.update(&[det(100.0, 100.0)]);

        for _ in 0..50 {
            let objects = tracker.update(&[det(100.0, 100.0)]);
            assert_eq!(objects.len(), 1);
            assert_eq!(objects[0].id, 0);
        }
    }

    #[test]
    fn stale_object_survives_exactly_max_disappeared_updates() {
        let mut tracker = CentroidTracker::new();
        tracker.update(&[det(100.0, 100.0)]);

        for n in 1..=DEFAULT_MAX_DISAPPEARED {
            let objects = tracker.update(&[]);
            assert_eq!(objects.len(), 1, "should still be live after {} misses", n);
            assert_eq!(objects[0].disappeared(), n);
        }

        assert!(tracker.update(&[]).is_empty());
    }

    #[test]
    fn far_detection_spawns_a_new_id() {
        let mut tracker = CentroidTracker::new();
        tracker.update(&[det(100.0, 100.0)]);

        // 60 px away, past the 50 px gate: must not be matched.
        let objects = tracker.update(&[det(160.0, 100.0)]);
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].id, 0);
        assert_eq!(objects[0].disappeared(), 1);
        assert_eq!(objects[1].id, 1);
    }

    #[test]
    fn detection_at_the_gate_is_not_matched() {
        let mut tracker = CentroidTracker::new();
        tracker.update(&[det(100.0, 100.0)]);

        // Exactly max_distance: the gate is strict.
        let objects = tracker.update(&[det(150.0, 100.0)]);
        assert_eq!(objects.len(), 2);
    }

    #[test]
    fn no_detection_matches_two_objects() {
        let mut tracker = CentroidTracker::new();
        tracker.update(&[det(100.0, 100.0), det(130.0, 100.0)]);

        // One detection between the two objects; only the first may take it.
        let objects = tracker.update(&[det(115.0, 100.0)]);
        let matched: Vec<_> = objects.iter().filter(|o| o.disappeared() == 0).collect();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, 0);
        assert_eq!(matched[0].detection.x, 115.0);
    }

    #[test]
    fn tie_breaks_to_first_seen_object() {
        let mut tracker = CentroidTracker::new();
        tracker.update(&[det(100.0, 100.0), det(140.0, 100.0)]);

        // Equidistant from both; insertion order decides.
        let objects = tracker.update(&[det(120.0, 100.0)]);
        assert_eq!(objects[0].id, 0);
        assert_eq!(objects[0].detection.x, 120.0);
        assert_eq!(objects[1].disappeared(), 1);
    }

    #[test]
    fn match_clears_disappearance_count() {
        let mut tracker = CentroidTracker::new();
        tracker.update(&[det(100.0, 100.0)]);
        tracker.update(&[]);
        tracker.update(&[]);

        let objects = tracker.update(&[det(105.0, 100.0)]);
        assert_eq!(objects[0].disappeared(), 0);
    }

    #[test]
    fn expired_ids_are_never_reused() {
        let mut tracker = CentroidTracker::new();
        tracker.update(&[det(100.0, 100.0)]);

        for _ in 0..=DEFAULT_MAX_DISAPPEARED {
            tracker.update(&[]);
        }
        assert!(tracker.objects().is_empty());

        let objects = tracker.update(&[det(100.0, 100.0)]);
        assert_eq!(objects[0].id, 1);
    }

    #[test]
    fn handles_many_detections_without_panic() {
        let mut tracker = CentroidTracker::new();
        let dets: Vec<_> = (0..100).map(|i| det(i as f32 * 60.0, 0.0)).collect();
        assert_eq!(tracker.update(&dets).len(), 100);
        assert_eq!(tracker.update(&dets).len(), 100);
        assert_eq!(tracker.update(&[]).len(), 100);
    }
}
