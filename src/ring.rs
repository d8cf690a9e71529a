//! C5 data half: the fixed-size point ring used for replay to new peers.
//!
//! An addition over the base `cketchbook` source, since there is no original
//! C counterpart to imitate. Generic over the ring capacity so a small-`N`
//! eviction sequence can be exercised directly in tests, while the server
//! itself always instantiates `N = POINT_COUNT`.

use crate::config::POINT_COUNT;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    None,
    Add,
    Remove,
}

#[derive(Debug, Clone, Copy)]
pub struct Point {
    pub action: Action,
    pub client_id: u64,
    pub path_id: u64,
    pub x: f64,
    pub y: f64,
}

impl Point {
    const EMPTY: Point = Point {
        action: Action::None,
        client_id: 0,
        path_id: 0,
        x: 0.0,
        y: 0.0,
    };

    /// Wire form: `"<action>, <client_id>, <path_id>, <x>, <y>"`.
    pub fn encode(&self) -> String {
        let action = match self.action {
            Action::Add => 1,
            Action::Remove => 2,
            Action::None => 0,
        };
        format!(
            "{action}, {client_id}, {path_id}, {x:.6}, {y:.6}",
            action = action,
            client_id = self.client_id,
            path_id = self.path_id,
            x = self.x,
            y = self.y
        )
    }
}

/// Fixed-size ring of the last `N` points added, for replay on upgrade.
/// The production alias is [`PointRing`] (`N = POINT_COUNT`).
pub struct FixedPointRing<const N: usize> {
    slots: Box<[Point; N]>,
    cursor: usize,
}

pub type PointRing = FixedPointRing<POINT_COUNT>;

impl<const N: usize> Default for FixedPointRing<N> {
    fn default() -> Self {
        Self {
            slots: Box::new([Point::EMPTY; N]),
            cursor: 0,
        }
    }
}

impl<const N: usize> FixedPointRing<N> {
    /// Record a newly-drawn point. If it evicts a slot that held an `Add`,
    /// that point's `Remove` echo is returned first.
    pub fn push_add(&mut self, client_id: u64, path_id: u64, x: f64, y: f64) -> Option<Point> {
        let evicted = self.slots[self.cursor];
        let remove = match evicted.action {
            Action::Add => Some(Point {
                action: Action::Remove,
                ..evicted
            }),
            _ => None,
        };

        self.slots[self.cursor] = Point {
            action: Action::Add,
            client_id,
            path_id,
            x,
            y,
        };
        self.cursor = (self.cursor + 1) % N;

        remove
    }

    /// Iterate the live (non-`None`) points, in ring order, for replay.
    pub fn iter_live(&self) -> impl Iterator<Item = &Point> {
        self.slots.iter().filter(|p| p.action != Action::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_exceeds_point_count() {
        let mut ring = PointRing::default();
        for i in 0..(POINT_COUNT * 3) {
            ring.push_add(0, i as u64, 0.0, 0.0);
        }
        assert_eq!(ring.iter_live().count(), POINT_COUNT);
    }

    #[test]
    fn eviction_emits_remove_with_overwritten_payload() {
        let mut ring = PointRing::default();
        for i in 0..POINT_COUNT {
            let evicted = ring.push_add(7, i as u64, 1.0, 2.0);
            assert!(evicted.is_none());
        }
        // The next push wraps around and evicts slot 0 (path_id = 0).
        let evicted = ring.push_add(7, 999, 3.0, 4.0).expect("eviction");
        assert_eq!(evicted.action, Action::Remove);
        assert_eq!(evicted.client_id, 7);
        assert_eq!(evicted.path_id, 0);
        assert_eq!(evicted.x, 1.0);
        assert_eq!(evicted.y, 2.0);
    }

    #[test]
    fn encode_matches_wire_form() {
        let p = Point {
            action: Action::Add,
            client_id: 0,
            path_id: 7,
            x: 100.0,
            y: 200.0,
        };
        assert_eq!(p.encode(), "1, 0, 7, 100.000000, 200.000000");
    }

    /// With a ring capacity of 2: three successive Adds from client 0 yield
    /// broadcasts Add p1, Add p2, Remove p1, Add p3, and a peer joining
    /// afterwards replays only p2 and p3.
    #[test]
    fn small_ring_evicts_oldest_add() {
        let mut ring = FixedPointRing::<2>::default();

        let mut broadcasts = Vec::new();
        for path_id in [1u64, 2, 3] {
            if let Some(evicted) = ring.push_add(0, path_id, 0.0, 0.0) {
                broadcasts.push(evicted.encode());
            }
            broadcasts.push(
                Point {
                    action: Action::Add,
                    client_id: 0,
                    path_id,
                    x: 0.0,
                    y: 0.0,
                }
                .encode(),
            );
        }

        assert_eq!(
            broadcasts,
            vec![
                "1, 0, 1, 0.000000, 0.000000", // Add p1
                "1, 0, 2, 0.000000, 0.000000", // Add p2
                "2, 0, 1, 0.000000, 0.000000", // Remove p1
                "1, 0, 3, 0.000000, 0.000000", // Add p3
            ]
        );

        let replay: Vec<u64> = ring.iter_live().map(|p| p.path_id).collect();
        assert_eq!(replay, vec![3, 2]); // slot order after wraparound: p3 at slot 0, p2 at slot 1
    }
}
