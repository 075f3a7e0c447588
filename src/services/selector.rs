//! Random image selection with a bounded anti-repeat window.

use crate::models::image::Image;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::VecDeque;
use tracing::{debug, info};

/// Insertion-ordered set of recently shown image ids, capped at `capacity`.
#[derive(Debug, Clone)]
pub struct RecentlyShown {
    order: VecDeque<String>,
    capacity: usize,
}

impl RecentlyShown {
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.order.iter().any(|shown| shown == id)
    }

    /// Record `id`; an id already present keeps its original position.
    /// Oldest entries are evicted once the set grows past capacity.
    pub fn insert(&mut self, id: &str) {
        if !self.contains(id) {
            self.order.push_back(id.to_string());
        }
        while self.order.len() > self.capacity {
            self.order.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[cfg(test)]
    pub fn ids(&self) -> Vec<String> {
        self.order.iter().cloned().collect()
    }
}

/// Process-wide random selector.
///
/// The filter-pick-record sequence runs under one lock so concurrent
/// requests cannot lose insertions or evictions.
pub struct RandomSelector {
    recent: Mutex<RecentlyShown>,
    max_recent: usize,
}

impl RandomSelector {
    pub fn new(max_recent: usize) -> Self {
        Self {
            recent: Mutex::new(RecentlyShown::new(max_recent)),
            max_recent,
        }
    }

    /// Snapshot of the recently shown ids, oldest first.
    #[cfg(test)]
    pub fn recently_shown(&self) -> Vec<String> {
        self.recent.lock().ids()
    }

    pub fn select(&self, pool: &[Image]) -> Option<Image> {
        self.select_with(pool, &mut rand::thread_rng())
    }

    /// Pick one image from `pool`, avoiding the recently shown window.
    ///
    /// Pools no larger than the window are drawn from directly. When every
    /// member has been shown recently the window is reset and the whole
    /// pool is used. Returns `None` only for an empty pool.
    pub fn select_with<R: Rng + ?Sized>(&self, pool: &[Image], rng: &mut R) -> Option<Image> {
        if pool.is_empty() {
            return None;
        }

        let mut recent = self.recent.lock();

        let candidates: Vec<&Image> = if pool.len() <= self.max_recent {
            pool.iter().collect()
        } else {
            let unseen: Vec<&Image> = pool.iter().filter(|img| !recent.contains(&img.id)).collect();
            if unseen.is_empty() {
                info!(
                    pool = pool.len(),
                    "all images shown recently, resetting recent list"
                );
                recent.clear();
                pool.iter().collect()
            } else {
                unseen
            }
        };

        let chosen = candidates[rng.gen_range(0..candidates.len())].clone();
        recent.insert(&chosen.id);

        debug!(
            id = %chosen.id,
            recent = recent.len(),
            pool = pool.len(),
            "selected image"
        );
        Some(chosen)
    }
}
