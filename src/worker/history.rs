//! Per-asset memory carried between cycles

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// Trailing 24h-volume observations per asset
pub struct VolumeHistory {
    capacity: usize,
    samples: Mutex<HashMap<String, VecDeque<f64>>>,
}

impl VolumeHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            samples: Mutex::new(HashMap::new()),
        }
    }

    /// Return the history seen so far, then append `volume`
    ///
    /// Non-finite or non-positive volumes are not recorded.
    pub fn observe(&self, asset_id: &str, volume: f64) -> Vec<f64> {
        let mut samples = self.samples.lock();
        let history = samples.entry(asset_id.to_string()).or_default();
        let previous: Vec<f64> = history.iter().copied().collect();

        if volume.is_finite() && volume > 0.0 {
            history.push_back(volume);
            while history.len() > self.capacity {
                history.pop_front();
            }
        }
        previous
    }

    pub fn len(&self, asset_id: &str) -> usize {
        self.samples.lock().get(asset_id).map_or(0, |h| h.len())
    }
}

/// Venue counts remembered for a while, since listings change slowly
pub struct VenueCounts {
    ttl: Duration,
    counts: Mutex<HashMap<String, (u32, DateTime<Utc>)>>,
}

impl VenueCounts {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            counts: Mutex::new(HashMap::new()),
        }
    }

    /// Fresh count for the asset, if any
    pub fn get(&self, asset_id: &str, now: DateTime<Utc>) -> Option<u32> {
        self.counts
            .lock()
            .get(asset_id)
            .filter(|(_, at)| now - *at < self.ttl)
            .map(|(count, _)| *count)
    }

    pub fn insert(&self, asset_id: &str, count: u32, now: DateTime<Utc>) {
        self.counts.lock().insert(asset_id.to_string(), (count, now));
    }
}
