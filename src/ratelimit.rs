//! Per-user sliding-window rate limiting.
//!
//! Checked by the runtime before a turn enters the agent loop, so an
//! over-budget user costs nothing downstream.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    time::{Duration, Instant},
};

/// Sliding-window limiter keyed by user.
pub struct RateLimiter {
    window: Duration,
    max_actions: usize,
    buckets: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_actions: usize) -> Self {
        Self {
            window,
            max_actions,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Per-minute budget, the usual configuration shape.
    pub fn per_minute(max_actions: usize) -> Self {
        Self::new(Duration::from_secs(60), max_actions)
    }

    /// Record an action for `key` if it fits the budget. Returns false
    /// (recording nothing) when the window is full.
    pub fn try_record(&self, key: &str) -> bool {
        let Ok(mut buckets) = self.buckets.lock() else {
            return true;
        };
        let now = Instant::now();
        let bucket = buckets.entry(key.to_string()).or_default();
        while let Some(&front) = bucket.front() {
            if now.duration_since(front) >= self.window {
                bucket.pop_front();
            } else {
                break;
            }
        }
        if bucket.len() >= self.max_actions {
            return false;
        }
        bucket.push_back(now);
        true
    }

    /// Remaining budget for `key` in the current window.
    pub fn remaining(&self, key: &str) -> usize {
        let Ok(mut buckets) = self.buckets.lock() else {
            return self.max_actions;
        };
        let now = Instant::now();
        match buckets.get_mut(key) {
            Some(bucket) => {
                while let Some(&front) = bucket.front() {
                    if now.duration_since(front) >= self.window {
                        bucket.pop_front();
                    } else {
                        break;
                    }
                }
                self.max_actions.saturating_sub(bucket.len())
            }
            None => self.max_actions,
        }
    }
}
