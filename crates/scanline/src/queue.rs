// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded ring of completed profiles with a blocking consumer side.
//!
//! The receiver task produces, arbitrary caller threads consume. When the
//! ring is full the oldest profile is evicted; a slow consumer observes a
//! gap, never back-pressure on the socket. Waiters are released early when
//! the producing receiver stops, so nothing blocks across a disconnect.

use crate::profile::Profile;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Capacity of the ring per scan head.
pub const PROFILE_QUEUE_MAX: usize = 1_000;

struct QueueInner {
    ring: VecDeque<Profile>,
    /// False while the owning receiver is stopped; wakes blocked waiters.
    producer_running: bool,
}

/// Mutex-protected profile ring with a condition variable signalled on
/// enqueue and on producer state change.
pub struct ProfileQueue {
    inner: Mutex<QueueInner>,
    cond: Condvar,
}

impl Default for ProfileQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                ring: VecDeque::with_capacity(PROFILE_QUEUE_MAX),
                producer_running: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Append a completed profile, evicting the oldest when full.
    pub fn push(&self, profile: Profile) {
        let mut inner = self.lock();
        if inner.ring.len() >= PROFILE_QUEUE_MAX {
            inner.ring.pop_front();
        }
        inner.ring.push_back(profile);
        self.cond.notify_all();
    }

    /// Current depth, non-blocking.
    pub fn available(&self) -> usize {
        self.lock().ring.len()
    }

    /// Block until at least `count` profiles are queued, the producer
    /// stops, or `timeout` elapses. Returns the depth at wake-up.
    pub fn wait_until_available(&self, count: usize, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock();

        while inner.ring.len() < count && inner.producer_running {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _result) = self
                .cond
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            inner = guard;
            // Spurious wake-ups fall through to the re-check above.
        }

        inner.ring.len()
    }

    /// Hand out up to `count` profiles in FIFO order.
    pub fn pop(&self, count: usize) -> Vec<Profile> {
        let mut inner = self.lock();
        let take = count.min(inner.ring.len());
        inner.ring.drain(..take).collect()
    }

    /// Discard everything queued.
    pub fn clear(&self) {
        self.lock().ring.clear();
    }

    /// Mark the producing receiver as running or stopped. Stopping wakes
    /// every blocked waiter.
    pub fn set_producer_running(&self, running: bool) {
        let mut inner = self.lock();
        inner.producer_running = running;
        self.cond.notify_all();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn profile(timestamp_ns: u64) -> Profile {
        Profile::stub(timestamp_ns)
    }

    #[test]
    fn depth_never_exceeds_capacity_and_evicts_oldest() {
        let queue = ProfileQueue::new();
        queue.set_producer_running(true);

        for n in 0..1_200 {
            queue.push(profile(n));
            assert!(queue.available() <= PROFILE_QUEUE_MAX);
        }
        assert_eq!(queue.available(), PROFILE_QUEUE_MAX);

        // The first 200 produced are gone; the survivor range is 200..1200.
        let drained = queue.pop(PROFILE_QUEUE_MAX);
        assert_eq!(drained.len(), PROFILE_QUEUE_MAX);
        assert_eq!(drained.first().map(|p| p.timestamp_ns), Some(200));
        assert_eq!(drained.last().map(|p| p.timestamp_ns), Some(1_199));
    }

    #[test]
    fn pop_is_fifo_and_clamped() {
        let queue = ProfileQueue::new();
        for n in 0..5 {
            queue.push(profile(n));
        }
        let got = queue.pop(3);
        assert_eq!(got.iter().map(|p| p.timestamp_ns).collect::<Vec<_>>(), vec![0, 1, 2]);
        let rest = queue.pop(100);
        assert_eq!(rest.len(), 2);
        assert!(queue.pop(1).is_empty());
    }

    #[test]
    fn wait_returns_early_once_count_reached() {
        let queue = Arc::new(ProfileQueue::new());
        queue.set_producer_running(true);

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for n in 0..3 {
                    thread::sleep(Duration::from_millis(20));
                    queue.push(profile(n));
                }
            })
        };

        let depth = queue.wait_until_available(3, Duration::from_secs(5));
        assert!(depth >= 3);
        producer.join().ok();
    }

    #[test]
    fn wait_times_out_with_partial_depth() {
        let queue = ProfileQueue::new();
        queue.set_producer_running(true);
        queue.push(profile(0));

        let start = Instant::now();
        let depth = queue.wait_until_available(5, Duration::from_millis(100));
        assert_eq!(depth, 1);
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn producer_stop_releases_waiters() {
        let queue = Arc::new(ProfileQueue::new());
        queue.set_producer_running(true);

        let stopper = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                queue.set_producer_running(false);
            })
        };

        let start = Instant::now();
        let depth = queue.wait_until_available(10, Duration::from_secs(30));
        assert_eq!(depth, 0);
        assert!(start.elapsed() < Duration::from_secs(5));
        stopper.join().ok();
    }
}
