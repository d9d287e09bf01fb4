//! Per-connection counters
//!
//! Updated by the reader and writer tasks, read through
//! [`Connection::stats`](crate::Connection::stats).

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared by both loops
#[derive(Debug, Default)]
pub struct ConnectionStats {
    frames_received: AtomicU64,
    events_dispatched: AtomicU64,
    dispatch_misses: AtomicU64,
    decode_errors: AtomicU64,
    frames_sent: AtomicU64,
    close_frames_sent: AtomicU64,
}

/// Point-in-time copy of [`ConnectionStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames_received: u64,
    pub events_dispatched: u64,
    pub dispatch_misses: u64,
    pub decode_errors: u64,
    pub frames_sent: u64,
    pub close_frames_sent: u64,
}

impl ConnectionStats {
    pub(crate) fn frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn event_dispatched(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dispatch_missed(&self) {
        self.dispatch_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn decode_failed(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn close_frame_sent(&self) {
        self.close_frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            dispatch_misses: self.dispatch_misses.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            close_frames_sent: self.close_frames_sent.load(Ordering::Relaxed),
        }
    }
}
