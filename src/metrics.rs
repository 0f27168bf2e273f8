// src/metrics.rs
use std::sync::atomic::{AtomicUsize, Ordering};

/// Shared request counters, cache-line aligned to keep the hot atomics off
/// each other's lines.
#[repr(C, align(64))]
pub struct ServerMetrics {
    pub requests: AtomicUsize,
    pub active_connections: AtomicUsize,
    pub bytes_written: AtomicUsize,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            requests: AtomicUsize::new(0),
            active_connections: AtomicUsize::new(0),
            bytes_written: AtomicUsize::new(0),
        }
    }

    pub fn inc_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_connection(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_connection(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn add_bytes(&self, bytes: usize) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}
