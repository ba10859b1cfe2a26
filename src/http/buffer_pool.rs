//! Shared free-list of body buffers.
//!
//! Large fixed-length bodies are read into buffers rented from this pool.
//! A `PooledBuffer` hands its storage back when dropped, so a response that
//! is discarded (or fails half-way) never leaks its buffer.

use std::ops::Deref;
use std::sync::{Arc, Mutex};

/// Free-list of reusable byte buffers.
#[derive(Debug, Clone)]
pub struct BufferPool {
    free: Arc<Mutex<Vec<Vec<u8>>>>,
    max_retained: usize,
    threshold: usize,
}

impl BufferPool {
    /// Create a pool that retains at most `max_retained` free buffers and is
    /// meant for bodies larger than `threshold` bytes.
    pub fn new(max_retained: usize, threshold: usize) -> Self {
        Self {
            free: Arc::new(Mutex::new(Vec::new())),
            max_retained,
            threshold,
        }
    }

    /// Bodies above this many bytes should use the pool.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Number of free buffers currently retained.
    pub fn available(&self) -> usize {
        self.free.lock().map(|free| free.len()).unwrap_or(0)
    }

    /// Rent an empty buffer with at least `capacity` bytes reserved.
    pub fn rent(&self, capacity: usize) -> PooledBuffer {
        let recycled = self.free.lock().ok().and_then(|mut free| free.pop());
        let mut data = recycled.unwrap_or_default();
        data.clear();
        data.reserve(capacity);
        PooledBuffer {
            data,
            pool: Arc::clone(&self.free),
            max_retained: self.max_retained,
        }
    }
}

/// A buffer borrowed from a [`BufferPool`], returned on drop.
#[derive(Debug)]
pub struct PooledBuffer {
    data: Vec<u8>,
    pool: Arc<Mutex<Vec<Vec<u8>>>>,
    max_retained: usize,
}

impl PooledBuffer {
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl AsRef<[u8]> for PooledBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        if let Ok(mut free) = self.pool.lock() {
            if free.len() < self.max_retained {
                free.push(data);
            }
        }
    }
}
