//! Reusable byte buffers for frame reads and message encoding.
//!
//! A buffer is checked out with [`BufferPool::acquire`] and handed back when
//! the returned [`PooledBuffer`] is dropped, so every exit path of a receive
//! or send (early return, `?`, cancelled future) releases exactly once.
//!
//! Contents are not cleared between uses beyond what `resize` does; callers
//! only read the range they have written.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use lcg_core::wire::MAX_MESSAGE_SIZE;

/// Idle buffers kept by default.
const DEFAULT_MAX_IDLE: usize = 64;

/// Buffers that grew beyond this are dropped instead of retained.
const MAX_RETAINED_CAPACITY: usize = MAX_MESSAGE_SIZE;

/// Shared buffer pool. Cheap to clone; all clones share the same buffers.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    idle: Mutex<Vec<Vec<u8>>>,
    max_idle: usize,
    acquired: AtomicU64,
    released: AtomicU64,
}

/// Counters for the status endpoint and leak checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub acquired: u64,
    pub released: u64,
    pub idle: usize,
}

impl PoolStats {
    /// Buffers currently checked out.
    pub fn outstanding(&self) -> u64 {
        self.acquired.saturating_sub(self.released)
    }
}

impl BufferPool {
    pub fn new() -> Self {
        Self::with_max_idle(DEFAULT_MAX_IDLE)
    }

    pub fn with_max_idle(max_idle: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(Vec::new()),
                max_idle,
                acquired: AtomicU64::new(0),
                released: AtomicU64::new(0),
            }),
        }
    }

    /// Check out a buffer of exactly `size` bytes (capacity may be larger).
    pub fn acquire(&self, size: usize) -> PooledBuffer {
        let reused = {
            let mut idle = self.inner.lock_idle();
            idle.iter()
                .position(|b| b.capacity() >= size)
                .map(|i| idle.swap_remove(i))
        };

        let mut buf = reused.unwrap_or_else(|| Vec::with_capacity(size));
        buf.clear();
        buf.resize(size, 0);

        self.inner.acquired.fetch_add(1, Ordering::Relaxed);
        PooledBuffer {
            buf: Some(buf),
            pool: self.inner.clone(),
        }
    }

    /// Snapshot of the counters. Taken while other tasks acquire and release,
    /// so `released <= acquired` holds but the pair may already be stale.
    pub fn stats(&self) -> PoolStats {
        // Released first: every release it observes was preceded by an
        // acquire the second load is guaranteed to see.
        let released = self.inner.released.load(Ordering::Acquire);
        let acquired = self.inner.acquired.load(Ordering::Acquire);
        PoolStats {
            acquired,
            released,
            idle: self.inner.lock_idle().len(),
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolInner {
    fn lock_idle(&self) -> std::sync::MutexGuard<'_, Vec<Vec<u8>>> {
        // A panic while holding the lock cannot leave the list inconsistent.
        self.idle.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn release(&self, buf: Vec<u8>) {
        self.released.fetch_add(1, Ordering::Release);
        if buf.capacity() > MAX_RETAINED_CAPACITY {
            return;
        }
        let mut idle = self.lock_idle();
        if idle.len() < self.max_idle {
            idle.push(buf);
        }
    }
}

/// A checked-out buffer. Returned to its pool on drop.
pub struct PooledBuffer {
    buf: Option<Vec<u8>>,
    pool: Arc<PoolInner>,
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        // Only `drop` takes the buffer out.
        self.buf.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        self.buf.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}
