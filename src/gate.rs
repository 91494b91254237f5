//! Counting gate bounding concurrently in-flight resolutions.
//!
//! Backed by `tokio::sync::Semaphore`, whose wait queue is FIFO: a released
//! permit goes to the longest waiter before the free count is incremented.
//! The gate also tracks how many permits are held and the peak ever held.

use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Semaphore, SemaphorePermit};

#[derive(Debug)]
pub struct ConcurrencyGate {
    semaphore: Semaphore,
    permits: usize,
    held: AtomicUsize,
    peak: AtomicUsize,
}

/// A held permit. Dropping it releases the permit.
#[derive(Debug)]
pub struct GatePermit<'a> {
    _permit: SemaphorePermit<'a>,
    gate: &'a ConcurrencyGate,
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        self.gate.held.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrencyGate {
    /// A gate with `permits` slots. Zero is treated as one.
    pub fn new(permits: usize) -> Self {
        let permits = permits.max(1);
        Self {
            semaphore: Semaphore::new(permits),
            permits,
            held: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Wait for a free permit.
    pub async fn acquire(&self) -> GatePermit<'_> {
        // The semaphore is owned by the gate and never closed.
        let permit = match self.semaphore.acquire().await {
            Ok(p) => p,
            Err(_) => unreachable!("gate semaphore closed"),
        };
        let now_held = self.held.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_held, Ordering::SeqCst);
        GatePermit {
            _permit: permit,
            gate: self,
        }
    }

    /// Take a permit only if one is free right now.
    pub fn try_acquire(&self) -> Option<GatePermit<'_>> {
        let permit = self.semaphore.try_acquire().ok()?;
        let now_held = self.held.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_held, Ordering::SeqCst);
        Some(GatePermit {
            _permit: permit,
            gate: self,
        })
    }

    pub fn permits(&self) -> usize {
        self.permits
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn held(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }

    /// Most permits ever held at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}
