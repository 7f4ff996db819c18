use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crate::foundation::error::{MediaError, MediaResult};

#[derive(Debug)]
struct Gate {
    in_use: Mutex<usize>,
    freed: Condvar,
    capacity: usize,
}

/// Counting admission gate for expensive operations.
///
/// Cloning is cheap and every clone shares the same slots.
#[derive(Clone, Debug)]
pub struct Throttle {
    gate: Arc<Gate>,
}

/// One held slot. Dropping it releases the slot, including during unwinding.
#[derive(Debug)]
pub struct Permit {
    gate: Arc<Gate>,
}

impl Throttle {
    /// Gate admitting at most `capacity` holders at once.
    pub fn new(capacity: usize) -> MediaResult<Self> {
        if capacity == 0 {
            return Err(MediaError::validation("throttle capacity must be >= 1"));
        }
        Ok(Self {
            gate: Arc::new(Gate {
                in_use: Mutex::new(0),
                freed: Condvar::new(),
                capacity,
            }),
        })
    }

    /// Maximum concurrent holders.
    pub fn capacity(&self) -> usize {
        self.gate.capacity
    }

    /// Slots currently held.
    pub fn in_use(&self) -> usize {
        *lock(&self.gate.in_use)
    }

    /// Block until a slot is free and take it.
    pub fn acquire(&self) -> Permit {
        let mut in_use = lock(&self.gate.in_use);
        while *in_use >= self.gate.capacity {
            in_use = self
                .gate
                .freed
                .wait(in_use)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        *in_use += 1;
        Permit {
            gate: Arc::clone(&self.gate),
        }
    }

    /// Take a slot if one is free right now.
    pub fn try_acquire(&self) -> Option<Permit> {
        let mut in_use = lock(&self.gate.in_use);
        if *in_use >= self.gate.capacity {
            return None;
        }
        *in_use += 1;
        Some(Permit {
            gate: Arc::clone(&self.gate),
        })
    }

    /// Run `f` while holding a slot.
    pub fn run<T>(&self, f: impl FnOnce() -> T) -> T {
        let _permit = self.acquire();
        f()
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        let mut in_use = lock(&self.gate.in_use);
        *in_use = in_use.saturating_sub(1);
        drop(in_use);
        self.gate.freed.notify_one();
    }
}

// The counter stays consistent across a panic in a holder, so poisoning is ignored.
fn lock(m: &Mutex<usize>) -> MutexGuard<'_, usize> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
#[path = "../../tests/unit/process/throttle.rs"]
mod tests;
