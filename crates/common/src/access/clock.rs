use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of the ledger's current block height
pub trait BlockClock: Send + Sync + Debug {
    fn height(&self) -> u64;
}

/// A clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn new(height: u64) -> Self {
        Self(AtomicU64::new(height))
    }

    pub fn set(&self, height: u64) {
        self.0.store(height, Ordering::SeqCst);
    }

    /// Move forward by `blocks`, returning the new height.
    ///
    /// Returns `None` and leaves the height alone if it would overflow.
    pub fn advance(&self, blocks: u64) -> Option<u64> {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |h| h.checked_add(blocks))
            .ok()
            .map(|h| h + blocks)
    }
}

impl BlockClock for ManualClock {
    fn height(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}
