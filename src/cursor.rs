use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::metrics;

/// Highest block height reported by any upstream response.
///
/// Shared by every stage of a run. The value only ever moves forward:
/// concurrent `observe` calls with out-of-order heights never make it regress.
#[derive(Debug, Default)]
pub struct Cursor {
    current_block: AtomicU64,
}

impl Cursor {
    pub fn new() -> Self {
        Self {
            current_block: AtomicU64::new(0),
        }
    }

    /// Raise the watermark to `block` if it is higher than the current value.
    ///
    /// Returns the watermark after the update.
    pub fn observe(&self, block: u64) -> u64 {
        let previous = self.current_block.fetch_max(block, Ordering::AcqRel);
        if block > previous {
            debug!(from = previous, to = block, "Cursor advanced");
            metrics::set_cursor_block(block);
            block
        } else {
            previous
        }
    }

    /// Current watermark (0 until the first upstream response).
    pub fn get(&self) -> u64 {
        self.current_block.load(Ordering::Acquire)
    }
}
