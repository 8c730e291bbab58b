//! Counts checked-out connections by purpose.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Why a connection was checked out, when the caller says so.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckOutReason {
    /// Pinned to a cursor.
    Cursor,
    /// Pinned to a transaction.
    Transaction,
}

/// Live count of tagged checkouts, reported in timeout errors.
#[derive(Debug, Default)]
pub struct CheckOutReasonCounter {
    cursors: AtomicUsize,
    transactions: AtomicUsize,
}

impl CheckOutReasonCounter {
    /// Create a counter with no checkouts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connections currently checked out for `reason`.
    #[must_use]
    pub fn count(&self, reason: CheckOutReason) -> usize {
        self.slot(reason).load(Ordering::SeqCst)
    }

    /// Record a checkout.
    pub fn increment(&self, reason: CheckOutReason) {
        self.slot(reason).fetch_add(1, Ordering::SeqCst);
    }

    /// Record a check-in. Never goes below zero.
    pub fn decrement(&self, reason: CheckOutReason) {
        let _ = self
            .slot(reason)
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    fn slot(&self, reason: CheckOutReason) -> &AtomicUsize {
        match reason {
            CheckOutReason::Cursor => &self.cursors,
            CheckOutReason::Transaction => &self.transactions,
        }
    }
}
