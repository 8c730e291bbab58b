//! Pool lifecycle state machine.
//!
//! ```text
//! Uninitialized ──► Paused ◄──► Ready
//!                     │
//!                     └──────► ReadyNonPausable
//! ```
//!
//! Every state may move to `Disposed`, which is terminal. `Paused → Paused`
//! and `Ready → Ready` are accepted as no-ops so that repeated clears and
//! repeated `set_ready` calls are harmless.

use std::fmt;

use crate::error::PoolError;

/// Lifecycle state of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Created but not initialized.
    Uninitialized,
    /// Initialized, or cleared; checkouts fail.
    Paused,
    /// Serving checkouts.
    Ready,
    /// Serving checkouts and never paused by a clear (load balanced).
    ReadyNonPausable,
    /// Closed for good.
    Disposed,
}

impl State {
    /// Whether checkouts are served.
    #[must_use]
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Ready | Self::ReadyNonPausable)
    }

    fn can_transition_to(self, next: Self) -> bool {
        use State::{Disposed, Paused, Ready, ReadyNonPausable, Uninitialized};

        matches!(
            (self, next),
            (Uninitialized, Paused)
                | (Paused, Paused | Ready | ReadyNonPausable)
                | (Ready, Ready | Paused)
                | (ReadyNonPausable, ReadyNonPausable)
                | (_, Disposed)
        )
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "Uninitialized",
            Self::Paused => "Paused",
            Self::Ready => "Ready",
            Self::ReadyNonPausable => "ReadyNonPausable",
            Self::Disposed => "Disposed",
        };
        f.write_str(name)
    }
}

/// The current [`State`] plus the pool name used in errors.
///
/// Not synchronized; the pool keeps it behind a mutex so that validating and
/// writing a transition happen together.
#[derive(Debug, Clone)]
pub struct PoolState {
    state: State,
    pool: String,
}

impl PoolState {
    /// A new, uninitialized pool state.
    pub fn new(pool: impl Into<String>) -> Self {
        Self {
            state: State::Uninitialized,
            pool: pool.into(),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    /// Whether the pool has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.state == State::Disposed
    }

    /// Move to `next`, returning whether the state changed.
    pub fn transition(&mut self, next: State) -> Result<bool, PoolError> {
        if !self.state.can_transition_to(next) {
            self.ensure_not_disposed()?;
            return Err(PoolError::InvalidOperation(format!(
                "Invalid transition {} to {}.",
                self.state, next
            )));
        }
        let changed = self.state != next;
        self.state = next;
        Ok(changed)
    }

    /// Fail if the pool has been disposed.
    pub fn ensure_not_disposed(&self) -> Result<(), PoolError> {
        if self.is_disposed() {
            return Err(PoolError::Disposed {
                pool: self.pool.clone(),
            });
        }
        Ok(())
    }

    /// Fail unless checkouts are being served.
    pub fn ensure_ready(&self) -> Result<(), PoolError> {
        self.ensure_not_disposed()?;
        match self.state {
            State::Ready | State::ReadyNonPausable => Ok(()),
            State::Paused => Err(PoolError::Paused {
                endpoint: self.pool.clone(),
            }),
            state => Err(PoolError::InvalidOperation(format!(
                "ConnectionPool must be ready, but is in {state} state."
            ))),
        }
    }

    /// Fail unless the state is `ReadyNonPausable`.
    pub fn ensure_ready_non_pausable(&self) -> Result<(), PoolError> {
        self.ensure_not_disposed()?;
        if self.state != State::ReadyNonPausable {
            return Err(PoolError::InvalidOperation(format!(
                "ConnectionPool must be ready non pausable, but is in {} state.",
                self.state
            )));
        }
        Ok(())
    }

    /// Fail if the pool was never initialized.
    pub fn ensure_initialized(&self) -> Result<(), PoolError> {
        if self.state == State::Uninitialized {
            return Err(PoolError::NotInitialized(
                "ConnectionPool must be initialized.".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.state.fmt(f)
    }
}
