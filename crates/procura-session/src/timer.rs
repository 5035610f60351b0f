//! One-shot, cancellable timers with a strict "at most one armed" rule.
//!
//! The session keeps two of these: one for the token's absolute expiry and
//! one for the background grace period. Each [`TimerSlot`] holds at most
//! one armed timer; arming always cancels whatever was there first.
//!
//! # Stale timers
//!
//! Aborting a Tokio task only takes effect at its next `.await`. A timer
//! whose sleep has *just* finished may already be waiting on the session
//! lock when it gets cancelled. To make that harmless every arming bumps a
//! generation counter, and a firing timer must [`claim`](TimerSlot::claim)
//! its slot with the generation it was armed with. A replaced timer's
//! claim fails and it does nothing.
//!
//! Deadlines use Tokio's clock (`tokio::time::Instant`), so tests can
//! fast-forward with `tokio::time::pause()`.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, trace};

/// Longest delay a timer is armed for, the same horizon Tokio uses for
/// its own "far future". A token valid for centuries still gets a timer;
/// it is just due in thirty years, and `now + MAX_DELAY` cannot overflow.
const MAX_DELAY: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// Which of the two session timers a slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Fires at the token's `exp`.
    Expiry,
    /// Fires when the background grace period runs out.
    Grace,
}

/// Deadlines of the currently armed timers, for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArmedTimers {
    pub expiry: Option<Instant>,
    pub grace: Option<Instant>,
}

impl ArmedTimers {
    /// Number of pending timers (0, 1 or 2).
    pub fn count(&self) -> usize {
        usize::from(self.expiry.is_some()) + usize::from(self.grace.is_some())
    }
}

struct Armed {
    generation: u64,
    deadline: Instant,
    handle: JoinHandle<()>,
}

/// Holds zero or one armed timer of a given kind.
pub(crate) struct TimerSlot {
    kind: TimerKind,
    generation: u64,
    armed: Option<Armed>,
}

impl TimerSlot {
    pub(crate) fn new(kind: TimerKind) -> Self {
        Self {
            kind,
            generation: 0,
            armed: None,
        }
    }

    /// Cancels any armed timer, then arms a new one that runs the future
    /// built by `on_fire` after `after` has elapsed.
    ///
    /// `on_fire` receives the new timer's generation, which the future must
    /// pass back to [`claim`](Self::claim) before acting. A zero duration
    /// fires on the next scheduler turn.
    pub(crate) fn arm<F, Fut>(&mut self, after: Duration, on_fire: F)
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.generation += 1;

        let generation = self.generation;
        let after = after.min(MAX_DELAY);
        let deadline = Instant::now() + after;
        let fire = on_fire(generation);
        let handle = tokio::spawn(async move {
            time::sleep_until(deadline).await;
            fire.await;
        });

        debug!(
            kind = ?self.kind,
            generation,
            after_secs = after.as_secs(),
            "timer armed"
        );
        self.armed = Some(Armed {
            generation,
            deadline,
            handle,
        });
    }

    /// Aborts the armed timer, if any. Returns whether one was armed.
    pub(crate) fn cancel(&mut self) -> bool {
        match self.armed.take() {
            Some(armed) => {
                armed.handle.abort();
                trace!(kind = ?self.kind, generation = armed.generation, "timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Called from inside a firing timer. Empties the slot and returns
    /// `true` if `generation` is still the armed one; returns `false` for
    /// a timer that was cancelled or replaced in the meantime.
    ///
    /// The slot is emptied without aborting: the caller *is* that task.
    pub(crate) fn claim(&mut self, generation: u64) -> bool {
        match &self.armed {
            Some(armed) if armed.generation == generation => {
                self.armed = None;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.armed.as_ref().map(|a| a.deadline)
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}
