//! Recurring background checks
//!
//! A [`PollingSupervisor`] owns at most one timer. Starting it again cancels
//! the previous timer before the new one is installed.

mod keywords;

pub use keywords::start_keyword_discovery;

use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Supervisor lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollerState {
    #[default]
    Idle,
    Polling,
    Stopped,
}

struct PollTimer {
    generation: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct PollSlot {
    state: PollerState,
    timer: Option<PollTimer>,
    next_generation: u64,
}

impl PollSlot {
    fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel.cancel();
            self.state = PollerState::Stopped;
            tracing::debug!(generation = timer.generation, "Polling stopped");
        }
    }
}

/// Owns a single recurring check
#[derive(Default)]
pub struct PollingSupervisor {
    slot: Arc<Mutex<PollSlot>>,
}

impl PollingSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PollSlot> {
        lock_slot(&self.slot)
    }

    pub fn state(&self) -> PollerState {
        self.lock().state
    }

    /// Run `check` every `interval` until `stop_condition` holds for a result.
    ///
    /// The first check runs one interval after `start`. Failed checks are
    /// logged and retried on the next tick at the same interval.
    pub fn start<C, Fut, T, E, P>(&self, check: C, stop_condition: P, interval: Duration)
    where
        C: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
        P: Fn(&T) -> bool + Send + 'static,
    {
        let mut slot = self.lock();
        slot.stop();

        slot.next_generation += 1;
        let generation = slot.next_generation;
        let cancel = CancellationToken::new();
        slot.timer = Some(PollTimer {
            generation,
            cancel: cancel.clone(),
        });
        slot.state = PollerState::Polling;
        drop(slot);

        tracing::debug!(generation, interval_ms = %interval.as_millis(), "Polling started");
        tokio::spawn(poll_loop(
            Arc::downgrade(&self.slot),
            generation,
            cancel,
            check,
            stop_condition,
            Instant::now() + interval,
            interval,
        ));
    }

    /// Stop polling. No-op when nothing is running.
    pub fn stop(&self) {
        self.lock().stop();
    }
}

impl Drop for PollingSupervisor {
    fn drop(&mut self) {
        self.lock().stop();
    }
}

fn lock_slot(slot: &Mutex<PollSlot>) -> MutexGuard<'_, PollSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn poll_loop<C, Fut, T, E, P>(
    owner: Weak<Mutex<PollSlot>>,
    generation: u64,
    cancel: CancellationToken,
    check: C,
    stop_condition: P,
    first_tick: Instant,
    interval: Duration,
) where
    C: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: Fn(&T) -> bool,
{
    let mut ticker = tokio::time::interval_at(first_tick, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            outcome = check() => outcome,
        };

        let satisfied = match outcome {
            Ok(value) => stop_condition(&value),
            Err(e) => {
                tracing::warn!(generation, error = %e, "Poll check failed, retrying next tick");
                false
            }
        };

        if !keep_polling(&owner, generation, &cancel, satisfied) {
            return;
        }
    }
}

/// Decide after a tick whether the timer lives on, clearing the slot when
/// the stop condition was met.
fn keep_polling(
    owner: &Weak<Mutex<PollSlot>>,
    generation: u64,
    cancel: &CancellationToken,
    satisfied: bool,
) -> bool {
    // Supervisor dropped
    let Some(slot) = owner.upgrade() else {
        return false;
    };
    let mut slot = lock_slot(&slot);
    if cancel.is_cancelled() {
        return false;
    }
    if satisfied {
        if slot.timer.as_ref().is_some_and(|t| t.generation == generation) {
            slot.stop();
        }
        return false;
    }
    true
}
