//! Holding-period countdown for an open detail panel.
//!
//! `CountdownPresenter` is the synchronous state machine; `CountdownTimer`
//! drives one presenter from a tokio task. A timer never outlives the panel
//! that opened it: `close()`, opening another holding and dropping the
//! timer all cancel the task.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use vault_core::{Clock, Holding, HoldingId};

use crate::eligibility::EligibilityGate;

/// Countdown configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountdownConfig {
    /// Recompute interval (ms). Default: 1,000.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

fn default_tick_interval_ms() -> u64 {
    1_000
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

/// Countdown state as seen by the panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CountdownState {
    Idle,
    /// Holding period still running. `remaining_secs` is floored, so it
    /// reads 0 during the last sub-second, matching
    /// `DenyReason::HoldingPeriod { remaining_secs: 0 }` from the gate.
    Ticking {
        holding: HoldingId,
        remaining_secs: i64,
    },
    /// Holding period over; the gate now allows consignment subject to
    /// coupons.
    Expired { holding: HoldingId },
}

/// `Idle → Ticking → Expired` state machine.
pub struct CountdownPresenter<C: Clock> {
    gate: EligibilityGate,
    clock: C,
    state: CountdownState,
    eligible_at: Option<DateTime<Utc>>,
}

impl<C: Clock> CountdownPresenter<C> {
    pub fn new(gate: EligibilityGate, clock: C) -> Self {
        Self {
            gate,
            clock,
            state: CountdownState::Idle,
            eligible_at: None,
        }
    }

    pub fn state(&self) -> &CountdownState {
        &self.state
    }

    pub fn is_ticking(&self) -> bool {
        matches!(self.state, CountdownState::Ticking { .. })
    }

    /// Panel opened for `holding`.
    ///
    /// Stays `Idle` when there is nothing to count down: pay time unknown,
    /// or a listing that blocks every action.
    pub fn open(&mut self, holding: &Holding) -> &CountdownState {
        self.eligible_at = None;
        self.state = CountdownState::Idle;

        if holding.consignment_state.blocks_actions() {
            return &self.state;
        }
        let Some(eligible_at) = self.gate.eligible_at(holding) else {
            return &self.state;
        };

        self.eligible_at = Some(eligible_at);
        self.state = Self::state_at(holding.id.clone(), eligible_at, self.clock.now());
        &self.state
    }

    /// Recompute remaining time. No-op unless ticking.
    pub fn tick(&mut self) -> &CountdownState {
        if let (CountdownState::Ticking { holding, .. }, Some(eligible_at)) =
            (&self.state, self.eligible_at)
        {
            self.state = Self::state_at(holding.clone(), eligible_at, self.clock.now());
        }
        &self.state
    }

    /// Panel closed.
    pub fn close(&mut self) -> &CountdownState {
        self.eligible_at = None;
        self.state = CountdownState::Idle;
        &self.state
    }

    fn state_at(holding: HoldingId, eligible_at: DateTime<Utc>, now: DateTime<Utc>) -> CountdownState {
        let left = (eligible_at - now).max(Duration::zero());
        if left > Duration::zero() {
            CountdownState::Ticking {
                holding,
                remaining_secs: left.num_seconds(),
            }
        } else {
            CountdownState::Expired { holding }
        }
    }
}

struct ActiveCountdown {
    holding: HoldingId,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

/// Drives a `CountdownPresenter` once per tick interval for the currently
/// open holding and publishes every state through a `watch` channel.
pub struct CountdownTimer<C: Clock + Clone + 'static> {
    gate: EligibilityGate,
    clock: C,
    tick_interval: StdDuration,
    active: Option<ActiveCountdown>,
}

impl<C: Clock + Clone + 'static> CountdownTimer<C> {
    pub fn new(gate: EligibilityGate, clock: C, config: &CountdownConfig) -> Self {
        Self {
            gate,
            clock,
            tick_interval: StdDuration::from_millis(config.tick_interval_ms.max(1)),
            active: None,
        }
    }

    /// Open the panel for `holding`, cancelling any previous countdown.
    ///
    /// Must be called within a tokio runtime.
    pub fn open(&mut self, holding: &Holding) -> watch::Receiver<CountdownState> {
        self.close();

        let mut presenter = CountdownPresenter::new(self.gate.clone(), self.clock.clone());
        let initial = presenter.open(holding).clone();
        let (tx, rx) = watch::channel(initial);
        let cancel = CancellationToken::new();

        let task = presenter.is_ticking().then(|| {
            let token = cancel.clone();
            let interval = self.tick_interval;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // First tick completes immediately.
                ticker.tick().await;

                loop {
                    tokio::select! {
                        _ = token.cancelled() => {
                            let _ = tx.send(presenter.close().clone());
                            break;
                        }
                        _ = ticker.tick() => {
                            let state = presenter.tick().clone();
                            let done = !presenter.is_ticking();
                            if tx.send(state).is_err() || done {
                                break;
                            }
                        }
                    }
                }
                debug!("Countdown task stopped");
            })
        });

        debug!(holding = %holding.id, ticking = task.is_some(), "Countdown opened");
        self.active = Some(ActiveCountdown {
            holding: holding.id.clone(),
            cancel,
            task,
        });
        rx
    }

    /// Close the panel and stop the timer.
    pub fn close(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            debug!(holding = %active.holding, "Countdown closed");
        }
    }

    /// Holding whose panel is open.
    pub fn holding(&self) -> Option<&HoldingId> {
        self.active.as_ref().map(|a| &a.holding)
    }

    /// True while a tick task is alive.
    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .and_then(|a| a.task.as_ref())
            .is_some_and(|task| !task.is_finished())
    }
}

impl<C: Clock + Clone + 'static> Drop for CountdownTimer<C> {
    fn drop(&mut self) {
        self.close();
    }
}
