//! Action eligibility for holdings.
//!
//! Provides:
//! - `EligibilityGate`: pure deliver/consign permissions as a function of
//!   `(holding, now, coupon_count)`
//! - `CountdownPresenter`: `Idle → Ticking → Expired` state machine for the
//!   holding-period countdown
//! - `CountdownTimer`: per-second driver of a presenter, scoped to one open
//!   detail panel

pub mod countdown;
pub mod eligibility;
pub mod error;

pub use countdown::{CountdownConfig, CountdownPresenter, CountdownState, CountdownTimer};
pub use eligibility::{
    format_remaining, DeliveryMode, DenyReason, Eligibility, EligibilityGate, GateAction,
    GateConfig, Verdict, HOLDING_PERIOD_SECS,
};
pub use error::{GateError, GateResult};
