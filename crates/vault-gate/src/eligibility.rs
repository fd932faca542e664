//! Deliver/consign eligibility gates.
//!
//! Every check here is a pure function of the holding, the current time
//! and the coupon balance. Callers re-run the gate at action time; a
//! verdict computed at render time is only advisory.
//!
//! # Check order
//!
//! ## Deliver
//! 1. listing_locked - Active or Sold blocks everything
//! 2. already_delivered
//! 3. delivery_incomplete - delivery source missing, cannot confirm
//! 4. purchase_time_unknown
//! 5. holding_period - 48h since pay time, inclusive
//!
//! ## Consign
//! 1. listing_locked
//! 2. previously_consigned - re-listing a pulled holding is not allowed
//! 3. already_delivered
//! 4. listing_history_incomplete - consignment source missing
//! 5. purchase_time_unknown
//! 6. holding_period
//! 7. no_coupon

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use vault_core::{ConsignmentState, DeliveryState, Holding};

use crate::error::{GateError, GateResult};

/// Holding period before a purchase can be delivered or consigned: 48 hours.
pub const HOLDING_PERIOD_SECS: i64 = 48 * 3600;

/// Upper bound accepted for a configured holding period: 365 days.
pub const MAX_HOLDING_PERIOD_SECS: i64 = 365 * 24 * 3600;

/// Gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Holding period in seconds. Default: 172,800 (48 hours).
    #[serde(default = "default_holding_period_secs")]
    pub holding_period_secs: i64,
}

fn default_holding_period_secs() -> i64 {
    HOLDING_PERIOD_SECS
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            holding_period_secs: default_holding_period_secs(),
        }
    }
}

impl GateConfig {
    pub fn validate(&self) -> GateResult<()> {
        if self.holding_period_secs < 0 {
            return Err(GateError::ConfigError(format!(
                "holding_period_secs must not be negative, got {}",
                self.holding_period_secs
            )));
        }
        if self.holding_period_secs > MAX_HOLDING_PERIOD_SECS {
            return Err(GateError::ConfigError(format!(
                "holding_period_secs must be at most {MAX_HOLDING_PERIOD_SECS}, got {}",
                self.holding_period_secs
            )));
        }
        Ok(())
    }
}

/// Gated user actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateAction {
    Deliver,
    Consign,
}

impl GateAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deliver => "deliver",
            Self::Consign => "consign",
        }
    }
}

/// Why an action is not currently allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DenyReason {
    /// Listing in flight (Active) or completed (Sold).
    ListingLocked { state: ConsignmentState },
    AlreadyDelivered { state: DeliveryState },
    /// Delivery orders could not be fetched and the record says "not
    /// delivered"; a delivery may already exist.
    DeliveryStatusIncomplete,
    /// Consignment records could not be fetched; listing history unknown.
    ListingHistoryIncomplete,
    PurchaseTimeUnknown,
    HoldingPeriod { remaining_secs: i64 },
    NoCoupon,
    /// Previously listed and pulled: only forced delivery is offered.
    PreviouslyConsigned,
}

impl DenyReason {
    /// Stable label for metrics and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ListingLocked { .. } => "listing_locked",
            Self::AlreadyDelivered { .. } => "already_delivered",
            Self::DeliveryStatusIncomplete => "delivery_incomplete",
            Self::ListingHistoryIncomplete => "listing_history_incomplete",
            Self::PurchaseTimeUnknown => "purchase_time_unknown",
            Self::HoldingPeriod { .. } => "holding_period",
            Self::NoCoupon => "no_coupon",
            Self::PreviouslyConsigned => "previously_consigned",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ListingLocked {
                state: ConsignmentState::Sold,
            } => write!(f, "this collectible has been sold"),
            Self::ListingLocked { state } => {
                write!(f, "this collectible is listed for consignment ({})", state.label())
            }
            Self::AlreadyDelivered { state } => {
                write!(f, "a delivery has already been requested ({})", state.label())
            }
            Self::DeliveryStatusIncomplete => {
                write!(f, "delivery status could not be loaded, refresh and try again")
            }
            Self::ListingHistoryIncomplete => {
                write!(f, "consignment history could not be loaded, refresh and try again")
            }
            Self::PurchaseTimeUnknown => write!(f, "purchase time is unknown"),
            Self::HoldingPeriod { remaining_secs } => write!(
                f,
                "holding period not over, {} remaining",
                format_remaining(*remaining_secs)
            ),
            Self::NoCoupon => write!(f, "a consignment coupon is required"),
            Self::PreviouslyConsigned => write!(
                f,
                "this collectible was listed before and can only be delivered"
            ),
        }
    }
}

/// Format seconds as `HH:MM:SS`; hours may exceed 24.
pub fn format_remaining(secs: i64) -> String {
    let secs = secs.max(0);
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Result of one gate check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Allowed,
    Denied(DenyReason),
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    pub fn reason(&self) -> Option<&DenyReason> {
        match self {
            Self::Allowed => None,
            Self::Denied(reason) => Some(reason),
        }
    }
}

/// Whether a delivery is a first-time delivery or a forced pull-back of a
/// previously listed holding. Forced deliveries need explicit confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    Standard,
    Forced,
}

/// All permissions for one holding at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
    pub deliver: Verdict,
    pub delivery_mode: DeliveryMode,
    pub consign: Verdict,
    /// Whole seconds left in the holding period; `None` if pay time unknown.
    pub remaining_secs: Option<i64>,
}

impl Eligibility {
    pub fn can_deliver(&self) -> bool {
        self.deliver.is_allowed()
    }

    pub fn can_consign(&self) -> bool {
        self.consign.is_allowed()
    }

    pub fn is_forced_delivery(&self) -> bool {
        self.delivery_mode == DeliveryMode::Forced
    }
}

/// Holding-period and coupon gate.
#[derive(Debug, Clone, Default)]
pub struct EligibilityGate {
    config: GateConfig,
}

impl EligibilityGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub fn holding_period(&self) -> Duration {
        Duration::seconds(
            self.config
                .holding_period_secs
                .clamp(0, MAX_HOLDING_PERIOD_SECS),
        )
    }

    /// Instant the holding period ends.
    ///
    /// `None` if pay time is unknown or so far out that the end is not
    /// representable; both read as an unknown purchase time.
    pub fn eligible_at(&self, holding: &Holding) -> Option<DateTime<Utc>> {
        holding
            .buy_time
            .and_then(|t| t.checked_add_signed(self.holding_period()))
    }

    /// `max(0, period − elapsed)`, exact. `None` if pay time is unknown.
    pub fn remaining(&self, holding: &Holding, now: DateTime<Utc>) -> Option<Duration> {
        self.eligible_at(holding)
            .map(|at| (at - now).max(Duration::zero()))
    }

    /// Remaining time floored to whole seconds, for display.
    pub fn remaining_secs(&self, holding: &Holding, now: DateTime<Utc>) -> Option<i64> {
        self.remaining(holding, now).map(|d| d.num_seconds())
    }

    /// Holding period check, inclusive at exactly the period.
    fn check_holding_period(&self, holding: &Holding, now: DateTime<Utc>) -> Verdict {
        match self.remaining(holding, now) {
            None => Verdict::Denied(DenyReason::PurchaseTimeUnknown),
            Some(left) if left > Duration::zero() => Verdict::Denied(DenyReason::HoldingPeriod {
                remaining_secs: left.num_seconds(),
            }),
            Some(_) => Verdict::Allowed,
        }
    }

    pub fn check_deliver(&self, holding: &Holding, now: DateTime<Utc>) -> Verdict {
        if holding.consignment_state.blocks_actions() {
            return Verdict::Denied(DenyReason::ListingLocked {
                state: holding.consignment_state,
            });
        }
        if holding.is_delivered() {
            return Verdict::Denied(DenyReason::AlreadyDelivered {
                state: holding.delivery_state,
            });
        }
        if holding.gaps.delivery {
            return Verdict::Denied(DenyReason::DeliveryStatusIncomplete);
        }
        self.check_holding_period(holding, now)
    }

    pub fn check_consign(&self, holding: &Holding, now: DateTime<Utc>, coupons: u32) -> Verdict {
        if holding.consignment_state.blocks_actions() {
            return Verdict::Denied(DenyReason::ListingLocked {
                state: holding.consignment_state,
            });
        }
        if holding.ever_consigned {
            return Verdict::Denied(DenyReason::PreviouslyConsigned);
        }
        if holding.is_delivered() {
            return Verdict::Denied(DenyReason::AlreadyDelivered {
                state: holding.delivery_state,
            });
        }
        if holding.gaps.consignment {
            return Verdict::Denied(DenyReason::ListingHistoryIncomplete);
        }
        let period = self.check_holding_period(holding, now);
        if !period.is_allowed() {
            return period;
        }
        if coupons == 0 {
            return Verdict::Denied(DenyReason::NoCoupon);
        }
        Verdict::Allowed
    }

    pub fn delivery_mode(&self, holding: &Holding) -> DeliveryMode {
        if holding.requires_forced_delivery() {
            DeliveryMode::Forced
        } else {
            DeliveryMode::Standard
        }
    }

    pub fn evaluate(&self, holding: &Holding, now: DateTime<Utc>, coupons: u32) -> Eligibility {
        Eligibility {
            deliver: self.check_deliver(holding, now),
            delivery_mode: self.delivery_mode(holding),
            consign: self.check_consign(holding, now, coupons),
            remaining_secs: self.remaining_secs(holding, now),
        }
    }

    pub fn can_deliver(&self, holding: &Holding, now: DateTime<Utc>) -> bool {
        self.check_deliver(holding, now).is_allowed()
    }

    pub fn can_consign(&self, holding: &Holding, now: DateTime<Utc>, coupons: u32) -> bool {
        self.check_consign(holding, now, coupons).is_allowed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_core::{DisplayStatus, HoldingId, SourceGaps, SourceRefs};

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_710_000_000, 0).unwrap()
    }

    fn holding_bought(ago: Duration) -> Holding {
        Holding {
            id: HoldingId::new("H1"),
            item_id: None,
            title: "Test".into(),
            image: None,
            price: None,
            buy_time: Some(now() - ago),
            delivery_state: DeliveryState::NotDelivered,
            consignment_state: ConsignmentState::None,
            ever_consigned: false,
            display: DisplayStatus::Idle,
            gaps: SourceGaps::default(),
            refs: SourceRefs::default(),
        }
    }

    fn gate() -> EligibilityGate {
        EligibilityGate::default()
    }

    #[test]
    fn test_idle_holding_after_49h() {
        let h = holding_bought(Duration::hours(49));
        assert!(gate().can_deliver(&h, now()));
        assert!(gate().can_consign(&h, now(), 1));
        assert_eq!(
            gate().check_consign(&h, now(), 0),
            Verdict::Denied(DenyReason::NoCoupon)
        );
        assert_eq!(gate().delivery_mode(&h), DeliveryMode::Standard);
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let h = holding_bought(Duration::hours(48) - Duration::seconds(1));
        assert!(!gate().can_deliver(&h, now()));
        assert_eq!(
            gate().check_deliver(&h, now()),
            Verdict::Denied(DenyReason::HoldingPeriod { remaining_secs: 1 })
        );

        let h = holding_bought(Duration::hours(48));
        assert!(gate().can_deliver(&h, now()));
        assert_eq!(gate().remaining_secs(&h, now()), Some(0));
    }

    #[test]
    fn test_pay_time_at_calendar_limit_reads_as_unknown() {
        let mut h = holding_bought(Duration::zero());
        h.buy_time = DateTime::from_timestamp_millis(8_210_266_876_799_000);
        assert!(h.buy_time.is_some());

        let e = gate().evaluate(&h, now(), 3);
        assert_eq!(e.deliver, Verdict::Denied(DenyReason::PurchaseTimeUnknown));
        assert_eq!(e.consign, Verdict::Denied(DenyReason::PurchaseTimeUnknown));
        assert_eq!(e.remaining_secs, None);
        assert_eq!(gate().eligible_at(&h), None);
    }

    #[test]
    fn test_validate_caps_holding_period() {
        let config = GateConfig {
            holding_period_secs: i64::MAX,
        };
        assert!(matches!(config.validate(), Err(GateError::ConfigError(_))));
        assert!(GateConfig {
            holding_period_secs: MAX_HOLDING_PERIOD_SECS
        }
        .validate()
        .is_ok());

        // Unvalidated configs are clamped instead of overflowing.
        let h = holding_bought(Duration::hours(1));
        let gate = EligibilityGate::new(config);
        assert_eq!(gate.holding_period(), Duration::seconds(MAX_HOLDING_PERIOD_SECS));
        assert!(!gate.can_deliver(&h, now()));
    }

    #[test]
    fn test_remaining_floors_to_seconds() {
        let h = holding_bought(Duration::hours(47) + Duration::milliseconds(500));
        // 1h - 0.5s left
        assert_eq!(gate().remaining_secs(&h, now()), Some(3599));
    }

    #[test]
    fn test_sold_blocks_everything() {
        for delivery in [DeliveryState::NotDelivered, DeliveryState::Received] {
            let mut h = holding_bought(Duration::days(30));
            h.consignment_state = ConsignmentState::Sold;
            h.ever_consigned = true;
            h.delivery_state = delivery;
            assert!(!gate().can_deliver(&h, now()));
            assert!(!gate().can_consign(&h, now(), 10));
        }
    }

    #[test]
    fn test_active_listing_blocks_everything() {
        let mut h = holding_bought(Duration::days(3));
        h.consignment_state = ConsignmentState::Active;
        h.ever_consigned = true;
        let e = gate().evaluate(&h, now(), 3);
        assert_eq!(
            e.deliver,
            Verdict::Denied(DenyReason::ListingLocked {
                state: ConsignmentState::Active
            })
        );
        assert!(!e.can_consign());
    }

    #[test]
    fn test_previously_consigned_forces_delivery() {
        let mut h = holding_bought(Duration::days(3));
        h.ever_consigned = true;
        let e = gate().evaluate(&h, now(), 5);
        assert!(e.can_deliver());
        assert!(e.is_forced_delivery());
        assert_eq!(e.consign, Verdict::Denied(DenyReason::PreviouslyConsigned));

        h.consignment_state = ConsignmentState::Failed;
        let e = gate().evaluate(&h, now(), 5);
        assert!(e.can_deliver());
        assert!(e.is_forced_delivery());
        assert!(!e.can_consign());
    }

    #[test]
    fn test_already_delivered() {
        let mut h = holding_bought(Duration::days(3));
        h.delivery_state = DeliveryState::AwaitingShipment;
        assert_eq!(
            gate().check_deliver(&h, now()),
            Verdict::Denied(DenyReason::AlreadyDelivered {
                state: DeliveryState::AwaitingShipment
            })
        );
        assert!(!gate().can_consign(&h, now(), 1));
    }

    #[test]
    fn test_source_gaps_deny_conservatively() {
        let mut h = holding_bought(Duration::days(3));
        h.gaps = SourceGaps {
            delivery: true,
            consignment: true,
        };
        assert_eq!(
            gate().check_deliver(&h, now()),
            Verdict::Denied(DenyReason::DeliveryStatusIncomplete)
        );
        assert_eq!(
            gate().check_consign(&h, now(), 1),
            Verdict::Denied(DenyReason::ListingHistoryIncomplete)
        );
    }

    #[test]
    fn test_unknown_purchase_time() {
        let mut h = holding_bought(Duration::days(3));
        h.buy_time = None;
        let e = gate().evaluate(&h, now(), 1);
        assert_eq!(e.deliver, Verdict::Denied(DenyReason::PurchaseTimeUnknown));
        assert_eq!(e.remaining_secs, None);
    }

    #[test]
    fn test_deny_reason_messages() {
        let reason = DenyReason::HoldingPeriod {
            remaining_secs: 26 * 3600 + 61,
        };
        assert_eq!(
            reason.to_string(),
            "holding period not over, 26:01:01 remaining"
        );
        assert_eq!(reason.code(), "holding_period");
        assert_eq!(
            DenyReason::ListingLocked {
                state: ConsignmentState::Sold
            }
            .to_string(),
            "this collectible has been sold"
        );
    }

    #[test]
    fn test_config_validate() {
        assert!(GateConfig::default().validate().is_ok());
        let bad = GateConfig {
            holding_period_secs: -1,
        };
        assert!(bad.validate().is_err());
    }
}
