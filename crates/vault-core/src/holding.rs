//! Reconciled holding view.
//!
//! A `Holding` is an immutable snapshot produced by one reconciliation
//! pass. It is never patched in place: every fetch cycle rebuilds the
//! whole list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::decimal::Price;

/// Canonical holding identifier used to join the three record streams.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HoldingId(String);

impl HoldingId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HoldingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the physical item is in the delivery flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    NotDelivered,
    AwaitingShipment,
    AwaitingReceipt,
    Received,
}

impl DeliveryState {
    /// Any state past `NotDelivered` means a delivery request exists.
    pub fn is_delivered(self) -> bool {
        self != Self::NotDelivered
    }

    /// Localized stage label.
    pub fn label(self) -> &'static str {
        match self {
            Self::NotDelivered => "未提货",
            Self::AwaitingShipment => "待发货",
            Self::AwaitingReceipt => "待收货",
            Self::Received => "已收货",
        }
    }
}

/// Resale listing state. Ordinals match the upstream numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsignmentState {
    None = 0,
    PendingReview = 1,
    Active = 2,
    Failed = 3,
    Sold = 4,
}

impl ConsignmentState {
    /// Map an upstream numeric code. Out-of-range codes return `None`.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::PendingReview),
            2 => Some(Self::Active),
            3 => Some(Self::Failed),
            4 => Some(Self::Sold),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        self as i64
    }

    /// Sold is terminal: no further action is ever legal.
    pub fn is_terminal(self) -> bool {
        self == Self::Sold
    }

    /// A listing in flight or completed blocks every other action.
    pub fn blocks_actions(self) -> bool {
        matches!(self, Self::Active | Self::Sold)
    }

    /// Localized label.
    pub fn label(self) -> &'static str {
        match self {
            Self::None => "未寄售",
            Self::PendingReview => "审核中",
            Self::Active => "寄售中",
            Self::Failed => "寄售失败",
            Self::Sold => "已售出",
        }
    }
}

/// Which derived fields were computed without their backing source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceGaps {
    /// Delivery orders were unavailable; `delivery_state` comes from the
    /// purchase record alone.
    pub delivery: bool,
    /// Consignment records were unavailable; listing history is unknown.
    pub consignment: bool,
}

impl SourceGaps {
    pub fn is_complete(&self) -> bool {
        !self.delivery && !self.consignment
    }
}

/// References back to the source records a holding was built from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRefs {
    /// Position of the purchase record in the fetched page.
    pub purchase_index: usize,
    pub purchase_id: Option<String>,
    pub order_id: Option<String>,
    pub delivery_order_id: Option<String>,
    pub consignment_record_id: Option<String>,
}

/// Status shown for a holding, already resolved by display priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisplayStatus {
    Sold,
    Listed,
    Delivery { state: DeliveryState, text: String },
    /// Previously listed, not listed now: must be pulled back via delivery.
    AwaitingForcedDelivery,
    /// Neither delivered nor consigned.
    Idle,
}

impl DisplayStatus {
    /// Badges in render order.
    pub fn badges(&self) -> Vec<&str> {
        match self {
            Self::Sold => vec![ConsignmentState::Sold.label()],
            Self::Listed => vec![ConsignmentState::Active.label()],
            Self::Delivery { text, .. } => vec![text.as_str()],
            Self::AwaitingForcedDelivery => vec!["待提货"],
            Self::Idle => vec![
                DeliveryState::NotDelivered.label(),
                ConsignmentState::None.label(),
            ],
        }
    }

    pub fn text(&self) -> String {
        self.badges().join(" / ")
    }

    /// Stable snake_case name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sold => "sold",
            Self::Listed => "listed",
            Self::Delivery { .. } => "delivery",
            Self::AwaitingForcedDelivery => "awaiting_forced_delivery",
            Self::Idle => "idle",
        }
    }
}

/// One user-owned collectible, reconciled from the three record streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub id: HoldingId,
    pub item_id: Option<String>,
    pub title: String,
    pub image: Option<String>,
    pub price: Option<Price>,
    /// Pay time; `None` when upstream sent nothing parseable.
    pub buy_time: Option<DateTime<Utc>>,
    pub delivery_state: DeliveryState,
    pub consignment_state: ConsignmentState,
    /// Any non-`None` consignment state was observed for this holding.
    pub ever_consigned: bool,
    pub display: DisplayStatus,
    pub gaps: SourceGaps,
    pub refs: SourceRefs,
}

impl Holding {
    /// Previously listed, no longer listed and not sold: the only legal
    /// action left is a forced delivery.
    pub fn requires_forced_delivery(&self) -> bool {
        self.ever_consigned && !self.consignment_state.blocks_actions()
    }

    pub fn is_delivered(&self) -> bool {
        self.delivery_state.is_delivered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consignment_codes() {
        for code in 0..=4 {
            let state = ConsignmentState::from_code(code).unwrap();
            assert_eq!(state.code(), code);
        }
        assert_eq!(ConsignmentState::from_code(5), None);
        assert_eq!(ConsignmentState::from_code(-1), None);
    }

    #[test]
    fn test_blocking_states() {
        assert!(ConsignmentState::Active.blocks_actions());
        assert!(ConsignmentState::Sold.blocks_actions());
        assert!(ConsignmentState::Sold.is_terminal());
        assert!(!ConsignmentState::Failed.blocks_actions());
        assert!(!ConsignmentState::PendingReview.blocks_actions());
    }

    #[test]
    fn test_display_text() {
        assert_eq!(DisplayStatus::Sold.text(), "已售出");
        assert_eq!(DisplayStatus::Listed.text(), "寄售中");
        assert_eq!(DisplayStatus::Idle.text(), "未提货 / 未寄售");
        assert_eq!(DisplayStatus::AwaitingForcedDelivery.text(), "待提货");
    }
}
