//! Status normalization.
//!
//! Raw status fields arrive as numbers, booleans, localized labels or
//! English stage words depending on API version. These functions are the
//! only place that looks at the raw representation. All of them are pure.

use vault_core::{ConsignmentState, DeliveryState, RawStatus};

/// Result of normalizing one consignment status value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsignmentReading {
    pub state: ConsignmentState,
    /// Raw value when it matched nothing in the label table. The state is
    /// then `Active`: an unknown non-empty status must never read as
    /// "nothing ongoing".
    pub unrecognized: Option<String>,
}

impl ConsignmentReading {
    fn known(state: ConsignmentState) -> Self {
        Self {
            state,
            unrecognized: None,
        }
    }

    fn unknown(raw: &RawStatus) -> Self {
        Self {
            state: ConsignmentState::Active,
            unrecognized: Some(raw.to_string()),
        }
    }
}

/// Normalize a consignment status: absent or empty is `None`, numbers map
/// to the enum ordinal, labels go through a fixed table.
pub fn normalize_consignment(raw: Option<&RawStatus>) -> ConsignmentReading {
    let Some(raw) = raw else {
        return ConsignmentReading::known(ConsignmentState::None);
    };

    match raw {
        RawStatus::Flag(false) => ConsignmentReading::known(ConsignmentState::None),
        RawStatus::Flag(true) => ConsignmentReading::unknown(raw),
        RawStatus::Number(code) => match ConsignmentState::from_code(*code) {
            Some(state) => ConsignmentReading::known(state),
            None => ConsignmentReading::unknown(raw),
        },
        RawStatus::Text(text) => {
            let label = text.trim();
            if label.is_empty() {
                return ConsignmentReading::known(ConsignmentState::None);
            }
            if let Ok(code) = label.parse::<i64>() {
                return match ConsignmentState::from_code(code) {
                    Some(state) => ConsignmentReading::known(state),
                    None => ConsignmentReading::unknown(raw),
                };
            }
            match consignment_label(label) {
                Some(state) => ConsignmentReading::known(state),
                None => ConsignmentReading::unknown(raw),
            }
        }
    }
}

fn consignment_label(label: &str) -> Option<ConsignmentState> {
    let state = match label.to_ascii_lowercase().as_str() {
        "未寄售" | "无" | "none" => ConsignmentState::None,
        "审核中" | "待审核" | "pending" | "reviewing" => ConsignmentState::PendingReview,
        "寄售中" | "active" | "listed" | "on_sale" => ConsignmentState::Active,
        "寄售失败" | "审核失败" | "已下架" | "failed" | "cancelled" => ConsignmentState::Failed,
        "已售出" | "已卖出" | "sold" => ConsignmentState::Sold,
        _ => return None,
    };
    Some(state)
}

/// Normalize the delivery field of a purchase record.
///
/// Only a genuinely empty, zero, `false` or missing value is
/// `NotDelivered`; any other value means a delivery request exists.
pub fn normalize_delivery(raw: Option<&RawStatus>) -> DeliveryState {
    match raw {
        None => DeliveryState::NotDelivered,
        Some(raw) if raw.is_empty() => DeliveryState::NotDelivered,
        Some(RawStatus::Text(text)) => match text.trim().parse::<i64>() {
            Ok(0) => DeliveryState::NotDelivered,
            Ok(_) => DeliveryState::AwaitingShipment,
            Err(_) => {
                delivery_label(text.trim()).unwrap_or(DeliveryState::AwaitingShipment)
            }
        },
        Some(_) => DeliveryState::AwaitingShipment,
    }
}

/// Stage of an existing delivery order. Stages are text labels; there is
/// no numeric stage code. The order itself proves a delivery was requested,
/// so an absent, numeric or unknown stage is `AwaitingShipment`.
pub fn delivery_from_stage(stage: Option<&RawStatus>) -> DeliveryState {
    match stage {
        Some(RawStatus::Text(text)) => {
            delivery_label(text.trim()).unwrap_or(DeliveryState::AwaitingShipment)
        }
        _ => DeliveryState::AwaitingShipment,
    }
}

fn delivery_label(label: &str) -> Option<DeliveryState> {
    let state = match label.to_ascii_lowercase().as_str() {
        "paid" | "待发货" | "已提货" => DeliveryState::AwaitingShipment,
        "shipped" | "待收货" | "已发货" => DeliveryState::AwaitingReceipt,
        "completed" | "已收货" | "已完成" => DeliveryState::Received,
        _ => return None,
    };
    Some(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> RawStatus {
        RawStatus::Text(s.to_string())
    }

    #[test]
    fn test_consignment_absent_or_empty_is_none() {
        assert_eq!(normalize_consignment(None).state, ConsignmentState::None);
        assert_eq!(
            normalize_consignment(Some(&text(""))).state,
            ConsignmentState::None
        );
        assert_eq!(
            normalize_consignment(Some(&RawStatus::Number(0))).state,
            ConsignmentState::None
        );
    }

    #[test]
    fn test_consignment_numeric_ordinals() {
        let expected = [
            ConsignmentState::None,
            ConsignmentState::PendingReview,
            ConsignmentState::Active,
            ConsignmentState::Failed,
            ConsignmentState::Sold,
        ];
        for (code, state) in expected.iter().enumerate() {
            let reading = normalize_consignment(Some(&RawStatus::Number(code as i64)));
            assert_eq!(reading.state, *state);
            assert!(reading.unrecognized.is_none());

            let reading = normalize_consignment(Some(&text(&code.to_string())));
            assert_eq!(reading.state, *state);
        }
    }

    #[test]
    fn test_consignment_labels() {
        assert_eq!(
            normalize_consignment(Some(&text("寄售中"))).state,
            ConsignmentState::Active
        );
        assert_eq!(
            normalize_consignment(Some(&text("已售出"))).state,
            ConsignmentState::Sold
        );
        assert_eq!(
            normalize_consignment(Some(&text("SOLD"))).state,
            ConsignmentState::Sold
        );
        assert_eq!(
            normalize_consignment(Some(&text("审核中"))).state,
            ConsignmentState::PendingReview
        );
    }

    #[test]
    fn test_unknown_label_is_active_and_flagged() {
        let reading = normalize_consignment(Some(&text("处理中")));
        assert_eq!(reading.state, ConsignmentState::Active);
        assert_eq!(reading.unrecognized.as_deref(), Some("处理中"));

        let reading = normalize_consignment(Some(&RawStatus::Number(9)));
        assert_eq!(reading.state, ConsignmentState::Active);
        assert_eq!(reading.unrecognized.as_deref(), Some("9"));
    }

    #[test]
    fn test_normalizer_is_idempotent() {
        let values = [
            None,
            Some(text("")),
            Some(text("寄售中")),
            Some(text("???")),
            Some(RawStatus::Number(3)),
            Some(RawStatus::Flag(true)),
        ];
        for raw in &values {
            assert_eq!(
                normalize_consignment(raw.as_ref()),
                normalize_consignment(raw.as_ref())
            );
            assert_eq!(
                normalize_delivery(raw.as_ref()),
                normalize_delivery(raw.as_ref())
            );
        }
    }

    #[test]
    fn test_delivery_empty_values() {
        assert_eq!(normalize_delivery(None), DeliveryState::NotDelivered);
        assert_eq!(
            normalize_delivery(Some(&text(""))),
            DeliveryState::NotDelivered
        );
        assert_eq!(
            normalize_delivery(Some(&text("0"))),
            DeliveryState::NotDelivered
        );
        assert_eq!(
            normalize_delivery(Some(&RawStatus::Number(0))),
            DeliveryState::NotDelivered
        );
    }

    #[test]
    fn test_delivery_non_empty_counts_as_delivered() {
        assert_eq!(
            normalize_delivery(Some(&RawStatus::Number(1))),
            DeliveryState::AwaitingShipment
        );
        assert_eq!(
            normalize_delivery(Some(&text("shipped"))),
            DeliveryState::AwaitingReceipt
        );
        assert_eq!(
            normalize_delivery(Some(&text("已收货"))),
            DeliveryState::Received
        );
        assert_eq!(
            normalize_delivery(Some(&text("某个阶段"))),
            DeliveryState::AwaitingShipment
        );
    }

    #[test]
    fn test_delivery_order_stage() {
        assert_eq!(
            delivery_from_stage(Some(&text("paid"))),
            DeliveryState::AwaitingShipment
        );
        assert_eq!(
            delivery_from_stage(Some(&text("completed"))),
            DeliveryState::Received
        );
        assert_eq!(delivery_from_stage(None), DeliveryState::AwaitingShipment);
        assert_eq!(
            delivery_from_stage(Some(&RawStatus::Number(3))),
            DeliveryState::AwaitingShipment
        );
        assert_eq!(
            delivery_from_stage(Some(&text("已收货"))),
            DeliveryState::Received
        );
    }
}
