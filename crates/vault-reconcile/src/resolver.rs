//! Canonical holding id resolution.
//!
//! Upstream systems disagree on which id field they populate, and when
//! several are populated they are NOT interchangeable. The candidate order
//! below is fixed policy; reordering it silently breaks joins.

use vault_core::{ConsignmentRecord, DeliveryOrder, HoldingId, PurchaseRecord, RawId};

/// Records that carry holding id candidates, highest priority first.
pub trait HoldingIdCandidates {
    fn id_candidates(&self) -> Vec<Option<&RawId>>;
}

impl HoldingIdCandidates for PurchaseRecord {
    /// holding id → collection id → record id → order id.
    fn id_candidates(&self) -> Vec<Option<&RawId>> {
        vec![
            self.holding_id.as_ref(),
            self.collection_id.as_ref(),
            self.id.as_ref(),
            self.order_id.as_ref(),
        ]
    }
}

impl HoldingIdCandidates for DeliveryOrder {
    // The order's own `id` names the shipment, not the holding.
    fn id_candidates(&self) -> Vec<Option<&RawId>> {
        vec![self.holding_id.as_ref(), self.collection_id.as_ref()]
    }
}

impl HoldingIdCandidates for ConsignmentRecord {
    // The record's own `id` names the listing, not the holding.
    fn id_candidates(&self) -> Vec<Option<&RawId>> {
        vec![self.holding_id.as_ref(), self.collection_id.as_ref()]
    }
}

/// First non-null, non-empty candidate, or `None` if the record cannot be
/// correlated with anything.
pub fn resolve_holding_id<R: HoldingIdCandidates + ?Sized>(record: &R) -> Option<HoldingId> {
    record
        .id_candidates()
        .into_iter()
        .flatten()
        .find_map(RawId::as_key)
        .map(HoldingId::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Option<RawId> {
        Some(RawId::Text(s.to_string()))
    }

    #[test]
    fn test_purchase_fallback_order() {
        let mut rec = PurchaseRecord {
            holding_id: text("H1"),
            collection_id: text("C1"),
            id: Some(RawId::Number(7)),
            order_id: text("O1"),
            ..Default::default()
        };
        assert_eq!(resolve_holding_id(&rec), Some(HoldingId::new("H1")));

        rec.holding_id = None;
        assert_eq!(resolve_holding_id(&rec), Some(HoldingId::new("C1")));

        rec.collection_id = text("");
        assert_eq!(resolve_holding_id(&rec), Some(HoldingId::new("7")));

        rec.id = Some(RawId::Number(0));
        assert_eq!(resolve_holding_id(&rec), Some(HoldingId::new("O1")));

        rec.order_id = None;
        assert_eq!(resolve_holding_id(&rec), None);
    }

    #[test]
    fn test_delivery_order_ignores_own_id() {
        let order = DeliveryOrder {
            id: Some(RawId::Number(900)),
            ..Default::default()
        };
        assert_eq!(resolve_holding_id(&order), None);

        let order = DeliveryOrder {
            id: Some(RawId::Number(900)),
            collection_id: Some(RawId::Number(12)),
            ..Default::default()
        };
        assert_eq!(resolve_holding_id(&order), Some(HoldingId::new("12")));
    }

    #[test]
    fn test_consignment_record_prefers_holding_id() {
        let rec = ConsignmentRecord {
            id: Some(RawId::Number(1)),
            holding_id: text("H9"),
            collection_id: text("C9"),
            ..Default::default()
        };
        assert_eq!(resolve_holding_id(&rec), Some(HoldingId::new("H9")));
    }
}
