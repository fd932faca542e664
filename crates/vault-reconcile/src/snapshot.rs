//! Immutable inputs of one reconciliation pass.

use serde::{Deserialize, Serialize};
use std::fmt;

use vault_core::{ConsignmentRecord, DeliveryOrder, PurchaseRecord};

/// The three upstream record streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stream {
    Purchases,
    DeliveryOrders,
    Consignments,
}

impl Stream {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Purchases => "purchases",
            Self::DeliveryOrders => "delivery_orders",
            Self::Consignments => "consignments",
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of fetching one stream. A failed fetch is data, not an error:
/// reconciliation proceeds without it.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceFeed<T> {
    Available(Vec<T>),
    Unavailable { reason: String },
}

impl<T> SourceFeed<T> {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// Records, or an empty slice when the stream is unavailable.
    pub fn records(&self) -> &[T] {
        match self {
            Self::Available(records) => records,
            Self::Unavailable { .. } => &[],
        }
    }

    pub fn failure(&self) -> Option<&str> {
        match self {
            Self::Available(_) => None,
            Self::Unavailable { reason } => Some(reason),
        }
    }
}

impl<T> Default for SourceFeed<T> {
    fn default() -> Self {
        Self::Available(Vec::new())
    }
}

/// Settled results of all three fetches for one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceSnapshot {
    pub purchases: SourceFeed<PurchaseRecord>,
    pub delivery_orders: SourceFeed<DeliveryOrder>,
    pub consignments: SourceFeed<ConsignmentRecord>,
}

impl SourceSnapshot {
    pub fn health(&self) -> SourceHealth {
        let mut unavailable = Vec::new();
        if let Some(reason) = self.purchases.failure() {
            unavailable.push((Stream::Purchases, reason.to_string()));
        }
        if let Some(reason) = self.delivery_orders.failure() {
            unavailable.push((Stream::DeliveryOrders, reason.to_string()));
        }
        if let Some(reason) = self.consignments.failure() {
            unavailable.push((Stream::Consignments, reason.to_string()));
        }
        SourceHealth { unavailable }
    }
}

/// Which streams were missing from a pass, with the fetch error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceHealth {
    pub unavailable: Vec<(Stream, String)>,
}

impl SourceHealth {
    pub fn is_degraded(&self) -> bool {
        !self.unavailable.is_empty()
    }

    pub fn is_available(&self, stream: Stream) -> bool {
        !self.unavailable.iter().any(|(s, _)| *s == stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_reports_failed_streams() {
        let snapshot = SourceSnapshot {
            delivery_orders: SourceFeed::unavailable("HTTP 502"),
            ..Default::default()
        };
        let health = snapshot.health();
        assert!(health.is_degraded());
        assert!(!health.is_available(Stream::DeliveryOrders));
        assert!(health.is_available(Stream::Purchases));
        assert_eq!(
            health.unavailable,
            vec![(Stream::DeliveryOrders, "HTTP 502".to_string())]
        );
    }

    #[test]
    fn test_unavailable_feed_has_no_records() {
        let feed: SourceFeed<PurchaseRecord> = SourceFeed::unavailable("timeout");
        assert!(feed.records().is_empty());
        assert!(!feed.is_available());
    }
}
