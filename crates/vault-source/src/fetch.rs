//! Concurrent snapshot fetch.
//!
//! The purchase page and the two supporting lists are requested together.
//! Reconciliation waits until all three have settled; a failed stream
//! becomes `SourceFeed::Unavailable` instead of failing the page.

use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use vault_core::PurchaseRecord;
use vault_reconcile::{SourceFeed, SourceSnapshot, Stream};

use crate::api::{AssetApi, ConsignmentScope, DeliveryStageFilter, Page, PageRequest};
use crate::error::{SourceError, SourceResult};

/// Paging limits for the supporting lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchLimits {
    /// Upper bound on pages walked per supporting list.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    /// Page size used for supporting lists.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_max_pages() -> u32 {
    50
}

fn default_page_size() -> u32 {
    100
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            page_size: default_page_size(),
        }
    }
}

/// Settled fetch results for one purchase page.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub request: PageRequest,
    pub snapshot: SourceSnapshot,
    pub total: Option<u64>,
    pub has_more: bool,
    pub coupon_count: Option<u32>,
}

/// Fetch one purchase page together with the full delivery order and
/// own-consignment lists.
pub async fn fetch_snapshot<A: AssetApi + ?Sized>(
    api: &A,
    request: PageRequest,
    limits: &FetchLimits,
) -> FetchedPage {
    let supporting = PageRequest::first(limits.page_size);

    let (purchases, delivery_orders, consignments) = tokio::join!(
        api.fetch_purchases(request),
        collect_all(limits.max_pages, supporting, |page| {
            api.fetch_delivery_orders(page, DeliveryStageFilter::All)
        }),
        collect_all(limits.max_pages, supporting, |page| {
            api.fetch_consignments(page, ConsignmentScope::Mine)
        }),
    );

    let (purchases, total, has_more, coupon_count) = match purchases {
        Ok(fetched) => (
            SourceFeed::Available(fetched.page.records),
            fetched.page.total,
            fetched.page.has_more,
            fetched.coupon_count,
        ),
        Err(e) => (settle::<PurchaseRecord>(Stream::Purchases, e), None, false, None),
    };

    let snapshot = SourceSnapshot {
        purchases,
        delivery_orders: delivery_orders
            .map(SourceFeed::Available)
            .unwrap_or_else(|e| settle(Stream::DeliveryOrders, e)),
        consignments: consignments
            .map(SourceFeed::Available)
            .unwrap_or_else(|e| settle(Stream::Consignments, e)),
    };

    debug!(
        page = request.page,
        purchases = snapshot.purchases.records().len(),
        delivery_orders = snapshot.delivery_orders.records().len(),
        consignments = snapshot.consignments.records().len(),
        "Snapshot fetched"
    );

    FetchedPage {
        request,
        snapshot,
        total,
        has_more,
        coupon_count,
    }
}

fn settle<T>(stream: Stream, error: SourceError) -> SourceFeed<T> {
    warn!(stream = %stream, error = %error, "Source fetch failed, continuing without it");
    SourceFeed::unavailable(error.to_string())
}

/// Walk a list endpoint until it reports no further pages.
async fn collect_all<T, F, Fut>(max_pages: u32, first: PageRequest, mut fetch: F) -> SourceResult<Vec<T>>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = SourceResult<Page<T>>>,
{
    let mut records = Vec::new();
    let mut request = first;

    for _ in 0..max_pages {
        let page = fetch(request).await?;
        let exhausted = !page.has_more || page.records.is_empty();
        records.extend(page.records);
        if exhausted {
            return Ok(records);
        }
        request = request.next();
    }

    Err(SourceError::PageLimit { max_pages })
}
