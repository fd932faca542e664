//! Fixture-backed `AssetApi`.
//!
//! Serves the three lists from an in-memory `Fixture` with real paging and
//! applies successful mutations to it, so a reload after an action observes
//! the new server state. Failures and rejections can be injected per
//! endpoint. Used for offline runs (`--fixture`) and tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use vault_core::{
    Clock, ConsignmentRecord, ConsignmentState, DeliveryOrder, HoldingId, PurchaseRecord,
    RawId, RawStatus, RawTimestamp, SystemClock,
};
use vault_reconcile::resolve_holding_id;

use crate::api::{
    AssetApi, ConsignmentRequest, ConsignmentScope, DeliveryRequest, DeliveryStageFilter,
    MutationReply, Page, PageRequest, PurchasePage,
};
use crate::error::{SourceError, SourceResult};

/// Server-side state served by `MemoryAssetApi`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub purchases: Vec<PurchaseRecord>,
    #[serde(default)]
    pub delivery_orders: Vec<DeliveryOrder>,
    /// The user's own listing history.
    #[serde(default)]
    pub consignments: Vec<ConsignmentRecord>,
    /// Public market listings.
    #[serde(default)]
    pub market: Vec<ConsignmentRecord>,
    #[serde(default)]
    pub coupon_count: Option<u32>,
}

impl Fixture {
    pub fn from_json(json: &str) -> SourceResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Endpoint selector for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Purchases,
    DeliveryOrders,
    Consignments,
    Market,
    SubmitDelivery,
    SubmitConsignment,
}

/// A mutation received by the fake server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedMutation {
    Delivery(DeliveryRequest),
    Consignment(ConsignmentRequest),
}

#[derive(Debug, Clone)]
enum Injected {
    Transport(String),
    Rejection(String),
}

impl Injected {
    fn to_error(&self) -> SourceError {
        match self {
            Self::Transport(reason) => SourceError::HttpClient(reason.clone()),
            Self::Rejection(message) => SourceError::Rejected {
                code: "0".to_string(),
                message: message.clone(),
            },
        }
    }
}

struct MemoryState {
    fixture: Fixture,
    injected: HashMap<Endpoint, Injected>,
    mutations: Vec<RecordedMutation>,
    calls: HashMap<Endpoint, u32>,
    latency: Option<Duration>,
    next_id: i64,
}

/// In-memory `AssetApi`. Clones share state.
#[derive(Clone)]
pub struct MemoryAssetApi {
    state: Arc<Mutex<MemoryState>>,
    clock: Arc<dyn Clock>,
}

impl MemoryAssetApi {
    pub fn new(fixture: Fixture) -> Self {
        Self::with_clock(fixture, Arc::new(SystemClock))
    }

    /// Records created by mutations are stamped with `clock`.
    pub fn with_clock(fixture: Fixture, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                fixture,
                injected: HashMap::new(),
                mutations: Vec::new(),
                calls: HashMap::new(),
                latency: None,
                next_id: 900_000,
            })),
            clock,
        }
    }

    /// Fail every call to `endpoint` with a transport error.
    pub fn fail(&self, endpoint: Endpoint, reason: impl Into<String>) {
        self.state
            .lock()
            .injected
            .insert(endpoint, Injected::Transport(reason.into()));
    }

    /// Reject every call to `endpoint` with a business error carrying `message`.
    pub fn reject(&self, endpoint: Endpoint, message: impl Into<String>) {
        self.state
            .lock()
            .injected
            .insert(endpoint, Injected::Rejection(message.into()));
    }

    pub fn restore(&self, endpoint: Endpoint) {
        self.state.lock().injected.remove(&endpoint);
    }

    pub fn mutations(&self) -> Vec<RecordedMutation> {
        self.state.lock().mutations.clone()
    }

    pub fn call_count(&self, endpoint: Endpoint) -> u32 {
        self.state.lock().calls.get(&endpoint).copied().unwrap_or(0)
    }

    /// Current server-side state.
    pub fn fixture(&self) -> Fixture {
        self.state.lock().fixture.clone()
    }

    /// Delay every call by `latency` before it is served.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = Some(latency);
    }

    /// Count the call, wait out the latency, and return the injected
    /// failure, if any.
    async fn enter(&self, endpoint: Endpoint) -> SourceResult<()> {
        let latency = {
            let mut state = self.state.lock();
            *state.calls.entry(endpoint).or_insert(0) += 1;
            state.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match self.state.lock().injected.get(&endpoint) {
            Some(injected) => Err(injected.to_error()),
            None => Ok(()),
        }
    }

    fn stamp(&self) -> RawTimestamp {
        RawTimestamp::Unix(self.clock.now().timestamp())
    }
}

fn paginate<T: Clone>(records: &[T], request: PageRequest) -> Page<T> {
    let start = request.offset().min(records.len());
    let end = start.saturating_add(request.limit as usize).min(records.len());
    Page {
        records: records[start..end].to_vec(),
        total: Some(records.len() as u64),
        has_more: end < records.len(),
    }
}

fn stage_matches(order: &DeliveryOrder, stage: DeliveryStageFilter) -> bool {
    match (stage.as_param(), &order.stage) {
        (None, _) => true,
        (Some(wanted), Some(RawStatus::Text(actual))) => actual.eq_ignore_ascii_case(wanted),
        (Some(_), _) => false,
    }
}

fn is_holding(record: &PurchaseRecord, id: &HoldingId) -> bool {
    resolve_holding_id(record).as_ref() == Some(id)
}

impl AssetApi for MemoryAssetApi {
    async fn fetch_purchases(&self, page: PageRequest) -> SourceResult<PurchasePage> {
        self.enter(Endpoint::Purchases).await?;
        let state = self.state.lock();
        Ok(PurchasePage {
            page: paginate(&state.fixture.purchases, page),
            coupon_count: state.fixture.coupon_count,
        })
    }

    async fn fetch_delivery_orders(
        &self,
        page: PageRequest,
        stage: DeliveryStageFilter,
    ) -> SourceResult<Page<DeliveryOrder>> {
        self.enter(Endpoint::DeliveryOrders).await?;
        let state = self.state.lock();
        let matching: Vec<DeliveryOrder> = state
            .fixture
            .delivery_orders
            .iter()
            .filter(|order| stage_matches(order, stage))
            .cloned()
            .collect();
        Ok(paginate(&matching, page))
    }

    async fn fetch_consignments(
        &self,
        page: PageRequest,
        scope: ConsignmentScope,
    ) -> SourceResult<Page<ConsignmentRecord>> {
        let endpoint = match scope {
            ConsignmentScope::Mine => Endpoint::Consignments,
            ConsignmentScope::Market => Endpoint::Market,
        };
        self.enter(endpoint).await?;
        let state = self.state.lock();
        let records = match scope {
            ConsignmentScope::Mine => &state.fixture.consignments,
            ConsignmentScope::Market => &state.fixture.market,
        };
        Ok(paginate(records, page))
    }

    async fn submit_delivery(&self, request: &DeliveryRequest) -> SourceResult<MutationReply> {
        self.enter(Endpoint::SubmitDelivery).await?;
        let created_at = self.stamp();
        let mut state = self.state.lock();
        state
            .mutations
            .push(RecordedMutation::Delivery(request.clone()));

        let id = state.next_id;
        state.next_id += 1;
        state.fixture.delivery_orders.push(DeliveryOrder {
            id: Some(RawId::Number(id)),
            holding_id: Some(RawId::Text(request.holding_id.as_str().to_string())),
            collection_id: None,
            stage: Some(RawStatus::Text("paid".to_string())),
            status_text: None,
            created_at: Some(created_at),
        });

        debug!(holding = %request.holding_id, force = request.force, "Delivery recorded");
        Ok(MutationReply {
            message: "提货申请已提交".to_string(),
        })
    }

    async fn submit_consignment(&self, request: &ConsignmentRequest) -> SourceResult<MutationReply> {
        self.enter(Endpoint::SubmitConsignment).await?;
        let created_at = self.stamp();
        let mut state = self.state.lock();
        state
            .mutations
            .push(RecordedMutation::Consignment(request.clone()));

        let pending = RawStatus::Number(ConsignmentState::PendingReview.code());
        let id = state.next_id;
        state.next_id += 1;
        state.fixture.consignments.push(ConsignmentRecord {
            id: Some(RawId::Number(id)),
            holding_id: Some(RawId::Text(request.holding_id.as_str().to_string())),
            collection_id: None,
            status: Some(pending.clone()),
            price: Some(request.price),
            created_at: Some(created_at.clone()),
            updated_at: Some(created_at),
        });

        for record in state
            .fixture
            .purchases
            .iter_mut()
            .filter(|record| is_holding(record, &request.holding_id))
        {
            record.consignment_status = Some(pending.clone());
        }

        if let Some(coupons) = state.fixture.coupon_count.as_mut() {
            *coupons = coupons.saturating_sub(1);
        }

        debug!(holding = %request.holding_id, price = %request.price, "Consignment recorded");
        Ok(MutationReply {
            message: "寄售申请已提交".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use vault_core::Price;

    fn purchase(id: &str) -> PurchaseRecord {
        PurchaseRecord {
            holding_id: Some(RawId::Text(id.into())),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_paging() {
        let api = MemoryAssetApi::new(Fixture {
            purchases: vec![purchase("a"), purchase("b"), purchase("c")],
            ..Default::default()
        });

        let first = api.fetch_purchases(PageRequest::first(2)).await.unwrap();
        assert_eq!(first.page.records.len(), 2);
        assert!(first.page.has_more);

        let second = api
            .fetch_purchases(PageRequest::new(2, 2))
            .await
            .unwrap();
        assert_eq!(second.page.records.len(), 1);
        assert!(!second.page.has_more);

        let beyond = api
            .fetch_purchases(PageRequest::new(5, 2))
            .await
            .unwrap();
        assert!(beyond.page.records.is_empty());
        assert_eq!(api.call_count(Endpoint::Purchases), 3);
    }

    #[tokio::test]
    async fn test_stage_filter() {
        let api = MemoryAssetApi::new(Fixture {
            delivery_orders: vec![
                DeliveryOrder {
                    stage: Some(RawStatus::Text("paid".into())),
                    ..Default::default()
                },
                DeliveryOrder {
                    stage: Some(RawStatus::Text("shipped".into())),
                    ..Default::default()
                },
            ],
            ..Default::default()
        });

        let shipped = api
            .fetch_delivery_orders(PageRequest::first(10), DeliveryStageFilter::Shipped)
            .await
            .unwrap();
        assert_eq!(shipped.records.len(), 1);

        let all = api
            .fetch_delivery_orders(PageRequest::first(10), DeliveryStageFilter::All)
            .await
            .unwrap();
        assert_eq!(all.records.len(), 2);
    }

    #[tokio::test]
    async fn test_consignment_updates_state() {
        let api = MemoryAssetApi::new(Fixture {
            purchases: vec![purchase("h1")],
            coupon_count: Some(1),
            ..Default::default()
        });

        tokio_test::assert_ok!(
            api.submit_consignment(&ConsignmentRequest {
                holding_id: HoldingId::new("h1"),
                price: Price::new(dec!(88)),
            })
            .await
        );

        let fixture = api.fixture();
        assert_eq!(fixture.coupon_count, Some(0));
        assert_eq!(fixture.consignments.len(), 1);
        assert_eq!(
            fixture.purchases[0].consignment_status,
            Some(RawStatus::Number(1))
        );
        assert_eq!(api.mutations().len(), 1);
    }

    #[tokio::test]
    async fn test_rejection_leaves_state_untouched() {
        let api = MemoryAssetApi::new(Fixture {
            purchases: vec![purchase("h1")],
            ..Default::default()
        });
        api.reject(Endpoint::SubmitDelivery, "收货地址无效");

        let err = tokio_test::assert_err!(
            api.submit_delivery(&DeliveryRequest {
                holding_id: HoldingId::new("h1"),
                address_id: None,
                force: false,
            })
            .await
        );

        assert_eq!(err.to_string(), "收货地址无效");
        assert!(api.fixture().delivery_orders.is_empty());
        assert!(api.mutations().is_empty());
    }

    #[test]
    fn test_fixture_from_json() {
        let fixture = Fixture::from_json(
            r#"{"purchases":[{"holding_id":"h1","pay_time":"2026-01-01 10:00:00"}],"coupon_count":3}"#,
        )
        .unwrap();
        assert_eq!(fixture.purchases.len(), 1);
        assert_eq!(fixture.coupon_count, Some(3));
        assert!(fixture.market.is_empty());
    }
}
