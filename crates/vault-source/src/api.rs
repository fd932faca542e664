//! Endpoint contracts.

use std::future::Future;

use serde::{Deserialize, Serialize};

use vault_core::{ConsignmentRecord, DeliveryOrder, HoldingId, Price, PurchaseRecord};

use crate::error::SourceResult;

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.max(1),
        }
    }

    pub fn first(limit: u32) -> Self {
        Self::new(1, limit)
    }

    pub fn next(self) -> Self {
        Self::new(self.page.saturating_add(1), self.limit)
    }

    /// Zero-based offset of the first record. Page 0 reads as page 1.
    pub fn offset(self) -> usize {
        (self.page as usize).saturating_sub(1) * self.limit as usize
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first(20)
    }
}

/// One page of a list endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub records: Vec<T>,
    pub total: Option<u64>,
    pub has_more: bool,
}

/// Holding history page; the coupon balance rides along with it.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchasePage {
    pub page: Page<PurchaseRecord>,
    pub coupon_count: Option<u32>,
}

/// Delivery order list filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStageFilter {
    #[default]
    All,
    Paid,
    Shipped,
    Completed,
}

impl DeliveryStageFilter {
    pub fn as_param(self) -> Option<&'static str> {
        match self {
            Self::All => None,
            Self::Paid => Some("paid"),
            Self::Shipped => Some("shipped"),
            Self::Completed => Some("completed"),
        }
    }
}

/// Consignment list scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsignmentScope {
    /// The user's own listings, past and present.
    Mine,
    /// The public secondary market.
    Market,
}

/// Delivery submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRequest {
    pub holding_id: HoldingId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_id: Option<String>,
    /// Pull-back of a previously listed holding, confirmed by the user.
    pub force: bool,
}

/// Consignment listing submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsignmentRequest {
    pub holding_id: HoldingId,
    pub price: Price,
}

/// Successful mutation reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationReply {
    pub message: String,
}

/// Read/write endpoints consumed by the client.
///
/// Implementations must not retry: every call maps to at most one request.
pub trait AssetApi: Send + Sync {
    fn fetch_purchases(
        &self,
        page: PageRequest,
    ) -> impl Future<Output = SourceResult<PurchasePage>> + Send;

    fn fetch_delivery_orders(
        &self,
        page: PageRequest,
        stage: DeliveryStageFilter,
    ) -> impl Future<Output = SourceResult<Page<DeliveryOrder>>> + Send;

    fn fetch_consignments(
        &self,
        page: PageRequest,
        scope: ConsignmentScope,
    ) -> impl Future<Output = SourceResult<Page<ConsignmentRecord>>> + Send;

    fn submit_delivery(
        &self,
        request: &DeliveryRequest,
    ) -> impl Future<Output = SourceResult<MutationReply>> + Send;

    fn submit_consignment(
        &self,
        request: &ConsignmentRequest,
    ) -> impl Future<Output = SourceResult<MutationReply>> + Send;
}
