//! Upstream record types.
//!
//! These mirror the JSON payloads of the three list endpoints. Every field
//! is optional: the endpoints have drifted across API versions and a
//! missing field must degrade the derived view, not fail the whole page.

use serde::{Deserialize, Serialize};

use crate::decimal::{deserialize_opt_price, Price};
use crate::raw::{RawId, RawStatus, RawTimestamp};

/// One paid order line for a collectible, from the holding history list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    /// Record id (the holding list row).
    #[serde(default)]
    pub id: Option<RawId>,
    /// Enclosing order id.
    #[serde(default, alias = "orderId")]
    pub order_id: Option<RawId>,
    /// Explicit holding id. Newer API versions only.
    #[serde(default, alias = "holdingId", alias = "nft_id")]
    pub holding_id: Option<RawId>,
    /// Alternate collection id used by older endpoints.
    #[serde(default, alias = "collectionId")]
    pub collection_id: Option<RawId>,
    /// Catalog item id.
    #[serde(default, alias = "goods_id")]
    pub item_id: Option<RawId>,
    #[serde(default, alias = "name")]
    pub title: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_price")]
    pub price: Option<Price>,
    /// Time the order was paid; starts the holding period.
    #[serde(default, alias = "buy_time")]
    pub pay_time: Option<RawTimestamp>,
    /// Raw order status; informational only.
    #[serde(default)]
    pub status: Option<RawStatus>,
    #[serde(default, alias = "consign_status")]
    pub consignment_status: Option<RawStatus>,
    #[serde(default)]
    pub delivery_status: Option<RawStatus>,
}

/// A shipment or pickup request created for one holding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryOrder {
    /// Delivery order id.
    #[serde(default)]
    pub id: Option<RawId>,
    #[serde(default, alias = "holdingId", alias = "nft_id")]
    pub holding_id: Option<RawId>,
    #[serde(default, alias = "collectionId")]
    pub collection_id: Option<RawId>,
    /// Stage label: `paid`, `shipped` or `completed`, or a localized form.
    #[serde(default)]
    pub stage: Option<RawStatus>,
    /// Human status text shown to the user.
    #[serde(default, alias = "status_text_display")]
    pub status_text: Option<String>,
    #[serde(default, alias = "createtime")]
    pub created_at: Option<RawTimestamp>,
}

/// A resale listing of one holding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsignmentRecord {
    /// Listing id.
    #[serde(default)]
    pub id: Option<RawId>,
    #[serde(default, alias = "holdingId", alias = "nft_id")]
    pub holding_id: Option<RawId>,
    #[serde(default, alias = "collectionId")]
    pub collection_id: Option<RawId>,
    /// 0=none, 1=pending review, 2=listed, 3=failed, 4=sold.
    #[serde(default)]
    pub status: Option<RawStatus>,
    #[serde(default, deserialize_with = "deserialize_opt_price")]
    pub price: Option<Price>,
    #[serde(default, alias = "createtime")]
    pub created_at: Option<RawTimestamp>,
    #[serde(default, alias = "updatetime")]
    pub updated_at: Option<RawTimestamp>,
}

impl ConsignmentRecord {
    /// Most recent timestamp on the record, for ordering listing history.
    pub fn last_touched(&self) -> Option<&RawTimestamp> {
        self.updated_at.as_ref().or(self.created_at.as_ref())
    }
}
