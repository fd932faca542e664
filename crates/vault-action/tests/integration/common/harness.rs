//! Test harness: a `MemoryAssetApi` server, a manual clock and a
//! controller wired the way the binary wires them.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use vault_action::{ActionController, Portfolio, PortfolioPage, PortfolioRow};
use vault_core::{
    ConsignmentRecord, DeliveryOrder, HoldingId, ManualClock, PurchaseRecord, RawId, RawStatus,
    RawTimestamp,
};
use vault_gate::EligibilityGate;
use vault_reconcile::ReconcileOptions;
use vault_source::{FetchLimits, Fixture, MemoryAssetApi, PageRequest};

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 20, 9, 30, 0).unwrap()
}

pub fn hours_ago(hours: i64) -> RawTimestamp {
    RawTimestamp::Unix(now().timestamp() - hours * 3600)
}

pub fn purchase(id: &str, paid_hours_ago: i64) -> PurchaseRecord {
    PurchaseRecord {
        holding_id: Some(RawId::Text(id.into())),
        title: Some(format!("Collectible {id}")),
        pay_time: Some(hours_ago(paid_hours_ago)),
        ..Default::default()
    }
}

pub fn listing(id: &str, status: i64, touched_hours_ago: i64) -> ConsignmentRecord {
    ConsignmentRecord {
        holding_id: Some(RawId::Text(id.into())),
        status: Some(RawStatus::Number(status)),
        updated_at: Some(hours_ago(touched_hours_ago)),
        ..Default::default()
    }
}

pub fn delivery_order(id: &str, stage: &str) -> DeliveryOrder {
    DeliveryOrder {
        holding_id: Some(RawId::Text(id.into())),
        stage: Some(RawStatus::Text(stage.into())),
        created_at: Some(hours_ago(1)),
        ..Default::default()
    }
}

pub struct Harness {
    pub api: MemoryAssetApi,
    pub clock: ManualClock,
    pub controller: ActionController<MemoryAssetApi, ManualClock>,
}

impl Harness {
    pub fn new(fixture: Fixture) -> Self {
        let api = MemoryAssetApi::new(fixture);
        let clock = ManualClock::new(now());
        let portfolio = Portfolio::new(
            Arc::new(api.clone()),
            clock.clone(),
            EligibilityGate::default(),
            ReconcileOptions::default(),
            FetchLimits::default(),
        );
        Self {
            api,
            clock,
            controller: ActionController::new(Arc::new(portfolio)),
        }
    }

    pub async fn load(&self) -> PortfolioPage {
        self.controller
            .portfolio()
            .load(PageRequest::first(20))
            .await
            .into_page()
            .expect("load was not superseded")
    }

    pub async fn row(&self, id: &str) -> PortfolioRow {
        self.load()
            .await
            .get(&HoldingId::new(id))
            .cloned()
            .expect("holding on page")
    }
}
