//! Portfolio loading.
//!
//! One load = concurrent fetch of the three streams, one reconciliation
//! pass, and a gate evaluation per holding at a single instant. Nothing is
//! cached between loads: an action or a page change rebuilds everything.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use vault_core::{Clock, ConsignmentRecord, Holding, HoldingId};
use vault_gate::{Eligibility, EligibilityGate};
use vault_reconcile::{
    reconcile, Diagnostic, ReconcileOptions, SourceHealth, Stream, UnresolvedRecord,
};
use vault_source::{
    fetch_snapshot, AssetApi, ConsignmentScope, FetchLimits, FetchedPage, Page, PageRequest,
    SourceResult,
};
use vault_telemetry::Metrics;

/// A holding with its permissions at load time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioRow {
    pub holding: Holding,
    pub eligibility: Eligibility,
}

/// One reconciled page of the user's holdings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioPage {
    pub request: PageRequest,
    pub rows: Vec<PortfolioRow>,
    /// Purchase records without a usable id, shown as integrity errors.
    pub unresolved: Vec<UnresolvedRecord>,
    pub total: Option<u64>,
    pub has_more: bool,
    /// Consignment coupons; 0 when the balance was not reported.
    pub coupons: u32,
    pub health: SourceHealth,
    pub diagnostics: Vec<Diagnostic>,
    /// Instant the eligibility was evaluated at.
    pub evaluated_at: DateTime<Utc>,
}

impl PortfolioPage {
    pub fn get(&self, id: &HoldingId) -> Option<&PortfolioRow> {
        self.rows.iter().find(|row| &row.holding.id == id)
    }

    pub fn holdings(&self) -> impl Iterator<Item = &Holding> {
        self.rows.iter().map(|row| &row.holding)
    }

    pub fn is_degraded(&self) -> bool {
        self.health.is_degraded()
    }
}

/// Result of a load.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded(PortfolioPage),
    /// A newer load or `detach()` happened while this one was in flight;
    /// the result was dropped.
    Superseded,
}

impl LoadOutcome {
    pub fn page(&self) -> Option<&PortfolioPage> {
        match self {
            Self::Loaded(page) => Some(page),
            Self::Superseded => None,
        }
    }

    pub fn into_page(self) -> Option<PortfolioPage> {
        match self {
            Self::Loaded(page) => Some(page),
            Self::Superseded => None,
        }
    }
}

/// Loader for the holdings view.
pub struct Portfolio<A: AssetApi, C: Clock> {
    api: Arc<A>,
    clock: C,
    gate: EligibilityGate,
    options: ReconcileOptions,
    limits: FetchLimits,
    last_request: Mutex<Option<PageRequest>>,
    generation: AtomicU64,
}

impl<A: AssetApi, C: Clock> Portfolio<A, C> {
    pub fn new(
        api: Arc<A>,
        clock: C,
        gate: EligibilityGate,
        options: ReconcileOptions,
        limits: FetchLimits,
    ) -> Self {
        Self {
            api,
            clock,
            gate,
            options,
            limits,
            last_request: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn gate(&self) -> &EligibilityGate {
        &self.gate
    }

    pub fn last_request(&self) -> Option<PageRequest> {
        *self.last_request.lock()
    }

    /// Load one page of holdings.
    pub async fn load(&self, request: PageRequest) -> LoadOutcome {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_request.lock() = Some(request);
        let started = Instant::now();

        let fetched = fetch_snapshot(self.api.as_ref(), request, &self.limits).await;

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(page = request.page, generation, "Load superseded, dropping result");
            return LoadOutcome::Superseded;
        }

        let page = self.assemble(fetched);
        Metrics::page_loaded(started.elapsed().as_secs_f64() * 1000.0);
        LoadOutcome::Loaded(page)
    }

    /// Load the last requested page again (first page if none).
    pub async fn reload(&self) -> LoadOutcome {
        let request = self.last_request().unwrap_or_default();
        self.load(request).await
    }

    /// Drop the results of every in-flight load.
    pub fn detach(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Public consignment market listings. Read-only; not reconciled.
    pub async fn market(&self, request: PageRequest) -> SourceResult<Page<ConsignmentRecord>> {
        self.api
            .fetch_consignments(request, ConsignmentScope::Market)
            .await
    }

    fn assemble(&self, fetched: FetchedPage) -> PortfolioPage {
        let FetchedPage {
            request,
            snapshot,
            total,
            has_more,
            coupon_count,
        } = fetched;

        let reconciliation = reconcile(&snapshot, &self.options);
        reconciliation.log_diagnostics();
        record_metrics(&reconciliation.health, &reconciliation.diagnostics);

        let coupons = coupon_count.unwrap_or_else(|| {
            if snapshot.purchases.is_available() {
                warn!("Coupon balance missing from response, treating as 0");
            }
            0
        });
        Metrics::coupons_set(coupons);

        let now = self.clock.now();
        let rows: Vec<PortfolioRow> = reconciliation
            .holdings()
            .map(|holding| PortfolioRow {
                eligibility: self.gate.evaluate(holding, now, coupons),
                holding: holding.clone(),
            })
            .collect();

        let mut by_status: BTreeMap<&str, i64> = BTreeMap::new();
        for row in &rows {
            *by_status.entry(row.holding.display.kind()).or_insert(0) += 1;
        }
        Metrics::holdings_set(&by_status.into_iter().collect::<Vec<_>>());

        let unresolved: Vec<UnresolvedRecord> = reconciliation.unresolved().cloned().collect();

        info!(
            page = request.page,
            holdings = rows.len(),
            unresolved = unresolved.len(),
            coupons,
            degraded = reconciliation.health.is_degraded(),
            "Portfolio page loaded"
        );

        PortfolioPage {
            request,
            rows,
            unresolved,
            total,
            has_more,
            coupons,
            health: reconciliation.health,
            diagnostics: reconciliation.diagnostics,
            evaluated_at: now,
        }
    }
}

fn record_metrics(health: &SourceHealth, diagnostics: &[Diagnostic]) {
    for stream in [Stream::Purchases, Stream::DeliveryOrders, Stream::Consignments] {
        if health.is_available(stream) {
            Metrics::source_fetched(stream.as_str());
        } else {
            Metrics::source_unavailable(stream.as_str());
        }
    }
    for diagnostic in diagnostics {
        Metrics::diagnostic(diagnostic.kind());
        if let Diagnostic::UnrecognizedStatus { field, .. } = diagnostic {
            Metrics::unrecognized_status(field.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use vault_core::{ManualClock, PurchaseRecord, RawId, RawStatus, RawTimestamp};
    use vault_source::{Endpoint, Fixture, MemoryAssetApi};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn purchase(id: &str, paid_hours_ago: i64) -> PurchaseRecord {
        PurchaseRecord {
            holding_id: Some(RawId::Text(id.into())),
            title: Some(format!("Item {id}")),
            pay_time: Some(RawTimestamp::Unix(now().timestamp() - paid_hours_ago * 3600)),
            ..Default::default()
        }
    }

    fn portfolio(fixture: Fixture) -> (Portfolio<MemoryAssetApi, ManualClock>, MemoryAssetApi) {
        let api = MemoryAssetApi::new(fixture);
        let portfolio = Portfolio::new(
            Arc::new(api.clone()),
            ManualClock::new(now()),
            EligibilityGate::default(),
            ReconcileOptions::default(),
            FetchLimits::default(),
        );
        (portfolio, api)
    }

    #[tokio::test]
    async fn test_load_annotates_rows() {
        let (portfolio, _) = portfolio(Fixture {
            purchases: vec![purchase("a", 50), purchase("b", 2)],
            coupon_count: Some(1),
            ..Default::default()
        });

        let page = portfolio
            .load(PageRequest::first(20))
            .await
            .into_page()
            .unwrap();

        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.coupons, 1);
        assert_eq!(page.evaluated_at, now());

        let a = page.get(&HoldingId::new("a")).unwrap();
        assert!(a.eligibility.can_deliver());
        assert!(a.eligibility.can_consign());

        let b = page.get(&HoldingId::new("b")).unwrap();
        assert!(!b.eligibility.can_deliver());
        assert_eq!(b.eligibility.remaining_secs, Some(46 * 3600));
    }

    #[tokio::test]
    async fn test_missing_coupon_balance_counts_as_zero() {
        let (portfolio, _) = portfolio(Fixture {
            purchases: vec![purchase("a", 50)],
            coupon_count: None,
            ..Default::default()
        });

        let page = portfolio
            .load(PageRequest::first(20))
            .await
            .into_page()
            .unwrap();

        assert_eq!(page.coupons, 0);
        assert!(!page.rows[0].eligibility.can_consign());
    }

    #[tokio::test]
    async fn test_pay_time_near_calendar_limit_loads() {
        let (portfolio, _) = portfolio(Fixture {
            purchases: vec![PurchaseRecord {
                holding_id: Some(RawId::Text("h1".into())),
                pay_time: Some(RawTimestamp::Unix(8_210_266_876_799_000)),
                ..Default::default()
            }],
            coupon_count: Some(2),
            ..Default::default()
        });

        let page = portfolio
            .load(PageRequest::first(20))
            .await
            .into_page()
            .unwrap();

        let row = page.get(&HoldingId::new("h1")).unwrap();
        assert!(!row.eligibility.can_deliver());
        assert!(!row.eligibility.can_consign());
        assert_eq!(row.eligibility.remaining_secs, None);
    }

    #[tokio::test]
    async fn test_unresolved_purchase_is_surfaced() {
        let (portfolio, _) = portfolio(Fixture {
            purchases: vec![
                purchase("a", 50),
                PurchaseRecord {
                    title: Some("Orphan".into()),
                    status: Some(RawStatus::Number(1)),
                    ..Default::default()
                },
            ],
            ..Default::default()
        });

        let page = portfolio
            .load(PageRequest::first(20))
            .await
            .into_page()
            .unwrap();

        assert_eq!(page.rows.len(), 1);
        assert_eq!(page.unresolved.len(), 1);
        assert_eq!(page.unresolved[0].title.as_deref(), Some("Orphan"));
    }

    #[tokio::test]
    async fn test_reload_repeats_last_request() {
        let (portfolio, api) = portfolio(Fixture {
            purchases: (0..5).map(|i| purchase(&format!("h{i}"), 50)).collect(),
            ..Default::default()
        });

        portfolio.load(PageRequest::new(2, 2)).await;
        let page = portfolio.reload().await.into_page().unwrap();

        assert_eq!(page.request, PageRequest::new(2, 2));
        assert_eq!(page.rows[0].holding.id, HoldingId::new("h2"));
        assert_eq!(api.call_count(Endpoint::Purchases), 2);
    }

    #[tokio::test]
    async fn test_detach_drops_in_flight_result() {
        let (portfolio, api) = portfolio(Fixture {
            purchases: vec![purchase("a", 50)],
            ..Default::default()
        });
        api.set_latency(std::time::Duration::from_millis(20));
        let portfolio = Arc::new(portfolio);

        let load = {
            let portfolio = portfolio.clone();
            async move { portfolio.load(PageRequest::first(20)).await }
        };
        let detach = async {
            portfolio.detach();
        };

        let (outcome, _) = tokio::join!(load, detach);
        assert_eq!(outcome, LoadOutcome::Superseded);
    }
}
