//! Command orchestration.

use std::sync::Arc;

use tracing::{debug, info};

use vault_action::{ActionController, DeliverCommand, Portfolio, PortfolioPage, PortfolioRow};
use vault_core::{ConsignmentRecord, DeliveryOrder, HoldingId, Price, RawId, SystemClock};
use vault_gate::{format_remaining, CountdownState, CountdownTimer, EligibilityGate, Verdict};
use vault_source::{
    AssetApi, ConsignmentRequest, ConsignmentScope, DeliveryRequest, DeliveryStageFilter,
    HttpAssetApi, MemoryAssetApi, MutationReply, Page, PageRequest, PurchasePage, SourceResult,
};
use vault_telemetry::Metrics;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};

/// Where holdings come from.
pub enum Backend {
    Http(HttpAssetApi),
    /// Fixture file, for offline runs.
    Memory(MemoryAssetApi),
}

impl AssetApi for Backend {
    async fn fetch_purchases(&self, page: PageRequest) -> SourceResult<PurchasePage> {
        match self {
            Self::Http(api) => api.fetch_purchases(page).await,
            Self::Memory(api) => api.fetch_purchases(page).await,
        }
    }

    async fn fetch_delivery_orders(
        &self,
        page: PageRequest,
        stage: DeliveryStageFilter,
    ) -> SourceResult<Page<DeliveryOrder>> {
        match self {
            Self::Http(api) => api.fetch_delivery_orders(page, stage).await,
            Self::Memory(api) => api.fetch_delivery_orders(page, stage).await,
        }
    }

    async fn fetch_consignments(
        &self,
        page: PageRequest,
        scope: ConsignmentScope,
    ) -> SourceResult<Page<ConsignmentRecord>> {
        match self {
            Self::Http(api) => api.fetch_consignments(page, scope).await,
            Self::Memory(api) => api.fetch_consignments(page, scope).await,
        }
    }

    async fn submit_delivery(&self, request: &DeliveryRequest) -> SourceResult<MutationReply> {
        match self {
            Self::Http(api) => api.submit_delivery(request).await,
            Self::Memory(api) => api.submit_delivery(request).await,
        }
    }

    async fn submit_consignment(&self, request: &ConsignmentRequest) -> SourceResult<MutationReply> {
        match self {
            Self::Http(api) => api.submit_consignment(request).await,
            Self::Memory(api) => api.submit_consignment(request).await,
        }
    }
}

/// Main application.
pub struct Application {
    controller: ActionController<Backend, SystemClock>,
    config: AppConfig,
}

impl Application {
    pub fn new(config: AppConfig, backend: Backend) -> AppResult<Self> {
        config.validate()?;

        let portfolio = Portfolio::new(
            Arc::new(backend),
            SystemClock,
            EligibilityGate::new(config.gate.clone()),
            config.source.reconcile_options()?,
            config.source.limits(),
        );

        Ok(Self {
            controller: ActionController::new(Arc::new(portfolio)),
            config,
        })
    }

    fn portfolio(&self) -> &Portfolio<Backend, SystemClock> {
        self.controller.portfolio()
    }

    async fn load(&self, request: PageRequest) -> AppResult<PortfolioPage> {
        self.portfolio()
            .load(request)
            .await
            .into_page()
            .ok_or(AppError::Superseded)
    }

    async fn find(&self, id: &str, request: PageRequest) -> AppResult<PortfolioRow> {
        let page = self.load(request).await?;
        page.get(&HoldingId::new(id))
            .cloned()
            .ok_or_else(|| AppError::HoldingNotFound(id.to_string(), request.page))
    }

    /// `vault list`
    pub async fn list(&self, request: PageRequest, json: bool) -> AppResult<()> {
        let page = self.load(request).await?;

        if json {
            let rendered = serde_json::to_string_pretty(&page)
                .map_err(|e| AppError::InvalidInput(format!("cannot render page: {e}")))?;
            println!("{rendered}");
            return Ok(());
        }

        for (stream, reason) in &page.health.unavailable {
            println!("! {stream} unavailable: {reason}");
        }
        println!(
            "{:<14} {:<24} {:<18} {:<22} {:<22}",
            "ID", "TITLE", "STATUS", "DELIVER", "CONSIGN"
        );
        for row in &page.rows {
            println!(
                "{:<14} {:<24} {:<18} {:<22} {:<22}",
                row.holding.id.as_str(),
                truncate(&row.holding.title, 24),
                row.holding.display.text(),
                deliver_cell(row),
                verdict_cell(&row.eligibility.consign),
            );
        }
        for record in &page.unresolved {
            println!(
                "? record #{} ({}) has no holding id, order {}",
                record.purchase_index,
                record.title.as_deref().unwrap_or("untitled"),
                record.order_id.as_deref().unwrap_or("-"),
            );
        }
        println!(
            "page {} | {} shown | total {} | coupons {}{}",
            page.request.page,
            page.rows.len(),
            page.total.map_or_else(|| "?".to_string(), |t| t.to_string()),
            page.coupons,
            if page.has_more { " | more" } else { "" },
        );
        Ok(())
    }

    /// `vault deliver`
    pub async fn deliver(
        &self,
        id: &str,
        request: PageRequest,
        address_id: Option<String>,
        acknowledge_forced: bool,
    ) -> AppResult<()> {
        let row = self.find(id, request).await?;
        let outcome = self
            .controller
            .deliver(
                &row.holding,
                DeliverCommand {
                    address_id,
                    acknowledge_forced,
                },
            )
            .await?;
        println!("{}", outcome.message);
        if let Some(row) = outcome.reload.page().and_then(|p| p.get(&row.holding.id)) {
            println!("{}: {}", row.holding.id, row.holding.display.text());
        }
        Ok(())
    }

    /// `vault consign`
    pub async fn consign(&self, id: &str, request: PageRequest, price: &str) -> AppResult<()> {
        let price: Price = price
            .parse()
            .map_err(|e| AppError::InvalidInput(format!("price {price:?}: {e}")))?;
        let page = self.load(request).await?;
        let row = page
            .get(&HoldingId::new(id))
            .ok_or_else(|| AppError::HoldingNotFound(id.to_string(), request.page))?;

        let outcome = self
            .controller
            .consign(&row.holding, price, page.coupons)
            .await?;
        println!("{}", outcome.message);
        if let Some(reloaded) = outcome.reload.page() {
            println!("coupons left: {}", reloaded.coupons);
        }
        Ok(())
    }

    /// `vault countdown`: follow the holding-period countdown until it
    /// expires or the user interrupts.
    pub async fn countdown(&self, id: &str, request: PageRequest) -> AppResult<()> {
        let row = self.find(id, request).await?;
        let mut timer = CountdownTimer::new(
            self.portfolio().gate().clone(),
            SystemClock,
            &self.config.countdown,
        );
        let mut rx = timer.open(&row.holding);
        let running = timer.is_running();
        if running {
            Metrics::countdown_started();
        }

        loop {
            let state = rx.borrow_and_update().clone();
            match &state {
                CountdownState::Idle => {
                    println!("{}: no countdown ({})", row.holding.id, row.holding.display.text());
                    break;
                }
                CountdownState::Ticking { remaining_secs, .. } => {
                    println!("{}: {}", row.holding.id, format_remaining(*remaining_secs));
                }
                CountdownState::Expired { .. } => {
                    println!("{}: holding period over", row.holding.id);
                    break;
                }
            }

            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        debug!("Countdown channel closed");
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, closing countdown");
                    break;
                }
            }
        }

        timer.close();
        if running {
            Metrics::countdown_stopped();
        }
        Ok(())
    }

    /// `vault market`
    pub async fn market(&self, request: PageRequest) -> AppResult<()> {
        let page = self.portfolio().market(request).await?;
        println!("{:<14} {:<14} {:>12}", "LISTING", "HOLDING", "PRICE");
        for listing in &page.records {
            println!(
                "{:<14} {:<14} {:>12}",
                key_or_dash(listing.id.as_ref()),
                key_or_dash(listing.holding_id.as_ref().or(listing.collection_id.as_ref())),
                listing.price.map_or_else(|| "-".to_string(), |p| p.to_string()),
            );
        }
        println!(
            "page {} | {} shown{}",
            request.page,
            page.records.len(),
            if page.has_more { " | more" } else { "" }
        );
        Ok(())
    }
}

fn deliver_cell(row: &PortfolioRow) -> String {
    match &row.eligibility.deliver {
        Verdict::Allowed if row.eligibility.is_forced_delivery() => "yes (forced)".to_string(),
        verdict => verdict_cell(verdict),
    }
}

fn verdict_cell(verdict: &Verdict) -> String {
    match verdict {
        Verdict::Allowed => "yes".to_string(),
        Verdict::Denied(reason) => format!("no: {}", reason.code()),
    }
}

fn key_or_dash(id: Option<&RawId>) -> String {
    id.and_then(RawId::as_key).unwrap_or_else(|| "-".to_string())
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_core::{PurchaseRecord, RawTimestamp};
    use vault_source::{Fixture, RecordedMutation};

    fn app(fixture: Fixture) -> (Application, MemoryAssetApi) {
        let api = MemoryAssetApi::new(fixture);
        let app = Application::new(AppConfig::default(), Backend::Memory(api.clone())).unwrap();
        (app, api)
    }

    fn old_purchase(id: &str) -> PurchaseRecord {
        PurchaseRecord {
            holding_id: Some(RawId::Text(id.into())),
            pay_time: Some(RawTimestamp::Text("2020-01-01 08:00:00".into())),
            ..Default::default()
        }
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("数字藏品测试名称", 4), "数字藏…");
    }

    #[tokio::test]
    async fn test_unknown_holding() {
        let (app, _) = app(Fixture::default());
        let err = app
            .deliver("missing", PageRequest::first(20), None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::HoldingNotFound(_, 1)));
    }

    #[tokio::test]
    async fn test_consign_parses_price() {
        let (app, api) = app(Fixture {
            purchases: vec![old_purchase("h1")],
            coupon_count: Some(1),
            ..Default::default()
        });

        let err = app
            .consign("h1", PageRequest::first(20), "abc")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        app.consign("h1", PageRequest::first(20), "128.80")
            .await
            .unwrap();
        assert!(matches!(
            api.mutations().as_slice(),
            [RecordedMutation::Consignment(request)] if request.price.to_string() == "128.80"
        ));
    }

    #[tokio::test]
    async fn test_expired_countdown_is_not_counted_as_running() {
        let (app, _) = app(Fixture {
            purchases: vec![old_purchase("h1")],
            ..Default::default()
        });
        let before = vault_telemetry::metrics::COUNTDOWNS_ACTIVE.get();
        app.countdown("h1", PageRequest::first(20)).await.unwrap();
        assert_eq!(vault_telemetry::metrics::COUNTDOWNS_ACTIVE.get(), before);
    }

    #[tokio::test]
    async fn test_demo_fixture_loads() {
        let fixture = Fixture::from_json(include_str!("../../../fixtures/demo.json")).unwrap();
        let (app, _) = app(fixture);

        let page = app.load(PageRequest::first(20)).await.unwrap();
        assert_eq!(page.rows.len(), 5);
        assert_eq!(page.unresolved.len(), 1);
        assert_eq!(page.coupons, 2);

        let status = |id: &str| page.get(&HoldingId::new(id)).unwrap().holding.display.text();
        assert_eq!(status("H-1002"), "寄售中");
        assert_eq!(status("H-1003"), "已售出");
        assert_eq!(status("H-1004"), "待提货");
        assert_eq!(status("H-1005"), "待收货");
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = AppConfig::default();
        config.source.page_size = 0;
        let result = Application::new(config, Backend::Memory(MemoryAssetApi::new(Fixture::default())));
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
