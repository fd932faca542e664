//! HTTP client for the holdings endpoints.
//!
//! Token-authenticated JSON over HTTPS. No retries and no backoff beyond
//! the transport timeout: mutations are user-initiated financial actions
//! and must never be replayed silently.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use vault_core::{ConsignmentRecord, DeliveryOrder};

use crate::api::{
    AssetApi, ConsignmentRequest, ConsignmentScope, DeliveryRequest, DeliveryStageFilter,
    MutationReply, Page, PageRequest, PurchasePage,
};
use crate::error::{SourceError, SourceResult};
use crate::wire::{decode_envelope, decode_list};

/// Endpoint paths, relative to `ApiConfig::base_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoints {
    #[serde(default = "default_purchases_path")]
    pub purchases: String,
    #[serde(default = "default_delivery_orders_path")]
    pub delivery_orders: String,
    #[serde(default = "default_my_consignments_path")]
    pub my_consignments: String,
    #[serde(default = "default_market_consignments_path")]
    pub market_consignments: String,
    #[serde(default = "default_submit_delivery_path")]
    pub submit_delivery: String,
    #[serde(default = "default_submit_consignment_path")]
    pub submit_consignment: String,
}

fn default_purchases_path() -> String {
    "/api/collection/holdings".to_string()
}

fn default_delivery_orders_path() -> String {
    "/api/delivery/orders".to_string()
}

fn default_my_consignments_path() -> String {
    "/api/consign/mine".to_string()
}

fn default_market_consignments_path() -> String {
    "/api/consign/market".to_string()
}

fn default_submit_delivery_path() -> String {
    "/api/delivery/submit".to_string()
}

fn default_submit_consignment_path() -> String {
    "/api/consign/submit".to_string()
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            purchases: default_purchases_path(),
            delivery_orders: default_delivery_orders_path(),
            my_consignments: default_my_consignments_path(),
            market_consignments: default_market_consignments_path(),
            submit_delivery: default_submit_delivery_path(),
            submit_consignment: default_submit_consignment_path(),
        }
    }
}

/// API client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL, e.g. `https://shop.example.com`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Session token. Can also be supplied through `VAULT_TOKEN`.
    #[serde(default)]
    pub token: Option<String>,
    /// Header carrying the token. Default: `token`.
    #[serde(default = "default_token_header")]
    pub token_header: String,
    /// Request timeout (ms). Default: 10,000.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Envelope `code` meaning success. Default: 1.
    #[serde(default = "default_success_code")]
    pub success_code: i64,
    #[serde(default)]
    pub endpoints: Endpoints,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_token_header() -> String {
    "token".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_success_code() -> i64 {
    1
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            token_header: default_token_header(),
            timeout_ms: default_timeout_ms(),
            success_code: default_success_code(),
            endpoints: Endpoints::default(),
        }
    }
}

/// reqwest-backed `AssetApi`.
pub struct HttpAssetApi {
    client: Client,
    config: ApiConfig,
}

impl HttpAssetApi {
    pub fn new(config: ApiConfig) -> SourceResult<Self> {
        if config.base_url.trim().is_empty() {
            return Err(SourceError::Config("api.base_url is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| SourceError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => builder.header(self.config.token_header.as_str(), token.as_str()),
            None => builder,
        }
    }

    /// Send and return the body of a 2xx response.
    async fn send(&self, builder: RequestBuilder) -> SourceResult<String> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| SourceError::HttpClient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SourceError::HttpClient(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(SourceError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    async fn get_list<T: DeserializeOwned>(
        &self,
        path: &str,
        page: PageRequest,
        extra: &[(&str, &str)],
    ) -> SourceResult<(Page<T>, Option<u32>)> {
        let url = self.url(path);
        debug!(url = %url, page = page.page, limit = page.limit, "Fetching list");

        let mut query: Vec<(&str, String)> = vec![
            ("page", page.page.to_string()),
            ("limit", page.limit.to_string()),
        ];
        query.extend(extra.iter().map(|(k, v)| (*k, v.to_string())));

        let body = self.send(self.client.get(&url).query(&query)).await?;
        decode_list(&body, self.config.success_code, page)
    }

    async fn post_mutation<B: Serialize>(&self, path: &str, payload: &B) -> SourceResult<MutationReply> {
        let url = self.url(path);
        let request_id = Uuid::new_v4();
        info!(url = %url, %request_id, "Submitting mutation");

        let builder = self
            .client
            .post(&url)
            .header("X-Request-Id", request_id.to_string())
            .json(payload);

        match self.send(builder).await {
            Ok(body) => {
                let (_, message) =
                    decode_envelope::<serde_json::Value>(&body, self.config.success_code)?;
                info!(%request_id, message = %message, "Mutation accepted");
                Ok(MutationReply { message })
            }
            Err(e) => {
                warn!(%request_id, error = %e, "Mutation failed");
                Err(e)
            }
        }
    }
}

impl AssetApi for HttpAssetApi {
    async fn fetch_purchases(&self, page: PageRequest) -> SourceResult<PurchasePage> {
        let (page, coupon_count) = self
            .get_list(&self.config.endpoints.purchases, page, &[])
            .await?;
        Ok(PurchasePage { page, coupon_count })
    }

    async fn fetch_delivery_orders(
        &self,
        page: PageRequest,
        stage: DeliveryStageFilter,
    ) -> SourceResult<Page<DeliveryOrder>> {
        let extra: Vec<(&str, &str)> = stage.as_param().map(|s| ("stage", s)).into_iter().collect();
        let (page, _) = self
            .get_list(&self.config.endpoints.delivery_orders, page, &extra)
            .await?;
        Ok(page)
    }

    async fn fetch_consignments(
        &self,
        page: PageRequest,
        scope: ConsignmentScope,
    ) -> SourceResult<Page<ConsignmentRecord>> {
        let path = match scope {
            ConsignmentScope::Mine => &self.config.endpoints.my_consignments,
            ConsignmentScope::Market => &self.config.endpoints.market_consignments,
        };
        let (page, _) = self.get_list(path, page, &[]).await?;
        Ok(page)
    }

    async fn submit_delivery(&self, request: &DeliveryRequest) -> SourceResult<MutationReply> {
        self.post_mutation(&self.config.endpoints.submit_delivery, request)
            .await
    }

    async fn submit_consignment(&self, request: &ConsignmentRequest) -> SourceResult<MutationReply> {
        self.post_mutation(&self.config.endpoints.submit_consignment, request)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_join() {
        let api = HttpAssetApi::new(ApiConfig {
            base_url: "https://shop.example.com/".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            api.url("/api/consign/mine"),
            "https://shop.example.com/api/consign/mine"
        );
    }

    #[test]
    fn test_empty_base_url_rejected() {
        let result = HttpAssetApi::new(ApiConfig {
            base_url: " ".into(),
            ..Default::default()
        });
        assert!(matches!(result, Err(SourceError::Config(_))));
    }

    #[test]
    fn test_config_defaults_from_empty_toml() {
        let config: ApiConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.token_header, "token");
        assert_eq!(config.success_code, 1);
        assert_eq!(config.endpoints.purchases, "/api/collection/holdings");
    }
}
