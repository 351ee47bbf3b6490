//! Idempotent find-or-create operations against the remote platform.
//!
//! Idempotency rests on searching for an entity whose metadata carries the
//! source identifier *before* ever creating one. An optional exact-name
//! fallback covers historical entities created without metadata tagging;
//! it is first-match, lower confidence, and off by default.
//!
//! Every call goes through [`execute_with_retry`], so rate limiting,
//! backoff, and circuit breaking wrap all remote I/O transitively.

pub mod types;

pub use types::{RemoteList, RemotePrice, RemoteProduct};

use std::sync::Arc;

use tracing::{debug, warn};

use crate::breaker::{BreakerRegistry, OpContext};
use crate::error::{Result, SyncError};
use crate::limiter::AdaptiveRateLimiter;
use crate::retry::{execute_with_retry, AttemptCounter, RetryConfig};
use crate::transport::{ApiRequest, HttpTransport};
use crate::validate::{ValidatedProduct, METADATA_SOURCE_ID};

const PRODUCTS_PATH: &str = "/v1/products";
const PRODUCT_SEARCH_PATH: &str = "/v1/products/search";
const PRICES_PATH: &str = "/v1/prices";

/// Remote platform client built from the transport plus the retry stack.
pub struct RemoteSyncService {
    transport: Arc<dyn HttpTransport>,
    limiter: AdaptiveRateLimiter,
    breakers: Arc<BreakerRegistry>,
    retry: RetryConfig,
    allow_name_fallback: bool,
    dry_run: bool,
}

impl RemoteSyncService {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        limiter: AdaptiveRateLimiter,
        breakers: Arc<BreakerRegistry>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            transport,
            limiter,
            breakers,
            retry,
            allow_name_fallback: false,
            dry_run: false,
        }
    }

    #[must_use]
    pub fn with_name_fallback(mut self, enabled: bool) -> Self {
        self.allow_name_fallback = enabled;
        self
    }

    /// In dry-run mode create calls return synthetic identifiers without
    /// any network effect; lookups still run for a faithful rehearsal.
    #[must_use]
    pub fn with_dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    async fn send(
        &self,
        ctx: OpContext,
        attempts: Option<&AttemptCounter>,
        request: &ApiRequest,
    ) -> Result<serde_json::Value> {
        execute_with_retry(ctx, &self.limiter, &self.breakers, &self.retry, attempts, || {
            let request = request.clone();
            async move { self.transport.send(request).await?.into_result() }
        })
        .await
    }

    /// Preflight connectivity check against the remote platform.
    pub async fn ping(&self) -> Result<()> {
        let request = ApiRequest::get(PRODUCTS_PATH).with_query("limit", "1");
        self.send(OpContext::SearchProduct, None, &request).await?;
        Ok(())
    }

    /// Look up an existing remote product for this source record.
    ///
    /// Primary: metadata search on the source identifier. Fallback
    /// (when enabled): exact-name list query, first match.
    pub async fn find_existing(
        &self,
        product: &ValidatedProduct,
        attempts: Option<&AttemptCounter>,
    ) -> Result<Option<RemoteProduct>> {
        let query = format!("metadata['{METADATA_SOURCE_ID}']:'{}'", product.source_id);
        let request = ApiRequest::get(PRODUCT_SEARCH_PATH)
            .with_query("query", query)
            .with_query("limit", "1");
        let body = self.send(OpContext::SearchProduct, attempts, &request).await?;
        let list: RemoteList<RemoteProduct> = types::parse(body)?;
        if let Some(found) = list.data.into_iter().next() {
            return Ok(Some(found));
        }

        if !self.allow_name_fallback {
            return Ok(None);
        }

        let request = ApiRequest::get(PRODUCTS_PATH)
            .with_query("name", product.title.clone())
            .with_query("limit", "1");
        let body = self.send(OpContext::SearchProduct, attempts, &request).await?;
        let list: RemoteList<RemoteProduct> = types::parse(body)?;
        match list.data.into_iter().next() {
            Some(found) => {
                warn!(
                    source_id = %product.source_id,
                    remote_id = %found.id,
                    "matched remote product by name only; no source_id metadata"
                );
                Ok(Some(found))
            }
            None => Ok(None),
        }
    }

    /// Create the remote product for this source record.
    pub async fn create_product(
        &self,
        product: &ValidatedProduct,
        attempts: Option<&AttemptCounter>,
    ) -> Result<RemoteProduct> {
        if self.dry_run {
            debug!(source_id = %product.source_id, "dry run: skipping product create");
            return Ok(synthetic_product(product));
        }

        let mut request = ApiRequest::post(PRODUCTS_PATH)
            .with_form("name", product.title.clone())
            .with_form("active", product.available.to_string());
        if let Some(description) = &product.description {
            request = request.with_form("description", description.clone());
        }
        for (key, value) in &product.metadata {
            request = request.with_form(format!("metadata[{key}]"), value.clone());
        }

        let body = self.send(OpContext::CreateProduct, attempts, &request).await?;
        types::parse(body)
    }

    /// Find-or-create the remote product. Returns the product and whether
    /// a create call was actually issued.
    ///
    /// A `Conflict` from the create endpoint means another writer (or a
    /// previous partially-failed run) got there first; the lookup is
    /// retried once and the existing entity is treated as success.
    pub async fn find_or_create_product(
        &self,
        product: &ValidatedProduct,
        attempts: Option<&AttemptCounter>,
    ) -> Result<(RemoteProduct, bool)> {
        if let Some(existing) = self.find_existing(product, attempts).await? {
            debug!(
                source_id = %product.source_id,
                remote_id = %existing.id,
                "remote product already exists"
            );
            return Ok((existing, false));
        }

        match self.create_product(product, attempts).await {
            Ok(created) => Ok((created, true)),
            Err(SyncError::Conflict { .. }) => match self.find_existing(product, attempts).await? {
                Some(existing) => Ok((existing, false)),
                None => Err(SyncError::conflict(format!(
                    "duplicate reported for {} but lookup found nothing",
                    product.source_id
                ))),
            },
            Err(err) => Err(err),
        }
    }

    /// Find-or-create the price attached to a remote product. An existing
    /// price with the same amount and currency is reused.
    pub async fn find_or_create_price(
        &self,
        remote_product_id: &str,
        product: &ValidatedProduct,
        attempts: Option<&AttemptCounter>,
    ) -> Result<String> {
        let request = ApiRequest::get(PRICES_PATH)
            .with_query("product", remote_product_id)
            .with_query("limit", "100");
        let body = self.send(OpContext::SearchPrice, attempts, &request).await?;
        let list: RemoteList<RemotePrice> = types::parse(body)?;
        if let Some(existing) = list
            .data
            .into_iter()
            .find(|p| p.unit_amount == product.unit_amount && p.currency == product.currency)
        {
            debug!(
                remote_product_id,
                price_id = %existing.id,
                "remote price already exists"
            );
            return Ok(existing.id);
        }

        if self.dry_run {
            debug!(source_id = %product.source_id, "dry run: skipping price create");
            return Ok(synthetic_price(product));
        }

        let request = ApiRequest::post(PRICES_PATH)
            .with_form("product", remote_product_id)
            .with_form("unit_amount", product.unit_amount.to_string())
            .with_form("currency", product.currency.clone());
        let body = self.send(OpContext::CreatePrice, attempts, &request).await?;
        let price: RemotePrice = types::parse(body)?;
        Ok(price.id)
    }

    /// Confirm a previously returned product identifier still resolves.
    /// Used by the verification pass; `NotFound` is a mismatch, not an
    /// error.
    pub async fn verify_product(&self, remote_product_id: &str) -> Result<bool> {
        let request = ApiRequest::get(format!("{PRODUCTS_PATH}/{remote_product_id}"));
        match self.send(OpContext::SearchProduct, None, &request).await {
            Ok(_) => Ok(true),
            Err(SyncError::NotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

fn synthetic_product(product: &ValidatedProduct) -> RemoteProduct {
    RemoteProduct {
        id: format!("dryrun_prod_{}", product.source_id.simple()),
        name: product.title.clone(),
        metadata: product.metadata.clone(),
    }
}

fn synthetic_price(product: &ValidatedProduct) -> String {
    format!("dryrun_price_{}", product.source_id.simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use uuid::Uuid;

    use crate::breaker::CircuitState;
    use crate::transport::mock::MockTransport;
    use crate::transport::{ApiResponse, Method};

    fn validated() -> ValidatedProduct {
        let source_id = Uuid::new_v4();
        let mut metadata = BTreeMap::new();
        metadata.insert(METADATA_SOURCE_ID.to_string(), source_id.to_string());
        ValidatedProduct {
            source_id,
            title: "Widget".to_string(),
            description: Some("A widget".to_string()),
            unit_amount: 2550,
            currency: "usd".to_string(),
            available: true,
            metadata,
        }
    }

    fn service(transport: &MockTransport) -> RemoteSyncService {
        RemoteSyncService::new(
            Arc::new(transport.clone()),
            AdaptiveRateLimiter::new(1_000, Duration::from_secs(1)),
            Arc::new(BreakerRegistry::default()),
            RetryConfig::new(Duration::from_millis(1), Duration::from_millis(5), 0),
        )
    }

    fn empty_list() -> ApiResponse {
        ApiResponse::ok(json!({"data": []}))
    }

    fn product_list(id: &str, source_id: &str) -> ApiResponse {
        ApiResponse::ok(json!({
            "data": [{"id": id, "name": "Widget", "metadata": {"source_id": source_id}}]
        }))
    }

    #[tokio::test]
    async fn find_or_create_twice_creates_exactly_once() {
        let transport = MockTransport::new();
        let product = validated();
        let sid = product.source_id.to_string();

        // First call: nothing found, create happens.
        transport.push_response(Method::Get, PRODUCT_SEARCH_PATH, empty_list());
        transport.push_response(
            Method::Post,
            PRODUCTS_PATH,
            ApiResponse::ok(json!({"id": "prod_1", "name": "Widget"})),
        );
        // Second call: the search now finds it.
        transport.push_response(Method::Get, PRODUCT_SEARCH_PATH, product_list("prod_1", &sid));

        let svc = service(&transport);
        let (first, created) = svc.find_or_create_product(&product, None).await.unwrap();
        let (second, created_again) = svc.find_or_create_product(&product, None).await.unwrap();

        assert!(created);
        assert!(!created_again);
        assert_eq!(first.id, second.id);
        assert_eq!(transport.request_count(Method::Post, PRODUCTS_PATH), 1);
    }

    #[tokio::test]
    async fn search_query_carries_the_source_id_metadata_key() {
        let transport = MockTransport::new();
        let product = validated();
        transport.push_response(Method::Get, PRODUCT_SEARCH_PATH, empty_list());

        let svc = service(&transport);
        assert!(svc.find_existing(&product, None).await.unwrap().is_none());

        let requests = transport.requests();
        let query = &requests[0].query[0].1;
        assert!(query.contains("metadata['source_id']"));
        assert!(query.contains(&product.source_id.to_string()));
    }

    #[tokio::test]
    async fn name_fallback_is_off_by_default() {
        let transport = MockTransport::new();
        transport.push_response(Method::Get, PRODUCT_SEARCH_PATH, empty_list());

        let svc = service(&transport);
        let found = svc.find_existing(&validated(), None).await.unwrap();

        assert!(found.is_none());
        // No list-by-name request was issued.
        assert_eq!(transport.request_count(Method::Get, PRODUCTS_PATH), 0);
    }

    #[tokio::test]
    async fn name_fallback_takes_first_match_when_enabled() {
        let transport = MockTransport::new();
        transport.push_response(Method::Get, PRODUCT_SEARCH_PATH, empty_list());
        transport.push_response(
            Method::Get,
            PRODUCTS_PATH,
            ApiResponse::ok(json!({"data": [{"id": "prod_legacy", "name": "Widget"}]})),
        );

        let svc = service(&transport).with_name_fallback(true);
        let found = svc.find_existing(&validated(), None).await.unwrap();

        assert_eq!(found.map(|p| p.id).as_deref(), Some("prod_legacy"));
    }

    #[tokio::test]
    async fn conflict_on_create_resolves_to_the_existing_product() {
        let transport = MockTransport::new();
        let product = validated();
        let sid = product.source_id.to_string();

        transport.push_response(Method::Get, PRODUCT_SEARCH_PATH, empty_list());
        transport.push_response(
            Method::Post,
            PRODUCTS_PATH,
            ApiResponse {
                status: 409,
                retry_after: None,
                body: json!({"error": {"message": "already exists"}}),
            },
        );
        transport.push_response(Method::Get, PRODUCT_SEARCH_PATH, product_list("prod_9", &sid));

        let svc = service(&transport);
        let (found, created) = svc.find_or_create_product(&product, None).await.unwrap();

        assert_eq!(found.id, "prod_9");
        assert!(!created);
    }

    #[tokio::test]
    async fn matching_price_is_reused_instead_of_created() {
        let transport = MockTransport::new();
        transport.push_response(
            Method::Get,
            PRICES_PATH,
            ApiResponse::ok(json!({
                "data": [
                    {"id": "price_other", "unit_amount": 100, "currency": "usd"},
                    {"id": "price_match", "unit_amount": 2550, "currency": "usd"}
                ]
            })),
        );

        let svc = service(&transport);
        let price_id = svc
            .find_or_create_price("prod_1", &validated(), None)
            .await
            .unwrap();

        assert_eq!(price_id, "price_match");
        assert_eq!(transport.request_count(Method::Post, PRICES_PATH), 0);
    }

    #[tokio::test]
    async fn missing_price_is_created_with_minor_units() {
        let transport = MockTransport::new();
        transport.push_response(Method::Get, PRICES_PATH, empty_list());
        transport.push_response(
            Method::Post,
            PRICES_PATH,
            ApiResponse::ok(json!({"id": "price_new", "unit_amount": 2550, "currency": "usd"})),
        );

        let svc = service(&transport);
        let price_id = svc
            .find_or_create_price("prod_1", &validated(), None)
            .await
            .unwrap();

        assert_eq!(price_id, "price_new");
        let requests = transport.requests();
        let form = &requests[1].form;
        assert!(form.contains(&("unit_amount".to_string(), "2550".to_string())));
        assert!(form.contains(&("product".to_string(), "prod_1".to_string())));
    }

    #[tokio::test]
    async fn dry_run_returns_synthetic_ids_without_create_calls() {
        let transport = MockTransport::new();
        let product = validated();
        transport.push_response(Method::Get, PRODUCT_SEARCH_PATH, empty_list());
        transport.push_response(Method::Get, PRICES_PATH, empty_list());

        let svc = service(&transport).with_dry_run(true);
        let (created, _) = svc.find_or_create_product(&product, None).await.unwrap();
        let price_id = svc
            .find_or_create_price(&created.id, &product, None)
            .await
            .unwrap();

        assert!(created.id.starts_with("dryrun_prod_"));
        assert!(price_id.starts_with("dryrun_price_"));
        assert_eq!(transport.request_count(Method::Post, PRODUCTS_PATH), 0);
        assert_eq!(transport.request_count(Method::Post, PRICES_PATH), 0);
    }

    #[tokio::test]
    async fn price_listing_failures_leave_the_product_search_breaker_closed() {
        let transport = MockTransport::new();
        transport.push_response(
            Method::Get,
            PRICES_PATH,
            ApiResponse {
                status: 500,
                retry_after: None,
                body: json!({"error": {"message": "listing backend down"}}),
            },
        );

        let breakers = Arc::new(BreakerRegistry::new(1, Duration::from_secs(30)));
        let svc = RemoteSyncService::new(
            Arc::new(transport.clone()),
            AdaptiveRateLimiter::new(1_000, Duration::from_secs(1)),
            Arc::clone(&breakers),
            RetryConfig::new(Duration::from_millis(1), Duration::from_millis(5), 0),
        );

        let err = svc
            .find_or_create_price("prod_1", &validated(), None)
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        assert_eq!(breakers.state(OpContext::SearchPrice), CircuitState::Open);
        assert_eq!(breakers.state(OpContext::SearchProduct), CircuitState::Closed);
    }

    #[tokio::test]
    async fn verify_product_maps_not_found_to_false() {
        let transport = MockTransport::new();
        transport.push_response(
            Method::Get,
            "/v1/products/prod_1",
            ApiResponse::ok(json!({"id": "prod_1"})),
        );
        transport.push_response(
            Method::Get,
            "/v1/products/prod_gone",
            ApiResponse {
                status: 404,
                retry_after: None,
                body: json!({"error": {"message": "no such product"}}),
            },
        );

        let svc = service(&transport);
        assert!(svc.verify_product("prod_1").await.unwrap());
        assert!(!svc.verify_product("prod_gone").await.unwrap());
    }
}
