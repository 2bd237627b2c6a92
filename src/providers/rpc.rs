//! RPC Client Module - shared HTTP transport for every chain adapter
//!
//! 1. JSON-RPC (EVM, Solana) and REST GET (Esplora, TronGrid) over one client
//! 2. Primary endpoint with fallback to the public one
//! 3. Exponential backoff retry with jitter (1s→2s→4s→... capped at 64s)
//! 4. User-Agent header, gzip, API keys masked in logs
//! 5. Batch requests (max 50 per batch)

use eyre::{eyre, Result};
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT_ENCODING, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::models::config::{Chain, ChainEndpoint};
use crate::utils::constants::USER_AGENT as USER_AGENT_CONST;

// ============================================
// RETRY CONSTANTS
// ============================================

/// Maximum batch size
pub const MAX_BATCH_SIZE: usize = 50;

/// Base retry delay in milliseconds
pub const BASE_RETRY_MS: u64 = 1000;

/// Maximum retry delay in milliseconds
pub const MAX_RETRY_MS: u64 = 64000;

/// Default attempts per endpoint; the adapter deadline bounds the total
pub const DEFAULT_MAX_RETRIES: u32 = 4;

/// Jitter percentage for retry delay
pub const RETRY_JITTER_PERCENT: u64 = 20;

/// Backoff delay before `attempt` (1-based retries), with ±20% jitter
pub fn backoff_delay(attempt: u32) -> Duration {
    let base_delay = BASE_RETRY_MS.saturating_mul(2_u64.saturating_pow(attempt.saturating_sub(1)));
    let capped_delay = base_delay.min(MAX_RETRY_MS);

    let jitter_range = (capped_delay * RETRY_JITTER_PERCENT) / 100;
    let jitter: i64 =
        rand::thread_rng().gen_range(-(jitter_range as i64)..=(jitter_range as i64));
    Duration::from_millis((capped_delay as i64 + jitter).max(100) as u64)
}

/// Batch JSON-RPC request item
#[derive(Debug, Clone, Serialize)]
pub struct BatchRequestItem {
    pub jsonrpc: &'static str,
    pub method: String,
    pub params: serde_json::Value,
    pub id: u64,
}

/// Batch JSON-RPC response item
#[derive(Debug, Clone, Deserialize)]
pub struct BatchResponseItem<T> {
    pub result: Option<T>,
    pub error: Option<RpcError>,
    pub id: u64,
}

/// Failure of one attempt; `retryable` decides whether backoff continues
struct AttemptError {
    error: eyre::Report,
    retryable: bool,
}

impl AttemptError {
    fn retry(error: eyre::Report) -> Self {
        Self { error, retryable: true }
    }

    fn fatal(error: eyre::Report) -> Self {
        Self { error, retryable: false }
    }
}

/// HTTP provider with retry logic and fallback support
#[derive(Clone)]
pub struct RpcProvider {
    chain: Chain,
    primary_url: String,
    fallback_url: Option<String>,
    client: reqwest::Client,
    max_retries: u32,
}

impl RpcProvider {
    /// Build a provider for a resolved endpoint
    pub fn from_endpoint(endpoint: &ChainEndpoint) -> Result<Self> {
        if endpoint.primary_url.is_empty() {
            return Err(eyre!("No endpoint configured for {}", endpoint.chain));
        }

        let client = Self::build_client(endpoint)?;
        let provider = Self {
            chain: endpoint.chain,
            primary_url: endpoint.primary_url.trim_end_matches('/').to_string(),
            fallback_url: endpoint
                .fallback_url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_string()),
            client,
            max_retries: DEFAULT_MAX_RETRIES,
        };

        info!("✅ Initialized {} transport ({})", provider.chain, provider.masked_url());
        Ok(provider)
    }

    /// Override attempts per endpoint (at least one)
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Build HTTP client with custom headers and gzip
    fn build_client(endpoint: &ChainEndpoint) -> Result<reqwest::Client> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_CONST));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));

        if let Some((name, value)) = &endpoint.api_key_header {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| eyre!("Invalid header name {}: {}", name, e))?;
            let mut value =
                HeaderValue::from_str(value).map_err(|_| eyre!("Invalid API key header value"))?;
            value.set_sensitive(true);
            headers.insert(name, value);
        }

        reqwest::Client::builder()
            .default_headers(headers)
            .timeout(endpoint.timeout)
            .gzip(true)
            .build()
            .map_err(|e| eyre!("Failed to build HTTP client: {}", e))
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    /// Primary URL (masked for logging)
    pub fn masked_url(&self) -> String {
        mask_url(&self.primary_url)
    }

    fn endpoints(&self) -> Vec<&str> {
        let mut urls = vec![self.primary_url.as_str()];
        if let Some(fallback) = &self.fallback_url {
            urls.push(fallback.as_str());
        }
        urls
    }

    // ============================================
    // JSON-RPC
    // ============================================

    /// Execute JSON-RPC call with retry logic and fallback
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let mut last_error = None;
        for (idx, url) in self.endpoints().into_iter().enumerate() {
            if idx > 0 {
                info!("🔄 Trying fallback endpoint for {} {}", self.chain, method);
            }
            match self
                .with_retry(|| self.execute_call::<T>(url, &payload))
                .await
            {
                Ok(result) => return Ok(result),
                Err(e) => {
                    warn!("⚠️ {} {} failed on {}: {}", self.chain, method, mask_url(url), e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .map(|e| eyre!("All RPC endpoints failed for {}: {}", self.chain, e))
            .unwrap_or_else(|| eyre!("All RPC endpoints failed for {}", self.chain)))
    }

    async fn execute_call<T: DeserializeOwned>(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> std::result::Result<T, AttemptError> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| AttemptError::retry(eyre!("Request failed: {}", e)))?;

        check_status(response.status())?;

        let json: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| AttemptError::fatal(eyre!("Failed to parse response: {}", e)))?;

        if let Some(error) = json.error {
            let report = eyre!("RPC error: {} (code: {})", error.message, error.code);
            return Err(if error.is_rate_limit() {
                AttemptError::retry(report)
            } else {
                AttemptError::fatal(report)
            });
        }

        json.result
            .ok_or_else(|| AttemptError::fatal(eyre!("No result in response")))
    }

    /// Execute batch JSON-RPC calls (max 50 per batch), primary endpoint only
    pub async fn batch_call<T: DeserializeOwned>(
        &self,
        requests: Vec<(&str, serde_json::Value)>,
    ) -> Result<Vec<Result<T>>> {
        if requests.is_empty() {
            return Ok(vec![]);
        }

        let mut all_results = Vec::with_capacity(requests.len());

        for chunk in requests.chunks(MAX_BATCH_SIZE) {
            let batch_payload: Vec<BatchRequestItem> = chunk
                .iter()
                .enumerate()
                .map(|(idx, (method, params))| BatchRequestItem {
                    jsonrpc: "2.0",
                    method: method.to_string(),
                    params: params.clone(),
                    id: idx as u64 + 1,
                })
                .collect();

            let mut items: Vec<BatchResponseItem<T>> = self
                .with_retry(|| self.execute_batch::<T>(&batch_payload))
                .await?;

            // Responses may arrive in any order
            items.sort_by_key(|item| item.id);
            let mut by_id = items.into_iter().peekable();

            for request in &batch_payload {
                let item = match by_id.peek() {
                    Some(item) if item.id == request.id => by_id.next(),
                    _ => None,
                };
                all_results.push(match item {
                    Some(BatchResponseItem { error: Some(error), .. }) => {
                        Err(eyre!("RPC error: {} (code: {})", error.message, error.code))
                    }
                    Some(BatchResponseItem { result: Some(result), .. }) => Ok(result),
                    _ => Err(eyre!("No result in response for id {}", request.id)),
                });
            }
        }

        Ok(all_results)
    }

    async fn execute_batch<T: DeserializeOwned>(
        &self,
        batch_payload: &[BatchRequestItem],
    ) -> std::result::Result<Vec<BatchResponseItem<T>>, AttemptError> {
        let response = self
            .client
            .post(&self.primary_url)
            .json(batch_payload)
            .send()
            .await
            .map_err(|e| AttemptError::retry(eyre!("Request failed: {}", e)))?;

        check_status(response.status())?;

        response
            .json()
            .await
            .map_err(|e| AttemptError::fatal(eyre!("Failed to parse batch response: {}", e)))
    }

    // ============================================
    // REST
    // ============================================

    /// GET `<base>/<path>` with query parameters, retry and fallback
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let path = path.trim_start_matches('/');

        let mut last_error = None;
        for (idx, base) in self.endpoints().into_iter().enumerate() {
            if idx > 0 {
                info!("🔄 Trying fallback endpoint for {} /{}", self.chain, path);
            }
            let url = format!("{}/{}", base, path);
            match self.with_retry(|| self.execute_get::<T>(&url, query)).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    warn!("⚠️ {} GET /{} failed on {}: {}", self.chain, path, mask_url(base), e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .map(|e| eyre!("All REST endpoints failed for {}: {}", self.chain, e))
            .unwrap_or_else(|| eyre!("All REST endpoints failed for {}", self.chain)))
    }

    async fn execute_get<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> std::result::Result<T, AttemptError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| AttemptError::retry(eyre!("Request failed: {}", e)))?;

        check_status(response.status())?;

        response
            .json()
            .await
            .map_err(|e| AttemptError::fatal(eyre!("Failed to parse response: {}", e)))
    }

    // ============================================
    // RETRY
    // ============================================

    /// Run `attempt` with exponential backoff until success, a fatal error,
    /// or `max_retries` attempts
    async fn with_retry<T, F, Fut>(&self, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, AttemptError>>,
    {
        let mut last_error = None;

        for n in 0..self.max_retries {
            if n > 0 {
                let delay = backoff_delay(n);
                debug!("⏳ Retry {}/{} after {}ms", n + 1, self.max_retries, delay.as_millis());
                tokio::time::sleep(delay).await;
            }

            match attempt().await {
                Ok(result) => return Ok(result),
                Err(AttemptError { error, retryable }) => {
                    if error.to_string().contains("429") {
                        warn!(
                            "⏳ Rate limited (HTTP 429), backing off (attempt {}/{})",
                            n + 1,
                            self.max_retries
                        );
                    }
                    if !retryable {
                        return Err(error);
                    }
                    last_error = Some(error);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| eyre!("Unknown error after {} retries", self.max_retries)))
    }
}

/// 429 and 5xx are retryable; other non-success statuses are not
fn check_status(status: reqwest::StatusCode) -> std::result::Result<(), AttemptError> {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(AttemptError::retry(eyre!("Rate limited (HTTP 429)")));
    }
    if status.is_server_error() {
        return Err(AttemptError::retry(eyre!("HTTP error: {}", status)));
    }
    if !status.is_success() {
        return Err(AttemptError::fatal(eyre!("HTTP error: {}", status)));
    }
    Ok(())
}

/// Hide API keys embedded in URLs
pub fn mask_url(url: &str) -> String {
    if let Some((base, _)) = url.split_once("/v2/") {
        return format!("{}/v2/***HIDDEN***", base);
    }
    if let Some((base, _)) = url.split_once("/prices/v1/") {
        return format!("{}/prices/v1/***HIDDEN***", base);
    }
    url.to_string()
}

/// JSON-RPC response structure
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

/// JSON-RPC error structure
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    /// Rate limit (code -32005 or message)
    pub fn is_rate_limit(&self) -> bool {
        self.code == -32005
            || self.code == 429
            || self.message.to_lowercase().contains("rate limit")
    }

    /// Method not found (code -32601)
    pub fn is_method_not_found(&self) -> bool {
        self.code == -32601
    }
}
