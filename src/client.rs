use anyhow::{Context, Result, bail};
use log::debug;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::env;

use crate::constants::{API_BASE_URL, API_KEY_VAR, BASE_URL_VAR, WALLET_TRADES_PATH};

/// Characters left as-is by JavaScript's `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Query for the wallet token trades endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradesQuery {
    pub address: String,
    pub page: u32,
    pub per_page: u32,
    pub unit: Option<String>,
}

impl TradesQuery {
    /// URL-encoded `address`, `page`, `perPage`, and `unit` only when non-empty.
    pub fn to_query_string(&self) -> String {
        let mut pairs = vec![
            ("address", self.address.clone()),
            ("page", self.page.to_string()),
            ("perPage", self.per_page.to_string()),
        ];
        if let Some(unit) = self.unit.as_deref().filter(|u| !u.is_empty()) {
            pairs.push(("unit", unit.to_string()));
        }
        pairs
            .iter()
            .map(|(key, value)| {
                format!(
                    "{}={}",
                    utf8_percent_encode(key, COMPONENT),
                    utf8_percent_encode(value, COMPONENT)
                )
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Anything that can answer a wallet trades query.
#[allow(async_fn_in_trait)]
pub trait TradeSource {
    async fn wallet_token_trades(&self, query: &TradesQuery) -> Result<Value>;
}

/// HTTP client for the TapTools API. The API key is only ever sent as the
/// `x-api-key` header.
pub struct TapToolsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl TapToolsClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: API_BASE_URL.to_string(),
            api_key: api_key.into(),
        }
    }

    /// Build from `TAPTOOLS_API_KEY`, honouring `TAPTOOLS_BASE_URL` if set.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var(API_KEY_VAR).context("Need TAPTOOLS_API_KEY environment variable")?;
        if api_key.trim().is_empty() {
            bail!("TAPTOOLS_API_KEY is empty");
        }
        let client = Self::new(api_key);
        Ok(match env::var(BASE_URL_VAR) {
            Ok(url) if !url.trim().is_empty() => client.with_base_url(url),
            _ => client,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn trades_url(&self, query: &TradesQuery) -> String {
        format!("{}{}?{}", self.base_url, WALLET_TRADES_PATH, query.to_query_string())
    }
}

impl TradeSource for TapToolsClient {
    async fn wallet_token_trades(&self, query: &TradesQuery) -> Result<Value> {
        let url = self.trades_url(query);
        debug!("GET {}", url);

        let resp = self
            .http
            .get(&url)
            .header("x-api-key", &self.api_key)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .context("Failed to fetch wallet token trades")?;

        let status = resp.status();
        debug!("status = {}, address = {}", status, query.address);
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("TapTools API returned {}: {}", status, body.trim());
        }

        resp.json().await.context("Failed to parse trades response")
    }
}
