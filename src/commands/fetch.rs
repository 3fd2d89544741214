use anyhow::{Context, Result, bail};
use log::info;
use serde_json::{json, Value};

use crate::batch::{self, FailurePolicy, ItemError, Record};
use crate::cli::{BatchArgs, FetchArgs};
use crate::client::{TapToolsClient, TradeSource, TradesQuery};

/// Fetch parameters from the command line. Object payloads may override
/// `address`, `page`, `perPage` and `unit` per item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchParams {
    pub address: Option<String>,
    pub page: u32,
    pub per_page: u32,
    pub unit: Option<String>,
}

impl Default for FetchParams {
    fn default() -> Self {
        Self {
            address: None,
            page: 1,
            per_page: 10,
            unit: None,
        }
    }
}

impl From<&FetchArgs> for FetchParams {
    fn from(args: &FetchArgs) -> Self {
        Self {
            address: args.address.clone(),
            page: args.page,
            per_page: args.per_page,
            unit: args.unit.clone(),
        }
    }
}

impl FetchParams {
    /// Resolve the query for one item.
    pub fn resolve(&self, payload: &Value) -> Result<TradesQuery> {
        let address = match item_field(payload, "address") {
            Some(v) => v.as_str().context("Item field \"address\" must be a string")?.to_string(),
            None => self.address.clone().unwrap_or_default(),
        };
        if address.trim().is_empty() {
            bail!("Wallet address is required (pass --address or an \"address\" field)");
        }

        let page = match item_field(payload, "page") {
            Some(v) => parse_count(v, "page")?,
            None => self.page,
        };
        let per_page = match item_field(payload, "perPage") {
            Some(v) => parse_count(v, "perPage")?,
            None => self.per_page,
        };
        let unit = match item_field(payload, "unit") {
            Some(v) => Some(v.as_str().context("Item field \"unit\" must be a string")?.to_string()),
            None => self.unit.clone(),
        };

        Ok(TradesQuery {
            address,
            page,
            per_page,
            unit: unit.filter(|u| !u.is_empty()),
        })
    }
}

fn item_field<'a>(payload: &'a Value, name: &str) -> Option<&'a Value> {
    payload.get(name).filter(|v| !v.is_null())
}

fn parse_count(value: &Value, name: &str) -> Result<u32> {
    let parsed = match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    };
    parsed.with_context(|| format!("Item field \"{}\" must be a non-negative integer, got {}", name, value))
}

/// One request per item, in item order. Failures go through `policy`.
pub async fn fetch_batch<S: TradeSource>(
    source: &S,
    items: &[Record],
    params: &FetchParams,
    policy: FailurePolicy,
) -> Result<Vec<Record>, ItemError> {
    let mut out = Vec::with_capacity(items.len());

    for (index, item) in items.iter().enumerate() {
        let result = match params.resolve(&item.json) {
            Ok(query) => source.wallet_token_trades(&query).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(body) => out.push(Record::new(body, index)),
            Err(cause) => out.push(policy.handle(index, cause)?),
        }
    }

    Ok(out)
}

/// Items to fetch for. Input is only read when `--input` is given (`-` for
/// stdin); otherwise a single empty item stands in.
pub fn load_items(batch: &BatchArgs) -> Result<Vec<Record>> {
    let items = match batch.input.as_deref() {
        Some(path) => batch::load_batch(Some(path), batch.raw)?,
        None => None,
    };
    Ok(items.unwrap_or_else(|| vec![Record::new(json!({}), 0)]))
}

pub async fn execute(args: FetchArgs) -> Result<()> {
    let client = TapToolsClient::from_env()?;
    let params = FetchParams::from(&args);
    let policy = FailurePolicy::from_flag(args.continue_on_fail);

    let items = load_items(&args.batch)?;
    info!(
        "items = {}, page = {}, per_page = {}, policy = {:?}",
        items.len(),
        params.page,
        params.per_page,
        policy
    );

    let records = fetch_batch(&client, &items, &params, policy).await?;
    batch::write_batch(&records, args.batch.output.as_deref())
}
