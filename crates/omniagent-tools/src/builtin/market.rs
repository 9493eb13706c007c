use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Value};

use omniagent_core::error::{OmniError, Result};
use omniagent_core::traits::Tool;
use omniagent_core::types::{ToolContext, ToolResult};

use crate::http::{exec_err, fmt_num, parse_input, ApiClient};

const COINGECKO_API: &str = "https://pro-api.coingecko.com/api/v3";
const BINANCE_FUTURES_API: &str = "https://fapi.binance.com/fapi/v1";

// ── PriceTool ───────────────────────────────────────────────────

pub struct PriceTool {
    api: Arc<ApiClient>,
    api_key: String,
}

impl PriceTool {
    pub fn new(api: Arc<ApiClient>, api_key: &str) -> Self {
        Self {
            api,
            api_key: api_key.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct PriceInput {
    symbol: String,
}

/// Pick the CoinGecko id for a ticker from a `/search` response. An exact
/// symbol match wins over the search ranking.
fn pick_coin_id(search: &Value, symbol: &str) -> Option<(String, String)> {
    let coins = search["coins"].as_array()?;
    let hit = coins
        .iter()
        .find(|c| {
            c["symbol"]
                .as_str()
                .is_some_and(|s| s.eq_ignore_ascii_case(symbol))
        })
        .or_else(|| coins.first())?;
    Some((
        hit["id"].as_str()?.to_string(),
        hit["name"].as_str().unwrap_or(symbol).to_string(),
    ))
}

fn format_price(symbol: &str, name: &str, quote: &Value) -> Option<String> {
    let price = quote["usd"].as_f64()?;
    let mut out = format!(
        "{} ({}) price: ${}",
        name,
        symbol.to_uppercase(),
        fmt_num(price, if price < 1.0 { 6 } else { 2 })
    );
    if let Some(change) = quote["usd_24h_change"].as_f64() {
        out.push_str(&format!("\n24h change: {:+.2}%", change));
    }
    if let Some(cap) = quote["usd_market_cap"].as_f64() {
        out.push_str(&format!("\nMarket cap: ${}", fmt_num(cap, 0)));
    }
    Some(out)
}

impl Tool for PriceTool {
    fn name(&self) -> &str {
        "price"
    }

    fn description(&self) -> &str {
        "Get the current USD price, 24h change and market cap of a crypto token by its ticker symbol (e.g. ETH, BTC)."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "symbol": { "type": "string", "description": "Token symbol, e.g. ETH" }
            },
            "required": ["symbol"]
        })
    }

    fn timeout_secs(&self) -> u64 {
        self.api.timeout().as_secs() * 2 + 5
    }

    fn execute(&self, input: Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: PriceInput = parse_input(input)?;
            let symbol = p.symbol.trim();
            if symbol.is_empty() {
                return Err(OmniError::ToolValidation("'symbol' must not be empty".into()));
            }
            let headers = [("x-cg-pro-api-key", self.api_key.as_str())];

            let search = self
                .api
                .get_json(
                    "price",
                    &format!("{}/search", COINGECKO_API),
                    &[("query", symbol.to_string())],
                    &headers,
                )
                .await?;
            let Some((id, name)) = pick_coin_id(&search, symbol) else {
                return Ok(ToolResult::error(format!("No token found for symbol '{}'", symbol)));
            };

            let quotes = self
                .api
                .get_json(
                    "price",
                    &format!("{}/simple/price", COINGECKO_API),
                    &[
                        ("ids", id.clone()),
                        ("vs_currencies", "usd".into()),
                        ("include_24hr_change", "true".into()),
                        ("include_market_cap", "true".into()),
                    ],
                    &headers,
                )
                .await?;

            format_price(symbol, &name, &quotes[&id])
                .map(ToolResult::success)
                .ok_or_else(|| exec_err("price", format!("no USD quote for '{}'", id)))
        })
    }
}

// ── CoinMarketTool ──────────────────────────────────────────────

pub struct CoinMarketTool {
    api: Arc<ApiClient>,
    api_key: String,
}

impl CoinMarketTool {
    pub fn new(api: Arc<ApiClient>, api_key: &str) -> Self {
        Self {
            api,
            api_key: api_key.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct CoinMarketInput {
    #[serde(default = "default_order")]
    order: String,
    #[serde(default = "default_limit")]
    limit: u32,
}
fn default_order() -> String {
    "market_cap_desc".into()
}
fn default_limit() -> u32 {
    10
}

const MARKET_ORDERS: &[&str] = &["market_cap_desc", "market_cap_asc", "volume_desc", "volume_asc"];

fn format_markets(rows: &Value) -> String {
    let Some(rows) = rows.as_array().filter(|r| !r.is_empty()) else {
        return "No market data available.".into();
    };
    rows.iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "{}. {} ({}) ${} | 24h {:+.2}% | cap ${} | vol ${}",
                i + 1,
                c["name"].as_str().unwrap_or("?"),
                c["symbol"].as_str().unwrap_or("?").to_uppercase(),
                fmt_num(c["current_price"].as_f64().unwrap_or(0.0), 4),
                c["price_change_percentage_24h"].as_f64().unwrap_or(0.0),
                fmt_num(c["market_cap"].as_f64().unwrap_or(0.0), 0),
                fmt_num(c["total_volume"].as_f64().unwrap_or(0.0), 0),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

impl Tool for CoinMarketTool {
    fn name(&self) -> &str {
        "coin_market"
    }

    fn description(&self) -> &str {
        "List top crypto tokens ranked by market cap or trading volume."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "order": {
                    "type": "string",
                    "enum": MARKET_ORDERS,
                    "description": "Sort order (default market_cap_desc)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Number of tokens, 1-50 (default 10)"
                }
            }
        })
    }

    fn timeout_secs(&self) -> u64 {
        self.api.timeout().as_secs() + 5
    }

    fn execute(&self, input: Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: CoinMarketInput = parse_input(input)?;
            if !MARKET_ORDERS.contains(&p.order.as_str()) {
                return Err(OmniError::ToolValidation(format!(
                    "'order' must be one of {}",
                    MARKET_ORDERS.join(", ")
                )));
            }
            if !(1..=50).contains(&p.limit) {
                return Err(OmniError::ToolValidation("'limit' must be between 1 and 50".into()));
            }

            let rows = self
                .api
                .get_json(
                    "coin_market",
                    &format!("{}/coins/markets", COINGECKO_API),
                    &[
                        ("vs_currency", "usd".into()),
                        ("order", p.order),
                        ("per_page", p.limit.to_string()),
                        ("page", "1".into()),
                    ],
                    &[("x-cg-pro-api-key", self.api_key.as_str())],
                )
                .await?;

            Ok(ToolResult::success(format_markets(&rows)))
        })
    }
}

// ── FundingRateTool ─────────────────────────────────────────────

pub struct FundingRateTool {
    api: Arc<ApiClient>,
}

impl FundingRateTool {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[derive(Deserialize)]
struct FundingRateInput {
    symbol: String,
}

/// `eth` → `ETHUSDT`; symbols that already name a quote asset pass through.
fn perp_symbol(symbol: &str) -> String {
    let upper = symbol.trim().to_uppercase();
    if upper.ends_with("USDT") || upper.ends_with("USDC") || upper.ends_with("USD") {
        upper
    } else {
        format!("{}USDT", upper)
    }
}

fn format_funding(body: &Value) -> Option<String> {
    let symbol = body["symbol"].as_str()?;
    let rate: f64 = body["lastFundingRate"].as_str()?.parse().ok()?;
    let mark: f64 = body["markPrice"].as_str()?.parse().ok()?;
    let mut out = format!(
        "{} funding rate: {:.4}% (mark price ${})",
        symbol,
        rate * 100.0,
        fmt_num(mark, 4)
    );
    if let Some(next) = body["nextFundingTime"]
        .as_i64()
        .and_then(chrono::DateTime::from_timestamp_millis)
    {
        out.push_str(&format!("\nNext funding: {}", next.format("%Y-%m-%d %H:%M UTC")));
    }
    Some(out)
}

impl Tool for FundingRateTool {
    fn name(&self) -> &str {
        "funding_rate"
    }

    fn description(&self) -> &str {
        "Get the current perpetual futures funding rate for a token on Binance."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "symbol": { "type": "string", "description": "Token symbol or pair, e.g. ETH or ETHUSDT" }
            },
            "required": ["symbol"]
        })
    }

    fn timeout_secs(&self) -> u64 {
        self.api.timeout().as_secs() + 5
    }

    fn execute(&self, input: Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: FundingRateInput = parse_input(input)?;
            if p.symbol.trim().is_empty() {
                return Err(OmniError::ToolValidation("'symbol' must not be empty".into()));
            }
            let pair = perp_symbol(&p.symbol);

            let body = self
                .api
                .get_json(
                    "funding_rate",
                    &format!("{}/premiumIndex", BINANCE_FUTURES_API),
                    &[("symbol", pair.clone())],
                    &[],
                )
                .await?;

            format_funding(&body)
                .map(ToolResult::success)
                .ok_or_else(|| exec_err("funding_rate", format!("unexpected response for {}", pair)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omniagent_core::types::SessionId;

    fn ctx() -> ToolContext {
        ToolContext {
            session_id: SessionId::from("t"),
            agent: "market_analysis_agent".into(),
        }
    }

    #[test]
    fn test_pick_coin_prefers_exact_symbol() {
        let search = json!({"coins": [
            {"id": "ethereum-pow", "symbol": "ETHW", "name": "EthereumPoW"},
            {"id": "ethereum", "symbol": "ETH", "name": "Ethereum"}
        ]});
        assert_eq!(
            pick_coin_id(&search, "eth"),
            Some(("ethereum".to_string(), "Ethereum".to_string()))
        );
        assert!(pick_coin_id(&json!({"coins": []}), "eth").is_none());
    }

    #[test]
    fn test_format_price() {
        let quote = json!({"usd": 3012.5, "usd_24h_change": -1.234, "usd_market_cap": 362000000000.0});
        let out = format_price("eth", "Ethereum", &quote).unwrap();
        assert!(out.starts_with("Ethereum (ETH) price: $3,012.5"));
        assert!(out.contains("-1.23%"));
        assert!(format_price("eth", "Ethereum", &json!({})).is_none());
    }

    #[test]
    fn test_format_markets() {
        let rows = json!([{
            "name": "Bitcoin", "symbol": "btc", "current_price": 65000.0,
            "price_change_percentage_24h": 2.0, "market_cap": 1.0e12, "total_volume": 3.0e10
        }]);
        let out = format_markets(&rows);
        assert!(out.starts_with("1. Bitcoin (BTC) $65,000"));
        assert_eq!(format_markets(&json!([])), "No market data available.");
    }

    #[test]
    fn test_perp_symbol() {
        assert_eq!(perp_symbol("eth"), "ETHUSDT");
        assert_eq!(perp_symbol("BTCUSDT"), "BTCUSDT");
    }

    #[test]
    fn test_format_funding() {
        let body = json!({
            "symbol": "ETHUSDT", "markPrice": "3010.12000000",
            "lastFundingRate": "0.00010000", "nextFundingTime": 1700000000000i64
        });
        let out = format_funding(&body).unwrap();
        assert!(out.contains("ETHUSDT funding rate: 0.0100%"));
        assert!(out.contains("Next funding: 2023-11-14"));
    }

    #[tokio::test]
    async fn test_invalid_input_is_validation_error() {
        let api = Arc::new(ApiClient::new(1));
        let err = PriceTool::new(api.clone(), "k")
            .execute(json!({"symbol": "  "}), ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, OmniError::ToolValidation(_)));

        let err = CoinMarketTool::new(api.clone(), "k")
            .execute(json!({"limit": 500}), ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, OmniError::ToolValidation(_)));

        let err = FundingRateTool::new(api)
            .execute(json!({"symbol": 42}), ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, OmniError::ToolValidation(_)));
    }
}
