use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Value};

use omniagent_core::error::{OmniError, Result};
use omniagent_core::traits::Tool;
use omniagent_core::types::{ToolContext, ToolResult};

use crate::http::{fmt_num, parse_input, ApiClient};

const NFT_CHAINS: &[&str] = &["eth", "bnb", "polygon", "arbitrum", "optimism", "base"];

fn nftscan_host(chain: &str) -> Result<String> {
    let sub = match chain {
        "eth" => "restapi",
        "bnb" => "bnbapi",
        "polygon" => "polygonapi",
        "arbitrum" => "arbitrumapi",
        "optimism" => "optimismapi",
        "base" => "baseapi",
        other => {
            return Err(OmniError::ToolValidation(format!(
                "unsupported chain '{}', expected one of {}",
                other,
                NFT_CHAINS.join(", ")
            )))
        }
    };
    Ok(format!("https://{}.nftscan.com/api/v2", sub))
}

fn default_chain() -> String {
    "eth".into()
}

fn is_address(s: &str) -> bool {
    s.len() == 42 && s.starts_with("0x") && s[2..].chars().all(|c| c.is_ascii_hexdigit())
}

// ── NftSearchTool ───────────────────────────────────────────────

pub struct NftSearchTool {
    api: Arc<ApiClient>,
    api_key: String,
}

impl NftSearchTool {
    pub fn new(api: Arc<ApiClient>, api_key: &str) -> Self {
        Self {
            api,
            api_key: api_key.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct NftSearchInput {
    query: String,
    #[serde(default = "default_chain")]
    chain: String,
}

fn format_collection(c: &Value) -> String {
    let mut out = format!(
        "{} ({})",
        c["name"].as_str().unwrap_or("Unknown collection"),
        c["contract_address"].as_str().unwrap_or("?")
    );
    if let Some(floor) = c["floor_price"].as_f64() {
        out.push_str(&format!("\n  Floor: {} {}", fmt_num(floor, 4), c["price_symbol"].as_str().unwrap_or("ETH")));
    }
    if let Some(items) = c["items_total"].as_u64() {
        out.push_str(&format!("\n  Items: {}", fmt_num(items as f64, 0)));
    }
    if let Some(owners) = c["owners_total"].as_u64() {
        out.push_str(&format!("\n  Owners: {}", fmt_num(owners as f64, 0)));
    }
    if let Some(desc) = c["description"].as_str().filter(|d| !d.is_empty()) {
        out.push_str(&format!("\n  {}", crate::http::truncate(desc, 240)));
    }
    out
}

impl Tool for NftSearchTool {
    fn name(&self) -> &str {
        "nft_search"
    }

    fn description(&self) -> &str {
        "Look up an NFT collection by name or contract address: floor price, item and owner counts."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Collection name or contract address" },
                "chain": { "type": "string", "enum": NFT_CHAINS, "description": "Chain (default eth)" }
            },
            "required": ["query"]
        })
    }

    fn timeout_secs(&self) -> u64 {
        self.api.timeout().as_secs() + 5
    }

    fn execute(&self, input: Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: NftSearchInput = parse_input(input)?;
            let query = p.query.trim();
            if query.is_empty() {
                return Err(OmniError::ToolValidation("'query' must not be empty".into()));
            }
            let base = nftscan_host(&p.chain)?;
            let headers = [("X-API-KEY", self.api_key.as_str())];

            let collections: Vec<Value> = if is_address(query) {
                let body = self
                    .api
                    .get_json("nft_search", &format!("{}/collections/{}", base, query), &[], &headers)
                    .await?;
                body.get("data").filter(|d| !d.is_null()).cloned().into_iter().collect()
            } else {
                let body = self
                    .api
                    .post_json(
                        "nft_search",
                        &format!("{}/collections/filters", base),
                        &json!({ "name": query, "name_fuzzy_search": true, "limit": 5 }),
                        &headers,
                    )
                    .await?;
                body["data"].as_array().cloned().unwrap_or_default()
            };

            if collections.is_empty() {
                return Ok(ToolResult::success(format!("No NFT collection found for '{}'.", query)));
            }
            Ok(ToolResult::success(
                collections.iter().map(format_collection).collect::<Vec<_>>().join("\n\n"),
            ))
        })
    }
}

// ── NftRankingTool ──────────────────────────────────────────────

pub struct NftRankingTool {
    api: Arc<ApiClient>,
    api_key: String,
}

impl NftRankingTool {
    pub fn new(api: Arc<ApiClient>, api_key: &str) -> Self {
        Self {
            api,
            api_key: api_key.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct NftRankingInput {
    #[serde(default = "default_window")]
    time: String,
    #[serde(default = "default_chain")]
    chain: String,
    #[serde(default = "default_rank_limit")]
    limit: u32,
}
fn default_window() -> String {
    "1d".into()
}
fn default_rank_limit() -> u32 {
    10
}

const RANK_WINDOWS: &[&str] = &["1h", "6h", "12h", "1d", "3d", "7d", "30d"];

fn format_ranking(rows: &[Value], window: &str) -> String {
    if rows.is_empty() {
        return "No NFT trading activity found.".into();
    }
    let mut out = format!("Top NFT collections by volume ({}):", window);
    for (i, r) in rows.iter().enumerate() {
        out.push_str(&format!(
            "\n{}. {} | volume {} | sales {} | floor {}",
            i + 1,
            r["contract_name"].as_str().unwrap_or("?"),
            fmt_num(r["volume"].as_f64().unwrap_or(0.0), 2),
            r["sales"].as_u64().unwrap_or(0),
            fmt_num(r["floor_price"].as_f64().unwrap_or(0.0), 4),
        ));
    }
    out
}

impl Tool for NftRankingTool {
    fn name(&self) -> &str {
        "nft_ranking"
    }

    fn description(&self) -> &str {
        "Rank NFT collections by trading volume over a time window."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "time": { "type": "string", "enum": RANK_WINDOWS, "description": "Window (default 1d)" },
                "chain": { "type": "string", "enum": NFT_CHAINS, "description": "Chain (default eth)" },
                "limit": { "type": "integer", "description": "Rows, 1-50 (default 10)" }
            }
        })
    }

    fn timeout_secs(&self) -> u64 {
        self.api.timeout().as_secs() + 5
    }

    fn execute(&self, input: Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: NftRankingInput = parse_input(input)?;
            if !RANK_WINDOWS.contains(&p.time.as_str()) {
                return Err(OmniError::ToolValidation(format!(
                    "'time' must be one of {}",
                    RANK_WINDOWS.join(", ")
                )));
            }
            if !(1..=50).contains(&p.limit) {
                return Err(OmniError::ToolValidation("'limit' must be between 1 and 50".into()));
            }
            let base = nftscan_host(&p.chain)?;

            let body = self
                .api
                .get_json(
                    "nft_ranking",
                    &format!("{}/statistics/ranking/trade", base),
                    &[
                        ("time", p.time.clone()),
                        ("sort_field", "volume".into()),
                        ("sort_direction", "desc".into()),
                        ("limit", p.limit.to_string()),
                    ],
                    &[("X-API-KEY", self.api_key.as_str())],
                )
                .await?;

            let rows = body["data"].as_array().cloned().unwrap_or_default();
            Ok(ToolResult::success(format_ranking(&rows, &p.time)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omniagent_core::types::SessionId;

    #[test]
    fn test_is_address() {
        assert!(is_address("0xbc4ca0eda7647a8ab7c2061c2e118a18a936f13d"));
        assert!(!is_address("bored apes"));
        assert!(!is_address("0x123"));
    }

    #[test]
    fn test_host_rejects_unknown_chain() {
        assert!(nftscan_host("eth").unwrap().starts_with("https://restapi."));
        assert!(matches!(nftscan_host("doge"), Err(OmniError::ToolValidation(_))));
    }

    #[test]
    fn test_format_collection() {
        let c = json!({
            "name": "BoredApeYachtClub",
            "contract_address": "0xbc4ca0eda7647a8ab7c2061c2e118a18a936f13d",
            "floor_price": 11.5, "items_total": 10000, "owners_total": 5500
        });
        let out = format_collection(&c);
        assert!(out.contains("Floor: 11.5 ETH"));
        assert!(out.contains("Items: 10,000"));
    }

    #[test]
    fn test_format_ranking() {
        let rows = vec![json!({"contract_name": "Pudgy Penguins", "volume": 812.3, "sales": 40, "floor_price": 9.8})];
        let out = format_ranking(&rows, "1d");
        assert!(out.contains("1. Pudgy Penguins | volume 812.3 | sales 40"));
        assert_eq!(format_ranking(&[], "1d"), "No NFT trading activity found.");
    }

    #[tokio::test]
    async fn test_bad_window_is_validation_error() {
        let tool = NftRankingTool::new(Arc::new(ApiClient::new(1)), "k");
        let ctx = ToolContext {
            session_id: SessionId::from("t"),
            agent: "market_analysis_agent".into(),
        };
        let err = tool.execute(json!({"time": "2y"}), ctx).await.unwrap_err();
        assert!(matches!(err, OmniError::ToolValidation(_)));
    }
}
