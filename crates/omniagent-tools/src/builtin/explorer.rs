use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Value};

use omniagent_core::error::{OmniError, Result};
use omniagent_core::traits::Tool;
use omniagent_core::types::{ToolContext, ToolResult};

use crate::http::{exec_err, fmt_num, parse_input, ApiClient};

const BLOCKCHAIR_API: &str = "https://api.blockchair.com";

const CHAINS: &[&str] = &[
    "bitcoin",
    "ethereum",
    "bitcoin-cash",
    "litecoin",
    "dogecoin",
    "dash",
    "zcash",
];

pub struct BlockStatTool {
    api: Arc<ApiClient>,
}

impl BlockStatTool {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[derive(Deserialize)]
struct BlockStatInput {
    #[serde(default = "default_chain")]
    chain: String,
}
fn default_chain() -> String {
    "bitcoin".into()
}

fn normalize_chain(chain: &str) -> Option<&'static str> {
    let c = chain.trim().to_lowercase();
    let c = match c.as_str() {
        "btc" => "bitcoin",
        "eth" => "ethereum",
        "bch" => "bitcoin-cash",
        "ltc" => "litecoin",
        "doge" => "dogecoin",
        "zec" => "zcash",
        other => other,
    };
    CHAINS.iter().copied().find(|known| *known == c)
}

fn format_stats(chain: &str, data: &Value) -> Option<String> {
    let height = data["best_block_height"]
        .as_u64()
        .or_else(|| data["blocks"].as_u64())?;
    let mut lines = vec![format!("{} network stats", chain), format!("Block height: {}", fmt_num(height as f64, 0))];

    let mut push = |label: &str, value: Option<String>| {
        if let Some(v) = value {
            lines.push(format!("{}: {}", label, v));
        }
    };
    push("Latest block time", data["best_block_time"].as_str().map(String::from));
    push("Transactions (24h)", data["transactions_24h"].as_f64().map(|v| fmt_num(v, 0)));
    push("Mempool transactions", data["mempool_transactions"].as_f64().map(|v| fmt_num(v, 0)));
    push("Price", data["market_price_usd"].as_f64().map(|v| format!("${}", fmt_num(v, 2))));
    push("Hashrate (24h)", data["hashrate_24h"].as_str().map(String::from));
    push(
        "Suggested fee",
        data["suggested_transaction_fee_per_byte_sat"]
            .as_f64()
            .map(|v| format!("{} sat/byte", fmt_num(v, 0))),
    );
    push(
        "Median gas price",
        data["median_simple_transaction_fee_24h"]
            .as_f64()
            .filter(|_| chain == "ethereum")
            .map(|v| format!("{} wei", fmt_num(v, 0))),
    );

    Some(lines.join("\n"))
}

impl Tool for BlockStatTool {
    fn name(&self) -> &str {
        "block_stat"
    }

    fn description(&self) -> &str {
        "Get live blockchain statistics: block height, 24h transactions, mempool size, fees and price."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "chain": {
                    "type": "string",
                    "enum": CHAINS,
                    "description": "Blockchain (default bitcoin)"
                }
            }
        })
    }

    fn timeout_secs(&self) -> u64 {
        self.api.timeout().as_secs() + 5
    }

    fn execute(&self, input: Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: BlockStatInput = parse_input(input)?;
            let chain = normalize_chain(&p.chain).ok_or_else(|| {
                OmniError::ToolValidation(format!(
                    "unsupported chain '{}', expected one of {}",
                    p.chain,
                    CHAINS.join(", ")
                ))
            })?;

            let body = self
                .api
                .get_json("block_stat", &format!("{}/{}/stats", BLOCKCHAIR_API, chain), &[], &[])
                .await?;

            format_stats(chain, &body["data"])
                .map(ToolResult::success)
                .ok_or_else(|| exec_err("block_stat", format!("unexpected stats payload for {}", chain)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_chain() {
        assert_eq!(normalize_chain("ETH"), Some("ethereum"));
        assert_eq!(normalize_chain("bitcoin"), Some("bitcoin"));
        assert_eq!(normalize_chain("solana"), None);
    }

    #[test]
    fn test_format_stats() {
        let data = json!({
            "best_block_height": 840000,
            "transactions_24h": 512345,
            "mempool_transactions": 12000,
            "market_price_usd": 65000.25
        });
        let out = format_stats("bitcoin", &data).unwrap();
        assert!(out.contains("Block height: 840,000"));
        assert!(out.contains("Transactions (24h): 512,345"));
        assert!(out.contains("Price: $65,000.25"));
        assert!(format_stats("bitcoin", &json!({})).is_none());
    }
}
