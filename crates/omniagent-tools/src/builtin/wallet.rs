use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use omniagent_core::error::{OmniError, Result};
use omniagent_core::traits::Tool;
use omniagent_core::types::{ToolContext, ToolResult};

use crate::http::{fmt_num, parse_input, ApiClient};

const COVALENT_API: &str = "https://api.covalenthq.com/v1";

fn default_chain() -> String {
    "eth-mainnet".into()
}

fn looks_like_address(s: &str) -> bool {
    let s = s.trim();
    (s.starts_with("0x") && s.len() >= 40) || s.ends_with(".eth")
}

fn validate_wallet(address: &str) -> Result<()> {
    let a = address.trim();
    let hex_ok = a.len() == 42 && a.starts_with("0x") && a[2..].chars().all(|c| c.is_ascii_hexdigit());
    if hex_ok || (a.ends_with(".eth") && a.len() > 4) {
        Ok(())
    } else {
        Err(OmniError::ToolValidation(format!(
            "'{}' is not a wallet address or ENS name",
            a
        )))
    }
}

fn validate_chain(chain: &str) -> Result<()> {
    if !chain.is_empty() && chain.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        Ok(())
    } else {
        Err(OmniError::ToolValidation(format!("invalid chain name '{}'", chain)))
    }
}

#[derive(Deserialize)]
struct BalanceInput {
    address: String,
    #[serde(default = "default_chain")]
    chain: String,
}

fn balance_url(chain: &str, address: &str, endpoint: &str) -> String {
    format!(
        "{}/{}/address/{}/{}/",
        COVALENT_API,
        chain,
        urlencoding::encode(address.trim()),
        endpoint
    )
}

// ── TokenBalanceTool ────────────────────────────────────────────

pub struct TokenBalanceTool {
    api: Arc<ApiClient>,
    api_key: String,
}

impl TokenBalanceTool {
    pub fn new(api: Arc<ApiClient>, api_key: &str) -> Self {
        Self {
            api,
            api_key: api_key.to_string(),
        }
    }
}

/// Convert a raw integer balance string using the token's decimals.
fn scaled_balance(raw: &str, decimals: u32) -> f64 {
    raw.parse::<f64>().unwrap_or(0.0) / 10f64.powi(decimals as i32)
}

fn format_token_balances(body: &Value) -> String {
    let mut items: Vec<&Value> = body["data"]["items"]
        .as_array()
        .map(|a| a.iter().filter(|i| i["type"].as_str() != Some("dust")).collect())
        .unwrap_or_default();
    if items.is_empty() {
        return "No token balances found.".into();
    }
    items.sort_by(|a, b| {
        let qa = a["quote"].as_f64().unwrap_or(0.0);
        let qb = b["quote"].as_f64().unwrap_or(0.0);
        qb.total_cmp(&qa)
    });

    items
        .iter()
        .take(20)
        .map(|i| {
            let decimals = i["contract_decimals"].as_u64().unwrap_or(18) as u32;
            let amount = scaled_balance(i["balance"].as_str().unwrap_or("0"), decimals);
            let mut line = format!(
                "{} {}",
                fmt_num(amount, 4),
                i["contract_ticker_symbol"].as_str().unwrap_or("?")
            );
            if let Some(quote) = i["quote"].as_f64() {
                line.push_str(&format!(" (${})", fmt_num(quote, 2)));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

impl Tool for TokenBalanceTool {
    fn name(&self) -> &str {
        "token_balance"
    }

    fn description(&self) -> &str {
        "Get the token balances held by a wallet address on a chain, with USD values."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "address": { "type": "string", "description": "Wallet address (0x...) or ENS name" },
                "chain": { "type": "string", "description": "Chain name, e.g. eth-mainnet (default)" }
            },
            "required": ["address"]
        })
    }

    fn timeout_secs(&self) -> u64 {
        self.api.timeout().as_secs() + 5
    }

    fn execute(&self, input: Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: BalanceInput = parse_input(input)?;
            validate_wallet(&p.address)?;
            validate_chain(&p.chain)?;
            let auth = format!("Bearer {}", self.api_key);

            let body = self
                .api
                .get_json(
                    "token_balance",
                    &balance_url(&p.chain, &p.address, "balances_v2"),
                    &[],
                    &[("Authorization", auth.as_str())],
                )
                .await?;
            Ok(ToolResult::success(format_token_balances(&body)))
        })
    }
}

// ── NftBalanceTool ──────────────────────────────────────────────

pub struct NftBalanceTool {
    api: Arc<ApiClient>,
    api_key: String,
}

impl NftBalanceTool {
    pub fn new(api: Arc<ApiClient>, api_key: &str) -> Self {
        Self {
            api,
            api_key: api_key.to_string(),
        }
    }
}

fn format_nft_balances(body: &Value) -> String {
    let items = body["data"]["items"].as_array().cloned().unwrap_or_default();
    if items.is_empty() {
        return "No NFTs found.".into();
    }
    items
        .iter()
        .take(20)
        .map(|i| {
            let held = i["nft_data"]
                .as_array()
                .map(|d| d.len())
                .or_else(|| i["balance"].as_str().and_then(|b| b.parse().ok()))
                .unwrap_or(0);
            format!(
                "{} ({}): {} held",
                i["contract_name"].as_str().unwrap_or("Unknown"),
                i["contract_ticker_symbol"].as_str().unwrap_or("?"),
                held
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

impl Tool for NftBalanceTool {
    fn name(&self) -> &str {
        "nft_balance"
    }

    fn description(&self) -> &str {
        "List the NFT collections held by a wallet address on a chain."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "address": { "type": "string", "description": "Wallet address (0x...) or ENS name" },
                "chain": { "type": "string", "description": "Chain name, e.g. eth-mainnet (default)" }
            },
            "required": ["address"]
        })
    }

    fn timeout_secs(&self) -> u64 {
        self.api.timeout().as_secs() + 5
    }

    fn execute(&self, input: Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: BalanceInput = parse_input(input)?;
            validate_wallet(&p.address)?;
            validate_chain(&p.chain)?;
            let auth = format!("Bearer {}", self.api_key);

            let body = self
                .api
                .get_json(
                    "nft_balance",
                    &balance_url(&p.chain, &p.address, "balances_nft"),
                    &[("no-spam", "true".into())],
                    &[("Authorization", auth.as_str())],
                )
                .await?;
            Ok(ToolResult::success(format_nft_balances(&body)))
        })
    }
}

// ── Widgets ─────────────────────────────────────────────────────

/// Wallet action rendered and signed by the client.
#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "widget", rename_all = "snake_case")]
pub enum Widget {
    Swap {
        from_token: String,
        to_token: String,
        amount: String,
        from_chain: String,
        to_chain: String,
    },
    Transfer {
        token: String,
        amount: String,
        chain: String,
    },
}

fn validate_token(field: &str, token: &str) -> Result<String> {
    let t = token.trim();
    if t.is_empty() {
        return Err(OmniError::ToolValidation(format!("'{}' must not be empty", field)));
    }
    if looks_like_address(t) {
        return Err(OmniError::ToolValidation(format!(
            "'{}' must be a token symbol, not an address",
            field
        )));
    }
    Ok(t.to_uppercase())
}

fn validate_amount(amount: &str) -> Result<String> {
    let a = amount.trim();
    match a.parse::<f64>() {
        Ok(v) if v > 0.0 && v.is_finite() => Ok(a.to_string()),
        _ => Err(OmniError::ToolValidation(format!(
            "'amount' must be a positive number, got '{}'",
            a
        ))),
    }
}

fn widget_result(widget: &Widget) -> Result<ToolResult> {
    Ok(ToolResult::success(serde_json::to_string(widget)?))
}

fn default_widget_chain() -> String {
    "ethereum".into()
}

// Numbers from the model may arrive as JSON numbers or strings.
fn amount_string<'de, D: serde::Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    match Value::deserialize(d)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("expected amount, got {}", other))),
    }
}

pub struct SwapTool;

#[derive(Deserialize)]
struct SwapInput {
    from_token: String,
    to_token: String,
    #[serde(deserialize_with = "amount_string")]
    amount: String,
    #[serde(default = "default_widget_chain")]
    from_chain: String,
    #[serde(default)]
    to_chain: Option<String>,
}

impl Tool for SwapTool {
    fn name(&self) -> &str {
        "swap"
    }

    fn description(&self) -> &str {
        "Build a token swap widget (same-chain or cross-chain) for the user to review and sign in their wallet."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "from_token": { "type": "string", "description": "Symbol to sell, e.g. ETH" },
                "to_token": { "type": "string", "description": "Symbol to buy, e.g. USDC" },
                "amount": { "type": "string", "description": "Amount of from_token" },
                "from_chain": { "type": "string", "description": "Source chain (default ethereum)" },
                "to_chain": { "type": "string", "description": "Destination chain (default: same as source)" }
            },
            "required": ["from_token", "to_token", "amount"]
        })
    }

    fn execute(&self, input: Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: SwapInput = parse_input(input)?;
            let to_chain = p.to_chain.unwrap_or_else(|| p.from_chain.clone());
            let widget = Widget::Swap {
                from_token: validate_token("from_token", &p.from_token)?,
                to_token: validate_token("to_token", &p.to_token)?,
                amount: validate_amount(&p.amount)?,
                from_chain: p.from_chain.trim().to_lowercase(),
                to_chain: to_chain.trim().to_lowercase(),
            };
            widget_result(&widget)
        })
    }
}

pub struct TransferTool;

#[derive(Deserialize)]
struct TransferInput {
    token: String,
    #[serde(deserialize_with = "amount_string")]
    amount: String,
    #[serde(default = "default_widget_chain")]
    chain: String,
}

impl Tool for TransferTool {
    fn name(&self) -> &str {
        "transfer"
    }

    fn description(&self) -> &str {
        "Build a token transfer widget; the user enters the recipient and signs in their wallet."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "token": { "type": "string", "description": "Symbol to send, e.g. USDT" },
                "amount": { "type": "string", "description": "Amount to send" },
                "chain": { "type": "string", "description": "Chain (default ethereum)" }
            },
            "required": ["token", "amount"]
        })
    }

    fn execute(&self, input: Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: TransferInput = parse_input(input)?;
            let widget = Widget::Transfer {
                token: validate_token("token", &p.token)?,
                amount: validate_amount(&p.amount)?,
                chain: p.chain.trim().to_lowercase(),
            };
            widget_result(&widget)
        })
    }
}
