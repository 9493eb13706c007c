//! Activity feeds from the RSS3 network.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Value};

use omniagent_core::error::{OmniError, Result};
use omniagent_core::traits::Tool;
use omniagent_core::types::{ToolContext, ToolResult};

use crate::http::{parse_input, truncate, ApiClient};

const RSS3_API: &str = "https://gi.rss3.io";

const SOCIAL_PLATFORMS: &[&str] = &["Farcaster", "Lens", "Mirror", "Paragraph", "Crossbell"];

fn default_limit() -> u32 {
    10
}

fn validate_account(account: &str) -> Result<&str> {
    let a = account.trim();
    let hex = a.len() == 42 && a.starts_with("0x") && a[2..].chars().all(|c| c.is_ascii_hexdigit());
    let handle = a.contains('.') && a.chars().all(|c| c.is_ascii_alphanumeric() || ".-_".contains(c));
    if hex || handle {
        Ok(a)
    } else {
        Err(OmniError::ToolValidation(format!(
            "'{}' is not an address or handle (e.g. vitalik.eth)",
            a
        )))
    }
}

fn validate_limit(limit: u32) -> Result<u32> {
    if (1..=50).contains(&limit) {
        Ok(limit)
    } else {
        Err(OmniError::ToolValidation("'limit' must be between 1 and 50".into()))
    }
}

/// One line per activity: time, where, what, and the best available summary.
fn format_activities(body: &Value) -> String {
    let Some(items) = body["data"].as_array().filter(|d| !d.is_empty()) else {
        return "No activities found.".into();
    };

    items
        .iter()
        .map(|a| {
            let when = a["timestamp"]
                .as_i64()
                .and_then(|t| chrono::DateTime::from_timestamp(t, 0))
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "?".into());
            let place = a["platform"]
                .as_str()
                .filter(|p| !p.is_empty())
                .or_else(|| a["network"].as_str())
                .unwrap_or("?");
            let kind = format!(
                "{}/{}",
                a["tag"].as_str().unwrap_or("?"),
                a["type"].as_str().unwrap_or("?")
            );
            match summarize(&a["actions"][0]) {
                Some(s) => format!("{} [{}] {}: {}", when, place, kind, s),
                None => format!("{} [{}] {}", when, place, kind),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn summarize(action: &Value) -> Option<String> {
    let meta = &action["metadata"];
    for key in ["title", "body", "description"] {
        if let Some(text) = meta[key].as_str().filter(|t| !t.trim().is_empty()) {
            return Some(truncate(text.trim(), 200).replace('\n', " "));
        }
    }
    if let (Some(value), Some(symbol)) = (meta["value"].as_str(), meta["symbol"].as_str()) {
        let decimals = meta["decimals"].as_u64().unwrap_or(0) as i32;
        let amount = value.parse::<f64>().unwrap_or(0.0) / 10f64.powi(decimals);
        return Some(format!("{} {}", crate::http::fmt_num(amount, 4), symbol));
    }
    if let Some(from) = meta["from"]["symbol"].as_str() {
        let to = meta["to"]["symbol"].as_str().unwrap_or("?");
        return Some(format!("{} → {}", from, to));
    }
    None
}

async fn fetch_activities(
    api: &ApiClient,
    tool: &str,
    account: &str,
    query: Vec<(&str, String)>,
) -> Result<ToolResult> {
    let url = format!(
        "{}/decentralized/{}",
        RSS3_API,
        urlencoding::encode(account)
    );
    let body = api.get_json(tool, &url, &query, &[]).await?;
    Ok(ToolResult::success(format_activities(&body)))
}

// ── FeedTool ────────────────────────────────────────────────────

pub struct FeedTool {
    api: Arc<ApiClient>,
}

impl FeedTool {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[derive(Deserialize)]
struct FeedInput {
    address: String,
    #[serde(default)]
    tag: Option<String>,
    #[serde(default = "default_limit")]
    limit: u32,
}

const FEED_TAGS: &[&str] = &["social", "transaction", "exchange", "collectible", "governance", "donation"];

impl Tool for FeedTool {
    fn name(&self) -> &str {
        "feed"
    }

    fn description(&self) -> &str {
        "Get recent on-chain and social activities of a wallet address or handle."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "address": { "type": "string", "description": "Wallet address or handle, e.g. vitalik.eth" },
                "tag": { "type": "string", "enum": FEED_TAGS, "description": "Activity category filter" },
                "limit": { "type": "integer", "description": "Activities to return, 1-50 (default 10)" }
            },
            "required": ["address"]
        })
    }

    fn timeout_secs(&self) -> u64 {
        self.api.timeout().as_secs() + 5
    }

    fn execute(&self, input: Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: FeedInput = parse_input(input)?;
            let account = validate_account(&p.address)?;
            let mut query = vec![("limit", validate_limit(p.limit)?.to_string()), ("action_limit", "5".into())];
            if let Some(tag) = p.tag {
                if !FEED_TAGS.contains(&tag.as_str()) {
                    return Err(OmniError::ToolValidation(format!(
                        "'tag' must be one of {}",
                        FEED_TAGS.join(", ")
                    )));
                }
                query.push(("tag", tag));
            }
            fetch_activities(&self.api, "feed", account, query).await
        })
    }
}

// ── FeedSourceTool ──────────────────────────────────────────────

pub struct FeedSourceTool {
    api: Arc<ApiClient>,
}

impl FeedSourceTool {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[derive(Deserialize)]
struct FeedSourceInput {
    address: String,
    platform: String,
    #[serde(default = "default_limit")]
    limit: u32,
}

impl Tool for FeedSourceTool {
    fn name(&self) -> &str {
        "feed_source"
    }

    fn description(&self) -> &str {
        "Get a wallet's social activities from one platform such as Farcaster, Lens or Mirror."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "address": { "type": "string", "description": "Wallet address or handle" },
                "platform": { "type": "string", "enum": SOCIAL_PLATFORMS },
                "limit": { "type": "integer", "description": "Activities to return, 1-50 (default 10)" }
            },
            "required": ["address", "platform"]
        })
    }

    fn timeout_secs(&self) -> u64 {
        self.api.timeout().as_secs() + 5
    }

    fn execute(&self, input: Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: FeedSourceInput = parse_input(input)?;
            let account = validate_account(&p.address)?;
            let platform = SOCIAL_PLATFORMS
                .iter()
                .find(|known| known.eq_ignore_ascii_case(p.platform.trim()))
                .ok_or_else(|| {
                    OmniError::ToolValidation(format!(
                        "'platform' must be one of {}",
                        SOCIAL_PLATFORMS.join(", ")
                    ))
                })?;
            let query = vec![
                ("limit", validate_limit(p.limit)?.to_string()),
                ("platform", platform.to_string()),
                ("tag", "social".into()),
            ];
            fetch_activities(&self.api, "feed_source", account, query).await
        })
    }
}

// ── DefiTool ────────────────────────────────────────────────────

pub struct DefiTool {
    api: Arc<ApiClient>,
}

impl DefiTool {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[derive(Deserialize)]
struct DefiInput {
    address: String,
    #[serde(default)]
    activity: Option<String>,
    #[serde(default = "default_limit")]
    limit: u32,
}

const DEFI_TYPES: &[&str] = &["swap", "liquidity", "staking"];

impl Tool for DefiTool {
    fn name(&self) -> &str {
        "defi"
    }

    fn description(&self) -> &str {
        "Get a wallet's DeFi activities: swaps, liquidity provision and staking."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "address": { "type": "string", "description": "Wallet address or handle" },
                "activity": { "type": "string", "enum": DEFI_TYPES, "description": "DeFi activity type filter" },
                "limit": { "type": "integer", "description": "Activities to return, 1-50 (default 10)" }
            },
            "required": ["address"]
        })
    }

    fn timeout_secs(&self) -> u64 {
        self.api.timeout().as_secs() + 5
    }

    fn execute(&self, input: Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: DefiInput = parse_input(input)?;
            let account = validate_account(&p.address)?;
            let mut query = vec![
                ("limit", validate_limit(p.limit)?.to_string()),
                ("tag", "exchange".into()),
            ];
            if let Some(kind) = p.activity {
                if !DEFI_TYPES.contains(&kind.as_str()) {
                    return Err(OmniError::ToolValidation(format!(
                        "'activity' must be one of {}",
                        DEFI_TYPES.join(", ")
                    )));
                }
                query.push(("type", kind));
            }
            fetch_activities(&self.api, "defi", account, query).await
        })
    }
}

// ── TelegramNewsTool ────────────────────────────────────────────

pub struct TelegramNewsTool {
    api: Arc<ApiClient>,
}

impl TelegramNewsTool {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[derive(Deserialize)]
struct TelegramNewsInput {
    #[serde(default = "default_channel")]
    channel: String,
    #[serde(default = "default_news_limit")]
    limit: u32,
}
fn default_channel() -> String {
    "ChannelPANews".into()
}
fn default_news_limit() -> u32 {
    5
}

impl Tool for TelegramNewsTool {
    fn name(&self) -> &str {
        "telegram_news"
    }

    fn description(&self) -> &str {
        "Get the latest crypto news posts from a public Telegram channel."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "channel": { "type": "string", "description": "Channel username (default ChannelPANews)" },
                "limit": { "type": "integer", "description": "Posts to return, 1-50 (default 5)" }
            }
        })
    }

    fn timeout_secs(&self) -> u64 {
        self.api.timeout().as_secs() + 5
    }

    fn execute(&self, input: Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: TelegramNewsInput = parse_input(input)?;
            let channel = p.channel.trim().trim_start_matches('@');
            if channel.is_empty() || !channel.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(OmniError::ToolValidation(format!("invalid channel name '{}'", p.channel)));
            }
            let limit = validate_limit(p.limit)?;

            let mut body = self
                .api
                .get_json(
                    "telegram_news",
                    &format!("{}/rss/telegram/channel/{}", RSS3_API, channel),
                    &[],
                    &[],
                )
                .await?;

            if let Some(items) = body["data"].as_array_mut() {
                items.truncate(limit as usize);
            }
            Ok(ToolResult::success(format_activities(&body)))
        })
    }
}
