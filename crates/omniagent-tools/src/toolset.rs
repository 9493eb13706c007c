//! Per-agent tool lists derived from configured API keys.

use std::sync::Arc;

use omniagent_core::config::ToolsConfig;

use crate::builtin::{explorer, feed, market, nft, research, wallet, web_search};
use crate::http::ApiClient;
use crate::registry::ToolRegistry;

/// Which keyed services are usable, with their keys.
#[derive(Debug, Clone, Default)]
pub struct ToolCapabilities {
    pub coingecko: Option<String>,
    pub nftscan: Option<String>,
    pub covalent: Option<String>,
    pub rootdata: Option<String>,
    pub tavily: Option<String>,
    pub http_timeout_secs: u64,
}

impl From<&ToolsConfig> for ToolCapabilities {
    fn from(config: &ToolsConfig) -> Self {
        let key = |k: &Option<String>| k.clone().filter(|v| !v.trim().is_empty());
        Self {
            coingecko: key(&config.coingecko_api_key),
            nftscan: key(&config.nftscan_api_key),
            covalent: key(&config.covalent_api_key),
            rootdata: key(&config.rootdata_api_key),
            tavily: key(&config.tavily_api_key),
            http_timeout_secs: config.http_timeout_secs,
        }
    }
}

/// Builds the tool registry for each agent. Keyless tools are always
/// included; keyed tools only when their key is present.
pub struct ToolsetBuilder {
    caps: ToolCapabilities,
    api: Arc<ApiClient>,
}

impl ToolsetBuilder {
    pub fn new(caps: ToolCapabilities) -> Self {
        let api = Arc::new(ApiClient::new(caps.http_timeout_secs));
        Self { caps, api }
    }

    pub fn capabilities(&self) -> &ToolCapabilities {
        &self.caps
    }

    fn web_search(&self, registry: &mut ToolRegistry) {
        if let Some(key) = &self.caps.tavily {
            registry.register(web_search::WebSearchTool::new(self.api.clone(), key));
        }
    }

    pub fn market(&self) -> ToolRegistry {
        let mut r = ToolRegistry::new();
        r.register(market::FundingRateTool::new(self.api.clone()));
        self.web_search(&mut r);
        if let Some(key) = &self.caps.coingecko {
            r.register(market::PriceTool::new(self.api.clone(), key));
            r.register(market::CoinMarketTool::new(self.api.clone(), key));
        }
        if let Some(key) = &self.caps.nftscan {
            r.register(nft::NftSearchTool::new(self.api.clone(), key));
            r.register(nft::NftRankingTool::new(self.api.clone(), key));
        }
        r
    }

    pub fn asset(&self) -> ToolRegistry {
        let mut r = ToolRegistry::new();
        r.register(wallet::SwapTool);
        r.register(wallet::TransferTool);
        if let Some(key) = &self.caps.covalent {
            r.register(wallet::TokenBalanceTool::new(self.api.clone(), key));
            r.register(wallet::NftBalanceTool::new(self.api.clone(), key));
        }
        r
    }

    pub fn explorer(&self) -> ToolRegistry {
        let mut r = ToolRegistry::new();
        r.register(explorer::BlockStatTool::new(self.api.clone()));
        self.web_search(&mut r);
        r
    }

    pub fn feed(&self) -> ToolRegistry {
        let mut r = ToolRegistry::new();
        r.register(feed::FeedTool::new(self.api.clone()));
        r.register(feed::FeedSourceTool::new(self.api.clone()));
        r.register(feed::DefiTool::new(self.api.clone()));
        r.register(feed::TelegramNewsTool::new(self.api.clone()));
        r
    }

    pub fn research(&self) -> ToolRegistry {
        let mut r = ToolRegistry::new();
        self.web_search(&mut r);
        if let Some(key) = &self.caps.rootdata {
            r.register(research::ProjectTool::new(self.api.clone(), key));
        }
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_keys() -> ToolCapabilities {
        ToolCapabilities {
            coingecko: Some("cg".into()),
            nftscan: Some("ns".into()),
            covalent: Some("cv".into()),
            rootdata: Some("rd".into()),
            tavily: Some("tv".into()),
            http_timeout_secs: 5,
        }
    }

    #[test]
    fn test_keyless_toolsets() {
        let builder = ToolsetBuilder::new(ToolCapabilities::default());
        assert_eq!(builder.market().list(), vec!["funding_rate"]);
        assert_eq!(builder.asset().list(), vec!["swap", "transfer"]);
        assert_eq!(builder.explorer().list(), vec!["block_stat"]);
        assert_eq!(
            builder.feed().list(),
            vec!["feed", "feed_source", "defi", "telegram_news"]
        );
        assert!(builder.research().is_empty());
    }

    #[test]
    fn test_full_toolsets_are_stable() {
        let builder = ToolsetBuilder::new(all_keys());
        assert_eq!(
            builder.market().list(),
            vec!["funding_rate", "web_search", "price", "coin_market", "nft_search", "nft_ranking"]
        );
        assert_eq!(
            builder.asset().list(),
            vec!["swap", "transfer", "token_balance", "nft_balance"]
        );
        assert_eq!(builder.research().list(), vec!["web_search", "project"]);

        let again = ToolsetBuilder::new(all_keys());
        assert_eq!(builder.market().list(), again.market().list());
    }

    #[test]
    fn test_blank_keys_are_ignored() {
        let mut config = ToolsConfig::default();
        config.coingecko_api_key = Some("  ".into());
        config.tavily_api_key = Some("tv".into());
        let caps = ToolCapabilities::from(&config);
        assert!(caps.coingecko.is_none());
        assert_eq!(caps.tavily.as_deref(), Some("tv"));
    }
}
