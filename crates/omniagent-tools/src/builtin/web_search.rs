use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::json;

use omniagent_core::error::{OmniError, Result};
use omniagent_core::traits::Tool;
use omniagent_core::types::{ToolContext, ToolResult};

use crate::http::{truncate, ApiClient};

pub struct WebSearchTool {
    api: Arc<ApiClient>,
    api_key: String,
}

impl WebSearchTool {
    pub fn new(api: Arc<ApiClient>, api_key: &str) -> Self {
        Self {
            api,
            api_key: api_key.to_string(),
        }
    }
}

fn format_results(body: &serde_json::Value) -> String {
    let mut sections = Vec::new();
    if let Some(answer) = body["answer"].as_str().filter(|a| !a.is_empty()) {
        sections.push(format!("Summary: {}", answer));
    }
    if let Some(results) = body["results"].as_array() {
        sections.extend(results.iter().map(|r| {
            format!(
                "**{}**\n{}\nURL: {}",
                r["title"].as_str().unwrap_or(""),
                truncate(r["content"].as_str().unwrap_or(""), 800),
                r["url"].as_str().unwrap_or("")
            )
        }));
    }
    if sections.is_empty() {
        "No results found.".into()
    } else {
        sections.join("\n\n---\n\n")
    }
}

impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for current information such as news, events and project updates. Returns relevant results with snippets."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results (default 5)",
                    "default": 5
                }
            },
            "required": ["query"]
        })
    }

    fn timeout_secs(&self) -> u64 {
        self.api.timeout().as_secs() + 5
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let query = input["query"]
                .as_str()
                .filter(|q| !q.trim().is_empty())
                .ok_or_else(|| OmniError::ToolValidation("'query' must be a non-empty string".into()))?;
            let max = input["max_results"].as_u64().unwrap_or(5).clamp(1, 10);

            let body = self
                .api
                .post_json(
                    "web_search",
                    "https://api.tavily.com/search",
                    &json!({
                        "api_key": self.api_key,
                        "query": query,
                        "max_results": max,
                        "include_answer": true,
                    }),
                    &[],
                )
                .await?;

            Ok(ToolResult::success(format_results(&body)))
        })
    }
}
