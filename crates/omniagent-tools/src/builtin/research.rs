use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Value};

use omniagent_core::error::{OmniError, Result};
use omniagent_core::traits::Tool;
use omniagent_core::types::{ToolContext, ToolResult};

use crate::http::{exec_err, fmt_num, parse_input, truncate, ApiClient};

const ROOTDATA_API: &str = "https://api.rootdata.com/open";

/// Web3 project lookup backed by RootData.
pub struct ProjectTool {
    api: Arc<ApiClient>,
    api_key: String,
}

impl ProjectTool {
    pub fn new(api: Arc<ApiClient>, api_key: &str) -> Self {
        Self {
            api,
            api_key: api_key.to_string(),
        }
    }

    async fn call(&self, endpoint: &str, body: Value) -> Result<Value> {
        let headers = [("apikey", self.api_key.as_str()), ("language", "en")];
        let resp = self
            .api
            .post_json("project", &format!("{}/{}", ROOTDATA_API, endpoint), &body, &headers)
            .await?;
        // RootData reports failures in-band with HTTP 200.
        match resp["result"].as_i64() {
            Some(200) | None => Ok(resp),
            Some(code) => Err(exec_err(
                "project",
                format!("RootData error {}: {}", code, resp["message"].as_str().unwrap_or("")),
            )),
        }
    }
}

#[derive(Deserialize)]
struct ProjectInput {
    query: String,
}

fn first_project_id(search: &Value) -> Option<i64> {
    search["data"]
        .as_array()?
        .iter()
        .find(|hit| hit["type"].as_i64() == Some(1))
        .and_then(|hit| hit["id"].as_i64())
}

fn names(list: &Value, limit: usize) -> Option<String> {
    let names: Vec<&str> = list
        .as_array()?
        .iter()
        .filter_map(|v| v["name"].as_str())
        .take(limit)
        .collect();
    (!names.is_empty()).then(|| names.join(", "))
}

fn format_project(item: &Value) -> String {
    let mut out = format!(
        "{}{}",
        item["project_name"].as_str().unwrap_or("Unknown project"),
        item["token_symbol"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(|s| format!(" ({})", s))
            .unwrap_or_default()
    );
    if let Some(one_liner) = item["one_liner"].as_str() {
        out.push_str(&format!("\n{}", one_liner));
    }
    if let Some(desc) = item["description"].as_str().filter(|d| !d.is_empty()) {
        out.push_str(&format!("\n\n{}", truncate(desc, 600)));
    }
    if let Some(year) = item["establishment_date"].as_str() {
        out.push_str(&format!("\nFounded: {}", year));
    }
    if let Some(total) = item["total_funding"].as_f64() {
        out.push_str(&format!("\nTotal funding: ${}", fmt_num(total, 0)));
    }
    if let Some(tags) = item["tags"].as_array() {
        let tags: Vec<&str> = tags.iter().filter_map(|t| t.as_str()).collect();
        if !tags.is_empty() {
            out.push_str(&format!("\nTags: {}", tags.join(", ")));
        }
    }
    if let Some(team) = names(&item["team_members"], 6) {
        out.push_str(&format!("\nTeam: {}", team));
    }
    if let Some(investors) = names(&item["investors"], 10) {
        out.push_str(&format!("\nInvestors: {}", investors));
    }
    if let Some(site) = item["social_media"]["website"].as_str() {
        out.push_str(&format!("\nWebsite: {}", site));
    }
    out
}

impl Tool for ProjectTool {
    fn name(&self) -> &str {
        "project"
    }

    fn description(&self) -> &str {
        "Research a web3 project: description, team, investors, funding and tags."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Project name or token symbol" }
            },
            "required": ["query"]
        })
    }

    fn timeout_secs(&self) -> u64 {
        self.api.timeout().as_secs() * 2 + 5
    }

    fn execute(&self, input: Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: ProjectInput = parse_input(input)?;
            let query = p.query.trim();
            if query.is_empty() {
                return Err(OmniError::ToolValidation("'query' must not be empty".into()));
            }

            let search = self.call("ser_inv", json!({ "query": query })).await?;
            let Some(id) = first_project_id(&search) else {
                return Ok(ToolResult::success(format!("No project found for '{}'.", query)));
            };

            let detail = self
                .call(
                    "get_item",
                    json!({ "project_id": id, "include_team": true, "include_investors": true }),
                )
                .await?;
            Ok(ToolResult::success(format_project(&detail["data"])))
        })
    }
}
