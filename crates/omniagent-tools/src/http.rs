use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tracing::debug;

use omniagent_core::error::{OmniError, Result};

/// Shared HTTP client for tools that call JSON APIs.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(timeout_secs: u64) -> Self {
        let timeout = Duration::from_secs(timeout_secs.max(1));
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("omniagent/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { http, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET `url` and decode the body as JSON.
    pub async fn get_json(
        &self,
        tool: &str,
        url: &str,
        query: &[(&str, String)],
        headers: &[(&str, &str)],
    ) -> Result<Value> {
        let req = self
            .http
            .get(url)
            .query(query)
            .headers(header_map(tool, headers)?);
        self.send(tool, url, req).await
    }

    /// POST a JSON body to `url` and decode the response as JSON.
    pub async fn post_json(
        &self,
        tool: &str,
        url: &str,
        body: &Value,
        headers: &[(&str, &str)],
    ) -> Result<Value> {
        let req = self
            .http
            .post(url)
            .json(body)
            .headers(header_map(tool, headers)?);
        self.send(tool, url, req).await
    }

    async fn send(&self, tool: &str, url: &str, req: reqwest::RequestBuilder) -> Result<Value> {
        let resp = req.send().await.map_err(|e| exec_err(tool, e))?;
        let status = resp.status();
        debug!(tool, url, status = status.as_u16(), "Upstream response");

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(exec_err(
                tool,
                format!("HTTP {}: {}", status.as_u16(), truncate(&body, 200)),
            ));
        }

        resp.json().await.map_err(|e| exec_err(tool, e))
    }
}

fn header_map(tool: &str, headers: &[(&str, &str)]) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| exec_err(tool, e))?;
        let value = HeaderValue::from_str(value).map_err(|e| exec_err(tool, e))?;
        map.insert(name, value);
    }
    Ok(map)
}

pub(crate) fn exec_err(tool: &str, message: impl ToString) -> OmniError {
    OmniError::ToolExecution {
        tool: tool.to_string(),
        message: message.to_string(),
    }
}

/// Deserialize tool input into its typed form.
pub(crate) fn parse_input<T: serde::de::DeserializeOwned>(input: Value) -> Result<T> {
    serde_json::from_value(input).map_err(|e| OmniError::ToolValidation(e.to_string()))
}

pub(crate) fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Render a number with thousands separators and at most `decimals` places.
pub(crate) fn fmt_num(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int, frac) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::new();
    for (i, ch) in int.chars().enumerate() {
        if i > 0 && (int.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if value < 0.0 {
        grouped.insert(0, '-');
    }
    match frac {
        Some(f) if !f.trim_end_matches('0').is_empty() => {
            format!("{}.{}", grouped, f.trim_end_matches('0'))
        }
        _ => grouped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_num() {
        assert_eq!(fmt_num(3012.5, 2), "3,012.5");
        assert_eq!(fmt_num(1234567.0, 2), "1,234,567");
        assert_eq!(fmt_num(-0.0421, 4), "-0.0421");
        assert_eq!(fmt_num(12.0, 0), "12");
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        assert_eq!(truncate("héllo", 2), "h");
        assert_eq!(truncate("abc", 10), "abc");
    }

    #[test]
    fn test_parse_input_maps_to_validation() {
        #[derive(serde::Deserialize, Debug)]
        struct In {
            #[allow(dead_code)]
            symbol: String,
        }
        let err = parse_input::<In>(serde_json::json!({})).unwrap_err();
        assert!(matches!(err, OmniError::ToolValidation(_)));
    }
}
