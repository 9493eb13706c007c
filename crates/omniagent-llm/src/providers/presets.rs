use std::collections::HashMap;

/// Endpoint defaults for an OpenAI-compatible provider.
#[derive(Debug, Clone, Copy)]
pub struct Preset {
    pub name: &'static str,
    pub endpoint: &'static str,
    pub requires_key: bool,
    pub headers: &'static [(&'static str, &'static str)],
}

const PRESETS: &[Preset] = &[
    Preset {
        name: "openai",
        endpoint: "https://api.openai.com/v1/chat/completions",
        requires_key: true,
        headers: &[],
    },
    // Local models served by Ollama's OpenAI-compatible API.
    Preset {
        name: "ollama",
        endpoint: "http://localhost:11434/v1/chat/completions",
        requires_key: false,
        headers: &[],
    },
    Preset {
        name: "openrouter",
        endpoint: "https://openrouter.ai/api/v1/chat/completions",
        requires_key: true,
        headers: &[("X-Title", "OmniAgent")],
    },
];

pub fn preset(provider: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|p| p.name == provider)
}

/// Whether `provider` can be called without an API key.
pub fn is_keyless(provider: &str) -> bool {
    preset(provider).is_some_and(|p| !p.requires_key)
}

/// Preset headers with configured ones layered on top.
pub fn merged_headers(
    preset: Option<&Preset>,
    configured: &HashMap<String, String>,
) -> Vec<(String, String)> {
    let mut merged: HashMap<String, String> = preset
        .map(|p| p.headers)
        .unwrap_or_default()
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    merged.extend(configured.iter().map(|(k, v)| (k.clone(), v.clone())));

    let mut headers: Vec<_> = merged.into_iter().collect();
    headers.sort();
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_is_keyless() {
        assert!(is_keyless("ollama"));
        assert!(!is_keyless("openai"));
        assert!(!is_keyless("gemini"));
        assert!(preset("ollama").unwrap().endpoint.contains("11434"));
    }

    #[test]
    fn test_configured_headers_win() {
        let mut configured = HashMap::new();
        configured.insert("X-Title".to_string(), "Custom".to_string());
        configured.insert("X-Extra".to_string(), "1".to_string());

        let headers = merged_headers(preset("openrouter"), &configured);
        assert_eq!(
            headers,
            vec![
                ("X-Extra".to_string(), "1".to_string()),
                ("X-Title".to_string(), "Custom".to_string()),
            ]
        );
        assert!(merged_headers(None, &HashMap::new()).is_empty());
    }
}
