use std::collections::HashMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, COOKIE};
use serde_json::{json, Value};

use crate::config::UpstreamConfig;
use crate::error::{AppError, Context, Result};

/// Replace every `${NAME}` in `value` with the environment variable `NAME`.
pub fn expand_env_vars(value: &str) -> Result<String> {
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut name = String::new();
            let mut closed = false;
            for next in chars.by_ref() {
                if next == '}' {
                    closed = true;
                    break;
                }
                name.push(next);
            }

            if !closed {
                return Err(AppError::config(format!(
                    "unterminated environment placeholder `${{{name}`"
                )));
            }
            if name.is_empty() {
                return Err(AppError::config("empty environment placeholder `${}`"));
            }

            let value = std::env::var(&name).map_err(|_| {
                AppError::config(format!(
                    "environment variable {name} required by the upstream config is not set"
                ))
            })?;
            result.push_str(&value);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

/// Resolve configured headers and cookie templates into a ready header map.
pub fn build_headers(upstream: &UpstreamConfig) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    map.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    for (key, value) in &upstream.headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .with_context(|| format!("Invalid header name: {}", key))?;
        let expanded = expand_env_vars(value)?;
        let header_value = HeaderValue::from_str(&expanded)
            .with_context(|| format!("Invalid header value for {}", key))?;
        map.insert(name, header_value);
    }

    if let Some(cookie) = cookie_header(&upstream.cookies)? {
        let value = HeaderValue::from_str(&cookie).context("Invalid cookie header value")?;
        map.insert(COOKIE, value);
    }

    Ok(map)
}

/// `name=value` pairs joined with `; `, sorted by name for a stable header.
fn cookie_header(cookies: &HashMap<String, String>) -> Result<Option<String>> {
    if cookies.is_empty() {
        return Ok(None);
    }
    let mut names: Vec<&String> = cookies.keys().collect();
    names.sort();

    let mut parts = Vec::with_capacity(names.len());
    for name in names {
        parts.push(format!("{}={}", name, expand_env_vars(&cookies[name])?));
    }
    Ok(Some(parts.join("; ")))
}

/// Body of an exchange search for online sellers, cheapest first.
pub fn exchange_payload(have: &str, want: &str) -> Value {
    json!({
        "query": {
            "status": {"option": "online"},
            "have": [have],
            "want": [want],
        },
        "sort": {"have": "asc"},
    })
}
