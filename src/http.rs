//! HTTP dispatch seam between the engine and the transport.
//!
//! The engine only ever talks to [`HttpDispatcher`]; tests swap
//! in scripted dispatchers, production uses [`ReqwestDispatcher`].

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// What one HTTP round trip produced.
#[derive(Debug, Clone, Default)]
pub struct DispatchResponse {
    pub status_code: u16,
    pub body: String,
    pub headers: HashMap<String, String>,
}

/// One blocking-from-the-engine's-view HTTP round trip. Calls are
/// awaited to completion before the next step runs; any timeout
/// behavior lives behind this seam.
#[async_trait]
pub trait HttpDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        method: &str,
        url: &str,
        headers: &HashMap<String, String>,
        body: Option<&str>,
    ) -> Result<DispatchResponse>;
}

/// Dispatcher backed by a shared `reqwest` client. Requests and
/// accepts JSON content.
#[derive(Debug)]
pub struct ReqwestDispatcher {
    client: Client,
}

impl ReqwestDispatcher {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("failed to build HTTP client");
        Self { client }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpDispatcher for ReqwestDispatcher {
    async fn dispatch(
        &self,
        method: &str,
        url: &str,
        headers: &HashMap<String, String>,
        body: Option<&str>,
    ) -> Result<DispatchResponse> {
        let method = parse_method(method)?;

        let mut builder = self
            .client
            .request(method, url)
            .header("Accept", "application/json");

        for (name, value) in headers {
            builder = builder.header(name, value);
        }

        if let Some(body) = body {
            builder = builder
                .header("Content-Type", "application/json")
                .body(body.to_string());
        }

        debug!("Sending request to {}", url);
        let response = builder
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;
        debug!("Received response with status: {}", response.status());

        let status_code = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    value.to_str().unwrap_or("").to_string(),
                )
            })
            .collect();
        let body = response
            .text()
            .await
            .context("failed to read response body")?;

        Ok(DispatchResponse {
            status_code,
            body,
            headers,
        })
    }
}

fn parse_method(method: &str) -> Result<Method> {
    let method = method.to_ascii_uppercase();
    Ok(match method.as_str() {
        "GET" => Method::GET,
        "POST" => Method::POST,
        "PUT" => Method::PUT,
        "PATCH" => Method::PATCH,
        "DELETE" => Method::DELETE,
        other => bail!("unsupported HTTP method '{other}'"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_methods_parse_case_insensitively() {
        assert_eq!(parse_method("get").unwrap(), Method::GET);
        assert_eq!(parse_method("POST").unwrap(), Method::POST);
        assert_eq!(parse_method("Patch").unwrap(), Method::PATCH);
        assert_eq!(parse_method("delete").unwrap(), Method::DELETE);
        assert_eq!(parse_method("put").unwrap(), Method::PUT);
    }

    #[test]
    fn test_unsupported_method_is_rejected() {
        let err = parse_method("TRACE").unwrap_err();
        assert!(err.to_string().contains("TRACE"));
    }
}
