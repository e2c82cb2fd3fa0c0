use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};

use crate::config::UpstreamConfig;
use crate::error::{Context, Result};
use crate::market::PairKey;

use super::request::{build_headers, exchange_payload};

/// One exchange search against the upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeQuery {
    pub market: String,
    pub have: String,
    pub want: String,
}

impl From<&PairKey> for ExchangeQuery {
    fn from(key: &PairKey) -> Self {
        Self {
            market: key.market.clone(),
            have: key.have.clone(),
            want: key.want.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

/// Sends exchange queries upstream. Non-success statuses are responses, not errors.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, query: &ExchangeQuery) -> Result<UpstreamResponse>;
}

pub struct HttpTransport {
    client: Client,
    base_url: String,
    headers: HeaderMap,
}

impl HttpTransport {
    /// Build the client and resolve header templates; a missing `${VAR}` fails here.
    pub fn new(upstream: &UpstreamConfig) -> Result<Self> {
        let headers = build_headers(upstream)?;
        let client = Client::builder()
            .timeout(upstream.timeout())
            .build()
            .context("Failed to construct exchange HTTP client")?;

        Ok(Self {
            client,
            base_url: upstream.base_url.trim_end_matches('/').to_string(),
            headers,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, query: &ExchangeQuery) -> Result<UpstreamResponse> {
        let url = format!("{}/{}", self.base_url, query.market);
        let response = self
            .client
            .post(&url)
            .headers(self.headers.clone())
            .json(&exchange_payload(&query.have, &query.want))
            .send()
            .await
            .with_context(|| {
                format!("Exchange request failed for {}->{}", query.have, query.want)
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read exchange body for {}", url))?;

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}
