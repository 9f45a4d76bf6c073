use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, COOKIE};
use serde_json::Value;
use tracing::trace;

use super::error::{HarvestError, HarvestResult};
use crate::config::ClientSection;
use crate::json_tree;

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// Final URL after redirects.
    pub url: String,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> HarvestResult<Value> {
        json_tree::decode(&self.body)
    }
}

/// HTTP seam between the engine and the network. Status codes are returned as-is;
/// [`check_status`] decides what they mean.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> HarvestResult<HttpResponse>;

    /// POST with `params` carried in the query string and an empty body.
    async fn post_params(&self, url: &str, params: &[(String, String)])
        -> HarvestResult<HttpResponse>;

    async fn post_json(
        &self,
        url: &str,
        query: &[(String, String)],
        body: &Value,
    ) -> HarvestResult<HttpResponse>;
}

/// Maps non-success statuses onto the error taxonomy.
pub fn check_status(response: HttpResponse) -> HarvestResult<HttpResponse> {
    match response.status {
        200..=299 => Ok(response),
        404 | 410 => Err(HarvestError::NotFound(response.url)),
        429 => Err(HarvestError::RateLimited(response.url)),
        500..=599 => Err(HarvestError::Network(format!(
            "server error {} from {}",
            response.status, response.url
        ))),
        status => Err(HarvestError::HttpStatus {
            status,
            url: response.url,
        }),
    }
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &ClientSection) -> HarvestResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("CONSENT=YES+cb"));
        if let Some(language) = &config.accept_language {
            let value = HeaderValue::from_str(language).map_err(|err| {
                HarvestError::Unexpected(format!("invalid accept-language header: {err}"))
            })?;
            headers.insert(ACCEPT_LANGUAGE, value);
        }
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;
        Ok(Self { client })
    }

    async fn read(response: reqwest::Response) -> HarvestResult<HttpResponse> {
        let status = response.status().as_u16();
        let url = response.url().to_string();
        let body = response.text().await?;
        trace!(status, url = %url, bytes = body.len(), "response received");
        Ok(HttpResponse { status, url, body })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str) -> HarvestResult<HttpResponse> {
        let response = self.client.get(url).send().await?;
        Self::read(response).await
    }

    async fn post_params(
        &self,
        url: &str,
        params: &[(String, String)],
    ) -> HarvestResult<HttpResponse> {
        let response = self.client.post(url).query(params).send().await?;
        Self::read(response).await
    }

    async fn post_json(
        &self,
        url: &str,
        query: &[(String, String)],
        body: &Value,
    ) -> HarvestResult<HttpResponse> {
        let response = self
            .client
            .post(url)
            .query(query)
            .json(body)
            .send()
            .await?;
        Self::read(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16) -> HttpResponse {
        HttpResponse {
            status,
            url: "https://www.youtube.com/watch?v=abcdefghijk".into(),
            body: String::new(),
        }
    }

    #[test]
    fn statuses_map_onto_taxonomy() {
        assert!(check_status(response(200)).is_ok());
        assert!(matches!(
            check_status(response(404)),
            Err(HarvestError::NotFound(_))
        ));
        assert!(matches!(
            check_status(response(429)),
            Err(HarvestError::RateLimited(_))
        ));
        assert!(check_status(response(503)).unwrap_err().is_transient());
        assert!(matches!(
            check_status(response(403)),
            Err(HarvestError::HttpStatus { status: 403, .. })
        ));
    }
}
