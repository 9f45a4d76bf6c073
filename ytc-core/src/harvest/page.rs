use std::sync::Arc;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::ClientSection;

use super::error::{HarvestError, HarvestResult};
use super::retry::RetryPolicy;
use super::transport::{check_status, Transport};

const YT_CFG_RE: &str = r"ytcfg\.set\s*\(\s*(\{.+?\})\s*\)\s*;";
const YT_INITIAL_DATA_RE: &str = r#"(?:window\s*\[\s*["']ytInitialData["']\s*\]|ytInitialData)\s*=\s*(\{.+?\})\s*;\s*(?:var\s+meta|</script|\n)"#;
/// Consent form fields; attribute order around the name/value pair varies.
const HIDDEN_INPUT_RE: &str = r#"name="([A-Za-z0-9_]+)"\s+value="([^"]*)""#;

/// Pulls the inline script-assigned JSON blocks out of a served page without
/// parsing the document itself.
#[derive(Debug, Clone)]
pub struct PageExtractor {
    client_config: Regex,
    initial_data: Regex,
    hidden_input: Regex,
}

impl Default for PageExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl PageExtractor {
    pub fn new() -> Self {
        Self {
            client_config: Regex::new(YT_CFG_RE).expect("valid regex"),
            initial_data: Regex::new(YT_INITIAL_DATA_RE).expect("valid regex"),
            hidden_input: Regex::new(HIDDEN_INPUT_RE).expect("valid regex"),
        }
    }

    /// Merges every decodable `ytcfg.set({...})` block; later blocks win on conflicts.
    pub fn client_config(&self, html: &str) -> HarvestResult<Value> {
        let mut merged = Map::new();
        for captures in self.client_config.captures_iter(html) {
            let Some(block) = captures.get(1) else {
                continue;
            };
            match serde_json::from_str::<Value>(block.as_str()) {
                Ok(Value::Object(fields)) => merged.extend(fields),
                Ok(_) => {}
                Err(err) => debug!(error = %err, "skipping undecodable ytcfg block"),
            }
        }
        if merged.is_empty() {
            return Err(HarvestError::Parse(
                "client configuration marker (ytcfg.set) not found".to_string(),
            ));
        }
        Ok(Value::Object(merged))
    }

    pub fn initial_data(&self, html: &str) -> HarvestResult<Value> {
        let block = self
            .initial_data
            .captures(html)
            .and_then(|captures| captures.get(1))
            .ok_or_else(|| {
                HarvestError::Parse("page data marker (ytInitialData) not found".to_string())
            })?;
        serde_json::from_str(block.as_str())
            .map_err(|err| HarvestError::Parse(format!("undecodable ytInitialData: {err}")))
    }

    pub fn hidden_inputs(&self, html: &str) -> Vec<(String, String)> {
        self.hidden_input
            .captures_iter(html)
            .map(|captures| (captures[1].to_string(), captures[2].to_string()))
            .collect()
    }
}

/// Fetches pages, retrying transient failures and passing the consent
/// interstitial when the platform redirects to it.
#[derive(Clone)]
pub struct PageFetcher {
    transport: Arc<dyn Transport>,
    client: ClientSection,
    retry: RetryPolicy,
    extractor: PageExtractor,
}

impl PageFetcher {
    pub fn new(transport: Arc<dyn Transport>, client: ClientSection, retry: RetryPolicy) -> Self {
        Self {
            transport,
            client,
            retry,
            extractor: PageExtractor::new(),
        }
    }

    pub fn extractor(&self) -> &PageExtractor {
        &self.extractor
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn base_url(&self) -> &str {
        &self.client.base_url
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub async fn fetch(&self, url: &str) -> HarvestResult<String> {
        let transport = self.transport.as_ref();
        let response = self
            .retry
            .run("page", |_| async move { check_status(transport.get(url).await?) })
            .await?
            .result;

        if !response.url.contains("consent") {
            return Ok(response.body);
        }

        debug!(url = %url, "consent interstitial encountered");
        let mut params = self.extractor.hidden_inputs(&response.body);
        params.push(("continue".to_string(), url.to_string()));
        params.push(("set_eom".to_string(), "false".to_string()));
        params.push(("set_ytc".to_string(), "true".to_string()));
        params.push(("set_apyt".to_string(), "true".to_string()));
        let consent_url = self.client.consent_url.as_str();
        let params = params.as_slice();
        let accepted = self
            .retry
            .run("consent", |_| async move {
                check_status(transport.post_params(consent_url, params).await?)
            })
            .await?
            .result;
        Ok(accepted.body)
    }
}
