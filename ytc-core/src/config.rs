use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};
use crate::harvest::SortMode;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/79.0.3945.130 Safari/537.36";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HarvesterConfig {
    pub client: ClientSection,
    pub retry: RetrySection,
    pub fetch: FetchSection,
}

impl HarvesterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.fetch.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "fetch.channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.fetch.limit == Some(0) {
            return Err(ConfigError::Invalid(
                "fetch.limit must be positive when set".to_string(),
            ));
        }
        if self.client.request_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "client.request_timeout_seconds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    pub user_agent: String,
    pub base_url: String,
    pub consent_url: String,
    pub request_timeout_seconds: u64,
    pub accept_language: Option<String>,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            base_url: "https://www.youtube.com".to_string(),
            consent_url: "https://consent.youtube.com/save".to_string(),
            request_timeout_seconds: 30,
            accept_language: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: usize,
    pub schedule_ms: Vec<u64>,
    pub jitter_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            schedule_ms: vec![1_000, 2_000, 4_000, 8_000],
            jitter_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchSection {
    pub sort: SortMode,
    pub language: Option<String>,
    pub limit: Option<usize>,
    pub target_channel_id: Option<String>,
    pub include_replies: bool,
    pub channel_capacity: usize,
    pub page_delay_ms: u64,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            sort: SortMode::Recent,
            language: None,
            limit: None,
            target_channel_id: None,
            include_replies: true,
            channel_capacity: 32,
            page_delay_ms: 100,
        }
    }
}

pub fn load_harvester_config<P: AsRef<Path>>(path: P) -> Result<HarvesterConfig> {
    let config: HarvesterConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_fixture_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/harvester.toml");
        let config = load_harvester_config(path).expect("config should parse");
        assert_eq!(config.client.base_url, "https://www.youtube.com");
        assert_eq!(config.client.request_timeout_seconds, 30);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.fetch.sort, SortMode::Popular);
        assert_eq!(config.fetch.limit, Some(500));
    }

    #[test]
    fn empty_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# nothing here").unwrap();
        let config = load_harvester_config(file.path()).unwrap();
        assert_eq!(config.fetch.sort, SortMode::Recent);
        assert!(config.fetch.include_replies);
        assert_eq!(config.retry.schedule_ms, vec![1_000, 2_000, 4_000, 8_000]);
        assert_eq!(config.client.consent_url, "https://consent.youtube.com/save");
    }

    #[test]
    fn zero_limit_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[fetch]\nlimit = 0").unwrap();
        let err = load_harvester_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unknown_sort_mode_fails_to_parse() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[fetch]\nsort = \"oldest\"").unwrap();
        let err = load_harvester_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
