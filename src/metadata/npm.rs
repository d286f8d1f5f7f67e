//! Fetch package documents from an npm-compatible registry

use super::RegistryClient;
use crate::config::NetworkConfig;
use crate::error::{AuditError, Result};
use crate::types::PackageMetadata;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

// Abbreviated documents omit the `time` map
const ACCEPT: &str = "application/json";

/// The subset of a packument the evaluators need
#[derive(Debug, Deserialize)]
struct Packument {
    #[serde(rename = "dist-tags", default)]
    dist_tags: HashMap<String, String>,
    #[serde(default)]
    time: HashMap<String, String>,
    #[serde(default)]
    versions: HashMap<String, serde_json::Value>,
}

/// Error body returned by the registry on failure
#[derive(Debug, Deserialize)]
struct RegistryErrorBody {
    code: Option<String>,
    error: Option<String>,
}

/// Registry client over HTTP
pub struct NpmRegistryClient {
    client: Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl NpmRegistryClient {
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
        })
    }
}

#[async_trait]
impl RegistryClient for NpmRegistryClient {
    async fn fetch(&self, url: &str) -> Result<PackageMetadata> {
        debug!("Fetching registry document {}", url);

        let response = retry_request(&self.client, url, self.max_retries, self.retry_delay).await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let parsed = serde_json::from_str::<RegistryErrorBody>(&body).ok();
            let code = parsed
                .as_ref()
                .and_then(|b| b.code.clone())
                .unwrap_or_else(|| {
                    if status == StatusCode::NOT_FOUND {
                        "E404".to_string()
                    } else {
                        format!("E{}", status.as_u16())
                    }
                });
            let message = parsed
                .and_then(|b| b.error)
                .unwrap_or_else(|| format!("HTTP {}", status));
            return Err(AuditError::fetch(url, Some(code), message));
        }

        let packument: Packument = response.json().await.map_err(|e| {
            AuditError::parse(format!("{}: {}", url, e))
        })?;
        into_metadata(url, packument)
    }
}

fn into_metadata(url: &str, packument: Packument) -> Result<PackageMetadata> {
    let dist_tags_latest = packument
        .dist_tags
        .get("latest")
        .cloned()
        .ok_or_else(|| AuditError::parse(format!("{} has no latest dist-tag", url)))?;

    let mut publish_time_by_version = BTreeMap::new();
    for (version, time) in packument.time {
        if version == "created" || version == "modified" {
            continue;
        }
        publish_time_by_version.insert(version, parse_datetime(&time)?);
    }

    let mut version_list: Vec<String> = packument.versions.into_keys().collect();
    version_list.sort();

    Ok(PackageMetadata {
        dist_tags_latest,
        publish_time_by_version,
        version_list,
    })
}

/// Build HTTP client with proper configuration
fn build_client(config: &NetworkConfig) -> Result<Client> {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        reqwest::header::ACCEPT,
        reqwest::header::HeaderValue::from_static(ACCEPT),
    );
    Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .timeout(config.timeout())
        .build()
        .map_err(AuditError::from)
}

/// Retry a request with exponential backoff
async fn retry_request(
    client: &Client,
    url: &str,
    max_retries: u32,
    base_delay: Duration,
) -> Result<reqwest::Response> {
    let mut attempts = 0;
    let mut delay = base_delay;

    loop {
        match client.get(url).send().await {
            Ok(response) => {
                if response.status() == StatusCode::TOO_MANY_REQUESTS && attempts < max_retries {
                    warn!("Rate limited by registry, retrying after {:?}", delay);
                    tokio::time::sleep(delay).await;
                    attempts += 1;
                    delay *= 2;
                    continue;
                }
                return Ok(response);
            }
            Err(e) => {
                if attempts >= max_retries {
                    return Err(AuditError::fetch(url, None, format!("request failed: {}", e)));
                }
                warn!("Request failed, retrying: {}", e);
                tokio::time::sleep(delay).await;
                attempts += 1;
                delay *= 2;
            }
        }
    }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AuditError::parse(format!("Invalid datetime '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> NpmRegistryClient {
        let config = NetworkConfig {
            max_retries: 0,
            retry_delay_ms: 1,
            ..Default::default()
        };
        NpmRegistryClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_packument() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/rsvp")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "name": "rsvp",
                    "dist-tags": { "latest": "4.8.5", "beta": "5.0.0-beta.1" },
                    "time": {
                        "created": "2013-01-01T00:00:00.000Z",
                        "modified": "2021-01-01T00:00:00.000Z",
                        "4.8.4": "2018-10-01T12:00:00.000Z",
                        "4.8.5": "2019-05-02T08:30:00.000Z"
                    },
                    "versions": { "4.8.4": {}, "4.8.5": {} }
                }"#,
            )
            .create_async()
            .await;

        let metadata = client()
            .fetch(&format!("{}/rsvp", server.url()))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(metadata.dist_tags_latest, "4.8.5");
        assert_eq!(metadata.version_list, vec!["4.8.4", "4.8.5"]);
        assert_eq!(metadata.publish_time_by_version.len(), 2);
        assert!(!metadata.publish_time_by_version.contains_key("created"));
        assert_eq!(
            metadata.publish_time_by_version["4.8.5"].to_rfc3339(),
            "2019-05-02T08:30:00+00:00"
        );
    }

    #[tokio::test]
    async fn test_not_found_carries_code() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/does-not-exist")
            .with_status(404)
            .with_body(r#"{"error":"Not found"}"#)
            .create_async()
            .await;

        let err = client()
            .fetch(&format!("{}/does-not-exist", server.url()))
            .await
            .unwrap_err();

        assert_eq!(err.code(), Some("E404"));
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("Not found"));
    }

    #[tokio::test]
    async fn test_server_error_carries_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/flaky")
            .with_status(503)
            .create_async()
            .await;

        let err = client()
            .fetch(&format!("{}/flaky", server.url()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("E503"));
    }

    #[tokio::test]
    async fn test_missing_latest_is_parse_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/untagged")
            .with_status(200)
            .with_body(r#"{"versions": {"1.0.0": {}}}"#)
            .create_async()
            .await;

        let err = client()
            .fetch(&format!("{}/untagged", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::MetadataParse(_)));
    }
}
