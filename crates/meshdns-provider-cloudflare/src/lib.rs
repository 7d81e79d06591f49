// # Cloudflare DNS Provider
//
// This crate provides the Cloudflare implementation of `DnsProvider` for meshdns.
//
// ## Behavior
//
// - One HTTP request per trait call; no retries, no caching, no background tasks
// - A records only; listing is paginated (`per_page = 100`)
// - Every failure carries the HTTP status plus Cloudflare error codes/messages
// - Deleting a record Cloudflare no longer knows (code 81044) counts as deleted
// - Creating a record that already exists (code 81057) returns the existing one
// - HTTP timeout taken from `sync.timeout_secs`
//
// ## Security Requirements
//
// - API token NEVER appears in logs or `Debug` output
// - Provider fails fast if token or zone ID is empty
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List DNS Records: GET `/zones/:zone_id/dns_records?type=A&page=N&per_page=100`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Patch DNS Record: PATCH `/zones/:zone_id/dns_records/:record_id`
// - Delete DNS Record: DELETE `/zones/:zone_id/dns_records/:record_id`
// - Zone Details: GET `/zones/:zone_id`

use async_trait::async_trait;
use meshdns_core::config::{ProviderConfig, SyncConfig};
use meshdns_core::registry::PluginRegistry;
use meshdns_core::traits::{DnsProvider, DnsProviderFactory, DnsRecord, NewRecord, RecordPage};
use meshdns_core::{Error, Result};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Records requested per listing page
pub const PER_PAGE: u32 = 100;

/// Cloudflare error code for "Record does not exist"
const RECORD_NOT_FOUND: u32 = 81044;

/// Cloudflare error code for "An identical record already exists"
const RECORD_EXISTS: u32 = 81057;

/// Longest response body quoted in an error message
const MAX_ERROR_BODY: usize = 200;

/// Standard Cloudflare response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: u32,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    page: u32,
    total_pages: u32,
    total_count: u32,
}

#[derive(Debug, Deserialize)]
struct ApiRecord {
    id: String,
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    content: String,
    #[serde(default = "automatic_ttl")]
    ttl: u32,
    #[serde(default)]
    proxied: bool,
}

fn automatic_ttl() -> u32 {
    1
}

impl ApiRecord {
    fn into_record(self) -> std::result::Result<DnsRecord, ApiFailure> {
        let address: IpAddr = self.content.parse().map_err(|_| {
            ApiFailure::Malformed(format!(
                "record {} ({}) has non-address content '{}'",
                self.id, self.name, self.content
            ))
        })?;
        Ok(DnsRecord {
            id: self.id,
            name: self.name,
            address,
            ttl: self.ttl,
            proxied: self.proxied,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ZoneDetails {
    name: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Serialize)]
struct CreateBody<'a> {
    #[serde(rename = "type")]
    record_type: &'static str,
    name: &'a str,
    content: String,
    ttl: u32,
    proxied: bool,
}

#[derive(Debug, Serialize)]
struct PatchBody {
    content: String,
}

/// Why a Cloudflare call failed
///
/// Converted into the core query or mutation error at the trait boundary.
#[derive(Debug, thiserror::Error)]
enum ApiFailure {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}{hint}: {details}")]
    Rejected {
        status: StatusCode,
        hint: &'static str,
        codes: Vec<u32>,
        details: String,
    },

    #[error("unexpected response: {0}")]
    Malformed(String),
}

impl ApiFailure {
    fn rejected(status: StatusCode, errors: &[ApiMessage], body: &str) -> Self {
        let details = if errors.is_empty() {
            let body = body.trim();
            if body.is_empty() {
                status.canonical_reason().unwrap_or("no details").to_string()
            } else {
                body.chars().take(MAX_ERROR_BODY).collect()
            }
        } else {
            errors
                .iter()
                .map(|e| format!("code {}: {}", e.code, e.message))
                .collect::<Vec<_>>()
                .join("; ")
        };

        let hint = match status.as_u16() {
            401 | 403 => " (authentication failed, check the API token permissions)",
            404 => " (not found)",
            429 => " (rate limited)",
            500..=599 => " (Cloudflare server error)",
            _ => "",
        };

        ApiFailure::Rejected {
            status,
            hint,
            codes: errors.iter().map(|e| e.code).collect(),
            details,
        }
    }

    fn has_code(&self, code: u32) -> bool {
        matches!(self, ApiFailure::Rejected { codes, .. } if codes.contains(&code))
    }
}

fn query_error(failure: ApiFailure) -> Error {
    Error::provider_query("cloudflare", failure.to_string())
}

fn mutation_error(failure: ApiFailure) -> Error {
    Error::provider_mutation("cloudflare", failure.to_string())
}

/// Cloudflare DNS provider
///
/// Isolated, stateless, single-shot. Planning and scheduling are owned by
/// the engine.
///
/// # Security
///
/// The Debug implementation does NOT expose the API token.
pub struct CloudflareProvider {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// Zone holding the managed records
    zone_id: String,

    /// API base URL (overridable for tests and proxies)
    api_base: String,

    /// HTTP client for API requests
    client: reqwest::Client,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .field("zone_id", &self.zone_id)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider
    ///
    /// # Parameters
    ///
    /// - `api_token`: Cloudflare API token with Zone:DNS:Edit permissions
    /// - `zone_id`: Zone holding the managed records
    /// - `timeout`: HTTP timeout for every request
    ///
    /// # Errors
    ///
    /// `Error::Validation` if token or zone ID is empty.
    pub fn new(
        api_token: impl Into<String>,
        zone_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_token = api_token.into();
        let zone_id = zone_id.into();

        if api_token.is_empty() {
            return Err(Error::validation("Cloudflare API token cannot be empty"));
        }
        if zone_id.is_empty() {
            return Err(Error::validation("Cloudflare zone ID cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Other(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_token,
            zone_id,
            api_base: CLOUDFLARE_API_BASE.to_string(),
            client,
        })
    }

    /// Point the provider at another API base URL
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn records_url(&self) -> String {
        format!("{}/zones/{}/dns_records", self.api_base, self.zone_id)
    }

    fn record_url(&self, record_id: &str) -> String {
        format!("{}/{}", self.records_url(), record_id)
    }

    /// Start an authenticated request
    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        debug!("{} {}", method, url);
        self.client.request(method, url).bearer_auth(&self.api_token)
    }

    /// Look up an existing A record by its full name
    async fn find_record(&self, name: &str) -> std::result::Result<Option<DnsRecord>, ApiFailure> {
        let query = [("type", "A"), ("name", name)];
        let envelope: Envelope<Vec<ApiRecord>> = self
            .send(self.request(Method::GET, &self.records_url()).query(&query))
            .await?;

        match envelope
            .result
            .unwrap_or_default()
            .into_iter()
            .find(|record| record.record_type == "A" && record.name.eq_ignore_ascii_case(name))
        {
            Some(record) => record.into_record().map(Some),
            None => Ok(None),
        }
    }

    /// Send one request and unwrap the Cloudflare envelope
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> std::result::Result<Envelope<T>, ApiFailure> {
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!("Cloudflare answered {}", status);

        let envelope: Envelope<T> = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(ApiFailure::rejected(status, &[], &text));
            }
            Err(e) => {
                return Err(ApiFailure::Malformed(format!("invalid JSON body: {}", e)));
            }
        };

        if !status.is_success() || !envelope.success {
            return Err(ApiFailure::rejected(status, &envelope.errors, &text));
        }
        Ok(envelope)
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    /// List one page of A records
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /zones/:zone_id/dns_records?type=A&page=N&per_page=100
    /// Authorization: Bearer <token>
    /// ```
    async fn list_records(&self, page: u32) -> Result<RecordPage> {
        let query = [
            ("type", "A".to_string()),
            ("page", page.to_string()),
            ("per_page", PER_PAGE.to_string()),
        ];
        let envelope: Envelope<Vec<ApiRecord>> = self
            .send(self.request(Method::GET, &self.records_url()).query(&query))
            .await
            .map_err(query_error)?;

        let raw = envelope.result.ok_or_else(|| {
            query_error(ApiFailure::Malformed("listing without result".to_string()))
        })?;

        let mut records = Vec::with_capacity(raw.len());
        for record in raw {
            if record.record_type != "A" {
                continue;
            }
            records.push(record.into_record().map_err(query_error)?);
        }

        let (page, total_pages, total_count) = match envelope.result_info {
            Some(info) => (info.page, info.total_pages, Some(info.total_count)),
            // no pagination info: a single, complete page
            None => (page, page, None),
        };

        Ok(RecordPage {
            records,
            page,
            total_pages,
            total_count,
        })
    }

    /// Create an A record
    ///
    /// # API Call
    ///
    /// ```http
    /// POST /zones/:zone_id/dns_records
    /// {"type": "A", "name": "...", "content": "100.64.0.1", "ttl": 300, "proxied": false}
    /// ```
    async fn create_record(&self, record: &NewRecord) -> Result<DnsRecord> {
        let body = CreateBody {
            record_type: "A",
            name: &record.name,
            content: record.address.to_string(),
            ttl: record.ttl,
            proxied: record.proxied,
        };
        let result: std::result::Result<Envelope<ApiRecord>, ApiFailure> = self
            .send(self.request(Method::POST, &self.records_url()).json(&body))
            .await;

        let envelope = match result {
            Ok(envelope) => envelope,
            Err(failure) if failure.has_code(RECORD_EXISTS) => {
                return match self.find_record(&record.name).await {
                    Ok(Some(existing)) => {
                        warn!(
                            "DNS record {} already exists as {}, using it",
                            existing.name, existing.id
                        );
                        Ok(existing)
                    }
                    Ok(None) => Err(mutation_error(failure)),
                    Err(lookup) => Err(Error::provider_mutation(
                        "cloudflare",
                        format!("{} (lookup of the existing record failed: {})", failure, lookup),
                    )),
                };
            }
            Err(failure) => return Err(mutation_error(failure)),
        };

        let created = envelope
            .result
            .ok_or_else(|| ApiFailure::Malformed("create without result".to_string()))
            .and_then(ApiRecord::into_record)
            .map_err(mutation_error)?;

        debug!("Cloudflare assigned id {} to {}", created.id, created.name);
        Ok(created)
    }

    /// Change the content of an A record
    ///
    /// # API Call
    ///
    /// ```http
    /// PATCH /zones/:zone_id/dns_records/:record_id
    /// {"content": "100.64.0.2"}
    /// ```
    async fn update_record(&self, record_id: &str, address: IpAddr) -> Result<()> {
        let body = PatchBody {
            content: address.to_string(),
        };
        let _: Envelope<serde_json::Value> = self
            .send(self.request(Method::PATCH, &self.record_url(record_id)).json(&body))
            .await
            .map_err(mutation_error)?;
        Ok(())
    }

    /// Delete a record; a record that is already gone counts as deleted
    async fn delete_record(&self, record_id: &str) -> Result<()> {
        let result: std::result::Result<Envelope<serde_json::Value>, ApiFailure> = self
            .send(self.request(Method::DELETE, &self.record_url(record_id)))
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(failure) if failure.has_code(RECORD_NOT_FOUND) => {
                debug!("Record {} was already deleted", record_id);
                Ok(())
            }
            Err(failure) => Err(mutation_error(failure)),
        }
    }

    /// Check the token can read the zone
    async fn verify(&self) -> Result<()> {
        let url = format!("{}/zones/{}", self.api_base, self.zone_id);
        let envelope: Envelope<ZoneDetails> = self
            .send(self.request(Method::GET, &url))
            .await
            .map_err(query_error)?;

        match envelope.result {
            Some(zone) => {
                info!("Cloudflare zone {} reachable (status: {})", zone.name, zone.status);
                Ok(())
            }
            None => Err(query_error(ApiFailure::Malformed(
                "zone lookup without result".to_string(),
            ))),
        }
    }

    fn provider_name(&self) -> &'static str {
        "cloudflare"
    }
}

/// Factory for creating Cloudflare providers
pub struct CloudflareFactory;

impl DnsProviderFactory for CloudflareFactory {
    fn create(&self, config: &ProviderConfig, sync: &SyncConfig) -> Result<Box<dyn DnsProvider>> {
        match config {
            ProviderConfig::Cloudflare {
                api_token,
                zone_id,
                api_base,
            } => {
                let mut provider =
                    CloudflareProvider::new(api_token.clone(), zone_id.clone(), sync.timeout())?;
                if let Some(base) = api_base {
                    provider = provider.with_api_base(base.clone());
                }
                Ok(Box::new(provider))
            }
            _ => Err(Error::validation("Invalid config for Cloudflare provider")),
        }
    }
}

/// Register the Cloudflare provider with a registry
///
/// # Example
///
/// ```rust
/// use meshdns_core::PluginRegistry;
///
/// let registry = PluginRegistry::new();
/// meshdns_provider_cloudflare::register(&registry);
/// assert!(registry.has_provider("cloudflare"));
/// ```
pub fn register(registry: &PluginRegistry) {
    registry.register_provider("cloudflare", Box::new(CloudflareFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> CloudflareProvider {
        CloudflareProvider::new("secret_token_12345", "zone123", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_factory_creation() {
        let config = ProviderConfig::Cloudflare {
            api_token: "test_token".to_string(),
            zone_id: "test_zone".to_string(),
            api_base: Some("http://127.0.0.1:9".to_string()),
        };

        let provider = CloudflareFactory.create(&config, &SyncConfig::default());
        assert!(provider.is_ok());
    }

    #[test]
    fn test_factory_missing_token() {
        let config = ProviderConfig::Cloudflare {
            api_token: String::new(),
            zone_id: "test_zone".to_string(),
            api_base: None,
        };

        let err = CloudflareFactory
            .create(&config, &SyncConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_factory_rejects_other_configs() {
        let config = ProviderConfig::Custom {
            factory: "route53".to_string(),
            config: serde_json::json!({}),
        };
        assert!(CloudflareFactory.create(&config, &SyncConfig::default()).is_err());
    }

    #[test]
    fn test_api_token_not_exposed_in_debug() {
        let debug_str = format!("{:?}", provider());
        assert!(!debug_str.contains("secret_token"));
        assert!(debug_str.contains("CloudflareProvider"));
        assert!(debug_str.contains("zone123"));
    }

    #[test]
    fn test_urls() {
        let provider = provider().with_api_base("http://localhost:8080/client/v4/");
        assert_eq!(
            provider.records_url(),
            "http://localhost:8080/client/v4/zones/zone123/dns_records"
        );
        assert_eq!(
            provider.record_url("abc"),
            "http://localhost:8080/client/v4/zones/zone123/dns_records/abc"
        );
    }

    #[test]
    fn test_rejection_message_carries_codes() {
        let errors = vec![ApiMessage {
            code: 10000,
            message: "Authentication error".to_string(),
        }];
        let failure = ApiFailure::rejected(StatusCode::FORBIDDEN, &errors, "");
        let text = failure.to_string();

        assert!(text.contains("403"));
        assert!(text.contains("code 10000: Authentication error"));
        assert!(text.contains("API token"));
        assert!(failure.has_code(10000));
        assert!(!failure.has_code(RECORD_NOT_FOUND));
    }

    #[test]
    fn test_rejection_without_envelope_quotes_body() {
        let body = "x".repeat(500);
        let failure = ApiFailure::rejected(StatusCode::BAD_GATEWAY, &[], &body);
        let text = failure.to_string();
        assert!(text.contains("502"));
        assert!(text.contains("server error"));
        assert!(text.len() < 300);
    }

    #[test]
    fn test_non_address_content_is_malformed() {
        let record = ApiRecord {
            id: "1".to_string(),
            name: "a.ts.example.com".to_string(),
            record_type: "A".to_string(),
            content: "not-an-ip".to_string(),
            ttl: 300,
            proxied: false,
        };
        assert!(matches!(record.into_record(), Err(ApiFailure::Malformed(_))));
    }
}
