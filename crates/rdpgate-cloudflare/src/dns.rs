//! Zone records through the Cloudflare v4 REST API

use std::time::Duration;

use async_trait::async_trait;
use rdpgate_session::{DnsProvider, DnsRecord, ProviderError, Removal};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::CloudflareError;

pub const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Cloudflare's "automatic" TTL
const AUTO_TTL: u32 = 1;

/// API error code for "Record does not exist"
const RECORD_MISSING_CODE: &str = "81044";

#[derive(Serialize)]
struct CreateRecord<'a> {
    #[serde(rename = "type")]
    record_type: &'static str,
    name: &'a str,
    content: &'a str,
    proxied: bool,
    ttl: u32,
    comment: &'static str,
}

#[derive(Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Deserialize)]
struct ApiMessage {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct RecordBody {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    content: String,
}

impl From<RecordBody> for DnsRecord {
    fn from(body: RecordBody) -> Self {
        DnsRecord {
            id: body.id,
            name: body.name,
            content: body.content,
        }
    }
}

/// DNS records of one zone
pub struct CloudflareDns {
    client: Client,
    api_base: String,
    api_token: String,
    zone_id: String,
}

impl CloudflareDns {
    pub fn new(api_token: impl Into<String>, zone_id: impl Into<String>) -> Result<Self, CloudflareError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            api_token: api_token.into(),
            zone_id: zone_id.into(),
        })
    }

    /// Point the client at another API root
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn records_url(&self) -> String {
        format!("{}/zones/{}/dns_records", self.api_base, self.zone_id)
    }

    async fn create_record(&self, name: &str, target: &str) -> Result<DnsRecord, CloudflareError> {
        let body = CreateRecord {
            record_type: "CNAME",
            name,
            content: target,
            proxied: true,
            ttl: AUTO_TTL,
            comment: "rdpgate session",
        };
        let response = self
            .client
            .post(self.records_url())
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await?;

        let record: RecordBody = unwrap_envelope(response).await?;
        Ok(record.into())
    }

    async fn list_records(&self, name: &str) -> Result<Vec<DnsRecord>, CloudflareError> {
        let response = self
            .client
            .get(self.records_url())
            .bearer_auth(&self.api_token)
            .query(&[("name", name), ("per_page", "100")])
            .send()
            .await?;

        let records: Vec<RecordBody> = unwrap_envelope(response).await?;
        Ok(records
            .into_iter()
            .map(DnsRecord::from)
            .filter(|r| r.name.is_empty() || r.name.eq_ignore_ascii_case(name))
            .collect())
    }

    async fn delete_record(&self, record_id: &str) -> Result<(), CloudflareError> {
        let response = self
            .client
            .delete(format!("{}/{}", self.records_url(), record_id))
            .bearer_auth(&self.api_token)
            .send()
            .await?;

        let _: serde_json::Value = unwrap_envelope(response).await?;
        Ok(())
    }
}

/// Unwrap `{success, errors, result}`, turning failures into [`CloudflareError::Api`]
async fn unwrap_envelope<T: DeserializeOwned>(response: Response) -> Result<T, CloudflareError> {
    let status = response.status();
    let text = response.text().await?;
    debug!("Cloudflare API {}: {}", status, text);

    let envelope: Envelope<T> = match serde_json::from_str(&text) {
        Ok(envelope) => envelope,
        Err(_) if !status.is_success() => {
            return Err(CloudflareError::Api {
                status: status.as_u16(),
                message: text.trim().to_string(),
            })
        }
        Err(e) => return Err(CloudflareError::Parse(e.to_string())),
    };

    if !status.is_success() || !envelope.success {
        let message = envelope
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.code, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        let status = if status.is_success() {
            StatusCode::BAD_REQUEST
        } else {
            status
        };
        return Err(CloudflareError::Api {
            status: status.as_u16(),
            message,
        });
    }

    envelope
        .result
        .ok_or_else(|| CloudflareError::Parse("missing result".to_string()))
}

#[async_trait]
impl DnsProvider for CloudflareDns {
    async fn create_cname(&self, name: &str, target: &str) -> Result<DnsRecord, ProviderError> {
        let record = self.create_record(name, target).await?;
        info!("Created CNAME {} -> {} ({})", name, target, record.id);
        Ok(record)
    }

    async fn list(&self, name: &str) -> Result<Vec<DnsRecord>, ProviderError> {
        Ok(self.list_records(name).await?)
    }

    async fn delete(&self, record_id: &str) -> Result<Removal, ProviderError> {
        match self.delete_record(record_id).await {
            Ok(()) => Ok(Removal::Removed),
            Err(CloudflareError::Api { status: 404, .. }) => Ok(Removal::AlreadyAbsent),
            Err(CloudflareError::Api { ref message, .. })
                if message.starts_with(RECORD_MISSING_CODE) =>
            {
                Ok(Removal::AlreadyAbsent)
            }
            Err(e) => Err(e.into()),
        }
    }
}
