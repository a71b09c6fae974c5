//! HTTP client for the permit backend.
//!
//! Every endpoint answers with `{ success, data?, stats?, message? }`. Non-2xx
//! statuses and `success: false` both become [`ApiError`] values carrying the
//! backend's message when it sent one.

use std::collections::BTreeMap;
use std::time::Duration;

use permit_desk_core::{ApplicationRecord, PermitDomain};
use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use time::macros::format_description;
use time::Date;
use url::Url;

use crate::config::DeskConfig;
use crate::error::{ApiError, GENERIC_FAILURE_MESSAGE};

const FETCH_SINGLE_ENDPOINT: &str = "fetch_single.php";
const UPDATE_STATUS_ENDPOINT: &str = "update_status.php";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    stats: Option<StatsEnvelope>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatsEnvelope {
    overall: Option<OverallStats>,
}

/// Server-side totals. Counts arrive as numbers or numeric strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct OverallStats {
    #[serde(default, deserialize_with = "count")]
    pub total: u64,
    #[serde(default, deserialize_with = "count")]
    pub approved: u64,
    #[serde(default, deserialize_with = "count")]
    pub pending: u64,
    #[serde(default, deserialize_with = "count")]
    pub rejected: u64,
    #[serde(default, deserialize_with = "count")]
    pub under_review: u64,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

fn count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(number) => Ok(number.as_u64().unwrap_or(0)),
        Value::String(text) => Ok(text.trim().parse().unwrap_or(0)),
        _ => Ok(0),
    }
}

/// Server-side filters for a collection fetch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectionQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub date_from: Option<Date>,
    pub date_to: Option<Date>,
}

impl CollectionQuery {
    fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let date_format = format_description!("[year]-[month]-[day]");
        let date = |value: Option<Date>| value.and_then(|date| date.format(date_format).ok());
        [
            ("search", self.search.clone().filter(|value| !value.trim().is_empty())),
            ("status", self.status.clone().filter(|value| !value.trim().is_empty())),
            ("date_from", date(self.date_from)),
            ("date_to", date(self.date_to)),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key, value)))
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionPage {
    pub records: Vec<ApplicationRecord>,
    pub stats: Option<OverallStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateStatusRequest {
    pub application_id: String,
    pub status: String,
    /// The new comment's text; the backend prepends it to the stored blob.
    pub remarks: String,
    pub updated_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct UpdateStatusData {
    pub status: Option<String>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PermitApiClient {
    http: Client,
    base_url: Url,
}

impl PermitApiClient {
    /// # Errors
    /// Returns [`ApiError::Transport`] when the HTTP client cannot be built.
    pub fn new(base_url: Url, timeout: Option<Duration>) -> Result<Self, ApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self { http: builder.build()?, base_url })
    }

    /// # Errors
    /// Returns [`ApiError::InvalidUrl`] for an unusable base URL, or as [`Self::new`].
    pub fn from_config(config: &DeskConfig) -> Result<Self, ApiError> {
        let base_url = config.base_url().map_err(|err| ApiError::InvalidUrl(err.to_string()))?;
        Self::new(base_url, config.timeout())
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, name: &str) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push(name);
        Ok(url)
    }

    /// `GET <base>/<domain>.php`. Records without an explicit domain are tagged with `domain`.
    ///
    /// # Errors
    /// Returns an [`ApiError`] on transport failure, non-2xx status, `success: false`,
    /// or a body that is not a list of records.
    pub async fn fetch_collection(
        &self,
        domain: PermitDomain,
        query: &CollectionQuery,
    ) -> Result<CollectionPage, ApiError> {
        let url = self.endpoint(&format!("{}.php", domain.as_str()))?;
        tracing::debug!(%url, domain = domain.as_str(), "fetching collection");
        let request = self.http.get(url).query(&query.to_pairs());
        let envelope: Envelope<Vec<ApplicationRecord>> = self.execute(request).await?;

        let mut records = envelope.data.unwrap_or_default();
        for record in records.iter_mut().filter(|record| record.domain.is_none()) {
            record.domain = Some(domain);
        }
        Ok(CollectionPage { records, stats: envelope.stats.and_then(|stats| stats.overall) })
    }

    /// `GET <base>/fetch_single.php?application_id=<id>`.
    ///
    /// # Errors
    /// As [`Self::fetch_collection`], plus [`ApiError::InvalidResponse`] when `data` is absent.
    pub async fn fetch_single(&self, application_id: &str) -> Result<ApplicationRecord, ApiError> {
        let url = self.endpoint(FETCH_SINGLE_ENDPOINT)?;
        tracing::debug!(%url, application_id, "fetching application");
        let request = self.http.get(url).query(&[("application_id", application_id)]);
        let envelope: Envelope<ApplicationRecord> = self.execute(request).await?;
        envelope
            .data
            .ok_or_else(|| ApiError::InvalidResponse("response has no application data".to_string()))
    }

    /// `POST <base>/update_status.php`. `data` in the reply is optional.
    ///
    /// # Errors
    /// As [`Self::fetch_collection`].
    pub async fn update_status(
        &self,
        request: &UpdateStatusRequest,
    ) -> Result<UpdateStatusData, ApiError> {
        let url = self.endpoint(UPDATE_STATUS_ENDPOINT)?;
        tracing::debug!(%url, application_id = %request.application_id, status = %request.status, "updating status");
        let builder = self.http.post(url).json(request);
        let envelope: Envelope<UpdateStatusData> = self.execute(builder).await?;
        Ok(envelope.data.unwrap_or_default())
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Envelope<T>, ApiError> {
        let response = request.header(header::ACCEPT, "application/json").send().await?;
        let status = response.status();
        let body = response.text().await?;

        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            let message = backend_message(&body).unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string());
            tracing::warn!(status = status.as_u16(), bytes = body.len(), "permit backend returned an error status");
            return Err(ApiError::Http { status: status.as_u16(), message });
        }

        let envelope: Envelope<T> = serde_json::from_str(&body)
            .map_err(|err| ApiError::InvalidResponse(err.to_string()))?;
        if !envelope.success {
            let message = envelope
                .message
                .filter(|message| !message.trim().is_empty())
                .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string());
            tracing::warn!(%message, "permit backend reported failure");
            return Err(ApiError::Backend(message));
        }
        Ok(envelope)
    }
}

fn backend_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

    #[test]
    fn stats_counts_accept_numeric_strings() {
        let stats: OverallStats = match serde_json::from_str(
            r#"{"total":"12","approved":4,"pending":"5","rejected":null,"this_month":"3"}"#,
        ) {
            Ok(stats) => stats,
            Err(err) => panic!("stats should parse: {err}"),
        };
        assert_eq!(stats.total, 12);
        assert_eq!(stats.approved, 4);
        assert_eq!(stats.pending, 5);
        assert_eq!(stats.rejected, 0);
        assert_eq!(stats.under_review, 0);
        assert_eq!(stats.other.get("this_month"), Some(&Value::String("3".to_string())));
    }

    #[test]
    fn query_pairs_skip_blank_filters() {
        let query = CollectionQuery {
            search: Some("  ".to_string()),
            status: Some("approved".to_string()),
            date_from: Some(date!(2024 - 01 - 05)),
            date_to: None,
        };
        assert_eq!(
            query.to_pairs(),
            vec![("status", "approved".to_string()), ("date_from", "2024-01-05".to_string())]
        );
    }

    #[test]
    fn endpoints_extend_the_base_path() {
        let client = match Url::parse("https://permits.example.gov/api/")
            .map_err(|err| ApiError::InvalidUrl(err.to_string()))
            .and_then(|base| PermitApiClient::new(base, None))
        {
            Ok(client) => client,
            Err(err) => panic!("client should build: {err}"),
        };
        let url = match client.endpoint("franchise.php") {
            Ok(url) => url,
            Err(err) => panic!("endpoint should resolve: {err}"),
        };
        assert_eq!(url.as_str(), "https://permits.example.gov/api/franchise.php");
    }
}
