//! HTTP client for the legacy source's row export API.
//!
//! `GET {base}/tables/{table}/rows[?modified_since=<rfc3339>]` returns a JSON
//! array of flat row objects.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde_json::Value;
use syncbridge_core::record::LegacyRecord;
use syncbridge_core::types::Timestamp;

use super::LegacySource;
use crate::error::ExtractionError;

/// Reads legacy rows over HTTP with optional bearer authentication.
#[cfg_attr(test, derive(Debug))]
pub struct HttpLegacySource {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpLegacySource {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ExtractionError> {
        let base_url = Url::parse(base_url).map_err(|e| {
            ExtractionError::Connectivity(format!("Invalid legacy API URL '{base_url}': {e}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ExtractionError::Connectivity(format!(
                "Legacy API URL '{base_url}' cannot be a base URL"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExtractionError::Connectivity(e.to_string()))?;
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// Row export URL for `table`, with the table name percent-encoded as a
    /// single path segment.
    pub fn rows_url(
        &self,
        table: &str,
        modified_since: Option<Timestamp>,
    ) -> Result<Url, ExtractionError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ExtractionError::Connectivity("Legacy API URL cannot be a base URL".to_string())
            })?
            .pop_if_empty()
            .extend(["tables", table, "rows"]);
        if let Some(since) = modified_since {
            url.query_pairs_mut()
                .append_pair("modified_since", &since.to_rfc3339());
        }
        Ok(url)
    }
}

#[async_trait]
impl LegacySource for HttpLegacySource {
    async fn fetch(
        &self,
        table: &str,
        modified_since: Option<Timestamp>,
    ) -> Result<Vec<LegacyRecord>, ExtractionError> {
        let url = self.rows_url(table, modified_since)?;
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(classify_request_error)?;
        match response.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ExtractionError::Authentication(format!(
                    "Legacy API returned HTTP {}",
                    response.status().as_u16()
                )));
            }
            StatusCode::NOT_FOUND => return Err(ExtractionError::UnknownTable(table.to_string())),
            status if status.is_server_error() => {
                return Err(ExtractionError::Connectivity(format!(
                    "Legacy API returned HTTP {}",
                    status.as_u16()
                )));
            }
            status => {
                return Err(ExtractionError::Malformed(format!(
                    "Unexpected HTTP {} from legacy API",
                    status.as_u16()
                )));
            }
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ExtractionError::Malformed(format!("Response is not JSON: {e}")))?;
        parse_rows(body)
    }
}

fn classify_request_error(err: reqwest::Error) -> ExtractionError {
    if err.is_timeout() {
        ExtractionError::Connectivity(format!("Request timed out: {err}"))
    } else {
        ExtractionError::Connectivity(err.to_string())
    }
}

/// Convert a row export response body into legacy records.
///
/// The body must be an array whose elements are all objects.
pub fn parse_rows(body: Value) -> Result<Vec<LegacyRecord>, ExtractionError> {
    let Value::Array(rows) = body else {
        return Err(ExtractionError::Malformed(
            "Expected a JSON array of rows".to_string(),
        ));
    };
    rows.into_iter()
        .enumerate()
        .map(|(index, row)| match row {
            Value::Object(record) => Ok(record),
            _ => Err(ExtractionError::Malformed(format!(
                "Row {index} is not a JSON object"
            ))),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
