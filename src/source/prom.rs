//! Prometheus HTTP API client.
//!
//! Executes instant queries against `/api/v1/query` with a bounded request
//! timeout. This is the only blocking network call in the program; the
//! refresh loop tolerates its failures.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use super::{FetchError, MetricsSource, Sample};

/// Client for a Prometheus-compatible query endpoint.
pub struct PromClient {
    endpoint: String,
    client: reqwest::blocking::Client,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Option<ApiData>,
}

#[derive(Debug, Deserialize)]
struct ApiData {
    #[serde(default)]
    result: Vec<ApiSeries>,
}

#[derive(Debug, Deserialize)]
struct ApiSeries {
    #[serde(default)]
    metric: HashMap<String, String>,
    /// Instant-vector value: `[unix_seconds, "value"]`.
    value: (f64, String),
}

impl PromClient {
    /// Creates a client for `base_url` with a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Http(e.to_string()))?;
        Ok(PromClient {
            endpoint: format!("{}/api/v1/query", base_url.trim_end_matches('/')),
            client,
        })
    }
}

impl MetricsSource for PromClient {
    fn query(&self, query: &str) -> Result<Vec<Sample>, FetchError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("query", query)])
            .send()
            .map_err(|e| FetchError::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| FetchError::Http(e.to_string()))?;

        let body: ApiResponse = response
            .json()
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        samples_from_response(body)
    }
}

fn samples_from_response(body: ApiResponse) -> Result<Vec<Sample>, FetchError> {
    if body.status != "success" {
        return Err(FetchError::Backend(
            body.error.unwrap_or_else(|| body.status.clone()),
        ));
    }

    let result = body.data.map(|d| d.result).unwrap_or_default();
    Ok(result
        .into_iter()
        .map(|series| Sample {
            labels: series.metric,
            value: series.value.1,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_instant_vector() {
        let body: ApiResponse = serde_json::from_str(
            r#"{
              "status": "success",
              "data": {
                "resultType": "vector",
                "result": [
                  {
                    "metric": {"__name__": "pve_cpu_usage_ratio", "id": "100"},
                    "value": [1722945112.789, "0.42"]
                  },
                  {
                    "metric": {"__name__": "pve_cpu_usage_ratio", "id": "101"},
                    "value": [1722945112.789, "0.05"]
                  }
                ]
              }
            }"#,
        )
        .unwrap();

        let samples = samples_from_response(body).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].labels["id"], "100");
        assert_eq!(samples[0].value, "0.42");
    }

    #[test]
    fn test_error_status_is_backend_error() {
        let body: ApiResponse = serde_json::from_str(
            r#"{"status": "error", "error": "query timed out"}"#,
        )
        .unwrap();
        match samples_from_response(body) {
            Err(FetchError::Backend(msg)) => assert_eq!(msg, "query timed out"),
            other => panic!("unexpected: {:?}", other.map(|s| s.len())),
        }
    }

    #[test]
    fn test_empty_result_is_ok() {
        let body: ApiResponse =
            serde_json::from_str(r#"{"status": "success", "data": {"result": []}}"#).unwrap();
        assert!(samples_from_response(body).unwrap().is_empty());
    }
}
