//! Pooled HTTP client wrapper for JSON/HTML source adapters (C3).
//!
//! One [`HttpClient`] is created per source adapter and reused for every
//! request it issues, so the underlying `reqwest::Client` connection
//! pool is shared across the adapter's lifetime. Unlike a file-download
//! client, this one returns response bodies as `String`/`Vec<u8>`/typed
//! JSON rather than streaming to disk — sources here are API/HTML
//! payloads, not large binary files.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::header::{CONTENT_TYPE, HeaderMap, RETRY_AFTER};
use reqwest::{Client, ClientBuilder, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::config::HttpClientConfig;

use super::error::DownloadError;

/// A fully-buffered HTTP response, returned by [`HttpClient::get`] and
/// [`HttpClient::post`] without converting a non-2xx status into an
/// error — callers inspect [`HttpResponse::is_success`] and its sibling
/// predicates themselves, the way a rate-limit-aware caller needs to
/// distinguish "retry" (429/5xx) from "give up" (other 4xx) statuses.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub url: String,
    pub content: Vec<u8>,
    pub content_type: Option<String>,
}

impl HttpResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }

    #[must_use]
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    #[must_use]
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// The raw `Retry-After` header value, present on some 429/503 responses.
    #[must_use]
    pub fn retry_after(&self) -> Option<String> {
        self.headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(std::string::ToString::to_string)
    }

    /// Decodes the body as UTF-8 text, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }

    /// Deserializes the body as JSON.
    ///
    /// # Errors
    /// Returns [`DownloadError::Json`] if the body isn't valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, DownloadError> {
        serde_json::from_slice(&self.content).map_err(|e| DownloadError::json(&self.url, e))
    }
}

/// Pooled HTTP client for one source adapter.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Builds a client from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying `reqwest` client fails to build.
    #[instrument(skip(config))]
    pub fn new(config: &HttpClientConfig) -> Result<Self, DownloadError> {
        let mut builder = base_client_builder(config);
        if config.enable_cookies {
            let jar = Arc::new(Jar::default());
            builder = builder.cookie_provider(jar);
        }
        let client = builder
            .build()
            .map_err(|e| DownloadError::network("<client-build>", e))?;
        Ok(Self { client })
    }

    /// Issues a GET request and deserializes the JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] on network failure, non-2xx status, or
    /// JSON decode failure.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, DownloadError> {
        let response = self.send_get(url).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| DownloadError::decode(url, e))
    }

    /// Issues a GET request and returns the response body as text (used
    /// for HTML reports).
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] on network failure, non-2xx status, or
    /// a body that cannot be decoded as text.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get_text(&self, url: &str) -> Result<String, DownloadError> {
        let response = self.send_get(url).await?;
        response
            .text()
            .await
            .map_err(|e| DownloadError::decode(url, e))
    }

    /// Issues a GET request and returns the raw response bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] on network failure or non-2xx status.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let response = self.send_get(url).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| DownloadError::decode(url, e))?;
        Ok(bytes.to_vec())
    }

    /// Issues a lightweight GET against `health_check_url` and returns
    /// whether the source responded with a 2xx status.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn health_check(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(error) => {
                debug!(error = %error, "health check request failed");
                false
            }
        }
    }

    /// Issues a GET request and returns the fully-buffered response,
    /// whatever its status — callers decide what a non-2xx status means.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] on network failure or an invalid URL.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get(&self, url: &str) -> Result<HttpResponse, DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        self.execute(self.client.get(url), url).await
    }

    /// Issues a POST request with an optional JSON or form body and
    /// returns the fully-buffered response, whatever its status.
    ///
    /// `json` and `data` are mutually exclusive; if both are supplied the
    /// JSON body wins. `headers`/`timeout` override the client's defaults
    /// for this request only.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] on network failure or an invalid URL.
    #[instrument(skip(self, json, data, headers), fields(url = %url))]
    pub async fn post(
        &self,
        url: &str,
        json: Option<Value>,
        data: Option<HashMap<String, String>>,
        headers: Option<HeaderMap>,
        timeout: Option<Duration>,
    ) -> Result<HttpResponse, DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let mut request = self.client.post(url);
        if let Some(body) = json {
            request = request.json(&body);
        } else if let Some(form) = data {
            request = request.form(&form);
        }
        if let Some(headers) = headers {
            request = request.headers(headers);
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        self.execute(request, url).await
    }

    async fn execute(&self, request: RequestBuilder, url: &str) -> Result<HttpResponse, DownloadError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url)
            } else {
                DownloadError::network(url, e)
            }
        })?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(std::string::ToString::to_string);
        let content = response
            .bytes()
            .await
            .map_err(|e| DownloadError::decode(url, e))?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            url: url.to_string(),
            content,
            content_type,
        })
    }

    async fn send_get(&self, url: &str) -> Result<reqwest::Response, DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url)
            } else {
                DownloadError::network(url, e)
            }
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(std::string::ToString::to_string);
            return Err(DownloadError::http_status_with_retry_after(
                url,
                status,
                retry_after,
            ));
        }

        Ok(response)
    }

    /// Returns a reference to the underlying `reqwest` client for
    /// advanced use (e.g. issuing a HEAD request).
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

fn base_client_builder(config: &HttpClientConfig) -> ClientBuilder {
    Client::builder()
        .connect_timeout(config.connect_timeout)
        .timeout(config.timeout)
        .pool_max_idle_per_host(config.max_connections_per_host)
        .gzip(true)
        .danger_accept_invalid_certs(!config.verify_ssl)
        .user_agent(config.user_agent.clone())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Payload {
        value: u32,
    }

    #[tokio::test]
    async fn get_json_deserializes_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/boxscore"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"value": 7})))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new(&HttpClientConfig::default()).unwrap();
        let url = format!("{}/boxscore", mock_server.uri());
        let payload: Payload = client.get_json(&url).await.unwrap();
        assert_eq!(payload, Payload { value: 7 });
    }

    #[tokio::test]
    async fn get_text_returns_html_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/report"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new(&HttpClientConfig::default()).unwrap();
        let url = format!("{}/report", mock_server.uri());
        let body = client.get_text(&url).await.unwrap();
        assert_eq!(body, "<html></html>");
    }

    #[tokio::test]
    async fn non_success_status_is_http_status_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new(&HttpClientConfig::default()).unwrap();
        let url = format!("{}/missing", mock_server.uri());
        let result: Result<Payload, DownloadError> = client.get_json(&url).await;
        match result {
            Err(DownloadError::HttpStatus { status, .. }) => assert_eq!(status, 404),
            other => panic!("expected HttpStatus, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rate_limit_response_carries_retry_after() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new(&HttpClientConfig::default()).unwrap();
        let url = format!("{}/limited", mock_server.uri());
        let result: Result<Payload, DownloadError> = client.get_json(&url).await;
        match result {
            Err(DownloadError::HttpStatus {
                status,
                retry_after,
                ..
            }) => {
                assert_eq!(status, 429);
                assert_eq!(retry_after.as_deref(), Some("30"));
            }
            other => panic!("expected HttpStatus, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn health_check_true_on_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new(&HttpClientConfig::default()).unwrap();
        let url = format!("{}/health", mock_server.uri());
        assert!(client.health_check(&url).await);
    }

    #[tokio::test]
    async fn health_check_false_on_failure_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new(&HttpClientConfig::default()).unwrap();
        let url = format!("{}/health", mock_server.uri());
        assert!(!client.health_check(&url).await);
    }

    #[tokio::test]
    async fn get_returns_buffered_response_on_non_success_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new(&HttpClientConfig::default()).unwrap();
        let url = format!("{}/missing", mock_server.uri());
        let response = client.get(&url).await.unwrap();
        assert_eq!(response.status, 404);
        assert!(!response.is_success());
        assert!(response.is_client_error());
        assert!(!response.is_server_error());
        assert_eq!(response.text(), "not found");
    }

    #[tokio::test]
    async fn get_rate_limited_response_exposes_retry_after() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "15"))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new(&HttpClientConfig::default()).unwrap();
        let url = format!("{}/limited", mock_server.uri());
        let response = client.get(&url).await.unwrap();
        assert!(response.is_rate_limited());
        assert_eq!(response.retry_after().as_deref(), Some("15"));
    }

    #[tokio::test]
    async fn get_server_error_response_is_flagged() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/boom"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new(&HttpClientConfig::default()).unwrap();
        let url = format!("{}/boom", mock_server.uri());
        let response = client.get(&url).await.unwrap();
        assert!(response.is_server_error());
        assert!(!response.is_client_error());
    }

    #[tokio::test]
    async fn post_sends_json_body_and_decodes_json_response() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"value": 9})))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new(&HttpClientConfig::default()).unwrap();
        let url = format!("{}/submit", mock_server.uri());
        let response = client
            .post(&url, Some(serde_json::json!({"value": 1})), None, None, None)
            .await
            .unwrap();
        assert!(response.is_success());
        let payload: Payload = response.json().unwrap();
        assert_eq!(payload, Payload { value: 9 });
    }

    #[tokio::test]
    async fn post_sends_form_data() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/form"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new(&HttpClientConfig::default()).unwrap();
        let url = format!("{}/form", mock_server.uri());
        let mut data = HashMap::new();
        data.insert("name".to_string(), "value".to_string());
        let response = client.post(&url, None, Some(data), None, None).await.unwrap();
        assert!(response.is_success());
    }

    #[test]
    fn json_decode_failure_yields_download_error_json() {
        let response = HttpResponse {
            status: 200,
            headers: HeaderMap::new(),
            url: "https://example.com/x".to_string(),
            content: b"not json".to_vec(),
            content_type: None,
        };
        let result: Result<Payload, DownloadError> = response.json();
        match result {
            Err(DownloadError::Json { url, .. }) => assert_eq!(url, "https://example.com/x"),
            other => panic!("expected Json error, got {other:?}"),
        }
    }
}
