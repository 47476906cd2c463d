//! HTTP transport
//!
//! The executor only sees the [`Transport`] trait so runs can be driven
//! against an in-memory target in tests.

use floot_common::{Error, HttpMethod, RecordedResponse, Result};
use std::time::Duration;
use tracing::debug;

/// A fully interpolated request, query values not yet encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl PreparedRequest {
    /// `host` and `path` joined by exactly one slash
    pub fn new(method: HttpMethod, host: &str, path: &str) -> Self {
        Self {
            method,
            url: format!("{}/{}", host.trim_end_matches('/'), path.trim_start_matches('/')),
            query: Vec::new(),
            headers: Vec::new(),
        }
    }

    /// The URL with the query string appended, every name and value encoded once
    pub fn full_url(&self) -> String {
        if self.query.is_empty() {
            return self.url.clone();
        }
        let query = self
            .query
            .iter()
            .map(|(name, value)| {
                format!("{}={}", urlencoding::encode(name), urlencoding::encode(value))
            })
            .collect::<Vec<_>>()
            .join("&");
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.url, separator, query)
    }
}

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &PreparedRequest) -> Result<RecordedResponse>;
}

/// [`Transport`] backed by `reqwest`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        Self::with_timeout(None)
    }

    pub fn with_timeout(timeout: Option<Duration>) -> Result<Self> {
        let mut builder =
            reqwest::Client::builder().user_agent(concat!("floot/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self { client })
    }
}

fn method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &PreparedRequest) -> Result<RecordedResponse> {
        let url = request.full_url();
        debug!(method = %request.method, %url, "sending request");

        let mut builder = self.client.request(method(request.method), &url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| Error::Http(format!("{} {}: {}", request.method, url, e)))?;

        let status = response.status();
        let mut recorded = RecordedResponse::new(response.url().to_string(), status.as_u16())
            .with_reason(status.canonical_reason().unwrap_or(""));
        for (name, value) in response.headers() {
            recorded = recorded.with_header(
                name.as_str(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            );
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Http(format!("{} {}: {}", request.method, url, e)))?;
        debug!(status = status.as_u16(), bytes = body.len(), "received response");
        Ok(recorded.with_body(body.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_join_uses_one_slash() {
        for (host, path) in [
            ("http://h", "/a"),
            ("http://h/", "/a"),
            ("http://h/", "a"),
            ("http://h", "a"),
        ] {
            assert_eq!(PreparedRequest::new(HttpMethod::Get, host, path).url, "http://h/a");
        }
    }

    #[test]
    fn test_query_is_encoded_once() {
        let mut request = PreparedRequest::new(HttpMethod::Get, "http://h", "/search");
        request.query = vec![
            ("q".to_string(), "a b&c".to_string()),
            ("q".to_string(), "100%".to_string()),
        ];
        assert_eq!(request.full_url(), "http://h/search?q=a%20b%26c&q=100%25");
    }

    #[test]
    fn test_existing_query_is_extended() {
        let mut request = PreparedRequest::new(HttpMethod::Get, "http://h", "/s?x=1");
        request.query = vec![("y".to_string(), "2".to_string())];
        assert_eq!(request.full_url(), "http://h/s?x=1&y=2");
    }

    #[test]
    fn test_method_mapping() {
        assert_eq!(method(HttpMethod::Delete), reqwest::Method::DELETE);
        assert_eq!(method(HttpMethod::Get), reqwest::Method::GET);
    }
}
