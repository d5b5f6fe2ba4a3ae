//! Base-URL client that hands out pre-wired request builders.
//!
//! # Design
//! `Client` holds the base URL, the transport and an optional metrics sink,
//! and nothing else. It is cheap to clone and share across test threads;
//! each call returns an independent `RequestBuilder`.

use std::fmt;
use std::sync::Arc;

use crate::config::ClientConfig;
use crate::http::HttpMethod;
use crate::metrics::MetricsSink;
use crate::request::RequestBuilder;
use crate::transport::{default_transport, Transport, UreqTransport};

#[derive(Clone)]
pub struct Client {
    base_url: String,
    transport: Arc<dyn Transport>,
    metrics: Option<MetricsSink>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url)
            .field("metrics", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Client on the shared default transport.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            transport: default_transport(),
            metrics: None,
        }
    }

    /// Client with its own ureq agent built from `config`.
    pub fn with_config(base_url: &str, config: &ClientConfig) -> Self {
        Self::new(base_url).with_transport(Arc::new(UreqTransport::new(config)))
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_metrics(mut self, sink: MetricsSink) -> Self {
        self.metrics = Some(sink);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// A builder for `path` with no request yet.
    pub fn endpoint(&self, path: &str) -> RequestBuilder {
        self.wire(RequestBuilder::endpoint(&self.url(path)))
    }

    /// # Panics
    /// If the base URL joined with `path` is not a valid http(s) URL.
    #[track_caller]
    pub fn request(&self, method: HttpMethod, path: &str, body: impl Into<Vec<u8>>) -> RequestBuilder {
        self.endpoint(path).with_method(method, body)
    }

    #[track_caller]
    pub fn get(&self, path: &str) -> RequestBuilder {
        self.request(HttpMethod::Get, path, Vec::<u8>::new())
    }

    #[track_caller]
    pub fn post(&self, path: &str, body: impl Into<Vec<u8>>) -> RequestBuilder {
        self.request(HttpMethod::Post, path, body)
    }

    #[track_caller]
    pub fn put(&self, path: &str, body: impl Into<Vec<u8>>) -> RequestBuilder {
        self.request(HttpMethod::Put, path, body)
    }

    #[track_caller]
    pub fn patch(&self, path: &str, body: impl Into<Vec<u8>>) -> RequestBuilder {
        self.request(HttpMethod::Patch, path, body)
    }

    #[track_caller]
    pub fn delete(&self, path: &str) -> RequestBuilder {
        self.request(HttpMethod::Delete, path, Vec::<u8>::new())
    }

    fn url(&self, path: &str) -> String {
        if path.is_empty() || path.starts_with(['/', '?']) {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    fn wire(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.with_transport(Arc::clone(&self.transport));
        match &self.metrics {
            Some(sink) => builder.with_metrics(sink.clone()),
            None => builder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsAggregator;
    use crate::request::stub::StubTransport;

    fn client() -> Client {
        Client::new("http://localhost:3000")
    }

    #[test]
    fn get_produces_correct_request() {
        let req = client().get("/items").build().unwrap();
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.url, "http://localhost:3000/items");
        assert!(req.body.is_empty());
        assert!(req.headers.is_empty());
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let client = Client::new("http://localhost:3000/");
        assert_eq!(client.base_url(), "http://localhost:3000");
        let req = client.get("items").build().unwrap();
        assert_eq!(req.url, "http://localhost:3000/items");
    }

    #[test]
    fn endpoint_builder_is_unbuilt() {
        let builder = client().endpoint("/items");
        assert!(!builder.is_built());
        let req = builder.create(r#"{"title":"Buy milk"}"#).build().unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.endpoint, "/items");
    }

    #[test]
    fn debug_shows_base_url_and_sink_presence() {
        let shown = format!("{:?}", client());
        assert!(shown.contains(r#"base_url: "http://localhost:3000""#), "{shown}");
        assert!(shown.contains("metrics: false"), "{shown}");
    }

    #[test]
    fn builders_inherit_transport_and_sink() {
        let mut aggregator = MetricsAggregator::new();
        let client = client()
            .with_transport(StubTransport::respond(200, "application/json", "{}"))
            .with_metrics(aggregator.start().unwrap());

        client.get("/a").send().unwrap();
        client.delete("/b").send().unwrap();

        let metrics = aggregator.stop_and_wait().unwrap();
        assert_eq!(metrics.total_requests, 2);
    }
}
