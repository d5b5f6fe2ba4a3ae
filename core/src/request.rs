//! Fluent construction and execution of one HTTP request.
//!
//! # Design
//! `RequestBuilder` is a value: every `with_*` call consumes it and returns
//! the updated builder, and `Clone` forks a base request into independent
//! ones. Nothing is shared between forks except the transport and the
//! metrics sink, which are safe to share.
//!
//! A builder made with [`RequestBuilder::endpoint`] has a URL but no request
//! yet. Header, query and auth calls on it are no-ops until a method is set.
//!
//! URL and JSON problems are construction errors. The `try_*` constructors
//! return them; the plain constructors panic, which fails the test that is
//! authoring the request before anything touches the network.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use tracing::debug;
use ureq::http::Uri;

use crate::context::TestContext;
use crate::error::Error;
use crate::expect::{Destination, Expectation};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::metrics::{MetricsRecord, MetricsSink};
use crate::transport::{default_transport, Transport};

#[derive(Debug, Clone)]
struct RequestState {
    method: HttpMethod,
    /// `scheme://authority`
    origin: String,
    path: String,
    body: Vec<u8>,
    headers: Vec<(String, String)>,
    /// Query segments from the URL, as written, keyed by decoded name.
    url_query: Vec<(String, String)>,
    /// Parameters set through `with_query_params`. Shadow `url_query`.
    query: BTreeMap<String, Vec<String>>,
    basic_auth: Option<(String, String)>,
    bearer_token: Option<String>,
}

impl RequestState {
    fn parse(method: HttpMethod, url: &str, body: Vec<u8>) -> Result<Self, Error> {
        let invalid = |reason: String| Error::InvalidUrl {
            url: url.to_string(),
            reason,
        };

        let uri: Uri = url.parse().map_err(|e: ureq::http::uri::InvalidUri| invalid(e.to_string()))?;
        let scheme = match uri.scheme_str() {
            Some(s @ ("http" | "https")) => s,
            Some(other) => return Err(invalid(format!("unsupported scheme {other:?}"))),
            None => return Err(invalid("missing scheme".to_string())),
        };
        let authority = uri
            .authority()
            .ok_or_else(|| invalid("missing host".to_string()))?;

        let mut url_query = Vec::new();
        for segment in uri.query().unwrap_or_default().split('&').filter(|s| !s.is_empty()) {
            let pairs: Vec<(String, String)> =
                serde_urlencoded::from_str(segment).map_err(|e| invalid(e.to_string()))?;
            if let Some((key, _)) = pairs.into_iter().next() {
                url_query.push((key, segment.to_string()));
            }
        }

        let path = match uri.path() {
            "" => "/".to_string(),
            p => p.to_string(),
        };

        Ok(Self {
            method,
            origin: format!("{scheme}://{authority}"),
            path,
            body,
            headers: Vec::new(),
            url_query,
            query: BTreeMap::new(),
            basic_auth: None,
            bearer_token: None,
        })
    }

    /// URL segments untouched by `with_query_params` are emitted as written,
    /// in their original order, followed by the set parameters in key order.
    fn url(&self) -> Result<String, Error> {
        let pairs: Vec<(&str, &str)> = self
            .query
            .iter()
            .flat_map(|(k, values)| values.iter().map(move |v| (k.as_str(), v.as_str())))
            .collect();
        let encoded = serde_urlencoded::to_string(pairs)
            .map_err(|e| Error::Serialization(e.to_string()))?;

        let mut segments: Vec<&str> = self
            .url_query
            .iter()
            .filter(|(key, _)| !self.query.contains_key(key))
            .map(|(_, segment)| segment.as_str())
            .collect();
        if !encoded.is_empty() {
            segments.push(&encoded);
        }

        let mut url = format!("{}{}", self.origin, self.path);
        if !segments.is_empty() {
            url.push('?');
            url.push_str(&segments.join("&"));
        }
        Ok(url)
    }

    fn to_request(&self) -> Result<HttpRequest, Error> {
        let mut headers = self.headers.clone();
        if let Some((user, password)) = &self.basic_auth {
            let token = STANDARD.encode(format!("{user}:{password}"));
            headers.push(("Authorization".to_string(), format!("Basic {token}")));
        }
        if let Some(token) = &self.bearer_token {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }

        Ok(HttpRequest {
            method: self.method,
            url: self.url()?,
            endpoint: self.path.clone(),
            headers,
            body: self.body.clone(),
        })
    }
}

/// Builder for one request. See the module docs.
#[derive(Clone)]
pub struct RequestBuilder {
    target: String,
    state: Option<RequestState>,
    transport: Arc<dyn Transport>,
    metrics: Option<MetricsSink>,
}

impl fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("target", &self.target)
            .field("state", &self.state)
            .field("metrics", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}

impl RequestBuilder {
    /// A built request.
    ///
    /// # Panics
    /// If `url` is not an absolute http(s) URL.
    #[track_caller]
    pub fn new(method: HttpMethod, url: &str, body: impl Into<Vec<u8>>) -> Self {
        Self::try_new(method, url, body).unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_new(method: HttpMethod, url: &str, body: impl Into<Vec<u8>>) -> Result<Self, Error> {
        Self::endpoint(url).try_with_method(method, body)
    }

    #[track_caller]
    pub fn get(url: &str) -> Self {
        Self::new(HttpMethod::Get, url, Vec::<u8>::new())
    }

    #[track_caller]
    pub fn head(url: &str) -> Self {
        Self::new(HttpMethod::Head, url, Vec::<u8>::new())
    }

    #[track_caller]
    pub fn post(url: &str, body: impl Into<Vec<u8>>) -> Self {
        Self::new(HttpMethod::Post, url, body)
    }

    #[track_caller]
    pub fn put(url: &str, body: impl Into<Vec<u8>>) -> Self {
        Self::new(HttpMethod::Put, url, body)
    }

    #[track_caller]
    pub fn patch(url: &str, body: impl Into<Vec<u8>>) -> Self {
        Self::new(HttpMethod::Patch, url, body)
    }

    #[track_caller]
    pub fn delete(url: &str) -> Self {
        Self::new(HttpMethod::Delete, url, Vec::<u8>::new())
    }

    /// A builder with a target but no request. Set a method before adding
    /// headers, query params or credentials.
    pub fn endpoint(url: &str) -> Self {
        Self {
            target: url.to_string(),
            state: None,
            transport: default_transport(),
            metrics: None,
        }
    }

    /// Whether a method has been set.
    pub fn is_built(&self) -> bool {
        self.state.is_some()
    }

    /// Build a fresh request against the target. Headers, query params and
    /// credentials from an earlier request are discarded.
    #[track_caller]
    pub fn with_method(self, method: HttpMethod, body: impl Into<Vec<u8>>) -> Self {
        self.try_with_method(method, body)
            .unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_with_method(mut self, method: HttpMethod, body: impl Into<Vec<u8>>) -> Result<Self, Error> {
        self.state = Some(RequestState::parse(method, &self.target, body.into())?);
        Ok(self)
    }

    /// Like `with_method`, with `payload` serialized as the JSON body.
    #[track_caller]
    pub fn with_json<T: Serialize + ?Sized>(self, method: HttpMethod, payload: &T) -> Self {
        self.try_with_json(method, payload)
            .unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_with_json<T: Serialize + ?Sized>(self, method: HttpMethod, payload: &T) -> Result<Self, Error> {
        let body = serde_json::to_vec(payload).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(self
            .try_with_method(method, body)?
            .with_header("Content-Type", "application/json"))
    }

    /// POST `json` as given.
    #[track_caller]
    pub fn create(self, json: &str) -> Self {
        self.with_method(HttpMethod::Post, json)
            .with_header("Content-Type", "application/json")
    }

    /// PUT `payload` serialized as JSON.
    #[track_caller]
    pub fn update<T: Serialize + ?Sized>(self, payload: &T) -> Self {
        self.with_json(HttpMethod::Put, payload)
    }

    /// GET the target with `filters` appended verbatim, e.g. `"/42"` or
    /// `"?state=open"`. The target itself is left as it was.
    #[track_caller]
    pub fn fetch(self, filters: &str) -> Self {
        self.try_fetch(filters).unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_fetch(mut self, filters: &str) -> Result<Self, Error> {
        let url = format!("{}{filters}", self.target);
        self.state = Some(RequestState::parse(HttpMethod::Get, &url, Vec::new())?);
        Ok(self)
    }

    #[track_caller]
    pub fn remove(self) -> Self {
        self.with_method(HttpMethod::Delete, Vec::<u8>::new())
    }

    /// HTTP basic credentials. Replaces earlier basic credentials.
    pub fn with_basic_auth(self, user: &str, password: &str) -> Self {
        self.map_state("basic auth", |state| {
            state.basic_auth = Some((user.to_string(), password.to_string()));
        })
    }

    pub fn with_bearer_token(self, token: &str) -> Self {
        self.map_state("bearer token", |state| {
            state.bearer_token = Some(token.to_string());
        })
    }

    pub fn with_header(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_headers([(name, value)])
    }

    /// Append headers. Repeated names are kept as separate values.
    pub fn with_headers<I, K, V>(self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.map_state("headers", |state| {
            state
                .headers
                .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        })
    }

    /// Set query parameters. Each key replaces every earlier value for it,
    /// including values that came with the URL.
    pub fn with_query_params<I, K, V>(self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.map_state("query params", |state| {
            for (k, v) in params {
                state.query.insert(k.into(), vec![v.into()]);
            }
        })
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Report this request to a running metrics aggregator. Without a sink
    /// nothing is recorded.
    ///
    /// The push blocks while the sink's buffer is full, except on an async
    /// runtime thread, where the record is dropped instead. See
    /// [`MetricsSink::record`].
    pub fn with_metrics(mut self, sink: MetricsSink) -> Self {
        self.metrics = Some(sink);
        self
    }

    fn map_state(mut self, what: &str, f: impl FnOnce(&mut RequestState)) -> Self {
        match self.state.as_mut() {
            Some(state) => f(state),
            None => debug!(url = %self.target, "{what} ignored, request not built yet"),
        }
        self
    }

    /// The request as it would be sent.
    pub fn build(&self) -> Result<HttpRequest, Error> {
        match &self.state {
            Some(state) => state.to_request(),
            None => Err(Error::RequestNotBuilt {
                url: self.target.clone(),
            }),
        }
    }

    pub fn expect<'a>(self, destination: Destination<'a>, status: u16) -> Expectation<'a> {
        Expectation::new(self, status, Some(destination))
    }

    /// Expect `status` without decoding the body. The status is then only
    /// advisory.
    pub fn expect_status(self, status: u16) -> Expectation<'static> {
        Expectation::new(self, status, None)
    }

    pub fn expect_json<'a, T>(self, slot: &'a mut T, status: u16) -> Expectation<'a>
    where
        T: serde::de::DeserializeOwned + 'a,
    {
        self.expect(Destination::json(slot), status)
    }

    pub fn expect_error<'a, T>(self, slot: &'a mut T, status: u16) -> Expectation<'a>
    where
        T: serde::de::DeserializeOwned + 'a,
    {
        self.expect(Destination::error_payload(slot), status)
    }

    pub fn expect_image<'a, W>(self, out: &'a mut W, status: u16) -> Expectation<'a>
    where
        W: std::io::Write + 'a,
    {
        self.expect(Destination::image(out), status)
    }

    /// Execute and return the raw response.
    pub fn send(self) -> Result<HttpResponse, Error> {
        self.dispatch().map(|(_, response)| response)
    }

    /// Execute, failing the test if no response arrives.
    #[track_caller]
    pub fn call(self, ctx: &TestContext) {
        if let Err(e) = self.send() {
            ctx.fatal(e);
        }
    }

    pub(crate) fn dispatch(self) -> Result<(HttpRequest, HttpResponse), Error> {
        let request = self.build()?;

        let start = Instant::now();
        let incoming = self.transport.execute(&request)?;
        let duration_ms = start.elapsed().as_millis() as u64;

        debug!(
            method = %request.method,
            url = %request.url,
            status = incoming.status,
            duration_ms,
            "response received"
        );

        // A response exists from here on, whether or not its body arrives.
        if let Some(sink) = &self.metrics {
            sink.record(MetricsRecord {
                status: incoming.status,
                endpoint: request.endpoint.clone(),
                duration_ms,
            });
        }

        let response = incoming.read_body().map_err(|e| Error::Transport {
            method: request.method,
            url: request.url.clone(),
            message: format!("reading body: {e}"),
        })?;

        Ok((request, response))
    }
}
