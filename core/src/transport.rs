//! The one place that performs network I/O.
//!
//! # Design
//! Everything else in the crate works on `HttpRequest`/`HttpResponse` data.
//! `UreqTransport` executes requests with a blocking ureq agent configured
//! so that 4xx/5xx statuses come back as responses rather than errors;
//! status interpretation belongs to the expectation layer.
//!
//! `execute` returns once the status line and headers are in. The body is
//! read afterwards through [`Incoming::read_body`], so a response whose body
//! fails to arrive still counts as a response.

use std::fmt;
use std::io::{self, Cursor, Read};
use std::sync::{Arc, OnceLock};

use ureq::Agent;

use crate::config::ClientConfig;
use crate::error::Error;
use crate::http::{HttpRequest, HttpResponse};

/// Executes one request and blocks until the response head arrives.
///
/// An `Err` means no response was obtained at all.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<Incoming, Error>;
}

/// A response whose head has arrived and whose body is still unread.
pub struct Incoming {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    body: Box<dyn Read>,
}

impl fmt::Debug for Incoming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Incoming")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl Incoming {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: impl Read + 'static) -> Self {
        Self {
            status,
            headers,
            body: Box::new(body),
        }
    }

    /// Read the rest of the body.
    pub fn read_body(mut self) -> io::Result<HttpResponse> {
        let mut body = Vec::new();
        self.body.read_to_end(&mut body)?;
        Ok(HttpResponse {
            status: self.status,
            headers: self.headers,
            body,
        })
    }
}

impl From<HttpResponse> for Incoming {
    fn from(response: HttpResponse) -> Self {
        Self::new(response.status, response.headers, Cursor::new(response.body))
    }
}

#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: Agent,
    max_body_bytes: u64,
}

impl UreqTransport {
    pub fn new(config: &ClientConfig) -> Self {
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(config.timeout)
            .build()
            .new_agent();
        Self {
            agent,
            max_body_bytes: config.max_body_bytes,
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(&ClientConfig::default())
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<Incoming, Error> {
        let transport_err = |message: String| Error::Transport {
            method: request.method,
            url: request.url.clone(),
            message,
        };

        let mut builder = ureq::http::Request::builder()
            .method(request.method.as_str())
            .uri(request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let result = if request.body.is_empty() {
            let req = builder.body(()).map_err(|e| transport_err(e.to_string()))?;
            self.agent.run(req)
        } else {
            let req = builder
                .body(request.body.clone())
                .map_err(|e| transport_err(e.to_string()))?;
            self.agent.run(req)
        };
        let response = result.map_err(|e| transport_err(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response
            .into_body()
            .into_with_config()
            .limit(self.max_body_bytes)
            .reader();

        Ok(Incoming::new(status, headers, body))
    }
}

/// Process-wide transport used when a builder is not given one.
pub fn default_transport() -> Arc<dyn Transport> {
    static DEFAULT: OnceLock<Arc<UreqTransport>> = OnceLock::new();
    DEFAULT.get_or_init(|| Arc::new(UreqTransport::default())).clone()
}
