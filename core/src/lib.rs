//! Fluent HTTP requests for end-to-end tests, with run-wide latency metrics.
//!
//! # Overview
//! Build a request, optionally attach an expectation (status code plus a
//! destination for the decoded body), then call it from a test. Every call
//! can report its status and latency to a `MetricsAggregator` that runs for
//! the whole test suite and summarises the run at the end.
//!
//! ```no_run
//! use end2end::{HttpMethod, MetricsAggregator, RequestBuilder, TestContext};
//!
//! #[derive(Default, serde::Deserialize)]
//! struct GithubResponse {
//!     message: String,
//!     documentation_url: String,
//! }
//!
//! let mut aggregator = MetricsAggregator::new();
//! let sink = aggregator.start().unwrap();
//!
//! let ctx = TestContext::new("bad_credentials");
//! let mut got = GithubResponse::default();
//! RequestBuilder::new(HttpMethod::Get, "https://api.github.com", "")
//!     .with_basic_auth("fooo", "barr")
//!     .with_metrics(sink)
//!     .expect_json(&mut got, 401)
//!     .call(&ctx);
//!
//! println!("{}", aggregator.stop_and_wait().unwrap());
//! ```
//!
//! # Design
//! - Requests are built as plain data and executed by a `Transport`; the
//!   default one is a blocking ureq agent.
//! - Builders are values; `with_*` consumes and returns.
//! - The aggregator is an explicit object, not a global. Requests without a
//!   sink record nothing.

pub mod client;
pub mod config;
pub mod content;
pub mod context;
pub mod error;
pub mod expect;
pub mod http;
pub mod metrics;
pub mod request;
pub mod trace;
pub mod transport;

pub use client::Client;
pub use config::ClientConfig;
pub use content::ContentKind;
pub use context::TestContext;
pub use error::Error;
pub use expect::{Destination, Expectation, Verdict};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use metrics::{AggregateMetrics, AggregatorState, MetricsAggregator, MetricsRecord, MetricsSink};
pub use request::RequestBuilder;
pub use transport::{Incoming, Transport, UreqTransport};
