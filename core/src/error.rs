//! Error type shared by the builder, the transport and the metrics
//! aggregator.
//!
//! # Design
//! `StatusMismatch` carries everything needed to debug a failing test from
//! its output alone: both status codes, the request line, the type the body
//! was meant to decode into and the raw body the server actually sent.

use std::fmt;

use crate::content::ContentKind;
use crate::http::HttpMethod;

#[derive(Debug)]
pub enum Error {
    /// The URL could not be parsed or is not an absolute http(s) URL.
    InvalidUrl { url: String, reason: String },

    /// The request payload could not be serialized to JSON.
    Serialization(String),

    /// `send`/`call` on a builder whose request was never constructed.
    RequestNotBuilt { url: String },

    /// No response was obtained: connection refused, DNS, timeout, ...
    Transport {
        method: HttpMethod,
        url: String,
        message: String,
    },

    /// The server answered with a status other than the expected one.
    StatusMismatch {
        method: HttpMethod,
        url: String,
        expected: u16,
        actual: u16,
        type_name: &'static str,
        body: String,
    },

    /// The body could not be decoded as `kind`.
    Decode { kind: ContentKind, message: String },

    /// Aggregator lifecycle call made in the wrong state.
    Aggregator(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidUrl { url, reason } => write!(f, "invalid url {url:?}: {reason}"),
            Error::Serialization(msg) => write!(f, "serialization failed: {msg}"),
            Error::RequestNotBuilt { url } => {
                write!(f, "request to {url} was never built; set a method first")
            }
            Error::Transport {
                method,
                url,
                message,
            } => write!(f, "{method} {url} failed: {message}"),
            Error::StatusMismatch {
                method,
                url,
                expected,
                actual,
                type_name,
                body,
            } => {
                writeln!(
                    f,
                    "expect: {method} {url} return status code: {expected} and response type: {type_name}"
                )?;
                write!(
                    f,
                    "actual: {method} {url} return status code: {actual} and response     : {body}"
                )
            }
            Error::Decode { kind, message } => write!(f, "decoding {kind} body failed: {message}"),
            Error::Aggregator(msg) => write!(f, "metrics aggregator: {msg}"),
        }
    }
}

impl std::error::Error for Error {}
