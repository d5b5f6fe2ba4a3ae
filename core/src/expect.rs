//! Response expectations: expected status plus where the body should go.
//!
//! # Design
//! A `Destination` is a caller-owned slot plus the strategy for filling it.
//! JSON destinations deserialize into a `T`; image destinations receive the
//! re-encoded image bytes. Which strategy runs is decided by the response's
//! `ContentKind`, and a mismatch between the two is a decode error.
//!
//! Status handling:
//! - no destination: the status is advisory and only logged;
//! - error-payload destination: a different status is tolerated because the
//!   error body is the content under test;
//! - any other destination: a different status fails with the full body.
//!
//! Destinations built with an expected value compare after decoding. A
//! difference is a non-fatal failure unless the status was also off.

use std::fmt;
use std::io::Write;

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::content::{reencode_image, ContentKind};
use crate::context::TestContext;
use crate::error::Error;
use crate::request::RequestBuilder;

type DecodeFn<'a> = Box<dyn FnOnce(&[u8]) -> Result<Option<String>, serde_json::Error> + 'a>;

enum Target<'a> {
    Json { decode: DecodeFn<'a>, error_payload: bool },
    Image(&'a mut dyn Write),
}

/// Where a response body is written. Borrow a value with one of the
/// constructors and read it back after the call.
pub struct Destination<'a> {
    target: Target<'a>,
    type_name: &'static str,
}

impl fmt::Debug for Destination<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.target {
            Target::Json {
                error_payload: true,
                ..
            } => "error payload",
            Target::Json { .. } => "json",
            Target::Image(_) => "image",
        };
        f.debug_struct("Destination")
            .field("kind", &kind)
            .field("type_name", &self.type_name)
            .finish()
    }
}

impl<'a> Destination<'a> {
    /// Decode a JSON body into `slot`.
    pub fn json<T: DeserializeOwned + 'a>(slot: &'a mut T) -> Self {
        Self::decode_into(slot, false)
    }

    /// Decode into `slot`, then compare with `expected`.
    pub fn json_eq<T>(slot: &'a mut T, expected: T) -> Self
    where
        T: DeserializeOwned + PartialEq + fmt::Debug + 'a,
    {
        Self::decode_and_compare(slot, expected, false)
    }

    /// Decode an error body into `slot`. A status other than the expected
    /// one does not fail the call.
    pub fn error_payload<T: DeserializeOwned + 'a>(slot: &'a mut T) -> Self {
        Self::decode_into(slot, true)
    }

    pub fn error_payload_eq<T>(slot: &'a mut T, expected: T) -> Self
    where
        T: DeserializeOwned + PartialEq + fmt::Debug + 'a,
    {
        Self::decode_and_compare(slot, expected, true)
    }

    /// Receive a PNG, JPEG or GIF body, validated and re-encoded in the same
    /// format.
    pub fn image<W: Write + 'a>(out: &'a mut W) -> Self {
        Self {
            target: Target::Image(out),
            type_name: std::any::type_name::<W>(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn tolerates_status_mismatch(&self) -> bool {
        matches!(
            self.target,
            Target::Json {
                error_payload: true,
                ..
            }
        )
    }

    fn decode_into<T: DeserializeOwned + 'a>(slot: &'a mut T, error_payload: bool) -> Self {
        Self {
            target: Target::Json {
                decode: Box::new(move |body: &[u8]| {
                    *slot = serde_json::from_slice(body)?;
                    Ok(None)
                }),
                error_payload,
            },
            type_name: std::any::type_name::<T>(),
        }
    }

    fn decode_and_compare<T>(slot: &'a mut T, expected: T, error_payload: bool) -> Self
    where
        T: DeserializeOwned + PartialEq + fmt::Debug + 'a,
    {
        Self {
            target: Target::Json {
                decode: Box::new(move |body: &[u8]| {
                    let got: T = serde_json::from_slice(body)?;
                    let mismatch = (got != expected)
                        .then(|| format!("expected: {expected:#?}\ngot     : {got:#?}"));
                    *slot = got;
                    Ok(mismatch)
                }),
                error_payload,
            },
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Write `body` into the destination. Returns an assertion mismatch
    /// description, if any.
    fn fill(self, kind: ContentKind, body: &[u8]) -> Result<Option<String>, Error> {
        match self.target {
            Target::Image(out) => {
                if !kind.is_image() {
                    return Err(Error::Decode {
                        kind,
                        message: format!("{} expects an image body", self.type_name),
                    });
                }
                reencode_image(kind, body, out)?;
                Ok(None)
            }
            Target::Json { decode, .. } => {
                if kind.is_image() {
                    return Err(Error::Decode {
                        kind,
                        message: format!("{} cannot receive an image body", self.type_name),
                    });
                }
                decode(body).map_err(|e| Error::Decode {
                    kind: ContentKind::Json,
                    message: e.to_string(),
                })
            }
        }
    }
}

/// Outcome of an expectation that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub status: u16,
    /// The status differed but the destination was an error payload.
    pub status_tolerated: bool,
    /// Expected-value comparisons that failed.
    pub mismatches: Vec<String>,
}

/// A request paired with what its response should look like.
#[derive(Debug)]
pub struct Expectation<'a> {
    request: RequestBuilder,
    status: u16,
    destination: Option<Destination<'a>>,
}

impl<'a> Expectation<'a> {
    pub(crate) fn new(request: RequestBuilder, status: u16, destination: Option<Destination<'a>>) -> Self {
        Self {
            request,
            status,
            destination,
        }
    }

    /// Execute and match the response, returning failures as data.
    pub fn try_call(self) -> Result<Verdict, Error> {
        let (request, response) = self.request.dispatch()?;

        let Some(destination) = self.destination else {
            if response.status != self.status {
                warn!(
                    method = %request.method,
                    url = %request.url,
                    expected = self.status,
                    actual = response.status,
                    "unexpected status, no destination to check"
                );
            }
            return Ok(Verdict {
                status: response.status,
                status_tolerated: false,
                mismatches: Vec::new(),
            });
        };

        let mut status_tolerated = false;
        if response.status != self.status {
            if !destination.tolerates_status_mismatch() {
                return Err(Error::StatusMismatch {
                    method: request.method,
                    url: request.url,
                    expected: self.status,
                    actual: response.status,
                    type_name: destination.type_name(),
                    body: response.text(),
                });
            }
            warn!(
                method = %request.method,
                url = %request.url,
                expected = self.status,
                actual = response.status,
                "status differs, decoding error payload"
            );
            status_tolerated = true;
        }

        let kind = ContentKind::from_content_type(response.content_type());
        let mismatches = destination
            .fill(kind, &response.body)?
            .map(|diff| format!("{} {}:\n{diff}", request.method, request.url))
            .into_iter()
            .collect();

        Ok(Verdict {
            status: response.status,
            status_tolerated,
            mismatches,
        })
    }

    /// Execute and match the response against `ctx`: transport, status and
    /// decode failures are fatal, value mismatches are recorded as errors.
    #[track_caller]
    pub fn call(self, ctx: &TestContext) -> Verdict {
        let verdict = match self.try_call() {
            Ok(verdict) => verdict,
            Err(e) => ctx.fatal(e),
        };
        if verdict.status_tolerated && !verdict.mismatches.is_empty() {
            ctx.fatal(format!(
                "status {} and body both differ from the expectation\n{}",
                verdict.status,
                verdict.mismatches.join("\n")
            ));
        }
        for mismatch in &verdict.mismatches {
            ctx.error(mismatch);
        }
        verdict
    }
}
