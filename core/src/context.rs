//! Failure reporting for the host test harness.
//!
//! # Design
//! Rust's test harness only knows "the test panicked". `TestContext` layers
//! the two kinds of failure the builder needs on top of that: `fatal` panics
//! at once and stops the test, `error` records the failure and lets the test
//! carry on so later checks still report. A context holding recorded errors
//! panics when it is dropped, which fails the test at its end.

use std::fmt;
use std::thread;

use parking_lot::Mutex;
use tracing::error;

#[derive(Debug)]
pub struct TestContext {
    name: String,
    errors: Mutex<Vec<String>>,
}

impl TestContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            errors: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record a non-fatal failure.
    pub fn error(&self, message: impl fmt::Display) {
        let message = message.to_string();
        error!(test = %self.name, "{message}");
        self.errors.lock().push(message);
    }

    /// Fail the test now. Errors recorded earlier are included in the
    /// panic message.
    #[track_caller]
    pub fn fatal(&self, message: impl fmt::Display) -> ! {
        let earlier = std::mem::take(&mut *self.errors.lock());
        let mut text = format!("{}: {message}", self.name);
        for e in earlier {
            text.push_str("\n  earlier: ");
            text.push_str(&e);
        }
        panic!("{text}");
    }

    pub fn failed(&self) -> bool {
        !self.errors.lock().is_empty()
    }

    /// Remove and return the recorded errors. A context emptied this way
    /// no longer fails on drop.
    pub fn take_errors(&self) -> Vec<String> {
        std::mem::take(&mut *self.errors.lock())
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        if thread::panicking() {
            return;
        }
        let errors = self.take_errors();
        if !errors.is_empty() {
            panic!("{} failed:\n{}", self.name, errors.join("\n"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_are_recorded_without_stopping() {
        let ctx = TestContext::new("soft");
        ctx.error("first");
        ctx.error(format_args!("second {}", 2));
        assert!(ctx.failed());
        assert_eq!(ctx.take_errors(), vec!["first", "second 2"]);
        assert!(!ctx.failed());
    }

    #[test]
    #[should_panic(expected = "hard: boom")]
    fn fatal_panics_with_test_name() {
        let ctx = TestContext::new("hard");
        ctx.fatal("boom");
    }

    #[test]
    #[should_panic(expected = "earlier: soft one")]
    fn fatal_includes_earlier_errors() {
        let ctx = TestContext::new("mixed");
        ctx.error("soft one");
        ctx.fatal("hard one");
    }

    #[test]
    #[should_panic(expected = "dropped failed:\nleft over")]
    fn drop_with_errors_fails_the_test() {
        let ctx = TestContext::new("dropped");
        ctx.error("left over");
    }

    #[test]
    fn clean_drop_does_not_panic() {
        let _ctx = TestContext::new("clean");
    }
}
