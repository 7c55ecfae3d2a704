//! Error Reporting
//!
//! An injected `report(error, context)` collaborator. Nothing here holds
//! global state; callers pass a reporter to wherever failures are handled.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::error;

use crate::error::Error;

/// Client-facing error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    BadUserInput,
    Forbidden,
    InternalServerError,
    NotFound,
    Unauthenticated,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadUserInput => "BAD_USER_INPUT",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::InternalServerError => "INTERNAL_SERVER_ERROR",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Unauthenticated => "UNAUTHENTICATED",
        }
    }

    /// Only internal failures go to the reporting sink; the rest are the
    /// caller's problem and are returned to them as-is.
    pub fn should_report(&self) -> bool {
        matches!(self, ErrorCode::InternalServerError)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context attached to a report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportContext {
    pub tags: BTreeMap<String, String>,
    pub extras: BTreeMap<String, String>,
    pub breadcrumbs: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl Default for ReportContext {
    fn default() -> Self {
        Self {
            tags: BTreeMap::new(),
            extras: BTreeMap::new(),
            breadcrumbs: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}

impl ReportContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    pub fn breadcrumb(mut self, message: impl Into<String>) -> Self {
        self.breadcrumbs.push(message.into());
        self
    }
}

/// Port for sending failures to an error-reporting sink.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &(dyn std::error::Error + 'static), context: &ReportContext);
}

/// Reporter that writes to the tracing system.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn report(&self, err: &(dyn std::error::Error + 'static), context: &ReportContext) {
        let tags = serde_json::to_string(&context.tags).unwrap_or_default();
        let extras = serde_json::to_string(&context.extras).unwrap_or_default();
        error!(
            error = %err,
            tags = %tags,
            extras = %extras,
            path = %context.breadcrumbs.join(" > "),
            "Reported error"
        );
    }
}

/// A report captured by [`InMemoryErrorCollector`]
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedReport {
    pub message: String,
    pub context: ReportContext,
}

/// In-memory reporter for testing.
#[derive(Debug, Default)]
pub struct InMemoryErrorCollector {
    reports: RwLock<Vec<CapturedReport>>,
}

impl InMemoryErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<CapturedReport> {
        self.reports.read().clone()
    }

    pub fn len(&self) -> usize {
        self.reports.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.read().is_empty()
    }

    pub fn clear(&self) {
        self.reports.write().clear();
    }
}

impl ErrorReporter for InMemoryErrorCollector {
    fn report(&self, error: &(dyn std::error::Error + 'static), context: &ReportContext) {
        self.reports.write().push(CapturedReport {
            message: error.to_string(),
            context: context.clone(),
        });
    }
}

/// Forward `err` to `reporter` if its code is reportable. Returns whether it was sent.
pub fn report_error(reporter: &dyn ErrorReporter, err: &Error, context: &ReportContext) -> bool {
    let code = err.code();
    if !code.should_report() {
        return false;
    }
    let context = context.clone().tag("code", code.as_str());
    reporter.report(err, &context);
    true
}
