//! Request context for one CLI command or one response-signing call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation data for one unit of work.
///
/// A context yields a span; everything logged inside carries the request id
/// and, once known, the record being worked on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Unique request identifier.
    pub request_id: Uuid,
    /// Request that spawned this one, for batch commands.
    pub parent_id: Option<Uuid>,
    /// Command or entry point (e.g. `"sign"`, `"api.response"`).
    pub command: String,
    /// Record kind being worked on.
    pub record_kind: Option<String>,
    /// Record primary key being worked on.
    pub record_id: Option<String>,
    /// When the request started.
    pub started_at: DateTime<Utc>,
}

impl RequestContext {
    /// Create a new request context.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            parent_id: None,
            command: command.into(),
            record_kind: None,
            record_id: None,
            started_at: Utc::now(),
        }
    }

    /// A context for one record inside a batch started by `self`.
    #[must_use]
    pub fn child(&self, kind: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            parent_id: Some(self.request_id),
            command: self.command.clone(),
            record_kind: Some(kind.into()),
            record_id: Some(record_id.into()),
            started_at: Utc::now(),
        }
    }

    /// Set the record being worked on.
    #[must_use]
    pub fn with_record(mut self, kind: impl Into<String>, record_id: impl Into<String>) -> Self {
        self.record_kind = Some(kind.into());
        self.record_id = Some(record_id.into());
        self
    }

    /// Milliseconds since the request started.
    #[must_use]
    pub fn elapsed_ms(&self) -> i64 {
        Utc::now()
            .signed_duration_since(self.started_at)
            .num_milliseconds()
    }

    /// Create a tracing span with this context.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "request",
            request_id = %self.short_id(),
            parent_id = self.parent_id.map(|id| id.to_string()),
            command = %self.command,
            kind = self.record_kind.as_deref(),
            record_id = self.record_id.as_deref(),
        )
    }

    /// First eight hex digits of the request id.
    #[must_use]
    pub fn short_id(&self) -> String {
        self.request_id.simple().to_string().chars().take(8).collect()
    }
}

/// Keeps a request's span entered and logs its duration on drop.
pub struct RequestGuard {
    context: RequestContext,
    _span: tracing::span::EnteredSpan,
}

impl RequestGuard {
    /// Enter `context`'s span.
    #[must_use]
    pub fn new(context: RequestContext) -> Self {
        let span = context.span().entered();
        tracing::debug!("request started");
        Self {
            context,
            _span: span,
        }
    }

    /// Get the request context.
    #[must_use]
    pub fn context(&self) -> &RequestContext {
        &self.context
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        tracing::debug!(elapsed_ms = self.context.elapsed_ms(), "request completed");
    }
}
