//! Request correlation for HTTP handlers and the process-wide span.
//!
//! # Design
//! - The HTTP metrics layer opens a [`RequestContext`] scope around each handler future.
//! - Handlers read it back to tie archive ids to the `x-request-id` the client sees.
//! - Spawned tasks do not inherit the scope; capture values before spawning.

use std::future::Future;
use std::sync::Arc;

use tracing::{Span, span::Entered};

use crate::init::build_sha;

tokio::task_local! {
    static SCOPE: RequestContext;
}

/// Correlation data for one HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    request_id: Arc<str>,
    route: Arc<str>,
}

impl RequestContext {
    /// Context for `request_id` served by the matched `route`.
    #[must_use]
    pub fn new(request_id: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            request_id: Arc::from(request_id.into()),
            route: Arc::from(route.into()),
        }
    }

    /// The `x-request-id` value, empty when none was assigned.
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Matched route template.
    #[must_use]
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Context of the enclosing request scope, if any.
    #[must_use]
    pub fn current() -> Option<Self> {
        SCOPE.try_with(Clone::clone).ok()
    }
}

/// Request id of the enclosing request scope, if any.
#[must_use]
pub fn current_request_id() -> Option<String> {
    RequestContext::current().map(|context| context.request_id().to_owned())
}

/// Matched route of the enclosing request scope, if any.
#[must_use]
pub fn current_route() -> Option<String> {
    RequestContext::current().map(|context| context.route().to_owned())
}

/// Run `fut` with a [`RequestContext`] for `request_id` and `route` in scope.
pub async fn with_request_context<Fut, T>(
    request_id: impl Into<String>,
    route: impl Into<String>,
    fut: Fut,
) -> T
where
    Fut: Future<Output = T>,
{
    SCOPE.scope(RequestContext::new(request_id, route), fut).await
}

/// Keeps the process span (`app`, with mode and build SHA) entered until dropped.
pub struct GlobalContextGuard {
    _entered: Entered<'static>,
}

impl GlobalContextGuard {
    /// Enter the process span for `mode`.
    #[must_use]
    pub fn new(mode: impl Into<String>) -> Self {
        let mode = mode.into();
        let span: &'static Span = Box::leak(Box::new(tracing::info_span!(
            "app",
            mode = %mode,
            build_sha = %build_sha()
        )));
        Self {
            _entered: span.enter(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scope_is_visible_only_inside_the_future() {
        let seen = with_request_context("req-42", "/v1/archive/{*path}", async {
            (current_request_id(), current_route())
        })
        .await;
        assert_eq!(seen.0.as_deref(), Some("req-42"));
        assert_eq!(seen.1.as_deref(), Some("/v1/archive/{*path}"));
        assert!(RequestContext::current().is_none());
    }

    #[tokio::test]
    async fn spawned_tasks_do_not_inherit_the_scope() -> anyhow::Result<()> {
        let inherited = with_request_context("req-7", "/health", async {
            tokio::spawn(async { RequestContext::current() }).await
        })
        .await?;
        assert!(inherited.is_none());
        Ok(())
    }

    #[test]
    fn global_context_guard_can_be_dropped() {
        drop(GlobalContextGuard::new("test"));
    }
}
