//! Test fixtures for Hubwork development and testing.
//!
//! Small tasks and targets with observable behavior, shared by the unit and
//! integration tests of every Hubwork crate.
//!
//! ```
//! use hubwork_core::fixtures::{MarkerTask, EchoTarget};
//!
//! let task = MarkerTask::new("A");
//! let target = EchoTarget::new();
//! assert_eq!(target.calls(), 0);
//! # let _ = task;
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use thiserror::Error;

use crate::context::ExecContext;
use crate::error::{HubError, HubResult};
use crate::plugin::{Target, Task};
use crate::request::CanonicalRequest;
use crate::response::CanonicalResponse;

/// Appends its marker to the request body, or to the attached response body
/// when one is present.
#[derive(Debug, Clone)]
pub struct MarkerTask {
    marker: String,
}

impl MarkerTask {
    /// Creates a task that appends `marker`.
    #[must_use]
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }
}

#[async_trait]
impl Task for MarkerTask {
    fn name(&self) -> &str {
        &self.marker
    }

    async fn apply(&self, _ctx: &ExecContext, request: &mut CanonicalRequest) -> HubResult<()> {
        if let Some(response) = request.response_mut() {
            let mut body = response.body().to_vec();
            body.extend_from_slice(self.marker.as_bytes());
            response.set_body(body);
        } else {
            let mut body = request.body().to_vec();
            body.extend_from_slice(self.marker.as_bytes());
            request.set_body(body);
        }
        Ok(())
    }
}

/// Error raised by [`FailingTask`] and [`FailingTarget`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("fixture failure: {0}")]
pub struct FixtureError(pub String);

/// Always fails with a [`FixtureError`] naming the task.
#[derive(Debug, Clone)]
pub struct FailingTask {
    name: String,
}

impl FailingTask {
    /// Creates a failing task.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Task for FailingTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, _ctx: &ExecContext, _request: &mut CanonicalRequest) -> HubResult<()> {
        Err(HubError::plugin(FixtureError(self.name.clone())))
    }
}

/// Sleeps until the context is cancelled or the delay passes.
#[derive(Debug, Clone)]
pub struct SlowTask {
    delay: Duration,
}

impl SlowTask {
    /// Creates a task that waits `delay`.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Task for SlowTask {
    fn name(&self) -> &str {
        "slow"
    }

    async fn apply(&self, ctx: &ExecContext, _request: &mut CanonicalRequest) -> HubResult<()> {
        ctx.run(async {
            tokio::time::sleep(self.delay).await;
            Ok(())
        })
        .await
    }
}

/// Echoes the request body with status 200 and counts invocations.
#[derive(Debug, Default)]
pub struct EchoTarget {
    calls: AtomicUsize,
}

impl EchoTarget {
    /// Creates a shared echo target.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// How many times the target ran.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Target for EchoTarget {
    async fn apply(
        &self,
        _ctx: &ExecContext,
        request: &mut CanonicalRequest,
    ) -> HubResult<Option<CanonicalResponse>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(
            CanonicalResponse::new(StatusCode::OK).with_body(request.body().clone()),
        ))
    }
}

/// Returns a clone of a fixed response.
#[derive(Debug)]
pub struct StaticTarget {
    response: CanonicalResponse,
    calls: AtomicUsize,
}

impl StaticTarget {
    /// Creates a target that always answers `response`.
    #[must_use]
    pub fn new(response: CanonicalResponse) -> Self {
        Self {
            response,
            calls: AtomicUsize::new(0),
        }
    }

    /// How many times the target ran.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Target for StaticTarget {
    async fn apply(
        &self,
        _ctx: &ExecContext,
        _request: &mut CanonicalRequest,
    ) -> HubResult<Option<CanonicalResponse>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(self.response.clone()))
    }
}

/// Reports success without a response.
#[derive(Debug, Default)]
pub struct EmptyTarget;

#[async_trait]
impl Target for EmptyTarget {
    async fn apply(
        &self,
        _ctx: &ExecContext,
        _request: &mut CanonicalRequest,
    ) -> HubResult<Option<CanonicalResponse>> {
        Ok(None)
    }
}

/// Always fails with a [`FixtureError`].
#[derive(Debug)]
pub struct FailingTarget {
    reason: String,
}

impl FailingTarget {
    /// Creates a failing target.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Target for FailingTarget {
    async fn apply(
        &self,
        _ctx: &ExecContext,
        _request: &mut CanonicalRequest,
    ) -> HubResult<Option<CanonicalResponse>> {
        Err(HubError::plugin(FixtureError(self.reason.clone())))
    }
}
