//! Request identity and execution context.
//!
//! Every inbound request gets a [`RequestId`] and runs under an
//! [`ExecContext`]. The context carries a cancellation token and an optional
//! deadline; tasks and targets observe it with [`ExecContext::cancelled`] or
//! wrap their own futures in [`ExecContext::run`].

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{HubError, HubResult};

/// A unique identifier for each request, using UUID v7.
///
/// UUID v7 is time-ordered, which keeps log correlation sortable.
///
/// ```
/// use hubwork_core::RequestId;
///
/// let a = RequestId::new();
/// let b = RequestId::new();
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<RequestId> for Uuid {
    fn from(id: RequestId) -> Self {
        id.0
    }
}

/// Cancellable execution context handed to every task and target.
///
/// Cloning is cheap; clones share the same token. A child created with
/// [`child_with_timeout`](Self::child_with_timeout) is cancelled whenever its
/// parent is, and additionally expires at its own deadline.
///
/// ```
/// use std::time::Duration;
/// use hubwork_core::ExecContext;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let root = ExecContext::new();
/// let child = root.child_with_timeout(Duration::from_secs(5));
/// assert!(child.deadline().is_some());
///
/// root.cancel();
/// assert!(child.is_cancelled());
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ExecContext {
    token: CancellationToken,
    deadline: Option<Instant>,
    request_id: Option<RequestId>,
}

impl ExecContext {
    /// Creates a root context with a fresh token and no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    /// Creates a root context driven by an externally owned token.
    ///
    /// The HTTP listener uses this to tie a request to its connection.
    #[must_use]
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
            request_id: None,
        }
    }

    /// Returns a copy tagged with the given request ID.
    #[must_use]
    pub fn for_request(&self, request_id: RequestId) -> Self {
        Self {
            token: self.token.clone(),
            deadline: self.deadline,
            request_id: Some(request_id),
        }
    }

    /// Derives a child context that expires after `timeout`.
    ///
    /// The child's deadline never extends past the parent's.
    #[must_use]
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) if parent < candidate => parent,
            _ => candidate,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
            request_id: self.request_id,
        }
    }

    /// The request this context belongs to, when known.
    #[must_use]
    pub fn request_id(&self) -> Option<RequestId> {
        self.request_id
    }

    /// The instant after which work should stop, if bounded.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when unbounded.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns true once cancelled or past the deadline.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
            || self
                .deadline
                .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Cancels this context and every child derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Completes when the context is cancelled or its deadline passes.
    pub async fn cancelled(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.token.cancelled() => {}
                    () = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Runs `fut` to completion unless the context ends first.
    ///
    /// On cancellation the future is dropped and [`HubError::Cancelled`] is
    /// returned.
    pub async fn run<T, F>(&self, fut: F) -> HubResult<T>
    where
        F: Future<Output = HubResult<T>>,
    {
        if self.is_cancelled() {
            return Err(self.cancellation_error());
        }
        tokio::select! {
            biased;
            result = fut => result,
            () = self.cancelled() => Err(self.cancellation_error()),
        }
    }

    fn cancellation_error(&self) -> HubError {
        if self.token.is_cancelled() {
            HubError::cancelled("execution context was cancelled")
        } else {
            HubError::cancelled("deadline exceeded")
        }
    }
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::new()
    }
}
