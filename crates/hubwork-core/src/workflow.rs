//! Precedence-ordered workflows.
//!
//! Steps are bucketed by precedence. Buckets run in ascending precedence;
//! steps inside one bucket run in the order they were added.
//!
//! ```text
//!  added:   A(10)  B(0)  C(10)  D(-5)
//!  buckets: -5:[D]   0:[B]   10:[A, C]
//!  runs:    D → B → A → C
//! ```
//!
//! The first failing step aborts the workflow and its error is returned as
//! is. Mutations made by earlier steps are kept.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::Instrument;

use crate::context::ExecContext;
use crate::error::HubResult;
use crate::plugin::Task;
use crate::request::CanonicalRequest;

/// One configured step: a bound task plus its ordering and diagnostics.
#[derive(Clone)]
pub struct WorkflowStep {
    name: String,
    precedence: i32,
    task_type: String,
    description: Option<String>,
    task: Arc<dyn Task>,
}

impl WorkflowStep {
    /// Creates a step running `task` at `precedence`.
    pub fn new(name: impl Into<String>, precedence: i32, task: Arc<dyn Task>) -> Self {
        Self {
            name: name.into(),
            precedence,
            task_type: String::new(),
            description: None,
            task,
        }
    }

    /// Records the registry name the task was built from.
    #[must_use]
    pub fn with_task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = task_type.into();
        self
    }

    /// Attaches a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Step name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ordering value; lower runs earlier.
    pub fn precedence(&self) -> i32 {
        self.precedence
    }

    /// Registry name of the task type.
    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    /// Optional description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The bound task.
    pub fn task(&self) -> &Arc<dyn Task> {
        &self.task
    }
}

impl fmt::Debug for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowStep")
            .field("name", &self.name)
            .field("precedence", &self.precedence)
            .field("task_type", &self.task_type)
            .field("task", &self.task.name())
            .finish_non_exhaustive()
    }
}

/// An ordered chain of steps applied to one request.
///
/// ```
/// use std::sync::Arc;
/// use hubwork_core::{Workflow, WorkflowStep};
/// use hubwork_core::fixtures::MarkerTask;
///
/// let workflow: Workflow = [
///     WorkflowStep::new("late", 10, Arc::new(MarkerTask::new("L"))),
///     WorkflowStep::new("early", 1, Arc::new(MarkerTask::new("E"))),
/// ]
/// .into_iter()
/// .collect();
///
/// let order: Vec<&str> = workflow.steps().map(|s| s.name()).collect();
/// assert_eq!(order, ["early", "late"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Workflow {
    buckets: BTreeMap<i32, Vec<WorkflowStep>>,
}

impl Workflow {
    /// Creates an empty workflow.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a step after every step already sharing its precedence.
    pub fn push(&mut self, step: WorkflowStep) {
        self.buckets.entry(step.precedence).or_default().push(step);
    }

    /// Builder form of [`push`](Self::push).
    #[must_use]
    pub fn with_step(mut self, step: WorkflowStep) -> Self {
        self.push(step);
        self
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Whether there are no steps.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Distinct precedence values, ascending.
    pub fn precedences(&self) -> impl Iterator<Item = i32> + '_ {
        self.buckets.keys().copied()
    }

    /// Steps in execution order.
    pub fn steps(&self) -> impl Iterator<Item = &WorkflowStep> {
        self.buckets.values().flatten()
    }

    /// Runs every step against `request`, stopping at the first error.
    pub async fn apply(&self, ctx: &ExecContext, request: &mut CanonicalRequest) -> HubResult<()> {
        for step in self.steps() {
            let span = tracing::debug_span!(
                "workflow_step",
                step = %step.name,
                task_type = %step.task_type,
                precedence = step.precedence,
            );
            if let Err(err) = step.task.apply(ctx, request).instrument(span).await {
                tracing::debug!(
                    step = %step.name,
                    precedence = step.precedence,
                    error = %err,
                    "workflow aborted"
                );
                return Err(err);
            }
        }
        Ok(())
    }
}

impl FromIterator<WorkflowStep> for Workflow {
    fn from_iter<I: IntoIterator<Item = WorkflowStep>>(iter: I) -> Self {
        let mut workflow = Self::new();
        for step in iter {
            workflow.push(step);
        }
        workflow
    }
}

impl Extend<WorkflowStep> for Workflow {
    fn extend<I: IntoIterator<Item = WorkflowStep>>(&mut self, iter: I) {
        for step in iter {
            self.push(step);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{FailingTask, FixtureError, MarkerTask};
    use crate::method::HttpMethod;
    use http::Uri;

    fn marker(name: &str, precedence: i32) -> WorkflowStep {
        WorkflowStep::new(name, precedence, Arc::new(MarkerTask::new(name)))
            .with_task_type("marker")
    }

    fn request() -> CanonicalRequest {
        CanonicalRequest::builder(HttpMethod::Post, Uri::from_static("/api/svc")).build()
    }

    #[tokio::test]
    async fn test_precedence_then_insertion_order() {
        let workflow: Workflow = [
            marker("A", 10),
            marker("B", 0),
            marker("C", 10),
            marker("D", -5),
            marker("E", 0),
        ]
        .into_iter()
        .collect();

        let mut req = request();
        workflow.apply(&ExecContext::new(), &mut req).await.unwrap();
        assert_eq!(req.body().as_ref(), b"DBEAC");
        assert_eq!(workflow.precedences().collect::<Vec<_>>(), vec![-5, 0, 10]);
        assert_eq!(workflow.len(), 5);
    }

    #[tokio::test]
    async fn test_first_error_aborts() {
        let workflow = Workflow::new()
            .with_step(marker("A", 1))
            .with_step(WorkflowStep::new("B", 2, Arc::new(FailingTask::new("B"))))
            .with_step(marker("C", 3));

        let mut req = request();
        let err = workflow
            .apply(&ExecContext::new(), &mut req)
            .await
            .unwrap_err();

        assert_eq!(
            err.plugin_error::<FixtureError>(),
            Some(&FixtureError("B".to_string()))
        );
        assert_eq!(req.body().as_ref(), b"A");
    }

    #[tokio::test]
    async fn test_error_in_same_bucket_skips_rest_of_bucket() {
        let workflow = Workflow::new()
            .with_step(WorkflowStep::new("fail", 0, Arc::new(FailingTask::new("fail"))))
            .with_step(marker("after", 0));

        let mut req = request();
        assert!(workflow.apply(&ExecContext::new(), &mut req).await.is_err());
        assert!(req.body().is_empty());
    }

    #[tokio::test]
    async fn test_empty_workflow_is_noop() {
        let workflow = Workflow::new();
        let mut req = request();
        workflow.apply(&ExecContext::new(), &mut req).await.unwrap();
        assert!(workflow.is_empty());
        assert!(req.body().is_empty());
    }

    #[test]
    fn test_step_debug_names_task() {
        let step = marker("audit", 3).with_description("writes audit trail");
        let debug = format!("{step:?}");
        assert!(debug.contains("audit"));
        assert_eq!(step.description(), Some("writes audit trail"));
        assert_eq!(step.task_type(), "marker");
    }
}
