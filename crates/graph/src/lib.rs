//! Pipeline-to-DAG elaboration (§4.4).
//!
//! [`elaborate`] runs the seven-pass pipeline described in the design: matrix
//! expansion, group flattening, capability resolution, `input_from` edges,
//! edge dedup, condition pruning, and validation — turning a declarative
//! [`Pipeline`] into an immutable [`ElaboratedGraph`] the scheduler can
//! drive directly.

mod capabilities;
mod edges;
mod error;
mod groups;
mod matrix;
mod validate;

pub use error::{GraphError, Result, ValidationError};

use sykli_core::ir::{Pipeline, RunContext, Task};
use tracing::instrument;

/// One task as it will be scheduled: concrete (post matrix-expansion) and
/// with its `depends_on` fully resolved and deduplicated.
#[derive(Debug, Clone)]
pub struct ElaboratedTask {
    pub task: Task,
    /// `Some` when pass 6 evaluated the task's `when` to false. The task
    /// still appears in the graph — its successors treat it as a
    /// permitted, non-blocking predecessor (§4.7 "skipped-but-permitted").
    pub skip_reason: Option<SkipReason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ConditionFalse,
}

/// The output of the elaborator: an immutable set of concrete tasks plus
/// their gates, ready for the scheduler.
#[derive(Debug, Clone)]
pub struct ElaboratedGraph {
    pub tasks: Vec<ElaboratedTask>,
    pub gates: Vec<sykli_core::ir::Gate>,
}

impl ElaboratedGraph {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ElaboratedTask> {
        self.tasks.iter().find(|t| t.task.name == name)
    }

    /// Names with no predecessors — the scheduler's initial frontier.
    #[must_use]
    pub fn roots(&self) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|t| t.task.depends_on.is_empty())
            .map(|t| t.task.name.as_str())
            .collect()
    }

    /// Direct successors of `name` (tasks that list it in `depends_on`).
    #[must_use]
    pub fn successors_of<'a>(&'a self, name: &str) -> Vec<&'a str> {
        self.tasks
            .iter()
            .filter(|t| t.task.depends_on.iter().any(|d| d == name))
            .map(|t| t.task.name.as_str())
            .collect()
    }
}

/// Run the full seven-pass elaboration described in §4.4.
///
/// # Errors
/// Returns `GraphError::MissingCapability` if a `needs` has no matching
/// `provides` (step 3), `GraphError::Condition` if a `when` string fails to
/// parse (step 6), or `GraphError::Validation` with every violation found
/// in step 7.
#[instrument(skip_all, fields(pipeline = %pipeline.name))]
pub fn elaborate(pipeline: &Pipeline, ctx: &RunContext) -> Result<ElaboratedGraph> {
    let (mut tasks, groups) = matrix::expand(pipeline);

    groups::flatten(&mut tasks, &groups);
    capabilities::resolve(&mut tasks)?;
    edges::resolve_input_from(&mut tasks);
    edges::dedup(&mut tasks);

    let mut elaborated = Vec::with_capacity(tasks.len());
    for task in tasks {
        let permitted = sykli_condition::evaluate_optional(task.when.as_ref(), ctx)
            .map_err(|source| GraphError::Condition { task: task.name.clone(), source })?;
        let skip_reason = (!permitted).then_some(SkipReason::ConditionFalse);
        elaborated.push(ElaboratedTask { task, skip_reason });
    }

    let plain_tasks: Vec<Task> = elaborated.iter().map(|t| t.task.clone()).collect();
    validate::validate(&plain_tasks, &pipeline.gates).map_err(GraphError::Validation)?;

    Ok(ElaboratedGraph {
        tasks: elaborated,
        gates: pipeline.gates.clone(),
    })
}
