//! Task status transitions.
//!
//! The allowed moves are fixed (see [`TaskStatus::allowed_targets`]):
//!
//! ```text
//! Planned    -> InProgress | Blocked
//! InProgress -> Review | Blocked
//! Review     -> Done | InProgress
//! Blocked    -> InProgress
//! Done       -> (terminal)
//! ```

use crate::models::{Task, TaskStatus};
use crate::{Error, Result};

/// What a transition did to the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The task already had the requested status.
    Unchanged,
    /// The status was changed from `from`.
    Changed { from: TaskStatus },
}

impl TransitionOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, TransitionOutcome::Changed { .. })
    }
}

/// Apply `to` to `task` if the state table allows it.
///
/// A task whose stored status is missing or unknown has no legal moves.
pub fn transition(task: &mut Task, to: TaskStatus) -> Result<TransitionOutcome> {
    let current = task.status();
    if current == Some(to) {
        return Ok(TransitionOutcome::Unchanged);
    }

    match current {
        Some(from) if from.can_transition_to(to) => {
            task.set_status(to);
            Ok(TransitionOutcome::Changed { from })
        }
        _ => Err(Error::IllegalTransition {
            from: describe_status(task),
            to: to.to_string(),
        }),
    }
}

/// Status as shown in error messages, including unknown stored values.
pub fn describe_status(task: &Task) -> String {
    task.status_str().unwrap_or("(none)").to_string()
}
