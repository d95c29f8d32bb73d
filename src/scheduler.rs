//! Readiness-gated task selection.
//!
//! A task is runnable when it is `Planned` and every entry of its `deps`
//! names a task that is currently `Done`. Among runnable tasks the lowest
//! priority rank wins, with store order breaking ties.
//!
//! Selection works on a snapshot and reserves nothing; callers are expected
//! to move the picked task to `InProgress` right away.

use crate::models::{Task, TaskStatus};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Ids of every task currently `Done`.
fn done_ids(tasks: &[Task]) -> HashSet<&str> {
    tasks
        .iter()
        .filter(|t| t.status() == Some(TaskStatus::Done))
        .filter_map(Task::id)
        .collect()
}

fn dep_satisfied(dep: &Value, done: &HashSet<&str>) -> bool {
    dep.as_str().is_some_and(|id| done.contains(id))
}

/// All runnable tasks in scheduling order.
///
/// Dependencies on ids that are not in the store never count as satisfied.
pub fn runnable_tasks(tasks: &[Task]) -> Vec<&Task> {
    let done = done_ids(tasks);
    let mut candidates: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.status() == Some(TaskStatus::Planned))
        .filter(|t| t.deps().iter().all(|dep| dep_satisfied(dep, &done)))
        .collect();
    // sort_by_key is stable, so equal ranks keep store order
    candidates.sort_by_key(|t| t.priority_rank());
    candidates
}

/// The next task to run, or `None` when nothing is runnable.
pub fn next_runnable(tasks: &[Task]) -> Option<&Task> {
    runnable_tasks(tasks).into_iter().next()
}

/// Why a dependency is holding a task back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnmetReason {
    /// No task with this id exists.
    Missing,
    /// The dependency exists but is not `Done`.
    NotDone { status: Option<String> },
    /// The `deps` entry is not a string id.
    InvalidEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmetDependency {
    pub dep: String,
    #[serde(flatten)]
    pub reason: UnmetReason,
}

/// A planned task that cannot run yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockedTask {
    pub id: Option<String>,
    pub priority_rank: u8,
    pub unmet: Vec<UnmetDependency>,
}

/// Planned tasks with at least one unmet dependency, in store order.
pub fn blocked_tasks(tasks: &[Task]) -> Vec<BlockedTask> {
    let by_id: HashMap<&str, &Task> = tasks.iter().filter_map(|t| Some((t.id()?, t))).collect();

    tasks
        .iter()
        .filter(|t| t.status() == Some(TaskStatus::Planned))
        .filter_map(|task| {
            let unmet: Vec<UnmetDependency> = task
                .deps()
                .iter()
                .filter_map(|dep| {
                    let Some(dep_id) = dep.as_str() else {
                        return Some(UnmetDependency {
                            dep: dep.to_string(),
                            reason: UnmetReason::InvalidEntry,
                        });
                    };
                    let reason = match by_id.get(dep_id) {
                        None => UnmetReason::Missing,
                        Some(t) if t.status() == Some(TaskStatus::Done) => return None,
                        Some(t) => UnmetReason::NotDone {
                            status: t.status_str().map(str::to_string),
                        },
                    };
                    Some(UnmetDependency {
                        dep: dep_id.to_string(),
                        reason,
                    })
                })
                .collect();
            if unmet.is_empty() {
                None
            } else {
                Some(BlockedTask {
                    id: task.id().map(str::to_string),
                    priority_rank: task.priority_rank(),
                    unmet,
                })
            }
        })
        .collect()
}

/// Dependency cycles among `Planned` tasks.
///
/// Tasks caught in a cycle can never become runnable, which `next_runnable`
/// does not report on its own. Each cycle is returned once, as the ids along
/// the cycle starting from the task that appears first in the store.
pub fn dependency_cycles(tasks: &[Task]) -> Vec<Vec<String>> {
    let planned: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.status() == Some(TaskStatus::Planned))
        .collect();
    let index: HashMap<&str, usize> = planned
        .iter()
        .enumerate()
        .filter_map(|(i, t)| Some((t.id()?, i)))
        .collect();
    let edges: Vec<Vec<usize>> = planned
        .iter()
        .map(|t| {
            t.deps()
                .iter()
                .filter_map(|d| d.as_str())
                .filter_map(|d| index.get(d).copied())
                .collect()
        })
        .collect();

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        New,
        OnStack,
        Finished,
    }

    let mut marks = vec![Mark::New; planned.len()];
    let mut cycles: Vec<Vec<usize>> = Vec::new();

    for root in 0..planned.len() {
        if marks[root] != Mark::New {
            continue;
        }
        // Iterative DFS: (node, next edge to visit)
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        marks[root] = Mark::OnStack;
        while let Some(&(node, next)) = stack.last() {
            if let Some(&target) = edges[node].get(next) {
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                match marks[target] {
                    Mark::New => {
                        marks[target] = Mark::OnStack;
                        stack.push((target, 0));
                    }
                    Mark::OnStack => {
                        let start = stack.iter().position(|&(n, _)| n == target).unwrap_or(0);
                        cycles.push(stack[start..].iter().map(|&(n, _)| n).collect());
                    }
                    Mark::Finished => {}
                }
            } else {
                marks[node] = Mark::Finished;
                stack.pop();
            }
        }
    }

    let mut seen: HashSet<Vec<usize>> = HashSet::new();
    cycles
        .into_iter()
        .filter_map(|mut cycle| {
            let min_pos = cycle
                .iter()
                .enumerate()
                .min_by_key(|&(_, n)| *n)
                .map(|(i, _)| i)
                .unwrap_or(0);
            cycle.rotate_left(min_pos);
            if seen.insert(cycle.clone()) {
                Some(
                    cycle
                        .into_iter()
                        .filter_map(|n| planned[n].id().map(str::to_string))
                        .collect(),
                )
            } else {
                None
            }
        })
        .collect()
}
