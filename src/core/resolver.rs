//! Dependency readiness.
//!
//! Pure functions over a `Workflow`: nothing here mutates state or touches
//! storage. Dependencies are always walked in declaration order so the
//! reported blocker is stable between calls.

use crate::core::error::PincerError;
use crate::core::model::{TaskDef, TaskStatus, Workflow};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readiness {
    pub ready: bool,
    pub reason: String,
}

impl Readiness {
    fn ready() -> Self {
        Self {
            ready: true,
            reason: "all dependencies completed".to_string(),
        }
    }

    fn blocked(dependency: &str, status: TaskStatus) -> Self {
        Self {
            ready: false,
            reason: format!("dependency '{}' is {}", dependency, status),
        }
    }
}

pub fn is_ready(workflow: &Workflow, task_id: &str) -> Result<Readiness, PincerError> {
    let task = workflow.require_task(task_id)?;
    for dep_id in &task.depends_on {
        let dep = workflow
            .task(dep_id)
            .ok_or_else(|| PincerError::UnknownDependency {
                task_id: task.id.clone(),
                dependency: dep_id.clone(),
            })?;
        if dep.status != TaskStatus::Completed {
            return Ok(Readiness::blocked(dep_id, dep.status));
        }
    }
    Ok(Readiness::ready())
}

/// Checks a workflow definition before anything is created: unique IDs, no
/// dangling dependencies, no cycles.
pub fn validate_definition(tasks: &[TaskDef]) -> Result<(), PincerError> {
    let mut seen = HashSet::new();
    for def in tasks {
        if !seen.insert(def.id.as_str()) {
            return Err(PincerError::DuplicateTask(def.id.clone()));
        }
    }
    for def in tasks {
        for dep in &def.depends_on {
            if !seen.contains(dep.as_str()) {
                return Err(PincerError::UnknownDependency {
                    task_id: def.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }
    if let Some(cycle) = find_cycle(tasks) {
        return Err(PincerError::DependencyCycle(cycle));
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

/// Depth-first search with an explicit stack of `(node, next dependency
/// index)` frames, so arbitrarily long chains never touch the call stack.
/// Returns the first cycle found, with its entry node repeated at the end.
fn find_cycle(tasks: &[TaskDef]) -> Option<Vec<String>> {
    let index: HashMap<&str, usize> = tasks
        .iter()
        .enumerate()
        .map(|(i, t)| (t.id.as_str(), i))
        .collect();
    let mut marks = vec![Mark::Unvisited; tasks.len()];
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for start in 0..tasks.len() {
        if marks[start] != Mark::Unvisited {
            continue;
        }
        marks[start] = Mark::Visiting;
        stack.push((start, 0));

        while let Some(frame) = stack.last_mut() {
            let (node, next_dep) = *frame;
            let Some(dep) = tasks[node].depends_on.get(next_dep) else {
                marks[node] = Mark::Done;
                stack.pop();
                continue;
            };
            frame.1 += 1;
            let Some(&next) = index.get(dep.as_str()) else {
                continue;
            };
            match marks[next] {
                Mark::Visiting => {
                    let pos = stack.iter().position(|&(n, _)| n == next).unwrap_or(0);
                    let mut cycle: Vec<String> = stack[pos..]
                        .iter()
                        .map(|&(n, _)| tasks[n].id.clone())
                        .collect();
                    cycle.push(tasks[next].id.clone());
                    return Some(cycle);
                }
                Mark::Unvisited => {
                    marks[next] = Mark::Visiting;
                    stack.push((next, 0));
                }
                Mark::Done => {}
            }
        }
    }
    None
}
