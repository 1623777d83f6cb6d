//! Structural validation of the task graph.
//!
//! Three checks run in order:
//!
//! 1. **Uniqueness**: every task id appears once
//! 2. **References**: every `depends_on` entry names an existing task
//! 3. **Acyclicity**: DFS with a recursion stack, reporting the cycle path
//!
//! Cycle detection only runs once the first two pass, since it needs every
//! edge to point at a real node. The same checks are applied to the task list
//! as written and again to the graph after per-sample expansion.
//!
//! # Example
//! ```rust
//! use phylowood::config::validate_dependency_graph;
//! use phylowood::errors::ValidationError;
//!
//! let align = ("align", vec![]);
//! let tree = ("tree", vec!["align".to_string(), "missing".to_string()]);
//!
//! let errors = validate_dependency_graph([align, tree].iter().map(|(id, deps)| (*id, deps.as_slice())))
//!     .unwrap_err();
//! assert_eq!(
//!     errors,
//!     vec![ValidationError::UnresolvedDependency {
//!         task_id: "tree".into(),
//!         missing_dependency: "missing".into(),
//!     }]
//! );
//! ```

use crate::errors::ValidationError;
use std::collections::{HashMap, HashSet};

/// Validate a dependency graph given as `(task id, depends_on)` pairs.
///
/// Errors accumulate so the whole list can be fixed in one pass; cycle
/// detection is skipped while reference errors remain.
pub fn validate_dependency_graph<'a, I>(nodes: I) -> Result<(), Vec<ValidationError>>
where
    I: IntoIterator<Item = (&'a str, &'a [String])>,
{
    let nodes: Vec<(&str, &[String])> = nodes.into_iter().collect();
    let mut errors = Vec::new();

    if let Err(duplicate_errors) = validate_unique_task_ids(&nodes) {
        errors.extend(duplicate_errors);
    }

    if let Err(unresolved_errors) = validate_dependency_references(&nodes) {
        errors.extend(unresolved_errors);
    }

    if errors.is_empty() {
        if let Err(cycle_errors) = validate_acyclic_graph(&nodes) {
            errors.extend(cycle_errors);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_unique_task_ids(nodes: &[(&str, &[String])]) -> Result<(), Vec<ValidationError>> {
    let mut seen_ids = HashSet::new();
    let mut errors = Vec::new();

    for (id, _) in nodes {
        if !seen_ids.insert(*id) {
            errors.push(ValidationError::DuplicateTaskId {
                task_id: id.to_string(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_dependency_references(
    nodes: &[(&str, &[String])],
) -> Result<(), Vec<ValidationError>> {
    let task_ids: HashSet<&str> = nodes.iter().map(|(id, _)| *id).collect();
    let mut errors = Vec::new();

    for (id, depends_on) in nodes {
        for dependency in depends_on.iter() {
            if !task_ids.contains(dependency.as_str()) {
                errors.push(ValidationError::UnresolvedDependency {
                    task_id: id.to_string(),
                    missing_dependency: dependency.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Three-color DFS over the forward graph (dependency → dependents).
///
/// Roots are visited in declaration order so the reported cycle is stable
/// from run to run.
fn validate_acyclic_graph(nodes: &[(&str, &[String])]) -> Result<(), Vec<ValidationError>> {
    let mut graph: HashMap<&str, Vec<&str>> = HashMap::new();
    for (id, _) in nodes {
        graph.insert(id, Vec::new());
    }
    for (id, depends_on) in nodes {
        for dependency in depends_on.iter() {
            if let Some(dependents) = graph.get_mut(dependency.as_str()) {
                dependents.push(id);
            }
        }
    }

    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    for (id, _) in nodes {
        if !visited.contains(*id) {
            if let Some(cycle) =
                dfs_cycle_detection(id, &graph, &mut visited, &mut rec_stack, &mut path)
            {
                return Err(vec![ValidationError::CyclicDependency { cycle }]);
            }
        }
    }

    Ok(())
}

/// Returns the cycle path, closed by repeating its first node, when a back
/// edge is found below `node`.
fn dfs_cycle_detection<'a>(
    node: &'a str,
    graph: &HashMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    if let Some(neighbors) = graph.get(node) {
        for &neighbor in neighbors {
            if !visited.contains(neighbor) {
                if let Some(cycle) = dfs_cycle_detection(neighbor, graph, visited, rec_stack, path)
                {
                    return Some(cycle);
                }
            } else if rec_stack.contains(neighbor) {
                let cycle_start = path.iter().position(|x| *x == neighbor).unwrap_or(0);
                let mut cycle: Vec<String> =
                    path[cycle_start..].iter().map(|s| s.to_string()).collect();
                cycle.push(neighbor.to_string());
                return Some(cycle);
            }
        }
    }

    rec_stack.remove(node);
    path.pop();
    None
}
