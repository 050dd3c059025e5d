// Copyright 2026 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Evaluation orderings by topological sort over reference graphs: one
//! each for step-time auxiliaries, step-time levels, and init-time
//! variables. Records are identified by refId throughout.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::analysis_err;
use crate::common::{RefId, Result, TIME_VAR};
use crate::variable::{VariableTable, VarType};

/// Step-time ordering of the auxiliaries.
pub fn aux_ordering(variables: &VariableTable) -> Result<Vec<RefId>> {
    step_ordering(variables, VarType::Aux)
}

/// Step-time ordering of the levels. Level-to-level references invert,
/// so a level's next value reads the previous step of other levels and
/// mutually-referencing stocks do not cycle.
pub fn level_ordering(variables: &VariableTable) -> Result<Vec<RefId>> {
    step_ordering(variables, VarType::Level)
}

fn step_ordering(variables: &VariableTable, target: VarType) -> Result<Vec<RefId>> {
    let nodes: Vec<RefId> = variables
        .iter()
        .filter(|v| v.var_type == target)
        .map(|v| v.ref_id.clone())
        .collect();

    let mut edges: Vec<(RefId, RefId)> = Vec::new();
    for var in variables.iter().filter(|v| v.var_type == target) {
        for r in var.references.iter() {
            if variables.var_type_of(r) != Some(target) {
                continue;
            }
            if *r == var.ref_id {
                // a level integrating itself imposes no ordering
                continue;
            }
            if target == VarType::Level {
                edges.push((r.clone(), var.ref_id.clone()));
            } else {
                edges.push((var.ref_id.clone(), r.clone()));
            }
        }
    }

    if target == VarType::Level {
        // mutually-referencing stocks produce both directions; the pair
        // imposes no satisfiable ordering (both read previous-step
        // values), so it drops out entirely
        let all: BTreeSet<(RefId, RefId)> = edges.iter().cloned().collect();
        edges.retain(|(a, b)| !all.contains(&(b.clone(), a.clone())));
    }

    topo_sort(&nodes, &edges)
}

/// Init-time ordering: the transitive init-reference closure of every
/// record with an initial value, topologically ordered, with records
/// that carry no init-time code removed.
pub fn init_ordering(variables: &VariableTable) -> Result<Vec<RefId>> {
    let seeds: Vec<RefId> = variables
        .iter()
        .filter(|v| v.has_init_value)
        .map(|v| v.ref_id.clone())
        .collect();

    let mut closure: BTreeSet<RefId> = seeds.iter().cloned().collect();
    let mut edges: Vec<(RefId, RefId)> = Vec::new();
    let mut queue: VecDeque<RefId> = seeds.iter().cloned().collect();
    while let Some(ref_id) = queue.pop_front() {
        let var = match variables.get_by_ref_id(&ref_id) {
            Some(var) => var,
            None => continue,
        };
        let deps = if !var.init_references.is_empty() {
            &var.init_references
        } else {
            &var.references
        };
        for dep in deps.iter() {
            if *dep == ref_id {
                continue;
            }
            edges.push((ref_id.clone(), dep.clone()));
            if closure.insert(dep.clone()) {
                queue.push_back(dep.clone());
            }
        }
    }

    let nodes: Vec<RefId> = closure.into_iter().collect();
    let ordered = topo_sort(&nodes, &edges)?;
    Ok(ordered
        .into_iter()
        .filter(|r| {
            !matches!(
                variables.var_type_of(r),
                Some(VarType::Const) | Some(VarType::Lookup) | Some(VarType::Data)
            ) && r != TIME_VAR
        })
        .collect())
}

/// Kahn's algorithm over an edge list, where an edge `(v, r)` reads "v
/// depends on r". The sorted graph is reversed so prerequisites come
/// first; nodes with no edges are prepended, sorted by refId. Iteration
/// is over ordered sets, so the result is deterministic.
pub(crate) fn topo_sort(nodes: &[RefId], edges: &[(RefId, RefId)]) -> Result<Vec<RefId>> {
    let mut successors: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for (v, r) in edges.iter() {
        successors.entry(v.as_str()).or_default().insert(r.as_str());
        successors.entry(r.as_str()).or_default();
    }

    let mut in_degree: BTreeMap<&str, usize> = successors.keys().map(|&n| (n, 0)).collect();
    for succs in successors.values() {
        for &r in succs.iter() {
            *in_degree.get_mut(r).unwrap() += 1;
        }
    }

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&n, _)| n)
        .collect();
    let mut ordered: Vec<&str> = Vec::with_capacity(successors.len());
    while let Some(&node) = ready.iter().next() {
        ready.remove(node);
        ordered.push(node);
        for &succ in successors[node].iter() {
            let d = in_degree.get_mut(succ).unwrap();
            *d -= 1;
            if *d == 0 {
                ready.insert(succ);
            }
        }
    }

    if ordered.len() != successors.len() {
        let member = in_degree
            .iter()
            .find(|(_, &d)| d > 0)
            .map(|(&n, _)| n.to_string())
            .unwrap_or_default();
        return analysis_err!(DependencyCycle, member);
    }

    ordered.reverse();

    let in_graph: BTreeSet<&str> = successors.keys().copied().collect();
    let mut isolated: Vec<RefId> = nodes
        .iter()
        .filter(|n| !in_graph.contains(n.as_str()))
        .cloned()
        .collect();
    isolated.sort();
    isolated.dedup();

    // only keep graph nodes that are actual records of the target set
    let node_set: BTreeSet<&str> = nodes.iter().map(|n| n.as_str()).collect();
    isolated.extend(
        ordered
            .into_iter()
            .filter(|n| node_set.contains(n))
            .map(|n| n.to_string()),
    );
    Ok(isolated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(ids: &[&str]) -> Vec<RefId> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn pairs(pairs: &[(&str, &str)]) -> Vec<(RefId, RefId)> {
        pairs
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect()
    }

    #[test]
    fn test_topo_sort_prerequisites_first() {
        // y depends on x, z depends on y
        let order = topo_sort(
            &ids(&["_x", "_y", "_z"]),
            &pairs(&[("_y", "_x"), ("_z", "_y")]),
        )
        .unwrap();
        assert_eq!(ids(&["_x", "_y", "_z"]), order);
    }

    #[test]
    fn test_topo_sort_isolated_prepended_sorted() {
        let order = topo_sort(&ids(&["_m", "_b", "_a", "_y"]), &pairs(&[("_y", "_a")]))
            .unwrap();
        assert_eq!(ids(&["_b", "_m", "_a", "_y"]), order);
    }

    #[test]
    fn test_topo_sort_cycle_named() {
        let err = topo_sort(
            &ids(&["_a", "_b"]),
            &pairs(&[("_a", "_b"), ("_b", "_a")]),
        )
        .unwrap_err();
        assert_eq!(crate::common::ErrorCode::DependencyCycle, err.code);
        assert!(!err.details.unwrap().is_empty());
    }

    #[test]
    fn test_topo_sort_deterministic() {
        let nodes = ids(&["_d", "_c", "_b", "_a"]);
        let edges = pairs(&[("_d", "_c"), ("_d", "_b")]);
        let first = topo_sort(&nodes, &edges).unwrap();
        for _ in 0..8 {
            assert_eq!(first, topo_sort(&nodes, &edges).unwrap());
        }
    }
}
