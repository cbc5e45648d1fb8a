//! Cycle-detecting topological sort.
//!
//! One generic linearizer serves both granularities: Computables inside a
//! scope (dependencies are inputs) and scopes of a graph (dependencies are
//! the scopes they instantiate).
//!
//! The walk is an iterative three-colour DFS with an explicit stack, so
//! deep chains cannot overflow. Output lists every dependency before its
//! dependents; among independent nodes the input order is kept.

use std::hash::Hash;

use rustc_hash::{FxHashMap, FxHashSet};

/// A back edge was found; `participant` lies on the cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CycleError<N> {
    pub participant: N,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Sort `nodes` so that each follows everything `deps` reports for it.
///
/// Dependencies outside `nodes` are ignored.
pub fn topological_sort<N, I, D, DI>(nodes: I, mut deps: D) -> Result<Vec<N>, CycleError<N>>
where
    N: Copy + Eq + Hash,
    I: IntoIterator<Item = N>,
    D: FnMut(N) -> DI,
    DI: IntoIterator<Item = N>,
{
    let roots: Vec<N> = nodes.into_iter().collect();
    let members: FxHashSet<N> = roots.iter().copied().collect();
    let mut marks: FxHashMap<N, Mark> = FxHashMap::default();
    let mut order = Vec::with_capacity(roots.len());

    let mut edges_of = |n: N| -> Vec<N> {
        deps(n)
            .into_iter()
            .filter(|d| members.contains(d))
            .collect()
    };

    for &root in &roots {
        if marks.contains_key(&root) {
            continue;
        }
        marks.insert(root, Mark::InProgress);
        // (node, its dependencies, next dependency to visit)
        let mut stack: Vec<(N, Vec<N>, usize)> = vec![(root, edges_of(root), 0)];

        while let Some(top) = stack.last_mut() {
            let next = top.1.get(top.2).copied();
            let Some(dep) = next else {
                let node = top.0;
                stack.pop();
                marks.insert(node, Mark::Done);
                order.push(node);
                continue;
            };
            top.2 += 1;
            match marks.get(&dep).copied() {
                Some(Mark::Done) => {}
                Some(Mark::InProgress) => return Err(CycleError { participant: dep }),
                None => {
                    marks.insert(dep, Mark::InProgress);
                    let edges = edges_of(dep);
                    stack.push((dep, edges, 0));
                }
            }
        }
    }

    Ok(order)
}
