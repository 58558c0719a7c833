// SPDX-FileCopyrightText: Copyright © 2020-2026 Depot Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Transitive closure and pruning over a caller-supplied dependency
//! getter. No version solving happens here: nodes are opaque,
//! comparable identifiers (`(name, repository)` elsewhere in the
//! crate), and edges come purely from `get_deps`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::hash::Hash;

/// DFS closure of `roots` under `get_deps`.
///
/// `get_deps` must resolve to `Some(edges)` — `Some(vec![])` meaning
/// "no edges" — for any known node. Resolving to `None` is the
/// extension point: the engine stops expanding and returns
/// the additions accumulated so far, letting a caller whose getter
/// failed (e.g. a driver fetch error) abort the closure without
/// panicking.
///
/// Results are cached per node so a getter with side effects (network,
/// disk) is invoked at most once per distinct node.
pub async fn expand<N, Fut>(roots: Vec<N>, get_deps: impl Fn(N) -> Fut) -> Vec<N>
where
    N: Clone + Eq + Hash,
    Fut: Future<Output = Option<Vec<N>>>,
{
    let mut pool: HashSet<N> = HashSet::new();
    let mut queue: VecDeque<N> = VecDeque::new();
    let mut additions: Vec<N> = Vec::new();
    let mut cache: HashMap<N, Vec<N>> = HashMap::new();

    for root in roots {
        if pool.insert(root.clone()) {
            queue.push_back(root);
        }
    }

    while let Some(node) = queue.pop_front() {
        let deps = if let Some(cached) = cache.get(&node) {
            cached.clone()
        } else {
            match get_deps(node.clone()).await {
                Some(deps) => {
                    cache.insert(node.clone(), deps.clone());
                    deps
                }
                None => return additions,
            }
        };

        for dep in deps {
            if pool.insert(dep.clone()) {
                additions.push(dep.clone());
                queue.push_back(dep);
            }
        }
    }

    additions
}

/// Remove nodes from `pool` to re-establish "no dangling deps" and "no
/// orphans except pinned roots", via a fixed-point alternation of two
/// passes. Returns the deletions, in removal order.
pub async fn shrink<N, DepsFut, PinFut>(
    pool: Vec<N>,
    get_deps: impl Fn(N) -> DepsFut,
    is_pinned: impl Fn(N) -> PinFut,
) -> Vec<N>
where
    N: Clone + Eq + Hash,
    DepsFut: Future<Output = Option<Vec<N>>>,
    PinFut: Future<Output = bool>,
{
    let mut remaining: Vec<N> = pool;
    let mut deletions: Vec<N> = Vec::new();

    loop {
        let mut changed = false;

        // Phase A: missing-dependency pass.
        let present: HashSet<N> = remaining.iter().cloned().collect();
        let mut survivors = Vec::with_capacity(remaining.len());
        for node in remaining {
            let deps = match get_deps(node.clone()).await {
                Some(deps) => deps,
                None => {
                    // Abort: stop pruning, keep everything seen so far.
                    survivors.push(node);
                    continue;
                }
            };
            if deps.iter().all(|dep| present.contains(dep)) {
                survivors.push(node);
            } else {
                deletions.push(node);
                changed = true;
            }
        }
        remaining = survivors;

        // Phase B: orphan pass.
        let mut parents_of: HashMap<N, usize> = HashMap::new();
        for node in &remaining {
            if let Some(deps) = get_deps(node.clone()).await {
                for dep in deps {
                    *parents_of.entry(dep).or_insert(0) += 1;
                }
            }
        }
        let mut survivors = Vec::with_capacity(remaining.len());
        for node in remaining {
            let has_parent = parents_of.get(&node).copied().unwrap_or(0) > 0;
            if has_parent || is_pinned(node.clone()).await {
                survivors.push(node);
            } else {
                deletions.push(node);
                changed = true;
            }
        }
        remaining = survivors;

        if !changed {
            break;
        }
    }

    deletions
}

/// Read-only predicate: true iff neither phase of [`shrink`] would
/// remove anything from `pool`.
pub async fn check<N, DepsFut, PinFut>(
    pool: Vec<N>,
    get_deps: impl Fn(N) -> DepsFut,
    is_pinned: impl Fn(N) -> PinFut,
) -> bool
where
    N: Clone + Eq + Hash,
    DepsFut: Future<Output = Option<Vec<N>>>,
    PinFut: Future<Output = bool>,
{
    shrink(pool, get_deps, is_pinned).await.is_empty()
}

/// `is_pinned` that pins nothing — the default when every node is eligible for removal.
pub async fn never_pinned<N>(_node: N) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn graph(edges: &[(&str, &[&str])]) -> Map<String, Vec<String>> {
        edges
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    async fn getter(graph: Map<String, Vec<String>>, node: String) -> Option<Vec<String>> {
        Some(graph.get(&node).cloned().unwrap_or_default())
    }

    #[tokio::test]
    async fn expand_closure_over_roots() {
        let g = graph(&[("A", &["B"]), ("B", &["C"]), ("C", &[])]);
        let additions = expand(vec!["A".to_string()], {
            let g = g.clone();
            move |n| getter(g.clone(), n)
        })
        .await;
        assert_eq!(additions, vec!["B".to_string(), "C".to_string()]);
    }

    #[tokio::test]
    async fn expand_self_edge_yields_no_additions() {
        let g = graph(&[("A", &["A"])]);
        let additions = expand(vec!["A".to_string()], move |n| getter(g.clone(), n)).await;
        assert!(additions.is_empty());
    }

    #[tokio::test]
    async fn expand_handles_cycles() {
        let g = graph(&[("A", &["B"]), ("B", &["A"])]);
        let additions = expand(vec!["A".to_string()], move |n| getter(g.clone(), n)).await;
        assert_eq!(additions, vec!["B".to_string()]);
    }

    #[tokio::test]
    async fn expand_diamond_has_no_duplicates() {
        let g = graph(&[("A", &["B", "C"]), ("B", &["D"]), ("C", &["D"]), ("D", &[])]);
        let additions = expand(vec!["A".to_string()], move |n| getter(g.clone(), n)).await;
        assert_eq!(additions.iter().filter(|x| *x == "D").count(), 1);
    }

    #[tokio::test]
    async fn shrink_removes_orphan_after_missing_dep_removal() {
        // A user-pinned; B depends on A; C depends on B. Remove A (simulated
        // by dropping it from the pool before calling shrink) and expect
        // both B (missing dep) and C (now an orphan) to be pruned in one
        // fixed-point run.
        let g = graph(&[("B", &["A"]), ("C", &["B"])]);
        let deletions = shrink(
            vec!["B".to_string(), "C".to_string()],
            move |n| getter(g.clone(), n),
            never_pinned,
        )
        .await;
        assert_eq!(deletions, vec!["B".to_string(), "C".to_string()]);
    }

    #[tokio::test]
    async fn shrink_keeps_pinned_orphan() {
        let g = graph(&[("A", &[]), ("B", &[])]);
        let deletions = shrink(
            vec!["A".to_string(), "B".to_string()],
            move |n| getter(g.clone(), n),
            |n: String| async move { n == "A" },
        )
        .await;
        assert_eq!(deletions, vec!["B".to_string()]);
    }

    #[tokio::test]
    async fn shrink_fixed_point_is_idempotent() {
        let g = graph(&[("B", &["A"]), ("C", &["B"])]);
        let pool = vec!["B".to_string(), "C".to_string()];
        let first = shrink(pool, move |n| getter(g.clone(), n), never_pinned).await;
        assert_eq!(first, vec!["B".to_string(), "C".to_string()]);

        let g2 = graph(&[]);
        let second = shrink(Vec::<String>::new(), move |n| getter(g2.clone(), n), never_pinned).await;
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn check_true_on_closed_orphan_free_pool() {
        let g = graph(&[("A", &[]), ("B", &["A"])]);
        let ok = check(
            vec!["A".to_string(), "B".to_string()],
            move |n| getter(g.clone(), n),
            never_pinned,
        )
        .await;
        assert!(ok);
    }

    #[tokio::test]
    async fn check_false_when_shrink_would_remove() {
        let g = graph(&[("B", &["A"])]);
        let ok = check(vec!["B".to_string()], move |n| getter(g.clone(), n), never_pinned).await;
        assert!(!ok);
    }
}
