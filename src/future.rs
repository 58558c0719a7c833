// SPDX-FileCopyrightText: Copyright © 2020-2026 Depot Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Cooperative step-engine combinators.
//!
//! Rust's own `Future` trait is already the poll-until-done contract
//! the combinators below describe: a `poll` that does bounded work
//! per call, a latch on completion (polling a fused future again after
//! it resolves is a logic error, same as this module's contract), and
//! caller-driven scheduling. So rather than hand-roll a generator, the
//! combinators below are thin `async fn`s that sequence `.await`s in
//! list order — "never concurrently" falls out of plain
//! `async`/`await` with nothing spawned onto another task.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;

use futures::future::BoxFuture;

/// Drain `iter`, awaiting `body(key, value)` for each entry in order,
/// collecting the per-entry results into a map.
pub async fn foreach<K, V, R, Fut>(
    iter: impl IntoIterator<Item = (K, V)>,
    mut body: impl FnMut(K, V) -> Fut,
) -> HashMap<K, R>
where
    K: Clone + Eq + Hash,
    Fut: Future<Output = R>,
{
    let mut results = HashMap::new();
    for (key, value) in iter {
        let result = body(key.clone(), value).await;
        results.insert(key, result);
    }
    results
}

/// Resolve `fut`, then map its value through `f`.
pub async fn map<T, R>(fut: impl Future<Output = T>, f: impl FnOnce(T) -> R) -> R {
    f(fut.await)
}

/// Poll each future to completion in the order given (never
/// concurrently), then fold the results with `join`.
pub async fn merge<T, R>(
    join: impl FnOnce(Vec<T>) -> R,
    futs: impl IntoIterator<Item = impl Future<Output = T>>,
) -> R {
    let mut results = Vec::new();
    for fut in futs {
        results.push(fut.await);
    }
    join(results)
}

/// As [`merge`], but the join is the identity function.
pub async fn concat<T>(futs: impl IntoIterator<Item = impl Future<Output = T>>) -> Vec<T> {
    merge(|results| results, futs).await
}

/// Recursive quicksort implemented as a future tree: below `limit`
/// items it falls back to a single-step sort.
pub fn sort<T>(
    list: Vec<T>,
    comp: impl Fn(&T, &T) -> Ordering + Clone + Send + Sync + 'static,
    limit: usize,
) -> BoxFuture<'static, Vec<T>>
where
    T: Send + 'static,
{
    Box::pin(async move {
        if list.len() <= limit {
            let mut list = list;
            list.sort_by(|a, b| comp(a, b));
            return list;
        }

        let mut iter = list.into_iter();
        // Unwrap is safe: len() > limit >= 0 implies at least one element.
        let pivot = iter.next().unwrap();
        let (less, greater): (Vec<T>, Vec<T>) =
            iter.partition(|item| comp(item, &pivot) == Ordering::Less);

        let sorted_less = sort(less, comp.clone(), limit).await;
        let sorted_greater = sort(greater, comp.clone(), limit).await;

        let mut result = sorted_less;
        result.push(pivot);
        result.extend(sorted_greater);
        result
    })
}
