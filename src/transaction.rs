// SPDX-FileCopyrightText: Copyright © 2020-2026 Depot Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Ordered (apply, rollback) actuator with lifecycle events.
//!
//! An owned, ordered sequence of effects applied against shared state,
//! generalized to a data-agnostic apply/rollback-pair-with-lifecycle-events
//! contract rather than being baked around any one dependency graph.

use std::sync::Arc;

use futures::future::BoxFuture;
use log::warn;

use crate::error::Error;

type ApplyFn<D> = Arc<dyn for<'a> Fn(&'a D) -> BoxFuture<'a, Result<(), Error>> + Send + Sync>;
type Hook0 = Arc<dyn Fn() -> BoxFuture<'static, Result<(), Error>> + Send + Sync>;
type HookAll = Arc<dyn Fn(bool, usize) -> BoxFuture<'static, Result<(), Error>> + Send + Sync>;
type HookAllDone = Arc<dyn Fn(bool, usize, bool) -> BoxFuture<'static, Result<(), Error>> + Send + Sync>;
type HookItem<D> = Arc<dyn for<'a> Fn(bool, usize, &'a D) -> BoxFuture<'a, Result<(), Error>> + Send + Sync>;
type HookItemDone<D> =
    Arc<dyn for<'a> Fn(bool, usize, &'a D, bool) -> BoxFuture<'a, Result<(), Error>> + Send + Sync>;

/// A single (apply, rollback) pair bound to its data.
pub struct Action<D> {
    pub data: D,
    apply: ApplyFn<D>,
    rollback: ApplyFn<D>,
}

impl<D> Action<D> {
    pub fn new(
        data: D,
        apply: impl for<'a> Fn(&'a D) -> BoxFuture<'a, Result<(), Error>> + Send + Sync + 'static,
        rollback: impl for<'a> Fn(&'a D) -> BoxFuture<'a, Result<(), Error>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            data,
            apply: Arc::new(apply),
            rollback: Arc::new(rollback),
        }
    }

    /// An action whose apply and rollback are both no-ops.
    pub fn noop(data: D) -> Self {
        Self::new(
            data,
            |_| Box::pin(async { Ok(()) }),
            |_| Box::pin(async { Ok(()) }),
        )
    }
}

/// A single action's recorded failure, either from `apply` or `rollback`.
#[derive(Debug)]
pub struct Failure<D> {
    pub data: D,
    pub error: Error,
}

/// Lifecycle hooks. `open`/`close` are where the orchestrator injects
/// load/flush of persistent state and are fixed for non-dry-run
/// transactions; `before_all`/`after_all`/`before`/`after` are
/// user-replaceable (e.g. for progress UI).
#[derive(Default)]
pub struct Handlers<D> {
    pub open: Option<Hook0>,
    pub close: Option<Hook0>,
    pub before_all: Option<HookAll>,
    pub after_all: Option<HookAllDone>,
    pub before: Option<HookItem<D>>,
    pub after: Option<HookItemDone<D>>,
}

/// An ordered sequence of actions executed atomically with best-effort
/// rollback on partial failure.
pub struct Transaction<D> {
    actions: Vec<Action<D>>,
    handlers: Handlers<D>,
}

impl<D: Clone> Transaction<D> {
    pub fn new(actions: Vec<Action<D>>) -> Self {
        Self {
            actions,
            handlers: Handlers::default(),
        }
    }

    pub fn set_handlers(&mut self, handlers: Handlers<D>) {
        self.handlers = handlers;
    }

    /// The data each action carries, in execution order.
    pub fn actions(&self) -> Vec<&D> {
        self.actions.iter().map(|action| &action.data).collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run the apply pass; on any action failure, run the rollback pass
    /// over the same action list in the same order and return `(false,
    /// errors)`. Never short-circuits the apply pass itself.
    pub async fn apply(&self) -> (bool, Vec<Failure<D>>) {
        self.run_hook0(self.handlers.open.as_ref()).await;

        let n = self.actions.len();
        self.run_before_all(false, n).await;

        let mut errors: Vec<Failure<D>> = Vec::new();
        for (i, action) in self.actions.iter().enumerate() {
            self.run_before(false, i, &action.data).await;
            let result = (action.apply)(&action.data).await;
            let is_error = result.is_err();
            if let Err(error) = result {
                errors.push(Failure {
                    data: action.data.clone(),
                    error,
                });
            }
            self.run_after(false, i, &action.data, is_error).await;
        }

        let apply_had_errors = !errors.is_empty();
        self.run_after_all(false, n, apply_had_errors).await;

        if !apply_had_errors {
            self.run_hook0(self.handlers.close.as_ref()).await;
            return (true, errors);
        }

        self.run_before_all(true, n).await;

        let mut rollback_had_errors = false;
        for (i, action) in self.actions.iter().enumerate() {
            self.run_before(true, i, &action.data).await;
            let result = (action.rollback)(&action.data).await;
            let is_error = result.is_err();
            if let Err(error) = result {
                rollback_had_errors = true;
                errors.push(Failure {
                    data: action.data.clone(),
                    error,
                });
            }
            self.run_after(true, i, &action.data, is_error).await;
        }
        self.run_after_all(true, n, rollback_had_errors).await;

        self.run_hook0(self.handlers.close.as_ref()).await;

        (false, errors)
    }

    async fn run_hook0(&self, hook: Option<&Hook0>) {
        if let Some(hook) = hook {
            if let Err(error) = hook().await {
                warn!("transaction lifecycle hook failed: {error}");
            }
        }
    }

    async fn run_before_all(&self, rollback: bool, n: usize) {
        if let Some(hook) = &self.handlers.before_all {
            if let Err(error) = hook(rollback, n).await {
                warn!("transaction beforeAll hook failed: {error}");
            }
        }
    }

    async fn run_after_all(&self, rollback: bool, n: usize, had_error: bool) {
        if let Some(hook) = &self.handlers.after_all {
            if let Err(error) = hook(rollback, n, had_error).await {
                warn!("transaction afterAll hook failed: {error}");
            }
        }
    }

    async fn run_before(&self, rollback: bool, i: usize, data: &D) {
        if let Some(hook) = &self.handlers.before {
            if let Err(error) = hook(rollback, i, data).await {
                warn!("transaction before hook failed: {error}");
            }
        }
    }

    async fn run_after(&self, rollback: bool, i: usize, data: &D, is_error: bool) {
        if let Some(hook) = &self.handlers.after {
            if let Err(error) = hook(rollback, i, data, is_error).await {
                warn!("transaction after hook failed: {error}");
            }
        }
    }
}
