// src/transaction/mod.rs

//! Transactions: coalescing expensive setup and teardown across recursion
//!
//! Resolving a package recursively resolves its dependencies, and a single
//! command may resolve many packages. Loading and saving the build cache, or
//! scanning every checkout for modifications, must still happen once per
//! top-level operation. A transaction is a nesting counter plus a list of
//! teardown closures:
//!
//! ```text
//! within ─┬─ depth 0 -> 1
//!         ├─ perform("load-build-cache")   setup runs, teardown queued
//!         ├─ within ── depth 1 -> 2
//!         │            perform("load-build-cache")   already performed, no-op
//!         │  depth 2 -> 1
//!         └─ depth 1 -> 0   teardowns run in reverse registration order
//! ```
//!
//! The depth counter is decremented before teardowns run, so a teardown that
//! itself opens a transaction gets a fresh one instead of re-triggering the
//! queue. Teardowns also run when the body fails or panics.

use crate::Result;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

/// Teardown closure run when the outermost transaction exits
pub type Teardown<C> = Box<dyn FnOnce(&mut C) -> Result<()>>;

/// Nesting state for one context value
pub struct Transaction<C> {
    depth: usize,
    performed: HashSet<String>,
    teardowns: Vec<(String, Teardown<C>)>,
}

impl<C> Default for Transaction<C> {
    fn default() -> Self {
        Self {
            depth: 0,
            performed: HashSet::new(),
            teardowns: Vec::new(),
        }
    }
}

impl<C> std::fmt::Debug for Transaction<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("depth", &self.depth)
            .field("performed", &self.performed)
            .field(
                "teardowns",
                &self.teardowns.iter().map(|(id, _)| id).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<C> Transaction<C> {
    /// Create an idle transaction (depth 0)
    pub fn new() -> Self {
        Self::default()
    }

    /// Current nesting depth
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Whether any transaction is open
    pub fn is_active(&self) -> bool {
        self.depth > 0
    }

    /// Whether the action has already run in the open transaction
    pub fn has_performed(&self, action: &str) -> bool {
        self.performed.contains(action)
    }

    fn enter(&mut self) {
        self.depth += 1;
    }

    /// Leave one level; at depth 0 hand back the teardowns, newest first
    fn exit(&mut self) -> Vec<(String, Teardown<C>)> {
        self.depth = self.depth.saturating_sub(1);
        if self.depth > 0 {
            return Vec::new();
        }
        self.performed.clear();
        let mut teardowns = std::mem::take(&mut self.teardowns);
        teardowns.reverse();
        teardowns
    }
}

/// Implemented by context types that own a [`Transaction`]
pub trait Transactional: Sized {
    /// The transaction state stored on this context
    fn transaction(&mut self) -> &mut Transaction<Self>;
}

/// Run `body` inside a (possibly nested) transaction on `ctx`
///
/// Teardowns queued by [`perform`] run when the outermost call returns. The
/// body's error wins over a teardown error; a teardown error is returned when
/// the body succeeded.
pub fn within<C, T, F>(ctx: &mut C, body: F) -> Result<T>
where
    C: Transactional,
    F: FnOnce(&mut C) -> Result<T>,
{
    ctx.transaction().enter();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(ctx)));
    let teardowns = ctx.transaction().exit();

    let mut teardown_error = None;
    for (action, teardown) in teardowns {
        debug!("Running transaction teardown: {}", action);
        if let Err(e) = teardown(ctx) {
            warn!("Teardown for {} failed: {}", action, e);
            if teardown_error.is_none() {
                teardown_error = Some(e);
            }
        }
    }

    match outcome {
        Err(payload) => panic::resume_unwind(payload),
        Ok(Err(e)) => Err(e),
        Ok(Ok(value)) => match teardown_error {
            Some(e) => Err(e),
            None => Ok(value),
        },
    }
}

/// Run `setup` once per transaction for `action`, queueing `teardown`
///
/// Returns `true` when the setup ran, `false` when the action had already been
/// performed in the open transaction. Outside any transaction the action runs
/// in a one-shot transaction, so its teardown fires immediately. A failed setup
/// is not recorded and will be retried by the next request.
pub fn perform<C, S>(
    ctx: &mut C,
    action: &str,
    setup: S,
    teardown: Option<Teardown<C>>,
) -> Result<bool>
where
    C: Transactional,
    S: FnOnce(&mut C) -> Result<()>,
{
    within(ctx, |ctx| {
        if ctx.transaction().has_performed(action) {
            return Ok(false);
        }
        debug!("Performing transaction action: {}", action);
        ctx.transaction().performed.insert(action.to_string());
        if let Err(e) = setup(ctx) {
            ctx.transaction().performed.remove(action);
            return Err(e);
        }
        if let Some(teardown) = teardown {
            ctx.transaction()
                .teardowns
                .push((action.to_string(), teardown));
        }
        Ok(true)
    })
}
