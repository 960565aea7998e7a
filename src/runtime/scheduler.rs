//! Statement scheduling and reconciliation under a global thread budget.
//!
//! Lock order: a context's map lock may be held while taking the manager
//! lock, never the other way round. Waiting for a result happens with no lock
//! held.

use crate::runtime::{
    config::RuntimeConfig,
    context::StatementContext,
    error::{RuntimeError, RuntimeResult},
    pending::{Pending, StatementResult},
};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, trace};

/// How a scheduled statement was dispatched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    Threaded,
    Deferred,
}

/// Merge rule applied when a statement's result is joined back.
///
/// `original` is the target's value when the statement was scheduled, `known`
/// its value at the join, `update` the value the statement computed.
pub trait ConflictPolicy: Send + Sync {
    fn resolve<T: StatementResult>(&self, original: T, known: T, update: T) -> T;
}

/// The newly computed value always wins.
#[derive(Clone, Copy, Debug, Default)]
pub struct UpdateWins;

impl ConflictPolicy for UpdateWins {
    fn resolve<T: StatementResult>(&self, _original: T, _known: T, update: T) -> T {
        update
    }
}

struct ManagerState {
    in_flight: usize,
    next_cid: i64,
    contexts: HashMap<i64, Arc<StatementContext>>,
}

pub struct ContextManager<P: ConflictPolicy = UpdateWins> {
    state: Mutex<ManagerState>,
    max_threads: usize,
    policy: P,
}

impl ContextManager<UpdateWins> {
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_policy(config, UpdateWins)
    }
}

impl Default for ContextManager<UpdateWins> {
    fn default() -> Self {
        Self::new(RuntimeConfig::detect())
    }
}

impl<P: ConflictPolicy> ContextManager<P> {
    pub fn with_policy(config: RuntimeConfig, policy: P) -> Self {
        debug!(max_threads = config.max_threads, "context manager created");
        Self {
            state: Mutex::new(ManagerState {
                in_flight: 0,
                next_cid: 0,
                contexts: HashMap::new(),
            }),
            max_threads: config.max_threads,
            policy,
        }
    }

    pub fn max_threads(&self) -> usize {
        self.max_threads
    }

    /// Statements currently holding a unit of the thread budget.
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    pub fn make_context(&self) -> i64 {
        let mut state = self.state.lock();
        let cid = state.next_cid;
        state.next_cid += 1;
        state.contexts.insert(cid, Arc::new(StatementContext::new(cid)));
        debug!(cid, "context created");
        cid
    }

    /// Refused while statements are outstanding; the context then stays
    /// registered so its work can still be reconciled.
    pub fn destroy_context(&self, cid: i64) -> RuntimeResult<()> {
        let context = self.context(cid)?;
        let maps = context.lock();
        let pending = maps.outstanding();
        if pending > 0 {
            return Err(RuntimeError::OutstandingWork { cid, pending });
        }
        self.state.lock().contexts.remove(&cid);
        drop(maps);
        debug!(cid, "context destroyed");
        Ok(())
    }

    fn context(&self, cid: i64) -> RuntimeResult<Arc<StatementContext>> {
        self.state
            .lock()
            .contexts
            .get(&cid)
            .cloned()
            .ok_or(RuntimeError::UnknownContext { cid })
    }

    /// Never blocks: either launches `body` on a worker or records it for
    /// synchronous execution at reconciliation.
    pub fn schedule<T, F>(&self, body: F, id: i64, cid: i64) -> RuntimeResult<Dispatch>
    where
        T: StatementResult,
        F: FnOnce() -> T + Send + 'static,
    {
        let context = self.context(cid)?;
        let mut maps = context.lock();
        if maps.contains::<T>(id) {
            return Err(RuntimeError::DuplicateStatement {
                cid,
                id,
                kind: T::KIND,
            });
        }
        let dispatch = {
            let mut state = self.state.lock();
            if !state.contexts.contains_key(&cid) {
                return Err(RuntimeError::UnknownContext { cid });
            }
            if state.in_flight < self.max_threads {
                state.in_flight += 1;
                Dispatch::Threaded
            } else {
                Dispatch::Deferred
            }
        };
        let pending = match dispatch {
            Dispatch::Threaded => Pending::spawn(body),
            Dispatch::Deferred => Pending::defer(body),
        };
        maps.insert(cid, id, pending)?;
        debug!(cid, id, kind = %T::KIND, ?dispatch, "statement scheduled");
        Ok(dispatch)
    }

    /// Block until statement `id` of `cid` is available and retire it.
    pub fn retrieve<T: StatementResult>(&self, id: i64, cid: i64) -> RuntimeResult<T> {
        let context = self.context(cid)?;
        let pending = context.take::<T>(id)?;
        let threaded = pending.is_threaded();
        trace!(cid, id, kind = %T::KIND, threaded, "waiting for statement");
        let outcome = pending.retire();
        if threaded {
            let mut state = self.state.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        let value = outcome.map_err(|_| RuntimeError::WorkerPanicked { cid, id })?;
        debug!(cid, id, kind = %T::KIND, threaded, "statement retired");
        Ok(value)
    }

    pub fn reconcile<T: StatementResult>(&self, original: T, known: T, id: i64, cid: i64) -> RuntimeResult<T> {
        let update = self.retrieve::<T>(id, cid)?;
        Ok(self.policy.resolve(original, known, update))
    }

    pub fn reconcile_void(&self, id: i64, cid: i64) -> RuntimeResult<()> {
        self.retrieve::<()>(id, cid)
    }
}
