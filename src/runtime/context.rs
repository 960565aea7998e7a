//! Execution contexts: one independently locked set of pending statements.

use crate::runtime::{
    error::{RuntimeError, RuntimeResult},
    pending::{Pending, SharedPtr, StatementResult},
    ResultKind,
};
use parking_lot::{Mutex, MutexGuard};
use std::collections::{HashMap, HashSet};

/// The five per-kind maps of one context, keyed by statement id.
#[derive(Default)]
pub struct PendingMaps {
    pub(crate) int: HashMap<i64, Pending<i64>>,
    pub(crate) float: HashMap<i64, Pending<f64>>,
    pub(crate) int_ptr: HashMap<i64, Pending<SharedPtr<i64>>>,
    pub(crate) float_ptr: HashMap<i64, Pending<SharedPtr<f64>>>,
    pub(crate) void: HashMap<i64, Pending<()>>,
    retired: HashSet<(ResultKind, i64)>,
}

impl PendingMaps {
    pub fn contains<T: StatementResult>(&mut self, id: i64) -> bool {
        T::pending_map(self).contains_key(&id)
    }

    /// Record a pending statement. The caller has checked `contains` under the
    /// same lock; a second insert under one id is a contract violation.
    pub fn insert<T: StatementResult>(&mut self, cid: i64, id: i64, pending: Pending<T>) -> RuntimeResult<()> {
        let map = T::pending_map(self);
        if map.contains_key(&id) {
            return Err(RuntimeError::DuplicateStatement {
                cid,
                id,
                kind: T::KIND,
            });
        }
        map.insert(id, pending);
        self.retired.remove(&(T::KIND, id));
        Ok(())
    }

    /// Remove the pending statement so it can be retired exactly once.
    pub fn take<T: StatementResult>(&mut self, cid: i64, id: i64) -> RuntimeResult<Pending<T>> {
        let removed = T::pending_map(self).remove(&id);
        if let Some(pending) = removed {
            self.retired.insert((T::KIND, id));
            return Ok(pending);
        }
        if self.retired.contains(&(T::KIND, id)) {
            Err(RuntimeError::AlreadyRetired {
                cid,
                id,
                kind: T::KIND,
            })
        } else {
            Err(RuntimeError::NotScheduled {
                cid,
                id,
                kind: T::KIND,
            })
        }
    }

    pub fn outstanding(&self) -> usize {
        self.int.len() + self.float.len() + self.int_ptr.len() + self.float_ptr.len() + self.void.len()
    }
}

pub struct StatementContext {
    cid: i64,
    maps: Mutex<PendingMaps>,
}

impl StatementContext {
    pub fn new(cid: i64) -> Self {
        Self {
            cid,
            maps: Mutex::new(PendingMaps::default()),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, PendingMaps> {
        self.maps.lock()
    }

    pub fn take<T: StatementResult>(&self, id: i64) -> RuntimeResult<Pending<T>> {
        self.maps.lock().take(self.cid, id)
    }

    pub fn outstanding(&self) -> usize {
        self.maps.lock().outstanding()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_are_independent_per_kind() {
        let context = StatementContext::new(0);
        {
            let mut maps = context.lock();
            maps.insert(0, 1, Pending::defer(|| 4_i64)).unwrap();
            maps.insert(0, 1, Pending::defer(|| 4.0_f64)).unwrap();
            maps.insert(0, 1, Pending::defer(|| ())).unwrap();
            assert_eq!(maps.outstanding(), 3);
        }
        let int = context.take::<i64>(1).unwrap();
        assert_eq!(int.retire().unwrap(), 4);
        assert_eq!(context.outstanding(), 2);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let context = StatementContext::new(3);
        let mut maps = context.lock();
        maps.insert(3, 0, Pending::defer(|| 1_i64)).unwrap();
        let err = maps.insert(3, 0, Pending::defer(|| 2_i64)).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::DuplicateStatement {
                cid: 3,
                id: 0,
                kind: ResultKind::Int
            }
        );
    }

    #[test]
    fn retrieval_distinguishes_unscheduled_from_retired() {
        let context = StatementContext::new(1);
        assert!(matches!(
            context.take::<f64>(9),
            Err(RuntimeError::NotScheduled { id: 9, .. })
        ));
        context
            .lock()
            .insert(1, 9, Pending::defer(|| 0.5_f64))
            .unwrap();
        context.take::<f64>(9).unwrap().retire().unwrap();
        assert!(matches!(
            context.take::<f64>(9),
            Err(RuntimeError::AlreadyRetired { id: 9, .. })
        ));
    }

    #[test]
    fn retired_ids_can_be_scheduled_again() {
        let context = StatementContext::new(2);
        context.lock().insert(2, 0, Pending::defer(|| ())).unwrap();
        context.take::<()>(0).unwrap().retire().unwrap();
        context.lock().insert(2, 0, Pending::defer(|| ())).unwrap();
        assert!(context.take::<()>(0).is_ok());
    }
}
