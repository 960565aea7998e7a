//! Typed handles for scheduled statements.

use crate::runtime::{context::PendingMaps, ResultKind};
use std::{
    collections::HashMap,
    fmt,
    panic::{self, AssertUnwindSafe},
    thread,
};

/// Raw pointer produced by generated code, moved between threads as an
/// opaque value. The runtime never dereferences it.
#[repr(transparent)]
pub struct SharedPtr<T>(*mut T);

unsafe impl<T> Send for SharedPtr<T> {}

impl<T> SharedPtr<T> {
    pub fn new(ptr: *mut T) -> Self {
        Self(ptr)
    }

    pub fn null() -> Self {
        Self(std::ptr::null_mut())
    }

    pub fn get(self) -> *mut T {
        self.0
    }
}

impl<T> Clone for SharedPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SharedPtr<T> {}

impl<T> PartialEq for SharedPtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T> fmt::Debug for SharedPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedPtr({:p})", self.0)
    }
}

/// A value a scheduled statement can produce. Each kind owns one map in
/// every execution context.
pub trait StatementResult: Send + Sized + 'static {
    const KIND: ResultKind;

    fn pending_map(maps: &mut PendingMaps) -> &mut HashMap<i64, Pending<Self>>;
}

impl StatementResult for i64 {
    const KIND: ResultKind = ResultKind::Int;

    fn pending_map(maps: &mut PendingMaps) -> &mut HashMap<i64, Pending<Self>> {
        &mut maps.int
    }
}

impl StatementResult for f64 {
    const KIND: ResultKind = ResultKind::Float;

    fn pending_map(maps: &mut PendingMaps) -> &mut HashMap<i64, Pending<Self>> {
        &mut maps.float
    }
}

impl StatementResult for SharedPtr<i64> {
    const KIND: ResultKind = ResultKind::IntPtr;

    fn pending_map(maps: &mut PendingMaps) -> &mut HashMap<i64, Pending<Self>> {
        &mut maps.int_ptr
    }
}

impl StatementResult for SharedPtr<f64> {
    const KIND: ResultKind = ResultKind::FloatPtr;

    fn pending_map(maps: &mut PendingMaps) -> &mut HashMap<i64, Pending<Self>> {
        &mut maps.float_ptr
    }
}

impl StatementResult for () {
    const KIND: ResultKind = ResultKind::Void;

    fn pending_map(maps: &mut PendingMaps) -> &mut HashMap<i64, Pending<Self>> {
        &mut maps.void
    }
}

pub type DeferredBody<T> = Box<dyn FnOnce() -> T + Send>;

/// A scheduled, not yet retired statement. Retiring consumes the handle, so
/// each result can be observed at most once.
pub enum Pending<T> {
    /// Running on a dedicated worker; holds one unit of the thread budget.
    Threaded(thread::JoinHandle<T>),
    /// Not started; runs on the retiring thread.
    Deferred(DeferredBody<T>),
}

impl<T: Send + 'static> Pending<T> {
    pub fn spawn<F>(body: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Pending::Threaded(thread::spawn(body))
    }

    pub fn defer<F>(body: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Pending::Deferred(Box::new(body))
    }

    pub fn is_threaded(&self) -> bool {
        matches!(self, Pending::Threaded(_))
    }

    /// Block until the value is available. Deferred bodies run here.
    pub fn retire(self) -> thread::Result<T> {
        match self {
            Pending::Threaded(handle) => handle.join(),
            Pending::Deferred(body) => panic::catch_unwind(AssertUnwindSafe(body)),
        }
    }
}

impl<T> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pending::Threaded(_) => f.write_str("Pending::Threaded"),
            Pending::Deferred(_) => f.write_str("Pending::Deferred"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    #[test]
    fn deferred_bodies_run_on_the_retiring_thread() {
        let caller = thread::current().id();
        let pending = Pending::defer(move || thread::current().id() == caller);
        assert!(!pending.is_threaded());
        assert!(pending.retire().unwrap());
    }

    #[test]
    fn deferred_bodies_do_not_start_before_retirement() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let pending = Pending::defer(move || flag.store(true, Ordering::SeqCst));
        assert!(!ran.load(Ordering::SeqCst));
        pending.retire().unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn threaded_bodies_run_elsewhere() {
        let caller = thread::current().id();
        let pending = Pending::spawn(move || thread::current().id() != caller);
        assert!(pending.is_threaded());
        assert!(pending.retire().unwrap());
    }

    #[test]
    fn shared_pointers_round_trip_through_threads() {
        let mut value = 5_i64;
        let ptr = SharedPtr::new(&mut value as *mut i64);
        let pending = Pending::spawn(move || ptr);
        assert_eq!(pending.retire().unwrap(), ptr);
        assert_eq!(SharedPtr::<f64>::null().get(), std::ptr::null_mut());
    }

    #[test]
    fn panics_surface_as_errors_on_both_paths() {
        let threaded = Pending::<i64>::spawn(|| panic!("threaded body failed"));
        assert!(threaded.retire().is_err());
        let deferred = Pending::<i64>::defer(|| panic!("deferred body failed"));
        assert!(deferred.retire().is_err());
    }
}
