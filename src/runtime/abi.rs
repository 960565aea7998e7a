//! C entry points called by generated code.
//!
//! Every entry point goes through one process-wide [`ContextManager`]. Misuse
//! by generated code is unrecoverable: the error is reported and the process
//! aborts.

use crate::{
    diagnostics,
    runtime::{
        config::RuntimeConfig,
        error::RuntimeResult,
        pending::{SharedPtr, StatementResult},
        scheduler::ContextManager,
        stdlib,
    },
};
use once_cell::sync::Lazy;
use std::{ffi::c_void, process};
use tracing::error;

static MANAGER: Lazy<ContextManager> = Lazy::new(|| ContextManager::new(RuntimeConfig::from_env()));

pub fn manager() -> &'static ContextManager {
    &MANAGER
}

fn fatal<T>(result: RuntimeResult<T>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            error!(%err, "runtime contract violated by generated code");
            diagnostics::report_runtime_error(&err);
            process::abort()
        }
    }
}

/// Captured-variable snapshot handed to every statement body. Bodies only
/// read it, and the owning frame outlives all joins.
#[derive(Clone, Copy)]
struct Environment(*mut c_void);

unsafe impl Send for Environment {}

impl Environment {
    fn get(self) -> *mut c_void {
        self.0
    }
}

pub type Statement<T> = extern "C" fn(*mut c_void) -> T;

fn schedule<T: StatementResult>(statement: Statement<T>, env: *mut c_void, id: i64, cid: i64) {
    let env = Environment(env);
    fatal(manager().schedule(move || statement(env.get()), id, cid));
}

#[unsafe(no_mangle)]
pub extern "C" fn make_context() -> i64 {
    manager().make_context()
}

#[unsafe(no_mangle)]
pub extern "C" fn destroy_context(cid: i64) {
    fatal(manager().destroy_context(cid))
}

#[unsafe(no_mangle)]
pub extern "C" fn schedule_int(statement: Statement<i64>, env: *mut c_void, id: i64, cid: i64) {
    schedule(statement, env, id, cid)
}

#[unsafe(no_mangle)]
pub extern "C" fn schedule_float(statement: Statement<f64>, env: *mut c_void, id: i64, cid: i64) {
    schedule(statement, env, id, cid)
}

#[unsafe(no_mangle)]
pub extern "C" fn schedule_intptr(statement: Statement<SharedPtr<i64>>, env: *mut c_void, id: i64, cid: i64) {
    schedule(statement, env, id, cid)
}

#[unsafe(no_mangle)]
pub extern "C" fn schedule_floatptr(statement: Statement<SharedPtr<f64>>, env: *mut c_void, id: i64, cid: i64) {
    schedule(statement, env, id, cid)
}

#[unsafe(no_mangle)]
pub extern "C" fn schedule_void(statement: Statement<()>, env: *mut c_void, id: i64, cid: i64) {
    schedule(statement, env, id, cid)
}

#[unsafe(no_mangle)]
pub extern "C" fn reconcile_int(original: i64, known: i64, id: i64, cid: i64) -> i64 {
    fatal(manager().reconcile(original, known, id, cid))
}

#[unsafe(no_mangle)]
pub extern "C" fn reconcile_float(original: f64, known: f64, id: i64, cid: i64) -> f64 {
    fatal(manager().reconcile(original, known, id, cid))
}

#[unsafe(no_mangle)]
pub extern "C" fn reconcile_intptr(
    original: SharedPtr<i64>,
    known: SharedPtr<i64>,
    id: i64,
    cid: i64,
) -> SharedPtr<i64> {
    fatal(manager().reconcile(original, known, id, cid))
}

#[unsafe(no_mangle)]
pub extern "C" fn reconcile_floatptr(
    original: SharedPtr<f64>,
    known: SharedPtr<f64>,
    id: i64,
    cid: i64,
) -> SharedPtr<f64> {
    fatal(manager().reconcile(original, known, id, cid))
}

#[unsafe(no_mangle)]
pub extern "C" fn reconcile_void(id: i64, cid: i64) {
    fatal(manager().reconcile_void(id, cid))
}

/// Names and addresses of every symbol generated code may reference, for
/// binding a module in a JIT.
pub fn exported_symbols() -> Vec<(&'static str, usize)> {
    vec![
        ("make_context", make_context as usize),
        ("destroy_context", destroy_context as usize),
        ("schedule_int", schedule_int as usize),
        ("schedule_float", schedule_float as usize),
        ("schedule_intptr", schedule_intptr as usize),
        ("schedule_floatptr", schedule_floatptr as usize),
        ("schedule_void", schedule_void as usize),
        ("reconcile_int", reconcile_int as usize),
        ("reconcile_float", reconcile_float as usize),
        ("reconcile_intptr", reconcile_intptr as usize),
        ("reconcile_floatptr", reconcile_floatptr as usize),
        ("reconcile_void", reconcile_void as usize),
        ("print_int", stdlib::print_int as usize),
        ("print_float", stdlib::print_float as usize),
        ("malloc_int", stdlib::malloc_int as usize),
        ("malloc_float", stdlib::malloc_float as usize),
        ("calloc_int", stdlib::calloc_int as usize),
        ("calloc_float", stdlib::calloc_float as usize),
        ("free_int", stdlib::free_int as usize),
        ("free_float", stdlib::free_float as usize),
    ]
}
