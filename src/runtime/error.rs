use crate::runtime::ResultKind;
use thiserror::Error;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Contract violations by generated code. None of these are expected from a
/// correct code generator; the exported entry points abort on them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("execution context {cid} does not exist")]
    UnknownContext { cid: i64 },
    #[error("statement {id} ({kind}) is already pending in context {cid}")]
    DuplicateStatement { cid: i64, id: i64, kind: ResultKind },
    #[error("statement {id} ({kind}) was never scheduled in context {cid}")]
    NotScheduled { cid: i64, id: i64, kind: ResultKind },
    #[error("statement {id} ({kind}) in context {cid} was already reconciled")]
    AlreadyRetired { cid: i64, id: i64, kind: ResultKind },
    #[error("execution context {cid} destroyed with {pending} unreconciled statement(s)")]
    OutstandingWork { cid: i64, pending: usize },
    #[error("worker running statement {id} in context {cid} panicked")]
    WorkerPanicked { cid: i64, id: i64 },
}
