pub mod abi;
pub mod config;
pub mod context;
pub mod error;
pub mod pending;
pub mod scheduler;
pub mod stdlib;

pub use config::RuntimeConfig;
pub use error::{RuntimeError, RuntimeResult};
pub use pending::{Pending, SharedPtr, StatementResult};
pub use scheduler::{ConflictPolicy, ContextManager, Dispatch, UpdateWins};

use std::fmt;

/// Result kinds a scheduled statement can produce; one runtime entry point
/// pair exists per kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResultKind {
    Int,
    Float,
    IntPtr,
    FloatPtr,
    Void,
}

impl ResultKind {
    pub const ALL: [ResultKind; 5] = [
        ResultKind::Int,
        ResultKind::Float,
        ResultKind::IntPtr,
        ResultKind::FloatPtr,
        ResultKind::Void,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            ResultKind::Int => "int",
            ResultKind::Float => "float",
            ResultKind::IntPtr => "intptr",
            ResultKind::FloatPtr => "floatptr",
            ResultKind::Void => "void",
        }
    }

    pub fn schedule_symbol(self) -> String {
        format!("schedule_{}", self.suffix())
    }

    pub fn reconcile_symbol(self) -> String {
        format!("reconcile_{}", self.suffix())
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}
