use crate::language::types::{CoercionError, TypeTag};
use inkwell::builder::BuilderError;
use miette::Diagnostic;
use std::fmt;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Struct,
    Field,
    Function,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SymbolKind::Variable => "variable",
            SymbolKind::Struct => "struct",
            SymbolKind::Field => "field",
            SymbolKind::Function => "function",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Debug, Error, Diagnostic, PartialEq)]
pub enum CompileError {
    #[error("{context}: {source}")]
    #[diagnostic(code(fork::types))]
    Coercion {
        context: String,
        #[source]
        source: CoercionError,
    },
    #[error("{kind} `{name}` is already defined")]
    #[diagnostic(code(fork::redefinition))]
    Redefinition { kind: SymbolKind, name: String },
    #[error("{kind} `{name}` is not declared")]
    #[diagnostic(code(fork::undeclared))]
    Undeclared { kind: SymbolKind, name: String },
    #[error("struct `{structure}` has no field `{field}`")]
    #[diagnostic(code(fork::unknown_field))]
    UnknownField { structure: String, field: String },
    #[error("field `{field}` accessed on non-struct value of type `{found}`")]
    #[diagnostic(code(fork::field_access))]
    FieldAccess { field: String, found: TypeTag },
    #[error("`{found}` cannot be indexed")]
    #[diagnostic(code(fork::index), help("only `int*`, `float*` and struct pointers support indexing"))]
    NotIndexable { found: TypeTag },
    #[error("expression is not assignable")]
    #[diagnostic(code(fork::assign_target))]
    NotAssignable,
    #[error("function `{function}` expects {expected} argument(s) but received {found}")]
    #[diagnostic(code(fork::arity))]
    ArityMismatch {
        function: String,
        expected: usize,
        found: usize,
    },
    #[error("null is not allowed in {context}")]
    #[diagnostic(code(fork::null), help("null can only stand in for pointer values"))]
    NullNotAllowed { context: String },
    #[error("struct `{name}` contains itself by value through field `{field}`")]
    #[diagnostic(code(fork::recursive_struct), help("use a pointer (`{name}*`) for self references"))]
    RecursiveStruct { name: String, field: String },
    #[error("`void` is not allowed for {context}")]
    #[diagnostic(code(fork::void), help("`void` is only valid as a function return type"))]
    VoidNotAllowed { context: String },
    #[error("unsupported type `{keyword}`")]
    #[diagnostic(code(fork::unsupported_type))]
    UnsupportedType { keyword: String },
    #[error("{statement} is not allowed in {context}")]
    #[diagnostic(code(fork::misplaced))]
    MisplacedStatement {
        statement: &'static str,
        context: &'static str,
    },
    #[error("function `{function}` must return a value of type `{expected}`")]
    #[diagnostic(code(fork::missing_return))]
    MissingReturn { function: String, expected: TypeTag },
    #[error("`{name}` is reserved by the runtime")]
    #[diagnostic(code(fork::reserved))]
    ReservedName { name: String },
    #[error("code generation failed: {message}")]
    #[diagnostic(code(fork::backend))]
    Backend { message: String },
}

impl CompileError {
    pub fn coercion(context: impl Into<String>, source: CoercionError) -> Self {
        CompileError::Coercion {
            context: context.into(),
            source,
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        CompileError::Backend {
            message: message.into(),
        }
    }
}

/// Every error recorded while generating one compilation unit.
#[derive(Clone, Debug, Error, Diagnostic)]
#[error("compilation failed with {} error(s)", .errors.len())]
pub struct CompileErrors {
    #[related]
    pub errors: Vec<CompileError>,
}

impl CompileErrors {
    pub fn new(errors: Vec<CompileError>) -> Self {
        Self { errors }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("compilation recorded {0} error(s); output suppressed")]
    Suppressed(usize),
    #[error("failed to write `{path}`: {message}")]
    Write { path: String, message: String },
    #[error("native target unavailable: {0}")]
    Target(String),
}

/// Failure inside the generation walk.
///
/// `Reported` marks a failure already recorded on the unit; downstream nodes
/// propagate it without reporting again.
#[derive(Debug)]
pub(crate) enum GenError {
    Reported,
    Fresh(CompileError),
}

pub(crate) type GenResult<T> = Result<T, GenError>;

impl From<CompileError> for GenError {
    fn from(error: CompileError) -> Self {
        GenError::Fresh(error)
    }
}

impl From<BuilderError> for GenError {
    fn from(error: BuilderError) -> Self {
        GenError::Fresh(CompileError::backend(error.to_string()))
    }
}
