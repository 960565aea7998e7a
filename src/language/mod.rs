pub mod ast;
pub mod compiler;
pub mod errors;
pub mod runtime_abi;
pub mod symbols;
pub mod types;
