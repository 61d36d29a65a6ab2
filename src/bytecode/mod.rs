//! The bytecode representation: opcodes, the compiled `CodeBlock`, the
//! `CodeBuilder` test-assembly helper, and inline-cache storage.

pub mod builder;
pub mod code_block;
pub mod ic;
pub mod opcode;

pub use builder::CodeBuilder;
pub use code_block::{CodeBlock, ExceptionHandler};
pub use opcode::Opcode;
