//! Compiler for logic-free templates whose placeholders resolve only
//! against a presenter's declared operations.
//!
//! Source text is scanned into tokens, references are parsed and checked
//! against a [`Contract`], and nested blocks are assembled into a
//! [`Template`]: a render plan that can be evaluated many times.

pub mod compiler;
pub mod contract;
pub mod error;
pub mod parser;
pub mod template;

pub use compiler::{MAX_NESTING_DEPTH, compile, compile_tree};
pub use contract::{Contract, ContractResolver, NoNestedContracts, Operation, Param};
pub use error::{CompileError, CompileErrorKind};
pub use parser::Attributes;
pub use template::{BlockKind, Call, CollectionScope, Node, Op, Template, Tree};
