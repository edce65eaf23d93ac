// ark-compiler - Bytecode compiler for the Ark programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The bytecode compiler: transforms the Ark AST into a bytecode artifact.
//!
//! The pipeline is linear: `feed` parses source into an AST, `compile`
//! lowers it into code pages while interning symbols and constants, runs
//! the undefined-symbol check, and assembles the final artifact; `save_to`
//! writes it out.

pub mod codegen;
pub mod types;

pub use codegen::Compiler;
pub use types::{CompileError, ErrorContext, ErrorKind, Result};
