// ark-parser - Lexer, parser and AST for the Ark programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Reader front-end for Ark: turns source text into the AST consumed by
//! the bytecode compiler in `ark-compiler`.
//!
//! Macro expansion and AST optimisation are collaborator passes that run
//! between this crate and the compiler; the tree produced here is already
//! in the shape the compiler accepts.

pub mod keyword;
pub mod lexer;
pub mod node;
pub mod parser;

pub use keyword::Keyword;
pub use lexer::{LexError, Lexer, Token};
pub use node::{Node, NodeKind, SourcePos};
pub use parser::{ParseError, Parser};
