// ark-compiler - Error types for the bytecode compiler
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Error types for compilation.
//!
//! Every compile error is fatal: the compiler produces no artifact. Where
//! the offending AST node is known, the error carries the source context
//! (file, line, column and the source line) and `Display` renders it
//! beneath the message.

use std::fmt;

/// Result type for compilation.
pub type Result<T> = std::result::Result<T, CompileError>;

/// What went wrong.
#[derive(Debug, Clone)]
pub enum ErrorKind {
    /// Symbol table ran out of 16-bit ids.
    TooManySymbols,
    /// Value table ran out of 16-bit ids.
    TooManyValues,
    /// Specific form used with fewer than two arguments.
    ArityTooLow { form: String },
    /// `&name` capture of a name with no binding.
    UnboundCapture { name: String },
    /// Chained use of an operator that does not chain.
    BadChainedOperator { operator: String, length: usize },
    /// A used symbol is neither defined, builtin, operator, nor
    /// plugin-prefixed.
    UndefinedSymbol { name: String },
    /// Malformed special form.
    Syntax { message: String },
    /// Compiler invariant violation.
    Internal { message: String },
    /// Reader failure surfaced by `feed`.
    Parse { message: String },
    /// `save_to` could not write the artifact.
    Io { path: String, message: String },
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::TooManySymbols => {
                write!(f, "too many symbols (exceeds 65536), aborting compilation")
            }
            ErrorKind::TooManyValues => {
                write!(f, "too many values (exceeds 65536), aborting compilation")
            }
            ErrorKind::ArityTooLow { form } => {
                write!(f, "can not use {} with less than 2 arguments", form)
            }
            ErrorKind::UnboundCapture { name } => write!(
                f,
                "can not capture {} because it is referencing an unbound variable",
                name
            ),
            ErrorKind::BadChainedOperator { operator, length } => write!(
                f,
                "can not create a chained expression of length {} for operator '{}'. \
                 You most likely forgot a ')'",
                length, operator
            ),
            ErrorKind::UndefinedSymbol { name } => {
                write!(f, "unbound variable '{}' (used but never defined)", name)
            }
            ErrorKind::Syntax { message } => write!(f, "syntax error: {}", message),
            ErrorKind::Internal { message } => write!(f, "internal compiler error: {}", message),
            ErrorKind::Parse { message } => write!(f, "{}", message),
            ErrorKind::Io { path, message } => {
                write!(f, "can not write bytecode to '{}': {}", path, message)
            }
        }
    }
}

/// Source context of the node an error originated from.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub filename: String,
    pub line: u32,
    pub column: u32,
    /// The offending source line, when the source is still available.
    pub source_line: Option<String>,
}

/// A fatal compilation error.
#[derive(Debug, Clone)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub context: Option<ErrorContext>,
}

impl CompileError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    pub fn with_context(kind: ErrorKind, context: ErrorContext) -> Self {
        Self {
            kind,
            context: Some(context),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ctx) = &self.context {
            write!(f, "\n  at {}:{}:{}", ctx.filename, ctx.line, ctx.column)?;
            if let Some(line) = &ctx.source_line {
                let caret_pad = " ".repeat(ctx.column.saturating_sub(1) as usize);
                write!(f, "\n    {}\n    {}^", line, caret_pad)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {}

// ============================================================================
// Tests
// ============================================================================
