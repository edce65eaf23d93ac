// ark-compiler - Builtin table for Ark
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The ordered builtin table.
//!
//! A symbol naming a builtin compiles to `BUILTIN id`, where `id` is the
//! name's position in this table. The VM owns the runtime values; the
//! compiler only needs the names and their order, which must never change
//! between a compiler and the VM executing its artifacts (append-only).

/// Builtin names, in id order.
pub const BUILTINS: &[&str] = &[
    // constants
    "false",
    "true",
    "nil",
    // io
    "print",
    "puts",
    "input",
    "io:writeFile",
    "io:readFile",
    "io:appendFile",
    "io:listFiles",
    "io:fileExists?",
    "io:removeFile",
    "io:makeDir",
    // system
    "sys:exec",
    "sys:sleep",
    "sys:exit",
    "time",
    // math
    "math:floor",
    "math:ceil",
    "math:round",
    "math:sqrt",
    "math:exp",
    "math:ln",
    "math:pow",
    "math:isNaN?",
    "math:isInf?",
    // strings
    "str:format",
    "str:find",
    "str:removeAt",
    "str:ord",
    "str:chr",
    // lists
    "list:reverse",
    "list:find",
    "list:slice",
    "list:sort",
    "list:fill",
    "list:setAt",
];

/// Position of `name` in the builtin table, if it is a builtin.
pub fn builtin_index(name: &str) -> Option<u16> {
    BUILTINS.iter().position(|b| *b == name).map(|i| i as u16)
}
