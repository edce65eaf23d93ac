// ark-compiler - Code generation: AST to bytecode lowering
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Code generation: lowers the AST into code pages.
//!
//! Dispatch is a match over node kind and, for lists, over the head: a
//! specific list form, a special-form keyword, or a general call. Symbols
//! resolve in order against the builtin table, the operator table, and
//! finally the symbol table as a variable use.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use ark_parser::{Keyword, Node, NodeKind, Parser, SourcePos};

use crate::builtins::builtin_index;
use crate::bytecode;
use crate::instruction::{self, Instruction, FIRST_OPERATOR};
use crate::page::{CodePageSet, PageRef};
use crate::table::{SymbolTable, ValueEntry, ValueTable};

use super::types::{CompileError, ErrorContext, ErrorKind, Result};

/// The Ark bytecode compiler.
///
/// One instance compiles one input through `feed → compile → save_to`.
pub struct Compiler {
    /// Debug verbosity: 0 silent, 1 logs artifact size on save, 2 also
    /// dumps the AST after feed.
    debug: u16,
    /// Feature bitmask forwarded verbatim to the collaborator passes
    /// (parser, macro processor, optimizer).
    options: u16,

    filename: String,
    source: String,
    ast: Option<Node>,

    symbols: SymbolTable,
    values: ValueTable,
    pages: CodePageSet,
    defined_symbols: HashSet<String>,
    plugins: Vec<String>,

    bytecode: Vec<u8>,
}

impl Compiler {
    /// Create a compiler with the given debug level and feature bitmask.
    pub fn new(debug: u16, options: u16) -> Self {
        Self {
            debug,
            options,
            filename: String::new(),
            source: String::new(),
            ast: None,
            symbols: SymbolTable::new(),
            values: ValueTable::new(),
            pages: CodePageSet::new(),
            defined_symbols: HashSet::new(),
            plugins: Vec::new(),
            bytecode: Vec::new(),
        }
    }

    /// The feature bitmask this compiler forwards to collaborator passes.
    pub fn options(&self) -> u16 {
        self.options
    }

    /// Parse `source` into the AST that `compile` will lower.
    pub fn feed(&mut self, source: &str, filename: &str) -> Result<()> {
        self.source = source.to_string();
        self.filename = filename.to_string();
        let ast = Parser::parse_str(source).map_err(|e| {
            CompileError::with_context(
                ErrorKind::Parse { message: e.message },
                ErrorContext {
                    filename: filename.to_string(),
                    line: e.line,
                    column: e.column,
                    source_line: source_line(source, e.line),
                },
            )
        })?;
        if self.debug >= 2 {
            println!("{}", ast);
        }
        self.ast = Some(ast);
        Ok(())
    }

    /// Lower the fed AST and assemble the bytecode artifact.
    pub fn compile(&mut self) -> Result<()> {
        let ast = self.ast.take().ok_or_else(|| {
            CompileError::new(ErrorKind::Internal {
                message: "compile() called before feed()".to_string(),
            })
        })?;

        self.symbols = SymbolTable::new();
        self.values = ValueTable::new();
        self.pages = CodePageSet::new();
        self.defined_symbols.clear();
        self.plugins.clear();

        let root = self.pages.new_page();
        let result = self.compile_node(&ast, PageRef::Page(root));
        self.ast = Some(ast);
        result?;

        self.check_undefined_symbols()?;

        self.bytecode = bytecode::assemble(&self.symbols, &self.values, self.pages.pages());
        Ok(())
    }

    /// Write the artifact to `path`.
    pub fn save_to(&self, path: &str) -> Result<()> {
        if self.debug >= 1 {
            println!("final bytecode size: {}B", self.bytecode.len());
        }
        fs::write(path, &self.bytecode).map_err(|e| {
            CompileError::new(ErrorKind::Io {
                path: path.to_string(),
                message: e.to_string(),
            })
        })
    }

    /// The produced artifact.
    pub fn bytecode(&self) -> &[u8] {
        &self.bytecode
    }

    // ========================================================================
    // Lowering dispatcher
    // ========================================================================

    fn compile_node(&mut self, x: &Node, p: PageRef) -> Result<()> {
        match &x.kind {
            NodeKind::Symbol(name) => self.compile_symbol(x, name, p),
            NodeKind::GetField(name) => {
                let id = self.add_symbol(name, x)?;
                self.emit(p, Instruction::GetField, Some(id));
                Ok(())
            }
            NodeKind::Number(n) => {
                let id = self.add_value(ValueEntry::Number(*n), x)?;
                self.emit(p, Instruction::LoadConst, Some(id));
                Ok(())
            }
            NodeKind::Str(s) => {
                let id = self.add_value(ValueEntry::Str(s.clone()), x)?;
                self.emit(p, Instruction::LoadConst, Some(id));
                Ok(())
            }
            NodeKind::Capture(_) => Err(self.error_at(
                x,
                ErrorKind::Syntax {
                    message: "a capture can only appear in a function parameter list".to_string(),
                },
            )),
            NodeKind::Keyword(kw) => Err(self.error_at(
                x,
                ErrorKind::Syntax {
                    message: format!("'{}' can not be used outside a form head", kw),
                },
            )),
            NodeKind::List(items) => self.compile_list(x, items, p),
        }
    }

    fn compile_list(&mut self, x: &Node, items: &[Node], p: PageRef) -> Result<()> {
        // An empty code block evaluates to nil.
        if items.is_empty() {
            let id = self.nil_builtin(x)?;
            self.emit(p, Instruction::Builtin, Some(id));
            return Ok(());
        }

        if let NodeKind::Symbol(name) = &items[0].kind {
            if let Some(inst) = instruction::specific_form(name) {
                return self.compile_specific(name, inst, x, p);
            }
        }

        if let NodeKind::Keyword(kw) = items[0].kind {
            return match kw {
                Keyword::If => self.compile_if(x, p),
                Keyword::Set => self.compile_set(x, p),
                Keyword::Let | Keyword::Mut => self.compile_let_mut(kw, x, p),
                Keyword::Fun => self.compile_function(x, p),
                Keyword::Begin => {
                    for child in &items[1..] {
                        self.compile_node(child, p)?;
                    }
                    Ok(())
                }
                Keyword::While => self.compile_while(x, p),
                Keyword::Import => self.compile_plugin_import(x, p),
                Keyword::Quote => self.compile_quote(x, p),
                Keyword::Del => self.compile_del(x, p),
            };
        }

        // Anything else is a function call: arguments first, then the
        // callee, then CALL.
        self.handle_calls(x, p)
    }

    fn compile_symbol(&mut self, x: &Node, name: &str, p: PageRef) -> Result<()> {
        if let Some(id) = builtin_index(name) {
            self.emit(p, Instruction::Builtin, Some(id));
        } else if let Some(i) = instruction::operator_index(name) {
            self.pages.page_mut(p).push_byte(FIRST_OPERATOR + i as u8);
        } else {
            // var-use
            let id = self.add_symbol(name, x)?;
            self.emit(p, Instruction::LoadSymbol, Some(id));
        }
        Ok(())
    }

    // ========================================================================
    // Specific list forms
    // ========================================================================

    fn compile_specific(
        &mut self,
        form: &str,
        inst: Instruction,
        x: &Node,
        p: PageRef,
    ) -> Result<()> {
        let items = x.children();
        let argc = count_objects(&items[1..]);
        if argc < 2 && inst != Instruction::List {
            return Err(self.error_at(
                x,
                ErrorKind::ArityTooLow {
                    form: form.to_string(),
                },
            ));
        }

        // Compile arguments in reverse order, keeping each value's trailing
        // field accessors attached to it.
        let mut i = items.len() - 1;
        while i >= 1 {
            let mut j = i;
            while j > 1 && items[j].is_get_field() {
                j -= 1;
            }
            for k in j..i {
                self.compile_node(&items[k], p)?;
            }
            self.compile_node(&items[i], p)?;
            if j <= 1 {
                break;
            }
            i = j - 1;
        }

        self.emit(p, inst, None);
        match inst {
            Instruction::List => self.pages.page_mut(p).push_u16(argc as u16),
            Instruction::Append
            | Instruction::Concat
            | Instruction::AppendInPlace
            | Instruction::ConcatInPlace => self.pages.page_mut(p).push_u16((argc - 1) as u16),
            _ => {} // POP takes no immediate
        }
        Ok(())
    }

    // ========================================================================
    // Special forms
    // ========================================================================

    fn compile_if(&mut self, x: &Node, p: PageRef) -> Result<()> {
        let items = x.children();
        if items.len() < 3 || items.len() > 4 {
            return Err(self.error_at(
                x,
                ErrorKind::Syntax {
                    message: "if takes a condition, a then branch and an optional else branch"
                        .to_string(),
                },
            ));
        }

        self.compile_node(&items[1], p)?;
        self.emit(p, Instruction::PopJumpIfTrue, None);
        let jump_to_if = self.pages.page_mut(p).reserve_u16();
        // else branch, if present
        if items.len() == 4 {
            self.compile_node(&items[3], p)?;
        }
        self.emit(p, Instruction::Jump, None);
        let jump_to_end = self.pages.page_mut(p).reserve_u16();
        // then branch
        let here = self.pages.page(p).len() as u16;
        self.pages.page_mut(p).patch_u16(jump_to_if, here);
        self.compile_node(&items[2], p)?;
        let here = self.pages.page(p).len() as u16;
        self.pages.page_mut(p).patch_u16(jump_to_end, here);
        Ok(())
    }

    fn compile_while(&mut self, x: &Node, p: PageRef) -> Result<()> {
        let items = x.children();
        if items.len() != 3 {
            return Err(self.error_at(
                x,
                ErrorKind::Syntax {
                    message: "while takes a condition and a body".to_string(),
                },
            ));
        }

        let loop_start = self.pages.page(p).len() as u16;
        self.compile_node(&items[1], p)?;
        self.emit(p, Instruction::PopJumpIfFalse, None);
        let jump_to_end = self.pages.page_mut(p).reserve_u16();
        self.compile_node(&items[2], p)?;
        self.emit(p, Instruction::Jump, None);
        self.pages.page_mut(p).push_u16(loop_start);
        let here = self.pages.page(p).len() as u16;
        self.pages.page_mut(p).patch_u16(jump_to_end, here);
        Ok(())
    }

    fn compile_let_mut(&mut self, kw: Keyword, x: &Node, p: PageRef) -> Result<()> {
        let items = x.children();
        let name = self.binding_name(x, items, kw.name())?;
        let id = self.add_symbol(&name, &items[1])?;
        self.defined_symbols.insert(name);

        // value(s) before the binding instruction
        self.put_value(items, p)?;

        let inst = if kw == Keyword::Let {
            Instruction::Let
        } else {
            Instruction::Mut
        };
        self.emit(p, inst, Some(id));
        Ok(())
    }

    fn compile_set(&mut self, x: &Node, p: PageRef) -> Result<()> {
        let items = x.children();
        let name = self.binding_name(x, items, "set")?;
        let id = self.add_symbol(&name, &items[1])?;

        self.put_value(items, p)?;

        self.emit(p, Instruction::Store, Some(id));
        Ok(())
    }

    /// Compile every child from index 2 onward. Several values may be
    /// pushed before a single binding instruction; the VM binds the last.
    fn put_value(&mut self, items: &[Node], p: PageRef) -> Result<()> {
        for child in &items[2..] {
            self.compile_node(child, p)?;
        }
        Ok(())
    }

    fn compile_function(&mut self, x: &Node, p: PageRef) -> Result<()> {
        let items = x.children();
        let params = match items.get(1).map(|n| &n.kind) {
            Some(NodeKind::List(params)) => params.as_slice(),
            _ => {
                return Err(self.error_at(
                    x,
                    ErrorKind::Syntax {
                        message: "fun takes a parameter list and a body".to_string(),
                    },
                ))
            }
        };
        let body = items.get(2).ok_or_else(|| {
            self.error_at(
                x,
                ErrorKind::Syntax {
                    message: "fun takes a parameter list and a body".to_string(),
                },
            )
        })?;

        // Captures ride in on the closure: emitted into the enclosing page,
        // and only resolvable if the name is already bound somewhere.
        for param in params {
            if let NodeKind::Capture(name) = &param.kind {
                if !self.defined_symbols.contains(name) {
                    return Err(self.error_at(
                        param,
                        ErrorKind::UnboundCapture { name: name.clone() },
                    ));
                }
                self.emit(p, Instruction::Capture, None);
                self.defined_symbols.insert(name.clone());
                let id = self.add_symbol(name, param)?;
                self.pages.page_mut(p).push_u16(id);
            }
        }

        // New page for the body; at runtime the page address becomes a
        // closure value.
        let (f, addr) = self.new_body_page(x)?;
        let vid = self.add_value(ValueEntry::PageAddr(addr), x)?;
        self.emit(p, Instruction::LoadConst, Some(vid));

        // Pop incoming arguments off the stack into locals.
        for param in params {
            if let NodeKind::Symbol(name) = &param.kind {
                self.emit(f, Instruction::Mut, None);
                let id = self.add_symbol(name, param)?;
                self.defined_symbols.insert(name.clone());
                self.pages.page_mut(f).push_u16(id);
            }
        }

        self.compile_node(body, f)?;
        self.emit(f, Instruction::Ret, None);
        Ok(())
    }

    fn compile_quote(&mut self, x: &Node, p: PageRef) -> Result<()> {
        let items = x.children();
        let expr = items.get(1).ok_or_else(|| {
            self.error_at(
                x,
                ErrorKind::Syntax {
                    message: "quote takes an expression".to_string(),
                },
            )
        })?;

        let (q, addr) = self.new_body_page(x)?;
        self.compile_node(expr, q)?;
        self.emit(q, Instruction::Ret, None);

        let vid = self.add_value(ValueEntry::PageAddr(addr), x)?;
        self.emit(p, Instruction::LoadConst, Some(vid));
        Ok(())
    }

    fn compile_plugin_import(&mut self, x: &Node, p: PageRef) -> Result<()> {
        let items = x.children();
        let path = match items.get(1).map(|n| &n.kind) {
            Some(NodeKind::Str(path)) => path.clone(),
            _ => {
                return Err(self.error_at(
                    x,
                    ErrorKind::Syntax {
                        message: "import takes a string path".to_string(),
                    },
                ))
            }
        };

        let vid = self.add_value(ValueEntry::Str(path.clone()), x)?;
        // remember the path so plugin-prefixed symbols pass the
        // undefined-symbol check
        self.plugins.push(path);
        self.emit(p, Instruction::Plugin, Some(vid));
        Ok(())
    }

    fn compile_del(&mut self, x: &Node, p: PageRef) -> Result<()> {
        let items = x.children();
        let name = self.binding_name(x, items, "del")?;
        let id = self.add_symbol(&name, &items[1])?;
        self.emit(p, Instruction::Del, Some(id));
        Ok(())
    }

    // ========================================================================
    // General calls
    // ========================================================================

    fn handle_calls(&mut self, x: &Node, p: PageRef) -> Result<()> {
        let items = x.children();

        // Compile the callee into a temp page so it can land after the
        // arguments.
        let temp = self.pages.push_temp();
        self.compile_node(&items[0], temp)?;

        // Chained closure.field.field… attaches to the callee.
        let mut n = 1;
        while n < items.len() && items[n].is_get_field() {
            self.compile_node(&items[n], temp)?;
            n += 1;
        }

        // Operators are exactly one byte; anything longer is a builtin or
        // user function.
        match self.pages.page(temp).len() {
            0 => {
                self.pages.pop_temp();
                Err(self.error_at(
                    x,
                    ErrorKind::Internal {
                        message: "call target compiled to no code".to_string(),
                    },
                ))
            }
            1 => {
                let op = self.pages.pop_temp().bytes()[0];
                self.compile_operator_call(x, &items[n..], op, p)
            }
            _ => {
                for arg in &items[n..] {
                    self.compile_node(arg, p)?;
                }
                let callee = self.pages.pop_temp();
                self.pages.page_mut(p).extend(&callee);

                self.emit(p, Instruction::Call, None);
                let argc = count_objects(&items[1..]);
                self.pages.page_mut(p).push_u16(argc as u16);
                Ok(())
            }
        }
    }

    /// Variadic operator chaining: `(op a b c d)` lowers to the left fold
    /// `a b op c op d op`.
    fn compile_operator_call(&mut self, x: &Node, args: &[Node], op: u8, p: PageRef) -> Result<()> {
        let mut exp_count = 0usize;
        for (i, arg) in args.iter().enumerate() {
            self.compile_node(arg, p)?;

            let completes = match args.get(i + 1) {
                Some(next) => !next.is_get_field() && !next.is_capture(),
                None => true,
            };
            if completes {
                exp_count += 1;
            }
            if exp_count >= 2 {
                self.pages.page_mut(p).push_byte(op);
            }
        }

        // unary operator form
        if exp_count == 1 {
            self.pages.page_mut(p).push_byte(op);
        }

        if exp_count > 2 && !instruction::is_chainable_operator(op) {
            let operator = instruction::operator_name(op).unwrap_or("?").to_string();
            return Err(self.error_at(
                x,
                ErrorKind::BadChainedOperator {
                    operator,
                    length: exp_count,
                },
            ));
        }
        Ok(())
    }

    // ========================================================================
    // Post-pass
    // ========================================================================

    /// Every interned symbol must be defined somewhere or plausibly come
    /// from an imported plugin.
    fn check_undefined_symbols(&self) -> Result<()> {
        for entry in self.symbols.entries() {
            if self.defined_symbols.contains(&entry.name) || self.may_be_from_plugin(&entry.name) {
                continue;
            }
            return Err(CompileError::with_context(
                ErrorKind::UndefinedSymbol {
                    name: entry.name.clone(),
                },
                self.context_for(entry.pos),
            ));
        }
        Ok(())
    }

    /// `stem:ident` is allowed when `stem` matches the file stem of a
    /// recorded plugin path.
    fn may_be_from_plugin(&self, name: &str) -> bool {
        let stem = name.split(':').next().unwrap_or(name);
        self.plugins.iter().any(|plugin| {
            Path::new(plugin)
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|s| s == stem)
        })
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn emit(&mut self, p: PageRef, inst: Instruction, immediate: Option<u16>) {
        let page = self.pages.page_mut(p);
        page.push_op(inst);
        if let Some(n) = immediate {
            page.push_u16(n);
        }
    }

    fn add_symbol(&mut self, name: &str, node: &Node) -> Result<u16> {
        match self.symbols.intern(name, node.pos) {
            Some(id) => Ok(id),
            None => Err(self.error_at(node, ErrorKind::TooManySymbols)),
        }
    }

    fn add_value(&mut self, value: ValueEntry, node: &Node) -> Result<u16> {
        match self.values.intern(value) {
            Some(id) => Ok(id),
            None => Err(self.error_at(node, ErrorKind::TooManyValues)),
        }
    }

    fn nil_builtin(&self, node: &Node) -> Result<u16> {
        builtin_index("nil").ok_or_else(|| {
            self.error_at(
                node,
                ErrorKind::Internal {
                    message: "builtin table has no nil".to_string(),
                },
            )
        })
    }

    /// Allocate a numbered page for a function or quotation body,
    /// returning its reference and its 16-bit address.
    fn new_body_page(&mut self, node: &Node) -> Result<(PageRef, u16)> {
        let id = self.pages.new_page();
        match u16::try_from(id) {
            Ok(addr) => Ok((PageRef::Page(id), addr)),
            Err(_) => Err(self.error_at(
                node,
                ErrorKind::Internal {
                    message: "too many code pages".to_string(),
                },
            )),
        }
    }

    /// The `name` child of a `(let|mut|set|del name …)` form.
    fn binding_name(&self, x: &Node, items: &[Node], form: &str) -> Result<String> {
        match items.get(1).map(|n| &n.kind) {
            Some(NodeKind::Symbol(name)) => Ok(name.clone()),
            _ => Err(self.error_at(
                x,
                ErrorKind::Syntax {
                    message: format!("{} takes a symbol name", form),
                },
            )),
        }
    }

    fn error_at(&self, node: &Node, kind: ErrorKind) -> CompileError {
        CompileError::with_context(kind, self.context_for(node.pos))
    }

    fn context_for(&self, pos: SourcePos) -> ErrorContext {
        ErrorContext {
            filename: self.filename.clone(),
            line: pos.line,
            column: pos.column,
            source_line: source_line(&self.source, pos.line),
        }
    }
}

/// Count the Ark objects in `nodes`: field accessors and captures are
/// positional annotations, not arguments.
fn count_objects(nodes: &[Node]) -> usize {
    nodes
        .iter()
        .filter(|n| !n.is_get_field() && !n.is_capture())
        .count()
}

fn source_line(source: &str, line: u32) -> Option<String> {
    source
        .lines()
        .nth(line.saturating_sub(1) as usize)
        .map(str::to_string)
}
