//! A readable listing of the intermediate representation.
//!
//! The listing is what `--dump-ir` prints. Rendering also validates the
//! module the way a binary backend would before emitting anything.

use std::{
    fmt::{self, Write},
    format_args as f,
};

use crate::{
    ast::{CallKind, Expr, ExprKind, Stmt, StmtKind, Value},
    backend::Backend,
    ir::{Abi, BbId, Function, Module, STACK_MAX},
    util::{
        fmt::{Context, Show},
        intern::{Interned, Interner},
    },
};

const DEFAULT_LISTING_CAPACITY: usize = 4 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("{func}: branch to missing block {target}")]
    InvalidBranch { func: String, target: BbId },
    #[error("{func}: register r{reg} is out of range")]
    InvalidRegister { func: String, reg: u32 },
    #[error("{func}: signature {abi} is out of range")]
    InvalidAbi { func: String, abi: usize },
    #[error("{func}: no data at @{addr}")]
    InvalidAddress { func: String, addr: u32 },
    #[error("{func}: {what} was not lowered")]
    Unlowered { func: String, what: &'static str },
}

type Result<T = (), E = BackendError> = std::result::Result<T, E>;

/// Renders modules as text.
#[derive(Debug, Default)]
pub struct TextBackend {
    stack_max: Option<u32>,
}

impl TextBackend {
    pub fn new() -> TextBackend {
        TextBackend::default()
    }

    /// Also lists the value of the stack limit global.
    pub fn with_stack_max(stack_max: u32) -> TextBackend {
        TextBackend {
            stack_max: Some(stack_max),
        }
    }
}

impl Backend for TextBackend {
    type Output = String;
    type Error = BackendError;

    fn generate(&mut self, module: &Module, idents: &Interner<str>) -> Result<String> {
        let mut printer = Printer {
            code: String::with_capacity(DEFAULT_LISTING_CAPACITY),
            ctx: Context {
                ident_interner: idents,
            },
            module,
            func: "",
        };
        printer.module(self.stack_max)?;
        Ok(printer.code)
    }
}

struct Printer<'a> {
    code: String,
    ctx: Context<'a>,
    module: &'a Module,
    /// Name of the function being rendered, for errors.
    func: &'a str,
}

impl<'a> Printer<'a> {
    fn module(&mut self, stack_max: Option<u32>) -> Result {
        let module = self.module;
        let name = self.ident(module.name);
        self.out(f!("module {name}\n"));
        for (idx, abi) in module.abis.iter().enumerate() {
            self.out(f!("  abi {idx} "));
            self.abi(abi);
            self.out(f!("\n"));
        }
        if let Some(max) = stack_max {
            self.out(f!("  global ${STACK_MAX} = {max}\n"));
        }
        for func in &module.fns {
            self.func(func)?;
        }
        for datum in module.segment.iter() {
            self.out(f!("  data @{} \"", datum.addr));
            for &b in &datum.bytes {
                match b {
                    0 => self.out(f!("\\0")),
                    b'\n' => self.out(f!("\\n")),
                    b'"' => self.out(f!("\\\"")),
                    b'\\' => self.out(f!("\\\\")),
                    0x20..=0x7e => self.out(f!("{}", char::from(b))),
                    _ => self.out(f!("\\x{b:02x}")),
                }
            }
            self.out(f!("\"\n"));
        }
        Ok(())
    }

    fn abi(&mut self, abi: &Abi) {
        self.out(f!("("));
        for (idx, param) in abi.params.iter().enumerate() {
            if idx > 0 {
                self.out(f!(", "));
            }
            self.out(f!("{param}"));
        }
        match abi.result {
            Some(result) => self.out(f!(") -> {result}")),
            None => self.out(f!(") -> void")),
        }
    }

    fn func(&mut self, func: &Function) -> Result {
        self.func = self.ident(func.qname);
        if func.abi >= self.module.abis.len() {
            return Err(BackendError::InvalidAbi {
                func: self.func.to_owned(),
                abi: func.abi,
            });
        }
        let name = self.func;
        self.out(f!("  func {name}"));
        let mods: Vec<&str> = [(func.is_public, "public"), (func.is_ctor, "ctor")]
            .into_iter()
            .filter_map(|(set, name)| set.then_some(name))
            .collect();
        if !mods.is_empty() {
            self.out(f!(" [{}]", mods.join(" ")));
        }
        self.out(f!(" abi {} regs {}\n", func.abi, func.regs.len()));
        for (idx, meta) in func.regs.iter().enumerate() {
            let meta = meta.display(&self.ctx).to_string();
            self.out(f!("    r{idx}: {meta}\n"));
        }
        for (idx, block) in func.blocks.iter().enumerate() {
            self.out(f!("    bb{idx}:\n"));
            for stmt in &block.stmts {
                self.out(f!("      "));
                self.stmt(func, stmt)?;
                self.out(f!("\n"));
            }
            for branch in &block.branches {
                if branch.target.index() >= func.blocks.len() {
                    return Err(BackendError::InvalidBranch {
                        func: self.func.to_owned(),
                        target: branch.target,
                    });
                }
                self.out(f!("      -> {}", branch.target));
                if let Some(cond) = &branch.cond {
                    self.out(f!(" if "));
                    self.expr(func, cond)?;
                }
                self.out(f!("\n"));
            }
        }
        Ok(())
    }

    fn stmt(&mut self, func: &Function, stmt: &Stmt) -> Result {
        match &stmt.kind {
            StmtKind::Exp(expr) => self.expr(func, expr),
            StmtKind::Assign { lhs, rhs } => {
                self.expr(func, lhs)?;
                self.out(f!(" = "));
                self.expr(func, rhs)
            }
            StmtKind::Return(None) => {
                self.out(f!("return"));
                Ok(())
            }
            StmtKind::Return(Some(val)) => {
                self.out(f!("return "));
                self.expr(func, val)
            }
            StmtKind::Ddl(text) => {
                self.out(f!("ddl {text:?}"));
                Ok(())
            }
            _ => Err(self.unlowered("control flow statement")),
        }
    }

    fn expr(&mut self, func: &Function, expr: &Expr) -> Result {
        match &expr.kind {
            ExprKind::Null => self.out(f!("null")),
            ExprKind::Lit(Value::Addr(addr)) => {
                if self.module.segment.get(*addr).is_none() {
                    return Err(BackendError::InvalidAddress {
                        func: self.func.to_owned(),
                        addr: *addr,
                    });
                }
                self.out(f!("@{addr}"));
            }
            ExprKind::Lit(value) => self.out(f!("{value}")),
            ExprKind::Reg(idx) => {
                self.check_reg(func, *idx)?;
                self.out(f!("r{idx}"));
            }
            ExprKind::Mem { base, addr, offset } => {
                self.check_reg(func, *base)?;
                self.out(f!("[r{base}+{addr}"));
                if *offset != 0 {
                    self.out(f!("+{offset}"));
                }
                self.out(f!("]"));
            }
            ExprKind::Global(name) => {
                let name = self.ident(*name);
                self.out(f!("${name}"));
            }
            ExprKind::Type(_) => {
                let meta = expr.meta.display(&self.ctx).to_string();
                self.out(f!("{meta}"));
            }
            ExprKind::Array { base, index } => {
                self.expr(func, base)?;
                self.out(f!("["));
                self.expr(func, index)?;
                self.out(f!("]"));
            }
            ExprKind::Cast { val, .. } => {
                let meta = expr.meta.display(&self.ctx).to_string();
                self.out(f!("({meta}) "));
                self.expr(func, val)?;
            }
            ExprKind::Unary { op, val } => {
                self.out(f!("{}", op.symbol()));
                self.expr(func, val)?;
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.out(f!("("));
                self.expr(func, lhs)?;
                self.out(f!(" {} ", op.symbol()));
                self.expr(func, rhs)?;
                self.out(f!(")"));
            }
            ExprKind::Ternary { cond, then, els } => {
                self.out(f!("("));
                self.expr(func, cond)?;
                self.out(f!(" ? "));
                self.expr(func, then)?;
                self.out(f!(" : "));
                self.expr(func, els)?;
                self.out(f!(")"));
            }
            ExprKind::Access { qual, field } => {
                self.expr(func, qual)?;
                let field = self.ident(field.name);
                self.out(f!(".{field}"));
            }
            ExprKind::Call { callee, args, kind } => {
                self.out(f!(
                    "{} ",
                    match kind {
                        CallKind::Udf => "call",
                        CallKind::Ctor => "new",
                        CallKind::Sys => "syscall",
                    }
                ));
                match &callee.kind {
                    ExprKind::Global(name) => {
                        let name = self.ident(*name);
                        self.out(f!("{name}"));
                    }
                    _ => self.expr(func, callee)?,
                }
                self.list(func, "(", args, ")")?;
            }
            ExprKind::Sql { text, .. } => self.out(f!("sql {text:?}")),
            ExprKind::Tuple(elems) => self.list(func, "(", elems, ")")?,
            ExprKind::Init(elems) => self.list(func, "{", elems, "}")?,
            ExprKind::Id(_) => return Err(self.unlowered("identifier")),
            ExprKind::Alloc { .. } => return Err(self.unlowered("allocation")),
        }
        Ok(())
    }

    fn list(&mut self, func: &Function, open: &str, elems: &[Expr], close: &str) -> Result {
        self.out(f!("{open}"));
        for (idx, elem) in elems.iter().enumerate() {
            if idx > 0 {
                self.out(f!(", "));
            }
            self.expr(func, elem)?;
        }
        self.out(f!("{close}"));
        Ok(())
    }

    fn check_reg(&self, func: &Function, reg: u32) -> Result {
        if reg as usize >= func.regs.len() {
            return Err(BackendError::InvalidRegister {
                func: self.func.to_owned(),
                reg,
            });
        }
        Ok(())
    }

    fn unlowered(&self, what: &'static str) -> BackendError {
        BackendError::Unlowered {
            func: self.func.to_owned(),
            what,
        }
    }

    fn ident(&self, name: Interned<str>) -> &'a str {
        self.ctx.ident_interner.get(name)
    }
}

// Utility functions.
impl Printer<'_> {
    fn out(&mut self, f: fmt::Arguments<'_>) {
        self.code
            .write_fmt(f)
            .expect("code emit should be infallible");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{Abi, ValType},
        meta::{Meta, Type},
        token::Span,
    };

    fn module(i: &mut Interner<str>) -> Module {
        let mut module = Module::new(i.intern("A"));
        let abi = module.add_abi(Abi {
            params: vec![ValType::I32],
            result: None,
        });
        let mut func = Function::new(i.intern("f"), i.intern("A.f"), Meta::new(Type::Void));
        func.abi = abi;
        func.add_reg(Meta::new(Type::Int32));
        let (entry, exit) = (func.entry, func.exit);
        func.add_branch(entry, None, exit);
        module.fns.push(func);
        module
    }

    #[test]
    fn listing() {
        let mut i = Interner::with_capacity(8);
        let mut module = module(&mut i);
        let addr = module.segment.intern(b"a\n\"\x01\0");
        let span = Span::default();
        let f = &mut module.fns[0];
        let lhs = Expr::new(ExprKind::Reg(0), span);
        let rhs = Expr::lit(Value::Addr(addr), span);
        let entry = f.entry;
        f.block_mut(entry)
            .stmts
            .push(Stmt::new(StmtKind::Assign { lhs, rhs }, span));

        let listing = TextBackend::with_stack_max(1024)
            .generate(&module, &i)
            .unwrap();
        pretty_assertions::assert_eq!(
            listing,
            indoc::indoc! {r#"
                module A
                  abi 0 (i32) -> void
                  global $stack$max = 1024
                  func A.f abi 0 regs 1
                    r0: int32
                    bb0:
                      r0 = @0
                      -> bb1
                    bb1:
                  data @0 "a\n\"\x01\0"
            "#}
        );
    }

    #[test]
    fn rejects_missing_blocks() {
        let mut i = Interner::with_capacity(8);
        let mut module = module(&mut i);
        let f = &mut module.fns[0];
        let (entry, exit) = (f.entry, f.exit);
        let target = f.new_block();
        f.blocks.pop();
        f.add_branch(exit, None, target);
        f.add_branch(entry, None, exit);
        let err = TextBackend::new().generate(&module, &i).unwrap_err();
        assert!(matches!(err, BackendError::InvalidBranch { .. }), "{err}");
    }

    #[test]
    fn rejects_unknown_registers_and_data() {
        let mut i = Interner::with_capacity(8);
        let mut module = module(&mut i);
        let span = Span::default();
        let entry = module.fns[0].entry;
        let stmt = Stmt::new(StmtKind::Exp(Expr::new(ExprKind::Reg(3), span)), span);
        module.fns[0].block_mut(entry).stmts.push(stmt);
        let err = TextBackend::new().generate(&module, &i).unwrap_err();
        assert_eq!(err.to_string(), "A.f: register r3 is out of range");

        module.fns[0].block_mut(entry).stmts.clear();
        let stmt = Stmt::new(StmtKind::Return(Some(Expr::lit(Value::Addr(8), span))), span);
        module.fns[0].block_mut(entry).stmts.push(stmt);
        let err = TextBackend::new().generate(&module, &i).unwrap_err();
        assert_eq!(err.to_string(), "A.f: no data at @8");
    }

    #[test]
    fn rejects_unlowered_nodes() {
        let mut i = Interner::with_capacity(8);
        let mut module = module(&mut i);
        let span = Span::default();
        let entry = module.fns[0].entry;
        module.fns[0]
            .block_mut(entry)
            .stmts
            .push(Stmt::new(StmtKind::Continue, span));
        let err = TextBackend::new().generate(&module, &i).unwrap_err();
        assert!(matches!(err, BackendError::Unlowered { .. }), "{err}");
    }
}
