use std::fmt::{self, Write};

use crate::{
    ast::*,
    meta::Type,
    util::{
        fmt::{Context, Show},
        intern::{Interned, Interner},
    },
};

const INDENT_WIDTH: usize = 2;

/// Renders the whole tree. With `typed`, expressions also show their resolved
/// metas.
pub fn print_program_string(idents: &Interner<str>, ast: &Ast, typed: bool) -> String {
    let mut buf = String::with_capacity(1024);
    Printer::new(&mut buf, idents, ast, typed)
        .program()
        .expect("formatting into a string is infallible");
    buf
}

pub fn print_expr_string(idents: &Interner<str>, ast: &Ast, expr: &Expr, typed: bool) -> String {
    let mut buf = String::with_capacity(512);
    Printer::new(&mut buf, idents, ast, typed)
        .expr(0, expr)
        .expect("formatting into a string is infallible");
    buf
}

struct Printer<'w, 'a> {
    w: &'w mut String,
    idents: &'a Interner<str>,
    ast: &'a Ast,
    typed: bool,
}

impl<'w, 'a> Printer<'w, 'a> {
    fn new(w: &'w mut String, idents: &'a Interner<str>, ast: &'a Ast, typed: bool) -> Self {
        Printer {
            w,
            idents,
            ast,
            typed,
        }
    }

    fn sp(&mut self, i: usize) -> fmt::Result {
        write!(self.w, "{:width$}", "", width = i * INDENT_WIDTH)
    }

    fn name(&self, name: Interned<str>) -> &'a str {
        self.idents.get(name)
    }

    fn program(&mut self) -> fmt::Result {
        let ast = self.ast;
        for import in &ast.imports {
            writeln!(self.w, "import \"{}\"", import.inner)?;
        }
        for r in &ast.block(ast.root).ids {
            self.id(0, *r)?;
        }
        Ok(())
    }

    fn mods(&mut self, mods: Modifiers) -> fmt::Result {
        let names: Vec<_> = mods.names().collect();
        if !names.is_empty() {
            write!(self.w, " [{}]", names.join(" "))?;
        }
        Ok(())
    }

    fn id(&mut self, i: usize, r: IdRef) -> fmt::Result {
        let ast = self.ast;
        let id = ast.id(r);
        let name = self.name(id.name);
        self.sp(i)?;
        match &id.kind {
            IdKind::Contract(cont) => {
                write!(self.w, "contract {name}")?;
                if let Some(itf) = cont.implements {
                    write!(self.w, " implements {}", self.name(itf.name))?;
                }
                writeln!(self.w)?;
                self.members(i + 1, cont.blk)
            }
            IdKind::Interface(blk) => {
                writeln!(self.w, "interface {name}")?;
                self.members(i + 1, *blk)
            }
            IdKind::Library(blk) => {
                writeln!(self.w, "library {name}")?;
                self.members(i + 1, *blk)
            }
            IdKind::Struct(fields) => {
                writeln!(self.w, "struct {name}")?;
                for field in fields {
                    self.id(i + 1, *field)?;
                }
                Ok(())
            }
            IdKind::Enum(elems) => {
                writeln!(self.w, "enum {name}")?;
                for elem in elems {
                    self.id(i + 1, *elem)?;
                }
                Ok(())
            }
            IdKind::Func(func) => {
                write!(self.w, "func {name}")?;
                self.mods(id.mods)?;
                writeln!(self.w)?;
                for param in &func.params {
                    self.id(i + 1, *param)?;
                }
                if let Some(ret) = &func.ret {
                    self.sp(i + 1)?;
                    writeln!(self.w, "returns {}", self.type_name(ret))?;
                }
                if let Some(body) = func.body {
                    self.stmts(i + 1, body)?;
                }
                Ok(())
            }
            IdKind::Var(var) => {
                let what = if var.is_param { "param" } else { "var" };
                write!(self.w, "{what} {name}")?;
                if let Some(ty) = &var.ty {
                    write!(self.w, ": {}", self.type_name(ty))?;
                }
                self.dims(&var.dims)?;
                self.mods(id.mods)?;
                if let Some(value) = &var.value {
                    write!(self.w, " = {value}")?;
                }
                writeln!(self.w)?;
                if let Some(init) = &var.init {
                    self.expr(i + 1, init)?;
                }
                Ok(())
            }
            IdKind::Tuple(tuple) => {
                let names: Vec<_> = tuple
                    .elems
                    .iter()
                    .map(|elem| self.name(ast.id(*elem).name))
                    .collect();
                write!(self.w, "vars {}", names.join(", "))?;
                if let Some(ty) = &tuple.ty {
                    write!(self.w, ": {}", self.type_name(ty))?;
                }
                self.mods(id.mods)?;
                writeln!(self.w)?;
                if let Some(init) = &tuple.init {
                    self.expr(i + 1, init)?;
                }
                Ok(())
            }
            IdKind::Label => writeln!(self.w, "label {name}"),
        }
    }

    fn dims(&mut self, dims: &[Option<Expr>]) -> fmt::Result {
        for dim in dims {
            match dim.as_ref().map(|dim| &dim.kind) {
                None => write!(self.w, "[]")?,
                Some(ExprKind::Lit(value)) => write!(self.w, "[{value}]")?,
                Some(ExprKind::Id(ident)) => write!(self.w, "[{}]", self.name(ident.name))?,
                Some(_) => write!(self.w, "[..]")?,
            }
        }
        Ok(())
    }

    fn members(&mut self, i: usize, blk: BlockId) -> fmt::Result {
        let ast = self.ast;
        for r in &ast.block(blk).ids {
            self.id(i, *r)?;
        }
        Ok(())
    }

    fn stmts(&mut self, i: usize, blk: BlockId) -> fmt::Result {
        let ast = self.ast;
        for stmt in &ast.block(blk).stmts {
            self.stmt(i, stmt)?;
        }
        Ok(())
    }

    fn type_name(&self, expr: &Expr) -> String {
        match &expr.kind {
            ExprKind::Type(TypeName::Prim(ty)) => ty.name().to_owned(),
            ExprKind::Type(TypeName::Named(ident)) => self.name(ident.name).to_owned(),
            ExprKind::Type(TypeName::Map { key, value }) => {
                format!("map({}, {})", self.type_name(key), self.type_name(value))
            }
            _ => "?".to_owned(),
        }
    }

    fn stmt(&mut self, i: usize, stmt: &Stmt) -> fmt::Result {
        if let Some(label) = stmt.label {
            self.sp(i)?;
            let label = self.name(self.ast.id(label).name);
            writeln!(self.w, "{label}:")?;
        }
        if let StmtKind::Decl(r) = &stmt.kind {
            return self.id(i, *r);
        }
        self.sp(i)?;
        match &stmt.kind {
            StmtKind::Null => writeln!(self.w, "null"),
            StmtKind::Exp(expr) => {
                writeln!(self.w, "exp")?;
                self.expr(i + 1, expr)
            }
            StmtKind::Assign { lhs, rhs } => {
                writeln!(self.w, "assign")?;
                self.expr(i + 1, lhs)?;
                self.expr(i + 1, rhs)
            }
            StmtKind::Decl(_) => Ok(()),
            StmtKind::If(stmt) => {
                writeln!(self.w, "if")?;
                self.expr(i + 1, &stmt.cond)?;
                self.branch(i, "then", stmt.then)?;
                for elif in &stmt.elifs {
                    self.sp(i)?;
                    writeln!(self.w, "else if")?;
                    self.expr(i + 1, &elif.cond)?;
                    self.branch(i, "then", elif.blk)?;
                }
                if let Some(els) = stmt.els {
                    self.branch(i, "else", els)?;
                }
                Ok(())
            }
            StmtKind::Loop(lp) => {
                writeln!(self.w, "{}", if lp.is_array { "loop in" } else { "loop" })?;
                if let Some(init) = &lp.init {
                    self.sp(i + 1)?;
                    writeln!(self.w, "init")?;
                    self.stmt(i + 2, init)?;
                }
                if let Some(cond) = &lp.cond {
                    self.sp(i + 1)?;
                    writeln!(self.w, "cond")?;
                    self.expr(i + 2, cond)?;
                }
                if let Some(inc) = &lp.inc {
                    self.sp(i + 1)?;
                    writeln!(self.w, "inc")?;
                    self.expr(i + 2, inc)?;
                }
                self.branch(i + 1, "body", lp.blk)
            }
            StmtKind::Switch(switch) => {
                writeln!(self.w, "switch")?;
                if let Some(subject) = &switch.subject {
                    self.expr(i + 1, subject)?;
                }
                self.branch(i + 1, "body", switch.blk)
            }
            StmtKind::Case(Some(val)) => {
                writeln!(self.w, "case")?;
                self.expr(i + 1, val)
            }
            StmtKind::Case(None) => writeln!(self.w, "default"),
            StmtKind::Return(val) => {
                writeln!(self.w, "return")?;
                match val {
                    Some(val) => self.expr(i + 1, val),
                    None => Ok(()),
                }
            }
            StmtKind::Continue => writeln!(self.w, "continue"),
            StmtKind::Break(None) => writeln!(self.w, "break"),
            StmtKind::Break(Some(cond)) => {
                writeln!(self.w, "break if")?;
                self.expr(i + 1, cond)
            }
            StmtKind::Goto { target, .. } => writeln!(self.w, "goto {}", self.name(target.name)),
            StmtKind::Ddl(text) => writeln!(self.w, "ddl \"{text}\""),
            StmtKind::Block(blk) => {
                writeln!(self.w, "block")?;
                self.stmts(i + 1, *blk)
            }
            StmtKind::Pragma(Pragma::Assert { cond, text, desc }) => {
                write!(self.w, "assert \"{text}\"")?;
                if let Some(desc) = desc {
                    write!(self.w, " \"{desc}\"")?;
                }
                writeln!(self.w)?;
                self.expr(i + 1, cond)
            }
        }
    }

    fn branch(&mut self, i: usize, what: &str, blk: BlockId) -> fmt::Result {
        self.sp(i)?;
        writeln!(self.w, "{what}")?;
        self.stmts(i + 1, blk)
    }

    fn expr(&mut self, i: usize, expr: &Expr) -> fmt::Result {
        self.sp(i)?;
        match &expr.kind {
            ExprKind::Null => write!(self.w, "none")?,
            ExprKind::Lit(value) => write!(self.w, "lit {value}")?,
            ExprKind::Id(ident) => write!(self.w, "id {}", self.name(ident.name))?,
            ExprKind::Type(_) => write!(self.w, "type {}", self.type_name(expr))?,
            ExprKind::Array { .. } => write!(self.w, "index")?,
            ExprKind::Cast { ty, .. } => write!(self.w, "cast {}", self.type_name(ty))?,
            ExprKind::Unary { op, .. } if op.is_postfix() => {
                write!(self.w, "postfix {}", op.symbol())?;
            }
            ExprKind::Unary { op, .. } => write!(self.w, "unary {}", op.symbol())?,
            ExprKind::Binary { op, .. } => write!(self.w, "binary {}", op.symbol())?,
            ExprKind::Ternary { .. } => write!(self.w, "ternary")?,
            ExprKind::Access { field, .. } => write!(self.w, "access {}", self.name(field.name))?,
            ExprKind::Call { kind, .. } => write!(
                self.w,
                "{}",
                match kind {
                    CallKind::Udf => "call",
                    CallKind::Ctor => "new",
                    CallKind::Sys => "syscall",
                }
            )?,
            ExprKind::Sql { kind, text } => write!(self.w, "sql {kind:?} \"{text}\"")?,
            ExprKind::Tuple(_) => write!(self.w, "tuple")?,
            ExprKind::Init(_) => write!(self.w, "init")?,
            ExprKind::Alloc { ty, .. } => write!(self.w, "alloc {}", self.type_name(ty))?,
            ExprKind::Global(name) => write!(self.w, "global {}", self.name(*name))?,
            ExprKind::Reg(idx) => write!(self.w, "reg {idx}")?,
            ExprKind::Mem { base, addr, offset } => {
                write!(self.w, "mem {base} {addr}+{offset}")?;
            }
        }
        if self.typed && expr.meta.ty != Type::None {
            let ctx = Context {
                ident_interner: self.idents,
            };
            write!(self.w, " : {}", expr.meta.display(&ctx))?;
        }
        writeln!(self.w)?;

        match &expr.kind {
            ExprKind::Array { base, index } => {
                self.expr(i + 1, base)?;
                self.expr(i + 1, index)
            }
            ExprKind::Cast { val, .. } | ExprKind::Unary { val, .. } => self.expr(i + 1, val),
            ExprKind::Binary { lhs, rhs, .. } => {
                self.expr(i + 1, lhs)?;
                self.expr(i + 1, rhs)
            }
            ExprKind::Ternary { cond, then, els } => {
                self.expr(i + 1, cond)?;
                self.expr(i + 1, then)?;
                self.expr(i + 1, els)
            }
            ExprKind::Access { qual, .. } => self.expr(i + 1, qual),
            ExprKind::Call { callee, args, .. } => {
                self.expr(i + 1, callee)?;
                for arg in args {
                    self.expr(i + 1, arg)?;
                }
                Ok(())
            }
            ExprKind::Tuple(elems) | ExprKind::Init(elems) => {
                for elem in elems {
                    self.expr(i + 1, elem)?;
                }
                Ok(())
            }
            ExprKind::Alloc { dims, .. } => {
                for dim in dims {
                    self.expr(i + 1, dim)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
