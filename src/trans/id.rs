use std::mem;

use tracing::debug;

use crate::{
    ast::{BinaryOp, Expr, ExprKind, IdKind, IdRef, Ident, Stmt, StmtKind, Value},
    diag::{Error, Fatal},
    ir::{Abi, Function, Module, ValType, STACK_MAX, STACK_TOP},
    meta::{align_up, Meta, Type},
    syslib::SysFn,
    token::Span,
    trans::{global, reg, u32_lit, Result, Storage, Trans},
};

/// Stack frames are rounded up to this many bytes.
const FRAME_ALIGN: u32 = 8;

/// Declarations.
impl Trans<'_> {
    pub(super) fn trans_container(mut self, r: IdRef) -> Result<Module> {
        if matches!(self.ast.id(r).kind, IdKind::Contract(_)) {
            self.layout_storage(r);
        }
        for func in self.fn_order(r) {
            self.trans_func(r, func)?;
        }
        debug!(
            module = self.idents.get(self.module.name),
            fns = self.module.fns.len(),
            heap = self.module.heap_usage,
            "lowered module"
        );
        Ok(self.module)
    }

    /// The functions of a container, in module order: the constructor first,
    /// then the functions of the implemented interface in its order, then the
    /// rest in declaration order.
    fn fn_order(&self, r: IdRef) -> Vec<IdRef> {
        let Some(blk) = self.ast.id(r).members() else {
            return Vec::new();
        };
        let mut rest: Vec<IdRef> = self
            .ast
            .block(blk)
            .ids
            .iter()
            .copied()
            .filter(|f| self.ast.id(*f).as_func().is_some_and(|func| func.body.is_some()))
            .collect();
        let mut order = Vec::with_capacity(rest.len());
        if let Some(pos) = rest.iter().position(|f| self.ast.id(*f).is_ctor()) {
            order.push(rest.remove(pos));
        }
        let itf = match &self.ast.id(r).kind {
            IdKind::Contract(cont) => cont.itf.and_then(|itf| self.ast.id(itf).members()),
            _ => None,
        };
        if let Some(itf) = itf {
            for spec in &self.ast.block(itf).ids {
                let name = self.ast.id(*spec).name;
                if let Some(pos) = rest.iter().position(|f| self.ast.id(*f).name == name) {
                    order.push(rest.remove(pos));
                }
            }
        }
        order.extend(rest);
        order
    }

    /// Assigns contract storage to the contract variables, in declaration
    /// order.
    fn layout_storage(&mut self, cont: IdRef) {
        let Some(blk) = self.ast.id(cont).members() else {
            return;
        };
        let mut offset = 0;
        for r in self.ast.block(blk).ids.clone() {
            let vars = match &self.ast.id(r).kind {
                IdKind::Var(_) => vec![r],
                IdKind::Tuple(tuple) => tuple.elems.clone(),
                _ => continue,
            };
            for var in vars {
                let id = self.ast.id(var);
                if id.is_const() {
                    continue;
                }
                let start = align_up(offset, id.meta.align());
                let end = start.checked_add(id.meta.storage_size());
                if end.is_none() && offset < u32::MAX {
                    self.diags.error(id.span, Error::TooLarge);
                }
                self.globals.insert(var, Storage::Heap(start));
                offset = end.unwrap_or(u32::MAX);
            }
        }
        self.module.heap_usage = offset;
    }

    fn trans_func(&mut self, cont: IdRef, r: IdRef) -> Result {
        let id = self.ast.id(r);
        let IdKind::Func(decl) = &id.kind else {
            return Err(Fatal::Invariant("expected a function"));
        };
        let Some(body) = decl.body else {
            return Ok(());
        };
        let params = decl.params.clone();
        let (name, span, is_ctor, is_public) = (id.name, id.span, id.is_ctor(), id.is_public());
        let ret = id.meta.clone();
        let cont_id = self.ast.id(cont);
        let has_self = !is_ctor && matches!(cont_id.kind, IdKind::Contract(_));
        let cont_meta = Meta::object(Some(cont), Some(cont_id.name));
        let qname = self.qname(r);

        let mut func = Function::new(name, qname, ret);
        func.is_ctor = is_ctor;
        func.is_public = is_public;
        if has_self {
            func.heap_reg = Some(func.add_reg(cont_meta));
        }
        self.locals.clear();
        self.labels.clear();
        self.jumps.clear();
        for param in params {
            let idx = func.add_reg(self.ast.id(param).meta.clone());
            self.locals.insert(param, Storage::Reg(idx));
        }
        func.param_cnt = u32::try_from(func.regs.len()).unwrap_or(u32::MAX);
        let abi = Abi {
            params: func.regs.iter().filter_map(ValType::of).collect(),
            result: ValType::of(&func.ret),
        };
        func.abi = self.module.add_abi(abi);
        if is_ctor {
            func.heap_reg = Some(func.add_reg(Meta::new(Type::UInt32)));
        }

        self.bb = Some(func.entry);
        self.func = func;
        if is_ctor {
            self.init_fields(cont)?;
        }
        self.trans_block(body)?;
        let exit = self.func.exit;
        self.close(exit);

        self.func.count_refs();
        let must_return = !is_ctor && !self.func.ret.is_void();
        if must_return && self.func.missing_returns().next().is_some() {
            self.diags.error(span, Error::MissingReturn(name));
        }
        if is_ctor {
            self.alloc_storage(span)?;
        }
        self.patch_stack(span);
        if is_ctor {
            let heap = reg(self.heap_reg()?, Meta::new(Type::UInt32), span);
            let ret = Stmt::new(StmtKind::Return(Some(heap)), span);
            self.func.block_mut(exit).stmts.push(ret);
        }

        let placeholder = Function::new(self.module.name, self.module.name, Meta::default());
        let func = mem::replace(&mut self.func, placeholder);
        debug!(
            function = self.idents.get(qname),
            blocks = func.blocks.len(),
            regs = func.regs.len(),
            stack = func.stack_usage,
            "lowered function"
        );
        self.module.fns.push(func);
        Ok(())
    }

    /// Lowers the initializers of the contract variables, in declaration
    /// order, into the constructor.
    fn init_fields(&mut self, cont: IdRef) -> Result {
        let Some(blk) = self.ast.id(cont).members() else {
            return Ok(());
        };
        for r in self.ast.block(blk).ids.clone() {
            let id = self.ast.id(r);
            if id.is_const() {
                continue;
            }
            let (lhs, init) = match &id.kind {
                IdKind::Var(var) => match &var.init {
                    Some(init) => (self.id_expr(r, init.span), init.clone()),
                    None => continue,
                },
                IdKind::Tuple(tuple) => match &tuple.init {
                    Some(init) => {
                        let elems = tuple.elems.iter().map(|e| self.id_expr(*e, init.span)).collect();
                        let meta = init.meta.clone();
                        let lhs = Expr::new(ExprKind::Tuple(elems), init.span).with_meta(meta);
                        (lhs, init.clone())
                    }
                    None => continue,
                },
                _ => continue,
            };
            self.trans_assign(lhs, init)?;
        }
        Ok(())
    }

    /// A reference to a variable, as the checker would have resolved it.
    pub(super) fn id_expr(&self, r: IdRef, span: Span) -> Expr {
        let id = self.ast.id(r);
        let ident = Ident {
            name: id.name,
            span,
        };
        let mut expr = Expr::new(ExprKind::Id(ident), span).with_meta(id.meta.clone());
        expr.id = Some(r);
        expr.is_lvalue = true;
        expr
    }

    /// Assigns storage to a local variable.
    pub(super) fn alloc_local(&mut self, r: IdRef) {
        let id = self.ast.id(r);
        let meta = &id.meta;
        let storage = if meta.is_array() || meta.is_struct() {
            let offset = align_up(self.func.stack_usage, meta.align().max(1));
            let end = offset.checked_add(meta.storage_size());
            if end.is_none() && self.func.stack_usage < u32::MAX {
                self.diags.error(id.span, Error::TooLarge);
            }
            self.func.stack_usage = end.unwrap_or(u32::MAX);
            Storage::Stack(offset)
        } else {
            Storage::Reg(self.func.add_reg(meta.clone()))
        };
        self.locals.insert(r, storage);
    }

    /// Prepends the allocation of contract storage to the constructor.
    fn alloc_storage(&mut self, span: Span) -> Result {
        let usage = self.module.heap_usage;
        if usage == 0 {
            return Ok(());
        }
        let heap = reg(self.heap_reg()?, Meta::new(Type::UInt32), span);
        let malloc = SysFn::Malloc.call(self.idents, vec![u32_lit(usage, span)], span);
        let stmt = Stmt::new(StmtKind::Assign { lhs: heap, rhs: malloc }, span);
        let entry = self.func.entry;
        self.func.block_mut(entry).stmts.insert(0, stmt);
        Ok(())
    }

    /// Reserves the stack frame on entry and releases it on exit.
    ///
    /// The entry saves the stack top, advances it past the frame and then
    /// checks it against the stack limit.
    fn patch_stack(&mut self, span: Span) {
        let usage = self.func.stack_usage;
        if usage == 0 {
            return;
        }
        let u32_meta = Meta::new(Type::UInt32);
        let base = reg(self.stack_reg(), u32_meta.clone(), span);
        let top = global(self.idents.intern(STACK_TOP), u32_meta.clone(), span);
        let max = global(self.idents.intern(STACK_MAX), u32_meta.clone(), span);

        let advanced = ExprKind::Binary {
            op: BinaryOp::Add,
            lhs: Box::new(top.clone()),
            rhs: Box::new(u32_lit(align_up(usage, FRAME_ALIGN), span)),
        };
        let within = ExprKind::Binary {
            op: BinaryOp::Le,
            lhs: Box::new(top.clone()),
            rhs: Box::new(max),
        };
        let within = Expr::new(within, span).with_meta(Meta::new(Type::Bool));
        let msg = self.str_lit("stack overflow", span);
        let null = Expr::lit(Value::Null, span);
        let guard = SysFn::Assert.call(self.idents, vec![within, msg, null], span);

        let prologue = [
            Stmt::new(
                StmtKind::Assign {
                    lhs: base.clone(),
                    rhs: top.clone(),
                },
                span,
            ),
            Stmt::new(
                StmtKind::Assign {
                    lhs: top.clone(),
                    rhs: Expr::new(advanced, span).with_meta(u32_meta),
                },
                span,
            ),
            Stmt::new(StmtKind::Exp(guard), span),
        ];
        let entry = self.func.entry;
        self.func.block_mut(entry).stmts.splice(0..0, prologue);

        let restore = Stmt::new(StmtKind::Assign { lhs: top, rhs: base }, span);
        let exit = self.func.exit;
        self.func.block_mut(exit).stmts.push(restore);
    }
}
