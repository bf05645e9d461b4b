use crate::{
    ast::{BinaryOp, CallKind, Expr, ExprKind, IdKind, IdRef, Ident, Stmt, StmtKind, UnaryOp, Value},
    diag::Fatal,
    meta::{Meta, Type},
    syslib::SysFn,
    token::Span,
    trans::{global, lvalue, reg, u32_lit, Result, Trans},
};

/// Expressions.
impl Trans<'_> {
    /// Lowers an expression, replacing identifiers by their storage.
    /// Increments are emitted before the current statement.
    pub(super) fn trans_expr(&mut self, expr: Expr) -> Result<Expr> {
        let Expr {
            kind,
            span,
            meta,
            id,
            is_lvalue,
        } = expr;
        let kind = match kind {
            ExprKind::Id(_) => {
                let r = id.ok_or(Fatal::Invariant("unresolved identifier"))?;
                return self.trans_id(r, meta, span);
            }
            ExprKind::Lit(Value::Str(raw)) => return Ok(self.str_lit(&raw, span)),
            ExprKind::Array { base, index } => ExprKind::Array {
                base: Box::new(self.trans_expr(*base)?),
                index: Box::new(self.trans_expr(*index)?),
            },
            ExprKind::Cast { ty, val } => return self.trans_cast(*ty, *val, meta, span),
            ExprKind::Unary { op, val } if op.is_inc_dec() => {
                return self.trans_inc_dec(op, *val, span);
            }
            ExprKind::Unary { op, val } => ExprKind::Unary {
                op,
                val: Box::new(self.trans_expr(*val)?),
            },
            ExprKind::Binary { op, lhs, rhs } => {
                return self.trans_binary(op, *lhs, *rhs, meta, span);
            }
            ExprKind::Ternary { cond, then, els } => ExprKind::Ternary {
                cond: Box::new(self.trans_expr(*cond)?),
                then: Box::new(self.trans_expr(*then)?),
                els: Box::new(self.trans_expr(*els)?),
            },
            ExprKind::Access { qual, field } => {
                return self.trans_access(*qual, field, id, meta, span);
            }
            ExprKind::Call { callee, args, kind } => {
                return self.trans_call(*callee, args, kind, meta, span);
            }
            ExprKind::Tuple(elems) => ExprKind::Tuple(self.trans_exprs(elems)?),
            ExprKind::Init(elems) => ExprKind::Init(self.trans_exprs(elems)?),
            ExprKind::Alloc { dims, .. } => return self.trans_alloc(dims, meta, span),
            kind @ (ExprKind::Null
            | ExprKind::Lit(_)
            | ExprKind::Type(_)
            | ExprKind::Sql { .. }
            | ExprKind::Global(_)
            | ExprKind::Reg(_)
            | ExprKind::Mem { .. }) => kind,
        };
        Ok(Expr {
            kind,
            span,
            meta,
            id,
            is_lvalue,
        })
    }

    fn trans_exprs(&mut self, exprs: Vec<Expr>) -> Result<Vec<Expr>> {
        exprs.into_iter().map(|expr| self.trans_expr(expr)).collect()
    }

    fn trans_id(&mut self, r: IdRef, meta: Meta, span: Span) -> Result<Expr> {
        if let Some(storage) = self.storage(r) {
            return self.storage_expr(storage, meta, span);
        }
        match &self.ast.id(r).kind {
            // `this`
            IdKind::Contract(_) => Ok(reg(self.heap_reg()?, meta, span)),
            IdKind::Func(_) => {
                let qname = self.qname(r);
                Ok(global(qname, meta, span))
            }
            _ => Err(Fatal::Invariant("identifier without storage")),
        }
    }

    fn trans_access(
        &mut self,
        qual: Expr,
        field: Ident,
        id: Option<IdRef>,
        meta: Meta,
        span: Span,
    ) -> Result<Expr> {
        let qual_kind = qual.id.map(|q| &self.ast.id(q).kind);
        let is_self = matches!(qual_kind, Some(IdKind::Contract(_)));
        let is_type = matches!(
            qual_kind,
            Some(IdKind::Struct(_) | IdKind::Enum(_) | IdKind::Interface(_) | IdKind::Library(_))
        );
        if let (true, Some(storage)) = (is_self, id.and_then(|r| self.storage(r))) {
            return self.storage_expr(storage, meta, span);
        }
        let field_idx = match (id, qual.meta.type_id.map(|t| &self.ast.id(t).kind)) {
            (Some(r), Some(IdKind::Struct(fields))) if qual.meta.is_struct() => {
                fields.iter().position(|f| *f == r)
            }
            _ => None,
        };
        let qual_meta = qual.meta.clone();
        let qual = if is_type { qual } else { self.trans_expr(qual)? };
        if let (Some(idx), ExprKind::Mem { base, addr, offset }) = (field_idx, &qual.kind) {
            let kind = ExprKind::Mem {
                base: *base,
                addr: *addr,
                offset: offset.saturating_add(qual_meta.field_offset(idx)),
            };
            return Ok(lvalue(kind, meta, span));
        }
        let access = ExprKind::Access {
            qual: Box::new(qual),
            field,
        };
        let mut expr = Expr::new(access, span).with_meta(meta);
        expr.id = id;
        expr.is_lvalue = field_idx.is_some();
        Ok(expr)
    }

    /// Lowers a call. Contract functions take the address of the contract
    /// they are called on first: the qualifier of a method call, or the
    /// caller's own contract for a bare call.
    fn trans_call(
        &mut self,
        callee: Expr,
        args: Vec<Expr>,
        kind: CallKind,
        meta: Meta,
        span: Span,
    ) -> Result<Expr> {
        let mut lowered = Vec::with_capacity(args.len() + 1);
        let callee = match kind {
            CallKind::Sys => callee,
            CallKind::Ctor | CallKind::Udf => {
                let r = callee.id.ok_or(Fatal::Invariant("unresolved callee"))?;
                let up = self.ast.id(r).up.map(|up| &self.ast.id(up).kind);
                let has_self = kind == CallKind::Udf && !matches!(up, Some(IdKind::Library(_)));
                if has_self {
                    let this = match callee.kind {
                        ExprKind::Access { qual, .. } => self.trans_expr(*qual)?,
                        _ => {
                            let heap = self.heap_reg()?;
                            let meta = self.func.regs[heap as usize].clone();
                            reg(heap, meta, span)
                        }
                    };
                    lowered.push(this);
                }
                let qname = self.qname(r);
                global(qname, callee.meta, callee.span)
            }
        };
        for arg in args {
            lowered.push(self.trans_expr(arg)?);
        }
        let call = ExprKind::Call {
            callee: Box::new(callee),
            args: lowered,
            kind,
        };
        Ok(Expr::new(call, span).with_meta(meta))
    }

    /// Lowers a cast. Conversions between strings and integers are calls.
    fn trans_cast(&mut self, ty: Expr, val: Expr, meta: Meta, span: Span) -> Result<Expr> {
        let val = self.trans_expr(val)?;
        let wide = |meta: &Meta| matches!(meta.ty, Type::Int64 | Type::UInt64);
        let conv = if val.meta.is_string() && meta.is_integer() {
            Some(if wide(&meta) { SysFn::Atoi64 } else { SysFn::Atoi32 })
        } else if val.meta.is_integer() && meta.is_string() {
            Some(if wide(&val.meta) { SysFn::Itoa64 } else { SysFn::Itoa32 })
        } else {
            None
        };
        if let Some(conv) = conv {
            return Ok(conv.call(self.idents, vec![val], span).with_meta(meta));
        }
        let cast = ExprKind::Cast {
            ty: Box::new(ty),
            val: Box::new(val),
        };
        Ok(Expr::new(cast, span).with_meta(meta))
    }

    /// Emits the update of an increment or decrement. A postfix operation
    /// yields a copy of the old value.
    fn trans_inc_dec(&mut self, op: UnaryOp, val: Expr, span: Span) -> Result<Expr> {
        let target = self.trans_expr(val)?;
        let meta = target.meta.clone();
        let old = if op.is_postfix() {
            let tmp = reg(self.func.add_reg(meta.clone()), meta.clone(), span);
            let copy = StmtKind::Assign {
                lhs: tmp.clone(),
                rhs: target.clone(),
            };
            self.emit(Stmt::new(copy, span));
            Some(tmp)
        } else {
            None
        };
        let one = Expr::lit(Value::Int(1), span).with_meta(meta.clone());
        let step = ExprKind::Binary {
            op: match op {
                UnaryOp::PreInc | UnaryOp::PostInc => BinaryOp::Add,
                _ => BinaryOp::Sub,
            },
            lhs: Box::new(target.clone()),
            rhs: Box::new(one),
        };
        let update = StmtKind::Assign {
            lhs: target.clone(),
            rhs: Expr::new(step, span).with_meta(meta),
        };
        self.emit(Stmt::new(update, span));
        Ok(old.unwrap_or(target))
    }

    /// Lowers a binary operation. String concatenation and comparison are
    /// calls.
    fn trans_binary(
        &mut self,
        op: BinaryOp,
        lhs: Expr,
        rhs: Expr,
        meta: Meta,
        span: Span,
    ) -> Result<Expr> {
        let strings = lhs.meta.is_string() && rhs.meta.is_string();
        let lhs = self.trans_expr(lhs)?;
        let rhs = self.trans_expr(rhs)?;
        let (lhs, rhs) = match op {
            BinaryOp::Add if strings => {
                let call = SysFn::Strcat.call(self.idents, vec![lhs, rhs], span);
                return Ok(call.with_meta(meta));
            }
            _ if strings && op.is_cmp() => {
                let cmp = SysFn::Strcmp.call(self.idents, vec![lhs, rhs], span);
                (cmp, u32_lit(0, span))
            }
            _ => (lhs, rhs),
        };
        let binary = ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        };
        Ok(Expr::new(binary, span).with_meta(meta))
    }

    /// Lowers `new T` and `new T[n]` into an allocation of their size.
    fn trans_alloc(&mut self, dims: Vec<Expr>, meta: Meta, span: Span) -> Result<Expr> {
        let u32_meta = Meta::new(Type::UInt32);
        let size = if dims.is_empty() {
            u32_lit(meta.storage_size(), span)
        } else if !meta.dims.contains(&0) {
            u32_lit(meta.memsz(), span)
        } else {
            let mut size = u32_lit(meta.base().storage_size(), span);
            for dim in dims {
                let dim = self.trans_expr(dim)?;
                let mul = ExprKind::Binary {
                    op: BinaryOp::Mul,
                    lhs: Box::new(size),
                    rhs: Box::new(dim),
                };
                size = Expr::new(mul, span).with_meta(u32_meta.clone());
            }
            size
        };
        Ok(SysFn::Malloc.call(self.idents, vec![size], span).with_meta(meta))
    }
}
