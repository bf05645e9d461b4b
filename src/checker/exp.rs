use crate::{
    ast::{BinaryOp, CallKind, Expr, ExprKind, IdKind, IdRef, TypeName, UnaryOp, Value},
    checker::{Checker, Result, Scope, Stop},
    diag::{Error, Fatal},
    meta::{meta_eval, Meta, Type},
    token::Span,
    util::intern::Interned,
};

/// Expressions.
impl Checker<'_> {
    pub(super) fn check_expr(&mut self, expr: &mut Expr) -> Result {
        let span = expr.span;
        match &mut expr.kind {
            ExprKind::Null => expr.meta = Meta::new(Type::Void),
            ExprKind::Lit(value) => expr.meta = value.meta(),
            ExprKind::Id(ident) => {
                let (name, ident_span) = (ident.name, ident.span);
                let Some(r) = self.search_id(name) else {
                    return self.error(ident_span, Error::UndefinedId(name));
                };
                self.resolve(expr, r)?;
            }
            ExprKind::Type(_) => self.check_type(expr)?,
            ExprKind::Array { base, index } => {
                self.check_expr(base)?;
                self.check_expr(index)?;
                expr.meta = self.check_subscript(base, index)?;
                expr.is_lvalue = true;
            }
            ExprKind::Cast { ty, val } => {
                self.check_type(ty)?;
                self.check_expr(val)?;
                let (from, to) = (&val.meta, &ty.meta);
                let allowed = (from.is_numeric() && to.is_numeric())
                    || (from.is_string() && to.is_integer())
                    || (from.is_integer() && to.is_string())
                    || (from.ty == to.ty && from.dims == to.dims);
                if !allowed {
                    let error = Error::IncompatibleType {
                        from: from.concrete(),
                        to: to.clone(),
                    };
                    return self.error(span, error);
                }
                let concrete = val.meta.concrete();
                settle(val, &concrete);
                expr.meta = ty.meta.clone();
            }
            ExprKind::Unary { op, val } => {
                let op = *op;
                self.check_expr(val)?;
                expr.meta = self.check_unary(span, op, val)?;
                if op == UnaryOp::Neg {
                    negate_literal(expr);
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let op = *op;
                self.check_expr(lhs)?;
                self.check_expr(rhs)?;
                expr.meta = self.check_binary(span, op, lhs, rhs)?;
            }
            ExprKind::Ternary { cond, then, els } => {
                self.check_cond(cond)?;
                self.check_expr(then)?;
                self.check_expr(els)?;
                self.cmp(els.span, &then.meta, &els.meta)?;
                let meta = meta_eval(&then.meta, &els.meta);
                settle(then, &meta);
                settle(els, &meta);
                expr.meta = meta;
            }
            ExprKind::Access { qual, field } => {
                let field = *field;
                self.check_expr(qual)?;
                let qual_id = self.qualifier(qual);
                let found = qual_id.and_then(|qual_id| {
                    let scope = Scope {
                        qual_id: Some(qual_id),
                        ..self.scope
                    };
                    self.in_scope(scope, |c| c.search_id(field.name))
                });
                let Some(r) = found else {
                    if field.name == self.size && (qual.meta.is_array() || qual.meta.is_map()) {
                        expr.meta = Meta::new(Type::UInt32);
                        return Ok(());
                    }
                    if qual_id.is_some_and(|qual_id| self.is_hidden(qual_id, field.name)) {
                        return self.error(field.span, Error::InaccessibleType);
                    }
                    return self.error(field.span, Error::UndefinedId(field.name));
                };
                self.resolve(expr, r)?;
            }
            ExprKind::Call { callee, args, kind } => {
                let kind = *kind;
                for arg in args.iter_mut() {
                    self.check_expr(arg)?;
                }
                expr.meta = match kind {
                    CallKind::Udf => self.check_call(span, callee, args)?,
                    CallKind::Ctor => self.check_ctor_call(span, callee, args)?,
                    CallKind::Sys => expr.meta.clone(),
                };
            }
            ExprKind::Sql { .. } => expr.meta = Meta::new(Type::Int32),
            ExprKind::Tuple(elems) | ExprKind::Init(elems) => {
                for elem in elems.iter_mut() {
                    self.check_expr(elem)?;
                }
                expr.meta = Meta::tuple(elems.iter().map(|elem| elem.meta.clone()).collect());
            }
            ExprKind::Alloc { ty, dims } => {
                self.check_type(ty)?;
                let mut sizes = Vec::with_capacity(dims.len());
                for dim in dims.iter_mut() {
                    self.check_expr(dim)?;
                    if !dim.meta.is_integer() {
                        return self.error(dim.span, Error::InvalidSizeValue);
                    }
                    match dim.lit_int() {
                        Some(size) if size <= 0 => {
                            return self.error(dim.span, Error::InvalidSizeValue);
                        }
                        Some(size) => match u32::try_from(size) {
                            Ok(size) => sizes.push(size),
                            Err(_) => return self.error(dim.span, Error::InvalidSizeValue),
                        },
                        None => sizes.push(0),
                    }
                    let concrete = dim.meta.concrete();
                    settle(dim, &concrete);
                }
                if sizes.is_empty() && !ty.meta.is_struct() {
                    return self.error(span, Error::NotAllowedAlloc);
                }
                let meta = ty.meta.clone().with_dims(sizes);
                if meta.checked_storage_size().is_none() {
                    return self.error(span, Error::TooLarge);
                }
                expr.meta = meta;
            }
            ExprKind::Global(_) | ExprKind::Reg(_) | ExprKind::Mem { .. } => (),
        }
        Ok(())
    }

    /// Binds `expr` to the declaration `r`. Constants are replaced by their
    /// value.
    fn resolve(&mut self, expr: &mut Expr, r: IdRef) -> Result {
        if matches!(self.ast.id(r).kind, IdKind::Label) {
            let name = self.ast.id(r).name;
            return self.error(expr.span, Error::UndefinedId(name));
        }
        self.check_id_lazily(r)?;
        let id = self.ast.id_mut(r);
        id.is_used = true;
        if id.meta.ty == Type::None {
            // The declaration itself failed to check.
            return Err(Stop::Reported);
        }
        if let IdKind::Var(var) = &id.kind {
            if let (true, Some(value)) = (id.is_const(), &var.value) {
                *expr = Expr::lit(value.clone(), expr.span);
                return Ok(());
            }
        }
        expr.id = Some(r);
        expr.meta = id.meta.clone();
        expr.is_lvalue = matches!(id.kind, IdKind::Var(_)) && !id.is_const();
        Ok(())
    }

    /// The declaration whose members a qualifier gives access to. The
    /// qualifier is either a type name or a value of a struct or contract
    /// type.
    fn qualifier(&self, qual: &Expr) -> Option<IdRef> {
        match qual.id.map(|r| &self.ast.id(r).kind) {
            Some(
                IdKind::Struct(_)
                | IdKind::Enum(_)
                | IdKind::Contract(_)
                | IdKind::Interface(_)
                | IdKind::Library(_),
            ) => qual.id,
            _ if qual.meta.is_struct() || qual.meta.is_object() => qual.meta.type_id,
            _ => None,
        }
    }

    /// Whether `name` is a member of `qual` which is not visible from here.
    fn is_hidden(&self, qual: IdRef, name: Interned<str>) -> bool {
        self.ast
            .id(qual)
            .members()
            .is_some_and(|blk| self.find_in(&self.ast.block(blk).ids, name, |_| true).is_some())
    }

    fn check_subscript(&mut self, base: &Expr, index: &mut Expr) -> Result<Meta> {
        if base.meta.is_map() {
            let key = base.meta.elems[0].clone();
            self.cmp(index.span, &key, &index.meta)?;
            settle(index, &key);
            return Ok(base.meta.elems[1].clone());
        }
        if !base.meta.is_array() {
            return self.error(base.span, Error::InvalidSubscript);
        }
        if !index.meta.is_integer() {
            let error = Error::InvalidOpType {
                op: "[]",
                ty: index.meta.clone(),
            };
            return self.error(index.span, error);
        }
        if let Some(value) = index.lit_int() {
            let size = base.meta.dims[0];
            if value < 0 || (size != 0 && value >= i128::from(size)) {
                return self.error(index.span, Error::InvalidArrayIndex(value));
            }
            settle(index, &Meta::new(Type::UInt32));
        }
        Ok(base.meta.strip_dim())
    }

    fn check_unary(&mut self, span: Span, op: UnaryOp, val: &Expr) -> Result<Meta> {
        let ok = match op {
            UnaryOp::Not => val.meta.is_bool(),
            UnaryOp::BitNot => val.meta.is_integer(),
            UnaryOp::Neg => val.meta.is_numeric(),
            _ => {
                if !val.is_lvalue {
                    return self.error(val.span, Error::InvalidLvalue);
                }
                val.meta.is_numeric()
            }
        };
        if !ok {
            let error = Error::InvalidOpType {
                op: op.symbol(),
                ty: val.meta.clone(),
            };
            return self.error(span, error);
        }
        Ok(val.meta.clone())
    }

    fn check_binary(&mut self, span: Span, op: BinaryOp, lhs: &mut Expr, rhs: &mut Expr) -> Result<Meta> {
        let invalid = |ty: &Meta| Error::InvalidOpType {
            op: op.symbol(),
            ty: ty.clone(),
        };
        if op.is_logical() {
            for side in [&*lhs, &*rhs] {
                if !side.meta.is_bool() {
                    return self.error(side.span, invalid(&side.meta));
                }
            }
            return Ok(Meta::new(Type::Bool));
        }
        if op.is_bitwise() {
            for side in [&*lhs, &*rhs] {
                if !side.meta.is_integer() {
                    return self.error(side.span, invalid(&side.meta));
                }
            }
            return self.unify(rhs.span, lhs, rhs);
        }
        if op == BinaryOp::Add && lhs.meta.is_string() {
            self.cmp(rhs.span, &lhs.meta, &rhs.meta)?;
            return Ok(lhs.meta.clone());
        }
        if matches!(op, BinaryOp::Eq | BinaryOp::Ne) && !lhs.meta.is_numeric() {
            self.unify(rhs.span, lhs, rhs)?;
            return Ok(Meta::new(Type::Bool));
        }

        for side in [&*lhs, &*rhs] {
            if !side.meta.is_numeric() && !(op.is_cmp() && side.meta.is_string()) {
                return self.error(side.span, invalid(&side.meta));
            }
        }
        if matches!(op, BinaryOp::Div | BinaryOp::Mod) && rhs.lit_int() == Some(0) {
            return self.error(rhs.span, Error::DivideByZero);
        }
        let meta = if lhs.meta.ty.is_integer() != rhs.meta.ty.is_integer()
            && lhs.meta.is_numeric()
            && rhs.meta.is_numeric()
        {
            self.diags.warn(span, Error::Truncation);
            let concrete = rhs.meta.concrete();
            settle(rhs, &concrete);
            lhs.meta.clone()
        } else {
            self.unify(rhs.span, lhs, rhs)?
        };
        if op.is_cmp() {
            Ok(Meta::new(Type::Bool))
        } else {
            Ok(meta)
        }
    }

    /// Unifies the metas of two operands, settling literal sides.
    fn unify(&mut self, span: Span, lhs: &mut Expr, rhs: &mut Expr) -> Result<Meta> {
        self.cmp(span, &lhs.meta, &rhs.meta)?;
        let meta = meta_eval(&lhs.meta, &rhs.meta);
        settle(lhs, &meta);
        settle(rhs, &meta);
        Ok(meta)
    }

    /// Checks a call of a user function, returning the meta of its result.
    fn check_call(&mut self, span: Span, callee: &mut Expr, args: &mut [Expr]) -> Result<Meta> {
        self.check_expr(callee)?;
        let func = callee
            .id
            .filter(|r| matches!(self.ast.id(*r).kind, IdKind::Func(_)));
        let Some(func) = func else {
            return self.error(callee.span, Error::NotCallable);
        };
        if Some(func) == self.scope.fn_id {
            let name = self.ast.id(func).name;
            self.diags.warn(span, Error::RecursiveCall(name));
        }
        self.check_args(span, func, args)?;
        Ok(self.ast.id(func).meta.clone())
    }

    /// Checks `new C(args)`, which calls the constructor of contract `C`.
    fn check_ctor_call(&mut self, span: Span, callee: &mut Expr, args: &mut [Expr]) -> Result<Meta> {
        let ExprKind::Id(name) = callee.kind else {
            return self.error(callee.span, Error::NotCallable);
        };
        let Some(cont) = self.search_type(name.name) else {
            return self.error(name.span, Error::UndefinedType(name.name));
        };
        let IdKind::Contract(contract) = &self.ast.id(cont).kind else {
            return self.error(name.span, Error::NotCallable);
        };
        let Some(&ctor) = self.ast.block(contract.blk).ids.first() else {
            return Err(Stop::Fatal(Fatal::Invariant("contract without a constructor")));
        };
        self.check_id_lazily(cont)?;
        self.check_args(span, ctor, args)?;
        callee.id = Some(ctor);
        callee.meta = self.ast.id(cont).meta.clone();
        Ok(callee.meta.clone())
    }

    fn check_args(&mut self, span: Span, func: IdRef, args: &mut [Expr]) -> Result {
        let params = match &self.ast.id(func).kind {
            IdKind::Func(func) => func.params.clone(),
            _ => Vec::new(),
        };
        if params.len() != args.len() {
            let error = Error::MismatchedCount {
                what: "argument",
                expected: params.len(),
                actual: args.len(),
            };
            return self.error(span, error);
        }
        for (param, arg) in params.into_iter().zip(args) {
            if let Some(r) = arg.id {
                let id = self.ast.id(r);
                if !matches!(id.kind, IdKind::Var(_)) {
                    return self.error(arg.span, Error::NotAllowedParam(id.name));
                }
            }
            let meta = self.ast.id(param).meta.clone();
            self.cmp(arg.span, &meta, &arg.meta)?;
            let meta = meta_eval(&meta, &arg.meta);
            settle(arg, &meta);
        }
        Ok(())
    }

    /// Resolves a type expression, storing the type in its meta.
    pub(super) fn check_type(&mut self, ty: &mut Expr) -> Result {
        let ExprKind::Type(name) = &mut ty.kind else {
            return self.check_expr(ty);
        };
        ty.meta = match name {
            TypeName::Prim(prim) => Meta::new(*prim),
            TypeName::Named(ident) => {
                let ident = *ident;
                let Some(r) = self.search_type(ident.name) else {
                    return self.error(ident.span, Error::UndefinedType(ident.name));
                };
                self.check_id_lazily(r)?;
                ty.id = Some(r);
                self.ast.id(r).meta.clone()
            }
            TypeName::Map { key, value } => {
                self.check_type(key)?;
                self.check_type(value)?;
                if !key.meta.is_comparable() {
                    return self.error(key.span, Error::NotComparableType(key.meta.clone()));
                }
                if value.meta.is_tuple() || value.meta.is_void() {
                    return self.error(value.span, Error::InvalidMapValue);
                }
                Meta::map(key.meta.clone(), value.meta.clone())
            }
        };
        Ok(())
    }
}

/// Replaces literal metas in `expr` by `meta`, the unified type of the
/// context the expression is used in.
pub(super) fn settle(expr: &mut Expr, meta: &Meta) {
    match &mut expr.kind {
        ExprKind::Tuple(elems) | ExprKind::Init(elems) => {
            let elem_metas: Vec<Meta> = if meta.is_array() {
                vec![meta.strip_dim(); elems.len()]
            } else if meta.is_map() {
                vec![Meta::tuple(meta.elems.clone()); elems.len()]
            } else if meta.elems.len() == elems.len() {
                meta.elems.clone()
            } else {
                return;
            };
            for (elem, elem_meta) in elems.iter_mut().zip(&elem_metas) {
                settle(elem, elem_meta);
            }
            expr.meta = meta.clone();
        }
        _ if !expr.meta.is_undef || meta.is_tuple() => (),
        ExprKind::Unary { op, val } if *op != UnaryOp::Not => {
            settle(val, meta);
            expr.meta = meta.clone();
        }
        ExprKind::Binary { op, lhs, rhs } if !op.is_cmp() && !op.is_logical() => {
            settle(lhs, meta);
            settle(rhs, meta);
            expr.meta = meta.clone();
        }
        ExprKind::Ternary { then, els, .. } => {
            settle(then, meta);
            settle(els, meta);
            expr.meta = meta.clone();
        }
        _ => expr.meta = meta.clone(),
    }
}

/// Folds the negation of a numeric literal into a negative literal.
fn negate_literal(expr: &mut Expr) {
    let ExprKind::Unary { val, .. } = &expr.kind else {
        return;
    };
    let value = match val.kind {
        ExprKind::Lit(Value::Int(v)) if val.meta.is_undef => Value::Int(-v),
        ExprKind::Lit(Value::Float(v)) if val.meta.is_undef => Value::Float(-v),
        _ => return,
    };
    *expr = Expr::lit(value, expr.span);
}
