use std::mem;

use crate::{
    ast::{
        BinaryOp, BlockId, BlockKind, Expr, ExprKind, IdKind, Loop, Pragma, Stmt, StmtKind,
        Switch, UnaryOp,
    },
    checker::{absorb, exp::settle, Checker, Result, Scope},
    diag::Error,
    meta::{meta_eval, Meta, Type},
    token::Span,
};

/// Statements.
impl Checker<'_> {
    /// Checks the statements of `blk`, which becomes the innermost scope.
    pub(super) fn check_block(&mut self, blk: BlockId) -> Result {
        self.ast.block_mut(blk).up = self.scope.blk;
        let mut stmts = mem::take(&mut self.ast.block_mut(blk).stmts);
        let scope = Scope {
            blk: Some(blk),
            ..self.scope
        };
        let result = self.in_scope(scope, |c| {
            stmts
                .iter_mut()
                .try_for_each(|stmt| absorb(c.check_stmt(stmt)))
        });
        self.ast.block_mut(blk).stmts = stmts;
        result
    }

    fn check_stmt(&mut self, stmt: &mut Stmt) -> Result {
        match &mut stmt.kind {
            StmtKind::Null | StmtKind::Ddl(_) => Ok(()),
            StmtKind::Exp(expr) => {
                self.check_expr(expr)?;
                if !has_effect(expr) {
                    self.diags.warn(stmt.span, Error::IgnoredStatement);
                    stmt.kind = StmtKind::Null;
                }
                Ok(())
            }
            StmtKind::Assign { lhs, rhs } => self.check_assign(lhs, rhs),
            StmtKind::Decl(r) => {
                let r = *r;
                if let Some(blk) = self.scope.blk {
                    self.declare(blk, r);
                }
                self.check_id(r)
            }
            StmtKind::If(stmt) => {
                absorb(self.check_cond(&mut stmt.cond))?;
                absorb(self.check_block(stmt.then))?;
                for elif in &mut stmt.elifs {
                    absorb(self.check_cond(&mut elif.cond))?;
                    absorb(self.check_block(elif.blk))?;
                }
                match stmt.els {
                    Some(els) => self.check_block(els),
                    None => Ok(()),
                }
            }
            StmtKind::Loop(stmt) => self.check_loop(stmt),
            StmtKind::Switch(stmt) => self.check_switch(stmt),
            StmtKind::Case(_) => {
                // Cases are checked along with their switch.
                if self.scope.blk.map(|blk| self.ast.block(blk).kind) == Some(BlockKind::Switch) {
                    Ok(())
                } else {
                    self.error(stmt.span, Error::InvalidCase)
                }
            }
            StmtKind::Return(val) => self.check_return(stmt.span, val.as_mut()),
            StmtKind::Continue => {
                if self.enclosing(BlockKind::Loop).is_none() {
                    return self.error(stmt.span, Error::InvalidContinue);
                }
                Ok(())
            }
            StmtKind::Break(guard) => {
                if self.enclosing(BlockKind::Loop).is_none() && self.enclosing(BlockKind::Switch).is_none() {
                    return self.error(stmt.span, Error::InvalidBreak);
                }
                match guard {
                    Some(guard) => self.check_cond(guard),
                    None => Ok(()),
                }
            }
            StmtKind::Goto { target, label } => {
                let body = self.enclosing(BlockKind::Function);
                let found = body.and_then(|body| {
                    self.ast.block(body).ids.iter().copied().find(|r| {
                        let id = self.ast.id(*r);
                        matches!(id.kind, IdKind::Label) && id.name == target.name
                    })
                });
                match found {
                    Some(found) => {
                        self.ast.id_mut(found).is_used = true;
                        *label = Some(found);
                        Ok(())
                    }
                    None => self.error(target.span, Error::UndefinedLabel(target.name)),
                }
            }
            StmtKind::Block(blk) => self.check_block(*blk),
            StmtKind::Pragma(Pragma::Assert { cond, .. }) => self.check_cond(cond),
        }
    }

    /// Checks a condition, which must be a boolean.
    pub(super) fn check_cond(&mut self, cond: &mut Expr) -> Result {
        self.check_expr(cond)?;
        if !cond.meta.is_bool() {
            return self.error(cond.span, Error::InvalidCondType(cond.meta.clone()));
        }
        Ok(())
    }

    fn check_assign(&mut self, lhs: &mut Expr, rhs: &mut Expr) -> Result {
        self.check_expr(lhs)?;
        self.check_expr(rhs)?;
        let assignable = match &lhs.kind {
            ExprKind::Tuple(elems) => elems.iter().all(|elem| elem.is_lvalue),
            _ => lhs.is_lvalue,
        };
        if !assignable {
            return self.error(lhs.span, Error::InvalidLvalue);
        }
        self.cmp(rhs.span, &lhs.meta, &rhs.meta)?;
        let meta = meta_eval(&lhs.meta, &rhs.meta);
        settle(rhs, &meta);
        Ok(())
    }

    fn check_return(&mut self, span: Span, val: Option<&mut Expr>) -> Result {
        let Some(func) = self.scope.fn_id else {
            return Ok(());
        };
        let is_ctor = self.ast.id(func).is_ctor();
        let ret = if is_ctor {
            Meta::new(Type::Void)
        } else {
            self.ast.id(func).meta.clone()
        };
        match val {
            Some(val) => {
                self.check_expr(val)?;
                self.cmp(val.span, &ret, &val.meta)?;
                let meta = meta_eval(&ret, &val.meta);
                settle(val, &meta);
                Ok(())
            }
            None if ret.is_void() => Ok(()),
            None => self.error(
                span,
                Error::MismatchedType {
                    expected: ret,
                    actual: Meta::new(Type::Void),
                },
            ),
        }
    }

    /// Checks a loop, rewriting its condition into a guarded `break` at the
    /// top of the body and its increment into the last statement of the body.
    /// The initializer is declared in the loop body scope.
    fn check_loop(&mut self, stmt: &mut Loop) -> Result {
        if stmt.is_array {
            let span = self.ast.block(stmt.blk).span;
            return self.error(span, Error::NotSupported("array loop"));
        }
        self.ast.block_mut(stmt.blk).up = self.scope.blk;
        let scope = Scope {
            blk: Some(stmt.blk),
            ..self.scope
        };
        self.in_scope(scope, |c| -> Result {
            if let Some(init) = &mut stmt.init {
                absorb(c.check_stmt(init))?;
            }
            if let Some(cond) = &mut stmt.cond {
                absorb(c.check_cond(cond))?;
            }
            if let Some(inc) = &mut stmt.inc {
                absorb(c.check_expr(inc))?;
            }
            Ok(())
        })?;
        self.check_block(stmt.blk)?;

        let body = &mut self.ast.block_mut(stmt.blk).stmts;
        if let Some(cond) = stmt.cond.take() {
            let span = cond.span;
            let negated = ExprKind::Unary {
                op: UnaryOp::Not,
                val: Box::new(cond),
            };
            let guard = Expr::new(negated, span).with_meta(Meta::new(Type::Bool));
            body.insert(0, Stmt::new(StmtKind::Break(Some(guard)), span));
        }
        if let Some(inc) = stmt.inc.take() {
            let span = inc.span;
            body.push(Stmt::new(StmtKind::Exp(inc), span));
            stmt.has_inc = true;
        }
        Ok(())
    }

    /// Checks a switch, rewriting every case value into a boolean condition.
    fn check_switch(&mut self, stmt: &mut Switch) -> Result {
        if let Some(subject) = &mut stmt.subject {
            self.check_expr(subject)?;
        }
        self.check_block(stmt.blk)?;

        let mut cases = mem::take(&mut self.ast.block_mut(stmt.blk).stmts);
        let result = self.check_cases(stmt.subject.as_ref(), &mut cases);
        self.ast.block_mut(stmt.blk).stmts = cases;
        if result.is_ok() {
            stmt.subject = None;
        }
        result
    }

    fn check_cases(&mut self, subject: Option<&Expr>, cases: &mut [Stmt]) -> Result {
        let mut has_default = false;
        let mut seen: Vec<Expr> = Vec::new();
        for case in cases {
            let span = case.span;
            let StmtKind::Case(val) = &mut case.kind else {
                continue;
            };
            let Some(val) = val else {
                if has_default {
                    self.diags.error(span, Error::DuplicatedLabel("default"));
                }
                has_default = true;
                continue;
            };
            if absorb(self.check_expr(val)).is_err() {
                continue;
            }
            if seen.iter().any(|prev| prev.same_as(val)) {
                self.diags.error(val.span, Error::DuplicatedCase);
                continue;
            }
            seen.push(val.clone());
            match subject {
                Some(subject) => {
                    if self.cmp(val.span, &subject.meta, &val.meta).is_err() {
                        continue;
                    }
                    let meta = meta_eval(&subject.meta, &val.meta);
                    let mut lhs = subject.clone();
                    settle(&mut lhs, &meta);
                    settle(val, &meta);
                    let span = val.span;
                    let eq = ExprKind::Binary {
                        op: BinaryOp::Eq,
                        lhs: Box::new(lhs),
                        rhs: Box::new(mem::replace(val, Expr::null(span))),
                    };
                    *val = Expr::new(eq, span).with_meta(Meta::new(Type::Bool));
                }
                None if !val.meta.is_bool() => {
                    self.diags.error(val.span, Error::InvalidCondType(val.meta.clone()));
                }
                None => (),
            }
        }
        Ok(())
    }
}

/// Whether an expression statement does anything.
fn has_effect(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Call { .. } | ExprKind::Sql { .. } => true,
        ExprKind::Unary { op, .. } => op.is_inc_dec(),
        ExprKind::Tuple(elems) => elems.iter().any(has_effect),
        _ => false,
    }
}
