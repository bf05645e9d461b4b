use std::mem;

use crate::{
    ast::{
        BlockId, Expr, ExprKind, IdKind, IdRef, If, Loop, Pragma, Stmt, StmtKind, Switch, UnaryOp,
        Value,
    },
    diag::{Diagnostics, Error, Fatal},
    ir::BbId,
    syslib::SysFn,
    trans::{reg, Jump, Result, Trans},
};

/// Statements.
///
/// Every statement is appended to the current basic block. Jumps end the
/// current block; anything lowered after them until the next jump target
/// lands in a fresh block nothing branches to.
impl Trans<'_> {
    pub(super) fn trans_block(&mut self, blk: BlockId) -> Result {
        let stmts = mem::take(&mut self.ast.block_mut(blk).stmts);
        for stmt in stmts {
            self.trans_stmt(stmt)?;
        }
        Ok(())
    }

    fn trans_stmt(&mut self, stmt: Stmt) -> Result {
        if let Some(label) = stmt.label {
            let target = self.label_bb(label);
            self.close(target);
            self.bb = Some(target);
        }
        let span = stmt.span;
        match stmt.kind {
            StmtKind::Null | StmtKind::Case(_) => (),
            StmtKind::Exp(expr) => self.trans_exp_stmt(expr)?,
            StmtKind::Assign { lhs, rhs } => self.trans_assign(lhs, rhs)?,
            StmtKind::Decl(r) => self.trans_decl(r)?,
            StmtKind::If(stmt) => self.trans_if(stmt)?,
            StmtKind::Loop(stmt) => self.trans_loop(stmt)?,
            StmtKind::Switch(stmt) => self.trans_switch(stmt)?,
            StmtKind::Return(val) => {
                let val = val.map(|val| self.trans_expr(val)).transpose()?;
                self.emit(Stmt::new(StmtKind::Return(val), span));
                let exit = self.func.exit;
                self.close(exit);
            }
            StmtKind::Continue => {
                let target = self
                    .jumps
                    .iter()
                    .rev()
                    .find_map(|jump| jump.cont)
                    .ok_or_else(|| Diagnostics::fatal(span, Error::InvalidContinue))?;
                self.close(target);
            }
            StmtKind::Break(guard) => {
                let target = self
                    .jumps
                    .last()
                    .map(|jump| jump.brk)
                    .ok_or_else(|| Diagnostics::fatal(span, Error::InvalidBreak))?;
                match guard {
                    Some(guard) => {
                        let guard = self.trans_expr(guard)?;
                                self.branch(Some(guard), target);
                        let next = self.func.new_block();
                        self.close(next);
                        self.bb = Some(next);
                    }
                    None => self.close(target),
                }
            }
            StmtKind::Goto { target, label } => {
                let label =
                    label.ok_or_else(|| Diagnostics::fatal(span, Error::UndefinedLabel(target.name)))?;
                let target = self.label_bb(label);
                self.close(target);
            }
            StmtKind::Ddl(text) => self.emit(Stmt::new(StmtKind::Ddl(text), span)),
            StmtKind::Block(blk) => self.trans_block(blk)?,
            StmtKind::Pragma(Pragma::Assert { cond, text, desc }) => {
                let cond = self.trans_expr(cond)?;
                let text = self.str_lit(&text, span);
                let desc = match desc {
                    Some(desc) => self.str_lit(&desc, span),
                    None => Expr::lit(Value::Null, span),
                };
                let call = SysFn::Assert.call(self.idents, vec![cond, text, desc], span);
                self.emit(Stmt::new(StmtKind::Exp(call), span));
            }
        }
        Ok(())
    }

    fn trans_exp_stmt(&mut self, expr: Expr) -> Result {
        let span = expr.span;
        let elems = match expr.kind {
            ExprKind::Tuple(elems) => elems,
            kind => vec![Expr {
                kind,
                ..expr
            }],
        };
        for mut elem in elems {
            // The old value of a postfix update is unused here.
            if let ExprKind::Unary { op, .. } = &mut elem.kind {
                *op = match *op {
                    UnaryOp::PostInc => UnaryOp::PreInc,
                    UnaryOp::PostDec => UnaryOp::PreDec,
                    other => other,
                };
            }
            let elem = self.trans_expr(elem)?;
            // Increments have already been emitted as assignments.
            if matches!(elem.kind, ExprKind::Call { .. } | ExprKind::Sql { .. }) {
                self.emit(Stmt::new(StmtKind::Exp(elem), span));
            }
        }
        Ok(())
    }

    fn trans_decl(&mut self, r: IdRef) -> Result {
        let id = self.ast.id(r);
        let (vars, init) = match &id.kind {
            IdKind::Var(var) if id.is_const() && var.value.is_some() => return Ok(()),
            IdKind::Var(var) => (vec![r], var.init.clone()),
            IdKind::Tuple(tuple) => (tuple.elems.clone(), tuple.init.clone()),
            _ => return Ok(()),
        };
        for var in &vars {
            self.alloc_local(*var);
        }
        let Some(init) = init else {
            return Ok(());
        };
        let lhs = match vars.as_slice() {
            [var] if matches!(self.ast.id(r).kind, IdKind::Var(_)) => self.id_expr(*var, init.span),
            _ => {
                let elems = vars.iter().map(|var| self.id_expr(*var, init.span)).collect();
                Expr::new(ExprKind::Tuple(elems), init.span).with_meta(init.meta.clone())
            }
        };
        self.trans_assign(lhs, init)
    }

    /// Lowers an assignment. Tuples are assigned element by element, through
    /// temporaries so that `a, b = b, a` swaps.
    pub(super) fn trans_assign(&mut self, lhs: Expr, rhs: Expr) -> Result {
        let span = lhs.span;
        let (lhs_elems, rhs_elems) = match (lhs.kind, rhs.kind) {
            (ExprKind::Tuple(lhs_elems), ExprKind::Tuple(rhs_elems)) => (lhs_elems, rhs_elems),
            (lhs_kind, rhs_kind) => {
                if lhs.meta.is_tuple() {
                    return Err(Fatal::Invariant("tuple assigned from a non-tuple value"));
                }
                let lhs = self.trans_expr(Expr { kind: lhs_kind, ..lhs })?;
                let rhs = self.trans_expr(Expr { kind: rhs_kind, ..rhs })?;
                self.emit(Stmt::new(StmtKind::Assign { lhs, rhs }, span));
                return Ok(());
            }
        };
        let pairs: Vec<(Expr, Expr)> = if lhs_elems.len() == rhs_elems.len() {
            lhs_elems.into_iter().zip(rhs_elems).collect()
        } else {
            let (lhs, rhs) = (flatten(&lhs_elems), flatten(&rhs_elems));
            if lhs.len() != rhs.len() {
                return Err(Fatal::Invariant("mismatched tuple assignment"));
            }
            lhs.into_iter().zip(rhs).collect()
        };
        if pairs.len() == 1 || pairs.iter().all(|(_, rhs)| rhs.is_lit()) {
            for (lhs, rhs) in pairs {
                self.trans_assign(lhs, rhs)?;
            }
            return Ok(());
        }
        let mut staged = Vec::with_capacity(pairs.len());
        for (lhs, rhs) in pairs {
            if rhs.is_lit() || matches!(rhs.kind, ExprKind::Tuple(_)) {
                staged.push((lhs, rhs));
                continue;
            }
            let meta = rhs.meta.clone();
            let rspan = rhs.span;
            let rhs = self.trans_expr(rhs)?;
            let tmp = reg(self.func.add_reg(meta.clone()), meta, rspan);
            self.emit(Stmt::new(
                StmtKind::Assign {
                    lhs: tmp.clone(),
                    rhs,
                },
                rspan,
            ));
            staged.push((lhs, tmp));
        }
        for (lhs, rhs) in staged {
            self.trans_assign(lhs, rhs)?;
        }
        Ok(())
    }

    fn trans_if(&mut self, stmt: If) -> Result {
        let prev = self.cur();
        let next = self.func.new_block();
        let arms = std::iter::once((stmt.cond, stmt.then))
            .chain(stmt.elifs.into_iter().map(|elif| (elif.cond, elif.blk)));
        for (cond, blk) in arms {
            let cond = self.trans_expr_in(prev, cond)?;
            let arm = self.func.new_block();
            self.func.add_branch(prev, Some(cond), arm);
            self.bb = Some(arm);
            self.trans_block(blk)?;
            self.close(next);
        }
        match stmt.els {
            Some(els) => {
                let arm = self.func.new_block();
                self.func.add_branch(prev, None, arm);
                self.bb = Some(arm);
                self.trans_block(els)?;
                self.close(next);
            }
            None => self.func.add_branch(prev, None, next),
        }
        self.bb = Some(next);
        Ok(())
    }

    /// Lowers a loop, whose condition has already been moved into the body.
    ///
    /// The body starts in its own block, which every iteration branches back
    /// to. `continue` jumps to the increment, if any.
    fn trans_loop(&mut self, stmt: Loop) -> Result {
        if let Some(init) = stmt.init {
            self.trans_stmt(*init)?;
        }
        let head = self.func.new_block();
        let next = self.func.new_block();
        self.close(head);

        let mut body = mem::take(&mut self.ast.block_mut(stmt.blk).stmts);
        let inc = if stmt.has_inc { body.pop() } else { None };
        let inc_bb = inc.as_ref().map(|_| self.func.new_block());
        self.jumps.push(Jump {
            cont: Some(inc_bb.unwrap_or(head)),
            brk: next,
        });
        self.bb = Some(head);
        for stmt in body {
            self.trans_stmt(stmt)?;
        }
        if let (Some(inc), Some(inc_bb)) = (inc, inc_bb) {
            self.close(inc_bb);
            self.bb = Some(inc_bb);
            self.trans_stmt(inc)?;
        }
        self.close(head);
        self.jumps.pop();
        self.bb = Some(next);
        Ok(())
    }

    /// Lowers a switch, whose cases have already become conditions.
    ///
    /// The block before the switch branches to every case in order and, if
    /// nothing matches, to the default case or past the switch. A case that
    /// does not end in a jump falls through into the next one.
    fn trans_switch(&mut self, stmt: Switch) -> Result {
        let prev = self.cur();
        let next = self.func.new_block();
        let stmts = mem::take(&mut self.ast.block_mut(stmt.blk).stmts);
        self.jumps.push(Jump {
            cont: None,
            brk: next,
        });
        self.bb = None;
        let mut default = None;
        for stmt in stmts {
            let StmtKind::Case(val) = stmt.kind else {
                self.trans_stmt(stmt)?;
                continue;
            };
            let case = self.func.new_block();
            self.close(case);
            match val {
                Some(cond) => {
                    let cond = self.trans_expr_in(prev, cond)?;
                    self.func.add_branch(prev, Some(cond), case);
                }
                None => default = Some(case),
            }
            self.bb = Some(case);
        }
        self.close(next);
        self.jumps.pop();
        self.func.add_branch(prev, None, default.unwrap_or(next));
        self.bb = Some(next);
        Ok(())
    }

    /// Lowers `expr` with `bb` as the current block.
    fn trans_expr_in(&mut self, bb: BbId, expr: Expr) -> Result<Expr> {
        let saved = self.bb.replace(bb);
        let expr = self.trans_expr(expr)?;
        self.bb = saved;
        Ok(expr)
    }
}

/// The leaves of nested tuples.
fn flatten(elems: &[Expr]) -> Vec<Expr> {
    let mut flat = Vec::with_capacity(elems.len());
    for elem in elems {
        match &elem.kind {
            ExprKind::Tuple(nested) => flat.extend(flatten(nested)),
            _ => flat.push(elem.clone()),
        }
    }
    flat
}
