use std::{collections::HashSet, mem};

use crate::{
    ast::{Expr, ExprKind, IdKind, IdRef, Modifiers, Value},
    checker::{absorb, exp::settle, Checker, Result, Scope, Stop},
    diag::{Error, Fatal},
    meta::{meta_eval, Meta, Type},
    token::Span,
};

fn not_a(what: &'static str) -> Stop {
    Stop::Fatal(Fatal::Invariant(what))
}

/// Declarations.
impl Checker<'_> {
    /// Checks a declaration found by name lookup, in the scope it was
    /// declared in.
    pub(super) fn check_id_lazily(&mut self, r: IdRef) -> Result {
        if self.ast.id(r).is_checked {
            return Ok(());
        }
        let scope = match self.ast.id(r).up {
            Some(cont) => Scope {
                blk: self.ast.id(cont).members(),
                cont_id: matches!(self.ast.id(cont).kind, IdKind::Contract(_)).then_some(cont),
                ..Scope::default()
            },
            None => Scope {
                blk: Some(self.ast.root),
                ..Scope::default()
            },
        };
        self.in_scope(scope, |c| c.check_id(r))
    }

    /// Checks a declaration in the current scope. Every declaration is
    /// checked once; errors are reported and swallowed.
    pub(super) fn check_id(&mut self, r: IdRef) -> Result {
        let id = self.ast.id_mut(r);
        if id.is_checked {
            return Ok(());
        }
        id.is_checked = true;
        let check: fn(&mut Self, IdRef) -> Result = match &id.kind {
            IdKind::Var(_) => Self::check_var,
            IdKind::Tuple(_) => Self::check_tuple,
            IdKind::Struct(_) => Self::check_struct,
            IdKind::Enum(_) => Self::check_enum,
            IdKind::Func(_) => Self::check_func,
            IdKind::Contract(_) => Self::check_contract,
            IdKind::Interface(_) | IdKind::Library(_) => Self::check_container,
            IdKind::Label => |_, _| Ok(()),
        };
        absorb(check(self, r))
    }

    fn check_var(&mut self, r: IdRef) -> Result {
        let IdKind::Var(var) = &mut self.ast.id_mut(r).kind else {
            return Err(not_a("expected a variable"));
        };
        let mut ty = var.ty.take();
        let mut dims = mem::take(&mut var.dims);
        let mut init = var.init.take();
        let is_param = var.is_param;

        let result = self.var_meta(r, ty.as_mut(), &mut dims, init.as_mut(), is_param);

        if let IdKind::Var(var) = &mut self.ast.id_mut(r).kind {
            var.ty = ty;
            var.dims = dims;
            var.init = init;
        }
        result
    }

    fn var_meta(
        &mut self,
        r: IdRef,
        ty: Option<&mut Expr>,
        dims: &mut [Option<Expr>],
        init: Option<&mut Expr>,
        is_param: bool,
    ) -> Result {
        let Some(ty) = ty else {
            return Err(not_a("variable without a type"));
        };
        self.check_type(ty)?;
        let span = self.ast.id(r).span;
        let mut meta = ty.meta.clone();
        if !dims.is_empty() {
            meta.dims = self.array_dims(span, dims, is_param || init.is_some())?;
        }
        if meta.checked_storage_size().is_none() {
            return self.error(span, Error::TooLarge);
        }
        self.ast.id_mut(r).meta = meta.clone();

        match init {
            Some(init) => self.init_var(r, &meta, init),
            None if self.ast.id(r).is_const() => {
                let name = self.ast.id(r).name;
                self.error(span, Error::MissingConstValue(name))
            }
            None => Ok(()),
        }
    }

    /// Evaluates the declared dimensions of an array. `[]` is only allowed
    /// when `unsized_ok`.
    fn array_dims(&mut self, span: Span, dims: &mut [Option<Expr>], unsized_ok: bool) -> Result<Vec<u32>> {
        let mut sizes = Vec::with_capacity(dims.len());
        for dim in dims {
            let Some(dim) = dim else {
                if !unsized_ok {
                    return self.error(span, Error::MissingArraySize);
                }
                sizes.push(0);
                continue;
            };
            self.check_expr(dim)?;
            match dim.lit_int().and_then(|size| u32::try_from(size).ok()) {
                Some(size) if size > 0 => sizes.push(size),
                _ => return self.error(dim.span, Error::InvalidSizeValue),
            }
        }
        Ok(sizes)
    }

    fn init_var(&mut self, r: IdRef, meta: &Meta, init: &mut Expr) -> Result {
        self.check_expr(init)?;
        if init.meta.is_tuple() && !(meta.is_array() || meta.is_map() || meta.is_struct()) {
            return self.error(init.span, Error::NotAllowedInit);
        }
        self.cmp(init.span, meta, &init.meta)?;
        let meta = meta_eval(meta, &init.meta);
        settle(init, &meta);

        let id = self.ast.id_mut(r);
        id.meta = meta;
        if id.is_const() {
            if let (IdKind::Var(var), ExprKind::Lit(value)) = (&mut id.kind, &init.kind) {
                var.value = Some(value.clone());
            }
        }
        Ok(())
    }

    /// Checks a declarator list, such as `int a, b[2] = 1, {2, 3}`.
    fn check_tuple(&mut self, r: IdRef) -> Result {
        let IdKind::Tuple(tuple) = &mut self.ast.id_mut(r).kind else {
            return Err(not_a("expected a tuple"));
        };
        let elems = tuple.elems.clone();
        let mut ty = tuple.ty.take();
        let mut init = tuple.init.take();

        let result = self.tuple_meta(r, &elems, ty.as_mut(), init.as_mut());

        if let IdKind::Tuple(tuple) = &mut self.ast.id_mut(r).kind {
            tuple.ty = ty;
            tuple.init = init;
        }
        result
    }

    fn tuple_meta(
        &mut self,
        r: IdRef,
        elems: &[IdRef],
        ty: Option<&mut Expr>,
        init: Option<&mut Expr>,
    ) -> Result {
        let Some(ty) = ty else {
            return Err(not_a("declarator list without a type"));
        };
        self.check_type(ty)?;

        let mut metas = Vec::with_capacity(elems.len());
        for &elem in elems {
            let id = self.ast.id_mut(elem);
            id.is_checked = true;
            let span = id.span;
            let IdKind::Var(var) = &mut id.kind else {
                return Err(not_a("expected a variable"));
            };
            let mut dims = mem::take(&mut var.dims);
            let sizes = self.array_dims(span, &mut dims, init.is_some());
            if let IdKind::Var(var) = &mut self.ast.id_mut(elem).kind {
                var.dims = dims;
            }
            let meta = ty.meta.clone().with_dims(sizes?);
            self.ast.id_mut(elem).meta = meta.clone();
            metas.push(meta);
        }
        let mut meta = Meta::tuple(metas);
        self.ast.id_mut(r).meta = meta.clone();

        let Some(init) = init else {
            if self.ast.id(r).is_const() {
                let name = self.ast.id(elems[0]).name;
                return self.error(self.ast.id(r).span, Error::MissingConstValue(name));
            }
            return Ok(());
        };
        self.check_expr(init)?;
        self.cmp(init.span, &meta, &init.meta)?;
        meta = meta_eval(&meta, &init.meta);
        settle(init, &meta);

        let values: Vec<Option<Value>> = match &init.kind {
            ExprKind::Tuple(vals) if vals.len() == elems.len() => vals
                .iter()
                .map(|val| match &val.kind {
                    ExprKind::Lit(value) => Some(value.clone()),
                    _ => None,
                })
                .collect(),
            _ => vec![None; elems.len()],
        };
        let is_const = self.ast.id(r).is_const();
        if meta.elems.len() == elems.len() {
            for ((&elem, elem_meta), value) in elems.iter().zip(&meta.elems).zip(values) {
                let id = self.ast.id_mut(elem);
                id.meta = elem_meta.clone();
                if let (true, IdKind::Var(var)) = (is_const, &mut id.kind) {
                    var.value = value;
                }
            }
        }
        self.ast.id_mut(r).meta = meta;
        Ok(())
    }

    fn check_struct(&mut self, r: IdRef) -> Result {
        let IdKind::Struct(fields) = &self.ast.id(r).kind else {
            return Err(not_a("expected a struct"));
        };
        let fields = fields.clone();
        let mut seen = HashSet::new();
        let mut metas = Vec::with_capacity(fields.len());
        for &field in &fields {
            let id = self.ast.id_mut(field);
            id.mods.insert(Modifiers::PUBLIC);
            let (name, span) = (id.name, id.span);
            if !seen.insert(name) {
                self.diags.error(span, Error::DuplicatedId(name));
            }
            self.check_id(field)?;
            metas.push(self.ast.id(field).meta.clone());
        }
        let name = self.ast.id(r).name;
        self.ast.id_mut(r).meta = Meta::structure(r, name, metas);
        Ok(())
    }

    /// Numbers the elements of an enum. Elements without a value follow the
    /// previous one.
    fn check_enum(&mut self, r: IdRef) -> Result {
        let IdKind::Enum(elems) = &self.ast.id(r).kind else {
            return Err(not_a("expected an enum"));
        };
        let elems = elems.clone();
        self.ast.id_mut(r).meta = Meta::new(Type::Int32);

        let int32 = Meta::new(Type::Int32);
        let mut next = 0;
        let mut used = Vec::with_capacity(elems.len());
        for elem in elems {
            let id = self.ast.id_mut(elem);
            id.is_checked = true;
            id.mods.insert(Modifiers::PUBLIC.with(Modifiers::CONST));
            id.meta = int32.clone();
            let IdKind::Var(var) = &mut id.kind else {
                return Err(not_a("expected an enum element"));
            };
            let value = match var.init.take() {
                None => next,
                Some(mut init) => {
                    let value = self.enum_value(&mut init, &int32, &used);
                    if let IdKind::Var(var) = &mut self.ast.id_mut(elem).kind {
                        var.init = Some(init);
                    }
                    match value {
                        Ok(value) => value,
                        Err(Stop::Reported) => continue,
                        Err(fatal) => return Err(fatal),
                    }
                }
            };
            if let IdKind::Var(var) = &mut self.ast.id_mut(elem).kind {
                var.value = Some(Value::Int(value));
            }
            used.push(value);
            next = value + 1;
        }
        Ok(())
    }

    fn enum_value(&mut self, init: &mut Expr, int32: &Meta, used: &[i128]) -> Result<i128> {
        self.check_expr(init)?;
        let Some(value) = init.lit_int() else {
            return self.error(init.span, Error::InvalidEnumValue);
        };
        self.cmp(init.span, int32, &init.meta)?;
        settle(init, int32);
        if used.contains(&value) {
            return self.error(init.span, Error::DuplicatedEnumValue(value));
        }
        Ok(value)
    }

    fn check_func(&mut self, r: IdRef) -> Result {
        let id = self.ast.id_mut(r);
        let (is_ctor, up) = (id.is_ctor(), id.up);
        let IdKind::Func(func) = &mut id.kind else {
            return Err(not_a("expected a function"));
        };
        let params = func.params.clone();
        let body = func.body;
        let mut ret = func.ret.take();

        let mut seen = HashSet::new();
        for &param in &params {
            let (name, span) = (self.ast.id(param).name, self.ast.id(param).span);
            if !seen.insert(name) {
                self.diags.error(span, Error::DuplicatedId(name));
            }
            self.check_id(param)?;
        }

        let meta = match ret.as_mut() {
            Some(ty) => absorb(self.check_type(ty)).map(|()| ty.meta.clone()),
            None if is_ctor => Ok(Meta::object(up, up.map(|cont| self.ast.id(cont).name))),
            None => Ok(Meta::new(Type::Void)),
        };
        if let IdKind::Func(func) = &mut self.ast.id_mut(r).kind {
            func.ret = ret;
        }
        self.ast.id_mut(r).meta = meta?;

        let Some(body) = body else {
            return Ok(());
        };
        let mut labels = HashSet::new();
        for &label in &self.ast.block(body).ids {
            let label = self.ast.id(label);
            if !matches!(label.kind, IdKind::Label) {
                continue;
            }
            let (name, span) = (label.name, label.span);
            if !labels.insert(name) {
                self.diags.error(span, Error::DuplicatedId(name));
            }
        }
        let scope = Scope {
            fn_id: Some(r),
            ..self.scope
        };
        self.in_scope(scope, |c| c.check_block(body))
    }

    fn check_contract(&mut self, r: IdRef) -> Result {
        let id = self.ast.id(r);
        let name = id.name;
        let IdKind::Contract(cont) = &id.kind else {
            return Err(not_a("expected a contract"));
        };
        let (blk, implements) = (cont.blk, cont.implements);
        self.ast.id_mut(r).meta = Meta::object(Some(r), Some(name));

        if let Some(itf) = implements {
            let found = self
                .search_type(itf.name)
                .filter(|found| matches!(self.ast.id(*found).kind, IdKind::Interface(_)));
            match found {
                Some(found) => {
                    if let IdKind::Contract(cont) = &mut self.ast.id_mut(r).kind {
                        cont.itf = Some(found);
                    }
                }
                None => self.diags.error(itf.span, Error::UndefinedType(itf.name)),
            }
        }

        self.ast.block_mut(blk).up = self.scope.blk;
        let scope = Scope {
            blk: Some(blk),
            fn_id: None,
            cont_id: Some(r),
            qual_id: None,
        };
        self.in_scope(scope, |c| {
            c.dedup_members(blk);
            for member in c.ast.block(blk).ids.clone() {
                c.check_id(member)?;
            }
            Ok(())
        })
    }

    /// Checks the functions of an interface or a library.
    fn check_container(&mut self, r: IdRef) -> Result {
        let name = self.ast.id(r).name;
        let Some(blk) = self.ast.id(r).members() else {
            return Err(not_a("expected an interface or a library"));
        };
        self.ast.id_mut(r).meta = Meta::object(Some(r), Some(name));
        self.ast.block_mut(blk).up = self.scope.blk;
        let scope = Scope {
            blk: Some(blk),
            ..Scope::default()
        };
        self.in_scope(scope, |c| {
            c.dedup_members(blk);
            for member in c.ast.block(blk).ids.clone() {
                c.check_id(member)?;
            }
            Ok(())
        })
    }
}
