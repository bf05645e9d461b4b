//! Semantic checking.
//!
//! The checker resolves every identifier reference, computes the [`Meta`] of
//! every declaration and expression, and rewrites a few constructs into
//! simpler ones:
//!
//! - `for` loops become plain loops guarded by a conditional `break`;
//! - `switch` cases become boolean conditions;
//! - constants and enum elements are replaced by their values.
//!
//! User errors are reported to [`Diagnostics`] and checking resumes at the
//! next statement or declaration. Only broken invariants abort, as [`Fatal`].

mod exp;
mod id;
mod stmt;

use std::collections::HashSet;

use tracing::{debug, instrument};

use crate::{
    ast::{Ast, BlockId, BlockKind, Id, IdKind, IdRef},
    diag::{Diagnostics, Error, Fatal},
    meta::{meta_cmp, Meta},
    token::Span,
    util::intern::{Interned, Interner},
};

/// Checks the whole tree in place.
#[instrument(skip_all)]
pub fn check(
    ast: &mut Ast,
    idents: &mut Interner<str>,
    diags: &mut Diagnostics,
) -> Result<(), Fatal> {
    let before = diags.len();
    let mut checker = Checker::new(ast, idents, diags);
    let result = checker.check_root();
    debug!(diagnostics = diags.len() - before, "checked");
    match result {
        Err(Stop::Fatal(fatal)) => Err(fatal),
        _ => Ok(()),
    }
}

/// Why checking of a node stopped early.
#[derive(Debug)]
enum Stop {
    /// A diagnostic has been reported; checking resumes at the next node.
    Reported,
    Fatal(Fatal),
}

impl From<Fatal> for Stop {
    fn from(fatal: Fatal) -> Stop {
        Stop::Fatal(fatal)
    }
}

type Result<T = (), E = Stop> = std::result::Result<T, E>;

/// Swallows reported errors, so that checking resumes with the next node.
fn absorb(result: Result) -> Result {
    match result {
        Err(Stop::Reported) => Ok(()),
        other => other,
    }
}

/// The lexical position of the checker.
///
/// Saved and restored around every nested block and lazily checked
/// declaration.
#[derive(Copy, Clone, Debug, Default)]
struct Scope {
    blk: Option<BlockId>,
    /// The function whose body is being checked.
    fn_id: Option<IdRef>,
    /// The contract whose members are being checked.
    cont_id: Option<IdRef>,
    /// The qualifier of a member access, whose members are searched instead
    /// of the enclosing blocks.
    qual_id: Option<IdRef>,
}

struct Checker<'a> {
    ast: &'a mut Ast,
    diags: &'a mut Diagnostics,
    scope: Scope,
    this: Interned<str>,
    size: Interned<str>,
}

impl<'a> Checker<'a> {
    fn new(ast: &'a mut Ast, idents: &mut Interner<str>, diags: &'a mut Diagnostics) -> Self {
        Checker {
            ast,
            diags,
            scope: Scope::default(),
            this: idents.intern("this"),
            size: idents.intern("size"),
        }
    }

    fn check_root(&mut self) -> Result {
        let root = self.ast.root;
        self.scope = Scope {
            blk: Some(root),
            ..Scope::default()
        };
        self.dedup_members(root);
        let ids = self.ast.block(root).ids.clone();
        for &r in &ids {
            if let Some(blk) = self.ast.id(r).members() {
                self.ast.block_mut(blk).up = Some(root);
            }
        }
        for r in ids {
            self.check_id_lazily(r)?;
        }
        Ok(())
    }

    fn error<T>(&mut self, span: Span, error: Error) -> Result<T> {
        self.diags.error(span, error);
        Err(Stop::Reported)
    }

    /// Compares two metas, reporting a mismatch at `span`.
    fn cmp(&mut self, span: Span, x: &Meta, y: &Meta) -> Result {
        if meta_cmp(self.diags, span, x, y) {
            Ok(())
        } else {
            Err(Stop::Reported)
        }
    }

    /// Runs `f` in `scope`, restoring the current scope afterwards.
    fn in_scope<T>(&mut self, scope: Scope, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = std::mem::replace(&mut self.scope, scope);
        let result = f(self);
        self.scope = saved;
        result
    }

    /// Reports duplicated names in a member block, dropping the standalone
    /// duplicates so that the first declaration wins.
    fn dedup_members(&mut self, blk: BlockId) {
        let mut seen = HashSet::new();
        let ids = std::mem::take(&mut self.ast.block_mut(blk).ids);
        let mut kept = Vec::with_capacity(ids.len());
        for r in ids {
            let mut duplicated = false;
            for (name, span) in self.declared_names(r) {
                if !seen.insert(name) {
                    self.diags.error(span, Error::DuplicatedId(name));
                    duplicated = true;
                }
            }
            if !duplicated || matches!(self.ast.id(r).kind, IdKind::Tuple(_)) {
                kept.push(r);
            }
        }
        self.ast.block_mut(blk).ids = kept;
    }

    /// Adds a local declaration to `blk`, unless its name is already taken
    /// in that block.
    fn declare(&mut self, blk: BlockId, r: IdRef) {
        if self.ast.block(blk).ids.contains(&r) {
            return;
        }
        let mut duplicated = false;
        for (name, span) in self.declared_names(r) {
            let taken = self.ast.block(blk).ids.iter().any(|other| {
                self.declared_names(*other)
                    .iter()
                    .any(|(other_name, _)| *other_name == name)
            });
            if taken {
                self.diags.error(span, Error::DuplicatedId(name));
                duplicated = true;
            }
        }
        if !duplicated || matches!(self.ast.id(r).kind, IdKind::Tuple(_)) {
            self.ast.block_mut(blk).ids.push(r);
        }
    }

    /// The names a declaration introduces. Tuples introduce their elements.
    fn declared_names(&self, r: IdRef) -> Vec<(Interned<str>, Span)> {
        let id = self.ast.id(r);
        match &id.kind {
            IdKind::Tuple(tuple) => tuple
                .elems
                .iter()
                .map(|elem| {
                    let elem = self.ast.id(*elem);
                    (elem.name, elem.span)
                })
                .collect(),
            IdKind::Label => Vec::new(),
            _ => vec![(id.name, id.span)],
        }
    }

    /// Finds `name` among `ids`, looking through tuples.
    fn find_in(&self, ids: &[IdRef], name: Interned<str>, visible: impl Fn(&Id) -> bool) -> Option<IdRef> {
        ids.iter().find_map(|r| {
            let id = self.ast.id(*r);
            match &id.kind {
                IdKind::Label => None,
                IdKind::Tuple(tuple) => {
                    tuple
                        .elems
                        .iter()
                        .copied()
                        .find(|elem| self.ast.id(*elem).name == name && visible(self.ast.id(*elem)))
                }
                _ => (id.name == name && visible(id)).then_some(*r),
            }
        })
    }

    /// Resolves an identifier reference.
    ///
    /// Inside a member access, only the qualifier's members are searched.
    /// Otherwise the enclosing blocks are searched from the innermost
    /// outwards; the parameters of the current function are searched right
    /// after its body. `this` names the current contract.
    fn search_id(&self, name: Interned<str>) -> Option<IdRef> {
        if let Some(qual) = self.scope.qual_id {
            return self.search_member(qual, name);
        }
        let mut cur = self.scope.blk;
        while let Some(blk) = cur {
            let block = self.ast.block(blk);
            if let Some(r) = self.find_in(&block.ids, name, |_| true) {
                return Some(r);
            }
            if block.kind == BlockKind::Function {
                let params = self
                    .scope
                    .fn_id
                    .and_then(|f| self.ast.id(f).as_func())
                    .map(|func| func.params.as_slice())
                    .unwrap_or_default();
                if let Some(r) = self.find_in(params, name, |_| true) {
                    return Some(r);
                }
            }
            cur = block.up;
        }
        if name == self.this {
            return self.scope.cont_id;
        }
        None
    }

    /// Resolves a type name through the enclosing blocks.
    fn search_type(&self, name: Interned<str>) -> Option<IdRef> {
        let mut cur = self.scope.blk;
        while let Some(blk) = cur {
            let block = self.ast.block(blk);
            let found = block.ids.iter().copied().find(|r| {
                let id = self.ast.id(*r);
                id.name == name
                    && matches!(
                        id.kind,
                        IdKind::Struct(_) | IdKind::Enum(_) | IdKind::Contract(_) | IdKind::Interface(_)
                    )
            });
            if found.is_some() {
                return found;
            }
            cur = block.up;
        }
        None
    }

    /// Finds a member of a struct, enum, contract, interface or library.
    ///
    /// Private contract members are only visible from the contract itself.
    fn search_member(&self, qual: IdRef, name: Interned<str>) -> Option<IdRef> {
        let self_access = self.scope.cont_id == Some(qual);
        match &self.ast.id(qual).kind {
            IdKind::Struct(fields) => self.find_in(fields, name, |_| true),
            IdKind::Enum(elems) => self.find_in(elems, name, |_| true),
            IdKind::Library(blk) => self.find_in(&self.ast.block(*blk).ids, name, |_| true),
            IdKind::Contract(cont) => {
                let ids = &self.ast.block(cont.blk).ids;
                self.find_in(ids, name, |id| self_access || id.is_public())
            }
            IdKind::Interface(blk) => {
                self.find_in(&self.ast.block(*blk).ids, name, |id| id.is_public())
            }
            _ => None,
        }
    }

    /// The innermost enclosing block of `kind`, within the current function.
    fn enclosing(&self, kind: BlockKind) -> Option<BlockId> {
        let mut cur = self.scope.blk;
        while let Some(blk) = cur {
            let block = self.ast.block(blk);
            if block.kind == kind {
                return Some(blk);
            }
            if block.kind == BlockKind::Function {
                return None;
            }
            cur = block.up;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        ast::{BlockKind, IdKind, StmtKind},
        diag::{Diagnostics, Error, Level},
        util::{
            fmt::tree,
            intern::Interner,
            test_utils::{self, tree_tests},
        },
    };

    tree_tests!(
        use checker;

        fn inner_declaration_shadows_outer() {
            let program = r#"
                contract A {
                    func f() {
                        int8 x = 1;
                        {
                            string x = "a";
                            x = "b";
                        }
                        x = 2;
                    }
                }
            "#;
            let tree_ok = r#"
                contract A
                  func A [public ctor]
                  func f
                    var x: int8
                      lit 1 : int8
                    block
                      var x: string
                        lit "a" : string
                      assign
                        id x : string
                        lit "b" : string
                    assign
                      id x : int8
                      lit 2 : int8
            "#;
        }

        fn for_loop_is_desugared() {
            let program = "
                contract A {
                    func f() {
                        for (int32 i = 0; i < 10; i++) {
                            i = i;
                        }
                    }
                }
            ";
            let tree_ok = "
                contract A
                  func A [public ctor]
                  func f
                    loop
                      init
                        var i: int32
                          lit 0 : int32
                      body
                        break if
                          unary ! : bool
                            binary < : bool
                              id i : int32
                              lit 10 : int32
                        assign
                          id i : int32
                          id i : int32
                        exp
                          postfix ++ : int32
                            id i : int32
            ";
        }

        fn switch_cases_become_conditions() {
            let program = "
                contract A {
                    func f(int32 v) int32 {
                        switch (v) {
                        case 1:
                            return 10;
                        default:
                            return 0;
                        }
                    }
                }
            ";
            let tree_ok = "
                contract A
                  func A [public ctor]
                  func f
                    param v: int32
                    returns int32
                    switch
                      body
                        case
                          binary == : bool
                            id v : int32
                            lit 1 : int32
                        return
                          lit 10 : int32
                        default
                        return
                          lit 0 : int32
            ";
        }

        fn constants_and_enums_are_replaced_by_values() {
            let program = "
                enum Color { Red, Green = 5, Blue }
                contract A {
                    const int32 MAX = 10;
                    func f() int32 { return Color.Blue + MAX; }
                }
            ";
            let tree_ok = "
                enum Color
                  var Red [public const] = 0
                  var Green [public const] = 5
                    lit 5 : int32
                  var Blue [public const] = 6
                contract A
                  func A [public ctor]
                  var MAX: int32 [const] = 10
                    lit 10 : int32
                  func f
                    returns int32
                    return
                      binary + : int32
                        lit 6 : int32
                        lit 10 : int32
            ";
        }

        fn errors_accumulate_across_functions() {
            let program = "
                contract A {
                    func f() { int32 a = b; }
                    func g() { c = 1; }
                }
            ";
            let expected_errors = &[
                "error[UNDEFINED_ID]: b is not defined",
                "error[UNDEFINED_ID]: c is not defined",
            ];
        }

        fn nested_tuples_are_flattened() {
            let program = "
                contract A {
                    func f() {
                        int32 a, b, c;
                        int32 x, y, z;
                        a, b, c = x, (y, z);
                        a, b, c = x, y;
                    }
                }
            ";
            let expected_errors = &["error[MISMATCHED_COUNT]: expected 3 element, but got 2"];
        }

        fn duplicated_cases() {
            let program = "
                contract A {
                    func f(int32 v) {
                        switch (v) {
                        case 1:
                            break;
                        case 1:
                            break;
                        default:
                            break;
                        default:
                            break;
                        }
                    }
                }
            ";
            let expected_errors = &[
                "error[DUPLICATED_CASE]: case value is already used in this switch",
                "error[DUPLICATED_LABEL]: default is already defined in this switch",
            ];
        }

        fn cases_are_compared_structurally() {
            let program = "
                contract A {
                    func f(int32 v, int32 w) {
                        switch (v) {
                        case w:
                            break;
                        case w + 1:
                            break;
                        case w:
                            break;
                        }
                    }
                }
            ";
            let expected_errors = &["error[DUPLICATED_CASE]: case value is already used in this switch"];
        }

        fn goto_reaches_a_nested_label() {
            let program = "
                contract A {
                    func f(int32 x) int32 {
                        goto out;
                        if (x > 0) {
                            out:
                            return 1;
                        }
                        return 0;
                    }
                }
            ";
            let tree_ok = "
                contract A
                  func A [public ctor]
                  func f
                    param x: int32
                    returns int32
                    goto out
                    if
                      binary > : bool
                        id x : int32
                        lit 0 : int32
                    then
                      out:
                      return
                        lit 1 : int32
                    return
                      lit 0 : int32
            ";
        }

        fn oversized_arrays_are_rejected() {
            let program = "contract A { int32 a[65536][65536]; func f() { int8 b[65536][65536]; } }";
            let expected_errors = &[
                "error[TOO_LARGE]: value does not fit in the address space",
                "error[TOO_LARGE]: value does not fit in the address space",
            ];
        }

        fn literal_overflow() {
            let program = "contract A { int8 x = 300; string s = 1; }";
            let expected_errors = &[
                "error[NUMERIC_OVERFLOW]: 300 does not fit in int8",
                "error[MISMATCHED_TYPE]: expected type string, but got integer literal",
            ];
        }

        fn jumps_outside_of_loops() {
            let program = "
                contract A {
                    func f() {
                        break;
                        continue;
                        goto out;
                    }
                }
            ";
            let expected_errors = &[
                "error[INVALID_BREAK]: break outside of a loop or switch",
                "error[INVALID_CONTINUE]: continue outside of a loop",
                "error[UNDEFINED_LABEL]: label out is not defined",
            ];
        }

        fn statement_without_effect() {
            let program = "contract A { func f() { int32 a; a + 1; } }";
            let expected_errors = &["warning[IGNORED_STMT]: statement has no effect"];
        }

        fn array_loop_is_rejected() {
            let program = "
                contract A {
                    func f() {
                        int32 a[3];
                        for (int32 x in a) { }
                    }
                }
            ";
            let expected_errors = &["error[NOT_SUPPORTED]: array loop is not supported"];
        }

        fn map_key_must_be_comparable() {
            let program = "
                struct P { int32 x; }
                contract A { map(P, int32) m; }
            ";
            let expected_errors = &["error[NOT_COMPARABLE_TYPE]: P cannot be a map key"];
        }

        fn private_members_are_hidden() {
            let program = "
                contract B { int32 secret; public int32 open; }
                contract A { func f(B b) int32 { return b.open + b.secret; } }
            ";
            let expected_errors = &["error[INACCESSIBLE_TYPE]: member is not accessible"];
        }

        fn calls_are_checked() {
            let program = "
                contract A {
                    func g(int32 a) int32 { return g(a); }
                    func f() { g(1, 2); }
                }
            ";
            let expected_errors = &[
                "warning[RECURSIVE_CALL]: function g calls itself",
                "error[MISMATCHED_COUNT]: expected 1 argument, but got 2",
            ];
        }
    );

    #[test]
    fn loop_desugaring_is_idempotent() {
        let src = "contract A { func f() { for (int i = 0; i < 10; i++) { int x = i; } } }";
        let interner = &mut Interner::with_capacity(16);
        let diags = &mut Diagnostics::new();
        let (mut ast, errors) = test_utils::check_program(src, interner, diags);
        assert!(errors.is_empty(), "{errors:?}");

        let first = tree::print_program_string(interner, &ast, true);
        for id in &mut ast.ids {
            id.is_checked = false;
        }
        super::check(&mut ast, interner, diags).unwrap();
        let second = tree::print_program_string(interner, &ast, true);
        pretty_assertions::assert_eq!(first, second);
        assert!(diags.is_empty());

        let body = ast
            .blocks
            .iter()
            .find(|blk| blk.kind == BlockKind::Loop)
            .unwrap();
        let guards = body
            .stmts
            .iter()
            .filter(|stmt| matches!(stmt.kind, StmtKind::Break(Some(_))))
            .count();
        assert_eq!(guards, 1);
        assert!(matches!(body.stmts[0].kind, StmtKind::Break(Some(_))));
        assert!(matches!(body.stmts.last().unwrap().kind, StmtKind::Exp(_)));
    }

    #[test]
    fn labels_are_hoisted_to_the_function_body() {
        let src = "contract A { func f(int32 x) { goto out; if (x > 0) { out: x = 1; } } }";
        let interner = &mut Interner::with_capacity(16);
        let diags = &mut Diagnostics::new();
        let (ast, errors) = test_utils::check_program(src, interner, diags);
        assert!(errors.is_empty(), "{errors:?}");

        let body = ast
            .blocks
            .iter()
            .find(|blk| blk.stmts.iter().any(|stmt| matches!(stmt.kind, StmtKind::Goto { .. })))
            .unwrap();
        assert_eq!(body.kind, BlockKind::Function);
        let label = body
            .ids
            .iter()
            .copied()
            .find(|r| matches!(ast.id(*r).kind, IdKind::Label))
            .unwrap();
        assert_eq!(interner.get(ast.id(label).name), "out");
        let resolved = body.stmts.iter().find_map(|stmt| match &stmt.kind {
            StmtKind::Goto { label, .. } => *label,
            _ => None,
        });
        assert_eq!(resolved, Some(label));
    }

    #[test]
    fn duplicate_keeps_first_declaration() {
        let src = "contract A { func f() { int a, b = 1, 2; string b; b = 3; } }";
        let interner = &mut Interner::with_capacity(16);
        let diags = &mut Diagnostics::new();
        let (ast, _) = test_utils::check_program(src, interner, diags);

        let duplicates: Vec<_> = diags
            .iter()
            .filter(|d| matches!(d.error, Error::DuplicatedId(_)))
            .collect();
        assert_eq!(duplicates.len(), 1);
        assert_eq!(diags.count(Level::Error), 1);

        let body = ast
            .blocks
            .iter()
            .find(|blk| blk.kind == BlockKind::Function && !blk.ids.is_empty())
            .unwrap();
        assert_eq!(body.ids.len(), 1);
    }
}
