//! Lowering of the checked tree into the intermediate representation.
//!
//! Every contract and library becomes one [`Module`]. Structured control flow
//! is flattened into basic blocks, identifiers are replaced by the storage
//! they live in, and string literals move into the module's segment:
//!
//! - locals and parameters live in registers;
//! - locals of aggregate type live in the function's stack frame;
//! - contract variables live in contract storage, relative to the contract
//!   base address.
//!
//! Functions that fall off their end without returning a value are reported
//! here, once unreachable blocks are known.

mod exp;
mod id;
mod stmt;

use std::collections::HashMap;

use tracing::{debug, instrument};

use crate::{
    ast::{Ast, Expr, ExprKind, IdKind, IdRef, Stmt, Value},
    diag::{Diagnostics, Fatal},
    ir::{BbId, Function, Module},
    meta::{Meta, Type},
    token::Span,
    util::intern::{Interned, Interner},
};

/// Lowers every contract and library of a checked tree.
///
/// The tree must be free of errors. Its statements are consumed.
#[instrument(skip_all)]
pub fn translate(
    ast: &mut Ast,
    idents: &mut Interner<str>,
    diags: &mut Diagnostics,
) -> Result<Vec<Module>, Fatal> {
    let containers: Vec<IdRef> = ast
        .block(ast.root)
        .ids
        .iter()
        .copied()
        .filter(|r| matches!(ast.id(*r).kind, IdKind::Contract(_) | IdKind::Library(_)))
        .collect();
    let mut modules = Vec::with_capacity(containers.len());
    for r in containers {
        let module = Trans::new(ast, idents, diags, r).trans_container(r)?;
        modules.push(module);
    }
    debug!(modules = modules.len(), "translated");
    Ok(modules)
}

type Result<T = (), E = Fatal> = std::result::Result<T, E>;

/// Where a variable lives.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Storage {
    Reg(u32),
    /// Offset into contract storage.
    Heap(u32),
    /// Offset into the stack frame.
    Stack(u32),
}

/// Targets of `continue` and `break` within one loop or switch.
#[derive(Copy, Clone, Debug)]
struct Jump {
    cont: Option<BbId>,
    brk: BbId,
}

struct Trans<'a> {
    ast: &'a mut Ast,
    idents: &'a mut Interner<str>,
    diags: &'a mut Diagnostics,
    module: Module,
    /// The function being lowered.
    func: Function,
    /// The block statements are appended to. `None` right after a jump.
    bb: Option<BbId>,
    globals: HashMap<IdRef, Storage>,
    locals: HashMap<IdRef, Storage>,
    jumps: Vec<Jump>,
    labels: HashMap<IdRef, BbId>,
}

impl<'a> Trans<'a> {
    fn new(
        ast: &'a mut Ast,
        idents: &'a mut Interner<str>,
        diags: &'a mut Diagnostics,
        container: IdRef,
    ) -> Self {
        let name = ast.id(container).name;
        Trans {
            ast,
            idents,
            diags,
            module: Module::new(name),
            func: Function::new(name, name, Meta::default()),
            bb: None,
            globals: HashMap::new(),
            locals: HashMap::new(),
            jumps: Vec::new(),
            labels: HashMap::new(),
        }
    }

    /// `Container.name` of a member.
    fn qname(&mut self, r: IdRef) -> Interned<str> {
        let id = self.ast.id(r);
        let up = id.up.map_or("", |up| self.idents.get(self.ast.id(up).name));
        let qname = format!("{up}.{}", self.idents.get(id.name));
        self.idents.intern(&qname)
    }

    /// The current block, which is opened if the last statement jumped away.
    /// Statements lowered into such a block are unreachable.
    fn cur(&mut self) -> BbId {
        match self.bb {
            Some(bb) => bb,
            None => {
                let bb = self.func.new_block();
                self.bb = Some(bb);
                bb
            }
        }
    }

    fn emit(&mut self, stmt: Stmt) {
        let bb = self.cur();
        self.func.block_mut(bb).stmts.push(stmt);
    }

    /// Adds a branch from the current block to `target`.
    fn branch(&mut self, cond: Option<Expr>, target: BbId) {
        let bb = self.cur();
        self.func.add_branch(bb, cond, target);
    }

    /// Ends the current block with an unconditional jump to `target`.
    fn close(&mut self, target: BbId) {
        if let Some(bb) = self.bb.take() {
            self.func.add_branch(bb, None, target);
        }
    }

    fn label_bb(&mut self, label: IdRef) -> BbId {
        if let Some(&bb) = self.labels.get(&label) {
            return bb;
        }
        let bb = self.func.new_block();
        self.labels.insert(label, bb);
        bb
    }

    fn storage(&self, r: IdRef) -> Option<Storage> {
        self.locals
            .get(&r)
            .or_else(|| self.globals.get(&r))
            .copied()
    }

    /// The register holding the contract base address.
    fn heap_reg(&self) -> Result<u32> {
        self.func
            .heap_reg
            .ok_or(Fatal::Invariant("contract storage accessed without a base"))
    }

    /// The register holding the stack frame base, added on first use.
    fn stack_reg(&mut self) -> u32 {
        match self.func.stack_reg {
            Some(reg) => reg,
            None => {
                let reg = self.func.add_reg(Meta::new(Type::UInt32));
                self.func.stack_reg = Some(reg);
                reg
            }
        }
    }

    fn storage_expr(&mut self, storage: Storage, meta: Meta, span: Span) -> Result<Expr> {
        let kind = match storage {
            Storage::Reg(idx) => ExprKind::Reg(idx),
            Storage::Heap(addr) => ExprKind::Mem {
                base: self.heap_reg()?,
                addr,
                offset: 0,
            },
            Storage::Stack(addr) => ExprKind::Mem {
                base: self.stack_reg(),
                addr,
                offset: 0,
            },
        };
        Ok(lvalue(kind, meta, span))
    }

    /// Adds the NUL-terminated string to the segment.
    fn str_lit(&mut self, raw: &str, span: Span) -> Expr {
        let addr = self.module.segment.intern_str(raw);
        Expr::lit(Value::Addr(addr), span)
    }
}

fn lvalue(kind: ExprKind, meta: Meta, span: Span) -> Expr {
    let mut expr = Expr::new(kind, span).with_meta(meta);
    expr.is_lvalue = true;
    expr
}

fn reg(idx: u32, meta: Meta, span: Span) -> Expr {
    lvalue(ExprKind::Reg(idx), meta, span)
}

fn global(name: Interned<str>, meta: Meta, span: Span) -> Expr {
    lvalue(ExprKind::Global(name), meta, span)
}

fn u32_lit(value: u32, span: Span) -> Expr {
    Expr::lit(Value::Int(value.into()), span).with_meta(Meta::new(Type::UInt32))
}

#[cfg(test)]
mod tests {
    use crate::{
        ast::{ExprKind, StmtKind, Value},
        diag::{Diagnostics, Error, Fatal},
        ir::{Module, ValType},
        util::{
            intern::Interner,
            test_utils::{self, tree_tests},
        },
    };

    fn translate(src: &str) -> (Vec<Module>, Diagnostics, Interner<str>) {
        let mut interner = Interner::with_capacity(64);
        let mut diags = Diagnostics::new();
        let (mut ast, errors) = test_utils::check_program(src, &mut interner, &mut diags);
        assert!(errors.is_empty(), "{errors:?}");
        let modules = super::translate(&mut ast, &mut interner, &mut diags).unwrap();
        (modules, diags, interner)
    }

    #[test]
    fn minimal_contract() {
        let (modules, diags, i) = translate("contract A { public func get() int64 { return 42; } }");
        assert!(diags.is_empty());
        assert_eq!(modules.len(), 1);
        let module = &modules[0];
        assert_eq!(module.fns.len(), 2);

        let ctor = &module.fns[0];
        assert!(ctor.is_ctor);
        assert_eq!(i.get(ctor.qname), "A.A");

        let get = &module.fns[1];
        assert_eq!(i.get(get.qname), "A.get");
        assert!(std::ptr::eq(module.find_fn(get.qname).unwrap(), get));
        let abi = &module.abis[get.abi];
        assert_eq!(abi.params, [ValType::I32]);
        assert_eq!(abi.result, Some(ValType::I64));

        let entry = get.block(get.entry);
        assert_eq!(entry.stmts.len(), 1);
        let StmtKind::Return(Some(val)) = &entry.stmts[0].kind else {
            panic!("expected a return, got {:?}", entry.stmts[0].kind);
        };
        assert_eq!(val.kind, ExprKind::Lit(Value::Int(42)));
        assert_eq!(entry.branches.len(), 1);
        assert!(entry.branches[0].cond.is_none());
        assert_eq!(entry.branches[0].target, get.exit);
        assert!(get.blocks.iter().all(|b| b.ref_cnt > 0));
    }

    #[test]
    fn falling_off_the_end_is_reported() {
        let (_, diags, _) = translate(indoc::indoc! {"
            contract A {
                func f(int32 x) int32 {
                    if (x > 0) {
                        return 1;
                    }
                }
                func g(int32 x) int32 {
                    if (x > 0) {
                        return 1;
                    } else {
                        return 2;
                    }
                }
            }
        "});
        let missing: Vec<_> = diags
            .iter()
            .filter(|d| matches!(d.error, Error::MissingReturn(_)))
            .collect();
        assert_eq!(missing.len(), 1);
    }

    #[test]
    fn dead_code_needs_no_return() {
        let (modules, diags, _) = translate(indoc::indoc! {"
            contract A {
                func f(int32 x) int32 {
                    return x;
                    if (x > 0) {
                        x = 1;
                    }
                }
            }
        "});
        assert!(diags.is_empty(), "{:?}", diags.iter().collect::<Vec<_>>());
        let f = &modules[0].fns[1];
        let dead = f.blocks.iter().filter(|b| b.ref_cnt == 0).count();
        assert_eq!(dead, 3);
    }

    #[test]
    fn equal_strings_are_interned_once() {
        let (modules, _, _) = translate(indoc::indoc! {r#"
            contract A {
                func f() string {
                    string a = "hi";
                    string b = "hi";
                    return "there";
                }
            }
        "#});
        assert_eq!(modules[0].segment.len(), 2);
    }

    #[test]
    fn jumps_left_by_a_failed_check_are_fatal() {
        let mut interner = Interner::with_capacity(16);
        let mut diags = Diagnostics::new();
        let src = "contract A { func f() { break; } }";
        let (mut ast, errors) = test_utils::check_program(src, &mut interner, &mut diags);
        assert_eq!(errors, ["error[INVALID_BREAK]: break outside of a loop or switch"]);

        let fatal = super::translate(&mut ast, &mut interner, &mut diags).unwrap_err();
        let Fatal::Emitted(diagnostic) = fatal else {
            panic!("expected an emitted diagnostic, got {fatal:?}");
        };
        assert_eq!(diagnostic.error, Error::InvalidBreak);
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn oversized_storage_is_rejected() {
        let mut interner = Interner::with_capacity(16);
        let mut diags = Diagnostics::new();
        let src = "
            contract A {
                int32 a[30000][30000];
                int32 b[30000][30000];
                int32 c;
            }
        ";
        let (mut ast, errors) = test_utils::check_program(src, &mut interner, &mut diags);
        assert!(errors.is_empty(), "{errors:?}");
        super::translate(&mut ast, &mut interner, &mut diags).unwrap();
        let errors: Vec<_> = diags.iter().map(|d| &d.error).collect();
        assert_eq!(errors, [&Error::TooLarge]);
    }

    #[test]
    fn functions_follow_the_interface_order() {
        let (modules, _, i) = translate(indoc::indoc! {"
            interface I {
                func b();
                func a();
            }
            contract A implements I {
                func c() {}
                func a() {}
                func b() {}
            }
        "});
        let names: Vec<_> = modules[0].fns.iter().map(|f| i.get(f.qname)).collect();
        assert_eq!(names, ["A.A", "A.b", "A.a", "A.c"]);
    }

    tree_tests!(
        use trans;

        fn get_returns_a_literal() {
            let program = "contract A { public func get() int64 { return 42; } }";
            let tree_ok = r#"
                module A
                  abi 0 () -> i32
                  abi 1 (i32) -> i64
                  func A.A [public ctor] abi 0 regs 1
                    r0: uint32
                    bb0:
                      -> bb1
                    bb1:
                      return r0
                  func A.get [public] abi 1 regs 1
                    r0: A
                    bb0:
                      return 42
                      -> bb1
                    bb1:
            "#;
        }

        fn constructor_initializes_fields() {
            let program = r#"
                contract A {
                    int32 x = 1;
                    int64 y;
                    string s = "a";
                    int32 a, b = 2, 3;
                }
            "#;
            let tree_ok = r#"
                module A
                  abi 0 () -> i32
                  func A.A [public ctor] abi 0 regs 1
                    r0: uint32
                    bb0:
                      r0 = syscall system.__malloc(28)
                      [r0+0] = 1
                      [r0+16] = @0
                      [r0+20] = 2
                      [r0+24] = 3
                      -> bb1
                    bb1:
                      return r0
                  data @0 "a\0"
            "#;
        }

        fn loops_branch_back() {
            let program = r#"
                contract A {
                    func f() int32 {
                        int32 s = 0;
                        for (int32 i = 0; i < 10; i++) {
                            if (i == 5) {
                                continue;
                            }
                            s += i;
                        }
                        return s;
                    }
                }
            "#;
            let tree_ok = r#"
                module A
                  abi 0 () -> i32
                  abi 1 (i32) -> i32
                  func A.A [public ctor] abi 0 regs 1
                    r0: uint32
                    bb0:
                      -> bb1
                    bb1:
                      return r0
                  func A.f abi 1 regs 3
                    r0: A
                    r1: int32
                    r2: int32
                    bb0:
                      r1 = 0
                      r2 = 0
                      -> bb2
                    bb1:
                    bb2:
                      -> bb3 if !(r2 < 10)
                      -> bb5
                    bb3:
                      return r1
                      -> bb1
                    bb4:
                      r2 = (r2 + 1)
                      -> bb2
                    bb5:
                      -> bb7 if (r2 == 5)
                      -> bb6
                    bb6:
                      r1 = (r1 + r2)
                      -> bb4
                    bb7:
                      -> bb4
            "#;
        }

        fn switch_falls_through() {
            let program = r#"
                contract A {
                    func f(int32 x) int32 {
                        int32 y = 0;
                        switch (x) {
                        case 1:
                            y = 10;
                        case 2:
                            y = 20;
                            break;
                        default:
                            y = 30;
                        }
                        return y;
                    }
                }
            "#;
            let tree_ok = r#"
                module A
                  abi 0 () -> i32
                  abi 1 (i32, i32) -> i32
                  func A.A [public ctor] abi 0 regs 1
                    r0: uint32
                    bb0:
                      -> bb1
                    bb1:
                      return r0
                  func A.f abi 1 regs 3
                    r0: A
                    r1: int32
                    r2: int32
                    bb0:
                      r2 = 0
                      -> bb3 if (r1 == 1)
                      -> bb4 if (r1 == 2)
                      -> bb5
                    bb1:
                    bb2:
                      return r2
                      -> bb1
                    bb3:
                      r2 = 10
                      -> bb4
                    bb4:
                      r2 = 20
                      -> bb2
                    bb5:
                      r2 = 30
                      -> bb2
            "#;
        }

        fn strings_and_calls_use_the_system_library() {
            let program = r#"
                contract A {
                    func g(string s) int32 {
                        return (int32) s;
                    }
                    func f(string s) bool {
                        string t = s + "!";
                        return g(t) > 0 && t == s;
                    }
                }
            "#;
            let tree_ok = r#"
                module A
                  abi 0 () -> i32
                  abi 1 (i32, i32) -> i32
                  func A.A [public ctor] abi 0 regs 1
                    r0: uint32
                    bb0:
                      -> bb1
                    bb1:
                      return r0
                  func A.g abi 1 regs 2
                    r0: A
                    r1: string
                    bb0:
                      return syscall system.__atoi32(r1)
                      -> bb1
                    bb1:
                  func A.f abi 1 regs 3
                    r0: A
                    r1: string
                    r2: string
                    bb0:
                      r2 = syscall system.__strcat(r1, @0)
                      return ((call A.g(r0, r2) > 0) && (syscall system.__strcmp(r2, r1) == 0))
                      -> bb1
                    bb1:
                  data @0 "!\0"
            "#;
        }

        fn postfix_updates_yield_the_old_value() {
            let program = r#"
                contract A {
                    func f() int32 {
                        int32 i = 0;
                        if (i++ == 0) {
                            return i;
                        }
                        return i--;
                    }
                }
            "#;
            let tree_ok = r#"
                module A
                  abi 0 () -> i32
                  abi 1 (i32) -> i32
                  func A.A [public ctor] abi 0 regs 1
                    r0: uint32
                    bb0:
                      -> bb1
                    bb1:
                      return r0
                  func A.f abi 1 regs 4
                    r0: A
                    r1: int32
                    r2: int32
                    r3: int32
                    bb0:
                      r1 = 0
                      r2 = r1
                      r1 = (r1 + 1)
                      -> bb3 if (r2 == 0)
                      -> bb2
                    bb1:
                    bb2:
                      r3 = r1
                      r1 = (r1 - 1)
                      return r3
                      -> bb1
                    bb3:
                      return r1
                      -> bb1
            "#;
        }

        fn goto_jumps_into_a_nested_block() {
            let program = r#"
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
            "#;
            let tree_ok = r#"
                module A
                  abi 0 () -> i32
                  abi 1 (i32, i32) -> i32
                  func A.A [public ctor] abi 0 regs 1
                    r0: uint32
                    bb0:
                      -> bb1
                    bb1:
                      return r0
                  func A.f abi 1 regs 2
                    r0: A
                    r1: int32
                    bb0:
                      -> bb2
                    bb1:
                    bb2:
                      return 1
                      -> bb1
                    bb3:
                      -> bb5 if (r1 > 0)
                      -> bb4
                    bb4:
                      return 0
                      -> bb1
                    bb5:
                      -> bb2
            "#;
        }

        fn nested_structs_are_laid_out_inline() {
            let program = r#"
                contract A {
                    struct Q {
                        int64 a;
                        int64 b;
                    }
                    struct P {
                        Q q;
                        int32 z;
                    }
                    func f() int32 {
                        P p;
                        p.q.b = 1;
                        p.q.a = 2;
                        p.z = 3;
                        return p.z;
                    }
                }
            "#;
            let tree_ok = r#"
                module A
                  abi 0 () -> i32
                  abi 1 (i32) -> i32
                  func A.A [public ctor] abi 0 regs 1
                    r0: uint32
                    bb0:
                      -> bb1
                    bb1:
                      return r0
                  func A.f abi 1 regs 2
                    r0: A
                    r1: uint32
                    bb0:
                      r1 = $stack$top
                      $stack$top = ($stack$top + 24)
                      syscall system.__assert(($stack$top <= $stack$max), @0, null)
                      [r1+0+8] = 1
                      [r1+0] = 2
                      [r1+0+16] = 3
                      return [r1+0+16]
                      -> bb1
                    bb1:
                      $stack$top = r1
                  data @0 "stack overflow\0"
            "#;
        }

        fn aggregates_live_in_the_stack_frame() {
            let program = r#"
                contract A {
                    struct P {
                        int32 x;
                        int64 y;
                    }
                    func f() int64 {
                        P p;
                        p.y = 7;
                        return p.y;
                    }
                }
            "#;
            let tree_ok = r#"
                module A
                  abi 0 () -> i32
                  abi 1 (i32) -> i64
                  func A.A [public ctor] abi 0 regs 1
                    r0: uint32
                    bb0:
                      -> bb1
                    bb1:
                      return r0
                  func A.f abi 1 regs 2
                    r0: A
                    r1: uint32
                    bb0:
                      r1 = $stack$top
                      $stack$top = ($stack$top + 16)
                      syscall system.__assert(($stack$top <= $stack$max), @0, null)
                      [r1+0+8] = 7
                      return [r1+0+8]
                      -> bb1
                    bb1:
                      $stack$top = r1
                  data @0 "stack overflow\0"
            "#;
        }
    );
}
