//! Intermediate representation.
//!
//! The translator lowers every contract into a [`Module`]: a table of
//! deduplicated function signatures, the functions themselves as graphs of
//! [`BasicBlock`]s, and a [`Segment`] of constant data. Lowered statements and
//! expressions reuse the syntax tree types, with identifiers replaced by
//! storage references (`Reg`, `Mem` and `Global`).

pub mod segment;

use std::{collections::VecDeque, fmt};

use crate::{
    ast::{Expr, Stmt, StmtKind},
    meta::{Meta, Type},
    util::intern::Interned,
};

pub use segment::Segment;

/// Name of the global holding the current top of the stack area.
pub const STACK_TOP: &str = "stack$top";
/// Name of the global holding the upper bound of the stack area.
pub const STACK_MAX: &str = "stack$max";

/// A value type of the target machine.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValType {
    I32,
    I64,
    F32,
    F64,
}

impl ValType {
    /// The machine type of values of `meta`. Aggregates are addresses.
    pub fn of(meta: &Meta) -> Option<ValType> {
        if meta.is_array() {
            return Some(ValType::I32);
        }
        match meta.ty {
            Type::None | Type::Void | Type::Tuple => None,
            Type::Int64 | Type::UInt64 => Some(ValType::I64),
            Type::Float => Some(ValType::F32),
            Type::Double => Some(ValType::F64),
            _ => Some(ValType::I32),
        }
    }
}

impl fmt::Display for ValType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValType::I32 => "i32",
            ValType::I64 => "i64",
            ValType::F32 => "f32",
            ValType::F64 => "f64",
        })
    }
}

/// A function signature.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Abi {
    pub params: Vec<ValType>,
    pub result: Option<ValType>,
}

/// The lowered form of one contract (or library).
#[derive(Debug)]
pub struct Module {
    pub name: Interned<str>,
    pub abis: Vec<Abi>,
    pub fns: Vec<Function>,
    pub segment: Segment,
    /// Bytes of contract storage the constructor allocates.
    pub heap_usage: u32,
}

impl Module {
    pub fn new(name: Interned<str>) -> Module {
        Module {
            name,
            abis: Vec::new(),
            fns: Vec::new(),
            segment: Segment::new(),
            heap_usage: 0,
        }
    }

    /// Returns the index of `abi`, adding it if no equal signature exists.
    pub fn add_abi(&mut self, abi: Abi) -> usize {
        match self.abis.iter().position(|a| *a == abi) {
            Some(idx) => idx,
            None => {
                self.abis.push(abi);
                self.abis.len() - 1
            }
        }
    }

    pub fn find_fn(&self, qname: Interned<str>) -> Option<&Function> {
        self.fns.iter().find(|f| f.qname == qname)
    }
}

/// A handle to a [`BasicBlock`] of a [`Function`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BbId(u32);

impl BbId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

#[derive(Debug)]
pub struct Function {
    pub name: Interned<str>,
    /// `Container.name`, unique within a compilation unit.
    pub qname: Interned<str>,
    pub is_public: bool,
    pub is_ctor: bool,
    /// Index into [`Module::abis`].
    pub abi: usize,
    /// Number of leading registers which are parameters.
    pub param_cnt: u32,
    pub ret: Meta,
    /// Register file, parameters first.
    pub regs: Vec<Meta>,
    pub blocks: Vec<BasicBlock>,
    pub entry: BbId,
    pub exit: BbId,
    /// Register holding the contract base address, which all contract
    /// storage is relative to.
    pub heap_reg: Option<u32>,
    /// Register holding the base of this call's stack frame.
    pub stack_reg: Option<u32>,
    /// Bytes of stack frame.
    pub stack_usage: u32,
}

impl Function {
    pub fn new(name: Interned<str>, qname: Interned<str>, ret: Meta) -> Function {
        let mut func = Function {
            name,
            qname,
            is_public: false,
            is_ctor: false,
            abi: 0,
            param_cnt: 0,
            ret,
            regs: Vec::new(),
            blocks: Vec::new(),
            entry: BbId(0),
            exit: BbId(0),
            heap_reg: None,
            stack_reg: None,
            stack_usage: 0,
        };
        func.entry = func.new_block();
        func.exit = func.new_block();
        func
    }

    pub fn new_block(&mut self) -> BbId {
        let id = BbId(u32::try_from(self.blocks.len()).expect("basic blocks out of capacity"));
        self.blocks.push(BasicBlock::default());
        id
    }

    /// Adds a register of type `meta`, returning its index.
    pub fn add_reg(&mut self, meta: Meta) -> u32 {
        self.regs.push(meta);
        u32::try_from(self.regs.len() - 1).expect("registers out of capacity")
    }

    pub fn block(&self, bb: BbId) -> &BasicBlock {
        &self.blocks[bb.index()]
    }

    pub fn block_mut(&mut self, bb: BbId) -> &mut BasicBlock {
        &mut self.blocks[bb.index()]
    }

    pub fn add_branch(&mut self, from: BbId, cond: Option<Expr>, target: BbId) {
        self.block_mut(from).branches.push(Branch { cond, target });
    }

    /// Recomputes every block's count of incoming edges from reachable blocks.
    /// The entry block counts the call itself.
    pub fn count_refs(&mut self) {
        for block in &mut self.blocks {
            block.ref_cnt = 0;
        }
        let mut live = vec![false; self.blocks.len()];
        let mut queue = VecDeque::from([self.entry]);
        live[self.entry.index()] = true;
        self.blocks[self.entry.index()].ref_cnt = 1;
        while let Some(bb) = queue.pop_front() {
            let targets: Vec<BbId> = self.block(bb).branches.iter().map(|b| b.target).collect();
            for target in targets {
                self.block_mut(target).ref_cnt += 1;
                if !live[target.index()] {
                    live[target.index()] = true;
                    queue.push_back(target);
                }
            }
        }
    }

    /// Live blocks which fall into the exit block without returning.
    pub fn missing_returns(&self) -> impl Iterator<Item = BbId> + '_ {
        self.blocks.iter().enumerate().filter_map(move |(idx, block)| {
            let bb = BbId(u32::try_from(idx).ok()?);
            let falls_out = block.ref_cnt > 0
                && bb != self.exit
                && block.branches.iter().any(|b| b.target == self.exit)
                && !block.ends_with_return();
            falls_out.then_some(bb)
        })
    }
}

#[derive(Debug, Default)]
pub struct BasicBlock {
    pub stmts: Vec<Stmt>,
    /// Outgoing edges, tried in order. An unguarded branch is always taken.
    pub branches: Vec<Branch>,
    pub ref_cnt: u32,
}

impl BasicBlock {
    pub fn ends_with_return(&self) -> bool {
        matches!(self.stmts.last().map(|s| &s.kind), Some(StmtKind::Return(_)))
    }
}

#[derive(Debug)]
pub struct Branch {
    pub cond: Option<Expr>,
    pub target: BbId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ast::Value, token::Span, util::intern::Interner};

    fn function() -> Function {
        let mut i = Interner::<str>::with_capacity(4);
        let name = i.intern("f");
        Function::new(name, i.intern("A.f"), Meta::new(Type::Int32))
    }

    #[test]
    fn abis_are_deduplicated() {
        let mut i = Interner::<str>::with_capacity(1);
        let mut module = Module::new(i.intern("A"));
        let a = module.add_abi(Abi {
            params: vec![ValType::I32],
            result: Some(ValType::I64),
        });
        let b = module.add_abi(Abi {
            params: vec![ValType::I32, ValType::I32],
            result: None,
        });
        let c = module.add_abi(Abi {
            params: vec![ValType::I32],
            result: Some(ValType::I64),
        });
        assert_eq!((a, b, c), (0, 1, 0));
        assert_eq!(module.abis.len(), 2);
    }

    #[test]
    fn unreachable_blocks_are_exempt_from_returns() {
        let mut f = function();
        let (entry, exit) = (f.entry, f.exit);
        let ret = Stmt::new(
            StmtKind::Return(Some(Expr::lit(Value::Int(1), Span::default()))),
            Span::default(),
        );
        f.block_mut(entry).stmts.push(ret);
        f.add_branch(entry, None, exit);

        // dead -> orphan -> exit, neither reachable from the entry.
        let dead = f.new_block();
        let orphan = f.new_block();
        f.add_branch(dead, None, orphan);
        f.add_branch(orphan, None, exit);

        f.count_refs();
        assert_eq!(f.block(entry).ref_cnt, 1);
        assert_eq!(f.block(exit).ref_cnt, 1);
        assert_eq!(f.block(dead).ref_cnt, 0);
        assert_eq!(f.block(orphan).ref_cnt, 0);
        assert_eq!(f.missing_returns().count(), 0);
    }

    #[test]
    fn live_fallthrough_is_a_missing_return() {
        let mut f = function();
        let (entry, exit) = (f.entry, f.exit);
        let next = f.new_block();
        f.add_branch(entry, None, next);
        f.add_branch(next, None, exit);
        f.count_refs();
        assert_eq!(f.missing_returns().collect::<Vec<_>>(), [next]);
    }
}
