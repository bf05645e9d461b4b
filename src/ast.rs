// Grammar (informal)
//
// program   ::= (import | contract | interface | library | struct | enum)*
// import    ::= 'import' STRING ';'
// contract  ::= 'contract' ID ['implements' ID] '{' member* '}'
// interface ::= 'interface' ID '{' (func_head ';')* '}'
// library   ::= 'library' ID '{' func* '}'
// member    ::= var_decl ';' | struct | enum | func | ctor
// struct    ::= 'struct' ID '{' (var_decl ';')* '}'
// enum      ::= 'enum' ID '{' ID ['=' exp] (',' ID ['=' exp])* '}'
// func      ::= func_head block
// func_head ::= ['public'] ['payable'] 'func' ID '(' params ')' [type]
// ctor      ::= ID '(' params ')' block
// var_decl  ::= qual* type declarator (',' declarator)* ['=' exp]
// declarator::= ID ('[' [exp] ']')*
// stmt      ::= var_decl ';' | exp ';' | exp asgn_op exp ';' | if | for | switch
//             | 'case' exp ':' | 'default' ':' | ID ':' stmt
//             | 'return' [exp] ';' | 'continue' ';' | 'break' ';' | 'goto' ID ';'
//             | ('create' | 'drop') SQL ';' | 'assert' '(' exp [',' STRING] ')' ';'
//             | block | ';'
//
// Precedence (low to high)
//
// = op=
// ?:
// ||
// &&
// |
// ^
// &
// == !=
// < > <= >=
// << >>
// + -
// * / %
// unary (! - ~ ++ -- cast new)
// postfix ([] () . ++ --)

use std::fmt;

use crate::{
    meta::{Meta, Type},
    token::{Span, Spanned},
    util::intern::Interned,
};

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }

            fn of(index: usize) -> $name {
                $name(u32::try_from(index).expect("arena out of capacity"))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

handle!(
    /// A handle to a [`Block`] in the [`Ast`] arena.
    BlockId
);
handle!(
    /// A handle to an [`Id`] in the [`Ast`] arena.
    IdRef
);

/// The syntax tree of one compilation unit.
///
/// Blocks and identifiers live in arenas and refer to each other through
/// handles, so the scope chain (`Block::up`) never owns its parent.
#[derive(Debug)]
pub struct Ast {
    pub blocks: Vec<Block>,
    pub ids: Vec<Id>,
    pub root: BlockId,
    pub imports: Vec<Spanned<Box<str>>>,
}

impl Ast {
    pub fn new() -> Ast {
        let mut ast = Ast {
            blocks: Vec::new(),
            ids: Vec::new(),
            root: BlockId(0),
            imports: Vec::new(),
        };
        ast.root = ast.new_block(BlockKind::Root, Span::default());
        ast
    }

    pub fn new_block(&mut self, kind: BlockKind, span: Span) -> BlockId {
        let id = BlockId::of(self.blocks.len());
        self.blocks.push(Block {
            kind,
            up: None,
            ids: Vec::new(),
            stmts: Vec::new(),
            span,
        });
        id
    }

    pub fn new_id(&mut self, id: Id) -> IdRef {
        let r = IdRef::of(self.ids.len());
        self.ids.push(id);
        r
    }

    pub fn block(&self, b: BlockId) -> &Block {
        &self.blocks[b.index()]
    }

    pub fn block_mut(&mut self, b: BlockId) -> &mut Block {
        &mut self.blocks[b.index()]
    }

    pub fn id(&self, r: IdRef) -> &Id {
        &self.ids[r.index()]
    }

    pub fn id_mut(&mut self, r: IdRef) -> &mut Id {
        &mut self.ids[r.index()]
    }

    /// Returns the top-level contracts, in declaration order.
    pub fn contracts(&self) -> impl Iterator<Item = IdRef> + '_ {
        self.block(self.root)
            .ids
            .iter()
            .copied()
            .filter(|r| matches!(self.id(*r).kind, IdKind::Contract(_)))
    }
}

impl Default for Ast {
    fn default() -> Self {
        Ast::new()
    }
}

/// Collects every label of every function body into the function's outermost
/// block, so that `goto` can target labels declared anywhere in the function.
///
/// Runs once, after parsing and before checking.
pub fn hoist_labels(ast: &mut Ast) {
    let bodies: Vec<BlockId> = ast
        .ids
        .iter()
        .filter_map(|id| match &id.kind {
            IdKind::Func(func) => func.body,
            _ => None,
        })
        .collect();
    for body in bodies {
        let mut labels = Vec::new();
        collect_labels(ast, body, &mut labels);
        ast.block_mut(body).ids.extend(labels);
    }
}

fn collect_labels(ast: &Ast, blk: BlockId, labels: &mut Vec<IdRef>) {
    for stmt in &ast.block(blk).stmts {
        if let Some(label) = stmt.label {
            labels.push(label);
        }
        for nested in stmt.blocks() {
            collect_labels(ast, nested, labels);
        }
    }
}

#[derive(Debug)]
pub struct Block {
    pub kind: BlockKind,
    /// Lexically enclosing block. Set by the checker on entry; `None` for
    /// the root.
    pub up: Option<BlockId>,
    /// Declared identifiers, in declaration order.
    pub ids: Vec<IdRef>,
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BlockKind {
    Normal,
    Root,
    Contract,
    Interface,
    Library,
    Function,
    Loop,
    Switch,
}

/// A syntactic name, such as the field of an access or a goto target.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Ident {
    pub name: Interned<str>,
    pub span: Span,
}

/// Declaration modifiers.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Modifiers(u8);

impl Modifiers {
    pub const PRIVATE: Modifiers = Modifiers(0);
    pub const PUBLIC: Modifiers = Modifiers(0x01);
    pub const PAYABLE: Modifiers = Modifiers(0x02);
    pub const READONLY: Modifiers = Modifiers(0x04);
    pub const CONST: Modifiers = Modifiers(0x08);
    pub const CTOR: Modifiers = Modifiers(0x10);
    pub const SHARED: Modifiers = Modifiers(0x20);

    pub fn contains(self, other: Modifiers) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Modifiers) {
        self.0 |= other.0;
    }

    #[must_use]
    pub fn with(self, other: Modifiers) -> Modifiers {
        Modifiers(self.0 | other.0)
    }

    pub fn names(self) -> impl Iterator<Item = &'static str> {
        [
            (Modifiers::PUBLIC, "public"),
            (Modifiers::PAYABLE, "payable"),
            (Modifiers::READONLY, "readonly"),
            (Modifiers::CONST, "const"),
            (Modifiers::CTOR, "ctor"),
            (Modifiers::SHARED, "shared"),
        ]
        .into_iter()
        .filter(move |(m, _)| self.contains(*m))
        .map(|(_, name)| name)
    }
}

/// A named declaration.
#[derive(Debug)]
pub struct Id {
    pub name: Interned<str>,
    pub span: Span,
    pub mods: Modifiers,
    /// Resolved type. Filled in by the checker.
    pub meta: Meta,
    pub kind: IdKind,
    /// The contract, interface or library this identifier is a member of.
    pub up: Option<IdRef>,
    pub is_checked: bool,
    pub is_used: bool,
}

impl Id {
    pub fn new(name: Interned<str>, span: Span, kind: IdKind) -> Id {
        Id {
            name,
            span,
            mods: Modifiers::PRIVATE,
            meta: Meta::default(),
            kind,
            up: None,
            is_checked: false,
            is_used: false,
        }
    }

    pub fn is_public(&self) -> bool {
        self.mods.contains(Modifiers::PUBLIC)
    }

    pub fn is_const(&self) -> bool {
        self.mods.contains(Modifiers::CONST)
    }

    pub fn is_ctor(&self) -> bool {
        self.mods.contains(Modifiers::CTOR)
    }

    pub fn as_var(&self) -> Option<&Var> {
        match &self.kind {
            IdKind::Var(var) => Some(var),
            _ => None,
        }
    }

    pub fn as_func(&self) -> Option<&Func> {
        match &self.kind {
            IdKind::Func(func) => Some(func),
            _ => None,
        }
    }

    /// The member block of a contract, interface or library.
    pub fn members(&self) -> Option<BlockId> {
        match &self.kind {
            IdKind::Contract(cont) => Some(cont.blk),
            IdKind::Interface(blk) | IdKind::Library(blk) => Some(*blk),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            IdKind::Var(_) => "variable",
            IdKind::Struct(_) => "struct",
            IdKind::Enum(_) => "enum",
            IdKind::Func(_) => "function",
            IdKind::Contract(_) => "contract",
            IdKind::Interface(_) => "interface",
            IdKind::Library(_) => "library",
            IdKind::Label => "label",
            IdKind::Tuple(_) => "tuple",
        }
    }
}

#[derive(Debug)]
pub enum IdKind {
    Var(Var),
    /// Fields, in declaration order.
    Struct(Vec<IdRef>),
    /// Elements, in declaration order.
    Enum(Vec<IdRef>),
    Func(Func),
    Contract(Contract),
    Interface(BlockId),
    Library(BlockId),
    Label,
    /// A declarator list sharing one type and one initializer.
    Tuple(Tuple),
}

#[derive(Debug, Default)]
pub struct Var {
    /// Type expression. Absent for enum elements and tuple elements.
    pub ty: Option<Expr>,
    /// Array dimensions; `None` for `[]`.
    pub dims: Vec<Option<Expr>>,
    pub init: Option<Expr>,
    pub is_param: bool,
    /// Literal value of a constant or an enum element, once checked.
    pub value: Option<Value>,
}

#[derive(Debug)]
pub struct Func {
    pub params: Vec<IdRef>,
    /// Return type expression; `None` for void functions and constructors.
    pub ret: Option<Expr>,
    /// `None` for interface function heads.
    pub body: Option<BlockId>,
}

#[derive(Debug)]
pub struct Contract {
    pub blk: BlockId,
    pub implements: Option<Ident>,
    /// Resolved by the checker.
    pub itf: Option<IdRef>,
}

#[derive(Debug)]
pub struct Tuple {
    pub elems: Vec<IdRef>,
    pub ty: Option<Expr>,
    pub init: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
    pub label: Option<IdRef>,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Stmt {
        Stmt {
            kind,
            span,
            label: None,
        }
    }

    pub fn null(span: Span) -> Stmt {
        Stmt::new(StmtKind::Null, span)
    }

    /// Blocks directly nested in this statement.
    pub fn blocks(&self) -> Vec<BlockId> {
        match &self.kind {
            StmtKind::If(stmt) => std::iter::once(stmt.then)
                .chain(stmt.elifs.iter().map(|elif| elif.blk))
                .chain(stmt.els)
                .collect(),
            StmtKind::Loop(stmt) => vec![stmt.blk],
            StmtKind::Switch(stmt) => vec![stmt.blk],
            StmtKind::Block(blk) => vec![*blk],
            _ => Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StmtKind {
    Null,
    Exp(Expr),
    Assign { lhs: Expr, rhs: Expr },
    /// A local declaration.
    Decl(IdRef),
    If(If),
    Loop(Loop),
    Switch(Switch),
    /// `case exp:`, or `default:` when empty.
    Case(Option<Expr>),
    Return(Option<Expr>),
    Continue,
    /// A break, optionally guarded by a condition.
    Break(Option<Expr>),
    Goto { target: Ident, label: Option<IdRef> },
    Ddl(Box<str>),
    Block(BlockId),
    Pragma(Pragma),
}

#[derive(Clone, Debug, PartialEq)]
pub struct If {
    pub cond: Expr,
    pub then: BlockId,
    pub elifs: Vec<ElseIf>,
    pub els: Option<BlockId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ElseIf {
    pub cond: Expr,
    pub blk: BlockId,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Loop {
    /// Initializer, which runs once before the loop. For array loops, the
    /// element declaration.
    pub init: Option<Box<Stmt>>,
    /// Loop condition. For array loops, the iterated expression.
    pub cond: Option<Expr>,
    pub inc: Option<Expr>,
    pub blk: BlockId,
    pub is_array: bool,
    /// Whether the last statement of the body is the moved increment, which
    /// `continue` must not skip.
    pub has_inc: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Switch {
    pub subject: Option<Expr>,
    pub blk: BlockId,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Pragma {
    Assert {
        cond: Expr,
        /// Source text of the condition.
        text: Box<str>,
        desc: Option<Box<str>>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    pub meta: Meta,
    /// The declaration this expression refers to, once resolved.
    pub id: Option<IdRef>,
    pub is_lvalue: bool,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Expr {
        Expr {
            kind,
            span,
            meta: Meta::default(),
            id: None,
            is_lvalue: false,
        }
    }

    pub fn null(span: Span) -> Expr {
        Expr::new(ExprKind::Null, span)
    }

    pub fn with_meta(mut self, meta: Meta) -> Expr {
        self.meta = meta;
        self
    }

    pub fn lit(value: Value, span: Span) -> Expr {
        let meta = value.meta();
        Expr::new(ExprKind::Lit(value), span).with_meta(meta)
    }

    pub fn is_lit(&self) -> bool {
        matches!(self.kind, ExprKind::Lit(_))
    }

    pub fn lit_int(&self) -> Option<i128> {
        match self.kind {
            ExprKind::Lit(Value::Int(v)) => Some(v),
            _ => None,
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self.kind, ExprKind::Call { .. })
    }

    /// Structural equality, ignoring spans and metas. Identifiers are equal
    /// when they resolve to the same declaration.
    pub fn same_as(&self, other: &Expr) -> bool {
        fn all(a: &[Expr], b: &[Expr]) -> bool {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| a.same_as(b))
        }

        match (&self.kind, &other.kind) {
            (ExprKind::Id(a), ExprKind::Id(b)) => a.name == b.name && self.id == other.id,
            (ExprKind::Type(a), ExprKind::Type(b)) => match (a, b) {
                (TypeName::Prim(a), TypeName::Prim(b)) => a == b,
                (TypeName::Named(a), TypeName::Named(b)) => a.name == b.name,
                (
                    TypeName::Map { key, value },
                    TypeName::Map {
                        key: other_key,
                        value: other_value,
                    },
                ) => key.same_as(other_key) && value.same_as(other_value),
                _ => false,
            },
            (
                ExprKind::Array { base, index },
                ExprKind::Array {
                    base: other_base,
                    index: other_index,
                },
            ) => base.same_as(other_base) && index.same_as(other_index),
            (
                ExprKind::Cast { ty, val },
                ExprKind::Cast {
                    ty: other_ty,
                    val: other_val,
                },
            ) => ty.same_as(other_ty) && val.same_as(other_val),
            (
                ExprKind::Unary { op, val },
                ExprKind::Unary {
                    op: other_op,
                    val: other_val,
                },
            ) => op == other_op && val.same_as(other_val),
            (
                ExprKind::Binary { op, lhs, rhs },
                ExprKind::Binary {
                    op: other_op,
                    lhs: other_lhs,
                    rhs: other_rhs,
                },
            ) => op == other_op && lhs.same_as(other_lhs) && rhs.same_as(other_rhs),
            (
                ExprKind::Ternary { cond, then, els },
                ExprKind::Ternary {
                    cond: other_cond,
                    then: other_then,
                    els: other_els,
                },
            ) => cond.same_as(other_cond) && then.same_as(other_then) && els.same_as(other_els),
            (
                ExprKind::Access { qual, field },
                ExprKind::Access {
                    qual: other_qual,
                    field: other_field,
                },
            ) => field.name == other_field.name && qual.same_as(other_qual),
            (
                ExprKind::Call { callee, args, kind },
                ExprKind::Call {
                    callee: other_callee,
                    args: other_args,
                    kind: other_kind,
                },
            ) => kind == other_kind && callee.same_as(other_callee) && all(args, other_args),
            (ExprKind::Tuple(a), ExprKind::Tuple(b)) | (ExprKind::Init(a), ExprKind::Init(b)) => {
                all(a, b)
            }
            (
                ExprKind::Alloc { ty, dims },
                ExprKind::Alloc {
                    ty: other_ty,
                    dims: other_dims,
                },
            ) => ty.same_as(other_ty) && all(dims, other_dims),
            // The remaining kinds hold no spans.
            (a, b) => a == b,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Null,
    Lit(Value),
    Id(Ident),
    Type(TypeName),
    Array {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Cast {
        ty: Box<Expr>,
        val: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        val: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        els: Box<Expr>,
    },
    Access {
        qual: Box<Expr>,
        field: Ident,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        kind: CallKind,
    },
    Sql {
        kind: SqlKind,
        text: Box<str>,
    },
    Tuple(Vec<Expr>),
    /// `{a, b}`.
    Init(Vec<Expr>),
    Alloc {
        ty: Box<Expr>,
        dims: Vec<Expr>,
    },

    // Storage references, introduced by the translator.
    Global(Interned<str>),
    Reg(u32),
    Mem {
        base: u32,
        addr: u32,
        offset: u32,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum TypeName {
    Prim(Type),
    Named(Ident),
    Map { key: Box<Expr>, value: Box<Expr> },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i128),
    Float(f64),
    /// Raw string contents, with escape sequences not yet decoded.
    Str(Box<str>),
    /// Address of interned data.
    Addr(u32),
}

impl Value {
    pub fn meta(&self) -> Meta {
        match self {
            Value::Null => Meta::undef(Type::Object),
            Value::Bool(_) => Meta::new(Type::Bool),
            Value::Int(v) => Meta::int_lit(*v),
            Value::Float(_) => Meta::undef(Type::Double),
            Value::Str(_) | Value::Addr(_) => Meta::new(Type::String),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Str(s) => write!(f, "\"{s}\""),
            Value::Addr(a) => write!(f, "@{a}"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CallKind {
    /// A call of a user-defined function.
    Udf,
    /// `new C(...)`.
    Ctor,
    /// A call of a system library function, introduced by lowering.
    Sys,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SqlKind {
    Query,
    Insert,
    Update,
    Delete,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    PreInc,
    PreDec,
    PostInc,
    PostDec,
    Neg,
    Not,
    BitNot,
}

impl UnaryOp {
    pub fn is_inc_dec(self) -> bool {
        matches!(
            self,
            UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec
        )
    }

    pub fn is_postfix(self) -> bool {
        matches!(self, UnaryOp::PostInc | UnaryOp::PostDec)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::PreInc | UnaryOp::PostInc => "++",
            UnaryOp::PreDec | UnaryOp::PostDec => "--",
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn is_arith(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod
        )
    }

    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl | BinaryOp::Shr
        )
    }

    pub fn is_cmp(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}
