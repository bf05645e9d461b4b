use tracing::debug;

use crate::{
    ast::{
        self, Ast, BinaryOp, BlockId, BlockKind, CallKind, Contract, ElseIf, Expr, ExprKind, Func,
        Id, IdKind, IdRef, Ident, If, Loop, Modifiers, Pragma, SqlKind, Stmt, StmtKind, Switch,
        Tuple, TypeName, UnaryOp, Value, Var,
    },
    lexer::{self, extract},
    meta::Type,
    token::{Pos, Span, Spanned, Token, TokenKind},
    util::intern::Interner,
};

type Result<T, E = ()> = std::result::Result<T, E>;

pub type ParseResult<T> = Result<T, (T, Vec<Spanned<Error>>)>;

pub fn parse_program(
    src: &str,
    tokens: &mut Vec<Token>,
    ident_interner: &mut Interner<str>,
) -> ParseResult<Ast> {
    let result = parse(
        src,
        tokens,
        ident_interner,
        |p| {
            p.parse_program();
            Ok(std::mem::take(&mut p.ast))
        },
        Ast::new,
    );
    let hoist = |mut ast: Ast| {
        ast::hoist_labels(&mut ast);
        ast
    };
    match result {
        Ok(ast) => Ok(hoist(ast)),
        Err((ast, errors)) => Err((hoist(ast), errors)),
    }
}

pub fn parse_expr(
    src: &str,
    tokens: &mut Vec<Token>,
    ident_interner: &mut Interner<str>,
) -> ParseResult<Expr> {
    let default = || Expr::null(Span::new_of_length(src.len(), 0));
    parse(src, tokens, ident_interner, Parser::parse_expr_list, default)
}

fn parse<'src, 'tok, 'ident, T>(
    src: &'src str,
    tokens: &'tok mut Vec<Token>,
    ident_interner: &'ident mut Interner<str>,
    f: impl for<'a> FnOnce(&'a mut Parser<'src, 'tok, 'ident>) -> Result<T>,
    default: impl FnOnce() -> T,
) -> ParseResult<T> {
    assert!(tokens.is_empty());

    lexer::lex(src, tokens);
    let mut p = Parser::new(src, tokens, ident_interner);
    let parse_result = f(&mut p);
    if parse_result.is_ok() && !p.is(TokenKind::Eof) {
        let c = p.peek();
        p.error(c.span().wrap(Error::Unexpected {
            actual: c.kind,
            expected: TokenKind::Eof,
        }));
    }
    debug!(errors = p.errors.len(), "parsed");

    let el = parse_result.unwrap_or_else(|()| default());
    if p.errors.is_empty() {
        Ok(el)
    } else {
        Err((el, p.errors))
    }
}

struct Parser<'src, 'tok, 'ident> {
    src: &'src str,
    tokens: &'tok mut Vec<Token>,
    ident_interner: &'ident mut Interner<str>,
    cursor: usize,
    /// Span of the last consumed token.
    last: Span,
    errors: Vec<Spanned<Error>>,
    ast: Ast,
    /// The contract, interface or library being parsed.
    container: Option<IdRef>,
}

const TOP_LEVEL: &[TokenKind] = &[
    TokenKind::Import,
    TokenKind::Contract,
    TokenKind::Interface,
    TokenKind::Library,
    TokenKind::Struct,
    TokenKind::Enum,
];

/// Declarations.
impl Parser<'_, '_, '_> {
    fn parse_program(&mut self) {
        while self.except([]) {
            let root = self.ast.root;
            _ = self.synchronize(&[], TOP_LEVEL, |p| p.parse_top_level(root));
        }
    }

    fn parse_top_level(&mut self, root: BlockId) -> Result<()> {
        match self.peek().kind {
            TokenKind::Import => {
                let start = self.advance();
                let path = self.consume(TokenKind::StrLit)?;
                self.consume(TokenKind::Semicolon)?;
                let path = Box::from(extract::string(path, self.src));
                let span = start.span().to(self.last);
                self.ast.imports.push(span.wrap(path));
                Ok(())
            }
            TokenKind::Contract => self.parse_contract(root),
            TokenKind::Interface => self.parse_interface(root),
            TokenKind::Library => self.parse_library(root),
            TokenKind::Struct => self.parse_struct(root),
            TokenKind::Enum => self.parse_enum(root),
            _ => {
                let c = self.peek();
                self.error(c.span().wrap(Error::UnexpectedAny {
                    actual: c.kind,
                    expected: Box::from(TOP_LEVEL),
                }));
                Err(())
            }
        }
    }

    fn parse_contract(&mut self, root: BlockId) -> Result<()> {
        let start = self.consume(TokenKind::Contract)?;
        let (name, implements) = match self.parse_contract_declarator() {
            Ok(declarator) => declarator,
            Err(()) => {
                // Resume at the contract body, so that its members are still
                // parsed.
                self.skip_to(TokenKind::LBrace);
                let name = self.ident_interner.intern("<error>");
                let ident = Ident {
                    name,
                    span: start.span(),
                };
                (ident, None)
            }
        };
        let blk = self.ast.new_block(BlockKind::Contract, start.span());
        let mut id = Id::new(
            name.name,
            name.span,
            IdKind::Contract(Contract {
                blk,
                implements,
                itf: None,
            }),
        );
        id.mods = Modifiers::PUBLIC;
        let cont = self.ast.new_id(id);
        self.ast.block_mut(root).ids.push(cont);

        let result = self.in_container(cont, |p| p.parse_members(blk, Some(name)));
        self.ensure_ctor(cont, blk, name);
        self.ast.block_mut(blk).span = start.span().to(self.last);
        result
    }

    fn parse_contract_declarator(&mut self) -> Result<(Ident, Option<Ident>)> {
        let name = self.parse_ident()?;
        let implements = if self.take(TokenKind::Implements) {
            Some(self.parse_ident()?)
        } else {
            None
        };
        if !self.is(TokenKind::LBrace) {
            let c = self.peek();
            self.error(c.span().wrap(Error::Unexpected {
                actual: c.kind,
                expected: TokenKind::LBrace,
            }));
            return Err(());
        }
        Ok((name, implements))
    }

    /// Moves the constructor to the front of the member list, synthesizing an
    /// empty one if the contract declares none.
    fn ensure_ctor(&mut self, cont: IdRef, blk: BlockId, name: Ident) {
        let ids = &self.ast.block(blk).ids;
        let ctor_pos = ids.iter().position(|r| self.ast.id(*r).is_ctor());
        let ctor = match ctor_pos {
            Some(pos) => self.ast.block_mut(blk).ids.remove(pos),
            None => {
                let body = self.ast.new_block(BlockKind::Function, name.span);
                let func = Func {
                    params: Vec::new(),
                    ret: None,
                    body: Some(body),
                };
                let mut id = Id::new(name.name, name.span, IdKind::Func(func));
                id.mods = Modifiers::PUBLIC.with(Modifiers::CTOR);
                id.up = Some(cont);
                self.ast.new_id(id)
            }
        };
        self.ast.block_mut(blk).ids.insert(0, ctor);
    }

    fn parse_interface(&mut self, root: BlockId) -> Result<()> {
        let start = self.consume(TokenKind::Interface)?;
        let name = self.parse_ident()?;
        let blk = self.ast.new_block(BlockKind::Interface, start.span());
        let mut id = Id::new(name.name, name.span, IdKind::Interface(blk));
        id.mods = Modifiers::PUBLIC;
        let itf = self.ast.new_id(id);
        self.ast.block_mut(root).ids.push(itf);

        self.consume(TokenKind::LBrace)?;
        self.in_container(itf, |p| {
            while p.except([TokenKind::RBrace]) {
                let result = p.parse_modifiers().and_then(|mods| {
                    let func = p.parse_func(mods.with(Modifiers::PUBLIC), false)?;
                    p.consume(TokenKind::Semicolon)?;
                    Ok(func)
                });
                match result {
                    Ok(func) => p.ast.block_mut(blk).ids.push(func),
                    Err(()) => p.recover(),
                }
            }
        });
        self.consume(TokenKind::RBrace)?;
        self.ast.block_mut(blk).span = start.span().to(self.last);
        Ok(())
    }

    fn parse_library(&mut self, root: BlockId) -> Result<()> {
        let start = self.consume(TokenKind::Library)?;
        let name = self.parse_ident()?;
        let blk = self.ast.new_block(BlockKind::Library, start.span());
        let mut id = Id::new(name.name, name.span, IdKind::Library(blk));
        id.mods = Modifiers::PUBLIC;
        let lib = self.ast.new_id(id);
        self.ast.block_mut(root).ids.push(lib);

        let result = self.in_container(lib, |p| p.parse_members(blk, None));
        self.ast.block_mut(blk).span = start.span().to(self.last);
        result
    }

    /// Parses `'{' member* '}'`. `cont_name` is set for contracts, whose
    /// constructors are named after them.
    fn parse_members(&mut self, blk: BlockId, cont_name: Option<Ident>) -> Result<()> {
        self.consume(TokenKind::LBrace)?;
        while self.except([TokenKind::RBrace]) {
            match self.parse_member(blk, cont_name) {
                Ok(Some(member)) => self.ast.block_mut(blk).ids.push(member),
                Ok(None) => (),
                Err(()) => self.recover(),
            }
        }
        self.consume(TokenKind::RBrace)?;
        Ok(())
    }

    fn parse_member(&mut self, blk: BlockId, cont_name: Option<Ident>) -> Result<Option<IdRef>> {
        match self.peek().kind {
            TokenKind::Struct => return self.parse_struct(blk).map(|()| None),
            TokenKind::Enum => return self.parse_enum(blk).map(|()| None),
            TokenKind::Semicolon => {
                self.advance();
                return Ok(None);
            }
            _ => (),
        }
        let mods = self.parse_modifiers()?;
        if self.is(TokenKind::Func) {
            return self.parse_func(mods, true).map(Some);
        }
        if let Some(cont_name) = cont_name {
            let c = self.peek();
            if c.kind == TokenKind::Identifier
                && self.peek_ahead(1).kind == TokenKind::LParen
                && extract::ident(c, self.src) == self.ident_interner.get(cont_name.name)
            {
                return self.parse_ctor(mods).map(Some);
            }
        }
        let var = self.parse_var_decl(mods)?;
        self.consume(TokenKind::Semicolon)?;
        Ok(Some(var))
    }

    fn parse_modifiers(&mut self) -> Result<Modifiers> {
        let mut mods = Modifiers::PRIVATE;
        loop {
            let m = match self.peek().kind {
                TokenKind::Public => Modifiers::PUBLIC,
                TokenKind::Payable => Modifiers::PAYABLE,
                TokenKind::Const => Modifiers::CONST,
                TokenKind::Readonly => Modifiers::READONLY,
                _ => return Ok(mods),
            };
            self.advance();
            mods.insert(m);
        }
    }

    fn parse_func(&mut self, mods: Modifiers, with_body: bool) -> Result<IdRef> {
        self.consume(TokenKind::Func)?;
        let name = self.parse_ident()?;
        let params = self.parse_params()?;

        let ret = if self.is(TokenKind::LBrace) || self.is(TokenKind::Semicolon) {
            None
        } else if self.is(TokenKind::LParen) {
            let start = self.advance();
            let mut types =
                self.parse_list(TokenKind::RParen, TokenKind::Comma, None, Parser::parse_type)?;
            self.consume(TokenKind::RParen)?;
            if types.len() > 1 {
                let span = start.span().to(self.last);
                self.error(span.wrap(Error::MultipleReturns));
                return Err(());
            }
            types.pop()
        } else {
            let ty = self.parse_type()?;
            if self.is(TokenKind::Comma) {
                let span = ty.span.to(self.peek().span());
                self.error(span.wrap(Error::MultipleReturns));
                return Err(());
            }
            Some(ty)
        };

        let body = if with_body {
            Some(self.parse_block(BlockKind::Function)?)
        } else {
            None
        };
        let mut id = Id::new(name.name, name.span, IdKind::Func(Func { params, ret, body }));
        id.mods = mods;
        id.up = self.container;
        Ok(self.ast.new_id(id))
    }

    fn parse_ctor(&mut self, mods: Modifiers) -> Result<IdRef> {
        let name = self.parse_ident()?;
        let params = self.parse_params()?;
        let body = self.parse_block(BlockKind::Function)?;
        let func = Func {
            params,
            ret: None,
            body: Some(body),
        };
        let mut id = Id::new(name.name, name.span, IdKind::Func(func));
        id.mods = mods.with(Modifiers::PUBLIC).with(Modifiers::CTOR);
        id.up = self.container;
        Ok(self.ast.new_id(id))
    }

    fn parse_params(&mut self) -> Result<Vec<IdRef>> {
        self.consume(TokenKind::LParen)?;
        let params = self.parse_list(TokenKind::RParen, TokenKind::Comma, None, |p| {
            let ty = p.parse_type()?;
            let (name, dims) = p.parse_declarator()?;
            let var = Var {
                ty: Some(ty),
                dims,
                init: None,
                is_param: true,
                value: None,
            };
            Ok(p.ast.new_id(Id::new(name.name, name.span, IdKind::Var(var))))
        })?;
        self.consume(TokenKind::RParen)?;
        Ok(params)
    }

    fn parse_struct(&mut self, blk: BlockId) -> Result<()> {
        self.consume(TokenKind::Struct)?;
        let name = self.parse_ident()?;
        self.consume(TokenKind::LBrace)?;
        let mut fields = Vec::new();
        while self.except([TokenKind::RBrace]) {
            let field = self.parse_var_decl(Modifiers::PRIVATE).and_then(|field| {
                self.consume(TokenKind::Semicolon)?;
                Ok(field)
            });
            match field {
                Ok(field) => fields.push(field),
                Err(()) => {
                    // Give up on the rest of the body.
                    self.skip_to(TokenKind::RBrace);
                    break;
                }
            }
        }
        self.consume(TokenKind::RBrace)?;
        let mut id = Id::new(name.name, name.span, IdKind::Struct(fields));
        id.up = self.container;
        let r = self.ast.new_id(id);
        self.ast.block_mut(blk).ids.push(r);
        Ok(())
    }

    fn parse_enum(&mut self, blk: BlockId) -> Result<()> {
        self.consume(TokenKind::Enum)?;
        let name = self.parse_ident()?;
        self.consume(TokenKind::LBrace)?;
        let elems = self.parse_list(TokenKind::RBrace, TokenKind::Comma, None, |p| {
            let elem = p.parse_ident()?;
            let init = if p.take(TokenKind::Assign) {
                Some(p.parse_expr()?)
            } else {
                None
            };
            let var = Var {
                init,
                ..Var::default()
            };
            Ok(p.ast.new_id(Id::new(elem.name, elem.span, IdKind::Var(var))))
        });
        let elems = match elems {
            Ok(elems) => elems,
            Err(()) => {
                self.skip_to(TokenKind::RBrace);
                Vec::new()
            }
        };
        self.consume(TokenKind::RBrace)?;
        let mut id = Id::new(name.name, name.span, IdKind::Enum(elems));
        id.up = self.container;
        let r = self.ast.new_id(id);
        self.ast.block_mut(blk).ids.push(r);
        Ok(())
    }

    /// Parses `type declarator (',' declarator)* ['=' exp]`.
    fn parse_var_decl(&mut self, mods: Modifiers) -> Result<IdRef> {
        let ty = self.parse_type()?;
        let mut declarators = vec![self.parse_declarator()?];
        while self.take(TokenKind::Comma) {
            declarators.push(self.parse_declarator()?);
        }
        let init = if self.take(TokenKind::Assign) {
            Some(self.parse_expr_list()?)
        } else {
            None
        };

        if declarators.len() == 1 {
            let (name, dims) = declarators.remove(0);
            let var = Var {
                ty: Some(ty),
                dims,
                init,
                ..Var::default()
            };
            let mut id = Id::new(name.name, name.span, IdKind::Var(var));
            id.mods = mods;
            id.up = self.container;
            return Ok(self.ast.new_id(id));
        }

        let span = declarators[0].0.span.to(self.last);
        let elems = declarators
            .into_iter()
            .map(|(name, dims)| {
                let var = Var {
                    dims,
                    ..Var::default()
                };
                let mut id = Id::new(name.name, name.span, IdKind::Var(var));
                id.mods = mods;
                id.up = self.container;
                self.ast.new_id(id)
            })
            .collect();
        let tuple = Tuple {
            elems,
            ty: Some(ty),
            init,
        };
        let name = self.ident_interner.intern("<tuple>");
        let mut id = Id::new(name, span, IdKind::Tuple(tuple));
        id.mods = mods;
        id.up = self.container;
        Ok(self.ast.new_id(id))
    }

    fn parse_declarator(&mut self) -> Result<(Ident, Vec<Option<Expr>>)> {
        let name = self.parse_ident()?;
        let mut dims = Vec::new();
        while self.take(TokenKind::LBracket) {
            if self.take(TokenKind::RBracket) {
                dims.push(None);
            } else {
                dims.push(Some(self.parse_expr()?));
                self.consume(TokenKind::RBracket)?;
            }
        }
        Ok((name, dims))
    }

    fn parse_type(&mut self) -> Result<Expr> {
        let token = self.peek();
        let prim = match token.kind {
            TokenKind::Account => Some(Type::Account),
            TokenKind::Bool => Some(Type::Bool),
            TokenKind::Byte => Some(Type::Byte),
            TokenKind::Double => Some(Type::Double),
            TokenKind::Float => Some(Type::Float),
            TokenKind::Int | TokenKind::Int32 => Some(Type::Int32),
            TokenKind::Int8 => Some(Type::Int8),
            TokenKind::Int16 => Some(Type::Int16),
            TokenKind::Int64 => Some(Type::Int64),
            TokenKind::String => Some(Type::String),
            TokenKind::Uint | TokenKind::Uint32 => Some(Type::UInt32),
            TokenKind::Uint8 => Some(Type::UInt8),
            TokenKind::Uint16 => Some(Type::UInt16),
            TokenKind::Uint64 => Some(Type::UInt64),
            _ => None,
        };
        if let Some(prim) = prim {
            self.advance();
            return Ok(Expr::new(ExprKind::Type(TypeName::Prim(prim)), token.span()));
        }
        match token.kind {
            TokenKind::Map => {
                self.advance();
                self.consume(TokenKind::LParen)?;
                let key = self.parse_type()?;
                self.consume(TokenKind::Comma)?;
                let value = self.parse_type()?;
                self.consume(TokenKind::RParen)?;
                let name = TypeName::Map {
                    key: Box::new(key),
                    value: Box::new(value),
                };
                Ok(Expr::new(ExprKind::Type(name), token.span().to(self.last)))
            }
            TokenKind::Identifier => {
                let ident = self.parse_ident()?;
                Ok(Expr::new(ExprKind::Type(TypeName::Named(ident)), ident.span))
            }
            kind => {
                self.error(token.span().wrap(Error::ExpectedType { actual: kind }));
                Err(())
            }
        }
    }

    fn parse_ident(&mut self) -> Result<Ident> {
        let token = self.consume(TokenKind::Identifier)?;
        let ident = Ident {
            name: self.ident_interner.intern(extract::ident(token, self.src)),
            span: token.span(),
        };
        Ok(ident)
    }
}

/// Statements.
impl Parser<'_, '_, '_> {
    fn parse_block(&mut self, kind: BlockKind) -> Result<BlockId> {
        let start = self.consume(TokenKind::LBrace)?;
        let blk = self.ast.new_block(kind, start.span());
        let stmts = self.parse_stmts();
        self.consume(TokenKind::RBrace)?;
        let block = self.ast.block_mut(blk);
        block.stmts = stmts;
        block.span = start.span().to(self.last);
        Ok(blk)
    }

    /// Parses statements until the closing brace. Errors are recovered at
    /// statement boundaries.
    fn parse_stmts(&mut self) -> Vec<Stmt> {
        let mut stmts = Vec::new();
        while self.except([TokenKind::RBrace]) {
            match self.parse_stmt() {
                Ok(stmt) => stmts.push(stmt),
                Err(()) => self.recover(),
            }
        }
        stmts
    }

    fn parse_stmt(&mut self) -> Result<Stmt> {
        let start = self.peek();
        let kind = match start.kind {
            TokenKind::Semicolon => {
                self.advance();
                StmtKind::Null
            }
            TokenKind::LBrace => StmtKind::Block(self.parse_block(BlockKind::Normal)?),
            TokenKind::If => self.parse_if()?,
            TokenKind::For => self.parse_for()?,
            TokenKind::Switch => self.parse_switch()?,
            TokenKind::Case => {
                self.advance();
                let val = self.parse_expr()?;
                self.consume(TokenKind::Colon)?;
                StmtKind::Case(Some(val))
            }
            TokenKind::Default => {
                self.advance();
                self.consume(TokenKind::Colon)?;
                StmtKind::Case(None)
            }
            TokenKind::Return => {
                self.advance();
                let val = if self.is(TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr_list()?)
                };
                self.consume(TokenKind::Semicolon)?;
                StmtKind::Return(val)
            }
            TokenKind::Continue => {
                self.advance();
                self.consume(TokenKind::Semicolon)?;
                StmtKind::Continue
            }
            TokenKind::Break => {
                self.advance();
                self.consume(TokenKind::Semicolon)?;
                StmtKind::Break(None)
            }
            TokenKind::Goto => {
                self.advance();
                let target = self.parse_ident()?;
                self.consume(TokenKind::Semicolon)?;
                StmtKind::Goto {
                    target,
                    label: None,
                }
            }
            TokenKind::Create | TokenKind::Drop => self.parse_ddl()?,
            TokenKind::Assert => self.parse_assert()?,
            TokenKind::Identifier if self.peek_ahead(1).kind == TokenKind::Colon => {
                let name = self.parse_ident()?;
                self.consume(TokenKind::Colon)?;
                let label = self.ast.new_id(Id::new(name.name, name.span, IdKind::Label));
                let mut stmt = if self.is(TokenKind::RBrace) {
                    Stmt::null(name.span)
                } else {
                    self.parse_stmt()?
                };
                stmt.label = Some(label);
                stmt.span = name.span.to(stmt.span);
                return Ok(stmt);
            }
            _ if self.is_decl_start() => {
                let mods = self.parse_modifiers()?;
                let var = self.parse_var_decl(mods)?;
                self.consume(TokenKind::Semicolon)?;
                StmtKind::Decl(var)
            }
            _ => {
                let kind = self.parse_simple_stmt()?;
                self.consume(TokenKind::Semicolon)?;
                kind
            }
        };
        Ok(Stmt::new(kind, start.span().to(self.last)))
    }

    /// Whether the current token starts a local declaration.
    fn is_decl_start(&self) -> bool {
        let c = self.peek().kind;
        c.is_primitive_type()
            || matches!(c, TokenKind::Map | TokenKind::Const | TokenKind::Readonly)
            || (c == TokenKind::Identifier && self.peek_ahead(1).kind == TokenKind::Identifier)
    }

    /// Parses an expression statement or an assignment, without the trailing
    /// semicolon.
    fn parse_simple_stmt(&mut self) -> Result<StmtKind> {
        let lhs = self.parse_expr_list()?;
        let op = match self.peek().kind {
            TokenKind::Assign => None,
            TokenKind::PlusEq => Some(BinaryOp::Add),
            TokenKind::MinusEq => Some(BinaryOp::Sub),
            TokenKind::StarEq => Some(BinaryOp::Mul),
            TokenKind::SlashEq => Some(BinaryOp::Div),
            TokenKind::PercentEq => Some(BinaryOp::Mod),
            TokenKind::AmpEq => Some(BinaryOp::BitAnd),
            TokenKind::PipeEq => Some(BinaryOp::BitOr),
            TokenKind::CaretEq => Some(BinaryOp::BitXor),
            TokenKind::ShlEq => Some(BinaryOp::Shl),
            TokenKind::ShrEq => Some(BinaryOp::Shr),
            _ => return Ok(StmtKind::Exp(lhs)),
        };
        self.advance();
        let rhs = self.parse_expr_list()?;
        let rhs = match op {
            None => rhs,
            Some(op) => {
                let span = lhs.span.to(rhs.span);
                let binary = ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs.clone()),
                    rhs: Box::new(rhs),
                };
                Expr::new(binary, span)
            }
        };
        Ok(StmtKind::Assign { lhs, rhs })
    }

    fn parse_if(&mut self) -> Result<StmtKind> {
        self.consume(TokenKind::If)?;
        let cond = self.parse_paren_cond()?;
        let then = self.parse_block(BlockKind::Normal)?;
        let mut elifs = Vec::new();
        let mut els = None;
        while self.take(TokenKind::Else) {
            if self.is(TokenKind::If) {
                let start = self.advance();
                let cond = self.parse_paren_cond()?;
                let blk = self.parse_block(BlockKind::Normal)?;
                let span = start.span().to(self.last);
                elifs.push(ElseIf { cond, blk, span });
            } else {
                els = Some(self.parse_block(BlockKind::Normal)?);
                break;
            }
        }
        Ok(StmtKind::If(If {
            cond,
            then,
            elifs,
            els,
        }))
    }

    fn parse_paren_cond(&mut self) -> Result<Expr> {
        self.consume(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.consume(TokenKind::RParen)?;
        Ok(cond)
    }

    /// Parses the `for` forms:
    ///
    /// - `for { ... }`
    /// - `for (cond) { ... }`
    /// - `for (init; [cond]; [inc]) { ... }`
    /// - `for (elem in exp) { ... }`
    fn parse_for(&mut self) -> Result<StmtKind> {
        self.consume(TokenKind::For)?;
        let mut header = ForHeader::default();
        if self.take(TokenKind::LParen) && self.parse_for_header(&mut header).is_err() {
            // Keep the loop body, dropping the malformed header.
            self.skip_past(TokenKind::RParen);
            header = ForHeader::default();
        }
        let blk = self.parse_block(BlockKind::Loop)?;
        Ok(StmtKind::Loop(Loop {
            init: header.init,
            cond: header.cond,
            inc: header.inc,
            blk,
            is_array: header.is_array,
            has_inc: false,
        }))
    }

    fn parse_for_header(&mut self, header: &mut ForHeader) -> Result<()> {
        let start = self.peek();
        let init = if self.take(TokenKind::Semicolon) {
            None
        } else if self.is_decl_start() {
            let var = self.parse_var_decl(Modifiers::PRIVATE)?;
            Some(StmtKind::Decl(var))
        } else {
            match self.parse_simple_stmt()? {
                StmtKind::Exp(cond) if self.take(TokenKind::RParen) => {
                    header.cond = Some(cond);
                    return Ok(());
                }
                kind => Some(kind),
            }
        };
        let init = init.map(|kind| Box::new(Stmt::new(kind, start.span().to(self.last))));

        if self.take(TokenKind::In) {
            header.init = init;
            header.cond = Some(self.parse_expr()?);
            header.is_array = true;
            self.consume(TokenKind::RParen)?;
            return Ok(());
        }

        if init.is_some() {
            self.consume(TokenKind::Semicolon)?;
        }
        header.init = init;
        if !self.is(TokenKind::Semicolon) {
            header.cond = Some(self.parse_expr()?);
        }
        self.consume(TokenKind::Semicolon)?;
        if !self.is(TokenKind::RParen) {
            header.inc = Some(self.parse_expr()?);
        }
        self.consume(TokenKind::RParen)?;
        Ok(())
    }

    fn parse_switch(&mut self) -> Result<StmtKind> {
        self.consume(TokenKind::Switch)?;
        let subject = if self.is(TokenKind::LParen) {
            Some(self.parse_paren_cond()?)
        } else {
            None
        };
        let blk = self.parse_block(BlockKind::Switch)?;
        Ok(StmtKind::Switch(Switch { subject, blk }))
    }

    /// Captures an embedded DDL statement as raw text, up to the semicolon.
    fn parse_ddl(&mut self) -> Result<StmtKind> {
        let start = self.advance();
        while self.except([TokenKind::Semicolon, TokenKind::RBrace]) {
            self.advance();
        }
        let text = Span::new_of_bounds(start.span().lo..self.last.hi()).substr(self.src);
        let text = Box::from(text);
        if !self.take(TokenKind::Semicolon) {
            let c = self.peek();
            self.error(c.span().wrap(Error::UnterminatedSql));
            return Err(());
        }
        Ok(StmtKind::Ddl(text))
    }

    fn parse_assert(&mut self) -> Result<StmtKind> {
        self.consume(TokenKind::Assert)?;
        self.consume(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        let text = Box::from(cond.span.substr(self.src));
        let desc = if self.take(TokenKind::Comma) {
            let token = self.consume(TokenKind::StrLit)?;
            Some(Box::from(extract::string(token, self.src)))
        } else {
            None
        };
        self.consume(TokenKind::RParen)?;
        self.consume(TokenKind::Semicolon)?;
        Ok(StmtKind::Pragma(Pragma::Assert { cond, text, desc }))
    }
}

/// Expressions.
impl Parser<'_, '_, '_> {
    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_expr_bp(0)
    }

    /// Parses `exp (',' exp)*`, producing a tuple if there is more than one.
    fn parse_expr_list(&mut self) -> Result<Expr> {
        let first = self.parse_expr()?;
        if !self.is(TokenKind::Comma) {
            return Ok(first);
        }
        let mut elems = vec![first];
        while self.take(TokenKind::Comma) {
            elems.push(self.parse_expr()?);
        }
        let span = elems[0].span.to(self.last);
        Ok(Expr::new(ExprKind::Tuple(elems), span))
    }

    fn parse_expr_bp(&mut self, min_bp: u8) -> Result<Expr> {
        let lhs_token = self.peek();
        // Terminators are left in place for statement recovery.
        if matches!(
            lhs_token.kind,
            TokenKind::Semicolon | TokenKind::RBrace | TokenKind::RParen | TokenKind::Eof
        ) {
            let error = Error::UnexpectedTokenInExpr {
                token: lhs_token.kind,
            };
            self.error(lhs_token.span().wrap(error));
            return Err(());
        }
        self.advance();
        let mut lhs = self.parse_nud(lhs_token)?;

        loop {
            let op_token = self.peek();
            if let Some((lbp, rbp)) = Self::infix_binding_power(op_token.kind) {
                if lbp < min_bp {
                    break;
                }
                self.advance();
                lhs = self.parse_led(op_token, lhs, rbp)?;
            } else {
                break;
            }
        }

        Ok(lhs)
    }

    /// nud: Parses tokens that start an expression
    /// (prefix operators, literals, grouping)
    fn parse_nud(&mut self, token: Token) -> Result<Expr> {
        let span = token.span();
        let expr = match token.kind {
            TokenKind::Identifier => {
                let ident = Ident {
                    name: self.ident_interner.intern(extract::ident(token, self.src)),
                    span,
                };
                Expr::new(ExprKind::Id(ident), span)
            }
            TokenKind::DecLit | TokenKind::OctLit | TokenKind::HexLit => {
                let Ok(parsed) = extract::int(token, self.src) else {
                    self.error(span.wrap(Error::ParseInt));
                    return Err(());
                };
                Expr::lit(Value::Int(parsed), span)
            }
            TokenKind::FloatLit => {
                let Ok(parsed) = extract::float(token, self.src) else {
                    self.error(span.wrap(Error::ParseFloat));
                    return Err(());
                };
                Expr::lit(Value::Float(parsed), span)
            }
            TokenKind::StrLit => {
                let raw = extract::string(token, self.src);
                Expr::lit(Value::Str(Box::from(raw)), span)
            }
            TokenKind::True => Expr::lit(Value::Bool(true), span),
            TokenKind::False => Expr::lit(Value::Bool(false), span),
            TokenKind::Null => Expr::lit(Value::Null, span),

            TokenKind::LParen if self.is_cast() => {
                let ty = self.parse_type()?;
                self.consume(TokenKind::RParen)?;
                let val = self.parse_expr_bp(Self::PREFIX_BP)?;
                let span = span.to(val.span);
                let cast = ExprKind::Cast {
                    ty: Box::new(ty),
                    val: Box::new(val),
                };
                Expr::new(cast, span)
            }
            TokenKind::LParen => {
                let mut expr = self.parse_expr_list()?;
                let end = self.consume(TokenKind::RParen)?;
                if matches!(expr.kind, ExprKind::Tuple(_)) {
                    expr.span = span.to(end.span());
                }
                expr
            }
            TokenKind::LBrace => {
                let elems =
                    self.parse_list(TokenKind::RBrace, TokenKind::Comma, None, Parser::parse_expr)?;
                let end = self.consume(TokenKind::RBrace)?;
                Expr::new(ExprKind::Init(elems), span.to(end.span()))
            }
            TokenKind::New => self.parse_new(token)?,
            TokenKind::Select | TokenKind::Insert | TokenKind::Update | TokenKind::Delete => {
                self.parse_sql(token)?
            }

            kind @ (TokenKind::Bang
            | TokenKind::Minus
            | TokenKind::Tilde
            | TokenKind::PlusPlus
            | TokenKind::MinusMinus) => {
                let op = match kind {
                    TokenKind::Bang => UnaryOp::Not,
                    TokenKind::Minus => UnaryOp::Neg,
                    TokenKind::Tilde => UnaryOp::BitNot,
                    TokenKind::PlusPlus => UnaryOp::PreInc,
                    _ => UnaryOp::PreDec,
                };
                let val = self.parse_expr_bp(Self::PREFIX_BP)?;
                let span = span.to(val.span);
                let unary = ExprKind::Unary {
                    op,
                    val: Box::new(val),
                };
                Expr::new(unary, span)
            }

            kind if kind.is_error() => {
                self.error(span.wrap(Error::Lexer(kind)));
                return Err(());
            }
            kind => {
                self.error(span.wrap(Error::UnexpectedTokenInExpr { token: kind }));
                return Err(());
            }
        };
        Ok(expr)
    }

    /// led: Parses tokens that follow a left-hand-side expression
    /// (infix/postfix operators)
    fn parse_led(&mut self, op_token: Token, lhs: Expr, rbp: u8) -> Result<Expr> {
        let expr = match op_token.kind {
            TokenKind::Question => {
                let then = self.parse_expr()?;
                self.consume(TokenKind::Colon)?;
                let els = self.parse_expr_bp(rbp)?;
                let span = lhs.span.to(els.span);
                let ternary = ExprKind::Ternary {
                    cond: Box::new(lhs),
                    then: Box::new(then),
                    els: Box::new(els),
                };
                Expr::new(ternary, span)
            }
            TokenKind::LBracket => {
                let index = self.parse_expr()?;
                let end = self.consume(TokenKind::RBracket)?;
                let span = lhs.span.to(end.span());
                let array = ExprKind::Array {
                    base: Box::new(lhs),
                    index: Box::new(index),
                };
                Expr::new(array, span)
            }
            TokenKind::LParen => {
                let args =
                    self.parse_list(TokenKind::RParen, TokenKind::Comma, None, Parser::parse_expr)?;
                let end = self.consume(TokenKind::RParen)?;
                let span = lhs.span.to(end.span());
                let call = ExprKind::Call {
                    callee: Box::new(lhs),
                    args,
                    kind: CallKind::Udf,
                };
                Expr::new(call, span)
            }
            TokenKind::Dot => {
                let field = self.parse_ident()?;
                let span = lhs.span.to(field.span);
                let access = ExprKind::Access {
                    qual: Box::new(lhs),
                    field,
                };
                Expr::new(access, span)
            }
            kind @ (TokenKind::PlusPlus | TokenKind::MinusMinus) => {
                let op = if kind == TokenKind::PlusPlus {
                    UnaryOp::PostInc
                } else {
                    UnaryOp::PostDec
                };
                let span = lhs.span.to(op_token.span());
                let unary = ExprKind::Unary {
                    op,
                    val: Box::new(lhs),
                };
                Expr::new(unary, span)
            }
            kind => {
                let Some(op) = Self::binary_op(kind) else {
                    self.error(op_token.span().wrap(Error::UnexpectedOperator { actual: kind }));
                    return Err(());
                };
                let rhs = self.parse_expr_bp(rbp)?;
                let span = lhs.span.to(rhs.span);
                let binary = ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                };
                Expr::new(binary, span)
            }
        };
        Ok(expr)
    }

    /// Parses `new T`, `new T[n]...` or `new C(args)`.
    fn parse_new(&mut self, token: Token) -> Result<Expr> {
        if self.is(TokenKind::Identifier) && self.peek_ahead(1).kind == TokenKind::LParen {
            let ident = self.parse_ident()?;
            self.consume(TokenKind::LParen)?;
            let args =
                self.parse_list(TokenKind::RParen, TokenKind::Comma, None, Parser::parse_expr)?;
            let end = self.consume(TokenKind::RParen)?;
            let call = ExprKind::Call {
                callee: Box::new(Expr::new(ExprKind::Id(ident), ident.span)),
                args,
                kind: CallKind::Ctor,
            };
            return Ok(Expr::new(call, token.span().to(end.span())));
        }
        let ty = self.parse_type()?;
        let mut dims = Vec::new();
        while self.take(TokenKind::LBracket) {
            dims.push(self.parse_expr()?);
            self.consume(TokenKind::RBracket)?;
        }
        let alloc = ExprKind::Alloc {
            ty: Box::new(ty),
            dims,
        };
        Ok(Expr::new(alloc, token.span().to(self.last)))
    }

    /// Captures an embedded SQL expression as raw text. It ends before the
    /// statement terminator or an unbalanced closing parenthesis.
    fn parse_sql(&mut self, token: Token) -> Result<Expr> {
        let kind = match token.kind {
            TokenKind::Select => SqlKind::Query,
            TokenKind::Insert => SqlKind::Insert,
            TokenKind::Update => SqlKind::Update,
            _ => SqlKind::Delete,
        };
        let mut depth = 0_u32;
        loop {
            match self.peek().kind {
                TokenKind::Semicolon if depth == 0 => break,
                TokenKind::RParen if depth == 0 => break,
                TokenKind::RParen => depth -= 1,
                TokenKind::LParen => depth += 1,
                TokenKind::Eof => {
                    let c = self.peek();
                    self.error(c.span().wrap(Error::UnterminatedSql));
                    return Err(());
                }
                _ => (),
            }
            self.advance();
        }
        let span = token.span().to(self.last);
        let sql = ExprKind::Sql {
            kind,
            text: Box::from(span.substr(self.src)),
        };
        Ok(Expr::new(sql, span))
    }

    /// Whether the parser is past the `(` of a cast such as `(int64) x`.
    fn is_cast(&self) -> bool {
        let c = self.peek().kind;
        (c.is_primitive_type() && self.peek_ahead(1).kind == TokenKind::RParen)
            || c == TokenKind::Map
    }

    const PREFIX_BP: u8 = 25;

    fn infix_binding_power(kind: TokenKind) -> Option<(u8, u8)> {
        use TokenKind::*;
        let bp = match kind {
            // Right-associative.
            Question => (4, 3),
            OrOr => (5, 6),
            AndAnd => (7, 8),
            Pipe => (9, 10),
            Caret => (11, 12),
            Amp => (13, 14),
            EqEq | NotEq => (15, 16),
            Less | Greater | LessEq | GreaterEq => (17, 18),
            Shl | Shr => (19, 20),
            Plus | Minus => (21, 22),
            Star | Slash | Percent => (23, 24),
            // Postfix.
            LBracket | LParen | Dot | PlusPlus | MinusMinus => (27, 28),
            _ => return None,
        };
        Some(bp)
    }

    fn binary_op(kind: TokenKind) -> Option<BinaryOp> {
        use TokenKind::*;
        let op = match kind {
            OrOr => BinaryOp::Or,
            AndAnd => BinaryOp::And,
            Pipe => BinaryOp::BitOr,
            Caret => BinaryOp::BitXor,
            Amp => BinaryOp::BitAnd,
            EqEq => BinaryOp::Eq,
            NotEq => BinaryOp::Ne,
            Less => BinaryOp::Lt,
            Greater => BinaryOp::Gt,
            LessEq => BinaryOp::Le,
            GreaterEq => BinaryOp::Ge,
            Shl => BinaryOp::Shl,
            Shr => BinaryOp::Shr,
            Plus => BinaryOp::Add,
            Minus => BinaryOp::Sub,
            Star => BinaryOp::Mul,
            Slash => BinaryOp::Div,
            Percent => BinaryOp::Mod,
            _ => return None,
        };
        Some(op)
    }

    /// Parses `item (delim item)*` until `end_delim` is found. Does **NOT**
    /// consume the end delimiter.
    fn parse_list<T>(
        &mut self,
        end_delim: TokenKind,
        separator: TokenKind,
        require_one: Option<Error>,
        parse_item: impl Fn(&mut Self) -> Result<T>,
    ) -> Result<Vec<T>> {
        debug_assert_ne!(end_delim, separator);

        let mut items = Vec::new();
        while self.except([end_delim]) {
            let item = self.synchronize(&[separator], &[end_delim], |p| parse_item(p))?;
            items.push(item);

            if !self.take(separator) {
                if self.is(end_delim) {
                    break;
                }
                let c = self.peek();
                self.error(c.span().wrap(Error::UnexpectedAny {
                    actual: c.kind,
                    expected: Box::from([separator, end_delim]),
                }));
                return Err(());
            }
        }

        if let Some(error) = require_one {
            if items.is_empty() {
                let next = self.peek();
                self.error(next.span().wrap(error));
                return Err(());
            }
        }

        Ok(items)
    }
}

impl Parser<'_, '_, '_> {
    pub fn new<'src, 'tok, 'ident>(
        src: &'src str,
        tokens: &'tok mut Vec<Token>,
        ident_interner: &'ident mut Interner<str>,
    ) -> Parser<'src, 'tok, 'ident> {
        let mut p = Parser {
            src,
            tokens,
            ident_interner,
            cursor: 0,
            last: Span::default(),
            errors: Vec::with_capacity(8),
            ast: Ast::new(),
            container: None,
        };
        p.setup();
        p
    }

    fn error(&mut self, error: Spanned<Error>) {
        self.errors.push(error);
    }

    /// Setups the parser, skipping any trivia if necessary.
    fn setup(&mut self) {
        while self.peek().kind.is_trivia() {
            self.cursor += 1;
        }
    }

    fn in_container<T>(&mut self, container: IdRef, f: impl FnOnce(&mut Self) -> T) -> T {
        let prev = self.container.replace(container);
        let result = f(self);
        self.container = prev;
        result
    }

    /// Returns the current token.
    #[inline]
    fn peek(&self) -> Token {
        match self.tokens.get(self.cursor) {
            Some(token) => *token,
            None => self.eof(),
        }
    }

    /// Returns the `n`-th non-trivia token after the current one.
    fn peek_ahead(&self, n: usize) -> Token {
        self.tokens
            .get(self.cursor..)
            .unwrap_or_default()
            .iter()
            .filter(|t| !t.kind.is_trivia())
            .nth(n)
            .copied()
            .unwrap_or_else(|| self.eof())
    }

    fn eof(&self) -> Token {
        let span = Span::new_of_length(self.src.len(), 0);
        match self.tokens.last() {
            Some(last) => *last,
            None => Token::new(TokenKind::Eof, span, Pos::START),
        }
    }

    /// Returns the current token and advances. Skips any trivia.
    fn advance(&mut self) -> Token {
        let c = self.peek();
        if c.kind != TokenKind::Eof {
            self.last = c.span();
        }
        while {
            self.cursor += 1;
            self.peek().kind.is_trivia()
        } {}
        c
    }

    /// Checks whether the current token matches the given one.
    fn is(&self, expect: TokenKind) -> bool {
        self.peek().kind == expect
    }

    /// Advances if the current token matches the provided one, returning true.
    /// If not, returns false and doesn't advance.
    fn take(&mut self, expect: TokenKind) -> bool {
        if self.is(expect) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Advances if the current token matches the provided one. If not,
    /// records an error.
    fn consume(&mut self, expect: TokenKind) -> Result<Token> {
        let c = self.peek();
        if self.is(expect) {
            self.advance();
            Ok(c)
        } else {
            let error = if c.kind.is_error() {
                Error::Lexer(c.kind)
            } else {
                Error::Unexpected {
                    actual: c.kind,
                    expected: expect,
                }
            };
            self.error(c.span().wrap(error));
            Err(())
        }
    }

    /// Returns true while the current token does *not* match one of the
    /// provided ones. [`TokenKind::Eof`] is implicitly included in the list.
    ///
    /// This won't advance the cursor.
    fn except(&mut self, except: impl IntoIterator<Item = TokenKind>) -> bool {
        let c = self.peek();
        for e in except {
            if c.kind == e {
                return false;
            }
        }
        c.kind != TokenKind::Eof
    }

    /// Skips tokens until `kind` (not consumed) or the end of the input.
    fn skip_to(&mut self, kind: TokenKind) {
        while self.except([kind]) {
            self.advance();
        }
    }

    /// Skips tokens until `kind` and consumes it, if found.
    fn skip_past(&mut self, kind: TokenKind) {
        self.skip_to(kind);
        self.take(kind);
    }

    /// Skips the rest of a malformed statement or member: up to and
    /// including the next `;` at the same nesting level, or up to and
    /// including a `}` that closes a brace opened while skipping. Stops
    /// before a `}` that closes the enclosing block.
    fn recover(&mut self) {
        let mut depth = 0_u32;
        loop {
            match self.peek().kind {
                TokenKind::Eof => return,
                TokenKind::RBrace if depth == 0 => return,
                TokenKind::RBrace => {
                    self.advance();
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                TokenKind::LBrace => {
                    self.advance();
                    depth += 1;
                }
                TokenKind::Semicolon if depth == 0 => {
                    self.advance();
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn synchronize<T>(
        &mut self,
        cont_cond: &[TokenKind],
        stop_cond: &[TokenKind],
        mut f: impl FnMut(&mut Self) -> Result<T>,
    ) -> Result<T> {
        'outer: loop {
            if let Ok(val) = f(self) {
                break Ok(val);
            }
            // In the case of an error, try to advance until find a token
            // specified in `cont_cond` (in which case we retry) or in
            // `stop_cond` (in which case we stop).
            loop {
                let c = self.peek().kind;
                if c == TokenKind::Eof || stop_cond.contains(&c) {
                    break 'outer Err(());
                }
                // The token advancement must be AFTER stopping. If we break
                // out, the caller should advance (to follow the convention).
                self.advance();
                if cont_cond.contains(&c) {
                    continue 'outer;
                }
            }
        }
    }
}

#[derive(Default)]
struct ForHeader {
    init: Option<Box<Stmt>>,
    cond: Option<Expr>,
    inc: Option<Expr>,
    is_array: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    UnexpectedTokenInExpr {
        token: TokenKind,
    },
    Unexpected {
        actual: TokenKind,
        expected: TokenKind,
    },
    UnexpectedAny {
        actual: TokenKind,
        expected: Box<[TokenKind]>,
    },
    UnexpectedOperator {
        actual: TokenKind,
    },
    ExpectedType {
        actual: TokenKind,
    },
    MultipleReturns,
    UnterminatedSql,
    ParseInt,
    ParseFloat,
    /// A token kind which holds the [`TokenKind::is_error`] property.
    Lexer(TokenKind),
}

#[cfg(test)]
mod tests {
    use crate::util::test_utils::tree_tests;

    tree_tests!(
        use parser;

        fn synthesized_ctor() {
            let program = r#"
                contract A {
                    int x = 1;
                    public func get() int {
                        return x;
                    }
                }
            "#;
            let tree_ok = r#"
                contract A
                  func A [public ctor]
                  var x: int32
                    lit 1
                  func get [public]
                    returns int32
                    return
                      id x
            "#;
        }

        fn declarations() {
            let program = r#"
                contract B implements I {
                    struct P { int32 a; string b; }
                    enum E { X, Y = 3 }
                    map(string, uint64) m;
                    int a, b = 1, 2;
                    func f(int n, int arr[]) {}
                    B(int n) {}
                }
            "#;
            let tree_ok = r#"
                contract B implements I
                  func B [public ctor]
                    param n: int32
                  struct P
                    var a: int32
                    var b: string
                  enum E
                    var X
                    var Y
                      lit 3
                  var m: map(string, uint64)
                  vars a, b: int32
                    tuple
                      lit 1
                      lit 2
                  func f
                    param n: int32
                    param arr: int32[]
            "#;
        }

        fn statements() {
            let program = r#"
                contract C {
                    func f(int n) int {
                        int i = 0;
                        for (i = 0; i < n; i++) {
                            if (i == 2) { continue; } else if (i > 5) { break; } else { i += 2; }
                        }
                        switch (n) {
                        case 1:
                            n = 2;
                            break;
                        default:
                            goto end;
                        }
                        end: return n;
                    }
                }
            "#;
            let tree_ok = r#"
                contract C
                  func C [public ctor]
                  func f
                    param n: int32
                    returns int32
                    var i: int32
                      lit 0
                    loop
                      init
                        assign
                          id i
                          lit 0
                      cond
                        binary <
                          id i
                          id n
                      inc
                        postfix ++
                          id i
                      body
                        if
                          binary ==
                            id i
                            lit 2
                        then
                          continue
                        else if
                          binary >
                            id i
                            lit 5
                        then
                          break
                        else
                          assign
                            id i
                            binary +
                              id i
                              lit 2
                    switch
                      id n
                      body
                        case
                          lit 1
                        assign
                          id n
                          lit 2
                        break
                        default
                        goto end
                    end:
                    return
                      id n
            "#;
        }

        fn embedded_sql_and_pragmas() {
            let program = r#"
                contract D {
                    func f() {
                        create table t (a int, b string);
                        int n = select count(*) from t;
                        assert(n > 0, "positive");
                    }
                }
            "#;
            let tree_ok = r#"
                contract D
                  func D [public ctor]
                  func f
                    ddl "create table t (a int, b string)"
                    var n: int32
                      sql Query "select count(*) from t"
                    assert "n > 0" "positive"
                      binary >
                        id n
                        lit 0
            "#;
        }

        fn statement_recovery() {
            let program = "contract E { func f() { int x = ; x = 1; } }";
            let tree_error = r#"
                contract E
                  func E [public ctor]
                  func f
                    assign
                      id x
                      lit 1
            "#;
            let expected_errors = &["32..33: unexpected token `;` in expression"];
        }

        fn errors_are_reported_in_one_pass() {
            let program = "contract M { func f() { int x = ; } func g() { y = ; } }";
            let expected_errors = &[
                "32..33: unexpected token `;` in expression",
                "51..52: unexpected token `;` in expression",
            ];
        }

        fn contract_declarator_recovery() {
            let program = "contract 1 { int x; } contract F { }";
            let tree_error = r#"
                contract <error>
                  func <error> [public ctor]
                  var x: int32
                contract F
                  func F [public ctor]
            "#;
            let expected_errors = &["9..10: expected identifier, but got integer"];
        }

        fn struct_body_recovery() {
            let program = "struct S { int a; b; int c; } contract G { }";
            let tree_error = r#"
                struct S
                  var a: int32
                contract G
                  func G [public ctor]
            "#;
            let expected_errors = &["19..20: expected identifier, but got `;`"];
        }

        fn for_header_recovery() {
            let program = "contract H { func f() { for (int i = 0; i < ; i++) { i = 1; } } }";
            let tree_error = r#"
                contract H
                  func H [public ctor]
                  func f
                    loop
                      body
                        assign
                          id i
                          lit 1
            "#;
            let expected_errors = &["44..45: unexpected token `;` in expression"];
        }

        fn ddl_recovery() {
            let program = "contract K { func f() { drop table t } int y; }";
            let tree_error = r#"
                contract K
                  func K [public ctor]
                  func f
                  var y: int32
            "#;
            let expected_errors = &["37..38: unterminated SQL statement"];
        }

        fn lexer_errors_surface() {
            let program = "contract L { func f() { x = 1 $ 2; y = 3; } }";
            let tree_error = r#"
                contract L
                  func L [public ctor]
                  func f
                    assign
                      id y
                      lit 3
            "#;
            let expected_errors = &["30..31: unexpected character"];
        }
    );

    tree_tests!(
        use parser;

        fn precedence() {
            let expr = "a + b * c - -d";
            let tree_ok = r#"
                binary -
                  binary +
                    id a
                    binary *
                      id b
                      id c
                  unary -
                    id d
            "#;
        }

        fn ternary_is_right_associative() {
            let expr = "x ? y : z ? 1 : 2";
            let tree_ok = r#"
                ternary
                  id x
                  id y
                  ternary
                    id z
                    lit 1
                    lit 2
            "#;
        }

        fn postfix_chain() {
            let expr = "a.b[1](c, 2).d";
            let tree_ok = r#"
                access d
                  call
                    index
                      access b
                        id a
                      lit 1
                    id c
                    lit 2
            "#;
        }

        fn cast_and_alloc() {
            let expr = "(int64) x + new int32[3]";
            let tree_ok = r#"
                binary +
                  cast int64
                    id x
                  alloc int32
                    lit 3
            "#;
        }

        fn ctor_call_and_tuple() {
            let expr = "(new C(1), {1, 2})";
            let tree_ok = r#"
                tuple
                  new
                    id C
                    lit 1
                  init
                    lit 1
                    lit 2
            "#;
        }

        fn unexpected_token() {
            let expr = "1 + ]";
            let expected_errors = &["4..5: unexpected token `]` in expression"];
        }
    );
}
