//! A compiler for a statically typed smart-contract language.
//!
//! [`compile`] runs one compilation unit through every stage and returns the
//! lowered modules, ready for a [`backend::Backend`].

use tracing::{debug, instrument};

/// The lexer takes the source input, mapping it into a sequence of tokens.
pub mod lexer;

/// The parser takes a sequence of tokens, mapping it into an AST.
pub mod parser;

/// The checker resolves identifiers, checks the soundness of types and
/// normalizes the tree in place for the translator.
pub mod checker;

/// The translator lowers the checked tree into basic blocks.
pub mod trans;

pub mod ast;
pub mod backend;
pub mod diag;
pub mod ir;
pub mod meta;
pub mod options;
pub mod syslib;
pub mod token;

pub mod util {
    pub mod fmt;
    pub mod intern;
    pub mod logging;
    #[cfg(test)]
    pub(crate) mod test_utils;
}

use crate::{
    diag::{Diagnostics, Error, Fatal, Level},
    ir::Module,
    options::Options,
    token::Lines,
    util::{
        fmt::{tree, Context, Show},
        intern::Interner,
    },
};

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("compilation failed with {} error(s)", .errors)]
    Rejected {
        errors: usize,
        /// Every diagnostic, rendered with its position.
        messages: Vec<String>,
    },
    #[error(transparent)]
    Fatal(#[from] Fatal),
}

/// What one successful compilation unit produced.
#[derive(Debug)]
pub struct Compiled {
    pub idents: Interner<str>,
    pub modules: Vec<Module>,
    /// Warnings and lesser diagnostics, rendered with their position.
    pub messages: Vec<String>,
    pub tokens_dump: Option<String>,
    pub ast_dump: Option<String>,
}

/// Compiles one source file.
#[instrument(skip_all, fields(len = src.len()))]
pub fn compile(src: &str, options: &Options) -> Result<Compiled, CompileError> {
    let mut idents = Interner::with_capacity(1024);
    let mut diags = Diagnostics::new();
    let mut tokens = Vec::with_capacity(lexer::SUGGESTED_TOKENS_CAPACITY);

    let mut ast = match parser::parse_program(src, &mut tokens, &mut idents) {
        Ok(ast) => ast,
        Err((ast, errors)) => {
            for error in errors {
                diags.error(error.span, Error::Syntax(error.inner));
            }
            ast
        }
    };
    let tokens_dump = options
        .dump_tokens
        .then(|| tokens.iter().map(|token| format!("{token:?}\n")).collect());
    if diags.has_errors() {
        return Err(rejected(src, &idents, &diags));
    }

    checker::check(&mut ast, &mut idents, &mut diags)?;
    if diags.has_errors() {
        return Err(rejected(src, &idents, &diags));
    }
    let ast_dump = options
        .dump_ast
        .then(|| tree::print_program_string(&idents, &ast, true));

    let modules = trans::translate(&mut ast, &mut idents, &mut diags)?;
    if diags.has_errors() {
        return Err(rejected(src, &idents, &diags));
    }
    debug!(modules = modules.len(), warnings = diags.len(), "compiled");
    Ok(Compiled {
        messages: render(src, &idents, &diags),
        idents,
        modules,
        tokens_dump,
        ast_dump,
    })
}

fn rejected(src: &str, idents: &Interner<str>, diags: &Diagnostics) -> CompileError {
    CompileError::Rejected {
        errors: diags.iter().filter(|d| d.level <= Level::Error).count(),
        messages: render(src, idents, diags),
    }
}

/// Renders diagnostics as `line:col: level[CODE]: message`.
fn render(src: &str, idents: &Interner<str>, diags: &Diagnostics) -> Vec<String> {
    let lines = Lines::new(src);
    let ctx = Context {
        ident_interner: idents,
    };
    diags
        .iter()
        .map(|d| format!("{}: {}", lines.pos(d.span.lo), d.display(&ctx)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_a_contract() {
        let src = "contract A { int32 n; public func inc() int32 { n++; return n; } }";
        let compiled = compile(src, &Options::default()).unwrap();
        assert_eq!(compiled.modules.len(), 1);
        assert!(compiled.messages.is_empty(), "{:?}", compiled.messages);
        assert!(compiled.ast_dump.is_none());
    }

    #[test]
    fn errors_carry_positions() {
        let src = "contract A {\n  func f() int32 { return x; }\n}";
        let Err(CompileError::Rejected { errors, messages }) = compile(src, &Options::default())
        else {
            panic!("expected a rejection");
        };
        assert_eq!(errors, 1);
        assert_eq!(messages, ["2:27: error[UNDEFINED_ID]: x is not defined"]);
    }

    #[test]
    fn syntax_errors_stop_before_checking() {
        let src = "contract A { func f( }";
        let Err(CompileError::Rejected { messages, .. }) = compile(src, &Options::default()) else {
            panic!("expected a rejection");
        };
        assert!(messages.iter().all(|m| m.contains("error[SYNTAX]")), "{messages:?}");
    }

    #[test]
    fn dumps_are_opt_in() {
        let options = Options {
            dump_tokens: true,
            dump_ast: true,
            ..Options::default()
        };
        let compiled = compile("contract A {}", &options).unwrap();
        assert!(compiled.tokens_dump.is_some_and(|dump| dump.contains("Contract")));
        assert!(compiled.ast_dump.is_some_and(|dump| dump.contains("contract A")));
    }
}
