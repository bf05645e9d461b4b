use crate::{
    ast::Ast,
    backend::{text::TextBackend, Backend},
    checker,
    diag::Diagnostics,
    parser,
    token::Spanned,
    trans,
    util::{
        self,
        fmt::{tree, Show},
        intern::Interner,
    },
};

pub fn format_errors<E>(i: &Interner<str>, e: &[Spanned<E>]) -> Vec<String>
where
    Spanned<E>: Show,
{
    let ctx = util::fmt::Context { ident_interner: i };
    e.iter().map(|e| format!("{:#}", e.display(&ctx))).collect()
}

pub fn format_diagnostics(i: &Interner<str>, diags: &Diagnostics) -> Vec<String> {
    let ctx = util::fmt::Context { ident_interner: i };
    diags.iter().map(|d| format!("{}", d.display(&ctx))).collect()
}

/// Each variant contains the input.
pub enum Test {
    ParserProgram(&'static str),
    ParserExpr(&'static str),
    CheckerProgram(&'static str),
    TransProgram(&'static str),
}

pub enum Assertion {
    TreeOk(&'static str),
    TreeError(&'static str),
    ExpectedErrors(&'static [&'static str]),
}

/// Parses and checks `src`, returning the tree along with every formatted
/// syntax error and diagnostic.
pub fn check_program(
    src: &str,
    interner: &mut Interner<str>,
    diags: &mut Diagnostics,
) -> (Ast, Vec<String>) {
    let tokens_buf = &mut Vec::with_capacity(1024);
    let (mut ast, errors) = match parser::parse_program(src, tokens_buf, interner) {
        Ok(ast) => (ast, vec![]),
        Err((ast, errors)) => (ast, errors),
    };
    let mut fmt_errors = format_errors(interner, &errors);
    if let Err(fatal) = checker::check(&mut ast, interner, diags) {
        fmt_errors.push(fatal.to_string());
    }
    fmt_errors.extend(format_diagnostics(interner, diags));
    (ast, fmt_errors)
}

#[track_caller]
pub fn run_pipeline(test: Test) -> (String, Vec<String>) {
    let tokens_buf = &mut Vec::with_capacity(1024);
    let interner = &mut Interner::with_capacity(128);

    match test {
        Test::ParserProgram(input) => {
            let (ast, errors) = match parser::parse_program(input, tokens_buf, interner) {
                Ok(ast) => (ast, vec![]),
                Err((ast, errors)) => (ast, errors),
            };
            let tree = tree::print_program_string(interner, &ast, false);
            let errors = format_errors(interner, &errors);
            (tree, errors)
        }
        Test::ParserExpr(input) => {
            let (expr, errors) = match parser::parse_expr(input, tokens_buf, interner) {
                Ok(expr) => (expr, vec![]),
                Err((expr, errors)) => (expr, errors),
            };
            let tree = tree::print_expr_string(interner, &Ast::new(), &expr, false);
            let errors = format_errors(interner, &errors);
            (tree, errors)
        }
        Test::CheckerProgram(input) => {
            let diags = &mut Diagnostics::new();
            let (ast, errors) = check_program(input, interner, diags);
            let tree = tree::print_program_string(interner, &ast, true);
            (tree, errors)
        }
        Test::TransProgram(input) => {
            let diags = &mut Diagnostics::new();
            let (mut ast, mut errors) = check_program(input, interner, diags);
            if !errors.is_empty() {
                return (String::new(), errors);
            }
            let mut backend = TextBackend::new();
            let listing = match trans::translate(&mut ast, interner, diags) {
                Ok(modules) => modules
                    .iter()
                    .map(|module| backend.generate(module, interner))
                    .collect::<Result<String, _>>()
                    .unwrap_or_else(|e| e.to_string()),
                Err(fatal) => {
                    errors.push(fatal.to_string());
                    String::new()
                }
            };
            errors.extend(format_diagnostics(interner, diags));
            (listing, errors)
        }
    }
}

#[track_caller]
pub fn run_assertion(
    assertion: Assertion,
    formatted_actual_tree: &str,
    formatted_actual_errors: &[String],
) {
    match assertion {
        Assertion::TreeOk(expected_tree) => {
            let expected_errors: &[&str] = &[];
            ::pretty_assertions::assert_eq!(formatted_actual_errors, expected_errors);
            ::pretty_assertions::assert_eq!(formatted_actual_tree.trim(), expected_tree.trim());
        }
        Assertion::TreeError(expected_tree) => {
            ::pretty_assertions::assert_eq!(formatted_actual_tree.trim(), expected_tree.trim());
        }
        Assertion::ExpectedErrors(expected_errors) => {
            ::pretty_assertions::assert_eq!(formatted_actual_errors, expected_errors);
        }
    }
}

macro_rules! tree_tests {
    (
        use $test_kind:ident;

        $(
            fn $test_name:ident() {
                let $source_kind:ident = $source:expr;
                $($assertions_tt:tt)*
            }
        )*
    ) => {
        $(
            #[test]
            fn $test_name() {
                let test: crate::util::test_utils::Test =
                    tree_tests!(@@get_test($test_kind, $source_kind), $source);
                let (formatted_actual_tree, formatted_actual_errors) =
                    crate::util::test_utils::run_pipeline(test);
                let ctx = (&formatted_actual_tree, &formatted_actual_errors);
                tree_tests!(@@expand_assertions, ctx, [$($assertions_tt)*]);
            }
        )*
    };

    (@@expand_assertions, $ctx:expr, []) => {};
    (@@expand_assertions, $ctx:expr, [
        let $assertion:ident = $assertion_expected:expr;
        $($rest_assertions_tt:tt)*
    ]) => {
        crate::util::test_utils::run_assertion(
            tree_tests!(@@assertion, $assertion, $assertion_expected),
            $ctx.0,
            $ctx.1,
        );
        tree_tests!(@@expand_assertions, $ctx, [$($rest_assertions_tt)*]);
    };

    (@@assertion, tree_ok, $expected:expr) => {
        crate::util::test_utils::Assertion::TreeOk(::indoc::indoc! { $expected })
    };
    (@@assertion, tree_error, $expected:expr) => {
        crate::util::test_utils::Assertion::TreeError(::indoc::indoc! { $expected })
    };
    (@@assertion, expected_errors, $expected:expr) => {
        crate::util::test_utils::Assertion::ExpectedErrors($expected)
    };

    (@@get_test(parser, program), $source:expr) => {
        crate::util::test_utils::Test::ParserProgram($source)
    };
    (@@get_test(parser, expr), $source:expr) => {
        crate::util::test_utils::Test::ParserExpr($source)
    };
    (@@get_test(checker, program), $source:expr) => {
        crate::util::test_utils::Test::CheckerProgram($source)
    };
    (@@get_test(trans, program), $source:expr) => {
        crate::util::test_utils::Test::TransProgram($source)
    };
}
pub(crate) use tree_tests;
