#![allow(clippy::items_after_statements)]

use crate::{
    diag::{Diagnostic, Error},
    parser,
    token::Spanned,
    util::fmt::Show,
};

impl Show for Diagnostic {
    fn show(&self, f: &mut std::fmt::Formatter<'_>, ctx: &super::Context<'_>) -> std::fmt::Result {
        let i = ctx.ident_interner;
        let Diagnostic { level, span, error } = self;

        if f.alternate() {
            write!(f, "{span}: ")?;
        }
        write!(f, "{level}[{}]: ", error.code())?;

        use Error::*;
        match error {
            Syntax(error) => show_syntax(f, error),
            UndefinedId(name) => write!(f, "{} is not defined", i.get(name)),
            UndefinedType(name) => write!(f, "type {} is not defined", i.get(name)),
            UndefinedLabel(name) => write!(f, "label {} is not defined", i.get(name)),
            DuplicatedId(name) => write!(f, "{} is already defined", i.get(name)),
            DuplicatedLabel(what) => write!(f, "{what} is already defined in this switch"),
            DuplicatedCase => write!(f, "case value is already used in this switch"),
            DuplicatedEnumValue(value) => write!(f, "enum value {value} is already used"),
            MismatchedType { expected, actual } => write!(
                f,
                "expected type {}, but got {}",
                expected.display(ctx),
                actual.display(ctx)
            ),
            MismatchedCount {
                what,
                expected,
                actual,
            } => write!(f, "expected {expected} {what}, but got {actual}"),
            NumericOverflow { value, ty } => {
                write!(f, "{value} does not fit in {}", ty.display(ctx))
            }
            IncompatibleType { from, to } => write!(
                f,
                "cannot convert {} to {}",
                from.display(ctx),
                to.display(ctx)
            ),
            InvalidOpType { op, ty } => {
                write!(f, "operator {op} cannot be applied to {}", ty.display(ctx))
            }
            InvalidCondType(ty) => {
                write!(f, "condition must be bool, but got {}", ty.display(ctx))
            }
            NotComparableType(ty) => write!(f, "{} cannot be a map key", ty.display(ctx)),
            InvalidMapValue => write!(f, "invalid map value type"),
            InvalidLvalue => write!(f, "expression is not assignable"),
            InvalidSizeValue => write!(f, "array size must be a positive integer constant"),
            TooLarge => write!(f, "value does not fit in the address space"),
            InvalidArrayIndex(index) => write!(f, "index {index} is out of bounds"),
            InvalidSubscript => write!(f, "only arrays and maps can be indexed"),
            InvalidEnumValue => write!(f, "enum value must be an integer constant"),
            InvalidCase => write!(f, "statement is not reachable from any case"),
            InvalidContinue => write!(f, "continue outside of a loop"),
            InvalidBreak => write!(f, "break outside of a loop or switch"),
            InaccessibleType => write!(f, "member is not accessible"),
            NotCallable => write!(f, "expression is not callable"),
            NotAllowedAlloc => write!(f, "type cannot be allocated"),
            NotAllowedInit => write!(f, "initializer is not allowed here"),
            NotAllowedParam(name) => {
                write!(f, "{} cannot be passed as an argument", i.get(name))
            }
            MissingArraySize => write!(f, "array size is required"),
            MissingConstValue(name) => {
                write!(f, "constant {} must be initialized with a literal", i.get(name))
            }
            MissingReturn(name) => {
                write!(f, "function {} does not return on every path", i.get(name))
            }
            NotSupported(what) => write!(f, "{what} is not supported"),
            DivideByZero => write!(f, "division by zero"),
            IgnoredStatement => write!(f, "statement has no effect"),
            RecursiveCall(name) => write!(f, "function {} calls itself", i.get(name)),
            Truncation => write!(f, "value may be truncated"),
        }
    }
}

impl Show for Spanned<parser::Error> {
    fn show(&self, f: &mut std::fmt::Formatter<'_>, _: &super::Context<'_>) -> std::fmt::Result {
        let Spanned { span, inner: error } = self;

        if f.alternate() {
            write!(f, "{span}: ")?;
        }
        show_syntax(f, error)
    }
}

fn show_syntax(f: &mut std::fmt::Formatter<'_>, error: &parser::Error) -> std::fmt::Result {
    use parser::Error::*;
    match error {
        UnexpectedTokenInExpr { token } => write!(f, "unexpected token {token} in expression"),
        Unexpected { actual, expected } => write!(f, "expected {expected}, but got {actual}"),
        UnexpectedAny { actual, expected } => {
            f.write_str("expected one of ")?;
            for (idx, kind) in expected.iter().enumerate() {
                if idx > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{kind}")?;
            }
            write!(f, ", but got {actual}")
        }
        UnexpectedOperator { actual } => write!(f, "unexpected operator {actual}"),
        ExpectedType { actual } => write!(f, "expected a type, but got {actual}"),
        MultipleReturns => write!(f, "multiple return values are not supported"),
        UnterminatedSql => write!(f, "unterminated SQL statement"),
        ParseInt => write!(f, "integer literal out of range"),
        ParseFloat => write!(f, "invalid float literal"),
        Lexer(kind) => write!(f, "{kind}"),
    }
}
