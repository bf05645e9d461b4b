//! Diagnostics.
//!
//! User errors accumulate in a [`Diagnostics`] collector owned by the driver
//! of one compilation unit. Broken compiler invariants are a different class
//! of failure and are reported as [`Fatal`] through `Result`.

use std::fmt;

use tracing::debug;

use crate::{meta::Meta, parser, token::Span, util::intern::Interned};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Fatal,
    Error,
    Info,
    Warn,
    Debug,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Fatal => "fatal",
            Level::Error => "error",
            Level::Info => "info",
            Level::Warn => "warning",
            Level::Debug => "debug",
        })
    }
}

/// A diagnostic code along with its message arguments.
///
/// Messages are rendered through [`crate::util::fmt::Show`], which resolves
/// interned names.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    Syntax(parser::Error),

    UndefinedId(Interned<str>),
    UndefinedType(Interned<str>),
    UndefinedLabel(Interned<str>),
    DuplicatedId(Interned<str>),
    DuplicatedLabel(&'static str),
    DuplicatedCase,
    DuplicatedEnumValue(i128),

    MismatchedType {
        expected: Meta,
        actual: Meta,
    },
    MismatchedCount {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    NumericOverflow {
        value: i128,
        ty: Meta,
    },
    IncompatibleType {
        from: Meta,
        to: Meta,
    },
    InvalidOpType {
        op: &'static str,
        ty: Meta,
    },
    InvalidCondType(Meta),
    NotComparableType(Meta),
    InvalidMapValue,
    InvalidLvalue,
    InvalidSizeValue,
    TooLarge,
    InvalidArrayIndex(i128),
    InvalidSubscript,
    InvalidEnumValue,
    InvalidCase,
    InvalidContinue,
    InvalidBreak,
    InaccessibleType,
    NotCallable,
    NotAllowedAlloc,
    NotAllowedInit,
    NotAllowedParam(Interned<str>),
    MissingArraySize,
    MissingConstValue(Interned<str>),
    MissingReturn(Interned<str>),
    NotSupported(&'static str),
    DivideByZero,

    IgnoredStatement,
    RecursiveCall(Interned<str>),
    Truncation,
}

impl Error {
    /// The stable name of this diagnostic's code.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Syntax(_) => "SYNTAX",
            Error::UndefinedId(_) => "UNDEFINED_ID",
            Error::UndefinedType(_) => "UNDEFINED_TYPE",
            Error::UndefinedLabel(_) => "UNDEFINED_LABEL",
            Error::DuplicatedId(_) => "DUPLICATED_ID",
            Error::DuplicatedLabel(_) => "DUPLICATED_LABEL",
            Error::DuplicatedCase => "DUPLICATED_CASE",
            Error::DuplicatedEnumValue(_) => "DUPLICATED_ENUM_VAL",
            Error::MismatchedType { .. } => "MISMATCHED_TYPE",
            Error::MismatchedCount { .. } => "MISMATCHED_COUNT",
            Error::NumericOverflow { .. } => "NUMERIC_OVERFLOW",
            Error::IncompatibleType { .. } => "INCOMPATIBLE_TYPE",
            Error::InvalidOpType { .. } => "INVALID_OP_TYPE",
            Error::InvalidCondType(_) => "INVALID_COND_TYPE",
            Error::NotComparableType(_) => "NOT_COMPARABLE_TYPE",
            Error::InvalidMapValue => "INVALID_MAP_VALUE",
            Error::InvalidLvalue => "INVALID_LVALUE",
            Error::InvalidSizeValue => "INVALID_SIZE_VAL",
            Error::TooLarge => "TOO_LARGE",
            Error::InvalidArrayIndex(_) => "INVALID_ARR_IDX",
            Error::InvalidSubscript => "INVALID_SUBSCRIPT",
            Error::InvalidEnumValue => "INVALID_ENUM_VAL",
            Error::InvalidCase => "INVALID_CASE",
            Error::InvalidContinue => "INVALID_CONTINUE",
            Error::InvalidBreak => "INVALID_BREAK",
            Error::InaccessibleType => "INACCESSIBLE_TYPE",
            Error::NotCallable => "NOT_CALLABLE_EXP",
            Error::NotAllowedAlloc => "NOT_ALLOWED_ALLOC",
            Error::NotAllowedInit => "NOT_ALLOWED_INIT",
            Error::NotAllowedParam(_) => "NOT_ALLOWED_PARAM",
            Error::MissingArraySize => "MISSING_ARR_SIZE",
            Error::MissingConstValue(_) => "MISSING_CONST_VAL",
            Error::MissingReturn(_) => "MISSING_RETURN",
            Error::NotSupported(_) => "NOT_SUPPORTED",
            Error::DivideByZero => "DIVIDE_BY_ZERO",
            Error::IgnoredStatement => "IGNORED_STMT",
            Error::RecursiveCall(_) => "RECURSIVE_CALL",
            Error::Truncation => "TRUNCATION",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    pub level: Level,
    pub span: Span,
    pub error: Error,
}

#[derive(Debug, thiserror::Error)]
pub enum Fatal {
    #[error("internal compiler error: {0}")]
    Invariant(&'static str),
    #[error("fatal {} at {}", .0.error.code(), .0.span)]
    Emitted(Box<Diagnostic>),
}

/// The diagnostics of one compilation unit, in emission order.
#[derive(Debug, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Diagnostics {
        Diagnostics::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        debug!(
            level = %diagnostic.level,
            code = diagnostic.error.code(),
            span = %diagnostic.span,
            "diagnostic"
        );
        self.items.push(diagnostic);
    }

    pub fn pop(&mut self) -> Option<Diagnostic> {
        self.items.pop()
    }

    pub fn emit(&mut self, level: Level, span: Span, error: Error) {
        self.push(Diagnostic { level, span, error });
    }

    pub fn error(&mut self, span: Span, error: Error) {
        self.emit(Level::Error, span, error);
    }

    pub fn warn(&mut self, span: Span, error: Error) {
        self.emit(Level::Warn, span, error);
    }

    pub fn info(&mut self, span: Span, error: Error) {
        self.emit(Level::Info, span, error);
    }

    pub fn debug(&mut self, span: Span, error: Error) {
        self.emit(Level::Debug, span, error);
    }

    /// Builds a fatal diagnostic, which must be propagated immediately. Used
    /// for user errors that checking should have rejected.
    pub fn fatal(span: Span, error: Error) -> Fatal {
        Fatal::Emitted(Box::new(Diagnostic {
            level: Level::Fatal,
            span,
            error,
        }))
    }

    /// Whether any diagnostic fails the compilation unit.
    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|d| d.level <= Level::Error)
    }

    pub fn count(&self, level: Level) -> usize {
        self.items.iter().filter(|d| d.level == level).count()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_do_not_fail_the_unit() {
        let mut diags = Diagnostics::new();
        diags.warn(Span::default(), Error::Truncation);
        diags.info(Span::default(), Error::IgnoredStatement);
        assert!(!diags.has_errors());
        diags.error(Span::default(), Error::InvalidLvalue);
        assert!(diags.has_errors());
        assert_eq!(diags.count(Level::Warn), 1);
        assert_eq!(diags.pop().map(|d| d.error), Some(Error::InvalidLvalue));
        assert!(!diags.has_errors());
    }

    #[test]
    fn fatal_is_not_accumulated() {
        let fatal = Diagnostics::fatal(Span::new_of_bounds(3..5), Error::InvalidBreak);
        assert_eq!(fatal.to_string(), "fatal INVALID_BREAK at 3..5");
    }
}
