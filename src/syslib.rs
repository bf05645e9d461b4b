//! System library.
//!
//! Runtime functions the translator calls for allocation, string handling and
//! assertions. They live in the `system` module and take no self address.

use crate::{
    ast::{CallKind, Expr, ExprKind},
    ir::{Abi, ValType},
    meta::{Meta, Type},
    token::Span,
    util::intern::Interner,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SysFn {
    Malloc,
    Memcpy,
    Assert,
    Strcat,
    Strcmp,
    Atoi32,
    Atoi64,
    Itoa32,
    Itoa64,
}

pub const MODULE: &str = "system";

pub static SYSFNS: phf::Map<&'static str, SysFn> = phf::phf_map! {
    "__malloc" => SysFn::Malloc,
    "__memcpy" => SysFn::Memcpy,
    "__assert" => SysFn::Assert,
    "__strcat" => SysFn::Strcat,
    "__strcmp" => SysFn::Strcmp,
    "__atoi32" => SysFn::Atoi32,
    "__atoi64" => SysFn::Atoi64,
    "__itoa32" => SysFn::Itoa32,
    "__itoa64" => SysFn::Itoa64,
};

impl SysFn {
    pub const ALL: &[SysFn] = &[
        SysFn::Malloc,
        SysFn::Memcpy,
        SysFn::Assert,
        SysFn::Strcat,
        SysFn::Strcmp,
        SysFn::Atoi32,
        SysFn::Atoi64,
        SysFn::Itoa32,
        SysFn::Itoa64,
    ];

    pub fn lookup(name: &str) -> Option<SysFn> {
        SYSFNS.get(name).copied()
    }

    pub const fn name(self) -> &'static str {
        match self {
            SysFn::Malloc => "__malloc",
            SysFn::Memcpy => "__memcpy",
            SysFn::Assert => "__assert",
            SysFn::Strcat => "__strcat",
            SysFn::Strcmp => "__strcmp",
            SysFn::Atoi32 => "__atoi32",
            SysFn::Atoi64 => "__atoi64",
            SysFn::Itoa32 => "__itoa32",
            SysFn::Itoa64 => "__itoa64",
        }
    }

    pub fn params(self) -> &'static [Type] {
        match self {
            SysFn::Malloc => &[Type::UInt32],
            SysFn::Memcpy => &[Type::UInt32, Type::UInt32, Type::UInt32],
            SysFn::Assert => &[Type::Bool, Type::String, Type::String],
            SysFn::Strcat | SysFn::Strcmp => &[Type::String, Type::String],
            SysFn::Atoi32 | SysFn::Atoi64 => &[Type::String],
            SysFn::Itoa32 => &[Type::UInt32],
            SysFn::Itoa64 => &[Type::UInt64],
        }
    }

    pub fn result(self) -> Type {
        match self {
            SysFn::Malloc | SysFn::Strcmp | SysFn::Atoi32 => Type::UInt32,
            SysFn::Atoi64 => Type::UInt64,
            SysFn::Memcpy | SysFn::Assert => Type::Void,
            SysFn::Strcat | SysFn::Itoa32 | SysFn::Itoa64 => Type::String,
        }
    }

    pub fn abi(self) -> Abi {
        Abi {
            params: self
                .params()
                .iter()
                .filter_map(|ty| ValType::of(&Meta::new(*ty)))
                .collect(),
            result: ValType::of(&Meta::new(self.result())),
        }
    }

    /// Qualified name, such as `system.__malloc`.
    pub fn qname(self) -> String {
        format!("{MODULE}.{}", self.name())
    }

    /// Builds a call of this function.
    pub fn call(self, idents: &mut Interner<str>, args: Vec<Expr>, span: Span) -> Expr {
        let callee = Expr::new(ExprKind::Global(idents.intern(&self.qname())), span);
        let call = ExprKind::Call {
            callee: Box::new(callee),
            args,
            kind: CallKind::Sys,
        };
        Expr::new(call, span).with_meta(Meta::new(self.result()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_function_is_registered() {
        for f in SysFn::ALL {
            assert_eq!(SysFn::lookup(f.name()), Some(*f));
        }
        assert_eq!(SYSFNS.len(), SysFn::ALL.len());
        assert_eq!(SysFn::lookup("malloc"), None);
    }

    #[test]
    fn abis() {
        let abi = SysFn::Atoi64.abi();
        assert_eq!(abi.params, [ValType::I32]);
        assert_eq!(abi.result, Some(ValType::I64));
        assert_eq!(SysFn::Memcpy.abi().result, None);
        assert_eq!(SysFn::Strcmp.qname(), "system.__strcmp");
    }

    #[test]
    fn calls_carry_the_result_type() {
        let mut i = Interner::with_capacity(4);
        let call = SysFn::Itoa32.call(&mut i, Vec::new(), Span::default());
        assert!(call.meta.is_string());
        let ExprKind::Call { callee, kind, .. } = &call.kind else {
            panic!("expected a call");
        };
        assert_eq!(*kind, CallKind::Sys);
        assert_eq!(callee.kind, ExprKind::Global(i.intern("system.__itoa32")));
    }
}
