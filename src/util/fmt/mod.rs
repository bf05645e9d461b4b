use crate::{
    meta::{Meta, Type},
    util::intern::Interner,
};

pub mod error;
pub mod tree;

pub struct Context<'ident> {
    pub ident_interner: &'ident Interner<str>,
}

/// Analogous to [`std::fmt::Display`], but also contains the program context,
/// such as the current [`Interner`].
pub trait Show {
    fn show(&self, f: &mut std::fmt::Formatter<'_>, ctx: &Context<'_>) -> std::fmt::Result;

    /// Returns a type which can be displayed.
    fn display<'a>(&'a self, ctx: &'a Context<'_>) -> impl std::fmt::Display + 'a
    where
        Self: Sized,
    {
        Display(self, ctx)
    }
}

struct Display<'this, 'ctx, 'ident, T: Show>(pub &'this T, pub &'ctx Context<'ident>);

impl<T> std::fmt::Display for Display<'_, '_, '_, T>
where
    T: Show,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Display(this, ctx) = self;
        this.show(f, ctx)
    }
}

impl Show for Meta {
    fn show(&self, f: &mut std::fmt::Formatter<'_>, ctx: &Context<'_>) -> std::fmt::Result {
        let i = ctx.ident_interner;
        if self.is_undef && self.ty.is_integer() {
            return f.write_str("integer literal");
        }
        if self.is_undef && self.ty.is_float() {
            return f.write_str("float literal");
        }
        match self.ty {
            Type::Object if self.is_undef => return f.write_str("null"),
            Type::Tuple => {
                f.write_str("(")?;
                for (idx, elem) in self.elems.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    elem.show(f, ctx)?;
                }
                return f.write_str(")");
            }
            Type::Map => {
                f.write_str("map(")?;
                for (idx, elem) in self.elems.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    elem.show(f, ctx)?;
                }
                f.write_str(")")?;
            }
            Type::Struct | Type::Object => match self.name {
                Some(name) => f.write_str(i.get(name))?,
                None => f.write_str(self.ty.name())?,
            },
            ty => f.write_str(ty.name())?,
        }
        for dim in &self.dims {
            if *dim == 0 {
                f.write_str("[]")?;
            } else {
                write!(f, "[{dim}]")?;
            }
        }
        Ok(())
    }
}
