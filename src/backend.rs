//! Code generation.
//!
//! A backend consumes one lowered [`Module`] at a time: its signature table,
//! its functions and its constant data. It either returns the generated
//! output or rejects the module as structurally invalid.

pub mod text;

use crate::{ir::Module, util::intern::Interner};

pub trait Backend {
    type Output;
    type Error: std::error::Error;

    fn generate(&mut self, module: &Module, idents: &Interner<str>)
        -> Result<Self::Output, Self::Error>;
}
