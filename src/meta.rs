//! Type descriptors.
//!
//! Every expression and identifier carries a [`Meta`]. Checking compares
//! metas with [`meta_cmp`] and then unifies them with [`meta_eval`], which
//! resolves literal ("undefined") metas to the concrete type they meet.

use crate::{
    ast::IdRef,
    diag::{Diagnostics, Error},
    token::Span,
    util::intern::Interned,
};

/// Size of an address, in bytes.
pub const ADDR_SIZE: u32 = 4;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Type {
    #[default]
    None,
    Bool,
    Byte,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
    String,
    Account,
    Struct,
    Map,
    Object,
    Void,
    Tuple,
}

impl Type {
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Type::Byte
                | Type::Int8
                | Type::Int16
                | Type::Int32
                | Type::Int64
                | Type::UInt8
                | Type::UInt16
                | Type::UInt32
                | Type::UInt64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, Type::Float | Type::Double)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_primitive(self) -> bool {
        Type::Bool <= self && self <= Type::Account
    }

    /// Scalar size in bytes. Aggregates are represented by their address.
    pub fn size(self) -> u32 {
        match self {
            Type::None | Type::Void | Type::Tuple => 0,
            Type::Int64 | Type::UInt64 | Type::Double => 8,
            _ => 4,
        }
    }

    /// Whether `value` is representable in this integer type.
    pub fn fits(self, value: i128) -> bool {
        let (min, max): (i128, i128) = match self {
            Type::Byte | Type::UInt8 => (0, u8::MAX.into()),
            Type::Int8 => (i8::MIN.into(), i8::MAX.into()),
            Type::Int16 => (i16::MIN.into(), i16::MAX.into()),
            Type::UInt16 => (0, u16::MAX.into()),
            Type::Int32 => (i32::MIN.into(), i32::MAX.into()),
            Type::UInt32 => (0, u32::MAX.into()),
            Type::Int64 => (i64::MIN.into(), i64::MAX.into()),
            Type::UInt64 => (0, u64::MAX.into()),
            _ => return false,
        };
        (min..=max).contains(&value)
    }

    pub fn name(self) -> &'static str {
        match self {
            Type::None => "none",
            Type::Bool => "bool",
            Type::Byte => "byte",
            Type::Int8 => "int8",
            Type::Int16 => "int16",
            Type::Int32 => "int32",
            Type::Int64 => "int64",
            Type::UInt8 => "uint8",
            Type::UInt16 => "uint16",
            Type::UInt32 => "uint32",
            Type::UInt64 => "uint64",
            Type::Float => "float",
            Type::Double => "double",
            Type::String => "string",
            Type::Account => "account",
            Type::Struct => "struct",
            Type::Map => "map",
            Type::Object => "object",
            Type::Void => "void",
            Type::Tuple => "tuple",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Meta {
    pub ty: Type,
    /// Array dimension sizes, outermost first. Zero means unknown.
    pub dims: Vec<u32>,
    /// Key and value of a map, fields of a struct or elements of a tuple.
    pub elems: Vec<Meta>,
    /// Declaration of a struct, contract or interface type.
    pub type_id: Option<IdRef>,
    pub name: Option<Interned<str>>,
    /// Literal metas are "undefined" until unified with a concrete type.
    pub is_undef: bool,
    /// Value of an integer literal.
    pub lit: Option<i128>,
}

impl Meta {
    pub fn new(ty: Type) -> Meta {
        Meta {
            ty,
            ..Meta::default()
        }
    }

    pub fn undef(ty: Type) -> Meta {
        Meta {
            ty,
            is_undef: true,
            ..Meta::default()
        }
    }

    /// An untyped integer literal.
    pub fn int_lit(value: i128) -> Meta {
        Meta {
            ty: Type::Int64,
            is_undef: true,
            lit: Some(value),
            ..Meta::default()
        }
    }

    pub fn tuple(elems: Vec<Meta>) -> Meta {
        Meta {
            ty: Type::Tuple,
            elems,
            ..Meta::default()
        }
    }

    pub fn map(key: Meta, value: Meta) -> Meta {
        Meta {
            ty: Type::Map,
            elems: vec![key, value],
            ..Meta::default()
        }
    }

    pub fn structure(id: IdRef, name: Interned<str>, fields: Vec<Meta>) -> Meta {
        Meta {
            ty: Type::Struct,
            elems: fields,
            type_id: Some(id),
            name: Some(name),
            ..Meta::default()
        }
    }

    pub fn object(id: Option<IdRef>, name: Option<Interned<str>>) -> Meta {
        Meta {
            ty: Type::Object,
            type_id: id,
            name,
            ..Meta::default()
        }
    }

    #[must_use]
    pub fn with_dims(mut self, dims: Vec<u32>) -> Meta {
        self.dims = dims;
        self
    }

    /// The meta of one element of this array.
    #[must_use]
    pub fn strip_dim(&self) -> Meta {
        let mut elem = self.clone();
        if !elem.dims.is_empty() {
            elem.dims.remove(0);
        }
        elem
    }

    /// This meta with every array dimension removed.
    #[must_use]
    pub fn base(&self) -> Meta {
        let mut base = self.clone();
        base.dims.clear();
        base
    }

    #[must_use]
    pub fn concrete(&self) -> Meta {
        let mut meta = self.clone();
        meta.is_undef = false;
        meta.lit = None;
        meta
    }

    pub fn is_array(&self) -> bool {
        !self.dims.is_empty()
    }

    fn is_scalar(&self) -> bool {
        !self.is_array()
    }

    pub fn is_tuple(&self) -> bool {
        self.ty == Type::Tuple
    }

    pub fn is_struct(&self) -> bool {
        self.ty == Type::Struct && self.is_scalar()
    }

    pub fn is_map(&self) -> bool {
        self.ty == Type::Map && self.is_scalar()
    }

    pub fn is_object(&self) -> bool {
        self.ty == Type::Object && self.is_scalar()
    }

    pub fn is_bool(&self) -> bool {
        self.ty == Type::Bool && self.is_scalar()
    }

    pub fn is_string(&self) -> bool {
        self.ty == Type::String && self.is_scalar()
    }

    pub fn is_integer(&self) -> bool {
        self.ty.is_integer() && self.is_scalar()
    }

    pub fn is_float(&self) -> bool {
        self.ty.is_float() && self.is_scalar()
    }

    pub fn is_numeric(&self) -> bool {
        self.ty.is_numeric() && self.is_scalar()
    }

    pub fn is_void(&self) -> bool {
        self.ty == Type::Void
    }

    /// Whether this meta may be a map key.
    pub fn is_comparable(&self) -> bool {
        self.ty.is_primitive() && self.is_scalar()
    }

    /// Whether values of this meta are represented by an address.
    pub fn is_pointer(&self) -> bool {
        self.is_array()
            || matches!(
                self.ty,
                Type::String | Type::Account | Type::Struct | Type::Map | Type::Object
            )
    }

    /// Whether this is the `null` literal.
    pub fn is_null(&self) -> bool {
        self.ty == Type::Object && self.is_undef
    }

    /// Alignment of one element, in bytes. A struct is aligned as its most
    /// aligned field.
    pub fn align(&self) -> u32 {
        match self.ty {
            Type::Tuple => self.elems.iter().map(Meta::align).max().unwrap_or(0),
            Type::Struct if !self.is_array() => self.elems.iter().map(Meta::align).max().unwrap_or(1),
            ty => ty.size(),
        }
    }

    /// Byte size of a value of this meta, saturated at `u32::MAX`.
    pub fn memsz(&self) -> u32 {
        self.checked_memsz().unwrap_or(u32::MAX)
    }

    /// Byte size of a value of this meta, or `None` past `u32::MAX`.
    ///
    /// Fixed-size arrays are laid out inline: the elements, one header word
    /// holding the element count of the outermost dimension, and one header
    /// word per sub-array of each inner dimension.
    pub fn checked_memsz(&self) -> Option<u32> {
        if self.is_tuple() {
            return self
                .elems
                .iter()
                .try_fold(0u32, |size, elem| size.checked_add(elem.checked_memsz()?));
        }
        if !self.is_array() {
            return Some(self.ty.size());
        }
        if self.dims.contains(&0) {
            return Some(ADDR_SIZE);
        }
        let align = self.align();
        let count = self.dims.iter().try_fold(1u32, |n, &dim| n.checked_mul(dim))?;
        let elems = count.checked_mul(self.ty.size())?;
        let headers = self.dims[..self.dims.len() - 1]
            .iter()
            .try_fold(0u32, |n, &dim| n.checked_add(dim))?
            .checked_mul(align)?;
        elems.checked_add(align)?.checked_add(headers)
    }

    /// Bytes of addressable storage a value of this meta needs, saturated at
    /// `u32::MAX`.
    pub fn storage_size(&self) -> u32 {
        self.checked_storage_size().unwrap_or(u32::MAX)
    }

    /// Bytes of addressable storage a value of this meta needs, or `None`
    /// past `u32::MAX`. Structs hold their fields inline, nested structs
    /// included.
    pub fn checked_storage_size(&self) -> Option<u32> {
        if self.is_struct() {
            self.elems.iter().try_fold(0u32, |size, field| {
                checked_align_up(size, field.align())?.checked_add(field.checked_storage_size()?)
            })
        } else {
            self.checked_memsz()
        }
    }

    /// Byte offset of the `i`-th field of a struct.
    pub fn field_offset(&self, i: usize) -> u32 {
        let offset = self.elems[..i]
            .iter()
            .fold(0, |size: u32, field| align_up(size, field.align()).saturating_add(field.storage_size()));
        align_up(offset, self.elems[i].align())
    }

    /// Flattens nested tuples into their leaf metas.
    pub fn flatten(&self) -> Vec<&Meta> {
        let mut flat = Vec::new();
        flatten_into(self, &mut flat);
        flat
    }
}

fn flatten_into<'m>(meta: &'m Meta, flat: &mut Vec<&'m Meta>) {
    if meta.is_tuple() {
        for elem in &meta.elems {
            flatten_into(elem, flat);
        }
    } else {
        flat.push(meta);
    }
}

/// Rounds `n` up to a multiple of `align`, saturating at `u32::MAX`.
pub fn align_up(n: u32, align: u32) -> u32 {
    checked_align_up(n, align).unwrap_or(u32::MAX)
}

pub fn checked_align_up(n: u32, align: u32) -> Option<u32> {
    if align == 0 {
        Some(n)
    } else {
        n.checked_next_multiple_of(align)
    }
}

/// Checks that a value of meta `y` may be stored where `x` is expected.
///
/// Reports at most one diagnostic at `span` and returns whether the metas are
/// compatible.
pub fn meta_cmp(diags: &mut Diagnostics, span: Span, x: &Meta, y: &Meta) -> bool {
    match cmp(x, y) {
        Ok(()) => true,
        Err(error) => {
            diags.error(span, error);
            false
        }
    }
}

type Result<T = (), E = Error> = std::result::Result<T, E>;

fn cmp(x: &Meta, y: &Meta) -> Result {
    if x.is_tuple() {
        cmp_tuple(x, y)
    } else if x.is_array() {
        cmp_array(x, y)
    } else if x.ty == Type::Struct {
        cmp_struct(x, y)
    } else if x.ty == Type::Map {
        cmp_map(x, y)
    } else {
        cmp_scalar(x, y)
    }
}

fn mismatch(x: &Meta, y: &Meta) -> Error {
    Error::MismatchedType {
        expected: x.clone(),
        actual: y.clone(),
    }
}

fn count(what: &'static str, expected: usize, actual: usize) -> Error {
    Error::MismatchedCount {
        what,
        expected,
        actual,
    }
}

fn cmp_scalar(x: &Meta, y: &Meta) -> Result {
    if y.is_tuple() || y.is_array() {
        return Err(mismatch(x, y));
    }
    let (decl, lit) = match (x.is_undef, y.is_undef) {
        (true, true) => {
            let same_family = x.ty == y.ty
                || (x.ty.is_integer() && y.ty.is_integer())
                || (x.ty.is_float() && y.ty.is_float());
            return if same_family {
                Ok(())
            } else {
                Err(mismatch(x, y))
            };
        }
        (false, true) => (x, y),
        (true, false) => (y, x),
        (false, false) => {
            let same_object = x.ty != Type::Object
                || x.type_id.is_none()
                || y.type_id.is_none()
                || x.type_id == y.type_id;
            return if x.ty == y.ty && same_object {
                Ok(())
            } else {
                Err(mismatch(x, y))
            };
        }
    };
    if lit.ty.is_integer() {
        if !decl.ty.is_integer() {
            return Err(mismatch(x, y));
        }
        return match lit.lit {
            Some(value) if !decl.ty.fits(value) => Err(Error::NumericOverflow {
                value,
                ty: decl.concrete(),
            }),
            _ => Ok(()),
        };
    }
    let accepted = match lit.ty {
        Type::Float | Type::Double => decl.ty.is_float(),
        Type::Object => decl.is_pointer(),
        ty => ty == decl.ty,
    };
    if accepted {
        Ok(())
    } else {
        Err(mismatch(x, y))
    }
}

fn cmp_array(x: &Meta, y: &Meta) -> Result {
    if y.is_tuple() {
        let expected = x.dims[0] as usize;
        if expected != 0 && expected != y.elems.len() {
            return Err(count("element", expected, y.elems.len()));
        }
        let elem = x.strip_dim();
        return y.elems.iter().try_for_each(|e| cmp(&elem, e));
    }
    if y.is_null() {
        return Ok(());
    }
    if !y.is_array() || x.dims.len() != y.dims.len() {
        return Err(mismatch(x, y));
    }
    for (&a, &b) in x.dims.iter().zip(&y.dims) {
        if a != 0 && b != 0 && a != b {
            return Err(count("element", a as usize, b as usize));
        }
    }
    cmp(&x.base(), &y.base()).map_err(|_| mismatch(x, y))
}

fn cmp_struct(x: &Meta, y: &Meta) -> Result {
    if y.is_tuple() {
        if x.elems.len() != y.elems.len() {
            return Err(count("field", x.elems.len(), y.elems.len()));
        }
        return x.elems.iter().zip(&y.elems).try_for_each(|(a, b)| cmp(a, b));
    }
    if y.is_null() || (y.is_struct() && x.type_id == y.type_id) {
        Ok(())
    } else {
        Err(mismatch(x, y))
    }
}

fn cmp_map(x: &Meta, y: &Meta) -> Result {
    let (key, value) = (&x.elems[0], &x.elems[1]);
    if y.is_tuple() {
        for pair in &y.elems {
            if !pair.is_tuple() || pair.elems.len() != 2 {
                let actual = if pair.is_tuple() { pair.elems.len() } else { 1 };
                return Err(count("key-value", 2, actual));
            }
            cmp(key, &pair.elems[0])?;
            cmp(value, &pair.elems[1])?;
        }
        return Ok(());
    }
    if y.is_null() {
        return Ok(());
    }
    if !y.is_map() {
        return Err(mismatch(x, y));
    }
    cmp(key, &y.elems[0]).map_err(|_| mismatch(x, y))?;
    cmp(value, &y.elems[1]).map_err(|_| mismatch(x, y))
}

fn cmp_tuple(x: &Meta, y: &Meta) -> Result {
    if !y.is_tuple() {
        return Err(count("element", x.elems.len(), 1));
    }
    if x.elems.len() == y.elems.len() {
        return x.elems.iter().zip(&y.elems).try_for_each(|(a, b)| cmp(a, b));
    }
    let (fx, fy) = (x.flatten(), y.flatten());
    if fx.len() != fy.len() {
        return Err(count("element", fx.len(), fy.len()));
    }
    fx.into_iter().zip(fy).try_for_each(|(a, b)| cmp(a, b))
}

/// Unifies two metas that passed [`meta_cmp`], returning the resolved meta.
///
/// Literal metas take the concrete type of the other side. Arrays
/// initialized from nested tuples get their unknown dimension sizes from the
/// nesting.
pub fn meta_eval(x: &Meta, y: &Meta) -> Meta {
    match (x.is_tuple(), y.is_tuple()) {
        (false, true) if x.is_array() => return infer_dims(x, y),
        (true, false) if y.is_array() => return infer_dims(y, x),
        (true, true) => {
            if x.elems.len() == y.elems.len() {
                let elems = x.elems.iter().zip(&y.elems);
                return Meta::tuple(elems.map(|(a, b)| meta_eval(a, b)).collect());
            }
            let (fx, fy) = (x.flatten(), y.flatten());
            if fx.len() == fy.len() {
                let elems = fx.into_iter().zip(fy);
                return Meta::tuple(elems.map(|(a, b)| meta_eval(a, b)).collect());
            }
            return x.clone();
        }
        (false, true) => return x.concrete(),
        (true, false) => return y.concrete(),
        (false, false) => (),
    }
    match (x.is_undef, y.is_undef) {
        (true, true) => {
            let mut meta = if y.ty.is_float() && !x.ty.is_float() {
                y.clone()
            } else {
                x.clone()
            };
            if x.lit != y.lit {
                meta.lit = None;
            }
            meta
        }
        (false, true) => x.concrete(),
        (true, false) => y.concrete(),
        (false, false) => x.clone(),
    }
}

fn infer_dims(array: &Meta, init: &Meta) -> Meta {
    let mut meta = array.concrete();
    fill_dims(&mut meta.dims, init, 0);
    meta
}

fn fill_dims(dims: &mut [u32], init: &Meta, depth: usize) {
    if depth >= dims.len() || !init.is_tuple() {
        return;
    }
    if dims[depth] == 0 {
        dims[depth] = u32::try_from(init.elems.len()).unwrap_or(u32::MAX);
    }
    for elem in &init.elems {
        fill_dims(dims, elem, depth + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Diagnostics;

    fn cmp_ok(x: &Meta, y: &Meta) -> (bool, Diagnostics) {
        let mut diags = Diagnostics::new();
        let ok = meta_cmp(&mut diags, Span::default(), x, y);
        (ok, diags)
    }

    #[test]
    fn integer_literals_are_range_checked_per_width() {
        let lit = Meta::int_lit(300);
        for ty in [Type::Int32, Type::UInt32, Type::Int64, Type::UInt64, Type::Int16] {
            let (ok, diags) = cmp_ok(&Meta::new(ty), &lit);
            assert!(ok, "300 must fit {ty:?}");
            assert!(diags.is_empty());
        }
        for ty in [Type::Int8, Type::UInt8, Type::Byte] {
            let (ok, diags) = cmp_ok(&Meta::new(ty), &lit);
            assert!(!ok, "300 must not fit {ty:?}");
            assert!(matches!(
                diags.iter().next().map(|d| &d.error),
                Some(Error::NumericOverflow { value: 300, .. })
            ));
        }
        let negative = Meta::int_lit(-1);
        assert!(cmp_ok(&Meta::new(Type::Int32), &negative).0);
        assert!(!cmp_ok(&Meta::new(Type::UInt32), &negative).0);
        assert!(!cmp_ok(&Meta::new(Type::UInt64), &negative).0);
        let big = Meta::int_lit(i128::from(u32::MAX) + 1);
        assert!(!cmp_ok(&Meta::new(Type::UInt32), &big).0);
        assert!(cmp_ok(&Meta::new(Type::UInt64), &big).0);
        assert!(cmp_ok(&Meta::new(Type::Int64), &big).0);
    }

    #[test]
    fn literal_side_is_symmetric() {
        let lit = Meta::int_lit(7);
        assert!(cmp_ok(&lit, &Meta::new(Type::Int8)).0);
        assert!(!cmp_ok(&Meta::int_lit(700), &Meta::new(Type::Int8)).0);
        assert!(!cmp_ok(&Meta::new(Type::String), &lit).0);
        assert!(cmp_ok(&Meta::new(Type::Double), &Meta::undef(Type::Double)).0);
        assert!(!cmp_ok(&Meta::new(Type::Int32), &Meta::undef(Type::Double)).0);
    }

    #[test]
    fn concrete_types_must_match_exactly() {
        assert!(cmp_ok(&Meta::new(Type::Int32), &Meta::new(Type::Int32)).0);
        assert!(!cmp_ok(&Meta::new(Type::Int32), &Meta::new(Type::Int64)).0);
        assert!(cmp_ok(&Meta::new(Type::String), &Meta::undef(Type::Object)).0);
        assert!(!cmp_ok(&Meta::new(Type::Int32), &Meta::undef(Type::Object)).0);
    }

    #[test]
    fn nested_tuples_are_flattened() {
        let int = Meta::new(Type::Int32);
        let left = Meta::tuple(vec![int.clone(), int.clone(), int.clone()]);
        let right = Meta::tuple(vec![
            int.clone(),
            Meta::tuple(vec![int.clone(), int.clone()]),
        ]);
        assert!(cmp_ok(&left, &right).0);

        let short = Meta::tuple(vec![int.clone(), int.clone()]);
        let (ok, diags) = cmp_ok(&left, &short);
        assert!(!ok);
        assert!(matches!(
            diags.iter().next().map(|d| &d.error),
            Some(Error::MismatchedCount { expected: 3, actual: 2, .. })
        ));
    }

    #[test]
    fn arrays_against_initializers() {
        let arr = Meta::new(Type::Int32).with_dims(vec![2, 0]);
        let init = Meta::tuple(vec![
            Meta::tuple(vec![Meta::int_lit(1), Meta::int_lit(2), Meta::int_lit(3)]),
            Meta::tuple(vec![Meta::int_lit(4), Meta::int_lit(5), Meta::int_lit(6)]),
        ]);
        assert!(cmp_ok(&arr, &init).0);
        assert_eq!(meta_eval(&arr, &init).dims, [2, 3]);

        let too_many = Meta::tuple(vec![Meta::int_lit(1); 3]);
        let (ok, diags) = cmp_ok(&Meta::new(Type::Int32).with_dims(vec![2]), &too_many);
        assert!(!ok);
        assert!(matches!(
            diags.iter().next().map(|d| &d.error),
            Some(Error::MismatchedCount { what: "element", expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn maps_against_pairs() {
        let map = Meta::map(Meta::new(Type::String), Meta::new(Type::Int32));
        let pair = |k: Meta, v: Meta| Meta::tuple(vec![k, v]);
        let init = Meta::tuple(vec![
            pair(Meta::new(Type::String), Meta::int_lit(1)),
            pair(Meta::new(Type::String), Meta::int_lit(2)),
        ]);
        assert!(cmp_ok(&map, &init).0);
        let bad = Meta::tuple(vec![Meta::tuple(vec![Meta::new(Type::String)])]);
        assert!(!cmp_ok(&map, &bad).0);
    }

    #[test]
    fn eval_resolves_literals() {
        let uint = Meta::new(Type::UInt32);
        let lit = Meta::int_lit(3);
        assert_eq!(meta_eval(&uint, &lit), uint);
        assert_eq!(meta_eval(&lit, &uint), uint);

        let both = meta_eval(&Meta::int_lit(1), &Meta::undef(Type::Double));
        assert_eq!(both.ty, Type::Double);
        assert!(both.is_undef);
    }

    #[test]
    fn memory_sizes() {
        assert_eq!(Meta::new(Type::Bool).memsz(), 4);
        assert_eq!(Meta::new(Type::Int64).memsz(), 8);
        assert_eq!(Meta::new(Type::String).memsz(), 4);
        // 3 elements plus the count word.
        assert_eq!(Meta::new(Type::Int32).with_dims(vec![3]).memsz(), 16);
        // 6 elements, the outer count word and one count word per row.
        assert_eq!(Meta::new(Type::Int64).with_dims(vec![2, 3]).memsz(), 48 + 8 + 16);
        assert_eq!(Meta::new(Type::Int32).with_dims(vec![0]).memsz(), ADDR_SIZE);
    }

    #[test]
    fn struct_layout() {
        let point = Meta {
            ty: Type::Struct,
            elems: vec![Meta::new(Type::Int32), Meta::new(Type::Int64), Meta::new(Type::Bool)],
            ..Meta::default()
        };
        assert_eq!(point.memsz(), ADDR_SIZE);
        assert_eq!(point.field_offset(0), 0);
        assert_eq!(point.field_offset(1), 8);
        assert_eq!(point.field_offset(2), 16);
        assert_eq!(point.storage_size(), 20);
        assert_eq!(point.align(), 8);
    }

    #[test]
    fn nested_structs_are_inline() {
        let inner = Meta {
            ty: Type::Struct,
            elems: vec![Meta::new(Type::Int64), Meta::new(Type::Int64)],
            ..Meta::default()
        };
        let outer = Meta {
            ty: Type::Struct,
            elems: vec![inner.clone(), Meta::new(Type::Int32)],
            ..Meta::default()
        };
        assert_eq!(inner.storage_size(), 16);
        assert_eq!(outer.field_offset(1), 16);
        assert_eq!(outer.storage_size(), 20);
        assert_eq!(outer.align(), 8);

        // Arrays of structs hold addresses.
        let row = inner.with_dims(vec![2]);
        assert_eq!(row.storage_size(), 2 * ADDR_SIZE + ADDR_SIZE);
    }

    #[test]
    fn oversized_arrays_do_not_overflow() {
        let big = Meta::new(Type::Int32).with_dims(vec![65536, 65536]);
        assert_eq!(big.checked_memsz(), None);
        assert_eq!(big.memsz(), u32::MAX);
        assert_eq!(big.checked_storage_size(), None);
        assert_eq!(align_up(u32::MAX - 1, 8), u32::MAX);
        assert_eq!(checked_align_up(13, 4), Some(16));
    }
}
