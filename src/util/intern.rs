//! Interning of identifiers and qualified names.
//!
//! Every name of a compilation unit is stored once in an [`Interner`] and
//! passed around as a copyable [`Interned`] handle, which compares and hashes
//! as an integer.

use std::{
    cmp::Ordering, collections::HashMap, fmt, hash::Hash, marker::PhantomData, num::NonZeroU32,
    rc::Rc,
};

/// A handle to a value of type `T` stored in an [`Interner`]. Use
/// [`Interner::get`] to read it back.
pub struct Interned<T: ?Sized> {
    // Non-zero so that `Option<Interned<T>>` is as small as the handle.
    handle: NonZeroU32,
    _ty: PhantomData<T>,
}

impl<T: ?Sized> Interned<T> {
    const fn from_handle(handle: NonZeroU32) -> Self {
        Interned {
            handle,
            _ty: PhantomData,
        }
    }

    /// Position of the value in its interner.
    fn index(self) -> usize {
        self.handle.get() as usize - 1
    }
}

impl<T: ?Sized> Copy for Interned<T> {}

impl<T: ?Sized> Clone for Interned<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Hash for Interned<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.handle.hash(state);
    }
}

impl<T: ?Sized> PartialEq for Interned<T> {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl<T: ?Sized> Eq for Interned<T> {}

impl<T: ?Sized> PartialOrd for Interned<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Orders by first interning, not by value.
impl<T: ?Sized> Ord for Interned<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.handle.cmp(&other.handle)
    }
}

impl<T: ?Sized> fmt::Debug for Interned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.handle)
    }
}

impl<T: ?Sized> From<&Interned<T>> for Interned<T> {
    fn from(value: &Interned<T>) -> Self {
        *value
    }
}

pub struct Interner<T: ?Sized> {
    handles: HashMap<Rc<T>, NonZeroU32>,
    values: Vec<Rc<T>>,
}

impl<T: ?Sized> Default for Interner<T> {
    fn default() -> Self {
        Interner {
            handles: HashMap::new(),
            values: Vec::new(),
        }
    }
}

impl fmt::Debug for Interner<str> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.values.iter().enumerate().map(|(i, value)| (i + 1, value)))
            .finish()
    }
}

impl<T: ?Sized> Interner<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Interner {
            handles: HashMap::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Stores `value` unless an equal value is already stored, and returns
    /// its handle.
    pub fn intern(&mut self, value: &T) -> Interned<T>
    where
        T: Eq + Hash + ToOwned,
        T::Owned: Into<Rc<T>>,
    {
        if let Some(handle) = self.find(value) {
            return handle;
        }
        let handle = u32::try_from(self.values.len() + 1)
            .ok()
            .and_then(NonZeroU32::new)
            .expect("interned out of capacity");
        let value: Rc<T> = value.to_owned().into();
        self.values.push(Rc::clone(&value));
        self.handles.insert(value, handle);
        Interned::from_handle(handle)
    }

    /// The handle of `value`, if it has been interned.
    pub fn find(&self, value: &T) -> Option<Interned<T>>
    where
        T: Eq + Hash,
    {
        self.handles.get(value).copied().map(Interned::from_handle)
    }

    /// The value behind `handle`. Panics on handles of another interner.
    pub fn get(&self, handle: impl Into<Interned<T>>) -> &T {
        &self.values[handle.into().index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_values_share_a_handle() {
        let mut i = Interner::<str>::with_capacity(3);
        let a = i.intern("balance");
        let b = i.intern("owner");
        let c = i.intern("balance");

        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(i.get(a), "balance");
        assert_eq!(i.get(&b), "owner");
        assert_eq!(i.len(), 2);
    }

    #[test]
    fn find_does_not_intern() {
        let mut i = Interner::<str>::default();
        assert!(i.is_empty());
        assert_eq!(i.find("A.f"), None);
        let qname = i.intern("A.f");
        assert_eq!(i.find("A.f"), Some(qname));
        assert_eq!(i.len(), 1);
    }

    #[test]
    fn handles_order_by_first_interning() {
        let mut i = Interner::<str>::default();
        let z = i.intern("z");
        let a = i.intern("a");
        assert!(z < a);
        assert_eq!(format!("{z:?}"), "#1");
    }
}
