use std::collections::HashMap;

use tracing::trace;

use crate::meta::align_up;

/// Alignment of every datum in the segment.
const DATA_ALIGN: u32 = 8;

/// Constant data of a module, addressed from zero.
///
/// Identical byte sequences are stored once.
#[derive(Debug, Default)]
pub struct Segment {
    data: Vec<Datum>,
    index: HashMap<Box<[u8]>, u32>,
    size: u32,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Datum {
    pub addr: u32,
    pub bytes: Box<[u8]>,
}

impl Segment {
    pub fn new() -> Segment {
        Segment::default()
    }

    /// Adds `bytes`, returning their address.
    pub fn intern(&mut self, bytes: &[u8]) -> u32 {
        if let Some(&addr) = self.index.get(bytes) {
            return addr;
        }
        let addr = align_up(self.size, DATA_ALIGN);
        let len = u32::try_from(bytes.len()).expect("segment out of capacity");
        self.size = addr + len;
        self.index.insert(bytes.into(), addr);
        self.data.push(Datum {
            addr,
            bytes: bytes.into(),
        });
        trace!(addr, len, "interned datum");
        addr
    }

    /// Adds the NUL-terminated contents of a string literal, decoding its
    /// escape sequences.
    pub fn intern_str(&mut self, raw: &str) -> u32 {
        let mut bytes = unescape(raw);
        bytes.push(0);
        self.intern(&bytes)
    }

    pub fn get(&self, addr: u32) -> Option<&Datum> {
        self.data.iter().find(|datum| datum.addr == addr)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Datum> {
        self.data.iter()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Total bytes spanned, padding included.
    pub fn size(&self) -> u32 {
        self.size
    }
}

fn unescape(raw: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('n') => out.push(b'\n'),
            Some('t') => out.push(b'\t'),
            Some('r') => out.push(b'\r'),
            Some('0') => out.push(0),
            Some(other) => {
                let mut buf = [0; 4];
                out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
            None => out.push(b'\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_strings_share_an_address() {
        let mut sgmt = Segment::new();
        let a = sgmt.intern_str("hello");
        let b = sgmt.intern_str("world");
        let c = sgmt.intern_str("hello");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(sgmt.len(), 2);
    }

    #[test]
    fn addresses_are_aligned() {
        let mut sgmt = Segment::new();
        assert_eq!(sgmt.intern(b"abc"), 0);
        assert_eq!(sgmt.intern(b"de"), 8);
        assert_eq!(sgmt.size(), 10);
        assert_eq!(sgmt.get(8).map(|d| &*d.bytes), Some(&b"de"[..]));
    }

    #[test]
    fn escapes_are_decoded() {
        let mut sgmt = Segment::new();
        let addr = sgmt.intern_str(r#"a\n\"b\\"#);
        assert_eq!(sgmt.get(addr).map(|d| &*d.bytes), Some(&b"a\n\"b\\\0"[..]));
    }
}
