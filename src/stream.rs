//! Byte sources feeding the streaming dissector.
//!
//! The dissector only ever pulls bytes forward. A source may or may not know how
//! many bytes are still to come: [`ByteSource::remaining`] returns `None` for an
//! open-ended stream.

/// Sequential, append-only source of raw bytes.
pub trait ByteSource {
    /// Bytes still available, or `None` when the length is not known.
    fn remaining(&self) -> Option<usize>;

    /// True when the source is known to hold no further bytes.
    fn is_empty(&self) -> bool {
        self.remaining() == Some(0)
    }

    /// Move up to `max` bytes into `out`; returns the number of bytes moved.
    fn consume(&mut self, max: usize, out: &mut Vec<u8>) -> usize;
}

/// Byte source over a borrowed slice.
///
/// An *open* reader reports an unknown remaining length: it behaves as the prefix of
/// a longer stream whose continuation will be fed in a later call.
#[derive(Debug, Clone)]
pub struct SliceReader<'a> {
    data: &'a [u8],
    pos: usize,
    open: bool,
}

impl<'a> SliceReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        SliceReader {
            data,
            pos: 0,
            open: false,
        }
    }

    /// Reader whose remaining length is reported as unknown.
    pub fn open(data: &'a [u8]) -> Self {
        SliceReader {
            data,
            pos: 0,
            open: true,
        }
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// The unconsumed tail of the slice.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}

impl ByteSource for SliceReader<'_> {
    fn remaining(&self) -> Option<usize> {
        if self.open {
            None
        } else {
            Some(self.data.len() - self.pos)
        }
    }

    fn is_empty(&self) -> bool {
        !self.open && self.pos >= self.data.len()
    }

    fn consume(&mut self, max: usize, out: &mut Vec<u8>) -> usize {
        let n = max.min(self.data.len() - self.pos);
        out.extend_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        n
    }
}

/// View on another source that hands out at most `limit` bytes.
///
/// Used to confine a size-bounded node to its acceptance window.
pub struct Window<'a> {
    inner: &'a mut dyn ByteSource,
    limit: Option<usize>,
}

impl<'a> Window<'a> {
    pub fn new(inner: &'a mut dyn ByteSource, limit: Option<usize>) -> Self {
        Window { inner, limit }
    }
}

impl ByteSource for Window<'_> {
    fn remaining(&self) -> Option<usize> {
        match (self.inner.remaining(), self.limit) {
            (Some(r), Some(l)) => Some(r.min(l)),
            (Some(r), None) => Some(r),
            (None, Some(0)) => Some(0),
            (None, _) => None,
        }
    }

    fn consume(&mut self, max: usize, out: &mut Vec<u8>) -> usize {
        let max = match self.limit {
            Some(l) => max.min(l),
            None => max,
        };
        let n = self.inner.consume(max, out);
        if let Some(l) = self.limit.as_mut() {
            *l -= n;
        }
        n
    }
}
