use std::{cell::RefCell, io};

/// Lets a `serde_json::Serializer` append to a `String` that the formatter keeps access to.
pub(crate) struct Cursor<'buf> {
    inner: RefCell<&'buf mut String>,
    start: usize,
}

impl io::Write for &Cursor<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s =
            std::str::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        self.inner.borrow_mut().push_str(s);

        Ok(s.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'buf> Cursor<'buf> {
    pub(crate) fn new(inner: &'buf mut String) -> Self {
        let start = inner.len();
        Self {
            inner: RefCell::new(inner),
            start,
        }
    }

    pub(crate) fn push(&self, c: char) {
        self.inner.borrow_mut().push(c);
    }

    /// Drops everything written through this cursor.
    pub(crate) fn rollback(&self) {
        self.inner.borrow_mut().truncate(self.start);
    }
}
