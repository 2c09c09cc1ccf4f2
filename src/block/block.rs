use super::BlockId;
use std::io;

/// A unit of storage: an identifier plus a fixed-capacity byte region.
///
/// A `Block` is an owned copy of the stored bytes. Blocks handed out by a block manager are
/// "checked out" by the caller until they are given back by value through `release`, `write`,
/// `overwrite` or `free`.
///
/// The block also carries a cursor position, so that it can be filled or consumed through
/// [`io::Write`] and [`io::Read`].
#[derive(Clone, Debug)]
pub struct Block {
    id: BlockId,
    data: Box<[u8]>,
    read_only: bool,
    position: usize,
}

impl Block {
    /// Creates a new writable block with the given id and contents.
    pub fn new(id: BlockId, data: Box<[u8]>) -> Self {
        Self { id, data, read_only: false, position: 0 }
    }

    /// Creates a new writable block of `size` zero bytes.
    pub fn zeroed(id: BlockId, size: usize) -> Self {
        Self::new(id, vec![0; size].into_boxed_slice())
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Returns the capacity of the byte region.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    /// Returns the byte region for modification.
    ///
    /// Modifying a read-only block is allowed, but such a block cannot be written back.
    pub fn contents_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Marks the block as read-only. A block can only be made writable again by promoting it
    /// through its block manager.
    pub fn set_read_only(&mut self) {
        self.read_only = true;
    }

    pub(crate) fn set_writable(&mut self) {
        self.read_only = false;
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Moves the cursor back to the start of the block.
    pub fn rewind(&mut self) {
        self.position = 0;
    }

    /// Zeroes the contents and rewinds the cursor.
    pub fn clear(&mut self) {
        self.data.fill(0);
        self.position = 0;
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.position
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.data == other.data
    }
}

impl Eq for Block {}

impl io::Read for Block {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.remaining());
        buf[..n].copy_from_slice(&self.data[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }
}

impl io::Write for Block {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = buf.len().min(self.remaining());
        self.data[self.position..self.position + n].copy_from_slice(&buf[..n]);
        self.position += n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
