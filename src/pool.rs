//! A small reuse pool for scratch byte buffers, so the steady-state send and
//! receive paths don't hit the allocator. See [`BufferPool`].

/// A stack of previously-used buffers, handed out cleared and taken back on
/// [`Drop`].
#[derive(Debug, Default)]
pub struct BufferPool {
    free: Vec<Vec<u8>>,
}

impl BufferPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self { free: Vec::new() }
    }

    /// Takes a buffer from the pool, or allocates a new one if the pool is
    /// empty. The returned buffer is always empty (`len() == 0`).
    pub fn take(&mut self) -> Vec<u8> {
        let mut buf = self.free.pop().unwrap_or_default();
        buf.clear();
        buf
    }

    /// Returns a buffer to the pool for later reuse.
    pub fn give(&mut self, buf: Vec<u8>) {
        self.free.push(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_given_buffers() {
        let mut pool = BufferPool::new();
        let mut buf = pool.take();
        buf.extend_from_slice(b"hello");
        pool.give(buf);

        let buf = pool.take();
        assert_eq!(buf.len(), 0);
        assert!(buf.capacity() >= 5);
    }

    #[test]
    fn take_on_empty_pool_allocates() {
        let mut pool = BufferPool::new();
        let buf = pool.take();
        assert!(buf.is_empty());
    }
}
