use tracing::trace;

/// Recycles packed-pixel allocations between frames.
///
/// A buffer only comes back through [`BufferPool::give`] once the frame that
/// used it has been fully encoded, so nothing still referenced is handed out.
#[derive(Debug)]
pub struct BufferPool {
    free: Vec<Vec<u8>>,
    max_pooled: usize,
    allocations: u64,
}

impl BufferPool {
    pub fn new(max_pooled: usize) -> Self {
        Self {
            free: Vec::with_capacity(max_pooled),
            max_pooled,
            allocations: 0,
        }
    }

    pub fn take(&mut self) -> Vec<u8> {
        match self.free.pop() {
            Some(buf) => buf,
            None => {
                self.allocations += 1;
                trace!("Buffer pool empty, allocation #{}", self.allocations);
                Vec::new()
            }
        }
    }

    pub fn give(&mut self, mut buf: Vec<u8>) {
        if self.free.len() < self.max_pooled {
            buf.clear();
            self.free.push(buf);
        }
    }

    /// Number of times `take` found the pool empty.
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    pub fn pooled(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffers_are_recycled() {
        let mut pool = BufferPool::new(2);
        let mut buf = pool.take();
        buf.extend_from_slice(&[1, 2, 3]);
        let ptr = buf.as_ptr();

        pool.give(buf);
        let again = pool.take();
        assert!(again.is_empty());
        assert_eq!(again.as_ptr(), ptr);
        assert_eq!(pool.allocations(), 1);
    }

    #[test]
    fn test_pool_is_bounded() {
        let mut pool = BufferPool::new(1);
        pool.give(vec![0; 8]);
        pool.give(vec![0; 8]);
        assert_eq!(pool.pooled(), 1);

        let mut disabled = BufferPool::new(0);
        disabled.give(vec![0; 8]);
        assert_eq!(disabled.pooled(), 0);
    }
}
