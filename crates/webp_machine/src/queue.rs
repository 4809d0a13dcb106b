//! Pending work queue shared by overlapping document scans.

/// LIFO-by-batch, FIFO-within-batch queue.
///
/// Items are kept as a stack of reversed batches: the newest batch sits at the
/// end of the buffer, so popping from the end yields the newest batch first and
/// its items in their original order.
#[derive(Debug)]
pub struct PendingQueue<T> {
    items: Vec<T>,
}

impl<T> Default for PendingQueue<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> PendingQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a batch ahead of everything already queued.
    pub fn enqueue<I>(&mut self, batch: I)
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: DoubleEndedIterator,
    {
        self.items.extend(batch.into_iter().rev());
    }

    /// Remove the front item; `None` once the queue is drained.
    pub fn dequeue(&mut self) -> Option<T> {
        self.items.pop()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop everything still queued, returning how many items were discarded.
    pub fn clear(&mut self) -> usize {
        let discarded = self.items.len();
        self.items.clear();
        discarded
    }
}
