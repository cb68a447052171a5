//! Lock-free single-producer/single-consumer queues.
//!
//! [`queue`] is a bounded wait-free FIFO over [`rtrb`]. Each half is owned by
//! exactly one thread; neither side blocks: a full queue hands the item back
//! and an empty queue returns `None`.
//!
//! [`block_channel`] builds the pair of queues the live engine moves audio
//! blocks through. Blocks circulate between a forward queue and a recycle
//! queue that is preloaded at construction, so in steady state neither thread
//! allocates or frees memory:
//!
//! ```text
//!            acquire            send
//! recycle ──────────► sender ──────────► forward
//!    ▲                                      │
//!    │ release                      receive │
//!    └─────────────── receiver ◄────────────┘
//! ```

use rtrb::{PushError, RingBuffer};

/// Sending half of a [`queue`].
pub struct Producer<T> {
    inner: rtrb::Producer<T>,
}

/// Receiving half of a [`queue`].
pub struct Consumer<T> {
    inner: rtrb::Consumer<T>,
}

/// Creates a bounded SPSC queue holding at most `capacity` items.
pub fn queue<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    let (producer, consumer) = RingBuffer::new(capacity);
    (Producer { inner: producer }, Consumer { inner: consumer })
}

impl<T> Producer<T> {
    /// Appends an item. Hands it back if the queue is full.
    #[inline]
    pub fn produce(&mut self, item: T) -> Result<(), T> {
        self.inner.push(item).map_err(|PushError::Full(item)| item)
    }

    /// Items currently queued.
    #[inline]
    pub fn count(&self) -> usize {
        self.capacity() - self.inner.slots()
    }

    /// Maximum number of queued items.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.buffer().capacity()
    }

    /// Returns `true` if `produce` would fail.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.inner.is_full()
    }

    /// Returns `true` once the consumer has been dropped.
    pub fn is_abandoned(&self) -> bool {
        self.inner.is_abandoned()
    }
}

impl<T> Consumer<T> {
    /// Removes the oldest item, or returns `None` if the queue is empty.
    #[inline]
    pub fn consume(&mut self) -> Option<T> {
        self.inner.pop().ok()
    }

    /// Items currently queued.
    #[inline]
    pub fn count(&self) -> usize {
        self.inner.slots()
    }

    /// Maximum number of queued items.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.buffer().capacity()
    }

    /// Returns `true` if nothing is queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns `true` once the producer has been dropped.
    pub fn is_abandoned(&self) -> bool {
        self.inner.is_abandoned()
    }

    /// Drops every queued item and returns how many there were.
    ///
    /// Only meaningful while the producer is quiescent; items produced
    /// concurrently may or may not be drained.
    pub fn reset(&mut self) -> usize {
        let mut drained = 0;
        while self.inner.pop().is_ok() {
            drained += 1;
        }
        drained
    }
}

/// One interleaved or planar audio block moved through a [`block_channel`].
pub type Block = Box<[f32]>;

/// Creates a block channel with `num_blocks` zeroed blocks of `block_len`
/// samples each, all initially in the recycle queue.
pub fn block_channel(num_blocks: usize, block_len: usize) -> (BlockSender, BlockReceiver) {
    let num_blocks = num_blocks.max(1);
    let (forward_tx, forward_rx) = queue(num_blocks);
    let (mut recycle_tx, recycle_rx) = queue(num_blocks);
    for _ in 0..num_blocks {
        // capacity equals the block count, so preloading cannot fail
        let _ = recycle_tx.produce(vec![0.0; block_len].into_boxed_slice());
    }
    let sender = BlockSender {
        forward: forward_tx,
        recycle: recycle_rx,
        spare: None,
        block_len,
    };
    let receiver = BlockReceiver {
        forward: forward_rx,
        recycle: recycle_tx,
        block_len,
    };
    (sender, receiver)
}

/// Producer side of a [`block_channel`].
pub struct BlockSender {
    forward: Producer<Block>,
    recycle: Consumer<Block>,
    spare: Option<Block>,
    block_len: usize,
}

impl BlockSender {
    /// Takes a free block to fill, or `None` if every block is in flight.
    ///
    /// The block holds whatever it carried last; callers overwrite it.
    #[inline]
    pub fn acquire(&mut self) -> Option<Block> {
        self.spare.take().or_else(|| self.recycle.consume())
    }

    /// Queues a filled block. Hands it back if the forward queue is full.
    #[inline]
    pub fn send(&mut self, block: Block) -> Result<(), Block> {
        self.forward.produce(block)
    }

    /// Returns an acquired block unsent; the next `acquire` yields it again.
    #[inline]
    pub fn give_back(&mut self, block: Block) {
        self.spare = Some(block);
    }

    /// Blocks sent and not yet received.
    #[inline]
    pub fn queued(&self) -> usize {
        self.forward.count()
    }

    /// Samples per block.
    pub fn block_len(&self) -> usize {
        self.block_len
    }
}

/// Consumer side of a [`block_channel`].
pub struct BlockReceiver {
    forward: Consumer<Block>,
    recycle: Producer<Block>,
    block_len: usize,
}

impl BlockReceiver {
    /// Takes the oldest sent block, or `None` if none is queued.
    #[inline]
    pub fn receive(&mut self) -> Option<Block> {
        self.forward.consume()
    }

    /// Hands a received block back to the sender for reuse.
    ///
    /// Never fails for blocks that came from this channel: the recycle queue
    /// has room for every block.
    #[inline]
    pub fn release(&mut self, block: Block) -> Result<(), Block> {
        self.recycle.produce(block)
    }

    /// Blocks sent and not yet received.
    #[inline]
    pub fn queued(&self) -> usize {
        self.forward.count()
    }

    /// Receives and releases every queued block. Returns how many were
    /// discarded.
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;
        while let Some(block) = self.forward.consume() {
            let _ = self.recycle.produce(block);
            drained += 1;
        }
        drained
    }

    /// Samples per block.
    pub fn block_len(&self) -> usize {
        self.block_len
    }
}
