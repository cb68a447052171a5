//! Property-based tests for the lock-free queues.

use std::collections::VecDeque;

use proptest::prelude::*;
use spatia_io::spsc::{block_channel, queue};

#[derive(Debug, Clone, Copy)]
enum Op {
    Produce,
    Consume,
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(prop_oneof![Just(Op::Produce), Just(Op::Consume)], 0..200)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// The queue behaves like a bounded FIFO: every consumed item was
    /// produced, none twice, in order, and `count` is produced minus consumed.
    #[test]
    fn queue_matches_bounded_fifo(capacity in 1usize..16, ops in ops()) {
        let (mut tx, mut rx) = queue::<u32>(capacity);
        let mut model = VecDeque::new();
        let mut next = 0u32;

        for op in ops {
            match op {
                Op::Produce => {
                    let result = tx.produce(next);
                    if model.len() < capacity {
                        prop_assert_eq!(result, Ok(()));
                        model.push_back(next);
                    } else {
                        prop_assert_eq!(result, Err(next));
                    }
                    next += 1;
                }
                Op::Consume => {
                    prop_assert_eq!(rx.consume(), model.pop_front());
                }
            }
            prop_assert_eq!(tx.count(), model.len());
            prop_assert_eq!(rx.count(), model.len());
        }
    }

    /// `count` after N produces and M consumes (M <= N) is N - M.
    #[test]
    fn count_is_produced_minus_consumed(n in 0usize..64, m in 0usize..64) {
        let m = m.min(n);
        let (mut tx, mut rx) = queue::<usize>(64);
        for i in 0..n {
            prop_assert!(tx.produce(i).is_ok());
        }
        for _ in 0..m {
            prop_assert!(rx.consume().is_some());
        }
        prop_assert_eq!(rx.count(), n - m);
        prop_assert_eq!(tx.count(), n - m);
    }

    /// Blocks are conserved: whatever the interleaving of sends and receives,
    /// in-flight plus free blocks always equals the channel size.
    #[test]
    fn block_channel_conserves_blocks(num_blocks in 1usize..8, ops in ops()) {
        let (mut tx, mut rx) = block_channel(num_blocks, 4);
        let mut sent = 0usize;
        let mut received = 0usize;

        for op in ops {
            match op {
                Op::Produce => {
                    if let Some(mut block) = tx.acquire() {
                        block.fill(sent as f32);
                        prop_assert!(tx.send(block).is_ok());
                        sent += 1;
                    } else {
                        prop_assert_eq!(tx.queued(), num_blocks);
                    }
                }
                Op::Consume => {
                    if let Some(block) = rx.receive() {
                        prop_assert_eq!(block[0], received as f32);
                        prop_assert!(rx.release(block).is_ok());
                        received += 1;
                    } else {
                        prop_assert_eq!(sent, received);
                    }
                }
            }
            prop_assert_eq!(rx.queued(), sent - received);
        }
    }
}
