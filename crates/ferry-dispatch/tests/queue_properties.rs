//! 交接队列的模型对照性质测试。
//!
//! 以 `VecDeque` 作为影子模型，对任意 `try_push` / `try_pop` 操作序列断言：
//! - 出队顺序与入队顺序一致（FIFO）；
//! - 队列满时 `try_push` 原样退回元素，且队列长度从不超过容量；
//! - `len` / `is_empty` / `is_full` 与模型保持一致。
#![cfg(not(loom))]

use std::collections::VecDeque;
use std::num::NonZeroUsize;

use ferry_dispatch::BoundedQueue;
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Op {
    Push(u32),
    Pop,
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![any::<u32>().prop_map(Op::Push), Just(Op::Pop)],
        0..256,
    )
}

proptest! {
    #[test]
    fn prop_queue_matches_fifo_model(capacity in 1usize..16, ops in ops()) {
        let queue = BoundedQueue::new(NonZeroUsize::new(capacity).unwrap());
        let mut model = VecDeque::new();

        for op in ops {
            match op {
                Op::Push(value) => {
                    let outcome = queue.try_push(value);
                    if model.len() == capacity {
                        prop_assert_eq!(outcome.map_err(|full| full.into_inner()), Err(value));
                    } else {
                        prop_assert!(outcome.is_ok());
                        model.push_back(value);
                    }
                }
                Op::Pop => prop_assert_eq!(queue.try_pop(), model.pop_front()),
            }
            prop_assert_eq!(queue.len(), model.len());
            prop_assert!(queue.len() <= queue.capacity());
            prop_assert_eq!(queue.is_empty(), model.is_empty());
            prop_assert_eq!(queue.is_full(), model.len() == capacity);
        }

        let drained: Vec<u32> = std::iter::from_fn(|| queue.try_pop()).collect();
        prop_assert_eq!(drained, Vec::from(model));
    }
}
