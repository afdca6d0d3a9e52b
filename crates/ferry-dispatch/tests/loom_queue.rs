//! 交接队列的 Loom 并发模型。
//!
//! 容量为 1 时生产者必然在第二次 `push` 上等待消费者腾出槽位，
//! 模型穷举所有交错，断言不存在丢失唤醒（死锁）且顺序保持 FIFO。
#![cfg(loom)]

use std::num::NonZeroUsize;

use ferry_dispatch::BoundedQueue;
use loom::sync::Arc;
use loom::thread;

#[test]
fn producer_waits_for_consumer_on_single_slot() {
    loom::model(|| {
        let queue = Arc::new(BoundedQueue::new(NonZeroUsize::MIN));

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                queue.push(1u8);
                queue.push(2u8);
            })
        };

        assert_eq!(queue.pop(), 1);
        assert_eq!(queue.pop(), 2);
        producer.join().unwrap();
        assert!(queue.is_empty());
    });
}

#[test]
fn two_consumers_share_two_items() {
    loom::model(|| {
        let queue = Arc::new(BoundedQueue::new(NonZeroUsize::MIN));

        let consumers: Vec<_> = (0..2)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || queue.pop())
            })
            .collect();

        queue.push(10u32);
        queue.push(20u32);

        let mut seen: Vec<u32> = consumers.into_iter().map(|c| c.join().unwrap()).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![10, 20]);
    });
}
