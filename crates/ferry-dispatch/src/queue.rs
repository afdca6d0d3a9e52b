use std::fmt;
use std::num::NonZeroUsize;
use std::sync::PoisonError;

#[cfg(not(loom))]
use std::sync::{Condvar, Mutex, MutexGuard};

#[cfg(loom)]
use loom::sync::{Condvar, Mutex, MutexGuard};

/// 定长槽位数组与读游标、占用计数组成的环形存储。
///
/// 写游标由 `(head + len) % capacity` 推导，因此“满”（`len == capacity`）与
/// “空”（`len == 0`）对任意容量都能无歧义区分，且全部槽位可用。
struct Ring<T> {
    slots: Box<[Option<T>]>,
    head: usize,
    len: usize,
}

impl<T> Ring<T> {
    fn with_capacity(capacity: NonZeroUsize) -> Self {
        let slots = (0..capacity.get()).map(|_| None).collect();
        Self {
            slots,
            head: 0,
            len: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// 前置条件：未满。
    fn put(&mut self, item: T) {
        debug_assert!(!self.is_full());
        let tail = (self.head + self.len) % self.capacity();
        debug_assert!(self.slots[tail].is_none());
        self.slots[tail] = Some(item);
        self.len += 1;
    }

    fn take(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let item = self.slots[self.head].take();
        debug_assert!(item.is_some());
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;
        item
    }
}

/// [`BoundedQueue::try_push`] 在队列已满时退回的元素。
pub struct Full<T>(pub T);

impl<T> Full<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Full(..)")
    }
}

/// 接收器与工作线程之间的有界交接队列。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 在接收器与固定数量的工作线程之间提供背压：工作线程饱和时，`push` 挂起接收线程，
///   避免无界扇入；
/// - 通过按值移动元素保证单一所有权：在队列中的连接不属于任何工作线程，出队后恰好属于一个。
///
/// ## 逻辑 (How)
/// - 一把互斥锁保护 [`Ring`]，两个条件变量分别表示“非满”“非空”；
/// - `push`：持锁后 `while full { wait(not_full) }`，写入后唤醒一个消费者；
/// - `pop`：持锁后循环尝试取出，空则 `wait(not_empty)`，取出后唤醒一个生产者；
/// - 每次被唤醒都重新检查谓词：唤醒只是提示，可能是伪唤醒或已被其他线程抢先消费。
///
/// ## 契约 (What)
/// - 容量在构造时固定，`0 ≤ len ≤ capacity`；
/// - FIFO：出队序列与入队序列一致，每次入队恰好对应一次出队，不丢失不重复；
/// - 锁只在 O(1) 的槽位更新期间持有，永不跨越连接处理。
///
/// ## 注意事项 (Trade-offs)
/// - 持锁区间内不存在可能 panic 的用户代码，因此中毒的锁可直接恢复使用；
/// - `notify_one` 足以避免唤醒丢失：每次状态变化只可能让一个等待者的谓词成立。
pub struct BoundedQueue<T> {
    ring: Mutex<Ring<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: NonZeroUsize,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            ring: Mutex::new(Ring::with_capacity(capacity)),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn len(&self) -> usize {
        self.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.lock().is_full()
    }

    /// 入队；队列已满时挂起调用线程直到有空槽。
    pub fn push(&self, item: T) {
        let mut ring = self.lock();
        while ring.is_full() {
            ring = self
                .not_full
                .wait(ring)
                .unwrap_or_else(PoisonError::into_inner);
        }
        ring.put(item);
        drop(ring);
        self.not_empty.notify_one();
    }

    /// 出队；队列为空时挂起调用线程直到有元素。
    pub fn pop(&self) -> T {
        let mut ring = self.lock();
        loop {
            if let Some(item) = ring.take() {
                drop(ring);
                self.not_full.notify_one();
                return item;
            }
            ring = self
                .not_empty
                .wait(ring)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// 非阻塞入队；已满时原样退回元素。
    pub fn try_push(&self, item: T) -> Result<(), Full<T>> {
        let mut ring = self.lock();
        if ring.is_full() {
            return Err(Full(item));
        }
        ring.put(item);
        drop(ring);
        self.not_empty.notify_one();
        Ok(())
    }

    /// 非阻塞出队。
    pub fn try_pop(&self) -> Option<T> {
        let item = self.lock().take()?;
        self.not_full.notify_one();
        Some(item)
    }

    fn lock(&self) -> MutexGuard<'_, Ring<T>> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}
