use std::any::Any;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, warn};

use crate::connection::Close;
use crate::error::DispatchError;
use crate::handler::ConnectionHandler;
use crate::queue::BoundedQueue;

/// 固定数量的长驻工作线程。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 请求级别的工作通过队列传递，而非每条连接创建/回收线程；线程在启动时一次性创建，
///   生命周期与服务相同。
///
/// ## 逻辑 (How)
/// - 每个线程循环执行 `pop → handle → close`；
/// - 处理器以 `catch_unwind` 包裹：返回错误记录为 `warn`，panic 记录为 `error`，
///   两种情况下连接都被关闭恰好一次，线程继续服务下一条连接；
/// - 关闭失败仅记录日志。
///
/// ## 契约 (What)
/// - 从出队到关闭之间，连接只被一个工作线程持有；
/// - 工作线程不会自行退出；任一线程创建失败时返回 [`DispatchError::Spawn`]，
///   已创建的线程继续阻塞在空队列上，不会处理任何连接。
#[derive(Debug)]
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn<C, H>(
        size: NonZeroUsize,
        queue: Arc<BoundedQueue<C>>,
        handler: Arc<H>,
    ) -> Result<Self, DispatchError>
    where
        C: Close,
        H: ConnectionHandler<C>,
    {
        let mut handles = Vec::with_capacity(size.get());
        for index in 0..size.get() {
            let queue = Arc::clone(&queue);
            let handler = Arc::clone(&handler);
            let handle = thread::Builder::new()
                .name(format!("ferry-worker-{index}"))
                .spawn(move || serve(index, &queue, handler.as_ref()))
                .map_err(|source| DispatchError::Spawn { index, source })?;
            handles.push(handle);
        }
        debug!(workers = handles.len(), "worker pool started");
        Ok(Self { handles })
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }
}

fn serve<C, H>(worker: usize, queue: &BoundedQueue<C>, handler: &H)
where
    C: Close,
    H: ConnectionHandler<C>,
{
    loop {
        let mut conn = queue.pop();
        let peer = conn.peer_addr();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&mut conn)));
        match outcome {
            Ok(Ok(())) => debug!(worker, ?peer, "connection handled"),
            Ok(Err(err)) => warn!(worker, ?peer, error = %err, "connection handler failed"),
            Err(payload) => error!(
                worker,
                ?peer,
                panic = panic_message(payload.as_ref()),
                "connection handler panicked"
            ),
        }
        if let Err(err) = conn.close() {
            warn!(worker, ?peer, code = err.code(), error = %err, "closing connection failed");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use ferry_net::NetError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    /// 记录关闭次数的测试连接。
    struct Probe {
        id: u32,
        closes: Arc<AtomicUsize>,
        closed: mpsc::Sender<u32>,
    }

    impl Close for Probe {
        fn close(self) -> Result<(), NetError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            let _ = self.closed.send(self.id);
            Ok(())
        }
    }

    fn queue_of(capacity: usize) -> Arc<BoundedQueue<Probe>> {
        Arc::new(BoundedQueue::new(NonZeroUsize::new(capacity).unwrap()))
    }

    fn probes(ids: &[u32]) -> (Vec<Probe>, Arc<AtomicUsize>, mpsc::Receiver<u32>) {
        let closes = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();
        let probes = ids
            .iter()
            .map(|&id| Probe {
                id,
                closes: Arc::clone(&closes),
                closed: tx.clone(),
            })
            .collect();
        (probes, closes, rx)
    }

    fn collect(rx: &mpsc::Receiver<u32>, n: usize) -> Vec<u32> {
        let mut seen: Vec<u32> = (0..n)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        seen.sort_unstable();
        seen
    }

    #[test]
    fn failing_and_panicking_handlers_do_not_stop_the_worker() {
        let queue = queue_of(8);
        let handled = Arc::new(AtomicUsize::new(0));
        let handler = {
            let handled = Arc::clone(&handled);
            move |probe: &mut Probe| -> Result<(), HandlerError> {
                handled.fetch_add(1, Ordering::SeqCst);
                match probe.id {
                    1 => Err(HandlerError::new("rejected")),
                    2 => panic!("handler blew up"),
                    _ => Ok(()),
                }
            }
        };
        let pool = WorkerPool::spawn(NonZeroUsize::MIN, Arc::clone(&queue), Arc::new(handler))
            .unwrap();
        assert_eq!(pool.size(), 1);

        let (items, closes, rx) = probes(&[1, 2, 3]);
        for item in items {
            queue.push(item);
        }

        assert_eq!(collect(&rx, 3), vec![1, 2, 3]);
        assert_eq!(handled.load(Ordering::SeqCst), 3);
        assert_eq!(closes.load(Ordering::SeqCst), 3);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn every_connection_is_closed_exactly_once_across_workers() {
        let queue = queue_of(4);
        let handler = |_: &mut Probe| -> Result<(), HandlerError> { Ok(()) };
        let _pool =
            WorkerPool::spawn(NonZeroUsize::new(4).unwrap(), Arc::clone(&queue), Arc::new(handler))
                .unwrap();

        let ids: Vec<u32> = (0..200).collect();
        let (items, closes, rx) = probes(&ids);
        for item in items {
            queue.push(item);
        }

        assert_eq!(collect(&rx, ids.len()), ids);
        assert_eq!(closes.load(Ordering::SeqCst), ids.len());
    }

    #[test]
    fn panic_payloads_render_as_text() {
        let boxed: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(boxed.as_ref()), "static message");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(boxed.as_ref()), "owned message");
        let boxed: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(boxed.as_ref()), "non-string panic payload");
    }
}
