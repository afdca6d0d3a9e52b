use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use ferry_net::{ErrorClass, NetError};
use tracing::{error, info, trace, warn};

use crate::connection::Close;
use crate::queue::BoundedQueue;

/// 接收循环的连接来源。
///
/// 真实实现为 [`Listener`](crate::Listener)；该 trait 使循环策略可以脱离真实套接字单独验证。
pub trait AcceptSource: Send {
    type Conn: Close;

    /// 以非阻塞方式接受一条连接。
    fn accept(&self) -> Result<Self::Conn, NetError>;

    /// `accept` 报告 `WouldBlock` 后、再次尝试前调用；默认立即返回。
    fn await_incoming(&self) -> Result<(), NetError> {
        Ok(())
    }

    /// 对新连接做尽力而为的加固（例如复用提示），失败只记录日志。
    fn harden(&self, _conn: &mut Self::Conn) {}
}

/// 接收循环的计数器。
#[derive(Debug, Default)]
pub struct AcceptorStats {
    accepted: AtomicU64,
    would_block: AtomicU64,
    exhausted: AtomicU64,
}

impl AcceptorStats {
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn would_block(&self) -> u64 {
        self.would_block.load(Ordering::Relaxed)
    }

    pub fn exhausted(&self) -> u64 {
        self.exhausted.load(Ordering::Relaxed)
    }
}

/// 拥有连接来源并把接受到的连接推入交接队列的循环。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 接收与处理解耦：接收线程只做分类与交接，处理交给工作线程池；
/// - 交接队列满时 `push` 挂起接收线程，这是有意为之的背压，阻止工作线程饱和时的无界扇入。
///
/// ## 逻辑 (How)
/// 1. 以非阻塞方式 `accept`；
/// 2. `WouldBlock`（含对端在接受前撤回）：等待来源就绪后继续；等待本身的失败
///    按下面同样的分类处理；
/// 3. `ResourceExhausted`（无论来自 `accept` 还是就绪等待）：记录告警，退避 `backoff` 后继续；
/// 4. 其余错误：记录错误并终止循环，这是唯一的致命退出路径；
/// 5. 成功：尽力加固、记录对端地址，然后 `push` 入队。
///
/// ## 契约 (What)
/// - [`run`](Self::run) 只在致命错误时返回，返回值即该错误；
/// - 计数器只增不减，可在其他线程读取。
pub struct Acceptor<S: AcceptSource> {
    source: S,
    queue: Arc<BoundedQueue<S::Conn>>,
    backoff: Duration,
    stats: Arc<AcceptorStats>,
}

impl<S: AcceptSource> Acceptor<S> {
    pub fn new(source: S, queue: Arc<BoundedQueue<S::Conn>>, backoff: Duration) -> Self {
        Self {
            source,
            queue,
            backoff,
            stats: Arc::new(AcceptorStats::default()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn stats(&self) -> Arc<AcceptorStats> {
        Arc::clone(&self.stats)
    }

    /// 运行接收循环，直到遇到致命错误。
    pub fn run(&self) -> NetError {
        loop {
            let err = match self.source.accept() {
                Ok(conn) => {
                    self.hand_off(conn);
                    continue;
                }
                Err(err) if err.class() == ErrorClass::WouldBlock => {
                    self.stats.would_block.fetch_add(1, Ordering::Relaxed);
                    trace!("no pending connection");
                    match self.source.await_incoming() {
                        Ok(()) => continue,
                        Err(err) => err,
                    }
                }
                Err(err) => err,
            };
            if let Some(fatal) = self.recover(err) {
                return fatal;
            }
        }
    }

    /// 按错误分类决定循环是否继续；`accept` 与就绪等待的失败走同一套策略。
    fn recover(&self, err: NetError) -> Option<NetError> {
        match err.class() {
            ErrorClass::WouldBlock | ErrorClass::Interrupted => {
                trace!(code = err.code(), "transient wait failure; retrying");
                None
            }
            ErrorClass::ResourceExhausted => {
                self.stats.exhausted.fetch_add(1, Ordering::Relaxed);
                warn!(
                    code = err.code(),
                    error = %err,
                    backoff_ms = self.backoff.as_millis() as u64,
                    "resource exhausted while accepting; backing off"
                );
                if !self.backoff.is_zero() {
                    thread::sleep(self.backoff);
                }
                None
            }
            _ => {
                error!(code = err.code(), error = %err, "accept failed; closing accept loop");
                Some(err)
            }
        }
    }

    fn hand_off(&self, mut conn: S::Conn) {
        self.source.harden(&mut conn);
        self.stats.accepted.fetch_add(1, Ordering::Relaxed);
        match conn.peer_addr() {
            Some(peer) => info!(%peer, "accepted connection"),
            None => info!("accepted connection"),
        }
        self.queue.push(conn);
    }
}

impl<S: AcceptSource + fmt::Debug> fmt::Debug for Acceptor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acceptor")
            .field("source", &self.source)
            .field("queue", &self.queue)
            .field("backoff", &self.backoff)
            .field("stats", &self.stats)
            .finish()
    }
}
