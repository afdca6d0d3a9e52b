use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info};

use crate::acceptor::{Acceptor, AcceptorStats};
use crate::config::ServiceConfig;
use crate::connection::Connection;
use crate::error::DispatchError;
use crate::handler::ConnectionHandler;
use crate::listener::Listener;
use crate::queue::BoundedQueue;
use crate::worker::WorkerPool;

/// 一个完整的接收服务：监听套接字、交接队列、工作线程池与接收循环。
///
/// # 教案式注释
///
/// ## 逻辑 (How)
/// - [`bind`](Self::bind)：校验配置 → 绑定监听 → 创建队列 → 启动工作线程池；
/// - [`run`](Self::run)：在调用线程上运行接收循环，直到致命错误。
///
/// ## 契约 (What)
/// - 所有运行状态都由该值持有，同一进程内可并存多个服务；
/// - `run` 返回时监听套接字随之关闭；工作线程继续阻塞在空队列上。
#[derive(Debug)]
pub struct Service {
    acceptor: Acceptor<Listener>,
    queue: Arc<BoundedQueue<Connection>>,
    pool: WorkerPool,
    local_addr: SocketAddr,
}

impl Service {
    pub fn bind<H>(config: ServiceConfig, handler: H) -> Result<Self, DispatchError>
    where
        H: ConnectionHandler<Connection>,
    {
        let config = config.validate()?;
        let listener = Listener::bind(&config)?;
        let local_addr = listener.local_addr();
        let queue = Arc::new(BoundedQueue::new(config.queue_capacity));
        let pool = WorkerPool::spawn(config.workers, Arc::clone(&queue), Arc::new(handler))?;
        info!(
            %local_addr,
            workers = pool.size(),
            queue_capacity = queue.capacity(),
            "service ready"
        );
        Ok(Self {
            acceptor: Acceptor::new(listener, Arc::clone(&queue), config.exhaustion_backoff()),
            queue,
            pool,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn queue(&self) -> Arc<BoundedQueue<Connection>> {
        Arc::clone(&self.queue)
    }

    pub fn stats(&self) -> Arc<AcceptorStats> {
        self.acceptor.stats()
    }

    pub fn workers(&self) -> usize {
        self.pool.size()
    }

    /// 运行接收循环；只在致命错误时返回。
    pub fn run(self) -> DispatchError {
        let err = self.acceptor.run();
        error!(local_addr = %self.local_addr, code = err.code(), "service stopped");
        DispatchError::Accept(err)
    }
}
