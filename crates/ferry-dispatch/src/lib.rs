#![doc = r#"
# ferry-dispatch

## 设计动机（Why）
- **定位**：在 [`ferry_net`] 的套接字抽象之上组装一条完整的连接分发流水线：
  单个接收线程、有界交接队列、固定数量的工作线程，以及一个非阻塞出站连接器。
- **背压**：队列满时接收线程挂起在 [`BoundedQueue::push`] 上，工作线程饱和不会造成无界扇入。

## 核心契约（What）
- **所有权**：连接从接收到关闭只属于一个持有者：接收线程 → 队列 → 某个工作线程；
- **隔离**：处理器返回错误或 panic 只影响当前连接，连接照常关闭，工作线程继续服务；
- **错误策略**：`WouldBlock` 与资源耗尽不会终止接收循环，其余错误由
  [`Service::run`] 以 [`DispatchError::Accept`] 返回。

## 实现策略（How）
- 队列为定长环形缓冲区，由一把互斥锁与两个条件变量保护，等待均在循环中复查条件；
- `--cfg loom` 下同步原语替换为 Loom 实现，用于模型检验；
- 日志统一经由 `tracing`，宿主可调用 [`telemetry::install`] 获得默认订阅器。

## 风险与考量（Trade-offs）
- 服务没有停机流程：工作线程与服务同寿，`run` 返回后仍阻塞在空队列上。
"#]
#![deny(unsafe_code)]

mod acceptor;
mod config;
mod connection;
mod connector;
mod error;
mod handler;
mod listener;
mod queue;
mod service;
pub mod telemetry;
mod worker;

pub use acceptor::{AcceptSource, Acceptor, AcceptorStats};
pub use config::{ConfigError, ConnectorConfig, ServiceConfig};
pub use connection::{Close, Connection};
pub use connector::{ConnectOutcome, Connector, PendingConnect};
pub use error::{DispatchError, HandlerError};
pub use handler::ConnectionHandler;
pub use listener::Listener;
pub use queue::{BoundedQueue, Full};
pub use service::Service;
pub use worker::WorkerPool;

pub use ferry_net::{AddressFamily, ErrorClass, NetError};
