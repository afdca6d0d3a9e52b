use std::net::SocketAddr;

use ferry_net::{Descriptor, ErrorClass, NetError, resolve, wait_readable};
use tracing::{debug, info, warn};

use crate::acceptor::AcceptSource;
use crate::config::ServiceConfig;
use crate::connection::Connection;
use crate::error::DispatchError;

/// 非阻塞监听套接字。
///
/// # 教案式注释
///
/// ## 逻辑 (How)
/// - `bind`：解析被动地址 → 创建非阻塞套接字 → 尽力设置 `SO_REUSEADDR` →
///   绑定并监听；任一致命步骤失败都会先关闭已创建的套接字再返回；
/// - `accept`：以非阻塞模式接受，已接受的套接字同样为非阻塞；
/// - `await_incoming`：在 `poll(2)` 上等待可读，使接收循环在 `WouldBlock` 后不空转。
///
/// ## 契约 (What)
/// - 只有接收线程调用 `accept`；
/// - 地址占用错误经由 [`DispatchError::Listen`] 附带“服务是否已在运行”的提示。
#[derive(Debug)]
pub struct Listener {
    socket: Descriptor,
    local_addr: SocketAddr,
    reuse_accepted: bool,
}

impl Listener {
    pub fn bind(config: &ServiceConfig) -> Result<Self, DispatchError> {
        let listen_err = |source: NetError| DispatchError::Listen {
            port: config.port.clone(),
            source,
        };

        let addr = resolve(config.host.as_deref(), &config.port, config.family)
            .map_err(listen_err)?;
        let socket = Descriptor::tcp_for(&addr, true).map_err(|err| {
            if err.class() != ErrorClass::ResourceExhausted {
                warn!(code = err.code(), error = %err, "listener socket creation failed");
            }
            listen_err(err)
        })?;

        if config.reuse_address
            && let Err(err) = socket.make_reusable()
        {
            warn!(code = err.code(), error = %err, "could not set SO_REUSEADDR on listener; continuing");
        }

        if let Err(err) = socket.bind_and_listen(&addr, config.backlog) {
            if let Some(hint) = err.hint() {
                warn!(port = %config.port, hint, "listener address already in use");
            }
            close_quietly(socket);
            return Err(listen_err(err));
        }

        let local_addr = match socket.local_addr() {
            Ok(local) => local,
            Err(err) => {
                close_quietly(socket);
                return Err(listen_err(err));
            }
        };
        info!(%local_addr, backlog = config.backlog, "listening");
        Ok(Self {
            socket,
            local_addr,
            reuse_accepted: config.reuse_address,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 关闭监听套接字。
    pub fn close(self) -> Result<(), NetError> {
        self.socket.close()
    }
}

impl AcceptSource for Listener {
    type Conn = Connection;

    fn accept(&self) -> Result<Connection, NetError> {
        let (socket, peer) = self.socket.accept(true)?;
        Ok(Connection::new(socket, peer))
    }

    fn await_incoming(&self) -> Result<(), NetError> {
        wait_readable(&self.socket, None).map(|_| ())
    }

    fn harden(&self, conn: &mut Connection) {
        if !self.reuse_accepted {
            return;
        }
        if let Err(err) = conn.socket().make_reusable() {
            // macOS 在时机不佳的关闭下会返回 EINVAL。
            if err.io_error().raw_os_error() == Some(libc::EINVAL) {
                debug!(peer = %conn.peer(), "SO_REUSEADDR returned EINVAL on accepted socket");
            } else {
                warn!(peer = %conn.peer(), code = err.code(), error = %err, "could not set SO_REUSEADDR on accepted socket");
            }
        }
    }
}

fn close_quietly(socket: Descriptor) {
    if let Err(err) = socket.close() {
        debug!(code = err.code(), error = %err, "closing listener after setup failure");
    }
}
