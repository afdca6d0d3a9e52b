use std::net::SocketAddr;
use std::time::Duration;

use ferry_net::{ConnectStatus, Descriptor, NetError, resolve, wait_writable};
use tracing::{debug, info, warn};

use crate::config::ConnectorConfig;
use crate::connection::Connection;
use crate::error::DispatchError;

/// 非阻塞出站连接器。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 调用方自行决定如何等待握手完成，连接器只负责发起连接并报告所处阶段；
/// - `InProgress` 是正常的中间状态，不以错误形式出现。
///
/// ## 逻辑 (How)
/// 1. 解析目标地址，取所配置地址族的第一个候选；
/// 2. 创建与该地址族匹配的非阻塞套接字，按配置尽力设置 `SO_REUSEADDR`；
/// 3. 发起连接：立即完成返回 [`ConnectOutcome::Connected`]，仍在握手返回
///    [`ConnectOutcome::Pending`]；
/// 4. 任何致命错误都先关闭已创建的套接字再返回。
///
/// ## 契约 (What)
/// - 返回的连接归调用方所有；
/// - 失败结果为 [`DispatchError::Connect`]，携带目标与底层 [`NetError`]。
#[derive(Clone, Debug)]
pub struct Connector {
    config: ConnectorConfig,
}

/// 一次连接尝试的结果。
#[derive(Debug)]
pub enum ConnectOutcome {
    Connected(Connection),
    Pending(PendingConnect),
}

impl ConnectOutcome {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }
}

impl Connector {
    pub fn new(config: ConnectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    pub fn connect(&self) -> Result<ConnectOutcome, DispatchError> {
        let config = self.config.clone().validate()?;
        let target = format!("{}:{}", config.host, config.port);
        let connect_err = |source: NetError| DispatchError::Connect {
            target: target.clone(),
            source,
        };

        let addr = resolve(Some(config.host.as_str()), &config.port, config.family)
            .map_err(connect_err)?;
        let socket = Descriptor::tcp_for(&addr, true).map_err(connect_err)?;

        if config.reuse_address
            && let Err(err) = socket.make_reusable()
        {
            warn!(%addr, code = err.code(), error = %err, "could not set SO_REUSEADDR on outbound socket");
        }

        match socket.connect(&addr) {
            Ok(ConnectStatus::Connected) => {
                info!(peer = %addr, "connected");
                Ok(ConnectOutcome::Connected(Connection::new(socket, addr)))
            }
            Ok(ConnectStatus::Pending) => {
                debug!(peer = %addr, "connect in progress");
                Ok(ConnectOutcome::Pending(PendingConnect {
                    socket,
                    target: addr,
                }))
            }
            Err(err) => {
                discard(socket);
                Err(connect_err(err))
            }
        }
    }
}

/// 握手尚未完成的出站连接。
#[derive(Debug)]
pub struct PendingConnect {
    socket: Descriptor,
    target: SocketAddr,
}

impl PendingConnect {
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// 等待套接字可写；`Ok(false)` 表示超时。
    pub fn wait_writable(&self, timeout: Option<Duration>) -> Result<bool, DispatchError> {
        wait_writable(&self.socket, timeout).map_err(DispatchError::Net)
    }

    /// 读取 `SO_ERROR` 判定握手结果。
    ///
    /// 内核记录的错误（例如拒绝、不可达）会关闭套接字并原样返回；
    /// 无错误且对端地址已确定时返回 `Connected`，否则仍为 `Pending`。
    pub fn resolve(self) -> Result<ConnectOutcome, DispatchError> {
        let connect_err = |target: SocketAddr, source: NetError| DispatchError::Connect {
            target: target.to_string(),
            source,
        };

        match self.socket.take_error() {
            Ok(None) => {}
            Ok(Some(err)) | Err(err) => {
                let target = self.target;
                discard(self.socket);
                return Err(connect_err(target, err));
            }
        }

        match self.socket.peer_addr() {
            Ok(peer) => {
                info!(%peer, "connected");
                Ok(ConnectOutcome::Connected(Connection::new(self.socket, peer)))
            }
            Err(err) if err.io_error().raw_os_error() == Some(libc::ENOTCONN) => {
                Ok(ConnectOutcome::Pending(self))
            }
            Err(err) => {
                let target = self.target;
                discard(self.socket);
                Err(connect_err(target, err))
            }
        }
    }

    /// 放弃尚未完成的连接。
    pub fn abandon(self) -> Result<(), NetError> {
        self.socket.close()
    }
}

fn discard(socket: Descriptor) {
    if let Err(err) = socket.close() {
        debug!(code = err.code(), error = %err, "closing socket after failed connect");
    }
}
