use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, IntoRawFd, RawFd};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::{debug, trace};

use crate::error::{ErrorClass, NetError, ops};

/// 非阻塞 `connect` 的即时结果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectStatus {
    /// 连接已建立。
    Connected,
    /// 连接仍在进行，需要等待可写后调用 [`Descriptor::take_error`] 获知结果。
    Pending,
}

/// 单个流式套接字及其阻塞模式。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 将“创建 → 配置 → 绑定/连接/接受 → 关闭”收敛到一个拥有所有权的类型中，
///   监听器、已接受连接与出站连接共享同一套语义；
/// - 让“恰好关闭一次”由类型系统保证：[`close`](Self::close) 消耗 `self`，
///   重复关闭在编译期即不可表达；未显式关闭而被丢弃时由 `socket2` 释放句柄，不会泄漏。
///
/// ## 逻辑 (How)
/// - 底层持有 `socket2::Socket`，所有系统调用都经过它；
/// - `non_blocking` 字段镜像内核中的 `O_NONBLOCK`，仅在设置成功后更新；
/// - 所有会阻塞的调用（`accept`、`connect`、读写）在 `EINTR` 时于本层重试。
///
/// ## 契约 (What)
/// - `create`：若请求非阻塞，返回前必定已是非阻塞；
/// - `make_reusable`：尽力而为，失败是否致命由调用方决定；
/// - `bind_and_listen`：地址占用单独分类为 [`ErrorClass::AddressInUse`]；
/// - `connect`：返回 [`ConnectStatus`]，`Pending` 为两阶段完成的第一阶段；
/// - `accept`：`WouldBlock`、`ResourceExhausted` 与 `Fatal` 三类失败；
/// - `close`：消耗描述符并上报关闭错误。
///
/// ## 注意事项 (Trade-offs)
/// - `close` 遇到 `EINTR` 不会重试：内核此时已经释放了描述符，重试可能误关其他线程新打开的句柄。
#[derive(Debug)]
pub struct Descriptor {
    socket: Socket,
    non_blocking: bool,
}

impl Descriptor {
    /// 打开一个带 close-on-exec 标志的套接字。
    ///
    /// 在支持原子 `SOCK_NONBLOCK` 的平台上直接携带该标志创建；若内核以 `EINVAL`
    /// 拒绝（编译期支持而运行期内核不支持），退回“先创建后设置”的路径。
    pub fn create(
        domain: Domain,
        ty: Type,
        protocol: Option<Protocol>,
        non_blocking: bool,
    ) -> Result<Self, NetError> {
        let socket = if non_blocking {
            open_nonblocking(domain, ty, protocol)?
        } else {
            Socket::new(domain, ty, protocol).map_err(|err| NetError::from_io(ops::CREATE, err))?
        };
        Ok(Self {
            socket,
            non_blocking,
        })
    }

    /// 为给定地址创建 TCP 流套接字。
    pub fn tcp_for(addr: &SocketAddr, non_blocking: bool) -> Result<Self, NetError> {
        Self::create(
            Domain::for_address(*addr),
            Type::STREAM,
            Some(Protocol::TCP),
            non_blocking,
        )
    }

    fn from_accepted(socket: Socket) -> Self {
        Self {
            socket,
            non_blocking: false,
        }
    }

    /// 切换阻塞模式。
    pub fn set_nonblocking(&mut self, non_blocking: bool) -> Result<(), NetError> {
        self.socket
            .set_nonblocking(non_blocking)
            .map_err(|err| NetError::from_io(ops::CONFIGURE, err))?;
        self.non_blocking = non_blocking;
        Ok(())
    }

    pub fn is_nonblocking(&self) -> bool {
        self.non_blocking
    }

    /// 设置 `SO_REUSEADDR`，允许在旧连接处于 `TIME_WAIT` 时立即重新绑定端口。
    pub fn make_reusable(&self) -> Result<(), NetError> {
        self.socket
            .set_reuse_address(true)
            .map_err(|err| NetError::from_io(ops::REUSE, err))
    }

    /// 绑定地址并进入监听状态。
    pub fn bind_and_listen(&self, addr: &SocketAddr, backlog: u32) -> Result<(), NetError> {
        let sock_addr = SockAddr::from(*addr);
        self.socket
            .bind(&sock_addr)
            .map_err(|err| NetError::from_io(ops::BIND, err))?;
        let backlog = i32::try_from(backlog).unwrap_or(i32::MAX);
        self.socket
            .listen(backlog)
            .map_err(|err| NetError::from_io(ops::LISTEN, err))
    }

    /// 发起连接。非阻塞套接字上返回 [`ConnectStatus::Pending`] 表示握手仍在进行。
    pub fn connect(&self, addr: &SocketAddr) -> Result<ConnectStatus, NetError> {
        let sock_addr = SockAddr::from(*addr);
        loop {
            let err = match self.socket.connect(&sock_addr) {
                Ok(()) => return Ok(ConnectStatus::Connected),
                Err(err) => err,
            };
            // 被信号打断后，连接在内核中继续进行；再次调用会报告 EALREADY 或 EISCONN。
            if err.raw_os_error() == Some(libc::EISCONN) {
                return Ok(ConnectStatus::Connected);
            }
            let err = NetError::from_io(ops::CONNECT, err);
            match err.class() {
                ErrorClass::Interrupted => continue,
                ErrorClass::InProgress => return Ok(ConnectStatus::Pending),
                _ => return Err(err),
            }
        }
    }

    /// 读取并清除挂起的套接字错误（`SO_ERROR`）。
    ///
    /// 非阻塞连接的第二阶段：可写后调用，`Ok(None)` 表示内核未记录错误。
    pub fn take_error(&self) -> Result<Option<NetError>, NetError> {
        let pending = self
            .socket
            .take_error()
            .map_err(|err| NetError::from_io(ops::CONFIGURE, err))?;
        Ok(pending.map(|err| NetError::from_io(ops::CONNECT, err)))
    }

    /// 接受一个入站连接，返回新描述符及对端地址。
    pub fn accept(&self, non_blocking: bool) -> Result<(Descriptor, SocketAddr), NetError> {
        let (socket, addr) = loop {
            match self.socket.accept() {
                Ok(pair) => break pair,
                Err(err) => {
                    let err = NetError::from_io(ops::ACCEPT, err);
                    if err.class() == ErrorClass::Interrupted {
                        continue;
                    }
                    return Err(err);
                }
            }
        };
        let mut accepted = Descriptor::from_accepted(socket);
        // BSD 系平台上已接受的套接字会继承监听套接字的 O_NONBLOCK，因此无论请求哪种模式都显式设置。
        // 失败时 `accepted` 随作用域释放，不会泄漏。
        accepted.set_nonblocking(non_blocking)?;
        let peer = addr.as_socket().ok_or_else(|| {
            NetError::with_class(
                ops::ADDRESS,
                ErrorClass::Unsupported,
                io::Error::new(io::ErrorKind::Unsupported, "peer is not an inet address"),
            )
        })?;
        trace!(%peer, fd = accepted.as_raw_fd(), "accepted socket");
        Ok((accepted, peer))
    }

    /// 本地绑定地址。
    pub fn local_addr(&self) -> Result<SocketAddr, NetError> {
        let addr = self
            .socket
            .local_addr()
            .map_err(|err| NetError::from_io(ops::ADDRESS, err))?;
        inet(addr)
    }

    /// 对端地址；连接尚未建立时返回 `NotConnected` 对应的错误。
    pub fn peer_addr(&self) -> Result<SocketAddr, NetError> {
        let addr = self
            .socket
            .peer_addr()
            .map_err(|err| NetError::from_io(ops::ADDRESS, err))?;
        inet(addr)
    }

    /// 关闭描述符。
    pub fn close(self) -> Result<(), NetError> {
        let fd = self.socket.into_raw_fd();
        // SAFETY: `fd` 由 `into_raw_fd` 转移而来，此后没有其他所有者。
        #[allow(unsafe_code)]
        let rc = unsafe { libc::close(fd) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            debug!(fd, "close interrupted; descriptor already released");
            return Ok(());
        }
        Err(NetError::from_io(ops::CLOSE, err))
    }

    pub fn socket(&self) -> &Socket {
        &self.socket
    }

    /// 转换为标准库 `TcpStream`，所有权随之转移。
    pub fn into_tcp_stream(self) -> TcpStream {
        TcpStream::from(self.socket)
    }
}

impl Read for Descriptor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.socket.read(buf) {
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }
}

impl Write for Descriptor {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            match self.socket.write(buf) {
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.socket.flush()
    }
}

impl AsRawFd for Descriptor {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

impl AsFd for Descriptor {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.socket.as_fd()
    }
}

fn inet(addr: SockAddr) -> Result<SocketAddr, NetError> {
    addr.as_socket().ok_or_else(|| {
        NetError::with_class(
            ops::ADDRESS,
            ErrorClass::Unsupported,
            io::Error::new(io::ErrorKind::Unsupported, "not an inet address"),
        )
    })
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
fn open_nonblocking(
    domain: Domain,
    ty: Type,
    protocol: Option<Protocol>,
) -> Result<Socket, NetError> {
    match Socket::new(domain, ty.nonblocking(), protocol) {
        Ok(socket) => return Ok(socket),
        Err(err) if err.raw_os_error() == Some(libc::EINVAL) => {
            debug!("kernel rejected SOCK_NONBLOCK at creation; falling back to fcntl");
        }
        Err(err) => return Err(NetError::from_io(ops::CREATE, err)),
    }
    open_then_set_nonblocking(domain, ty, protocol)
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
fn open_nonblocking(
    domain: Domain,
    ty: Type,
    protocol: Option<Protocol>,
) -> Result<Socket, NetError> {
    open_then_set_nonblocking(domain, ty, protocol)
}

fn open_then_set_nonblocking(
    domain: Domain,
    ty: Type,
    protocol: Option<Protocol>,
) -> Result<Socket, NetError> {
    let socket =
        Socket::new(domain, ty, protocol).map_err(|err| NetError::from_io(ops::CREATE, err))?;
    socket
        .set_nonblocking(true)
        .map_err(|err| NetError::from_io(ops::CONFIGURE, err))?;
    Ok(socket)
}
