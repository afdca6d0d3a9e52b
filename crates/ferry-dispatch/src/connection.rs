use std::io::{self, Read, Write};
use std::net::SocketAddr;

use ferry_net::{Descriptor, NetError};

/// 可被工作线程关闭的交接单元。
///
/// 工作线程在处理器返回（或 panic）后调用 [`close`](Close::close) 恰好一次；
/// `close` 消耗 `self`，因此交接单元不可能被关闭两次。
pub trait Close: Send + 'static {
    /// 关闭底层资源。
    fn close(self) -> Result<(), NetError>;

    /// 用于日志的对端地址。
    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// 一条已接受或已建立的流式连接及其对端地址。
#[derive(Debug)]
pub struct Connection {
    socket: Descriptor,
    peer: SocketAddr,
}

impl Connection {
    pub fn new(socket: Descriptor, peer: SocketAddr) -> Self {
        Self { socket, peer }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn socket(&self) -> &Descriptor {
        &self.socket
    }

    pub fn socket_mut(&mut self) -> &mut Descriptor {
        &mut self.socket
    }

    pub fn into_parts(self) -> (Descriptor, SocketAddr) {
        (self.socket, self.peer)
    }
}

impl Close for Connection {
    fn close(self) -> Result<(), NetError> {
        self.socket.close()
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.peer)
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.read(buf)
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.socket.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.socket.flush()
    }
}
