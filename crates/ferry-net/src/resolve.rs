use std::ffi::CString;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};
use std::ptr;

use serde::Deserialize;

use crate::error::{ErrorClass, NetError, ops};

/// 地址解析时筛选的地址族。
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    #[default]
    Ipv4,
    Ipv6,
    Any,
}

impl AddressFamily {
    fn admits(self, addr: &SocketAddr) -> bool {
        match self {
            AddressFamily::Ipv4 => addr.is_ipv4(),
            AddressFamily::Ipv6 => addr.is_ipv6(),
            AddressFamily::Any => true,
        }
    }

    fn unspecified(self, port: u16) -> SocketAddr {
        match self {
            AddressFamily::Ipv6 => SocketAddr::from((Ipv6Addr::UNSPECIFIED, port)),
            AddressFamily::Ipv4 | AddressFamily::Any => {
                SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))
            }
        }
    }
}

/// 将主机与端口解析为一个套接字地址。
///
/// # 教案式注释
///
/// ## 契约 (What)
/// - `host` 为 `None` 时返回该地址族的“任意本地地址”，用于被动监听；
/// - `port` 为十进制端口号，或由系统服务数据库（`getaddrinfo(3)`）解析的服务名，例如 `"http"`；
/// - 解析可能得到多个候选，仅使用第一个满足 `family` 的候选；
/// - 无候选时返回 `Fatal` 分类的 [`NetError`]。
///
/// ## 注意事项 (Trade-offs)
/// - 主机名解析经由系统解析器同步完成，可能阻塞调用线程；该函数只在启动或
///   建立出站连接时调用，不在接收热路径上。
pub fn resolve(
    host: Option<&str>,
    port: &str,
    family: AddressFamily,
) -> Result<SocketAddr, NetError> {
    let port = parse_port(port)?;
    let Some(host) = host else {
        return Ok(family.unspecified(port));
    };
    let candidates = (host, port)
        .to_socket_addrs()
        .map_err(|err| NetError::with_class(ops::RESOLVE, ErrorClass::Fatal, err))?;
    candidates
        .into_iter()
        .find(|addr| family.admits(addr))
        .ok_or_else(|| {
            NetError::with_class(
                ops::RESOLVE,
                ErrorClass::Fatal,
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no {family:?} address for {host}:{port}"),
                ),
            )
        })
}

fn parse_port(port: &str) -> Result<u16, NetError> {
    let port = port.trim();
    let invalid = || {
        NetError::with_class(
            ops::RESOLVE,
            ErrorClass::Fatal,
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid port `{port}`"),
            ),
        )
    };
    if port.is_empty() {
        return Err(invalid());
    }
    // 纯数字必须落在 u16 范围内；交给 getaddrinfo 会被静默截断。
    if port.bytes().all(|b| b.is_ascii_digit()) {
        return port.parse::<u16>().map_err(|_| invalid());
    }
    // 服务名以字母开头；"-1"、"+80" 之类会被 getaddrinfo 当作数字处理。
    if !port.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(invalid());
    }
    lookup_service(port).ok_or_else(invalid)
}

/// 通过系统服务数据库把服务名解析为 TCP 端口。
#[allow(unsafe_code)]
fn lookup_service(service: &str) -> Option<u16> {
    let service = CString::new(service).ok()?;
    // SAFETY: `addrinfo` 为纯 C 结构体，全零（空指针、零标志）是合法的 hints。
    let mut hints: libc::addrinfo = unsafe { std::mem::zeroed() };
    hints.ai_family = libc::AF_INET;
    hints.ai_socktype = libc::SOCK_STREAM;
    hints.ai_flags = libc::AI_PASSIVE;

    let mut found: *mut libc::addrinfo = ptr::null_mut();
    // SAFETY: 参数均为有效指针；成功时 `found` 由 `freeaddrinfo` 释放。
    let rc = unsafe { libc::getaddrinfo(ptr::null(), service.as_ptr(), &hints, &mut found) };
    if rc != 0 || found.is_null() {
        return None;
    }
    // SAFETY: `found` 非空且来自 getaddrinfo；hints 限定为 AF_INET，地址为 `sockaddr_in`。
    unsafe {
        let addr = (*found).ai_addr;
        let port = if addr.is_null() || i32::from((*addr).sa_family) != libc::AF_INET {
            None
        } else {
            Some(u16::from_be((*addr.cast::<libc::sockaddr_in>()).sin_port))
        };
        libc::freeaddrinfo(found);
        port
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passive_resolution_uses_unspecified_address() {
        let addr = resolve(None, "8080", AddressFamily::Ipv4).unwrap();
        assert_eq!(addr, SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080)));

        let addr = resolve(None, "8080", AddressFamily::Ipv6).unwrap();
        assert_eq!(addr, SocketAddr::from((Ipv6Addr::UNSPECIFIED, 8080)));
    }

    #[test]
    fn numeric_host_resolves_to_itself() {
        let addr = resolve(Some("127.0.0.1"), "9000", AddressFamily::Ipv4).unwrap();
        assert_eq!(addr, SocketAddr::from((Ipv4Addr::LOCALHOST, 9000)));
    }

    #[test]
    fn family_filter_rejects_mismatched_candidates() {
        let err = resolve(Some("127.0.0.1"), "9000", AddressFamily::Ipv6).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Fatal);
        assert_eq!(err.code(), "ferry.net.resolve_failed");
        assert_eq!(err.io_error().kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn malformed_port_is_rejected() {
        for port in ["", "  ", "70000", "-1", "+80", "no-such-service-ferry", "ht\0tp"] {
            let err = resolve(None, port, AddressFamily::Ipv4).unwrap_err();
            assert_eq!(err.io_error().kind(), io::ErrorKind::InvalidInput, "{port:?}");
        }
    }

    #[test]
    fn service_names_resolve_through_the_system_database() {
        // 精简容器可能没有 /etc/services；存在时 "http" 必须映射到 80。
        if let Some(port) = lookup_service("http") {
            assert_eq!(port, 80);
            let addr = resolve(None, "http", AddressFamily::Ipv4).unwrap();
            assert_eq!(addr, SocketAddr::from((Ipv4Addr::UNSPECIFIED, 80)));
        }
    }

    #[test]
    fn numeric_port_never_reaches_the_service_database() {
        assert_eq!(parse_port(" 8080 ").unwrap(), 8080);
        assert_eq!(parse_port("0").unwrap(), 0);
    }
}
