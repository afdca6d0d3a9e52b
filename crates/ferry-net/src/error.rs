use std::fmt;
use std::io;

use thiserror::Error;

/// 描述一次底层套接字操作对应的稳定错误码与默认文案。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperationKind {
    pub code: &'static str,
    pub message: &'static str,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message)
    }
}

/// 套接字层全部操作的错误码目录。
pub mod ops {
    use super::OperationKind;

    pub const CREATE: OperationKind = OperationKind {
        code: "ferry.net.create_failed",
        message: "socket create",
    };
    pub const CONFIGURE: OperationKind = OperationKind {
        code: "ferry.net.configure_failed",
        message: "socket configure",
    };
    pub const REUSE: OperationKind = OperationKind {
        code: "ferry.net.reuse_failed",
        message: "socket reuse",
    };
    pub const BIND: OperationKind = OperationKind {
        code: "ferry.net.bind_failed",
        message: "socket bind",
    };
    pub const LISTEN: OperationKind = OperationKind {
        code: "ferry.net.listen_failed",
        message: "socket listen",
    };
    pub const ACCEPT: OperationKind = OperationKind {
        code: "ferry.net.accept_failed",
        message: "socket accept",
    };
    pub const CONNECT: OperationKind = OperationKind {
        code: "ferry.net.connect_failed",
        message: "socket connect",
    };
    pub const CLOSE: OperationKind = OperationKind {
        code: "ferry.net.close_failed",
        message: "socket close",
    };
    pub const POLL: OperationKind = OperationKind {
        code: "ferry.net.poll_failed",
        message: "socket poll",
    };
    pub const RESOLVE: OperationKind = OperationKind {
        code: "ferry.net.resolve_failed",
        message: "address resolve",
    };
    pub const ADDRESS: OperationKind = OperationKind {
        code: "ferry.net.address_failed",
        message: "socket address",
    };
}

/// 原始 OS 错误码的语义分类。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 调用方（接收循环、出站连接器）只关心“该重试、该退避还是该停止”，
///   不应散落地比较 `EAGAIN`、`EMFILE` 等平台常量；
/// - 资源耗尽需要与致命错误区分开，才能让接收循环在接近系统上限时退避而非退出。
///
/// ## 契约 (What)
/// - `WouldBlock`：暂时无数据或无待接受连接，调用方继续循环；
/// - `InProgress`：非阻塞 `connect` 尚未完成，需要等待可写后读取 `SO_ERROR`；
/// - `ResourceExhausted`：文件描述符或内核缓冲耗尽，调用方退避后继续；
/// - `AddressInUse`：绑定地址已被占用，对 `bind` 致命，需给出运维提示；
/// - `Interrupted`：被信号打断，本层内部透明重试，永不外泄；
/// - `Unsupported`：地址族、类型、协议组合无效；
/// - `Fatal`：其余全部情况，调用方必须终止所属循环。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    WouldBlock,
    InProgress,
    ResourceExhausted,
    AddressInUse,
    Interrupted,
    Unsupported,
    Fatal,
}

impl ErrorClass {
    /// 对原始错误码做通用分类，不考虑具体操作。
    pub fn from_raw(code: i32) -> Self {
        raw_table(code)
    }

    /// 结合操作语义对原始错误码分类。
    ///
    /// - `accept` 遇到 `ECONNABORTED` 表示对端在被接受前撤回，与 `WouldBlock` 同等对待；
    /// - `connect` 遇到 `EAGAIN` 表示本地临时端口耗尽，归为资源耗尽；
    /// - `create` 遇到 `EINVAL` 表示参数组合不被支持。
    pub fn for_operation(op: OperationKind, code: i32) -> Self {
        let class = raw_table(code);
        if op == ops::ACCEPT && is_accept_withdrawn(code) {
            ErrorClass::WouldBlock
        } else if op == ops::CONNECT && class == ErrorClass::WouldBlock {
            ErrorClass::ResourceExhausted
        } else if op == ops::CREATE && code == libc::EINVAL {
            ErrorClass::Unsupported
        } else {
            class
        }
    }

    /// 对不携带原始错误码的 IO 错误按 [`io::ErrorKind`] 兜底分类。
    pub fn from_kind(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::WouldBlock => ErrorClass::WouldBlock,
            io::ErrorKind::Interrupted => ErrorClass::Interrupted,
            io::ErrorKind::AddrInUse => ErrorClass::AddressInUse,
            io::ErrorKind::OutOfMemory => ErrorClass::ResourceExhausted,
            io::ErrorKind::Unsupported => ErrorClass::Unsupported,
            _ => ErrorClass::Fatal,
        }
    }

    /// 是否属于调用方应继续循环的瞬时状况。
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorClass::WouldBlock
                | ErrorClass::InProgress
                | ErrorClass::ResourceExhausted
                | ErrorClass::Interrupted
        )
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorClass::WouldBlock => "would-block",
            ErrorClass::InProgress => "in-progress",
            ErrorClass::ResourceExhausted => "resource-exhausted",
            ErrorClass::AddressInUse => "address-in-use",
            ErrorClass::Interrupted => "interrupted",
            ErrorClass::Unsupported => "unsupported",
            ErrorClass::Fatal => "fatal",
        };
        f.write_str(label)
    }
}

#[allow(unreachable_patterns)]
fn raw_table(code: i32) -> ErrorClass {
    match code {
        // 部分平台上 EAGAIN 与 EWOULDBLOCK 数值相同。
        libc::EAGAIN | libc::EWOULDBLOCK => ErrorClass::WouldBlock,
        libc::EINPROGRESS | libc::EALREADY => ErrorClass::InProgress,
        libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM => {
            ErrorClass::ResourceExhausted
        }
        libc::EADDRINUSE => ErrorClass::AddressInUse,
        libc::EINTR => ErrorClass::Interrupted,
        libc::EAFNOSUPPORT
        | libc::EPROTONOSUPPORT
        | libc::ESOCKTNOSUPPORT
        | libc::EPROTOTYPE
        | libc::EOPNOTSUPP => ErrorClass::Unsupported,
        _ => ErrorClass::Fatal,
    }
}

fn is_accept_withdrawn(code: i32) -> bool {
    code == libc::ECONNABORTED
}

/// 套接字层的结构化错误。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 与底层 `io::Error` 一同携带稳定错误码与 [`ErrorClass`]，让日志、告警和调用方
///   的循环策略共享同一份判定结果；
///
/// ## 契约 (What)
/// - `code()`：`ferry.net.<op>_failed` 形式的稳定错误码；
/// - `class()`：构造时一次性计算的分类，之后不会改变；
/// - `io_error()`：原始 IO 错误，可用于匹配 `ConnectionRefused` 等具体原因；
/// - `hint()`：仅在 `bind` 地址占用时给出“服务是否已在运行”的提示。
#[derive(Debug, Error)]
#[error("{op} [{class}]: {source}")]
pub struct NetError {
    op: OperationKind,
    class: ErrorClass,
    #[source]
    source: io::Error,
}

impl NetError {
    /// 将 IO 错误映射为套接字层错误，并附带分类。
    pub fn from_io(op: OperationKind, source: io::Error) -> Self {
        let class = match source.raw_os_error() {
            Some(code) => ErrorClass::for_operation(op, code),
            None => ErrorClass::from_kind(source.kind()),
        };
        Self { op, class, source }
    }

    /// 以给定分类构造错误，用于非系统调用产生的失败（如解析无结果）。
    pub fn with_class(op: OperationKind, class: ErrorClass, source: io::Error) -> Self {
        Self { op, class, source }
    }

    pub fn operation(&self) -> OperationKind {
        self.op
    }

    pub fn code(&self) -> &'static str {
        self.op.code
    }

    pub fn class(&self) -> ErrorClass {
        self.class
    }

    pub fn io_error(&self) -> &io::Error {
        &self.source
    }

    pub fn into_io_error(self) -> io::Error {
        self.source
    }

    /// 调用方是否可以在不终止所属循环的前提下继续。
    pub fn is_retryable(&self) -> bool {
        self.class.is_transient()
    }

    /// 面向运维的补充提示。
    pub fn hint(&self) -> Option<&'static str> {
        if self.class == ErrorClass::AddressInUse && self.op == ops::BIND {
            Some("is the service already running?")
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_codes_map_to_documented_classes() {
        let table = [
            (libc::EAGAIN, ErrorClass::WouldBlock),
            (libc::EWOULDBLOCK, ErrorClass::WouldBlock),
            (libc::EINPROGRESS, ErrorClass::InProgress),
            (libc::EALREADY, ErrorClass::InProgress),
            (libc::EMFILE, ErrorClass::ResourceExhausted),
            (libc::ENFILE, ErrorClass::ResourceExhausted),
            (libc::ENOBUFS, ErrorClass::ResourceExhausted),
            (libc::ENOMEM, ErrorClass::ResourceExhausted),
            (libc::EADDRINUSE, ErrorClass::AddressInUse),
            (libc::EINTR, ErrorClass::Interrupted),
            (libc::EAFNOSUPPORT, ErrorClass::Unsupported),
            (libc::EPROTONOSUPPORT, ErrorClass::Unsupported),
            (libc::EBADF, ErrorClass::Fatal),
            (libc::ENOTSOCK, ErrorClass::Fatal),
            (libc::ECONNREFUSED, ErrorClass::Fatal),
            (libc::EINVAL, ErrorClass::Fatal),
        ];
        for (code, expected) in table {
            assert_eq!(ErrorClass::from_raw(code), expected, "errno {code}");
        }
    }

    #[test]
    fn accept_treats_aborted_handshake_as_would_block() {
        assert_eq!(
            ErrorClass::for_operation(ops::ACCEPT, libc::ECONNABORTED),
            ErrorClass::WouldBlock
        );
        assert_eq!(
            ErrorClass::for_operation(ops::CONNECT, libc::ECONNABORTED),
            ErrorClass::Fatal
        );
        assert_eq!(
            ErrorClass::for_operation(ops::ACCEPT, libc::EMFILE),
            ErrorClass::ResourceExhausted
        );
    }

    #[test]
    fn connect_would_block_means_ports_exhausted() {
        assert_eq!(
            ErrorClass::for_operation(ops::CONNECT, libc::EAGAIN),
            ErrorClass::ResourceExhausted
        );
    }

    #[test]
    fn create_invalid_argument_is_unsupported() {
        assert_eq!(
            ErrorClass::for_operation(ops::CREATE, libc::EINVAL),
            ErrorClass::Unsupported
        );
        assert_eq!(
            ErrorClass::for_operation(ops::BIND, libc::EINVAL),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn kind_fallback_covers_synthetic_errors() {
        let err = NetError::from_io(ops::ACCEPT, io::Error::from(io::ErrorKind::WouldBlock));
        assert_eq!(err.class(), ErrorClass::WouldBlock);
        assert!(err.is_retryable());

        let err = NetError::from_io(ops::RESOLVE, io::Error::other("no record"));
        assert_eq!(err.class(), ErrorClass::Fatal);
        assert!(!err.is_retryable());
    }

    #[test]
    fn bind_address_in_use_carries_operator_hint() {
        let err = NetError::from_io(ops::BIND, io::Error::from_raw_os_error(libc::EADDRINUSE));
        assert_eq!(err.class(), ErrorClass::AddressInUse);
        assert_eq!(err.code(), "ferry.net.bind_failed");
        assert_eq!(err.hint(), Some("is the service already running?"));

        let err = NetError::from_io(ops::CONNECT, io::Error::from_raw_os_error(libc::EADDRINUSE));
        assert_eq!(err.hint(), None);
    }

    #[test]
    fn display_includes_operation_and_class() {
        let err = NetError::from_io(ops::ACCEPT, io::Error::from_raw_os_error(libc::EMFILE));
        let rendered = err.to_string();
        assert!(rendered.starts_with("socket accept [resource-exhausted]"), "{rendered}");
    }
}
