//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 汇总分发层对外暴露的失败：配置非法、套接字层错误、线程创建失败；
//! - 为外部连接处理器提供统一的失败载体 [`HandlerError`]，工作线程据此记录日志。
//!
//! ## 设计要求（What）
//! - 所有错误类型派生 `thiserror::Error`，可直接交给 `anyhow` 等上层框架；
//! - 套接字层错误保持原样包裹，调用方仍可读取 [`ErrorClass`](ferry_net::ErrorClass)。

use std::error::Error as StdError;
use std::io;

use ferry_net::NetError;
use thiserror::Error;

use crate::config::ConfigError;

/// 分发层错误域。
#[derive(Debug, Error)]
pub enum DispatchError {
    /// 配置未通过校验。
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// 监听套接字初始化失败；地址占用时附带运维提示。
    #[error("failed to set up listener on port {port}: {source}{}", hint_suffix(.source))]
    Listen {
        port: String,
        #[source]
        source: NetError,
    },

    /// 接收循环因致命错误终止。
    #[error("accept loop stopped: {0}")]
    Accept(#[source] NetError),

    /// 出站连接失败。
    #[error("outbound connect to {target} failed: {source}")]
    Connect {
        target: String,
        #[source]
        source: NetError,
    },

    /// 其他套接字层错误。
    #[error(transparent)]
    Net(#[from] NetError),

    /// 工作线程创建失败。
    #[error("failed to spawn worker {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: io::Error,
    },
}

fn hint_suffix(err: &NetError) -> String {
    err.hint().map(|hint| format!(" ({hint})")).unwrap_or_default()
}

/// 外部连接处理器返回的失败。
///
/// 工作线程只记录并吞下该错误，随后照常关闭连接；它不会终止工作线程。
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<io::Error> for HandlerError {
    fn from(err: io::Error) -> Self {
        Self::with_source("connection io failed", err)
    }
}

impl From<NetError> for HandlerError {
    fn from(err: NetError) -> Self {
        Self::with_source("connection socket failed", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_net::ops;

    #[test]
    fn listen_error_appends_operator_hint_for_address_in_use() {
        let source = NetError::from_io(ops::BIND, io::Error::from(io::ErrorKind::AddrInUse));
        let err = DispatchError::Listen {
            port: "7000".into(),
            source,
        };
        let rendered = err.to_string();
        assert!(rendered.contains("port 7000"), "{rendered}");
        assert!(rendered.ends_with("(is the service already running?)"), "{rendered}");
    }

    #[test]
    fn handler_error_keeps_source_chain() {
        let err = HandlerError::from(io::Error::from(io::ErrorKind::BrokenPipe));
        assert_eq!(err.message(), "connection io failed");
        assert!(err.source().is_some());
        assert!(HandlerError::new("bad request").source().is_none());
    }
}
