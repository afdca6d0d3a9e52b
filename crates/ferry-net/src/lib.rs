#![doc = r#"
# ferry-net

## 设计动机（Why）
- **定位**：该 crate 是连接分发流水线最底层的套接字生命周期抽象，负责流式套接字的
  创建、阻塞模式切换、复用提示、绑定监听、连接、接受与关闭。
- **架构角色**：接收器、工作线程与出站连接器都只通过 [`Descriptor`] 接触套接字，
  并以 [`ErrorClass`] 判断失败后的循环策略。
- **设计理念**：强调“错误分类”与“唯一所有权”。瞬时状况（`EINTR`、连接进行中）在本层
  消化，资源耗尽与致命错误以结构化的 [`NetError`] 暴露给调用方。

## 核心契约（What）
- **非阻塞保证**：请求非阻塞创建时，返回前套接字必定已是非阻塞，与平台默认行为无关；
- **两阶段连接**：非阻塞 `connect` 返回 [`ConnectStatus::Pending`] 后，调用方需等待可写
  （[`wait_writable`]），再通过 [`Descriptor::take_error`] 读取并清除挂起错误；
- **关闭语义**：[`Descriptor::close`] 消耗所有权，重复关闭不可表达。

## 实现策略（How）
- 系统调用经由 `socket2`，错误码常量与 `poll(2)` 来自 `libc`；
- 错误码分类集中在 [`error`] 模块，由原始 errno 表驱动，并针对 `accept`、`connect`、
  `create` 做少量语义修正。

## 风险与考量（Trade-offs）
- **平台范围**：当前仅支持 unix 目标；Windows 的 `WSAE*` 错误码族与独占地址语义未实现。
"#]
#![deny(unsafe_code)]

#[cfg(not(unix))]
compile_error!("ferry-net currently supports unix targets only");

mod descriptor;
pub mod error;
mod readiness;
mod resolve;

pub use descriptor::{ConnectStatus, Descriptor};
pub use error::{ErrorClass, NetError, OperationKind, ops};
pub use readiness::{wait_readable, wait_writable};
pub use resolve::{AddressFamily, resolve};
pub use socket2::{Domain, Protocol, Type};

/// 平台允许的最大监听积压长度（`SOMAXCONN`）。
pub fn max_backlog() -> u32 {
    u32::try_from(libc::SOMAXCONN).unwrap_or(128)
}
