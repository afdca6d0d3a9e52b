//! 基于 `poll(2)` 的单描述符就绪等待。
//!
//! 接收循环用它在非阻塞监听套接字上等待新连接，出站连接器用它等待
//! `connect` 的第二阶段（可写）。`EINTR` 在此处重试，并按剩余时间重新计算超时。

use std::io;
use std::os::fd::AsRawFd;
use std::time::{Duration, Instant};

use crate::error::{ErrorClass, NetError, ops};

/// 等待描述符可读（监听套接字上即“有待接受的连接”）。
///
/// `timeout` 为 `None` 时无限等待。返回 `Ok(false)` 表示超时。
pub fn wait_readable(fd: &impl AsRawFd, timeout: Option<Duration>) -> Result<bool, NetError> {
    wait(fd.as_raw_fd(), libc::POLLIN, timeout)
}

/// 等待描述符可写（非阻塞 `connect` 完成或失败）。
pub fn wait_writable(fd: &impl AsRawFd, timeout: Option<Duration>) -> Result<bool, NetError> {
    wait(fd.as_raw_fd(), libc::POLLOUT, timeout)
}

fn wait(fd: i32, events: libc::c_short, timeout: Option<Duration>) -> Result<bool, NetError> {
    let deadline = timeout.map(|t| Instant::now() + t);
    loop {
        let mut pollfd = libc::pollfd {
            fd,
            events,
            revents: 0,
        };
        let millis = remaining_millis(deadline);
        // SAFETY: `pollfd` 在调用期间有效，数量为 1。
        #[allow(unsafe_code)]
        let rc = unsafe { libc::poll(&mut pollfd, 1, millis) };
        if rc > 0 {
            // POLLERR/POLLHUP 同样视为就绪：下一次操作会报告真实原因。
            return Ok(true);
        }
        if rc == 0 {
            return Ok(false);
        }
        let err = NetError::from_io(ops::POLL, io::Error::last_os_error());
        if err.class() != ErrorClass::Interrupted {
            return Err(err);
        }
    }
}

fn remaining_millis(deadline: Option<Instant>) -> libc::c_int {
    match deadline {
        None => -1,
        Some(deadline) => {
            let left = deadline.saturating_duration_since(Instant::now());
            // 向上取整，避免 0.5ms 的剩余时间被截断为立即返回后空转。
            let millis = left.as_nanos().div_ceil(1_000_000);
            libc::c_int::try_from(millis).unwrap_or(libc::c_int::MAX)
        }
    }
}
