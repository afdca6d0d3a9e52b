//! 进程级日志订阅器安装入口。
//!
//! 库本身只通过 `tracing` 宏输出结构化事件；宿主进程可调用 [`install`] 获得
//! `fmt + EnvFilter` 的默认组合，也可以自行注册任意订阅器。

use std::sync::OnceLock;

use thiserror::Error;
use tracing::dispatcher;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt};

static INSTALLED: OnceLock<()> = OnceLock::new();

/// 安装订阅器时可能出现的错误。
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// [`install`] 被重复调用。
    #[error("telemetry is already installed")]
    AlreadyInstalled,

    /// 外部已设置全局 `tracing` 订阅器。
    #[error("a global tracing subscriber is already set")]
    SubscriberAlreadySet,

    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// 安装全局订阅器：`EnvFilter`（默认 `info`，可由 `RUST_LOG` 覆盖）加 `fmt` 输出层。
///
/// # 教案式注释
///
/// ## 契约 (What)
/// - 第二次调用返回 [`TelemetryError::AlreadyInstalled`]；
/// - 调用前若外部已设置订阅器，返回 [`TelemetryError::SubscriberAlreadySet`]。
pub fn install() -> Result<(), TelemetryError> {
    if INSTALLED.get().is_some() {
        return Err(TelemetryError::AlreadyInstalled);
    }
    if dispatcher::has_been_set() {
        return Err(TelemetryError::SubscriberAlreadySet);
    }

    let subscriber = tracing_subscriber::registry()
        .with(build_env_filter())
        .with(tracing_subscriber::fmt::layer().with_thread_names(true));
    tracing::subscriber::set_global_default(subscriber)?;

    INSTALLED
        .set(())
        .map_err(|_| TelemetryError::AlreadyInstalled)
}

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_filter_defaults_to_info() {
        if std::env::var_os(EnvFilter::DEFAULT_ENV).is_none() {
            assert_eq!(build_env_filter().to_string(), "info");
        }
    }
}
