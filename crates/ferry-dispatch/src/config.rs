//! 监听参数与出站连接参数。
//!
//! 配置以 TOML 表示，字段均有默认值；[`ServiceConfig::validate`] 负责校验端口并把
//! 积压长度钳制到平台上限 `SOMAXCONN`。

use std::num::NonZeroUsize;
use std::time::Duration;

use ferry_net::{AddressFamily, max_backlog};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

const DEFAULT_WORKERS: usize = 64;
const DEFAULT_QUEUE_CAPACITY: usize = 256;
const DEFAULT_EXHAUSTION_BACKOFF_MS: u64 = 10;

/// 配置解析或校验失败。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid port `{0}`: expected a decimal number in 0..=65535 or a service name")]
    InvalidPort(String),

    #[error("outbound connector requires a target host")]
    MissingHost,
}

/// 接收服务的监听参数。
///
/// # 教案式注释
///
/// ## 契约 (What)
/// - `host`：绑定主机，缺省表示任意本地地址；
/// - `port`：端口字符串，`"0"` 表示由内核分配；
/// - `family`：解析结果中取第一个属于该地址族的候选；
/// - `backlog`：内核待接受连接队列长度，超过 `SOMAXCONN` 时被钳制；
/// - `workers`：固定工作线程数，服务生命周期内不变；
/// - `queue_capacity`：交接队列容量；
/// - `reuse_address`：是否为监听与已接受套接字设置 `SO_REUSEADDR`；
/// - `exhaustion_backoff_ms`：接收遇到资源耗尽时的退避时长。
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub host: Option<String>,
    pub port: String,
    pub family: AddressFamily,
    pub backlog: u32,
    pub workers: NonZeroUsize,
    pub queue_capacity: NonZeroUsize,
    pub reuse_address: bool,
    pub exhaustion_backoff_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: "0".to_owned(),
            family: AddressFamily::default(),
            backlog: max_backlog(),
            workers: NonZeroUsize::new(DEFAULT_WORKERS).unwrap_or(NonZeroUsize::MIN),
            queue_capacity: NonZeroUsize::new(DEFAULT_QUEUE_CAPACITY)
                .unwrap_or(NonZeroUsize::MIN),
            reuse_address: true,
            exhaustion_backoff_ms: DEFAULT_EXHAUSTION_BACKOFF_MS,
        }
    }
}

impl ServiceConfig {
    /// 以给定端口构造其余字段取默认值的配置。
    pub fn on_port(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    /// 解析 TOML 文本并校验。
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()
    }

    /// 校验并规范化配置。
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        check_port(&self.port)?;
        let ceiling = max_backlog();
        if self.backlog > ceiling {
            warn!(
                requested = self.backlog,
                ceiling, "listen backlog exceeds SOMAXCONN; clamping"
            );
            self.backlog = ceiling;
        }
        Ok(self)
    }

    pub fn exhaustion_backoff(&self) -> Duration {
        Duration::from_millis(self.exhaustion_backoff_ms)
    }
}

/// 出站连接参数。
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectorConfig {
    pub host: String,
    pub port: String,
    pub family: AddressFamily,
    pub reuse_address: bool,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: "0".to_owned(),
            family: AddressFamily::default(),
            reuse_address: true,
        }
    }
}

impl ConnectorConfig {
    pub fn new(host: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: port.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()
    }

    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingHost);
        }
        check_port(&self.port)?;
        Ok(self)
    }
}

/// 只做语法检查：服务名是否存在由绑定或连接时的解析决定。
fn check_port(port: &str) -> Result<(), ConfigError> {
    let trimmed = port.trim();
    let numeric = trimmed.bytes().all(|b| b.is_ascii_digit());
    let valid = if numeric {
        !trimmed.is_empty() && trimmed.parse::<u16>().is_ok()
    } else {
        trimmed.starts_with(|c: char| c.is_ascii_alphabetic())
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    };
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidPort(port.to_owned()))
    }
}
