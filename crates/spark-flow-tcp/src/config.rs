use serde::Deserialize;
use socket2::SockRef;
use spark_flow::{FlowConfig, FlowError};
use std::{io, time::Duration};
use tokio::net::TcpStream;

/// 单次读取的默认块大小。
pub const DEFAULT_READ_CHUNK_SIZE: usize = 64 * 1024;

/// TCP 桥接的配置。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把泵送核心的 [`FlowConfig`] 与套接字行为（`TCP_NODELAY`、`SO_LINGER`、建连超时、
///   读取块大小）收拢到同一个结构中，监听端与连接端共享同一份配置；
/// - 支持从 TOML 加载，部署时无需改代码即可调整。
///
/// ## 契约（What）
/// - `flow`：泵送核心配置，对应 TOML 中的 `[flow]` 表；
/// - `read_chunk_size`：每次 `ResumeReading` 最多读取的字节数，必须大于 0；
/// - `nodelay`：是否关闭 Nagle 算法，默认开启，避免小块写入被合并延迟；
/// - `linger_ms`：`SO_LINGER` 毫秒数，`None` 沿用内核默认；
/// - `connect_timeout_ms`：建连超时，`None` 表示不限时；
/// - **后置条件**：[`validate`](Self::validate) 通过后才会被监听器或连接端使用。
///
/// ## 注意事项（Trade-offs）
/// - `SO_LINGER` 在 Linux 上按秒取整；中止连接时驱动会把它强制改为 0 以发送 RST，
///   与此处的配置无关。
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    flow: FlowConfig,
    read_chunk_size: usize,
    nodelay: bool,
    linger_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeConfig {
    /// 创建默认配置。
    pub const fn new() -> Self {
        Self {
            flow: FlowConfig::new(),
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            nodelay: true,
            linger_ms: None,
            connect_timeout_ms: None,
        }
    }

    /// 从 TOML 文本解析并校验配置。
    pub fn from_toml_str(text: &str) -> Result<Self, FlowError> {
        let config: Self = toml::from_str(text).map_err(|err| FlowError::config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 替换泵送核心配置。
    pub fn with_flow(mut self, flow: FlowConfig) -> Self {
        self.flow = flow;
        self
    }

    /// 设置读取块大小。
    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size;
        self
    }

    /// 设置 `TCP_NODELAY`。
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// 设置 `SO_LINGER`。
    pub fn with_linger(mut self, linger: Option<Duration>) -> Self {
        self.linger_ms = linger.map(duration_millis);
        self
    }

    /// 设置建连超时。
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout_ms = timeout.map(duration_millis);
        self
    }

    pub fn flow(&self) -> &FlowConfig {
        &self.flow
    }

    pub fn read_chunk_size(&self) -> usize {
        self.read_chunk_size
    }

    pub fn nodelay(&self) -> bool {
        self.nodelay
    }

    pub fn linger(&self) -> Option<Duration> {
        self.linger_ms.map(Duration::from_millis)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    /// 校验配置。
    pub fn validate(&self) -> Result<(), FlowError> {
        self.flow.validate()?;
        if self.read_chunk_size == 0 {
            return Err(FlowError::config("read_chunk_size must be greater than zero"));
        }
        Ok(())
    }

    /// 把套接字选项写入已建立的连接。
    pub(crate) fn apply(&self, stream: &TcpStream) -> io::Result<()> {
        stream.set_nodelay(self.nodelay)?;
        SockRef::from(stream).set_linger(self.linger())
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
