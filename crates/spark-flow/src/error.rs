//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为泵送核心与 TCP 驱动提供统一的错误语义，所有故障最终都汇聚到连接级 `fail` 流程；
//! - 按照“传输故障 / 协议违例 / 上游失败 / 本地取消 / 配置错误”归档，方便上层决定是否重试。
//!
//! ## 设计要求（What）
//! - 错误类型派生 `thiserror::Error`，同时满足 `Clone + Eq`，因为同一个原因需要同时
//!   递交给内部发布端与连接请求方；
//! - 每个变体都有稳定错误码（[`FlowError::code`]），日志与告警只依赖错误码而非文案。

use std::net::SocketAddr;

use thiserror::Error;

/// 错误分类，对应连接层的故障分级。
///
/// - **意图 (Why)**：调用方据此区分“致命的传输故障”与“正常的本地取消”；
/// - **契约 (What)**：分类只描述来源，不携带重试建议，本层从不重试。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorCategory {
    /// 传输层报告的故障：错误关闭、命令失败、中止、建连失败。
    TransportFault,
    /// 事件到达顺序或数量违反契约。
    ProtocolViolation,
    /// 内部上游生产者以错误终止。
    Upstream,
    /// 本地主动取消，不视为故障。
    LocalCancellation,
    /// 配置非法。
    Configuration,
}

/// 泵送核心的错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：把传输通知、协议违例与上游失败统一成一个可克隆的原因，`fail` 流程会把同一个
///   原因分别交给传输输出侧（中止）和内部发布侧（错误终止）；
/// - **契约 (What)**：
///   - 所有变体均为 `Send + Sync + 'static`，可以跨任务传播；
///   - [`code`](Self::code) 返回稳定错误码，[`category`](Self::category) 返回分类；
/// - **设计权衡 (Trade-offs)**：上下文以 `String` 保存，牺牲少量分配换取可读性；`Io` 变体只保留
///   文案，不保留 `std::io::Error` 本体，以维持 `Clone + Eq`。
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum FlowError {
    /// 传输层以错误关闭连接。
    #[error("the connection closed with error: {cause}")]
    ErrorClosed { cause: String },

    /// 传输层拒绝执行某条命令。
    #[error("tcp command `{command}` failed")]
    CommandFailed { command: &'static str },

    /// 连接被中止（RST）。
    #[error("the connection has been aborted")]
    Aborted,

    /// 建连失败。
    #[error("connection to {remote} failed: {cause}")]
    ConnectFailed { remote: SocketAddr, cause: String },

    /// 建连超时。
    #[error("connection to {remote} timed out")]
    ConnectTimeout { remote: SocketAddr },

    /// 事件顺序或数量违反契约，例如握手前收到非握手消息。
    #[error("protocol violation: {detail}")]
    ProtocolViolation { detail: String },

    /// 内部上游生产者以错误终止。
    #[error("upstream failed: {cause}")]
    UpstreamFailed { cause: String },

    /// 桥接端取消了上游订阅，生产者不应再提交元素。
    #[error("the bridge cancelled the upstream subscription")]
    Cancelled,

    /// 配置非法。
    #[error("invalid configuration: {detail}")]
    InvalidConfig { detail: String },

    /// 底层 IO 失败，`code` 标识具体操作。
    #[error("{message}")]
    Io { code: &'static str, message: String },
}

impl FlowError {
    /// 构造协议违例错误。
    pub fn protocol(detail: impl Into<String>) -> Self {
        FlowError::ProtocolViolation {
            detail: detail.into(),
        }
    }

    /// 构造配置错误。
    pub fn config(detail: impl Into<String>) -> Self {
        FlowError::InvalidConfig {
            detail: detail.into(),
        }
    }

    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            FlowError::ErrorClosed { .. } => "spark.flow.transport.error_closed",
            FlowError::CommandFailed { .. } => "spark.flow.transport.command_failed",
            FlowError::Aborted => "spark.flow.transport.aborted",
            FlowError::ConnectFailed { .. } => "spark.flow.transport.connect_failed",
            FlowError::ConnectTimeout { .. } => "spark.flow.transport.connect_timeout",
            FlowError::ProtocolViolation { .. } => "spark.flow.protocol_violation",
            FlowError::UpstreamFailed { .. } => "spark.flow.upstream_failed",
            FlowError::Cancelled => "spark.flow.cancelled",
            FlowError::InvalidConfig { .. } => "spark.flow.invalid_config",
            FlowError::Io { code, .. } => code,
        }
    }

    /// 错误分类。
    pub fn category(&self) -> ErrorCategory {
        match self {
            FlowError::ErrorClosed { .. }
            | FlowError::CommandFailed { .. }
            | FlowError::Aborted
            | FlowError::ConnectFailed { .. }
            | FlowError::ConnectTimeout { .. }
            | FlowError::Io { .. } => ErrorCategory::TransportFault,
            FlowError::ProtocolViolation { .. } => ErrorCategory::ProtocolViolation,
            FlowError::UpstreamFailed { .. } => ErrorCategory::Upstream,
            FlowError::Cancelled => ErrorCategory::LocalCancellation,
            FlowError::InvalidConfig { .. } => ErrorCategory::Configuration,
        }
    }
}
