//! # 事件与效果词汇表
//!
//! ## 角色定位（Why）
//! - 连接状态机只通过消息与外界交互：传输通知、内部上/下游信号、握手消息进入，
//!   传输命令、上游请求、下游元素、结果通知流出；
//! - 把这些消息定义为封闭枚举，驱动层（如 Tokio 实现）只需做一次 `match` 即可落地。
//!
//! ## 契约（What）
//! - 进入状态机的消息统一包装为 [`ConnectionEvent`]；
//! - 状态机每处理一条消息返回一组有序的 [`Effect`]，驱动层必须按顺序执行。

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;

use crate::error::FlowError;

/// 泵在两侧之间搬运的单元。
///
/// 两种载荷分别对应“传输层字节块”与“内部元素”，取代无类型的强制转换。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Payload {
    /// 传输层读取到的字节块。
    Chunk(Bytes),
    /// 内部上游提交的元素。
    Element(Bytes),
}

impl Payload {
    /// 取出字节内容。
    pub fn into_bytes(self) -> Bytes {
        match self {
            Payload::Chunk(bytes) | Payload::Element(bytes) => bytes,
        }
    }

    /// 字节长度。
    pub fn len(&self) -> usize {
        match self {
            Payload::Chunk(bytes) | Payload::Element(bytes) => bytes.len(),
        }
    }

    /// 是否为空。
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 发起连接所需的参数（仅连接方角色）。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectRequest {
    /// 目标地址。
    pub remote: SocketAddr,
    /// 建连超时；`None` 表示沿用传输层默认行为。
    pub timeout: Option<Duration>,
}

impl ConnectRequest {
    /// 以目标地址创建请求。
    pub fn new(remote: SocketAddr) -> Self {
        Self {
            remote,
            timeout: None,
        }
    }

    /// 设置建连超时。
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// 传输层报告的建连失败，原样转交给请求方。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectFailure {
    /// 目标地址。
    pub remote: SocketAddr,
    /// 失败原因。
    pub cause: FlowError,
}

/// 发往传输层的命令。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TransportCommand {
    /// 发起连接。
    Connect(ConnectRequest),
    /// 登记本连接为读通知的接收者。
    Register,
    /// 允许传输层再投递一个字节块。
    ResumeReading,
    /// 写入字节块，完成后回送 [`TransportEvent::WriteAck`]。
    Write(Bytes),
    /// 关闭写方向并等待对端确认。
    ConfirmedClose,
    /// 关闭连接（对端已半关闭时使用）。
    Close,
    /// 立即中止连接。
    Abort,
}

impl TransportCommand {
    /// 命令名，用于错误描述与日志。
    pub fn name(&self) -> &'static str {
        match self {
            TransportCommand::Connect(_) => "connect",
            TransportCommand::Register => "register",
            TransportCommand::ResumeReading => "resume_reading",
            TransportCommand::Write(_) => "write",
            TransportCommand::ConfirmedClose => "confirmed_close",
            TransportCommand::Close => "close",
            TransportCommand::Abort => "abort",
        }
    }
}

/// 传输层通知。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TransportEvent {
    /// 建连成功。
    Connected {
        remote: SocketAddr,
        local: SocketAddr,
    },
    /// 建连失败。
    ConnectFailed(ConnectFailure),
    /// 收到一个字节块。
    Received(Bytes),
    /// 上一次写入已被接受。
    WriteAck,
    /// 对端半关闭（不再发送数据）。
    PeerClosed,
    /// 连接已完全关闭。
    Closed,
    /// `ConfirmedClose` 已完成，双方都已关闭。
    ConfirmedClosed,
    /// 连接因错误关闭。
    ErrorClosed(String),
    /// 某条命令执行失败。
    CommandFailed(TransportCommand),
    /// 连接被中止。
    Aborted,
}

/// 内部上游生产者发来的信号。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UpstreamEvent {
    /// 生产者已订阅。
    OnSubscribe,
    /// 提交一个元素。
    OnNext(Bytes),
    /// 正常结束。
    OnComplete,
    /// 以错误结束。
    OnError(String),
}

/// 发往内部上游生产者的命令。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UpstreamCommand {
    /// 追加需求。
    Request(usize),
    /// 取消订阅。
    Cancel,
}

/// 内部下游消费者发来的信号。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DownstreamEvent {
    /// 追加需求。
    Request(u64),
    /// 取消。
    Cancel,
}

/// 发往内部下游消费者的信号；`Complete` 与 `Error` 是终止信号，二者最多出现一次。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DownstreamSignal {
    /// 一个元素。
    Next(Bytes),
    /// 正常结束。
    Complete,
    /// 以错误结束。
    Error(FlowError),
}

impl DownstreamSignal {
    /// 是否为终止信号。
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DownstreamSignal::Next(_))
    }
}

/// 连接方角色的结果通知。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConnectOutcome<E> {
    /// 建连成功，附带地址与已连线的内部端点。
    Connected {
        remote: SocketAddr,
        local: SocketAddr,
        endpoint: E,
    },
    /// 建连失败。
    Failed(ConnectFailure),
}

/// 连接的终止方式。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Termination {
    /// 两个方向都正常关闭。
    Completed,
    /// 经 `fail` 流程终止。
    Failed(FlowError),
}

/// 进入连接状态机的消息。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConnectionEvent<E> {
    /// 握手消息：内部生产/消费端已由外部机制连线完毕。
    Exposed(E),
    /// 传输层通知。
    Transport(TransportEvent),
    /// 内部上游信号。
    Upstream(UpstreamEvent),
    /// 内部下游信号。
    Downstream(DownstreamEvent),
}

/// 状态机产生的效果，驱动层按顺序执行。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Effect<E> {
    /// 执行传输命令。
    Transport(TransportCommand),
    /// 通知上游生产者。
    Upstream(UpstreamCommand),
    /// 通知下游消费者。
    Downstream(DownstreamSignal),
    /// 通知连接请求方。
    Requester(ConnectOutcome<E>),
    /// 连接结束，驱动层应回收资源；每个连接恰好一次。
    Stop(Termination),
}
