//! # 连接生命周期与分派表
//!
//! ## 核心意图（Why）
//! - 把“某个阶段收到某类消息该做什么”集中成一张纯函数表 [`route`]，取代按阶段切换
//!   处理函数的写法；状态机的合法跃迁因此可以脱离调度器单独测试。
//!
//! ## 状态机约束（What）
//! - 阶段顺序：`AwaitingExposedInterface → AwaitingTransport（仅连接方）→ Running → ShuttingDown`；
//! - `AwaitingExposedInterface` 只接受握手消息，其余消息一律视为协议违例（传输故障直接失败）；
//! - 内部上/下游消息在握手之后的任一非终止阶段都被接受；
//! - `ShuttingDown` 是终止阶段，忽略一切消息。

use crate::protocol::{ConnectionEvent, TransportEvent};

/// 连接的生命周期阶段。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Phase {
    /// 等待外部机制连线内部生产/消费端。
    AwaitingExposedInterface,
    /// 已发出建连命令，等待传输层结果（仅连接方）。
    AwaitingTransport,
    /// 稳态运行。
    Running,
    /// 已终止。
    ShuttingDown,
}

impl Phase {
    /// 是否为终止阶段。
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::ShuttingDown)
    }
}

/// 连接角色的种类。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RoleKind {
    /// 接受方：传输在创建时已连接。
    Accepting,
    /// 连接方：需先建立传输。
    Connecting,
}

/// 消息种类，分派表的列。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EventKind {
    /// 握手消息。
    Handoff,
    /// 建连成功。
    Connected,
    /// 建连失败。
    ConnectFailed,
    /// 运行期的常规传输通知：数据、写确认、关闭。
    TransportSteady,
    /// 传输故障：错误关闭、命令失败、中止。
    TransportFault,
    /// 内部上/下游消息。
    Internal,
}

impl EventKind {
    /// 对消息分类。
    pub fn of<E>(event: &ConnectionEvent<E>) -> Self {
        match event {
            ConnectionEvent::Exposed(_) => EventKind::Handoff,
            ConnectionEvent::Transport(event) => match event {
                TransportEvent::Connected { .. } => EventKind::Connected,
                TransportEvent::ConnectFailed(_) => EventKind::ConnectFailed,
                TransportEvent::Received(_)
                | TransportEvent::WriteAck
                | TransportEvent::PeerClosed
                | TransportEvent::Closed
                | TransportEvent::ConfirmedClosed => EventKind::TransportSteady,
                TransportEvent::ErrorClosed(_)
                | TransportEvent::CommandFailed(_)
                | TransportEvent::Aborted => EventKind::TransportFault,
            },
            ConnectionEvent::Upstream(_) | ConnectionEvent::Downstream(_) => EventKind::Internal,
        }
    }
}

/// 分派结果。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Action {
    /// 接受方握手：登记传输、安装条件、预取首块，进入运行态。
    Run,
    /// 连接方握手：记录端点并发出建连命令。
    IssueConnect,
    /// 建连成功：同 `Run`，并通知请求方。
    Establish,
    /// 建连失败：转交请求方并失败。
    ConnectFailure,
    /// 运行期传输通知。
    Steady,
    /// 传输故障，进入 `fail`。
    Fail,
    /// 内部上/下游消息。
    Internal,
    /// 协议违例，进入 `fail`。
    Violation,
    /// 已终止，忽略。
    Ignore,
}

/// 分派表：`(角色, 阶段, 消息种类) -> 动作`。
pub fn route(role: RoleKind, phase: Phase, kind: EventKind) -> Action {
    use EventKind as K;
    use Phase as P;

    match (phase, kind) {
        (P::ShuttingDown, _) => Action::Ignore,
        (_, K::TransportFault) => Action::Fail,
        (P::AwaitingExposedInterface, K::Handoff) => match role {
            RoleKind::Accepting => Action::Run,
            RoleKind::Connecting => Action::IssueConnect,
        },
        (P::AwaitingExposedInterface, _) => Action::Violation,
        (_, K::Internal) => Action::Internal,
        (P::AwaitingTransport, K::Connected) => Action::Establish,
        (P::AwaitingTransport, K::ConnectFailed) => Action::ConnectFailure,
        (P::Running, K::TransportSteady) => Action::Steady,
        (P::AwaitingTransport | P::Running, _) => Action::Violation,
    }
}
